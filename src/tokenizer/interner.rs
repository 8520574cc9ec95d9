//! QName interner
//!
//! Element and attribute names repeat constantly in real documents. The
//! interner keeps each distinct name once in an append-only arena and hands
//! out [`NameId`] handles that stay valid until [`NameInterner::clear`]. An LRU
//! cache over recently seen names keeps lookups cheap without an unbounded
//! index.

use lru::LruCache;
use std::num::NonZeroUsize;

const DEFAULT_CAPACITY: usize = 1024;
const NO_COLON: u32 = u32::MAX;

/// Handle to an interned qualified name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);

impl NameId {
    /// Index of the name in interning order
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    start: u32,
    len: u32,
    colon: u32,
}

/// Append-only name arena with an LRU front
pub struct NameInterner {
    arena: String,
    entries: Vec<Entry>,
    recent: LruCache<Box<str>, NameId>,
}

impl NameInterner {
    /// Create an interner whose cache holds `capacity` recent names
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity)
            .unwrap_or(NonZeroUsize::MIN);
        Self {
            arena: String::new(),
            entries: Vec::new(),
            recent: LruCache::new(capacity),
        }
    }

    /// Intern a qualified name (`prefix:local` or `local`)
    pub fn intern(&mut self, name: &str) -> NameId {
        if let Some(&id) = self.recent.get(name) {
            return id;
        }
        let id = NameId(self.entries.len() as u32);
        let start = self.arena.len() as u32;
        self.arena.push_str(name);
        self.entries.push(Entry {
            start,
            len: name.len() as u32,
            colon: name.find(':').map_or(NO_COLON, |c| c as u32),
        });
        self.recent.put(name.into(), id);
        id
    }

    /// The full qualified name
    pub fn resolve(&self, id: NameId) -> &str {
        let entry = self.entries[id.index()];
        &self.arena[entry.start as usize..(entry.start + entry.len) as usize]
    }

    /// The prefix part, empty when absent
    pub fn prefix(&self, id: NameId) -> &str {
        let entry = self.entries[id.index()];
        if entry.colon == NO_COLON {
            ""
        } else {
            &self.resolve(id)[..entry.colon as usize]
        }
    }

    /// The local part
    pub fn local(&self, id: NameId) -> &str {
        let entry = self.entries[id.index()];
        if entry.colon == NO_COLON {
            self.resolve(id)
        } else {
            &self.resolve(id)[entry.colon as usize + 1..]
        }
    }

    /// Number of arena entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing was interned yet
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Forget every name; previously issued handles become invalid
    pub fn clear(&mut self) {
        self.arena.clear();
        self.entries.clear();
        self.recent.clear();
    }
}

impl Default for NameInterner {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl std::fmt::Debug for NameInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameInterner")
            .field("names", &self.entries.len())
            .field("arena_bytes", &self.arena.len())
            .finish()
    }
}
