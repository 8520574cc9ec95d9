//! Fixed-width bitsets over position indices
//!
//! Follow sets are stored twice: as owned [`BitSet`]s while an automaton is
//! built, and as [`BitsRef`] slices into one shared word blob once the
//! runtime schema is assembled.

use serde::Serialize;

const WORD: usize = 64;

/// An owned set of positions
#[derive(Debug, Clone, Default)]
pub struct BitSet {
    words: Vec<u64>,
}

impl BitSet {
    fn significant(&self) -> &[u64] {
        let end = self
            .words
            .iter()
            .rposition(|w| *w != 0)
            .map_or(0, |i| i + 1);
        &self.words[..end]
    }
}

// Equality ignores trailing zero words
impl PartialEq for BitSet {
    fn eq(&self, other: &Self) -> bool {
        self.significant() == other.significant()
    }
}

impl Eq for BitSet {}

impl std::hash::Hash for BitSet {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.significant().hash(state);
    }
}

impl BitSet {
    /// An empty set able to hold `capacity` positions
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            words: vec![0; capacity.div_ceil(WORD)],
        }
    }

    /// Build from raw words
    pub fn from_words(words: &[u64]) -> Self {
        Self {
            words: words.to_vec(),
        }
    }

    /// The backing words
    pub fn words(&self) -> &[u64] {
        &self.words
    }

    /// Add a position
    pub fn insert(&mut self, position: usize) {
        let word = position / WORD;
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (position % WORD);
    }

    /// Whether a position is in the set
    pub fn contains(&self, position: usize) -> bool {
        self.words
            .get(position / WORD)
            .map_or(false, |w| w & (1 << (position % WORD)) != 0)
    }

    /// Add every position of `other`
    pub fn union_with(&mut self, other: &BitSet) {
        if other.words.len() > self.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (mine, theirs) in self.words.iter_mut().zip(&other.words) {
            *mine |= theirs;
        }
    }

    /// Whether the set is empty
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of positions in the set
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Positions in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        iter_words(&self.words)
    }
}

impl FromIterator<usize> for BitSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut set = BitSet::default();
        for position in iter {
            set.insert(position);
        }
        set
    }
}

fn iter_words(words: &[u64]) -> impl Iterator<Item = usize> + '_ {
    words.iter().enumerate().flat_map(|(i, &word)| {
        let mut rest = word;
        std::iter::from_fn(move || {
            if rest == 0 {
                return None;
            }
            let bit = rest.trailing_zeros() as usize;
            rest &= rest - 1;
            Some(i * WORD + bit)
        })
    })
}

/// A slice of the shared bitset blob
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct BitsRef {
    /// First word
    pub offset: u32,
    /// Number of words
    pub len: u32,
}

/// Append-only storage for packed bitsets
#[derive(Debug, Clone, Default)]
pub struct BitBlob {
    words: Vec<u64>,
}

impl BitBlob {
    /// Create an empty blob
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a set padded to `width` words
    pub fn push(&mut self, set: &BitSet, width: usize) -> BitsRef {
        let offset = self.words.len();
        self.words.extend_from_slice(set.words());
        self.words
            .resize(offset + width.max(set.words().len()), 0);
        BitsRef {
            offset: offset as u32,
            len: (self.words.len() - offset) as u32,
        }
    }

    /// The words of a stored set
    pub fn words(&self, bits: BitsRef) -> &[u64] {
        let start = bits.offset as usize;
        let end = start + bits.len as usize;
        self.words.get(start..end).unwrap_or(&[])
    }

    /// Whether a stored set contains a position
    pub fn contains(&self, bits: BitsRef, position: usize) -> bool {
        self.words(bits)
            .get(position / WORD)
            .map_or(false, |w| w & (1 << (position % WORD)) != 0)
    }

    /// Positions of a stored set in ascending order
    pub fn iter(&self, bits: BitsRef) -> impl Iterator<Item = usize> + '_ {
        iter_words(self.words(bits))
    }

    /// The whole blob
    pub fn as_words(&self) -> &[u64] {
        &self.words
    }
}

/// Words needed for `positions` bits
pub fn width_for(positions: usize) -> usize {
    positions.div_ceil(WORD)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_iterate() {
        let mut set = BitSet::with_capacity(10);
        set.insert(3);
        set.insert(70);
        set.insert(0);
        assert!(set.contains(70));
        assert!(!set.contains(4));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![0, 3, 70]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_union() {
        let mut a: BitSet = [1, 2].into_iter().collect();
        let b: BitSet = [2, 130].into_iter().collect();
        a.union_with(&b);
        assert_eq!(a.iter().collect::<Vec<_>>(), vec![1, 2, 130]);
    }

    #[test]
    fn test_equality_ignores_width() {
        let mut wide = BitSet::with_capacity(256);
        wide.insert(3);
        let narrow: BitSet = [3].into_iter().collect();
        assert_eq!(wide, narrow);
        assert_eq!(BitSet::with_capacity(128), BitSet::default());
    }

    #[test]
    fn test_blob_round_trip() {
        let mut blob = BitBlob::new();
        let set: BitSet = [5, 65].into_iter().collect();
        let empty = BitSet::default();
        let first = blob.push(&set, 2);
        let second = blob.push(&empty, 2);
        assert_eq!(blob.iter(first).collect::<Vec<_>>(), vec![5, 65]);
        assert!(blob.contains(first, 65));
        assert_eq!(blob.iter(second).count(), 0);
        assert_eq!(second.offset, 2);
    }
}
