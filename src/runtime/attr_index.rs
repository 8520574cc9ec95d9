//! Per-type attribute lookup
//!
//! Every complex type owns a contiguous run of the shared attribute-use
//! table. How that run is searched depends on its size: a linear scan for
//! up to 8 uses, binary search over uses sorted by symbol for up to 64, and
//! an open-addressed hash table above that.

use serde::Serialize;

use super::symbols::SymbolId;
use crate::validators::{AttrId, ValueConstraint};

/// Largest run searched linearly
pub const LINEAR_MAX: usize = 8;
/// Largest run searched by bisection
pub const SORTED_MAX: usize = 64;

const EMPTY_SLOT: u32 = u32::MAX;

/// One attribute use of a complex type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrUse {
    /// Attribute name
    pub symbol: SymbolId,
    /// Declaration
    pub attr: AttrId,
    /// `use="required"`
    pub required: bool,
    /// Use-level default or fixed value
    pub value: Option<ValueConstraint>,
}

/// Search strategy of one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AttrIndexKind {
    /// Scan in declaration order
    SmallLinear,
    /// Binary search by symbol
    SortedBinary,
    /// Linear probing
    Hash,
}

/// A view into the shared table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct AttrIndex {
    /// Search strategy
    pub kind: AttrIndexKind,
    /// First use
    pub offset: u32,
    /// Number of uses
    pub len: u32,
    /// First hash slot
    pub slots_offset: u32,
    /// Number of hash slots (a power of two, or 0)
    pub slots_len: u32,
}

impl AttrIndex {
    /// An index over no attributes
    pub const EMPTY: Self = Self {
        kind: AttrIndexKind::SmallLinear,
        offset: 0,
        len: 0,
        slots_offset: 0,
        slots_len: 0,
    };
}

/// Attribute uses of every complex type
#[derive(Debug, Clone, Default)]
pub struct AttrTable {
    uses: Vec<AttrUse>,
    slots: Vec<u32>,
}

fn slot_of(symbol: SymbolId, mask: usize) -> usize {
    (symbol.0.wrapping_mul(0x9E37_79B1) as usize) & mask
}

impl AttrTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Append the uses of one type and pick its strategy
    pub fn push(&mut self, mut uses: Vec<AttrUse>) -> AttrIndex {
        let offset = self.uses.len() as u32;
        let len = uses.len();
        let kind = if len <= LINEAR_MAX {
            AttrIndexKind::SmallLinear
        } else if len <= SORTED_MAX {
            uses.sort_by_key(|u| u.symbol);
            AttrIndexKind::SortedBinary
        } else {
            AttrIndexKind::Hash
        };
        let slots_offset = self.slots.len() as u32;
        let mut slots_len = 0;
        if kind == AttrIndexKind::Hash {
            let size = (2 * len).next_power_of_two();
            let mut slots = vec![EMPTY_SLOT; size];
            for (i, attr_use) in uses.iter().enumerate() {
                let mut slot = slot_of(attr_use.symbol, size - 1);
                while slots[slot] != EMPTY_SLOT {
                    slot = (slot + 1) & (size - 1);
                }
                slots[slot] = i as u32;
            }
            self.slots.extend(slots);
            slots_len = size as u32;
        }
        self.uses.extend(uses);
        AttrIndex {
            kind,
            offset,
            len: len as u32,
            slots_offset,
            slots_len,
        }
    }

    /// The uses of a view
    pub fn uses(&self, index: AttrIndex) -> &[AttrUse] {
        let start = index.offset as usize;
        self.uses
            .get(start..start + index.len as usize)
            .unwrap_or(&[])
    }

    /// Find the use named `symbol`
    pub fn find(&self, index: AttrIndex, symbol: SymbolId) -> Option<&AttrUse> {
        let uses = self.uses(index);
        match index.kind {
            AttrIndexKind::SmallLinear => uses.iter().find(|u| u.symbol == symbol),
            AttrIndexKind::SortedBinary => uses
                .binary_search_by_key(&symbol, |u| u.symbol)
                .ok()
                .map(|i| &uses[i]),
            AttrIndexKind::Hash => {
                let start = index.slots_offset as usize;
                let slots = self.slots.get(start..start + index.slots_len as usize)?;
                let mask = slots.len().checked_sub(1)?;
                let mut slot = slot_of(symbol, mask);
                for _ in 0..slots.len() {
                    let entry = slots[slot];
                    if entry == EMPTY_SLOT {
                        return None;
                    }
                    let candidate = &uses[entry as usize];
                    if candidate.symbol == symbol {
                        return Some(candidate);
                    }
                    slot = (slot + 1) & mask;
                }
                None
            }
        }
    }

    /// Every stored use, for hashing
    pub fn all_uses(&self) -> &[AttrUse] {
        &self.uses
    }
}
