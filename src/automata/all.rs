//! `xs:all` content
//!
//! Members may appear in any order, each at most once. A run is the set of
//! members seen so far.

use serde::Serialize;

use super::bitset::BitSet;
use crate::runtime::symbols::SymbolId;
use crate::validators::ElemId;

/// One member of an all group
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllMember {
    /// Names the member may appear under (the element and its allowed
    /// substitutes), with the declaration each selects
    pub alternatives: Vec<(SymbolId, ElemId)>,
    /// `minOccurs="0"`
    pub optional: bool,
}

/// An all-group content model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AllModel {
    /// Members in declaration order
    pub members: Vec<AllMember>,
    /// Whether the whole group may be absent
    pub emptiable: bool,
}

/// Outcome of offering one child to an all group
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllStep {
    /// Accepted as member `index`
    Accepted {
        /// Member index
        index: usize,
        /// Selected declaration
        elem: ElemId,
    },
    /// The member was already seen
    Duplicate(usize),
    /// No member has this name
    Unexpected,
}

impl AllModel {
    /// Offer one child; `seen` is updated on acceptance
    pub fn step(&self, seen: &mut BitSet, symbol: Option<SymbolId>) -> AllStep {
        let Some(symbol) = symbol else {
            return AllStep::Unexpected;
        };
        for (index, member) in self.members.iter().enumerate() {
            if let Some((_, elem)) = member.alternatives.iter().find(|(s, _)| *s == symbol) {
                if seen.contains(index) {
                    return AllStep::Duplicate(index);
                }
                seen.insert(index);
                return AllStep::Accepted { index, elem: *elem };
            }
        }
        AllStep::Unexpected
    }

    /// Whether the group may end with `seen`
    pub fn is_accepting(&self, seen: &BitSet) -> bool {
        if seen.is_empty() && self.emptiable {
            return true;
        }
        self.missing(seen).next().is_none()
    }

    /// Required members not yet seen
    pub fn missing<'a>(&'a self, seen: &'a BitSet) -> impl Iterator<Item = &'a AllMember> + 'a {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, m)| !m.optional && !seen.contains(*i))
            .map(|(_, m)| m)
    }

    /// Names not yet seen
    pub fn expected<'a>(&'a self, seen: &'a BitSet) -> impl Iterator<Item = SymbolId> + 'a {
        self.members
            .iter()
            .enumerate()
            .filter(move |(i, _)| !seen.contains(*i))
            .flat_map(|(_, m)| m.alternatives.iter().map(|(s, _)| *s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model(emptiable: bool) -> AllModel {
        AllModel {
            members: vec![
                AllMember {
                    alternatives: vec![(SymbolId(1), ElemId(1))],
                    optional: false,
                },
                AllMember {
                    alternatives: vec![(SymbolId(2), ElemId(2)), (SymbolId(3), ElemId(3))],
                    optional: true,
                },
            ],
            emptiable,
        }
    }

    #[test]
    fn test_any_order_once() {
        let all = model(false);
        let mut seen = BitSet::default();
        assert_eq!(
            all.step(&mut seen, Some(SymbolId(3))),
            AllStep::Accepted {
                index: 1,
                elem: ElemId(3)
            }
        );
        assert!(!all.is_accepting(&seen));
        assert_eq!(all.step(&mut seen, Some(SymbolId(2))), AllStep::Duplicate(1));
        assert!(matches!(all.step(&mut seen, Some(SymbolId(1))), AllStep::Accepted { .. }));
        assert!(all.is_accepting(&seen));
        assert_eq!(all.step(&mut seen, Some(SymbolId(9))), AllStep::Unexpected);
    }

    #[test]
    fn test_emptiable_group() {
        let seen = BitSet::default();
        assert!(!model(false).is_accepting(&seen));
        assert!(model(true).is_accepting(&seen));
        assert_eq!(model(true).missing(&seen).count(), 1);
        assert_eq!(model(true).expected(&seen).count(), 3);
    }
}
