//! Subset construction
//!
//! A DFA state is the set of positions matched by the last child (or the
//! virtual start position). Each state's alphabet is split by matcher:
//! exact transitions are keyed by symbol and kept sorted for binary search,
//! wildcard edges are tried in position order once no exact transition
//! applies. Construction stops as soon as the state budget is exceeded.

use std::collections::{BTreeMap, HashMap, VecDeque};

use serde::Serialize;

use super::bitset::BitSet;
use super::glushkov::Glushkov;
use super::{Input, Match, Matcher};
use crate::runtime::symbols::{SymbolId, WildcardId};
use crate::validators::ElemId;

/// An exact transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transition {
    /// Element name
    pub symbol: SymbolId,
    /// Declaration the child is validated against
    pub elem: ElemId,
    /// Target state
    pub target: u32,
}

/// A wildcard transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WildcardEdge {
    /// Wildcard rule
    pub rule: WildcardId,
    /// Target state
    pub target: u32,
}

/// One DFA state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DfaState {
    /// Whether the content may end here
    pub accepting: bool,
    /// Exact transitions sorted by symbol
    pub transitions: Vec<Transition>,
    /// Wildcard transitions in position order
    pub wildcards: Vec<WildcardEdge>,
}

/// A deterministic content model; state 0 is the start state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Dfa {
    /// States
    pub states: Vec<DfaState>,
}

impl Dfa {
    /// Number of states
    pub fn len(&self) -> usize {
        self.states.len()
    }

    /// Whether the automaton has no states
    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// Whether `state` accepts
    pub fn is_accepting(&self, state: u32) -> bool {
        self.states
            .get(state as usize)
            .map_or(false, |s| s.accepting)
    }

    /// Advance from `state` on one child element
    pub fn step<F>(&self, state: u32, input: &Input, admits: F) -> Option<(u32, Match)>
    where
        F: Fn(WildcardId) -> bool,
    {
        let current = self.states.get(state as usize)?;
        if let Some(symbol) = input.symbol {
            if let Ok(i) = current
                .transitions
                .binary_search_by_key(&symbol, |t| t.symbol)
            {
                let t = current.transitions[i];
                return Some((t.target, Match::Element(t.elem)));
            }
        }
        current
            .wildcards
            .iter()
            .find(|edge| admits(edge.rule))
            .map(|edge| (edge.target, Match::Wildcard(edge.rule)))
    }

    /// Names that may come next, exact transitions only
    pub fn expected(&self, state: u32) -> impl Iterator<Item = SymbolId> + '_ {
        self.states
            .get(state as usize)
            .into_iter()
            .flat_map(|s| s.transitions.iter().map(|t| t.symbol))
    }

    /// Determinize `automaton`; `None` once more than `max_states` states
    /// would be needed, or when a repetition is counted
    pub fn build(automaton: &Glushkov<Matcher>, max_states: usize) -> Option<Dfa> {
        if automaton.has_counters() {
            return None;
        }
        let start_marker = automaton.len();
        let start: BitSet = std::iter::once(start_marker).collect();
        let mut index: HashMap<BitSet, u32> = HashMap::new();
        let mut sets: Vec<BitSet> = Vec::new();
        let mut queue = VecDeque::new();
        let mut states = Vec::new();

        index.insert(start.clone(), 0);
        sets.push(start);
        queue.push_back(0u32);
        if max_states == 0 {
            return None;
        }

        while let Some(id) = queue.pop_front() {
            let set = &sets[id as usize];
            let candidates = if set.contains(start_marker) {
                automaton.first.clone()
            } else {
                let mut candidates = BitSet::default();
                for p in set.iter() {
                    candidates.union_with(&automaton.follow[p]);
                }
                candidates
            };
            let accepting = if set.contains(start_marker) {
                automaton.nullable
            } else {
                set.iter().any(|p| automaton.last.contains(p))
            };

            // Group candidate positions by matcher, keeping first-seen order
            let mut groups: BTreeMap<Matcher, BitSet> = BTreeMap::new();
            let mut order: Vec<Matcher> = Vec::new();
            for p in candidates.iter() {
                let matcher = automaton.positions[p];
                groups
                    .entry(matcher)
                    .or_insert_with(|| {
                        order.push(matcher);
                        BitSet::default()
                    })
                    .insert(p);
            }

            let mut state = DfaState {
                accepting,
                ..DfaState::default()
            };
            for matcher in order {
                let target_set = groups.remove(&matcher).unwrap_or_default();
                let target = match index.get(&target_set) {
                    Some(target) => *target,
                    None => {
                        let target = sets.len() as u32;
                        if sets.len() >= max_states {
                            return None;
                        }
                        index.insert(target_set.clone(), target);
                        sets.push(target_set);
                        queue.push_back(target);
                        target
                    }
                };
                match matcher {
                    Matcher::Element { symbol, elem } => state.transitions.push(Transition {
                        symbol,
                        elem,
                        target,
                    }),
                    Matcher::Wildcard { rule } => {
                        state.wildcards.push(WildcardEdge { rule, target })
                    }
                }
            }
            state.transitions.sort_by_key(|t| t.symbol);
            states.push(state);
        }
        Some(Dfa { states })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::glushkov::Expr;
    use crate::runtime::symbols::NamespaceId;

    fn element(n: u32) -> Expr<Matcher> {
        Expr::Leaf(Matcher::Element {
            symbol: SymbolId(n),
            elem: ElemId(n),
        })
    }

    fn input(n: u32) -> Input {
        Input {
            symbol: Some(SymbolId(n)),
            namespace: NamespaceId(0),
        }
    }

    #[test]
    fn test_sequence_has_three_states() {
        let g = Glushkov::build(&Expr::seq(vec![element(1), element(2)]));
        let dfa = Dfa::build(&g, 16).unwrap();
        assert_eq!(dfa.len(), 3);
        assert_eq!(dfa.states[0].transitions[0].symbol, SymbolId(1));
        assert_eq!(dfa.states[0].transitions[0].target, 1);
        assert_eq!(dfa.states[1].transitions[0].target, 2);
        assert!(dfa.states[2].accepting);
        assert!(dfa.states[2].transitions.is_empty());
        assert!(dfa.states.iter().all(|s| s.wildcards.is_empty()));
    }

    #[test]
    fn test_optional_tail_state_accepts() {
        let g = Glushkov::build(&Expr::seq(vec![
            element(1),
            Expr::Opt(Box::new(element(2))),
        ]));
        let dfa = Dfa::build(&g, 16).unwrap();
        assert_eq!(dfa.len(), 3);
        assert!(dfa.states[1].accepting);
        assert_eq!(dfa.states[1].transitions[0].symbol, SymbolId(2));
        assert_eq!(dfa.states[1].transitions[0].target, 2);
    }

    #[test]
    fn test_wildcard_edge() {
        let g = Glushkov::build(&Expr::Leaf(Matcher::Wildcard {
            rule: WildcardId(0),
        }));
        let dfa = Dfa::build(&g, 16).unwrap();
        assert_eq!(dfa.len(), 2);
        assert_eq!(
            dfa.states[0].wildcards,
            vec![WildcardEdge {
                rule: WildcardId(0),
                target: 1
            }]
        );
        assert!(dfa.states[1].accepting);
        let anything = Input {
            symbol: None,
            namespace: NamespaceId(3),
        };
        assert_eq!(
            dfa.step(0, &anything, |_| true),
            Some((1, Match::Wildcard(WildcardId(0))))
        );
        assert_eq!(dfa.step(0, &anything, |_| false), None);
    }

    #[test]
    fn test_budget() {
        let g = Glushkov::build(&Expr::seq(vec![element(1), element(2)]));
        assert!(Dfa::build(&g, 3).is_some());
        assert!(Dfa::build(&g, 2).is_none());
        assert!(Dfa::build(&g, 1).is_none());
    }

    #[test]
    fn test_step_and_loop() {
        let g = Glushkov::build(&Expr::Star(Box::new(Expr::alt(vec![element(1), element(2)]))));
        let dfa = Dfa::build(&g, 16).unwrap();
        assert!(dfa.is_accepting(0));
        let (s, m) = dfa.step(0, &input(2), |_| false).unwrap();
        assert_eq!(m, Match::Element(ElemId(2)));
        let (s, _) = dfa.step(s, &input(1), |_| false).unwrap();
        assert!(dfa.is_accepting(s));
        assert!(dfa.step(s, &input(3), |_| false).is_none());
        assert_eq!(dfa.expected(0).count(), 2);
    }
}
