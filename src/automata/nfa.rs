//! Position automaton kept as-is
//!
//! Used when determinization would exceed the state budget. The start,
//! accept, and follow sets live in the shared bit blob; a run carries the
//! set of positions matched by the last child. Content models with counted
//! repetitions always take this form, and their runs also carry how many
//! times in a row the current counter has matched.

use serde::Serialize;

use super::bitset::{width_for, BitBlob, BitSet, BitsRef};
use super::glushkov::{counter_admits, next_count, Counter, Glushkov};
use super::{Input, Match, Matcher};
use crate::runtime::symbols::WildcardId;

/// A nondeterministic content model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Nfa {
    /// Positions that may match the first child
    pub start: BitsRef,
    /// Positions that may match the last child
    pub accept: BitsRef,
    /// Follow set of each position
    pub follow: Vec<BitsRef>,
    /// Matcher of each position
    pub matchers: Vec<Matcher>,
    /// Whether no children at all is accepted
    pub nullable: bool,
    /// Counted repetitions
    pub counters: Vec<Counter>,
    /// Counter of each position, if any
    pub counted: Vec<Option<u32>>,
}

/// Run state of an [`Nfa`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NfaState {
    started: bool,
    current: BitSet,
    count: u32,
}

impl NfaState {
    /// Consecutive matches of the current counter
    pub fn count(&self) -> u32 {
        self.count
    }
}

impl Nfa {
    /// Store `automaton`'s sets in `blob`
    pub fn build(automaton: &Glushkov<Matcher>, blob: &mut BitBlob) -> Nfa {
        let width = width_for(automaton.len());
        let start = blob.push(&automaton.first, width);
        let accept = blob.push(&automaton.last, width);
        let follow = automaton
            .follow
            .iter()
            .map(|set| blob.push(set, width))
            .collect();
        Nfa {
            start,
            accept,
            follow,
            matchers: automaton.positions.clone(),
            nullable: automaton.nullable,
            counters: automaton.counters.clone(),
            counted: automaton.counted.clone(),
        }
    }

    fn counter_at(&self, p: usize) -> Option<u32> {
        self.counted.get(p).copied().flatten()
    }

    fn counter_of(&self, set: &BitSet) -> Option<u32> {
        set.iter().next().and_then(|p| self.counter_at(p))
    }

    /// Whether a run may end in `state`
    pub fn is_accepting(&self, state: &NfaState, blob: &BitBlob) -> bool {
        if !state.started {
            return self.nullable;
        }
        let from = self.counter_of(&state.current);
        counter_admits(&self.counters, from, state.count, None)
            && state.current.iter().any(|p| blob.contains(self.accept, p))
    }

    /// Follow positions of `state` that its counter still admits
    fn candidates(&self, state: &NfaState, blob: &BitBlob) -> BitSet {
        if !state.started {
            return BitSet::from_words(blob.words(self.start));
        }
        let mut candidates = BitSet::default();
        for p in state.current.iter() {
            if let Some(follow) = self.follow.get(p) {
                candidates.union_with(&BitSet::from_words(blob.words(*follow)));
            }
        }
        if self.counters.is_empty() {
            return candidates;
        }
        let from = self.counter_of(&state.current);
        candidates
            .iter()
            .filter(|&p| counter_admits(&self.counters, from, state.count, self.counter_at(p)))
            .collect()
    }

    /// Advance on one child element. The reported match is that of the
    /// lowest matching position.
    pub fn step<F>(&self, state: &NfaState, input: &Input, blob: &BitBlob, admits: F) -> Option<(NfaState, Match)>
    where
        F: Fn(WildcardId) -> bool,
    {
        let mut matched = None;
        let mut next = BitSet::default();
        for p in self.candidates(state, blob).iter() {
            let hit = match self.matchers[p] {
                Matcher::Element { symbol, elem } => {
                    (input.symbol == Some(symbol)).then_some(Match::Element(elem))
                }
                Matcher::Wildcard { rule } => admits(rule).then_some(Match::Wildcard(rule)),
            };
            if let Some(hit) = hit {
                next.insert(p);
                matched.get_or_insert(hit);
            }
        }
        let from = self.counter_of(&state.current);
        matched.map(|m| {
            let count = next_count(from, state.count, self.counter_of(&next));
            (
                NfaState {
                    started: true,
                    current: next,
                    count,
                },
                m,
            )
        })
    }

    /// Matchers that may come next
    pub fn expected(&self, state: &NfaState, blob: &BitBlob) -> Vec<Matcher> {
        self.candidates(state, blob)
            .iter()
            .map(|p| self.matchers[p])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::automata::glushkov::Expr;
    use crate::runtime::symbols::{NamespaceId, SymbolId};
    use crate::validators::ElemId;

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
    fn test_sequence_run() {
        let g = Glushkov::build(&Expr::seq(vec![element(1), element(2)]));
        let mut blob = BitBlob::new();
        let nfa = Nfa::build(&g, &mut blob);
        assert_eq!(nfa.matchers.len(), 2);
        assert!(blob.iter(nfa.start).next().is_some());

        let state = NfaState::default();
        assert!(!nfa.is_accepting(&state, &blob));
        assert!(nfa.step(&state, &input(2), &blob, |_| false).is_none());
        let (state, m) = nfa.step(&state, &input(1), &blob, |_| false).unwrap();
        assert_eq!(m, Match::Element(ElemId(1)));
        assert!(!nfa.is_accepting(&state, &blob));
        let (state, _) = nfa.step(&state, &input(2), &blob, |_| false).unwrap();
        assert!(nfa.is_accepting(&state, &blob));
        assert!(nfa.expected(&state, &blob).is_empty());
    }

    #[test]
    fn test_nullable_and_wildcard() {
        let g = Glushkov::build(&Expr::Star(Box::new(Expr::Leaf(Matcher::Wildcard {
            rule: WildcardId(4),
        }))));
        let mut blob = BitBlob::new();
        let nfa = Nfa::build(&g, &mut blob);
        let state = NfaState::default();
        assert!(nfa.is_accepting(&state, &blob));
        let (state, m) = nfa.step(&state, &input(9), &blob, |r| r == WildcardId(4)).unwrap();
        assert_eq!(m, Match::Wildcard(WildcardId(4)));
        assert!(nfa.is_accepting(&state, &blob));
    }

    #[test]
    fn test_counted_run() {
        let g = Glushkov::build(&Expr::seq(vec![
            Expr::Counted {
                inner: Box::new(element(1)),
                min: 2,
                max: Some(5_000),
            },
            element(2),
        ]));
        let mut blob = BitBlob::new();
        let nfa = Nfa::build(&g, &mut blob);
        assert_eq!(nfa.matchers.len(), 2);

        let (state, _) = nfa.step(&NfaState::default(), &input(1), &blob, |_| false).unwrap();
        assert_eq!(state.count(), 1);
        assert!(nfa.step(&state, &input(2), &blob, |_| false).is_none());
        assert_eq!(nfa.expected(&state, &blob).len(), 1);

        let mut state = state;
        for _ in 0..4_999 {
            state = nfa.step(&state, &input(1), &blob, |_| false).unwrap().0;
        }
        assert_eq!(state.count(), 5_000);
        assert!(nfa.step(&state, &input(1), &blob, |_| false).is_none());
        let (state, _) = nfa.step(&state, &input(2), &blob, |_| false).unwrap();
        assert_eq!(state.count(), 0);
        assert!(nfa.is_accepting(&state, &blob));
    }
}
