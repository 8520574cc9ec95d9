//! Glushkov construction
//!
//! A content model is first lowered to an [`Expr`] over leaves, with
//! bounded repetition already unrolled. Every leaf becomes one position;
//! nullable, first, last, and follow sets are computed in one post-order
//! pass driven by an explicit stack.
//!
//! A repetition too large to unroll may instead be kept as a [`Counter`]
//! over the positions of a single particle. Runs then carry a repetition
//! count next to the matched positions.

use serde::Serialize;

use super::bitset::BitSet;

/// A regular expression over leaves
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr<L> {
    /// Matches only the empty sequence
    Empty,
    /// One position
    Leaf(L),
    /// Concatenation
    Seq(Vec<Expr<L>>),
    /// Alternation; an empty alternation matches nothing
    Alt(Vec<Expr<L>>),
    /// Zero or more
    Star(Box<Expr<L>>),
    /// One or more
    Plus(Box<Expr<L>>),
    /// Zero or one
    Opt(Box<Expr<L>>),
    /// Any prefix of a concatenation, the empty one included
    Prefix(Vec<Expr<L>>),
    /// Between `min` and `max` consecutive matches of a leaf alternation,
    /// tracked by a counter
    Counted {
        /// A leaf or an alternation of leaves
        inner: Box<Expr<L>>,
        /// Least number of matches
        min: u32,
        /// Greatest number of matches; `None` is unbounded
        max: Option<u32>,
    },
}

/// Bounds of a counted repetition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Counter {
    /// Least number of matches
    pub min: u32,
    /// Greatest number of matches; `None` is unbounded
    pub max: Option<u32>,
}

impl Counter {
    /// Whether another match may follow `count` matches
    pub fn may_repeat(&self, count: u32) -> bool {
        self.max.map_or(true, |max| count < max)
    }

    /// Whether the repetition may end after `count` matches
    pub fn may_leave(&self, count: u32) -> bool {
        count >= self.min
    }
}

/// Whether a run that last matched a position of counter `from`, `count`
/// times in a row, may move to a position of counter `to`
pub(crate) fn counter_admits(counters: &[Counter], from: Option<u32>, count: u32, to: Option<u32>) -> bool {
    let Some(counter) = from.and_then(|c| counters.get(c as usize)) else {
        return true;
    };
    if to == from {
        counter.may_repeat(count)
    } else {
        counter.may_leave(count)
    }
}

/// The repetition count after moving from counter `from` to counter `to`
pub(crate) fn next_count(from: Option<u32>, count: u32, to: Option<u32>) -> u32 {
    match to {
        None => 0,
        Some(_) if to == from => count.saturating_add(1),
        Some(_) => 1,
    }
}

impl<L: Clone> Expr<L> {
    /// Number of leaves
    pub fn position_count(&self) -> usize {
        let mut count = 0;
        let mut stack = vec![self];
        while let Some(expr) = stack.pop() {
            match expr {
                Expr::Empty => {}
                Expr::Leaf(_) => count += 1,
                Expr::Seq(items) | Expr::Alt(items) | Expr::Prefix(items) => stack.extend(items),
                Expr::Star(inner) | Expr::Plus(inner) | Expr::Opt(inner) => stack.push(inner),
                Expr::Counted { inner, .. } => stack.push(inner),
            }
        }
        count
    }

    /// Repeat between `min` and `max` times. Required copies are laid out
    /// in sequence; optional copies form one [`Expr::Prefix`] so the
    /// result stays deterministic without nesting.
    pub fn repeat(self, min: u32, max: Option<u32>) -> Self {
        if self.position_count() == 0 {
            // Matches only the empty sequence, or nothing at all
            return if min == 0 { Expr::Empty } else { self };
        }
        match (min, max) {
            (_, Some(0)) => Expr::Empty,
            (1, Some(1)) => self,
            (0, Some(1)) => Expr::Opt(Box::new(self)),
            (0, None) => Expr::Star(Box::new(self)),
            (min, None) => {
                let mut items: Vec<Expr<L>> = (1..min).map(|_| self.clone()).collect();
                items.push(Expr::Plus(Box::new(self)));
                Expr::seq(items)
            }
            (min, Some(max)) => {
                let optional = max.saturating_sub(min) as usize;
                let mut items: Vec<Expr<L>> = (0..min).map(|_| self.clone()).collect();
                if optional > 0 {
                    items.push(Expr::Prefix(vec![self; optional]));
                }
                Expr::seq(items)
            }
        }
    }

    /// Concatenation, collapsing trivial cases
    pub fn seq(mut items: Vec<Expr<L>>) -> Self {
        items.retain(|e| !matches!(e, Expr::Empty));
        match items.len() {
            0 => Expr::Empty,
            1 => items.pop().unwrap_or(Expr::Empty),
            _ => Expr::Seq(items),
        }
    }

    /// Alternation, collapsing a single branch
    pub fn alt(mut items: Vec<Expr<L>>) -> Self {
        if items.len() == 1 {
            items.pop().unwrap_or(Expr::Empty)
        } else {
            Expr::Alt(items)
        }
    }
}

/// A position automaton
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Glushkov<L> {
    /// Leaf of each position, in left-to-right order
    pub positions: Vec<L>,
    /// Whether the empty sequence is accepted
    pub nullable: bool,
    /// Positions that can start a match
    pub first: BitSet,
    /// Positions that can end a match
    pub last: BitSet,
    /// Positions that can follow each position
    pub follow: Vec<BitSet>,
    /// Counted repetitions
    pub counters: Vec<Counter>,
    /// Counter of each position, if any
    pub counted: Vec<Option<u32>>,
}

struct NodeSets {
    nullable: bool,
    first: BitSet,
    last: BitSet,
}

impl<L: Clone> Glushkov<L> {
    /// Build the automaton of `expr`
    pub fn build(expr: &Expr<L>) -> Self {
        let size = expr.position_count();
        let mut positions = Vec::with_capacity(size);
        let mut follow = vec![BitSet::with_capacity(size); size];
        let mut counters = Vec::new();
        let mut counted = vec![None; size];
        let mut results: Vec<NodeSets> = Vec::new();
        // The second field is the position count when a node was expanded
        let mut stack: Vec<(&Expr<L>, Option<usize>)> = vec![(expr, None)];

        while let Some((node, expanded)) = stack.pop() {
            let Some(start) = expanded else {
                stack.push((node, Some(positions.len())));
                match node {
                    Expr::Seq(items) | Expr::Alt(items) | Expr::Prefix(items) => {
                        stack.extend(items.iter().rev().map(|item| (item, None)));
                    }
                    Expr::Star(inner) | Expr::Plus(inner) | Expr::Opt(inner) => {
                        stack.push((inner, None));
                    }
                    Expr::Counted { inner, .. } => stack.push((inner, None)),
                    Expr::Empty | Expr::Leaf(_) => {}
                }
                continue;
            };
            let sets = match node {
                Expr::Empty => NodeSets {
                    nullable: true,
                    first: BitSet::default(),
                    last: BitSet::default(),
                },
                Expr::Leaf(leaf) => {
                    let position = positions.len();
                    positions.push(leaf.clone());
                    let single: BitSet = std::iter::once(position).collect();
                    NodeSets {
                        nullable: false,
                        first: single.clone(),
                        last: single,
                    }
                }
                Expr::Seq(items) | Expr::Prefix(items) => {
                    let children = results.split_off(results.len() - items.len());
                    let mut suffix_first = BitSet::default();
                    let mut suffix_nullable = true;
                    for child in children.iter().rev() {
                        for p in child.last.iter() {
                            follow[p].union_with(&suffix_first);
                        }
                        if child.nullable {
                            suffix_first.union_with(&child.first);
                        } else {
                            suffix_first = child.first.clone();
                        }
                        suffix_nullable &= child.nullable;
                    }
                    let prefix = matches!(node, Expr::Prefix(_));
                    let mut last = BitSet::default();
                    for child in children.iter().rev() {
                        last.union_with(&child.last);
                        if !child.nullable && !prefix {
                            break;
                        }
                    }
                    NodeSets {
                        nullable: suffix_nullable || prefix,
                        first: suffix_first,
                        last,
                    }
                }
                Expr::Alt(items) => {
                    let children = results.split_off(results.len() - items.len());
                    let mut sets = NodeSets {
                        nullable: false,
                        first: BitSet::default(),
                        last: BitSet::default(),
                    };
                    for child in children {
                        sets.nullable |= child.nullable;
                        sets.first.union_with(&child.first);
                        sets.last.union_with(&child.last);
                    }
                    sets
                }
                Expr::Star(_) | Expr::Plus(_) | Expr::Opt(_) => {
                    let mut child = match results.pop() {
                        Some(child) => child,
                        None => continue,
                    };
                    if !matches!(node, Expr::Opt(_)) {
                        for p in child.last.iter() {
                            follow[p].union_with(&child.first);
                        }
                    }
                    if !matches!(node, Expr::Plus(_)) {
                        child.nullable = true;
                    }
                    child
                }
                Expr::Counted { min, max, .. } => {
                    let mut child = match results.pop() {
                        Some(child) => child,
                        None => continue,
                    };
                    let id = counters.len() as u32;
                    counters.push(Counter { min: *min, max: *max });
                    for slot in &mut counted[start..positions.len()] {
                        *slot = Some(id);
                    }
                    if *max != Some(1) {
                        for p in child.last.iter() {
                            follow[p].union_with(&child.first);
                        }
                    }
                    child.nullable |= *min == 0;
                    child
                }
            };
            results.push(sets);
        }

        let root = results.pop().unwrap_or(NodeSets {
            nullable: true,
            first: BitSet::default(),
            last: BitSet::default(),
        });
        Self {
            positions,
            nullable: root.nullable,
            first: root.first,
            last: root.last,
            follow,
            counters,
            counted,
        }
    }
}

impl<L> Glushkov<L> {
    /// Number of positions
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Whether there are no positions
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Replace every leaf
    pub fn map<M, F: FnMut(&L) -> M>(&self, f: F) -> Glushkov<M> {
        Glushkov {
            positions: self.positions.iter().map(f).collect(),
            nullable: self.nullable,
            first: self.first.clone(),
            last: self.last.clone(),
            follow: self.follow.clone(),
            counters: self.counters.clone(),
            counted: self.counted.clone(),
        }
    }

    /// Whether any repetition is counted rather than unrolled
    pub fn has_counters(&self) -> bool {
        !self.counters.is_empty()
    }

    /// The sets a matcher must choose from: the first set, then each
    /// follow set
    pub fn choice_sets(&self) -> impl Iterator<Item = &BitSet> {
        std::iter::once(&self.first).chain(self.follow.iter())
    }

    /// Run the automaton over a word; used to cross-check compiled forms
    pub fn accepts<T, F: Fn(&L, &T) -> bool>(&self, word: &[T], matches: F) -> bool {
        let mut matched: Option<BitSet> = None;
        let mut count = 0;
        for symbol in word {
            let from = matched.as_ref().and_then(|set| self.counter_of(set));
            let candidates = match &matched {
                None => self.first.clone(),
                Some(set) => {
                    let mut candidates = BitSet::default();
                    for p in set.iter() {
                        candidates.union_with(&self.follow[p]);
                    }
                    candidates
                }
            };
            let next: BitSet = candidates
                .iter()
                .filter(|&p| counter_admits(&self.counters, from, count, self.counter_at(p)))
                .filter(|&p| matches(&self.positions[p], symbol))
                .collect();
            if next.is_empty() {
                return false;
            }
            count = next_count(from, count, self.counter_of(&next));
            matched = Some(next);
        }
        match matched {
            None => self.nullable,
            Some(set) => {
                let from = self.counter_of(&set);
                counter_admits(&self.counters, from, count, None)
                    && set.iter().any(|p| self.last.contains(p))
            }
        }
    }

    /// Counter of position `p`
    pub fn counter_at(&self, p: usize) -> Option<u32> {
        self.counted.get(p).copied().flatten()
    }

    fn counter_of(&self, set: &BitSet) -> Option<u32> {
        set.iter().next().and_then(|p| self.counter_at(p))
    }
}
