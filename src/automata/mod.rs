//! Content-model automata
//!
//! Content models are compiled through a Glushkov position automaton into
//! one of three runtime forms:
//! - a [`Dfa`] when subset construction stays within the state budget,
//! - an [`Nfa`] over the same positions otherwise,
//! - an [`AllModel`] for `xs:all` groups.
//!
//! All three live in one [`Models`] bundle addressed by [`ModelRef`].

pub mod all;
pub mod bitset;
pub mod dfa;
pub mod glushkov;
pub mod nfa;

use serde::Serialize;

use crate::runtime::symbols::{NamespaceId, SymbolId, WildcardId};
use crate::validators::ElemId;

pub use all::{AllMember, AllModel, AllStep};
pub use bitset::{BitBlob, BitSet, BitsRef};
pub use dfa::{Dfa, DfaState, Transition, WildcardEdge};
pub use glushkov::{Counter, Expr, Glushkov};
pub use nfa::{Nfa, NfaState};

/// What a position accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Matcher {
    /// One element name, validated against `elem`
    Element {
        /// Element name
        symbol: SymbolId,
        /// Declaration
        elem: ElemId,
    },
    /// Any name admitted by a wildcard rule
    Wildcard {
        /// Wildcard rule
        rule: WildcardId,
    },
}

/// A child element as seen by an automaton
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Input {
    /// Interned name; `None` when the schema never mentions it
    pub symbol: Option<SymbolId>,
    /// Namespace of the name
    pub namespace: NamespaceId,
}

/// What matched a child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Match {
    /// An element position
    Element(ElemId),
    /// A wildcard position
    Wildcard(WildcardId),
}

/// Reference to a compiled content model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ModelRef {
    /// Index into [`Models::dfas`]
    Dfa(u32),
    /// Index into [`Models::nfas`]
    Nfa(u32),
    /// Index into [`Models::alls`]
    All(u32),
}

/// Every compiled content model of a schema
#[derive(Debug, Clone, Default, Serialize)]
pub struct Models {
    /// Deterministic models
    pub dfas: Vec<Dfa>,
    /// Models kept as position automata
    pub nfas: Vec<Nfa>,
    /// All-group models
    pub alls: Vec<AllModel>,
    /// Packed sets used by the NFAs
    #[serde(skip)]
    pub bits: BitBlob,
}

impl Models {
    /// Create an empty bundle
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile a position automaton, falling back to an NFA when more than
    /// `max_states` DFA states would be needed or a repetition is counted
    pub fn compile(&mut self, automaton: &Glushkov<Matcher>, max_states: usize) -> ModelRef {
        match Dfa::build(automaton, max_states) {
            Some(dfa) => {
                self.dfas.push(dfa);
                ModelRef::Dfa(self.dfas.len() as u32 - 1)
            }
            None => {
                if automaton.has_counters() {
                    tracing::debug!(
                        positions = automaton.len(),
                        counters = automaton.counters.len(),
                        "counted repetition, keeping content model as NFA"
                    );
                } else {
                    tracing::debug!(
                        positions = automaton.len(),
                        max_states,
                        "state budget exceeded, keeping content model as NFA"
                    );
                }
                let nfa = Nfa::build(automaton, &mut self.bits);
                self.nfas.push(nfa);
                ModelRef::Nfa(self.nfas.len() as u32 - 1)
            }
        }
    }

    /// Add an all-group model
    pub fn add_all(&mut self, model: AllModel) -> ModelRef {
        self.alls.push(model);
        ModelRef::All(self.alls.len() as u32 - 1)
    }

    /// A DFA by index
    pub fn dfa(&self, index: u32) -> Option<&Dfa> {
        self.dfas.get(index as usize)
    }

    /// An NFA by index
    pub fn nfa(&self, index: u32) -> Option<&Nfa> {
        self.nfas.get(index as usize)
    }

    /// An all-group model by index
    pub fn all(&self, index: u32) -> Option<&AllModel> {
        self.alls.get(index as usize)
    }

    /// Total number of compiled models
    pub fn len(&self) -> usize {
        self.dfas.len() + self.nfas.len() + self.alls.len()
    }

    /// Whether no model has been compiled
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
