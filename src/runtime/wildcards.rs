//! Encoded wildcard rules
//!
//! Each rule keeps its namespace constraint as a kind plus a slice of the
//! schema-wide namespace array: the excluded namespace for `##other`, the
//! sorted members for an enumeration.

use serde::Serialize;

use super::symbols::{NamespaceId, SymbolTable};
use crate::validators::{NamespaceConstraint, ProcessContents, Wildcard};

/// Shape of a namespace constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WildcardKind {
    /// `##any`
    Any,
    /// `##other`: any namespace except the slice's one, and not absent
    Other,
    /// Exactly the namespaces of the slice
    Enumeration,
    /// Any namespace but absent
    NotAbsent,
}

/// One wildcard rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct WildcardRule {
    /// Constraint shape
    pub kind: WildcardKind,
    /// Whether the excluded or enumerated namespaces include a target
    /// namespace
    pub has_target: bool,
    /// Whether the absent namespace is enumerated
    pub has_local: bool,
    /// First entry in the namespace array
    pub offset: u32,
    /// Number of entries
    pub len: u32,
    /// Process contents
    pub process_contents: ProcessContents,
}

impl WildcardRule {
    /// Encode `wildcard`, appending its namespaces to `table`
    pub fn encode(wildcard: &Wildcard, symbols: &mut SymbolTable, table: &mut Vec<NamespaceId>) -> Self {
        let offset = table.len() as u32;
        let (kind, has_local) = match &wildcard.namespaces {
            NamespaceConstraint::Any => (WildcardKind::Any, false),
            NamespaceConstraint::NotAbsent => (WildcardKind::NotAbsent, false),
            NamespaceConstraint::Other(target) => {
                table.push(symbols.intern_namespace(target));
                (WildcardKind::Other, false)
            }
            NamespaceConstraint::Enumeration(members) => {
                let mut ids: Vec<NamespaceId> =
                    members.iter().map(|ns| symbols.intern_namespace(ns)).collect();
                ids.sort();
                ids.dedup();
                table.extend(ids);
                (
                    WildcardKind::Enumeration,
                    members.iter().any(String::is_empty),
                )
            }
        };
        let len = table.len() as u32 - offset;
        let has_target = table[offset as usize..].iter().any(|ns| *ns != NamespaceId::NONE);
        Self {
            kind,
            has_target,
            has_local,
            offset,
            len,
            process_contents: wildcard.process_contents,
        }
    }

    /// Whether a child in `namespace` is admitted
    pub fn admits(&self, namespace: NamespaceId, table: &[NamespaceId]) -> bool {
        let start = self.offset as usize;
        let slice = table.get(start..start + self.len as usize).unwrap_or(&[]);
        match self.kind {
            WildcardKind::Any => true,
            WildcardKind::NotAbsent => namespace != NamespaceId::NONE,
            WildcardKind::Other => namespace != NamespaceId::NONE && !slice.contains(&namespace),
            WildcardKind::Enumeration => slice.binary_search(&namespace).is_ok(),
        }
    }
}
