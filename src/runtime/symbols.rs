//! Runtime symbol table
//!
//! Namespaces and (namespace, local) pairs are interned once at assembly
//! time. Namespace 0 is always the absent namespace.

use std::collections::HashMap;

use indexmap::IndexSet;
use serde::Serialize;

use crate::namespaces::QName;

/// Interned namespace URI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct NamespaceId(pub u32);

impl NamespaceId {
    /// The absent namespace
    pub const NONE: Self = Self(0);
    /// A namespace the schema never mentions
    pub const UNKNOWN: Self = Self(u32::MAX);
}

/// Interned (namespace, local) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SymbolId(pub u32);

/// Index of a wildcard rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct WildcardId(pub u32);

/// Interned names of one runtime schema
#[derive(Debug, Clone)]
pub struct SymbolTable {
    namespaces: IndexSet<String>,
    symbols: Vec<(NamespaceId, String)>,
    by_namespace: Vec<HashMap<String, SymbolId>>,
}

impl Default for SymbolTable {
    fn default() -> Self {
        let mut table = Self {
            namespaces: IndexSet::new(),
            symbols: Vec::new(),
            by_namespace: Vec::new(),
        };
        table.intern_namespace("");
        table
    }
}

impl SymbolTable {
    /// Create a table holding only the absent namespace
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a namespace URI
    pub fn intern_namespace(&mut self, uri: &str) -> NamespaceId {
        if let Some(index) = self.namespaces.get_index_of(uri) {
            return NamespaceId(index as u32);
        }
        self.namespaces.insert(uri.to_string());
        self.by_namespace.push(HashMap::new());
        NamespaceId(self.namespaces.len() as u32 - 1)
    }

    /// Intern a qualified name
    pub fn intern(&mut self, name: &QName) -> SymbolId {
        let ns = self.intern_namespace(&name.namespace);
        if let Some(id) = self.by_namespace[ns.0 as usize].get(name.local.as_str()) {
            return *id;
        }
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push((ns, name.local.clone()));
        self.by_namespace[ns.0 as usize].insert(name.local.clone(), id);
        id
    }

    /// Look up a namespace without interning
    pub fn namespace_id(&self, uri: &str) -> NamespaceId {
        self.namespaces
            .get_index_of(uri)
            .map_or(NamespaceId::UNKNOWN, |i| NamespaceId(i as u32))
    }

    /// Look up a name without interning
    pub fn lookup(&self, namespace: &str, local: &str) -> Option<SymbolId> {
        let ns = self.namespaces.get_index_of(namespace)?;
        self.by_namespace[ns].get(local).copied()
    }

    /// URI of a namespace
    pub fn namespace(&self, id: NamespaceId) -> Option<&str> {
        self.namespaces.get_index(id.0 as usize).map(String::as_str)
    }

    /// Namespace and local name of a symbol
    pub fn parts(&self, id: SymbolId) -> Option<(NamespaceId, &str)> {
        self.symbols
            .get(id.0 as usize)
            .map(|(ns, local)| (*ns, local.as_str()))
    }

    /// A symbol as a [`QName`]
    pub fn qname(&self, id: SymbolId) -> Option<QName> {
        let (ns, local) = self.parts(id)?;
        Some(QName::new(self.namespace(ns)?, local))
    }

    /// Number of symbols
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether no symbol is interned
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Number of namespaces, including the absent one
    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interning_is_stable() {
        let mut table = SymbolTable::new();
        let a = table.intern(&QName::new("urn:a", "x"));
        let b = table.intern(&QName::local("x"));
        assert_ne!(a, b);
        assert_eq!(table.intern(&QName::new("urn:a", "x")), a);
        assert_eq!(table.lookup("urn:a", "x"), Some(a));
        assert_eq!(table.lookup("urn:a", "y"), None);
        assert_eq!(table.qname(b), Some(QName::local("x")));
        assert_eq!(table.namespace_id(""), NamespaceId::NONE);
        assert_eq!(table.namespace_id("urn:zzz"), NamespaceId::UNKNOWN);
        assert_eq!(table.namespace_count(), 2);
    }
}
