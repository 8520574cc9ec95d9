//! XML namespace handling
//!
//! Qualified names, well-known namespace URIs, and a scoped prefix context
//! used both while reading schema documents and while streaming instances.

use serde::{Deserialize, Serialize};
use std::fmt;

/// XSD 1.0 namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML Schema instance namespace (`xsi:type`, `xsi:nil`, …)
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// XML namespace, implicitly bound to the `xml` prefix
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace, implicitly bound to the `xmlns` prefix
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Qualified name: a `(namespace URI, local name)` pair
///
/// The empty namespace string stands for "no namespace". An unnamed
/// component is represented as `Option<QName>::None`, never as a QName with
/// an empty local part. Ordering is lexicographic on namespace, then local.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct QName {
    /// Namespace URI, empty for no namespace
    pub namespace: String,
    /// Local name
    pub local: String,
}

impl QName {
    /// Create a new QName
    pub fn new(namespace: impl Into<String>, local: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            local: local.into(),
        }
    }

    /// Create a QName in no namespace
    pub fn local(local: impl Into<String>) -> Self {
        Self::new(String::new(), local)
    }

    /// Create a QName in the XSD namespace
    pub fn xsd(local: impl Into<String>) -> Self {
        Self::new(XSD_NAMESPACE, local)
    }

    /// Whether the name has a namespace
    pub fn is_namespaced(&self) -> bool {
        !self.namespace.is_empty()
    }

    /// Whether the name lives in the XSD namespace
    pub fn is_xsd(&self) -> bool {
        self.namespace == XSD_NAMESPACE
    }
}

impl fmt::Display for QName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.namespace.is_empty() {
            f.write_str(&self.local)
        } else {
            write!(f, "{{{}}}{}", self.namespace, self.local)
        }
    }
}

/// Scoped prefix-to-namespace bindings
///
/// Bindings are pushed in scopes that mirror element nesting. The default
/// namespace is stored under the empty prefix; binding it to `""` undeclares
/// it.
#[derive(Debug, Clone)]
pub struct NamespaceContext {
    bindings: Vec<(String, String)>,
    scopes: Vec<usize>,
}

impl NamespaceContext {
    /// Create a context with only the `xml` and `xmlns` prefixes bound
    pub fn new() -> Self {
        Self {
            bindings: vec![
                ("xml".to_string(), XML_NAMESPACE.to_string()),
                ("xmlns".to_string(), XMLNS_NAMESPACE.to_string()),
            ],
            scopes: Vec::new(),
        }
    }

    /// Open a new scope
    pub fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    /// Close the innermost scope, dropping its bindings
    pub fn pop_scope(&mut self) {
        if let Some(mark) = self.scopes.pop() {
            self.bindings.truncate(mark);
        }
    }

    /// Bind a prefix in the innermost scope
    pub fn add_prefix(&mut self, prefix: impl Into<String>, namespace: impl Into<String>) {
        self.bindings.push((prefix.into(), namespace.into()));
    }

    /// Get the namespace bound to a prefix (`""` asks for the default)
    pub fn get_namespace(&self, prefix: &str) -> Option<&str> {
        self.bindings
            .iter()
            .rev()
            .find(|(p, _)| p == prefix)
            .map(|(_, ns)| ns.as_str())
    }

    /// The in-scope default namespace, empty when none
    pub fn default_namespace(&self) -> &str {
        self.get_namespace("").unwrap_or("")
    }

    /// Resolve a lexical QName, applying the default namespace to unprefixed
    /// names. Returns `None` when the prefix is unbound.
    pub fn resolve(&self, lexical: &str) -> Option<QName> {
        match lexical.split_once(':') {
            Some((prefix, local)) => self
                .get_namespace(prefix)
                .map(|ns| QName::new(ns, local)),
            None => Some(QName::new(self.default_namespace(), lexical)),
        }
    }

    /// Resolve a prefix/local pair taken from an element tag
    pub fn resolve_element(&self, prefix: &str, local: &str) -> Option<QName> {
        if prefix.is_empty() {
            return Some(QName::new(self.default_namespace(), local));
        }
        self.get_namespace(prefix).map(|ns| QName::new(ns, local))
    }

    /// Resolve a prefix/local pair taken from an attribute name; unprefixed
    /// attributes are in no namespace
    pub fn resolve_attribute(&self, prefix: &str, local: &str) -> Option<QName> {
        if prefix.is_empty() {
            Some(QName::local(local))
        } else {
            self.get_namespace(prefix).map(|ns| QName::new(ns, local))
        }
    }

    /// Flattened in-scope bindings, innermost binding per prefix
    pub fn in_scope(&self) -> Vec<(String, String)> {
        let mut out: Vec<(String, String)> = Vec::new();
        for (prefix, ns) in self.bindings.iter().rev() {
            if !out.iter().any(|(p, _)| p == prefix) {
                out.push((prefix.clone(), ns.clone()));
            }
        }
        out.reverse();
        out
    }

    /// Drop every scope and binding except the built-in ones
    pub fn clear(&mut self) {
        self.bindings.truncate(2);
        self.scopes.clear();
    }
}

impl Default for NamespaceContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qname_ordering() {
        let a = QName::new("urn:a", "z");
        let b = QName::new("urn:b", "a");
        let c = QName::local("m");
        assert!(c < a);
        assert!(a < b);
    }

    #[test]
    fn test_qname_display() {
        assert_eq!(QName::new("urn:x", "e").to_string(), "{urn:x}e");
        assert_eq!(QName::local("e").to_string(), "e");
    }

    #[test]
    fn test_scoped_bindings() {
        let mut ctx = NamespaceContext::new();
        ctx.push_scope();
        ctx.add_prefix("p", "urn:outer");
        ctx.push_scope();
        ctx.add_prefix("p", "urn:inner");
        assert_eq!(ctx.get_namespace("p"), Some("urn:inner"));
        ctx.pop_scope();
        assert_eq!(ctx.get_namespace("p"), Some("urn:outer"));
        ctx.pop_scope();
        assert_eq!(ctx.get_namespace("p"), None);
        assert_eq!(ctx.get_namespace("xml"), Some(XML_NAMESPACE));
    }

    #[test]
    fn test_resolve_default_namespace() {
        let mut ctx = NamespaceContext::new();
        ctx.push_scope();
        ctx.add_prefix("", "urn:d");
        assert_eq!(ctx.resolve("e"), Some(QName::new("urn:d", "e")));
        assert_eq!(
            ctx.resolve_attribute("", "a"),
            Some(QName::local("a"))
        );
        assert_eq!(ctx.resolve("q:e"), None);
    }

    #[test]
    fn test_undeclare_default() {
        let mut ctx = NamespaceContext::new();
        ctx.push_scope();
        ctx.add_prefix("", "urn:d");
        ctx.push_scope();
        ctx.add_prefix("", "");
        assert_eq!(ctx.default_namespace(), "");
    }
}
