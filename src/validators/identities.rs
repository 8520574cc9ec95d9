//! XSD Identity Constraints
//!
//! This module implements identity constraints for XML Schema:
//! - xs:unique - Ensures values are unique within scope
//! - xs:key - Like unique, but all field values must be present
//! - xs:keyref - References a key/unique constraint (foreign key)
//!
//! Selector and field XPaths are restricted to the XSD 1.0 subset and are
//! compiled at parse time into step programs with prefixes already resolved.

use serde::Serialize;

use crate::error::{Error, LoadError, Result};
use crate::names::{is_valid_ncname, split_qname};
use crate::namespaces::{NamespaceContext, QName};

/// Kind of identity constraint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ConstraintKind {
    /// `xs:unique`
    Unique,
    /// `xs:key`
    Key,
    /// `xs:keyref`
    KeyRef,
}

impl ConstraintKind {
    /// Parse from an XSD element local name
    pub fn from_local_name(local: &str) -> Option<Self> {
        match local {
            "unique" => Some(Self::Unique),
            "key" => Some(Self::Key),
            "keyref" => Some(Self::KeyRef),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConstraintKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unique => write!(f, "unique"),
            Self::Key => write!(f, "key"),
            Self::KeyRef => write!(f, "keyref"),
        }
    }
}

/// A node test of one location step
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum NameTest {
    /// `*`
    Any,
    /// `prefix:*`
    Namespace(String),
    /// A resolved name
    Name(QName),
}

impl NameTest {
    fn parse(token: &str, namespaces: &NamespaceContext) -> Result<Self> {
        if token == "*" {
            return Ok(Self::Any);
        }
        if let Some(prefix) = token.strip_suffix(":*") {
            let ns = namespaces
                .get_namespace(prefix)
                .ok_or_else(|| path_error(token, "unbound prefix"))?;
            return Ok(Self::Namespace(ns.to_string()));
        }
        let (prefix, local) = split_qname(token);
        if !is_valid_ncname(local) {
            return Err(path_error(token, "invalid name test"));
        }
        match prefix {
            // Unprefixed names in identity-constraint paths are unqualified
            "" => Ok(Self::Name(QName::local(local))),
            prefix => {
                let ns = namespaces
                    .get_namespace(prefix)
                    .ok_or_else(|| path_error(token, "unbound prefix"))?;
                Ok(Self::Name(QName::new(ns, local)))
            }
        }
    }

    /// Whether a name passes the test
    pub fn matches(&self, name: &QName) -> bool {
        match self {
            Self::Any => true,
            Self::Namespace(ns) => &name.namespace == ns,
            Self::Name(expected) => expected == name,
        }
    }
}

/// One alternative of a selector or field expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    /// Leading `.//`
    pub descendant: bool,
    /// Element steps (`.` steps are dropped)
    pub steps: Vec<NameTest>,
    /// Trailing `@name` step of a field
    pub attribute: Option<NameTest>,
}

impl Path {
    /// Whether an element reached through `relative` (the element names below
    /// the constraint's scope element, outermost first) is selected
    pub fn matches_elements(&self, relative: &[&QName]) -> bool {
        if self.steps.is_empty() {
            return relative.is_empty() || self.descendant;
        }
        if self.descendant {
            if relative.len() < self.steps.len() {
                return false;
            }
            let tail = &relative[relative.len() - self.steps.len()..];
            self.steps.iter().zip(tail).all(|(test, name)| test.matches(name))
        } else {
            relative.len() == self.steps.len()
                && self.steps.iter().zip(relative).all(|(test, name)| test.matches(name))
        }
    }
}

/// A compiled selector or field expression
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathExpr {
    /// The expression as written
    pub source: String,
    /// `|`-separated alternatives
    pub alternatives: Vec<Path>,
}

impl PathExpr {
    /// Compile a selector (`field = false`) or field expression
    pub fn parse(source: &str, field: bool, namespaces: &NamespaceContext) -> Result<Self> {
        let mut alternatives = Vec::new();
        for alternative in source.split('|') {
            alternatives.push(parse_path(alternative.trim(), field, namespaces)?);
        }
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// Whether any alternative selects a trailing attribute
    pub fn selects_attribute(&self) -> bool {
        self.alternatives.iter().any(|p| p.attribute.is_some())
    }
}

fn path_error(path: &str, message: &str) -> Error {
    Error::Load(LoadError::new(format!("invalid XPath '{}': {}", path, message)))
}

fn parse_path(path: &str, field: bool, namespaces: &NamespaceContext) -> Result<Path> {
    if path.is_empty() {
        return Err(path_error(path, "empty expression"));
    }
    let (descendant, rest) = match path.strip_prefix(".//") {
        Some(rest) => (true, rest),
        None => (false, path),
    };
    let raw_steps: Vec<&str> = rest.split('/').map(str::trim).collect();
    let mut steps = Vec::new();
    let mut attribute = None;
    for (i, step) in raw_steps.iter().enumerate() {
        let last = i + 1 == raw_steps.len();
        if step.is_empty() {
            return Err(path_error(path, "empty location step"));
        }
        let attr_step = step
            .strip_prefix('@')
            .or_else(|| step.strip_prefix("attribute::"));
        if let Some(name) = attr_step {
            if !field || !last {
                return Err(path_error(path, "attribute step only allowed at the end of a field"));
            }
            attribute = Some(NameTest::parse(name.trim(), namespaces)?);
            continue;
        }
        if *step == "." {
            continue;
        }
        let name = step.strip_prefix("child::").unwrap_or(step);
        steps.push(NameTest::parse(name.trim(), namespaces)?);
    }
    if descendant && steps.is_empty() && attribute.is_none() {
        return Err(path_error(path, "'.//' must be followed by a step"));
    }
    Ok(Path {
        descendant,
        steps,
        attribute,
    })
}

/// A parsed `xs:unique`, `xs:key`, or `xs:keyref`
#[derive(Debug, Clone, PartialEq)]
pub struct IdentityConstraint {
    /// Constraint name (qualified with the target namespace)
    pub name: QName,
    /// Kind
    pub kind: ConstraintKind,
    /// `xs:selector/@xpath`
    pub selector: PathExpr,
    /// `xs:field/@xpath`, in order
    pub fields: Vec<PathExpr>,
    /// `keyref/@refer`
    pub refer: Option<QName>,
    /// Source line
    pub line: usize,
}
