//! XSD Complex Type definitions
//!
//! Complex types can have element content (model groups), simple content,
//! or mixed content with both text and elements. This module holds the
//! parsed form plus the derivation-control sets shared with element
//! declarations.
//!
//! Reference: https://www.w3.org/TR/xmlschema-1/#Complex_Type_Definitions

use serde::Serialize;

use crate::error::{Error, LoadError, Result};
use crate::namespaces::QName;

use super::attributes::AttributeItem;
use super::facets::FacetSpec;
use super::particles::Particle;
use super::wildcards::Wildcard;
use super::TypeKey;

/// Derivation method for complex types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DerivationMethod {
    /// Type derived by restriction
    #[default]
    Restriction,
    /// Type derived by extension
    Extension,
}

impl DerivationMethod {
    /// Parse from an XSD element local name
    pub fn from_local_name(s: &str) -> Option<Self> {
        match s {
            "restriction" => Some(Self::Restriction),
            "extension" => Some(Self::Extension),
            _ => None,
        }
    }

    /// The matching member of a [`DerivationSet`]
    pub fn as_set(self) -> DerivationSet {
        match self {
            Self::Restriction => DerivationSet::RESTRICTION,
            Self::Extension => DerivationSet::EXTENSION,
        }
    }
}

impl std::fmt::Display for DerivationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Restriction => write!(f, "restriction"),
            Self::Extension => write!(f, "extension"),
        }
    }
}

/// A set of derivation methods, as used by `block`, `final`, and derivation
/// masks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub struct DerivationSet(u8);

impl DerivationSet {
    /// `extension`
    pub const EXTENSION: Self = Self(1);
    /// `restriction`
    pub const RESTRICTION: Self = Self(2);
    /// `substitution` (element `block` only)
    pub const SUBSTITUTION: Self = Self(4);
    /// `list` (simple type `final` only)
    pub const LIST: Self = Self(8);
    /// `union` (simple type `final` only)
    pub const UNION: Self = Self(16);

    /// Values allowed in a complex type's `block` / `final`
    pub const COMPLEX: Self = Self(1 | 2);
    /// Values allowed in an element's `block`
    pub const ELEMENT_BLOCK: Self = Self(1 | 2 | 4);
    /// Values allowed in a simple type's `final`
    pub const SIMPLE_FINAL: Self = Self(2 | 8 | 16);

    /// The empty set
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Raw bits
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether no method is in the set
    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether every method of `other` is in the set
    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Whether the sets share a method
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// Set union
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    /// Set intersection
    pub fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    /// Parse a `block` / `final` / `blockDefault` / `finalDefault` value.
    /// `#all` expands to `allowed`.
    pub fn from_attr(value: &str, allowed: Self) -> Result<Self> {
        let value = value.trim();
        if value == "#all" {
            return Ok(allowed);
        }
        let mut set = Self::empty();
        for token in value.split_whitespace() {
            let member = match token {
                "extension" => Self::EXTENSION,
                "restriction" => Self::RESTRICTION,
                "substitution" => Self::SUBSTITUTION,
                "list" => Self::LIST,
                "union" => Self::UNION,
                _ => Self::empty(),
            };
            if member.is_empty() || !allowed.contains(member) {
                return Err(Error::Load(LoadError::new(format!(
                    "invalid derivation control '{}'",
                    token
                ))));
            }
            set = set.union(member);
        }
        Ok(set)
    }
}

impl std::fmt::Display for DerivationSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names = [
            (Self::EXTENSION, "extension"),
            (Self::RESTRICTION, "restriction"),
            (Self::SUBSTITUTION, "substitution"),
            (Self::LIST, "list"),
            (Self::UNION, "union"),
        ];
        let mut first = true;
        for (member, name) in names {
            if self.contains(member) {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// Content type label for complex types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContentKind {
    /// No content (empty element)
    Empty,
    /// Simple content (text only)
    Simple,
    /// Mixed content (text and elements)
    Mixed,
    /// Element-only content
    ElementOnly,
}

impl ContentKind {
    /// Whether character data is accumulated for this content
    pub fn accepts_text(self) -> bool {
        matches!(self, ContentKind::Simple | ContentKind::Mixed)
    }
}

/// Content of a parsed complex type
#[derive(Debug, Clone, PartialEq)]
pub enum ComplexContent {
    /// Element-only, mixed, or empty content (`None` when no particle)
    Elements(Option<Particle>),
    /// `xs:simpleContent`
    Simple {
        /// Facets of a simpleContent restriction
        facets: Vec<FacetSpec>,
        /// Inline `xs:simpleType` of a simpleContent restriction
        inline: Option<TypeKey>,
    },
}

impl Default for ComplexContent {
    fn default() -> Self {
        Self::Elements(None)
    }
}

impl ComplexContent {
    /// The particle of element content
    pub fn particle(&self) -> Option<&Particle> {
        match self {
            Self::Elements(particle) => particle.as_ref(),
            Self::Simple { .. } => None,
        }
    }

    /// Whether this is simple content
    pub fn is_simple(&self) -> bool {
        matches!(self, Self::Simple { .. })
    }
}

/// A complex type definition, global or anonymous
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexTypeDef {
    /// Type name; `None` for anonymous types
    pub name: Option<QName>,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `mixed="true"` on the type or its complexContent
    pub mixed: bool,
    /// `block`
    pub block: DerivationSet,
    /// `final`
    pub final_set: DerivationSet,
    /// How the type derives from its base
    pub derivation: DerivationMethod,
    /// Base type; `None` is the implicit restriction of anyType
    pub base: Option<QName>,
    /// Content
    pub content: ComplexContent,
    /// Attribute uses and attribute group references in document order
    pub attributes: Vec<AttributeItem>,
    /// `xs:anyAttribute`
    pub any_attribute: Option<Wildcard>,
    /// Source line
    pub line: usize,
}

impl ComplexTypeDef {
    /// Display name for diagnostics and errors
    pub fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map_or_else(|| "#anonymous".to_string(), ToString::to_string)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_set_parse() {
        let set = DerivationSet::from_attr("extension restriction", DerivationSet::COMPLEX).unwrap();
        assert!(set.contains(DerivationSet::EXTENSION));
        assert!(set.contains(DerivationSet::RESTRICTION));
        assert!(!set.contains(DerivationSet::SUBSTITUTION));
        assert_eq!(
            DerivationSet::from_attr("#all", DerivationSet::ELEMENT_BLOCK).unwrap(),
            DerivationSet::ELEMENT_BLOCK
        );
        assert!(DerivationSet::from_attr("substitution", DerivationSet::COMPLEX).is_err());
        assert!(DerivationSet::from_attr("list", DerivationSet::SIMPLE_FINAL).is_ok());
        assert!(DerivationSet::from_attr("", DerivationSet::COMPLEX).unwrap().is_empty());
    }

    #[test]
    fn test_derivation_set_ops() {
        let set = DerivationSet::EXTENSION.union(DerivationSet::SUBSTITUTION);
        assert!(set.intersects(DerivationSet::ELEMENT_BLOCK));
        assert!(!set.intersects(DerivationSet::RESTRICTION));
        assert_eq!(set.to_string(), "extension substitution");
        assert_eq!(DerivationMethod::Extension.as_set(), DerivationSet::EXTENSION);
    }

    #[test]
    fn test_display_name() {
        let mut def = ComplexTypeDef::default();
        assert_eq!(def.display_name(), "#anonymous");
        def.name = Some(QName::new("urn:x", "T"));
        assert_eq!(def.display_name(), "{urn:x}T");
    }
}
