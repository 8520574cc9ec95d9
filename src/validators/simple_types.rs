//! XSD Simple Types
//!
//! Two halves live here:
//! - the parsed definition ([`SimpleTypeDef`]) produced by the schema parser
//! - the runtime text validators ([`TextValidator`]) that the assembler
//!   derives from it, addressed by [`ValidatorId`] in a [`ValidatorTable`]
//!
//! See: https://www.w3.org/TR/xmlschema-2/

use serde::Serialize;

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};

use super::builtins::{Builtin, Value, ValueKind};
use super::complex_types::DerivationSet;
use super::elements::TypeUse;
use super::facets::{parse_with_builtin, FacetKind, FacetSet, FacetSpec, WhiteSpace};

// =============================================================================
// Parsed definitions
// =============================================================================

/// Variety of a parsed simple type
#[derive(Debug, Clone, PartialEq)]
pub enum SimpleVariety {
    /// `xs:restriction` of a base with facets
    Restriction {
        /// Base type
        base: TypeUse,
        /// Facets in document order
        facets: Vec<FacetSpec>,
    },
    /// `xs:list`
    List {
        /// Item type
        item: TypeUse,
    },
    /// `xs:union`
    Union {
        /// Member types, `memberTypes` first then inline members
        members: Vec<TypeUse>,
    },
}

/// A simple type definition, global or anonymous
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTypeDef {
    /// Type name; `None` for anonymous types
    pub name: Option<QName>,
    /// `final` derivations
    pub final_set: DerivationSet,
    /// How the type is built
    pub variety: SimpleVariety,
    /// Source line
    pub line: usize,
}

impl SimpleTypeDef {
    /// Every type this definition depends on, in document order
    pub fn dependencies(&self) -> Vec<&TypeUse> {
        match &self.variety {
            SimpleVariety::Restriction { base, .. } => vec![base],
            SimpleVariety::List { item } => vec![item],
            SimpleVariety::Union { members } => members.iter().collect(),
        }
    }
}

// =============================================================================
// Runtime validators
// =============================================================================

/// Index of a text validator in the runtime schema
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ValidatorId(pub u32);

impl ValidatorId {
    /// Array index
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Shape of a text validator
#[derive(Debug, Clone, PartialEq)]
pub enum TextVariety {
    /// A single value of a built-in primitive or derived type
    Atomic(Builtin),
    /// White-space separated items
    List(ValidatorId),
    /// First matching member wins
    Union(Vec<ValidatorId>),
}

/// Validator for element text and attribute values
#[derive(Debug, Clone)]
pub struct TextValidator {
    /// Name of the type this validator was built for
    pub name: Option<QName>,
    /// Variety
    pub variety: TextVariety,
    /// White-space normalization applied first
    pub whitespace: WhiteSpace,
    /// Effective facets
    pub facets: FacetSet,
}

impl TextValidator {
    /// The underlying built-in of an atomic validator
    pub fn atomic(&self) -> Option<Builtin> {
        match self.variety {
            TextVariety::Atomic(builtin) => Some(builtin),
            _ => None,
        }
    }

    /// Whether this is a list validator
    pub fn is_list(&self) -> bool {
        matches!(self.variety, TextVariety::List(_))
    }

    fn value_kind(&self) -> ValueKind {
        match self.variety {
            TextVariety::Atomic(builtin) => builtin.value_kind(),
            TextVariety::List(_) => ValueKind::String,
            TextVariety::Union(_) => ValueKind::Any,
        }
    }
}

/// All text validators of a runtime schema
#[derive(Debug, Clone, Default)]
pub struct ValidatorTable {
    validators: Vec<TextValidator>,
}

impl ValidatorTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of validators
    pub fn len(&self) -> usize {
        self.validators.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.validators.is_empty()
    }

    /// Look up a validator
    pub fn get(&self, id: ValidatorId) -> Option<&TextValidator> {
        self.validators.get(id.index())
    }

    /// Iterate in ID order
    pub fn iter(&self) -> impl Iterator<Item = (ValidatorId, &TextValidator)> {
        self.validators
            .iter()
            .enumerate()
            .map(|(i, v)| (ValidatorId(i as u32), v))
    }

    fn push(&mut self, validator: TextValidator) -> ValidatorId {
        self.validators.push(validator);
        ValidatorId(self.validators.len() as u32 - 1)
    }

    fn require(&self, id: ValidatorId) -> Result<&TextValidator> {
        self.get(id)
            .ok_or_else(|| Error::structural(format!("unknown text validator {}", id.0)))
    }

    /// Add the validator of a built-in simple type. List built-ins need the
    /// validator of their item type.
    pub fn add_builtin(&mut self, builtin: Builtin, item: Option<ValidatorId>) -> ValidatorId {
        let variety = match item {
            Some(item) if builtin.list_item().is_some() => TextVariety::List(item),
            _ => TextVariety::Atomic(builtin),
        };
        self.push(TextValidator {
            name: Some(builtin.qname()),
            variety,
            whitespace: builtin.whitespace(),
            facets: FacetSet::default(),
        })
    }

    /// Derive by restriction
    pub fn restrict(
        &mut self,
        base: ValidatorId,
        name: Option<QName>,
        facets: &[FacetSpec],
    ) -> Result<ValidatorId> {
        let base = self.require(base)?.clone();
        let mut whitespace = base.whitespace;
        for facet in facets.iter().filter(|f| f.kind == FacetKind::WhiteSpace) {
            let requested = WhiteSpace::parse(&facet.value)?;
            if requested < base.whitespace {
                return Err(Error::derivation(format!(
                    "whiteSpace '{}' is weaker than the base type's",
                    facet.value
                )));
            }
            whitespace = requested;
        }
        if let TextVariety::Union(_) = base.variety {
            if let Some(facet) = facets
                .iter()
                .find(|f| !matches!(f.kind, FacetKind::Pattern | FacetKind::Enumeration))
            {
                return Err(Error::derivation(format!(
                    "facet {} is not applicable to a union type",
                    facet.kind
                )));
            }
        }
        let kind = base.value_kind();
        let facets = match base.variety {
            TextVariety::Atomic(builtin) => base
                .facets
                .restrict(facets, kind, false, |v| parse_with_builtin(builtin, v))?,
            TextVariety::List(_) => base.facets.restrict(facets, kind, true, |_| Ok(None))?,
            TextVariety::Union(_) => base.facets.restrict(facets, kind, false, |_| Ok(None))?,
        };
        Ok(self.push(TextValidator {
            name,
            variety: base.variety,
            whitespace,
            facets,
        }))
    }

    /// Derive a list of `item`
    pub fn list(&mut self, name: Option<QName>, item: ValidatorId) -> Result<ValidatorId> {
        let item_validator = self.require(item)?;
        let nested_list = match &item_validator.variety {
            TextVariety::List(_) => true,
            TextVariety::Union(members) => members
                .iter()
                .any(|m| self.get(*m).map_or(false, TextValidator::is_list)),
            TextVariety::Atomic(_) => false,
        };
        if nested_list {
            return Err(Error::derivation("the item type of a list cannot be a list"));
        }
        Ok(self.push(TextValidator {
            name,
            variety: TextVariety::List(item),
            whitespace: WhiteSpace::Collapse,
            facets: FacetSet::default(),
        }))
    }

    /// Derive a union of `members`
    pub fn union(&mut self, name: Option<QName>, members: Vec<ValidatorId>) -> Result<ValidatorId> {
        if members.is_empty() {
            return Err(Error::structural("a union needs at least one member type"));
        }
        for &member in &members {
            self.require(member)?;
        }
        Ok(self.push(TextValidator {
            name,
            variety: TextVariety::Union(members),
            whitespace: WhiteSpace::Collapse,
            facets: FacetSet::default(),
        }))
    }

    /// Validate raw text, returning its normalized form. QName values are
    /// checked against the namespaces in scope.
    pub fn validate(
        &self,
        id: ValidatorId,
        raw: &str,
        namespaces: &NamespaceContext,
    ) -> std::result::Result<String, String> {
        let validator = self
            .get(id)
            .ok_or_else(|| format!("unknown text validator {}", id.0))?;
        let normalized = validator.whitespace.normalize(raw);
        match &validator.variety {
            TextVariety::Atomic(builtin) => {
                let value = builtin.parse(&normalized)?;
                if builtin.value_kind() == ValueKind::QName && namespaces.resolve(&normalized).is_none() {
                    return Err(format!("prefix of '{}' is not bound", normalized));
                }
                let length = atomic_length(*builtin, &normalized, &value);
                validator.facets.check(&normalized, Some(&value), length)?;
            }
            TextVariety::List(item) => {
                let mut count = 0;
                for token in normalized.split(' ').filter(|t| !t.is_empty()) {
                    self.validate(*item, token, namespaces)?;
                    count += 1;
                }
                validator.facets.check(&normalized, None, Some(count))?;
            }
            TextVariety::Union(members) => {
                let matched = members
                    .iter()
                    .any(|m| self.validate(*m, raw, namespaces).is_ok());
                if !matched {
                    return Err(format!(
                        "'{}' is not valid for any member of the union",
                        normalized
                    ));
                }
                validator.facets.check(&normalized, None, None)?;
            }
        }
        Ok(normalized)
    }
}

fn atomic_length(builtin: Builtin, normalized: &str, value: &Value) -> Option<usize> {
    match (builtin.value_kind(), value) {
        (ValueKind::Binary, Value::Binary(bytes)) => Some(bytes.len()),
        (ValueKind::String | ValueKind::Uri | ValueKind::Any, _) => Some(normalized.chars().count()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table_with(builtin: Builtin) -> (ValidatorTable, ValidatorId) {
        let mut table = ValidatorTable::new();
        let id = table.add_builtin(builtin, None);
        (table, id)
    }

    fn facet(kind: FacetKind, value: &str) -> FacetSpec {
        FacetSpec::new(kind, value)
    }

    #[test]
    fn test_builtin_validation() {
        let (table, id) = table_with(Builtin::Int);
        let ns = NamespaceContext::new();
        assert_eq!(table.validate(id, " 42\n", &ns).unwrap(), "42");
        assert!(table.validate(id, "x", &ns).is_err());
    }

    #[test]
    fn test_restriction_chain() {
        let (mut table, base) = table_with(Builtin::String);
        let short = table
            .restrict(base, None, &[facet(FacetKind::MaxLength, "3")])
            .unwrap();
        let code = table
            .restrict(short, None, &[facet(FacetKind::Pattern, "[A-Z]+")])
            .unwrap();
        let ns = NamespaceContext::new();
        assert!(table.validate(code, "ABC", &ns).is_ok());
        assert!(table.validate(code, "ABCD", &ns).is_err());
        assert!(table.validate(code, "abc", &ns).is_err());
    }

    #[test]
    fn test_whitespace_cannot_weaken() {
        let (mut table, base) = table_with(Builtin::Token);
        let result = table.restrict(base, None, &[facet(FacetKind::WhiteSpace, "preserve")]);
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_list_validation() {
        let (mut table, item) = table_with(Builtin::Int);
        let list = table.list(None, item).unwrap();
        let sized = table
            .restrict(list, None, &[facet(FacetKind::MaxLength, "2")])
            .unwrap();
        let ns = NamespaceContext::new();
        assert!(table.validate(sized, " 1  2 ", &ns).is_ok());
        assert!(table.validate(sized, "1 2 3", &ns).is_err());
        assert!(table.validate(list, "1 x", &ns).is_err());
        assert!(table.list(None, list).is_err());
    }

    #[test]
    fn test_union_validation() {
        let mut table = ValidatorTable::new();
        let int = table.add_builtin(Builtin::Int, None);
        let boolean = table.add_builtin(Builtin::Boolean, None);
        let union = table.union(None, vec![int, boolean]).unwrap();
        let ns = NamespaceContext::new();
        assert!(table.validate(union, "12", &ns).is_ok());
        assert!(table.validate(union, "true", &ns).is_ok());
        assert!(table.validate(union, "maybe", &ns).is_err());
        assert!(table
            .restrict(union, None, &[facet(FacetKind::MaxLength, "2")])
            .is_err());
    }

    #[test]
    fn test_qname_prefix_must_be_bound() {
        let (table, id) = table_with(Builtin::QName);
        let mut ns = NamespaceContext::new();
        assert!(table.validate(id, "p:x", &ns).is_err());
        ns.add_prefix("p", "urn:p");
        assert!(table.validate(id, "p:x", &ns).is_ok());
    }

    #[test]
    fn test_builtin_list_type() {
        let mut table = ValidatorTable::new();
        let item = table.add_builtin(Builtin::NmToken, None);
        let list = table.add_builtin(Builtin::NmTokens, Some(item));
        assert!(table.get(list).unwrap().is_list());
        let ns = NamespaceContext::new();
        assert!(table.validate(list, "a b", &ns).is_ok());
    }
}
