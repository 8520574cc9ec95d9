//! XSD element declarations

use crate::namespaces::QName;

use super::attributes::ValueConstraint;
use super::complex_types::DerivationSet;
use super::{ConstraintKey, TypeKey};

/// How a declaration names its type
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum TypeUse {
    /// No `type` attribute and no inline definition
    #[default]
    Unspecified,
    /// `type="…"`; a placeholder until the resolver binds it
    Named(QName),
    /// An inline anonymous definition
    Anonymous(TypeKey),
}

impl TypeUse {
    /// The referenced name, if this is still a placeholder
    pub fn placeholder(&self) -> Option<&QName> {
        match self {
            TypeUse::Named(name) => Some(name),
            _ => None,
        }
    }
}

/// An element declaration, global or local
#[derive(Debug, Clone, PartialEq)]
pub struct ElementDecl {
    /// Element name
    pub name: QName,
    /// Declared type
    pub type_use: TypeUse,
    /// `nillable="true"`
    pub nillable: bool,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// Head of the substitution group this element joins
    pub substitution_group: Option<QName>,
    /// Blocked derivations and substitutions
    pub block: DerivationSet,
    /// Final derivations (for substitution group membership)
    pub final_set: DerivationSet,
    /// Default or fixed value
    pub value_constraint: Option<ValueConstraint>,
    /// Identity constraints declared on the element
    pub constraints: Vec<ConstraintKey>,
    /// Declared at schema level
    pub global: bool,
    /// Source line
    pub line: usize,
}

impl ElementDecl {
    /// A declaration with default properties
    pub fn new(name: QName, global: bool) -> Self {
        Self {
            name,
            type_use: TypeUse::Unspecified,
            nillable: false,
            is_abstract: false,
            substitution_group: None,
            block: DerivationSet::empty(),
            final_set: DerivationSet::empty(),
            value_constraint: None,
            constraints: Vec::new(),
            global,
            line: 0,
        }
    }

    /// Whether substitution is blocked outright
    pub fn blocks_substitution(&self) -> bool {
        self.block.contains(DerivationSet::SUBSTITUTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_element_defaults() {
        let decl = ElementDecl::new(QName::local("e"), true);
        assert_eq!(decl.type_use, TypeUse::Unspecified);
        assert!(!decl.blocks_substitution());
        assert!(decl.constraints.is_empty());
    }

    #[test]
    fn test_placeholder() {
        let named = TypeUse::Named(QName::xsd("string"));
        assert_eq!(named.placeholder(), Some(&QName::xsd("string")));
        assert_eq!(TypeUse::Unspecified.placeholder(), None);
    }
}
