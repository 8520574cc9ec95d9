//! The parsed schema
//!
//! [`ParsedSchema`] is the output of the schema parser: every component of
//! every loaded document, kept in append-only arenas addressed by typed keys,
//! plus the global tables and the declaration order that every later stage
//! iterates.

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::namespaces::QName;

use super::attributes::AttributeDecl;
use super::complex_types::ComplexTypeDef;
use super::elements::ElementDecl;
use super::groups::{AttributeGroupDef, GroupDef};
use super::identities::IdentityConstraint;
use super::simple_types::SimpleTypeDef;
use super::{AttributeGroupKey, AttributeKey, ConstraintKey, ElementKey, GroupKey, TypeKey};

/// A type definition
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    /// `xs:simpleType`
    Simple(SimpleTypeDef),
    /// `xs:complexType`
    Complex(ComplexTypeDef),
}

impl TypeDef {
    /// Type name; `None` for anonymous types
    pub fn name(&self) -> Option<&QName> {
        match self {
            TypeDef::Simple(def) => def.name.as_ref(),
            TypeDef::Complex(def) => def.name.as_ref(),
        }
    }

    /// Source line
    pub fn line(&self) -> usize {
        match self {
            TypeDef::Simple(def) => def.line,
            TypeDef::Complex(def) => def.line,
        }
    }

    /// Whether this is a simple type
    pub fn is_simple(&self) -> bool {
        matches!(self, TypeDef::Simple(_))
    }

    /// Name used in error messages
    pub fn display_name(&self) -> String {
        self.name()
            .map_or_else(|| "#anonymous".to_string(), ToString::to_string)
    }
}

/// An `xs:notation` declaration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotationDecl {
    /// Notation name
    pub name: QName,
    /// Public identifier
    pub public: Option<String>,
    /// System identifier
    pub system: Option<String>,
}

/// Kind of a top-level declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DeclarationKind {
    /// `xs:simpleType` / `xs:complexType`
    Type,
    /// `xs:element`
    Element,
    /// `xs:attribute`
    Attribute,
    /// `xs:group`
    Group,
    /// `xs:attributeGroup`
    AttributeGroup,
    /// `xs:notation`
    Notation,
}

impl std::fmt::Display for DeclarationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Type => "type",
            Self::Element => "element",
            Self::Attribute => "attribute",
            Self::Group => "group",
            Self::AttributeGroup => "attribute group",
            Self::Notation => "notation",
        };
        f.write_str(label)
    }
}

/// Every component of a schema set, as parsed
#[derive(Debug, Clone, Default)]
pub struct ParsedSchema {
    /// Type definition arena
    pub types: Vec<TypeDef>,
    /// Element declaration arena
    pub elements: Vec<ElementDecl>,
    /// Attribute declaration arena
    pub attributes: Vec<AttributeDecl>,
    /// Named model group arena
    pub groups: Vec<GroupDef>,
    /// Attribute group arena
    pub attribute_groups: Vec<AttributeGroupDef>,
    /// Identity constraint arena
    pub constraints: Vec<IdentityConstraint>,

    /// Global types by name
    pub global_types: IndexMap<QName, TypeKey>,
    /// Global elements by name
    pub global_elements: IndexMap<QName, ElementKey>,
    /// Global attributes by name
    pub global_attributes: IndexMap<QName, AttributeKey>,
    /// Named model groups by name
    pub global_groups: IndexMap<QName, GroupKey>,
    /// Attribute groups by name
    pub global_attribute_groups: IndexMap<QName, AttributeGroupKey>,
    /// Notations by name
    pub notations: IndexMap<QName, NotationDecl>,
    /// Identity constraints by name (symbol space shared by all kinds)
    pub constraint_names: IndexMap<QName, ConstraintKey>,
    /// Substitution group head → members, in declaration order
    pub substitution_groups: IndexMap<QName, Vec<QName>>,

    /// Top-level declarations in source order
    pub declaration_order: Vec<(DeclarationKind, QName)>,
    /// Target namespaces of the loaded documents, in load order
    pub target_namespaces: Vec<String>,
    /// Locations of the loaded documents, in load order
    pub documents: Vec<String>,
}

fn duplicate(kind: DeclarationKind, name: &QName) -> Error {
    Error::structural(format!("duplicate global {} '{}'", kind, name))
}

impl ParsedSchema {
    /// Create an empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a type to the arena
    pub fn add_type(&mut self, def: TypeDef) -> TypeKey {
        self.types.push(def);
        TypeKey::from_index(self.types.len() - 1)
    }

    /// Append an element declaration to the arena
    pub fn add_element(&mut self, decl: ElementDecl) -> ElementKey {
        self.elements.push(decl);
        ElementKey::from_index(self.elements.len() - 1)
    }

    /// Append an attribute declaration to the arena
    pub fn add_attribute(&mut self, decl: AttributeDecl) -> AttributeKey {
        self.attributes.push(decl);
        AttributeKey::from_index(self.attributes.len() - 1)
    }

    /// Register a global type
    pub fn register_type(&mut self, name: QName, key: TypeKey) -> Result<()> {
        if self.global_types.contains_key(&name) {
            return Err(duplicate(DeclarationKind::Type, &name));
        }
        self.declaration_order.push((DeclarationKind::Type, name.clone()));
        self.global_types.insert(name, key);
        Ok(())
    }

    /// Register a global element, recording its substitution group
    pub fn register_element(&mut self, name: QName, key: ElementKey) -> Result<()> {
        if self.global_elements.contains_key(&name) {
            return Err(duplicate(DeclarationKind::Element, &name));
        }
        if let Some(head) = self.element(key).substitution_group.clone() {
            self.substitution_groups
                .entry(head)
                .or_default()
                .push(name.clone());
        }
        self.declaration_order.push((DeclarationKind::Element, name.clone()));
        self.global_elements.insert(name, key);
        Ok(())
    }

    /// Register a global attribute
    pub fn register_attribute(&mut self, name: QName, key: AttributeKey) -> Result<()> {
        if self.global_attributes.contains_key(&name) {
            return Err(duplicate(DeclarationKind::Attribute, &name));
        }
        self.declaration_order.push((DeclarationKind::Attribute, name.clone()));
        self.global_attributes.insert(name, key);
        Ok(())
    }

    /// Add and register a named model group
    pub fn add_group(&mut self, def: GroupDef) -> Result<GroupKey> {
        let name = def.name.clone();
        if self.global_groups.contains_key(&name) {
            return Err(duplicate(DeclarationKind::Group, &name));
        }
        self.groups.push(def);
        let key = GroupKey::from_index(self.groups.len() - 1);
        self.declaration_order.push((DeclarationKind::Group, name.clone()));
        self.global_groups.insert(name, key);
        Ok(key)
    }

    /// Add and register an attribute group
    pub fn add_attribute_group(&mut self, def: AttributeGroupDef) -> Result<AttributeGroupKey> {
        let name = def.name.clone();
        if self.global_attribute_groups.contains_key(&name) {
            return Err(duplicate(DeclarationKind::AttributeGroup, &name));
        }
        self.attribute_groups.push(def);
        let key = AttributeGroupKey::from_index(self.attribute_groups.len() - 1);
        self.declaration_order
            .push((DeclarationKind::AttributeGroup, name.clone()));
        self.global_attribute_groups.insert(name, key);
        Ok(key)
    }

    /// Add an identity constraint; names share one symbol space
    pub fn add_constraint(&mut self, constraint: IdentityConstraint) -> Result<ConstraintKey> {
        if self.constraint_names.contains_key(&constraint.name) {
            return Err(Error::structural(format!(
                "duplicate identity constraint '{}'",
                constraint.name
            )));
        }
        let name = constraint.name.clone();
        self.constraints.push(constraint);
        let key = ConstraintKey::from_index(self.constraints.len() - 1);
        self.constraint_names.insert(name, key);
        Ok(key)
    }

    /// Add a notation
    pub fn add_notation(&mut self, notation: NotationDecl) -> Result<()> {
        if self.notations.contains_key(&notation.name) {
            return Err(duplicate(DeclarationKind::Notation, &notation.name));
        }
        self.declaration_order
            .push((DeclarationKind::Notation, notation.name.clone()));
        self.notations.insert(notation.name.clone(), notation);
        Ok(())
    }

    /// Type by key
    pub fn type_def(&self, key: TypeKey) -> &TypeDef {
        &self.types[key.index()]
    }

    /// Mutable type by key
    pub fn type_def_mut(&mut self, key: TypeKey) -> &mut TypeDef {
        &mut self.types[key.index()]
    }

    /// Element by key
    pub fn element(&self, key: ElementKey) -> &ElementDecl {
        &self.elements[key.index()]
    }

    /// Mutable element by key
    pub fn element_mut(&mut self, key: ElementKey) -> &mut ElementDecl {
        &mut self.elements[key.index()]
    }

    /// Attribute by key
    pub fn attribute(&self, key: AttributeKey) -> &AttributeDecl {
        &self.attributes[key.index()]
    }

    /// Model group by key
    pub fn group(&self, key: GroupKey) -> &GroupDef {
        &self.groups[key.index()]
    }

    /// Attribute group by key
    pub fn attribute_group(&self, key: AttributeGroupKey) -> &AttributeGroupDef {
        &self.attribute_groups[key.index()]
    }

    /// Identity constraint by key
    pub fn constraint(&self, key: ConstraintKey) -> &IdentityConstraint {
        &self.constraints[key.index()]
    }

    /// Whether a target namespace was loaded
    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.target_namespaces.iter().any(|ns| ns == namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::groups::ModelGroup;

    #[test]
    fn test_declaration_order_and_duplicates() {
        let mut schema = ParsedSchema::new();
        let a = schema.add_element(ElementDecl::new(QName::local("a"), true));
        schema.register_element(QName::local("a"), a).unwrap();
        schema
            .add_group(GroupDef {
                name: QName::local("g"),
                group: ModelGroup::default(),
                line: 1,
            })
            .unwrap();
        assert_eq!(
            schema.declaration_order,
            vec![
                (DeclarationKind::Element, QName::local("a")),
                (DeclarationKind::Group, QName::local("g")),
            ]
        );
        let again = schema.add_element(ElementDecl::new(QName::local("a"), true));
        assert!(matches!(
            schema.register_element(QName::local("a"), again),
            Err(Error::Structural(_))
        ));
    }

    #[test]
    fn test_substitution_index() {
        let mut schema = ParsedSchema::new();
        let mut member = ElementDecl::new(QName::local("m"), true);
        member.substitution_group = Some(QName::local("h"));
        let key = schema.add_element(member);
        schema.register_element(QName::local("m"), key).unwrap();
        assert_eq!(
            schema.substitution_groups.get(&QName::local("h")),
            Some(&vec![QName::local("m")])
        );
    }
}
