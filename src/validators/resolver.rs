//! Reference resolution
//!
//! Binds every QName reference of a [`ParsedSchema`] to the global
//! declaration it names. The walk starts at each global declaration in
//! source order and descends its subtree with an explicit stack; a node
//! that is already being resolved is skipped, so reference cycles do not
//! loop here. Whether a cycle is legal is decided later by the cycle
//! detector.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Error, ReferenceError, ReferenceKind, Result};
use crate::namespaces::QName;

use super::attributes::{AttributeItem, AttributeTarget};
use super::builtins::Builtin;
use super::complex_types::ComplexContent;
use super::elements::TypeUse;
use super::globals::{DeclarationKind, ParsedSchema, TypeDef};
use super::identities::ConstraintKind;
use super::particles::{Particle, Term};
use super::{AttributeGroupKey, AttributeKey, ConstraintKey, ElementKey, GroupKey, TypeKey};

/// A resolved type reference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeRef {
    /// An XSD built-in
    Builtin(Builtin),
    /// A user-defined type
    User(TypeKey),
}

impl TypeRef {
    /// Whether this is the built-in `xs:anyType`
    pub fn is_any_type(self) -> bool {
        self == TypeRef::Builtin(Builtin::AnyType)
    }
}

/// Side table produced by the resolver
#[derive(Debug, Clone, Default)]
pub struct Resolution {
    /// `type`, `base`, `itemType`, `memberTypes` references
    pub type_refs: IndexMap<QName, TypeRef>,
    /// `<element ref>`, substitution group heads, and their members
    pub element_refs: IndexMap<QName, ElementKey>,
    /// `<attribute ref>`
    pub attribute_refs: IndexMap<QName, AttributeKey>,
    /// `<group ref>`
    pub group_refs: IndexMap<QName, GroupKey>,
    /// `<attributeGroup ref>`
    pub attribute_group_refs: IndexMap<QName, AttributeGroupKey>,
    /// `keyref/@refer`
    pub constraint_refs: IndexMap<QName, ConstraintKey>,
}

impl Resolution {
    /// The type named by a declaration; `None` when no type was given
    pub fn type_use(&self, type_use: &TypeUse) -> Result<Option<TypeRef>> {
        match type_use {
            TypeUse::Unspecified => Ok(None),
            TypeUse::Anonymous(key) => Ok(Some(TypeRef::User(*key))),
            TypeUse::Named(name) => self.type_ref(name).map(Some),
        }
    }

    /// A resolved type name
    pub fn type_ref(&self, name: &QName) -> Result<TypeRef> {
        self.type_refs
            .get(name)
            .copied()
            .ok_or_else(|| Error::structural(format!("type placeholder '{}' survived resolution", name)))
    }

    /// A resolved element reference
    pub fn element(&self, name: &QName) -> Result<ElementKey> {
        self.element_refs
            .get(name)
            .copied()
            .ok_or_else(|| Error::structural(format!("element reference '{}' survived resolution", name)))
    }

    /// A resolved attribute reference
    pub fn attribute(&self, name: &QName) -> Result<AttributeKey> {
        self.attribute_refs
            .get(name)
            .copied()
            .ok_or_else(|| Error::structural(format!("attribute reference '{}' survived resolution", name)))
    }

    /// A resolved group reference
    pub fn group(&self, name: &QName) -> Result<GroupKey> {
        self.group_refs
            .get(name)
            .copied()
            .ok_or_else(|| Error::structural(format!("group reference '{}' survived resolution", name)))
    }

    /// A resolved attribute group reference
    pub fn attribute_group(&self, name: &QName) -> Result<AttributeGroupKey> {
        self.attribute_group_refs.get(name).copied().ok_or_else(|| {
            Error::structural(format!("attribute group reference '{}' survived resolution", name))
        })
    }

    /// A resolved `refer`
    pub fn constraint(&self, name: &QName) -> Result<ConstraintKey> {
        self.constraint_refs.get(name).copied().ok_or_else(|| {
            Error::structural(format!("identity constraint reference '{}' survived resolution", name))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Node {
    Type(TypeKey),
    Element(ElementKey),
    Attribute(AttributeKey),
    Group(GroupKey),
    AttributeGroup(AttributeGroupKey),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Resolving,
    Resolved,
}

enum Step {
    Enter(Node),
    Exit(Node),
}

/// Resolves the references of one parsed schema
pub struct Resolver<'a> {
    schema: &'a ParsedSchema,
    resolution: Resolution,
    states: HashMap<Node, State>,
}

impl<'a> Resolver<'a> {
    /// Create a resolver
    pub fn new(schema: &'a ParsedSchema) -> Self {
        Self {
            schema,
            resolution: Resolution::default(),
            states: HashMap::new(),
        }
    }

    /// Resolve everything reachable from the global declarations
    pub fn resolve(mut self) -> Result<Resolution> {
        for (kind, name) in &self.schema.declaration_order {
            let root = match kind {
                DeclarationKind::Type => self.schema.global_types.get(name).map(|k| Node::Type(*k)),
                DeclarationKind::Element => {
                    self.schema.global_elements.get(name).map(|k| Node::Element(*k))
                }
                DeclarationKind::Attribute => {
                    self.schema.global_attributes.get(name).map(|k| Node::Attribute(*k))
                }
                DeclarationKind::Group => self.schema.global_groups.get(name).map(|k| Node::Group(*k)),
                DeclarationKind::AttributeGroup => self
                    .schema
                    .global_attribute_groups
                    .get(name)
                    .map(|k| Node::AttributeGroup(*k)),
                DeclarationKind::Notation => None,
            };
            if let Some(root) = root {
                self.walk(root)?;
            }
        }
        tracing::debug!(
            types = self.resolution.type_refs.len(),
            elements = self.resolution.element_refs.len(),
            attributes = self.resolution.attribute_refs.len(),
            groups = self.resolution.group_refs.len(),
            attribute_groups = self.resolution.attribute_group_refs.len(),
            "resolved references"
        );
        Ok(self.resolution)
    }

    fn walk(&mut self, root: Node) -> Result<()> {
        let mut stack = vec![Step::Enter(root)];
        while let Some(step) = stack.pop() {
            match step {
                Step::Exit(node) => {
                    self.states.insert(node, State::Resolved);
                }
                Step::Enter(node) => {
                    if self.states.contains_key(&node) {
                        continue;
                    }
                    self.states.insert(node, State::Resolving);
                    stack.push(Step::Exit(node));
                    let children = self.visit(node)?;
                    // Reversed so children are entered in document order
                    stack.extend(
                        children
                            .into_iter()
                            .rev()
                            .filter(|c| !self.states.contains_key(c))
                            .map(Step::Enter),
                    );
                }
            }
        }
        Ok(())
    }

    fn missing(referrer: &str, kind: ReferenceKind, name: &QName) -> Error {
        Error::Reference(ReferenceError::new(referrer, kind, name.clone()))
    }

    fn resolve_type_name(&mut self, referrer: &str, name: &QName) -> Result<Option<Node>> {
        if let Some(resolved) = self.resolution.type_refs.get(name) {
            return Ok(match resolved {
                TypeRef::User(key) => Some(Node::Type(*key)),
                TypeRef::Builtin(_) => None,
            });
        }
        if let Some(key) = self.schema.global_types.get(name) {
            self.resolution.type_refs.insert(name.clone(), TypeRef::User(*key));
            return Ok(Some(Node::Type(*key)));
        }
        if let Some(builtin) = Builtin::from_qname(name) {
            self.resolution
                .type_refs
                .insert(name.clone(), TypeRef::Builtin(builtin));
            return Ok(None);
        }
        Err(Self::missing(referrer, ReferenceKind::Type, name))
    }

    fn resolve_type_use(&mut self, referrer: &str, type_use: &TypeUse) -> Result<Option<Node>> {
        match type_use {
            TypeUse::Unspecified => Ok(None),
            TypeUse::Anonymous(key) => Ok(Some(Node::Type(*key))),
            TypeUse::Named(name) => self.resolve_type_name(referrer, name),
        }
    }

    fn resolve_element(&mut self, referrer: &str, kind: ReferenceKind, name: &QName) -> Result<Node> {
        let key = self
            .schema
            .global_elements
            .get(name)
            .copied()
            .ok_or_else(|| Self::missing(referrer, kind, name))?;
        self.resolution.element_refs.insert(name.clone(), key);
        Ok(Node::Element(key))
    }

    fn visit(&mut self, node: Node) -> Result<Vec<Node>> {
        let schema = self.schema;
        let mut children = Vec::new();
        match node {
            Node::Type(key) => {
                let def = schema.type_def(key);
                let referrer = def.display_name();
                match def {
                    TypeDef::Simple(simple) => {
                        for dependency in simple.dependencies() {
                            children.extend(self.resolve_type_use(&referrer, dependency)?);
                        }
                    }
                    TypeDef::Complex(complex) => {
                        if let Some(base) = &complex.base {
                            children.extend(self.resolve_type_name(&referrer, base)?);
                        }
                        match &complex.content {
                            ComplexContent::Elements(Some(particle)) => {
                                self.particle_children(&referrer, particle, &mut children)?;
                            }
                            ComplexContent::Simple { inline: Some(inline), .. } => {
                                children.push(Node::Type(*inline));
                            }
                            _ => {}
                        }
                        self.attribute_children(&referrer, &complex.attributes, &mut children)?;
                    }
                }
            }
            Node::Element(key) => {
                let decl = schema.element(key);
                let referrer = decl.name.to_string();
                children.extend(self.resolve_type_use(&referrer, &decl.type_use)?);
                if let Some(head) = &decl.substitution_group {
                    // Members are reached through their head, never by reference
                    if schema.global_elements.get(&decl.name) == Some(&key) {
                        self.resolution.element_refs.insert(decl.name.clone(), key);
                    }
                    children.push(self.resolve_element(&referrer, ReferenceKind::SubstitutionHead, head)?);
                }
                for constraint in &decl.constraints {
                    let constraint = schema.constraint(*constraint);
                    if let Some(refer) = &constraint.refer {
                        let target = schema.constraint_names.get(refer).copied().ok_or_else(|| {
                            Self::missing(&constraint.name.to_string(), ReferenceKind::IdentityConstraint, refer)
                        })?;
                        if schema.constraint(target).kind == ConstraintKind::KeyRef {
                            return Err(Error::structural(format!(
                                "keyref '{}' refers to another keyref '{}'",
                                constraint.name, refer
                            )));
                        }
                        if schema.constraint(target).fields.len() != constraint.fields.len() {
                            return Err(Error::structural(format!(
                                "keyref '{}' has {} fields but '{}' has {}",
                                constraint.name,
                                constraint.fields.len(),
                                refer,
                                schema.constraint(target).fields.len()
                            )));
                        }
                        self.resolution.constraint_refs.insert(refer.clone(), target);
                    }
                }
            }
            Node::Attribute(key) => {
                let decl = schema.attribute(key);
                let referrer = decl.name.to_string();
                children.extend(self.resolve_type_use(&referrer, &decl.type_use)?);
            }
            Node::Group(key) => {
                let def = schema.group(key);
                let referrer = def.name.to_string();
                for particle in &def.group.particles {
                    self.particle_children(&referrer, particle, &mut children)?;
                }
            }
            Node::AttributeGroup(key) => {
                let def = schema.attribute_group(key);
                let referrer = def.name.to_string();
                self.attribute_children(&referrer, &def.attributes, &mut children)?;
            }
        }
        Ok(children)
    }

    fn particle_children(
        &mut self,
        referrer: &str,
        particle: &Particle,
        children: &mut Vec<Node>,
    ) -> Result<()> {
        let mut stack = vec![particle];
        while let Some(particle) = stack.pop() {
            match &particle.term {
                Term::Element(key) => children.push(Node::Element(*key)),
                Term::ElementRef(name) => {
                    children.push(self.resolve_element(referrer, ReferenceKind::Element, name)?);
                }
                Term::GroupRef(name) => {
                    let key = self
                        .schema
                        .global_groups
                        .get(name)
                        .copied()
                        .ok_or_else(|| Self::missing(referrer, ReferenceKind::Group, name))?;
                    self.resolution.group_refs.insert(name.clone(), key);
                    children.push(Node::Group(key));
                }
                Term::Group(group) => stack.extend(group.particles.iter().rev()),
                Term::Wildcard(_) => {}
            }
        }
        Ok(())
    }

    fn attribute_children(
        &mut self,
        referrer: &str,
        items: &[AttributeItem],
        children: &mut Vec<Node>,
    ) -> Result<()> {
        for item in items {
            match item {
                AttributeItem::Use(attribute_use) => match &attribute_use.target {
                    AttributeTarget::Local(key) => children.push(Node::Attribute(*key)),
                    AttributeTarget::Ref(name) => {
                        let key = self
                            .schema
                            .global_attributes
                            .get(name)
                            .copied()
                            .ok_or_else(|| Self::missing(referrer, ReferenceKind::Attribute, name))?;
                        self.resolution.attribute_refs.insert(name.clone(), key);
                        children.push(Node::Attribute(key));
                    }
                },
                AttributeItem::GroupRef(name) => {
                    let key = self
                        .schema
                        .global_attribute_groups
                        .get(name)
                        .copied()
                        .ok_or_else(|| Self::missing(referrer, ReferenceKind::AttributeGroup, name))?;
                    self.resolution.attribute_group_refs.insert(name.clone(), key);
                    children.push(Node::AttributeGroup(key));
                }
            }
        }
        Ok(())
    }
}

/// Resolve every reference of `schema`
pub fn resolve(schema: &ParsedSchema) -> Result<Resolution> {
    Resolver::new(schema).resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CompileConfig;
    use crate::loaders::MemoryLoader;
    use crate::validators::parsing::parse_schema;

    fn parsed(body: &str) -> ParsedSchema {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema" xmlns="urn:t" targetNamespace="urn:t">{}</xs:schema>"#,
            body
        );
        let loader = MemoryLoader::new().with_document("s.xsd", xml);
        parse_schema(&loader, "s.xsd", &CompileConfig::default()).unwrap()
    }

    #[test]
    fn test_resolves_types_and_refs() {
        let schema = parsed(
            r#"<xs:element name="root" type="T"/>
               <xs:complexType name="T">
                 <xs:sequence><xs:element ref="item"/><xs:group ref="G"/></xs:sequence>
                 <xs:attributeGroup ref="AG"/>
               </xs:complexType>
               <xs:element name="item" type="xs:int"/>
               <xs:group name="G"><xs:sequence><xs:element name="x" type="xs:string"/></xs:sequence></xs:group>
               <xs:attributeGroup name="AG"><xs:attribute ref="a"/></xs:attributeGroup>
               <xs:attribute name="a" type="xs:boolean"/>"#,
        );
        let resolution = resolve(&schema).unwrap();
        assert!(matches!(
            resolution.type_ref(&QName::new("urn:t", "T")),
            Ok(TypeRef::User(_))
        ));
        assert_eq!(
            resolution.type_ref(&QName::xsd("int")).unwrap(),
            TypeRef::Builtin(Builtin::Int)
        );
        assert!(resolution.element(&QName::new("urn:t", "item")).is_ok());
        assert!(resolution.group(&QName::new("urn:t", "G")).is_ok());
        assert!(resolution.attribute_group(&QName::new("urn:t", "AG")).is_ok());
        assert!(resolution.attribute(&QName::new("urn:t", "a")).is_ok());
    }

    #[test]
    fn test_missing_reference() {
        let schema = parsed(r#"<xs:element name="root" type="Missing"/>"#);
        match resolve(&schema) {
            Err(Error::Reference(err)) => {
                assert_eq!(err.kind, ReferenceKind::Type);
                assert_eq!(err.missing, QName::new("urn:t", "Missing"));
                assert_eq!(err.referrer, "{urn:t}root");
            }
            other => panic!("expected a reference error, got {:?}", other),
        }
    }

    #[test]
    fn test_recursive_reference_terminates() {
        let schema = parsed(
            r#"<xs:element name="node">
                 <xs:complexType>
                   <xs:sequence><xs:element ref="node" minOccurs="0"/></xs:sequence>
                 </xs:complexType>
               </xs:element>"#,
        );
        assert!(resolve(&schema).is_ok());
    }

    #[test]
    fn test_keyref_must_refer_to_key() {
        let schema = parsed(
            r#"<xs:element name="root">
                 <xs:complexType><xs:sequence/></xs:complexType>
                 <xs:keyref name="r" refer="nothing"><xs:selector xpath="a"/><xs:field xpath="@b"/></xs:keyref>
               </xs:element>"#,
        );
        assert!(matches!(resolve(&schema), Err(Error::Reference(_))));
    }

    #[test]
    fn test_substitution_members_are_registered() {
        let schema = parsed(
            r#"<xs:element name="head" abstract="true"/>
               <xs:element name="member" substitutionGroup="head"/>
               <xs:element name="nested" substitutionGroup="member"/>"#,
        );
        let resolution = resolve(&schema).unwrap();
        for name in ["head", "member", "nested"] {
            assert_eq!(
                resolution.element(&QName::new("urn:t", name)).unwrap(),
                schema.global_elements[&QName::new("urn:t", name)]
            );
        }
    }
}
