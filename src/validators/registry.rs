//! ID assignment
//!
//! Walks the declaration order once and hands out dense IDs: built-in types
//! first, then every user type, element, and attribute in the order a
//! depth-first visit of each global declaration reaches it. IDs start at 1;
//! 0 never names a component.
//!
//! Type IDs `1..=Builtin::ALL.len()` are the built-in types in their fixed
//! order, so the first user type in source order is `Builtin::ALL.len() + 1`.
//! Element and attribute IDs have no built-ins and start at 1 with the first
//! declaration.

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::{Error, Result};
use crate::namespaces::QName;

use super::attributes::{AttributeItem, AttributeTarget};
use super::builtins::Builtin;
use super::complex_types::ComplexContent;
use super::globals::{DeclarationKind, ParsedSchema, TypeDef};
use super::particles::{Particle, Term};
use super::resolver::{Resolution, TypeRef};
use super::{AttributeKey, ElementKey, TypeKey};

macro_rules! component_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(pub u32);

        impl $name {
            /// The reserved invalid ID
            pub const INVALID: Self = Self(0);

            /// Whether this names a component
            pub fn is_valid(self) -> bool {
                self.0 != 0
            }

            /// Position in a dense table (`id - 1`)
            pub fn slot(self) -> usize {
                (self.0 as usize).saturating_sub(1)
            }

            pub(crate) fn from_slot(slot: usize) -> Self {
                Self(slot as u32 + 1)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

component_id!(
    /// ID of a type definition
    TypeId
);
component_id!(
    /// ID of an element declaration
    ElemId
);
component_id!(
    /// ID of an attribute declaration
    AttrId
);

/// What a type ID stands for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeSlot {
    /// A built-in
    Builtin(Builtin),
    /// A user-defined type
    User(TypeKey),
}

/// One registered declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<K> {
    /// Arena key
    pub key: K,
    /// Declared at schema level
    pub global: bool,
}

/// Dense IDs for every type, element, and attribute
#[derive(Debug, Clone, Default)]
pub struct Registry {
    types: Vec<TypeSlot>,
    elements: Vec<Record<ElementKey>>,
    attributes: Vec<Record<AttributeKey>>,
    type_ids: Vec<Option<TypeId>>,
    element_ids: Vec<Option<ElemId>>,
    attribute_ids: Vec<Option<AttrId>>,
    /// Global types by name
    pub global_types: IndexMap<QName, TypeId>,
    /// Global elements by name
    pub global_elements: IndexMap<QName, ElemId>,
    /// Global attributes by name
    pub global_attributes: IndexMap<QName, AttrId>,
}

impl Registry {
    /// Number of type IDs
    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    /// Number of element IDs
    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    /// Number of attribute IDs
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Type IDs with what they stand for, in ID order
    pub fn types(&self) -> impl Iterator<Item = (TypeId, TypeSlot)> + '_ {
        self.types
            .iter()
            .enumerate()
            .map(|(i, slot)| (TypeId::from_slot(i), *slot))
    }

    /// Element IDs with their declarations, in ID order
    pub fn elements(&self) -> impl Iterator<Item = (ElemId, Record<ElementKey>)> + '_ {
        self.elements
            .iter()
            .enumerate()
            .map(|(i, record)| (ElemId::from_slot(i), *record))
    }

    /// Attribute IDs with their declarations, in ID order
    pub fn attributes(&self) -> impl Iterator<Item = (AttrId, Record<AttributeKey>)> + '_ {
        self.attributes
            .iter()
            .enumerate()
            .map(|(i, record)| (AttrId::from_slot(i), *record))
    }

    /// ID of a built-in type
    pub fn builtin_id(builtin: Builtin) -> TypeId {
        TypeId(builtin as u32 + 1)
    }

    /// ID of a resolved type
    pub fn type_id(&self, type_ref: TypeRef) -> Result<TypeId> {
        match type_ref {
            TypeRef::Builtin(builtin) => Ok(Self::builtin_id(builtin)),
            TypeRef::User(key) => self
                .type_ids
                .get(key.index())
                .copied()
                .flatten()
                .ok_or_else(|| Error::structural(format!("type #{} has no ID", key.index()))),
        }
    }

    /// ID of an element declaration
    pub fn element_id(&self, key: ElementKey) -> Result<ElemId> {
        self.element_ids
            .get(key.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::structural(format!("element #{} has no ID", key.index())))
    }

    /// ID of an attribute declaration
    pub fn attribute_id(&self, key: AttributeKey) -> Result<AttrId> {
        self.attribute_ids
            .get(key.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::structural(format!("attribute #{} has no ID", key.index())))
    }

    /// What a type ID stands for
    pub fn type_slot(&self, id: TypeId) -> Option<TypeSlot> {
        if !id.is_valid() {
            return None;
        }
        self.types.get(id.slot()).copied()
    }

    /// The declaration behind an element ID
    pub fn element_record(&self, id: ElemId) -> Option<Record<ElementKey>> {
        if !id.is_valid() {
            return None;
        }
        self.elements.get(id.slot()).copied()
    }

    /// The declaration behind an attribute ID
    pub fn attribute_record(&self, id: AttrId) -> Option<Record<AttributeKey>> {
        if !id.is_valid() {
            return None;
        }
        self.attributes.get(id.slot()).copied()
    }
}

enum Visit {
    Type(TypeKey),
    Element(ElementKey),
    Attribute(AttributeKey),
    Particle(Particle),
}

struct Builder<'a> {
    schema: &'a ParsedSchema,
    resolution: &'a Resolution,
    registry: Registry,
}

impl<'a> Builder<'a> {
    fn assign_type(&mut self, key: TypeKey) -> bool {
        if self.registry.type_ids[key.index()].is_some() {
            return false;
        }
        self.registry.types.push(TypeSlot::User(key));
        self.registry.type_ids[key.index()] = Some(TypeId::from_slot(self.registry.types.len() - 1));
        true
    }

    fn assign_element(&mut self, key: ElementKey) -> bool {
        if self.registry.element_ids[key.index()].is_some() {
            return false;
        }
        let global = self.schema.element(key).global;
        self.registry.elements.push(Record { key, global });
        self.registry.element_ids[key.index()] =
            Some(ElemId::from_slot(self.registry.elements.len() - 1));
        true
    }

    fn assign_attribute(&mut self, key: AttributeKey) -> bool {
        if self.registry.attribute_ids[key.index()].is_some() {
            return false;
        }
        let global = self.schema.attribute(key).global;
        self.registry.attributes.push(Record { key, global });
        self.registry.attribute_ids[key.index()] =
            Some(AttrId::from_slot(self.registry.attributes.len() - 1));
        true
    }

    /// Assign IDs to the local components below one declaration. Global
    /// components reached by reference are left to their own declaration.
    fn descend(&mut self, first: Visit) -> Result<()> {
        let schema = self.schema;
        let mut stack = vec![first];
        while let Some(visit) = stack.pop() {
            let mut next = Vec::new();
            match visit {
                Visit::Type(key) => match schema.type_def(key) {
                    TypeDef::Simple(simple) => {
                        for dependency in simple.dependencies() {
                            if let Some(TypeRef::User(inner)) = self.resolution.type_use(dependency)? {
                                if schema.type_def(inner).name().is_none() && self.assign_type(inner) {
                                    next.push(Visit::Type(inner));
                                }
                            }
                        }
                    }
                    TypeDef::Complex(complex) => {
                        if let Some(base) = &complex.base {
                            self.resolution.type_ref(base)?;
                        }
                        match &complex.content {
                            ComplexContent::Elements(Some(particle)) => {
                                next.push(Visit::Particle(particle.clone()));
                            }
                            ComplexContent::Simple { inline: Some(inline), .. } => {
                                if self.assign_type(*inline) {
                                    next.push(Visit::Type(*inline));
                                }
                            }
                            _ => {}
                        }
                        self.attribute_items(&complex.attributes, &mut next);
                    }
                },
                Visit::Element(key) => {
                    let decl = schema.element(key);
                    if let Some(TypeRef::User(inner)) = self.resolution.type_use(&decl.type_use)? {
                        if schema.type_def(inner).name().is_none() && self.assign_type(inner) {
                            next.push(Visit::Type(inner));
                        }
                    }
                }
                Visit::Attribute(key) => {
                    let decl = schema.attribute(key);
                    if let Some(TypeRef::User(inner)) = self.resolution.type_use(&decl.type_use)? {
                        if schema.type_def(inner).name().is_none() && self.assign_type(inner) {
                            next.push(Visit::Type(inner));
                        }
                    }
                }
                Visit::Particle(particle) => match particle.term {
                    Term::Element(key) => {
                        if self.assign_element(key) {
                            next.push(Visit::Element(key));
                        }
                    }
                    Term::Group(group) => {
                        next.extend(group.particles.into_iter().map(Visit::Particle));
                    }
                    Term::ElementRef(name) => {
                        self.resolution.element(&name)?;
                    }
                    Term::GroupRef(name) => {
                        self.resolution.group(&name)?;
                    }
                    Term::Wildcard(_) => {}
                },
            }
            stack.extend(next.into_iter().rev());
        }
        Ok(())
    }

    fn attribute_items(&mut self, items: &[AttributeItem], next: &mut Vec<Visit>) {
        for item in items {
            if let AttributeItem::Use(attribute_use) = item {
                if let AttributeTarget::Local(key) = attribute_use.target {
                    if self.assign_attribute(key) {
                        next.push(Visit::Attribute(key));
                    }
                }
            }
        }
    }
}

/// Assign IDs in declaration order
pub fn build_registry(schema: &ParsedSchema, resolution: &Resolution) -> Result<Registry> {
    let mut builder = Builder {
        schema,
        resolution,
        registry: Registry {
            types: Builtin::ALL.iter().copied().map(TypeSlot::Builtin).collect(),
            type_ids: vec![None; schema.types.len()],
            element_ids: vec![None; schema.elements.len()],
            attribute_ids: vec![None; schema.attributes.len()],
            ..Registry::default()
        },
    };

    for (kind, name) in &schema.declaration_order {
        match kind {
            DeclarationKind::Type => {
                let key = schema.global_types[name];
                builder.assign_type(key);
                builder
                    .registry
                    .global_types
                    .insert(name.clone(), builder.registry.type_id(TypeRef::User(key))?);
                builder.descend(Visit::Type(key))?;
            }
            DeclarationKind::Element => {
                let key = schema.global_elements[name];
                builder.assign_element(key);
                builder
                    .registry
                    .global_elements
                    .insert(name.clone(), builder.registry.element_id(key)?);
                builder.descend(Visit::Element(key))?;
            }
            DeclarationKind::Attribute => {
                let key = schema.global_attributes[name];
                builder.assign_attribute(key);
                builder
                    .registry
                    .global_attributes
                    .insert(name.clone(), builder.registry.attribute_id(key)?);
                builder.descend(Visit::Attribute(key))?;
            }
            DeclarationKind::Group => {
                let group = &schema.group(schema.global_groups[name]).group;
                for particle in &group.particles {
                    builder.descend(Visit::Particle(particle.clone()))?;
                }
            }
            DeclarationKind::AttributeGroup => {
                let def = schema.attribute_group(schema.global_attribute_groups[name]);
                let mut next = Vec::new();
                builder.attribute_items(&def.attributes, &mut next);
                for visit in next {
                    builder.descend(visit)?;
                }
            }
            DeclarationKind::Notation => {}
        }
    }

    // Every arena entry belongs to some global declaration
    if let Some(index) = builder.registry.type_ids.iter().position(Option::is_none) {
        return Err(Error::structural(format!(
            "type '{}' is not reachable from any global declaration",
            schema.types[index].display_name()
        )));
    }
    if let Some(index) = builder.registry.element_ids.iter().position(Option::is_none) {
        return Err(Error::structural(format!(
            "element '{}' is not reachable from any global declaration",
            schema.elements[index].name
        )));
    }

    let registry = builder.registry;
    tracing::debug!(
        types = registry.type_count(),
        elements = registry.element_count(),
        attributes = registry.attribute_count(),
        "assigned component IDs"
    );
    Ok(registry)
}
