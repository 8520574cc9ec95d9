//! Type derivation
//!
//! Computes, for every type, the properties that follow from its derivation
//! chain: the effective content particle, the flattened attribute uses, the
//! attribute wildcard, and the text validator of simple types and simple
//! content. Also enforces `final`, checks default and fixed values, and
//! validates substitution group membership.
//!
//! Types are processed in the post-order produced by the cycle detector, so
//! a base is always complete before anything derived from it.

use crate::error::{Error, Result};
use crate::namespaces::{NamespaceContext, QName};

use super::attributes::{AttributeItem, AttributeTarget, AttributeUse, ValueConstraint};
use super::builtins::{Builtin, ValueKind};
use super::complex_types::{ComplexContent, ComplexTypeDef, ContentKind, DerivationMethod, DerivationSet};
use super::globals::{ParsedSchema, TypeDef};
use super::groups::{Compositor, ModelGroup};
use super::particles::{Occurs, Particle, Term};
use super::resolver::{Resolution, TypeRef};
use super::simple_types::{SimpleTypeDef, SimpleVariety, ValidatorId, ValidatorTable};
use super::wildcards::{NamespaceConstraint, ProcessContents, Wildcard};
use super::{AttributeKey, ElementKey, TypeKey};

/// An attribute use after flattening groups and inheritance
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeUseInfo {
    /// Attribute name
    pub name: QName,
    /// Declaration
    pub decl: AttributeKey,
    /// `use="required"`
    pub required: bool,
    /// Use-level constraint, falling back to the declaration's
    pub value_constraint: Option<ValueConstraint>,
}

/// Derived properties of one type
#[derive(Debug, Clone)]
pub struct TypeInfo {
    /// Name; `None` for anonymous types
    pub name: Option<QName>,
    /// Whether this is a simple type
    pub simple: bool,
    /// Base type; `None` only for anyType
    pub base: Option<TypeRef>,
    /// How the type derives from its base
    pub method: DerivationMethod,
    /// Content kind (simple types report [`ContentKind::Simple`])
    pub content: ContentKind,
    /// Effective content particle; group references are still unexpanded
    pub particle: Option<Particle>,
    /// Effective attribute uses in declaration order
    pub attributes: Vec<AttributeUseInfo>,
    /// Effective attribute wildcard
    pub any_attribute: Option<Wildcard>,
    /// Validator of simple types and simple content
    pub validator: Option<ValidatorId>,
    /// `abstract="true"`
    pub is_abstract: bool,
    /// `block`
    pub block: DerivationSet,
    /// `final`
    pub final_set: DerivationSet,
}

impl TypeInfo {
    fn simple(name: Option<QName>, base: Option<TypeRef>, validator: ValidatorId) -> Self {
        Self {
            name,
            simple: true,
            base,
            method: DerivationMethod::Restriction,
            content: ContentKind::Simple,
            particle: None,
            attributes: Vec::new(),
            any_attribute: None,
            validator: Some(validator),
            is_abstract: false,
            block: DerivationSet::empty(),
            final_set: DerivationSet::empty(),
        }
    }

    /// The properties of `xs:anyType`
    fn any_type() -> Self {
        let wildcard = Wildcard::new(NamespaceConstraint::Any, ProcessContents::Lax);
        Self {
            name: Some(Builtin::AnyType.qname()),
            simple: false,
            base: None,
            method: DerivationMethod::Restriction,
            content: ContentKind::Mixed,
            particle: Some(Particle::new(
                Occurs::zero_or_more(),
                Term::Wildcard(wildcard.clone()),
            )),
            attributes: Vec::new(),
            any_attribute: Some(wildcard),
            validator: None,
            is_abstract: false,
            block: DerivationSet::empty(),
            final_set: DerivationSet::empty(),
        }
    }

    /// Display name for errors and diagnostics
    pub fn display_name(&self) -> String {
        self.name
            .as_ref()
            .map_or_else(|| "#anonymous".to_string(), ToString::to_string)
    }
}

/// Derived properties of every component
#[derive(Debug, Clone)]
pub struct Derivations {
    builtins: Vec<TypeInfo>,
    users: Vec<Option<TypeInfo>>,
    element_types: Vec<TypeRef>,
    attribute_validators: Vec<Option<ValidatorId>>,
    /// All text validators
    pub validators: ValidatorTable,
}

impl Derivations {
    /// Properties of a type
    pub fn info(&self, type_ref: TypeRef) -> Result<&TypeInfo> {
        let info = match type_ref {
            TypeRef::Builtin(builtin) => self.builtins.get(builtin as usize),
            TypeRef::User(key) => self.users.get(key.index()).and_then(Option::as_ref),
        };
        info.ok_or_else(|| Error::structural(format!("type {:?} was not derived", type_ref)))
    }

    /// Effective type of an element declaration
    pub fn element_type(&self, key: ElementKey) -> TypeRef {
        self.element_types[key.index()]
    }

    /// Text validator of an attribute declaration
    pub fn attribute_validator(&self, key: AttributeKey) -> Result<ValidatorId> {
        self.attribute_validators
            .get(key.index())
            .copied()
            .flatten()
            .ok_or_else(|| Error::structural(format!("attribute #{} has no validator", key.index())))
    }

    /// The union of derivation methods on the chain from `from` up to `to`;
    /// `None` when `from` does not derive from `to`
    pub fn derivation_mask(&self, from: TypeRef, to: TypeRef) -> Option<DerivationSet> {
        let mut mask = DerivationSet::empty();
        let mut current = from;
        loop {
            if current == to {
                return Some(mask);
            }
            let info = self.info(current).ok()?;
            mask = mask.union(info.method.as_set());
            current = info.base?;
        }
    }
}

struct Deriver<'a> {
    schema: &'a ParsedSchema,
    resolution: &'a Resolution,
    out: Derivations,
}

impl<'a> Deriver<'a> {
    fn info(&self, type_ref: TypeRef) -> Result<&TypeInfo> {
        self.out.info(type_ref)
    }

    fn simple_validator(&self, referrer: &str, type_ref: TypeRef) -> Result<ValidatorId> {
        let info = self.info(type_ref)?;
        match (info.simple, info.validator) {
            (true, Some(validator)) => Ok(validator),
            _ => Err(Error::derivation(format!(
                "{} needs a simple type but '{}' is complex",
                referrer,
                info.display_name()
            ))),
        }
    }

    fn check_final(&self, referrer: &str, base: TypeRef, method: DerivationSet, what: &str) -> Result<()> {
        let info = self.info(base)?;
        if info.final_set.intersects(method) {
            return Err(Error::derivation(format!(
                "{} cannot use '{}' as {}: it is final for {}",
                referrer,
                info.display_name(),
                what,
                method
            )));
        }
        Ok(())
    }

    fn derive_simple(&mut self, def: &SimpleTypeDef) -> Result<TypeInfo> {
        let referrer = match &def.name {
            Some(name) => format!("simple type '{}'", name),
            None => "anonymous simple type".to_string(),
        };
        let name = def.name.clone();
        let (base, validator) = match &def.variety {
            SimpleVariety::Restriction { base, facets } => {
                let base = self
                    .resolution
                    .type_use(base)?
                    .ok_or_else(|| Error::structural(format!("{} has no base", referrer)))?;
                if base.is_any_type() {
                    return Err(Error::derivation(format!("{} cannot restrict xs:anyType", referrer)));
                }
                self.check_final(&referrer, base, DerivationSet::RESTRICTION, "a base")?;
                let base_validator = self.simple_validator(&referrer, base)?;
                let validator = self.out.validators.restrict(base_validator, name.clone(), facets)?;
                (base, validator)
            }
            SimpleVariety::List { item } => {
                let item = self
                    .resolution
                    .type_use(item)?
                    .ok_or_else(|| Error::structural(format!("{} has no item type", referrer)))?;
                self.check_final(&referrer, item, DerivationSet::LIST, "an item type")?;
                let item_validator = self.simple_validator(&referrer, item)?;
                let validator = self.out.validators.list(name.clone(), item_validator)?;
                (TypeRef::Builtin(Builtin::AnySimpleType), validator)
            }
            SimpleVariety::Union { members } => {
                let mut ids = Vec::with_capacity(members.len());
                for member in members {
                    let member = self
                        .resolution
                        .type_use(member)?
                        .ok_or_else(|| Error::structural(format!("{} has an empty member", referrer)))?;
                    self.check_final(&referrer, member, DerivationSet::UNION, "a member type")?;
                    ids.push(self.simple_validator(&referrer, member)?);
                }
                let validator = self.out.validators.union(name.clone(), ids)?;
                (TypeRef::Builtin(Builtin::AnySimpleType), validator)
            }
        };
        let mut info = TypeInfo::simple(name, Some(base), validator);
        info.final_set = def.final_set;
        Ok(info)
    }

    /// Attribute uses of a type or group body, with attribute group
    /// references flattened in place
    fn flatten_attributes(
        &self,
        referrer: &str,
        items: &[AttributeItem],
        local_wildcard: Option<&Wildcard>,
    ) -> Result<(Vec<(AttributeUseInfo, AttributeUse)>, Option<Wildcard>)> {
        let mut uses: Vec<(AttributeUseInfo, AttributeUse)> = Vec::new();
        let mut group_wildcards = Vec::new();
        let mut stack: Vec<std::slice::Iter<'_, AttributeItem>> = vec![items.iter()];
        while let Some(iter) = stack.last_mut() {
            let Some(item) = iter.next() else {
                stack.pop();
                continue;
            };
            match item {
                AttributeItem::GroupRef(name) => {
                    let group = self.schema.attribute_group(self.resolution.attribute_group(name)?);
                    if let Some(wildcard) = &group.any_attribute {
                        group_wildcards.push(wildcard.clone());
                    }
                    stack.push(group.attributes.iter());
                }
                AttributeItem::Use(attribute_use) => {
                    let decl = match &attribute_use.target {
                        AttributeTarget::Local(key) => *key,
                        AttributeTarget::Ref(name) => self.resolution.attribute(name)?,
                    };
                    let declaration = self.schema.attribute(decl);
                    let value_constraint = match (&attribute_use.value_constraint, &declaration.value_constraint) {
                        (Some(ValueConstraint::Fixed(a)), Some(ValueConstraint::Fixed(b))) if a != b => {
                            return Err(Error::structural(format!(
                                "{}: fixed value '{}' of attribute '{}' conflicts with its declaration's '{}'",
                                referrer, a, declaration.name, b
                            )));
                        }
                        (Some(own), _) => Some(own.clone()),
                        (None, inherited) => inherited.clone(),
                    };
                    let info = AttributeUseInfo {
                        name: declaration.name.clone(),
                        decl,
                        required: attribute_use.use_ == AttributeUse::Required,
                        value_constraint,
                    };
                    match uses.iter().position(|(u, _)| u.name == info.name) {
                        Some(i) if uses[i].0.decl == info.decl => {}
                        Some(_) => {
                            return Err(Error::structural(format!(
                                "{} declares attribute '{}' twice",
                                referrer, info.name
                            )));
                        }
                        None => uses.push((info, attribute_use.use_)),
                    }
                }
            }
        }

        let mut wildcard = local_wildcard.cloned();
        for group_wildcard in group_wildcards {
            wildcard = Some(match wildcard {
                Some(current) => current.intersection(&group_wildcard)?,
                None => group_wildcard,
            });
        }
        Ok((uses, wildcard))
    }

    fn derive_complex(&mut self, def: &ComplexTypeDef) -> Result<TypeInfo> {
        let referrer = format!("complex type '{}'", def.display_name());
        let base = match &def.base {
            Some(name) => self.resolution.type_ref(name)?,
            None => TypeRef::Builtin(Builtin::AnyType),
        };
        let method = def.derivation;
        if def.base.is_some() {
            self.check_final(&referrer, base, method.as_set(), "a base")?;
        }
        let base_info = self.info(base)?.clone();

        let mut info = TypeInfo {
            name: def.name.clone(),
            simple: false,
            base: Some(base),
            method,
            content: ContentKind::Empty,
            particle: None,
            attributes: Vec::new(),
            any_attribute: None,
            validator: None,
            is_abstract: def.is_abstract,
            block: def.block,
            final_set: def.final_set,
        };

        match &def.content {
            ComplexContent::Simple { facets, inline } => {
                let validator = match method {
                    DerivationMethod::Extension => {
                        if base_info.content != ContentKind::Simple {
                            return Err(Error::derivation(format!(
                                "{} extends '{}' with simple content, but its base has no simple content",
                                referrer,
                                base_info.display_name()
                            )));
                        }
                        base_info.validator.ok_or_else(|| {
                            Error::derivation(format!("{}: base has no text validator", referrer))
                        })?
                    }
                    DerivationMethod::Restriction => {
                        if base_info.simple || base_info.content != ContentKind::Simple {
                            return Err(Error::derivation(format!(
                                "{} restricts '{}' with simple content; the base must be a complex type with simple content",
                                referrer,
                                base_info.display_name()
                            )));
                        }
                        let start = match inline {
                            Some(inline) => self.simple_validator(&referrer, TypeRef::User(*inline))?,
                            None => base_info.validator.ok_or_else(|| {
                                Error::derivation(format!("{}: base has no text validator", referrer))
                            })?,
                        };
                        self.out.validators.restrict(start, def.name.clone(), facets)?
                    }
                };
                info.content = ContentKind::Simple;
                info.validator = Some(validator);
            }
            ComplexContent::Elements(own) => {
                if def.base.is_some() && base_info.simple {
                    return Err(Error::derivation(format!(
                        "{} derives complex content from simple type '{}'",
                        referrer,
                        base_info.display_name()
                    )));
                }
                let own = own.clone().filter(|p| !p.is_empty() && !is_empty_group(p));
                let particle = match method {
                    DerivationMethod::Restriction => own,
                    DerivationMethod::Extension => {
                        if base_info.content == ContentKind::Simple {
                            if own.is_some() {
                                return Err(Error::derivation(format!(
                                    "{} adds element content to simple content type '{}'",
                                    referrer,
                                    base_info.display_name()
                                )));
                            }
                            info.content = ContentKind::Simple;
                            info.validator = base_info.validator;
                            None
                        } else {
                            if base_info.particle.is_some()
                                && base_info.content == ContentKind::ElementOnly
                                && def.mixed
                            {
                                return Err(Error::derivation(format!(
                                    "{} is mixed but extends element-only '{}'",
                                    referrer,
                                    base_info.display_name()
                                )));
                            }
                            match (base_info.particle.clone(), own) {
                                (Some(base), Some(own)) => {
                                    let mut group = ModelGroup::new(Compositor::Sequence);
                                    group.push(base);
                                    group.push(own);
                                    Some(Particle::once(Term::Group(group)))
                                }
                                (base, own) => base.or(own),
                            }
                        }
                    }
                };
                if info.content != ContentKind::Simple {
                    let mixed = def.mixed
                        || (method == DerivationMethod::Extension && base_info.content == ContentKind::Mixed && def.base.is_some());
                    info.content = match (&particle, mixed) {
                        (_, true) => ContentKind::Mixed,
                        (Some(_), false) => ContentKind::ElementOnly,
                        (None, false) => ContentKind::Empty,
                    };
                    info.particle = particle;
                }
            }
        }

        let (own_uses, own_wildcard) =
            self.flatten_attributes(&referrer, &def.attributes, def.any_attribute.as_ref())?;
        let (attributes, any_attribute) = match method {
            DerivationMethod::Extension => {
                let mut attributes = base_info.attributes.clone();
                for (attribute, use_) in own_uses {
                    if use_ == AttributeUse::Prohibited {
                        continue;
                    }
                    if attributes.iter().any(|a| a.name == attribute.name) {
                        return Err(Error::derivation(format!(
                            "{} redeclares inherited attribute '{}'",
                            referrer, attribute.name
                        )));
                    }
                    attributes.push(attribute);
                }
                let wildcard = match (own_wildcard, &base_info.any_attribute) {
                    (Some(own), Some(inherited)) if !base.is_any_type() => Some(own.union(inherited)?),
                    (Some(own), _) => Some(own),
                    (None, inherited) if !base.is_any_type() => inherited.clone(),
                    (None, _) => None,
                };
                (attributes, wildcard)
            }
            DerivationMethod::Restriction => {
                let mut attributes = base_info.attributes.clone();
                for (attribute, use_) in own_uses {
                    let inherited = attributes.iter().position(|a| a.name == attribute.name);
                    match (inherited, use_) {
                        (Some(i), AttributeUse::Prohibited) => {
                            if attributes[i].required {
                                return Err(Error::derivation(format!(
                                    "{} prohibits attribute '{}', which its base requires",
                                    referrer, attribute.name
                                )));
                            }
                            attributes.remove(i);
                        }
                        (None, AttributeUse::Prohibited) => {}
                        (Some(i), _) => {
                            if attributes[i].required && !attribute.required {
                                return Err(Error::derivation(format!(
                                    "{} makes required attribute '{}' optional",
                                    referrer, attribute.name
                                )));
                            }
                            attributes[i] = attribute;
                        }
                        (None, _) => {
                            let admitted = base_info
                                .any_attribute
                                .as_ref()
                                .map_or(false, |w| w.allows(&attribute.name.namespace));
                            if !admitted {
                                return Err(Error::derivation(format!(
                                    "{} adds attribute '{}', which its base does not allow",
                                    referrer, attribute.name
                                )));
                            }
                            attributes.push(attribute);
                        }
                    }
                }
                (attributes, own_wildcard)
            }
        };
        info.attributes = attributes;
        info.any_attribute = any_attribute;
        Ok(info)
    }

    fn check_value(&self, what: &str, validator: ValidatorId, value: &str) -> Result<()> {
        let qname_based = self
            .out
            .validators
            .get(validator)
            .and_then(|v| v.atomic())
            .map_or(false, |b| b.value_kind() == ValueKind::QName || b.derives_from(Builtin::Id));
        if qname_based {
            return Ok(());
        }
        self.out
            .validators
            .validate(validator, value, &NamespaceContext::new())
            .map(|_| ())
            .map_err(|message| Error::structural(format!("invalid value constraint of {}: {}", what, message)))
    }
}

fn is_empty_group(particle: &Particle) -> bool {
    matches!(&particle.term, Term::Group(group) if group.is_empty() && group.compositor != Compositor::Choice)
}

/// Compute derived properties of every type, element, and attribute
pub fn derive(schema: &ParsedSchema, resolution: &Resolution, type_order: &[TypeKey]) -> Result<Derivations> {
    let mut validators = ValidatorTable::new();
    let mut builtins = Vec::with_capacity(Builtin::ALL.len());
    let mut builtin_validators: Vec<Option<ValidatorId>> = Vec::with_capacity(Builtin::ALL.len());
    for &builtin in Builtin::ALL {
        if builtin == Builtin::AnyType {
            builtins.push(TypeInfo::any_type());
            builtin_validators.push(None);
            continue;
        }
        let item = builtin
            .list_item()
            .and_then(|item| builtin_validators.get(item as usize).copied().flatten());
        let validator = validators.add_builtin(builtin, item);
        builtin_validators.push(Some(validator));
        let base = builtin.base().map(TypeRef::Builtin);
        builtins.push(TypeInfo::simple(Some(builtin.qname()), base, validator));
    }

    let mut deriver = Deriver {
        schema,
        resolution,
        out: Derivations {
            builtins,
            users: vec![None; schema.types.len()],
            element_types: Vec::with_capacity(schema.elements.len()),
            attribute_validators: vec![None; schema.attributes.len()],
            validators,
        },
    };

    for &key in type_order {
        let info = match schema.type_def(key) {
            TypeDef::Simple(def) => deriver.derive_simple(def)?,
            TypeDef::Complex(def) => deriver.derive_complex(def)?,
        };
        tracing::trace!(type_name = info.display_name().as_str(), content = ?info.content, "derived type");
        deriver.out.users[key.index()] = Some(info);
    }

    // Attribute validators; every type is complete now
    for (index, decl) in schema.attributes.iter().enumerate() {
        let referrer = format!("attribute '{}'", decl.name);
        let type_ref = resolution
            .type_use(&decl.type_use)?
            .unwrap_or(TypeRef::Builtin(Builtin::AnySimpleType));
        let validator = deriver.simple_validator(&referrer, type_ref)?;
        if let Some(constraint) = &decl.value_constraint {
            deriver.check_value(&referrer, validator, constraint.value())?;
        }
        deriver.out.attribute_validators[index] = Some(validator);
    }
    for key in (0..schema.types.len()).map(TypeKey::from_index) {
        let uses = match deriver.out.users[key.index()].as_ref() {
            Some(info) => info.attributes.clone(),
            None => continue,
        };
        for attribute in uses {
            if let Some(constraint) = &attribute.value_constraint {
                let validator = deriver.out.attribute_validator(attribute.decl)?;
                deriver.check_value(&format!("attribute '{}'", attribute.name), validator, constraint.value())?;
            }
        }
    }

    // Element types; substitution heads are resolved before their members
    let mut element_types: Vec<Option<TypeRef>> = vec![None; schema.elements.len()];
    for index in 0..schema.elements.len() {
        let mut chain = vec![ElementKey::from_index(index)];
        let resolved = loop {
            let Some(&current) = chain.last() else {
                break TypeRef::Builtin(Builtin::AnyType);
            };
            if let Some(known) = element_types[current.index()] {
                break known;
            }
            let decl = schema.element(current);
            if let Some(type_ref) = resolution.type_use(&decl.type_use)? {
                break type_ref;
            }
            match &decl.substitution_group {
                Some(head) => chain.push(resolution.element(head)?),
                None => break TypeRef::Builtin(Builtin::AnyType),
            }
        };
        for key in chain {
            element_types[key.index()] = Some(resolved);
        }
    }
    deriver.out.element_types = element_types
        .into_iter()
        .map(|t| t.unwrap_or(TypeRef::Builtin(Builtin::AnyType)))
        .collect();

    for (index, decl) in schema.elements.iter().enumerate() {
        let type_ref = deriver.out.element_types[index];
        let info = deriver.out.info(type_ref)?;
        if let Some(constraint) = &decl.value_constraint {
            let what = format!("element '{}'", decl.name);
            match (info.content, info.validator) {
                (ContentKind::Simple, Some(validator)) => {
                    deriver.check_value(&what, validator, constraint.value())?;
                }
                (ContentKind::Mixed, _) => {}
                _ => {
                    return Err(Error::structural(format!(
                        "{} has a value constraint but no simple or mixed content",
                        what
                    )));
                }
            }
        }
        if let Some(head_name) = &decl.substitution_group {
            let head = schema.element(resolution.element(head_name)?);
            let head_type = deriver.out.element_types[resolution.element(head_name)?.index()];
            let mask = deriver.out.derivation_mask(type_ref, head_type).ok_or_else(|| {
                Error::derivation(format!(
                    "type of element '{}' does not derive from the type of its head '{}'",
                    decl.name, head.name
                ))
            })?;
            if head.final_set.intersects(mask) {
                return Err(Error::derivation(format!(
                    "element '{}' cannot join the substitution group of '{}': head is final for {}",
                    decl.name, head.name, head.final_set
                )));
            }
        }
    }

    check_abstract_groups(schema, resolution)?;

    tracing::debug!(
        types = schema.types.len(),
        validators = deriver.out.validators.len(),
        "derived type properties"
    );
    Ok(deriver.out)
}

/// Reject abstract heads whose whole substitution group is abstract
fn check_abstract_groups(schema: &ParsedSchema, resolution: &Resolution) -> Result<()> {
    for (head_name, direct) in &schema.substitution_groups {
        let head = schema.element(resolution.element(head_name)?);
        if !head.is_abstract || direct.is_empty() {
            continue;
        }
        let mut pending: Vec<&QName> = direct.iter().collect();
        let mut concrete = false;
        while let Some(member) = pending.pop() {
            let decl = schema.element(resolution.element(member)?);
            if !decl.is_abstract {
                concrete = true;
                break;
            }
            if let Some(more) = schema.substitution_groups.get(member) {
                pending.extend(more.iter());
            }
        }
        if !concrete {
            return Err(Error::structural(format!(
                "abstract element '{}' has only abstract substitution group members",
                head.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::CompileConfig;
    use crate::loaders::MemoryLoader;
    use crate::validators::cycles::check_cycles;
    use crate::validators::parsing::parse_schema;
    use crate::validators::resolver::resolve;

    fn derived(body: &str) -> Result<(ParsedSchema, Resolution, Derivations)> {
        let xml = format!(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">{}</xs:schema>"#,
            body
        );
        let loader = MemoryLoader::new().with_document("s.xsd", xml);
        let schema = parse_schema(&loader, "s.xsd", &CompileConfig::default())?;
        let resolution = resolve(&schema)?;
        let order = check_cycles(&schema, &resolution)?;
        let derivations = derive(&schema, &resolution, &order)?;
        Ok((schema, resolution, derivations))
    }

    fn type_info<'a>(d: &'a (ParsedSchema, Resolution, Derivations), name: &str) -> &'a TypeInfo {
        let key = d.0.global_types[&QName::local(name)];
        d.2.info(TypeRef::User(key)).unwrap()
    }

    #[test]
    fn test_extension_appends_content_and_attributes() {
        let d = derived(
            r#"<xs:complexType name="Base">
                 <xs:sequence><xs:element name="a"/></xs:sequence>
                 <xs:attribute name="x" type="xs:int" use="required"/>
               </xs:complexType>
               <xs:complexType name="Derived">
                 <xs:complexContent>
                   <xs:extension base="Base">
                     <xs:sequence><xs:element name="b"/></xs:sequence>
                     <xs:attribute name="y" type="xs:string"/>
                   </xs:extension>
                 </xs:complexContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let info = type_info(&d, "Derived");
        assert_eq!(info.content, ContentKind::ElementOnly);
        match &info.particle {
            Some(Particle { term: Term::Group(group), .. }) => {
                assert_eq!(group.compositor, Compositor::Sequence);
                assert_eq!(group.len(), 2);
            }
            other => panic!("unexpected particle {:?}", other),
        }
        let names: Vec<_> = info.attributes.iter().map(|a| a.name.local.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
        assert!(info.attributes[0].required);
    }

    #[test]
    fn test_restriction_prohibits_attribute() {
        let d = derived(
            r#"<xs:complexType name="Base">
                 <xs:attribute name="x" type="xs:int"/>
                 <xs:attribute name="y" type="xs:int"/>
               </xs:complexType>
               <xs:complexType name="Derived">
                 <xs:complexContent>
                   <xs:restriction base="Base">
                     <xs:attribute name="y" use="prohibited"/>
                   </xs:restriction>
                 </xs:complexContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let info = type_info(&d, "Derived");
        assert_eq!(info.attributes.len(), 1);
        assert_eq!(info.attributes[0].name, QName::local("x"));
        assert_eq!(info.content, ContentKind::Empty);
    }

    #[test]
    fn test_final_blocks_derivation() {
        let result = derived(
            r#"<xs:simpleType name="Base" final="restriction"><xs:restriction base="xs:string"/></xs:simpleType>
               <xs:simpleType name="Derived"><xs:restriction base="Base"/></xs:simpleType>"#,
        );
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_simple_content_validator() {
        let d = derived(
            r#"<xs:complexType name="Price">
                 <xs:simpleContent>
                   <xs:extension base="xs:decimal"><xs:attribute name="currency" type="xs:string"/></xs:extension>
                 </xs:simpleContent>
               </xs:complexType>
               <xs:complexType name="SmallPrice">
                 <xs:simpleContent>
                   <xs:restriction base="Price"><xs:maxInclusive value="10"/></xs:restriction>
                 </xs:simpleContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let small = type_info(&d, "SmallPrice");
        assert_eq!(small.content, ContentKind::Simple);
        assert_eq!(small.attributes.len(), 1);
        let validator = small.validator.unwrap();
        let ns = NamespaceContext::new();
        assert!(d.2.validators.validate(validator, "9.5", &ns).is_ok());
        assert!(d.2.validators.validate(validator, "11", &ns).is_err());
    }

    #[test]
    fn test_derivation_mask() {
        let d = derived(
            r#"<xs:complexType name="A"><xs:sequence><xs:element name="a"/></xs:sequence></xs:complexType>
               <xs:complexType name="B">
                 <xs:complexContent><xs:extension base="A"/></xs:complexContent>
               </xs:complexType>"#,
        )
        .unwrap();
        let a = TypeRef::User(d.0.global_types[&QName::local("A")]);
        let b = TypeRef::User(d.0.global_types[&QName::local("B")]);
        assert_eq!(d.2.derivation_mask(b, a), Some(DerivationSet::EXTENSION));
        assert_eq!(d.2.derivation_mask(a, b), None);
        assert_eq!(
            d.2.derivation_mask(TypeRef::Builtin(Builtin::Int), TypeRef::Builtin(Builtin::Decimal)),
            Some(DerivationSet::RESTRICTION)
        );
    }

    #[test]
    fn test_element_type_from_head() {
        let d = derived(
            r#"<xs:element name="head" type="xs:string"/>
               <xs:element name="member" substitutionGroup="head"/>"#,
        )
        .unwrap();
        let member = d.0.global_elements[&QName::local("member")];
        assert_eq!(d.2.element_type(member), TypeRef::Builtin(Builtin::String));
    }

    #[test]
    fn test_member_type_must_derive_from_head() {
        let result = derived(
            r#"<xs:element name="head" type="xs:int"/>
               <xs:element name="member" type="xs:string" substitutionGroup="head"/>"#,
        );
        assert!(matches!(result, Err(Error::Derivation(_))));
    }

    #[test]
    fn test_abstract_group_rejected() {
        let result = derived(
            r#"<xs:element name="head" abstract="true"/>
               <xs:element name="member" abstract="true" substitutionGroup="head"/>"#,
        );
        assert!(matches!(result, Err(Error::Structural(_))));
    }

    #[test]
    fn test_invalid_default_rejected() {
        let result = derived(r#"<xs:element name="n" type="xs:int" default="abc"/>"#);
        assert!(matches!(result, Err(Error::Structural(_))));
        let result = derived(r#"<xs:attribute name="n" type="xs:boolean" fixed="true"/>"#);
        assert!(result.is_ok());
    }
}
