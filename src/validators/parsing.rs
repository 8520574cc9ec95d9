//! XSD Document Parsing
//!
//! This module turns schema documents into a [`ParsedSchema`]. Includes and
//! imports are processed with an explicit worklist, never by recursion, so
//! deep include chains cannot exhaust the stack. Every QName reference is
//! stored unresolved; the resolver binds them later.

use std::collections::{HashSet, VecDeque};

use crate::documents::{Document, XmlElement};
use crate::error::{Error, LoadError, Result};
use crate::limits::CompileConfig;
use crate::loaders::SchemaLoader;
use crate::locations::join_location;
use crate::namespaces::{QName, XSD_NAMESPACE};

use super::attributes::{
    AttributeDecl, AttributeItem, AttributeTarget, AttributeUse, AttributeUseDef, Form,
    ValueConstraint,
};
use super::complex_types::{ComplexContent, ComplexTypeDef, DerivationMethod, DerivationSet};
use super::elements::{ElementDecl, TypeUse};
use super::facets::{FacetKind, FacetSpec};
use super::globals::{NotationDecl, ParsedSchema, TypeDef};
use super::groups::{AttributeGroupDef, Compositor, GroupDef, ModelGroup};
use super::identities::{ConstraintKind, IdentityConstraint, PathExpr};
use super::particles::{parse_occurs, Particle, Term};
use super::simple_types::{SimpleTypeDef, SimpleVariety};
use super::wildcards::Wildcard;
use super::{ElementKey, TypeKey};

/// XSD element local names
mod xsd_elements {
    pub const SCHEMA: &str = "schema";
    pub const ELEMENT: &str = "element";
    pub const ATTRIBUTE: &str = "attribute";
    pub const SIMPLE_TYPE: &str = "simpleType";
    pub const COMPLEX_TYPE: &str = "complexType";
    pub const GROUP: &str = "group";
    pub const ATTRIBUTE_GROUP: &str = "attributeGroup";
    pub const NOTATION: &str = "notation";
    pub const INCLUDE: &str = "include";
    pub const IMPORT: &str = "import";
    pub const REDEFINE: &str = "redefine";
    pub const OVERRIDE: &str = "override";
    pub const SIMPLE_CONTENT: &str = "simpleContent";
    pub const COMPLEX_CONTENT: &str = "complexContent";
    pub const RESTRICTION: &str = "restriction";
    pub const EXTENSION: &str = "extension";
    pub const LIST: &str = "list";
    pub const UNION: &str = "union";
    pub const ANY: &str = "any";
    pub const ANY_ATTRIBUTE: &str = "anyAttribute";
    pub const SELECTOR: &str = "selector";
    pub const FIELD: &str = "field";
}

use xsd_elements as xe;

/// Pending schema work item for iterative processing
#[derive(Debug, Clone)]
struct PendingSchemaWork {
    /// Location of the document, resolved against its referrer
    location: String,
    /// Namespace of the including document, for chameleon includes
    includer_namespace: Option<String>,
    /// Namespace an import requires the document to declare
    import_namespace: Option<String>,
}

/// Per-document defaults from the `xs:schema` element
#[derive(Debug, Clone)]
struct DocumentContext {
    location: String,
    target_namespace: String,
    /// The document had no targetNamespace and adopted its includer's
    chameleon: bool,
    element_form: Form,
    attribute_form: Form,
    block_default: DerivationSet,
    final_default: DerivationSet,
}

impl DocumentContext {
    fn error(&self, elem: &XmlElement, message: impl std::fmt::Display) -> Error {
        Error::Load(
            LoadError::new(format!("line {}: {}", elem.line, message))
                .with_location(self.location.clone()),
        )
    }

    fn global_name(&self, elem: &XmlElement) -> Result<QName> {
        let name = elem
            .attribute("name")
            .ok_or_else(|| self.error(elem, format!("<{}> requires a 'name'", elem.local_name())))?;
        Ok(QName::new(self.target_namespace.clone(), name.trim()))
    }

    /// Resolve a QName-valued attribute, applying chameleon adoption to
    /// unqualified references
    fn reference(&self, elem: &XmlElement, attr: &str) -> Result<Option<QName>> {
        let qname = elem
            .qname_attribute(attr)
            .map_err(|e| self.relocate(e))?;
        Ok(qname.map(|q| self.adopt(q)))
    }

    fn adopt(&self, qname: QName) -> QName {
        if self.chameleon && qname.namespace.is_empty() {
            QName::new(self.target_namespace.clone(), qname.local)
        } else {
            qname
        }
    }

    fn relocate(&self, error: Error) -> Error {
        match error {
            Error::Load(load) if load.location.is_none() => {
                Error::Load(load.with_location(self.location.clone()))
            }
            other => other,
        }
    }
}

fn parse_bool(ctx: &DocumentContext, elem: &XmlElement, attr: &str) -> Result<bool> {
    match elem.attribute(attr).map(str::trim) {
        None => Ok(false),
        Some("true") | Some("1") => Ok(true),
        Some("false") | Some("0") => Ok(false),
        Some(other) => Err(ctx.error(elem, format!("invalid boolean {}=\"{}\"", attr, other))),
    }
}

/// Schema parser driving the include/import worklist
pub struct SchemaParser<'a> {
    loader: &'a dyn SchemaLoader,
    config: &'a CompileConfig,
    schema: ParsedSchema,
    queue: VecDeque<PendingSchemaWork>,
    seen: HashSet<(String, String)>,
    unlocated_imports: Vec<String>,
}

impl<'a> SchemaParser<'a> {
    /// Create a parser over a loader
    pub fn new(loader: &'a dyn SchemaLoader, config: &'a CompileConfig) -> Self {
        Self {
            loader,
            config,
            schema: ParsedSchema::new(),
            queue: VecDeque::new(),
            seen: HashSet::new(),
            unlocated_imports: Vec::new(),
        }
    }

    /// Parse the document at `entry` and everything it includes or imports
    pub fn parse(mut self, entry: &str) -> Result<ParsedSchema> {
        self.queue.push_back(PendingSchemaWork {
            location: entry.to_string(),
            includer_namespace: None,
            import_namespace: None,
        });
        while let Some(work) = self.queue.pop_front() {
            self.process(work)?;
        }
        for namespace in std::mem::take(&mut self.unlocated_imports) {
            if namespace != XSD_NAMESPACE && !self.schema.has_namespace(&namespace) {
                tracing::warn!(
                    namespace = namespace.as_str(),
                    "import without schemaLocation names a namespace that was never loaded"
                );
            }
        }
        tracing::debug!(
            documents = self.schema.documents.len(),
            declarations = self.schema.declaration_order.len(),
            types = self.schema.types.len(),
            elements = self.schema.elements.len(),
            "parsed schema set"
        );
        Ok(self.schema)
    }

    fn process(&mut self, work: PendingSchemaWork) -> Result<()> {
        let key = (
            work.location.clone(),
            work.includer_namespace.clone().unwrap_or_default(),
        );
        if !self.seen.insert(key) {
            return Ok(());
        }
        self.loader
            .options()
            .check_document_count(self.schema.documents.len() + 1)?;
        let bytes = self.loader.load(&work.location)?;
        let document = Document::parse(&bytes).map_err(|e| match e {
            Error::Load(load) => Error::Load(load.with_location(work.location.clone())),
            other => other,
        })?;
        let root = &document.root;
        if !root.is_xsd(xe::SCHEMA) {
            return Err(Error::Load(
                LoadError::new(format!("root element is {}, not xs:schema", root.name))
                    .with_location(work.location.clone()),
            ));
        }

        let declared = root.attribute("targetNamespace").map(|s| s.trim().to_string());
        let (target_namespace, chameleon) = match (&work.includer_namespace, declared) {
            (Some(includer), None) => (includer.clone(), !includer.is_empty()),
            (Some(includer), Some(declared)) if &declared != includer => {
                return Err(Error::Load(
                    LoadError::new(format!(
                        "included document has targetNamespace '{}', expected '{}'",
                        declared, includer
                    ))
                    .with_location(work.location.clone()),
                ));
            }
            (_, declared) => (declared.unwrap_or_default(), false),
        };
        if let Some(expected) = &work.import_namespace {
            if expected != &target_namespace {
                return Err(Error::Load(
                    LoadError::new(format!(
                        "imported document has targetNamespace '{}', import expects '{}'",
                        target_namespace, expected
                    ))
                    .with_location(work.location.clone()),
                ));
            }
        }

        let mut ctx = DocumentContext {
            location: work.location.clone(),
            target_namespace,
            chameleon,
            element_form: Form::Unqualified,
            attribute_form: Form::Unqualified,
            block_default: DerivationSet::empty(),
            final_default: DerivationSet::empty(),
        };
        if let Some(value) = root.attribute("elementFormDefault") {
            ctx.element_form = Form::parse(value).map_err(|e| ctx.relocate(e))?;
        }
        if let Some(value) = root.attribute("attributeFormDefault") {
            ctx.attribute_form = Form::parse(value).map_err(|e| ctx.relocate(e))?;
        }
        if let Some(value) = root.attribute("blockDefault") {
            ctx.block_default = DerivationSet::from_attr(value, DerivationSet::ELEMENT_BLOCK)
                .map_err(|e| ctx.relocate(e))?;
        }
        if let Some(value) = root.attribute("finalDefault") {
            let allowed = DerivationSet::COMPLEX.union(DerivationSet::SIMPLE_FINAL);
            ctx.final_default =
                DerivationSet::from_attr(value, allowed).map_err(|e| ctx.relocate(e))?;
        }

        tracing::trace!(
            location = ctx.location.as_str(),
            namespace = ctx.target_namespace.as_str(),
            chameleon = ctx.chameleon,
            "parsing schema document"
        );
        self.schema.documents.push(ctx.location.clone());
        if !self.schema.has_namespace(&ctx.target_namespace) {
            self.schema
                .target_namespaces
                .push(ctx.target_namespace.clone());
        }

        for child in root.xsd_children() {
            self.parse_schema_child(&ctx, child)?;
        }
        Ok(())
    }

    fn parse_schema_child(&mut self, ctx: &DocumentContext, elem: &XmlElement) -> Result<()> {
        match elem.local_name() {
            xe::INCLUDE => {
                let location = elem
                    .attribute("schemaLocation")
                    .ok_or_else(|| ctx.error(elem, "xs:include requires a schemaLocation"))?;
                self.queue.push_back(PendingSchemaWork {
                    location: join_location(&ctx.location, location),
                    includer_namespace: Some(ctx.target_namespace.clone()),
                    import_namespace: None,
                });
            }
            xe::IMPORT => {
                let namespace = elem
                    .attribute("namespace")
                    .map(|s| s.trim().to_string())
                    .unwrap_or_default();
                if namespace == ctx.target_namespace {
                    return Err(ctx.error(elem, "xs:import of the document's own target namespace"));
                }
                match elem.attribute("schemaLocation") {
                    Some(location) => self.queue.push_back(PendingSchemaWork {
                        location: join_location(&ctx.location, location),
                        includer_namespace: None,
                        import_namespace: Some(namespace),
                    }),
                    None => self.unlocated_imports.push(namespace),
                }
            }
            xe::REDEFINE | xe::OVERRIDE => {
                return Err(ctx.error(elem, format!("xs:{} is not supported", elem.local_name())));
            }
            xe::ELEMENT => {
                let key = self.parse_element(ctx, elem, true)?;
                let name = self.schema.element(key).name.clone();
                self.schema.register_element(name, key)?;
            }
            xe::ATTRIBUTE => {
                let name = ctx.global_name(elem)?;
                let decl = self.parse_attribute_decl(ctx, elem, name.clone(), true)?;
                let key = self.schema.add_attribute(decl);
                self.schema.register_attribute(name, key)?;
            }
            xe::SIMPLE_TYPE => {
                let name = ctx.global_name(elem)?;
                let key = self.parse_simple_type(ctx, elem, Some(name.clone()))?;
                self.schema.register_type(name, key)?;
            }
            xe::COMPLEX_TYPE => {
                let name = ctx.global_name(elem)?;
                let key = self.parse_complex_type(ctx, elem, Some(name.clone()))?;
                self.schema.register_type(name, key)?;
            }
            xe::GROUP => {
                let name = ctx.global_name(elem)?;
                let group = elem
                    .xsd_children()
                    .find_map(|c| Compositor::from_local_name(c.local_name()).map(|k| (c, k)));
                let group = match group {
                    Some((child, compositor)) => {
                        if child.attribute("minOccurs").is_some() || child.attribute("maxOccurs").is_some() {
                            return Err(ctx.error(child, "the model group of a named group cannot carry occurrence bounds"));
                        }
                        self.parse_model_group(ctx, child, compositor)?
                    }
                    None => return Err(ctx.error(elem, "xs:group needs a sequence, choice, or all")),
                };
                self.schema.add_group(GroupDef {
                    name,
                    group,
                    line: elem.line,
                })?;
            }
            xe::ATTRIBUTE_GROUP => {
                let name = ctx.global_name(elem)?;
                let (attributes, any_attribute) = self.parse_attribute_items(ctx, elem)?;
                self.schema.add_attribute_group(AttributeGroupDef {
                    name,
                    attributes,
                    any_attribute,
                    line: elem.line,
                })?;
            }
            xe::NOTATION => {
                let name = ctx.global_name(elem)?;
                self.schema.add_notation(NotationDecl {
                    name,
                    public: elem.attribute("public").map(str::to_string),
                    system: elem.attribute("system").map(str::to_string),
                })?;
            }
            other => {
                return Err(ctx.error(elem, format!("unexpected xs:{} at schema level", other)));
            }
        }
        Ok(())
    }

    // =========================================================================
    // Declarations
    // =========================================================================

    fn parse_type_use(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        attr: &str,
        allow_complex: bool,
    ) -> Result<TypeUse> {
        let named = ctx.reference(elem, attr)?;
        let inline_simple = elem.xsd_child(xe::SIMPLE_TYPE);
        let inline_complex = elem.xsd_child(xe::COMPLEX_TYPE);
        if inline_complex.is_some() && !allow_complex {
            return Err(ctx.error(elem, "an anonymous complex type is not allowed here"));
        }
        match (named, inline_simple, inline_complex) {
            (Some(_), Some(_), _) | (Some(_), _, Some(_)) | (None, Some(_), Some(_)) => Err(
                ctx.error(elem, format!("'{}' and an anonymous type are mutually exclusive", attr)),
            ),
            (Some(name), None, None) => Ok(TypeUse::Named(name)),
            (None, Some(simple), None) => {
                Ok(TypeUse::Anonymous(self.parse_simple_type(ctx, simple, None)?))
            }
            (None, None, Some(complex)) => {
                Ok(TypeUse::Anonymous(self.parse_complex_type(ctx, complex, None)?))
            }
            (None, None, None) => Ok(TypeUse::Unspecified),
        }
    }

    fn parse_element(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        global: bool,
    ) -> Result<ElementKey> {
        let name = if global {
            ctx.global_name(elem)?
        } else {
            let local = elem
                .attribute("name")
                .ok_or_else(|| ctx.error(elem, "a local xs:element needs 'name' or 'ref'"))?
                .trim();
            let form = match elem.attribute("form") {
                Some(value) => Form::parse(value).map_err(|e| ctx.relocate(e))?,
                None => ctx.element_form,
            };
            match form {
                Form::Qualified => QName::new(ctx.target_namespace.clone(), local),
                Form::Unqualified => QName::local(local),
            }
        };
        let mut decl = ElementDecl::new(name, global);
        decl.line = elem.line;
        decl.type_use = self.parse_type_use(ctx, elem, "type", true)?;
        decl.nillable = parse_bool(ctx, elem, "nillable")?;
        decl.is_abstract = parse_bool(ctx, elem, "abstract")?;
        if global {
            decl.substitution_group = ctx.reference(elem, "substitutionGroup")?;
        }
        decl.block = match elem.attribute("block") {
            Some(value) => DerivationSet::from_attr(value, DerivationSet::ELEMENT_BLOCK),
            None => Ok(ctx.block_default.intersection(DerivationSet::ELEMENT_BLOCK)),
        }
        .map_err(|e| ctx.relocate(e))?;
        decl.final_set = match elem.attribute("final") {
            Some(value) => DerivationSet::from_attr(value, DerivationSet::COMPLEX),
            None => Ok(ctx.final_default.intersection(DerivationSet::COMPLEX)),
        }
        .map_err(|e| ctx.relocate(e))?;
        decl.value_constraint =
            ValueConstraint::from_attrs(elem.attribute("default"), elem.attribute("fixed"))
                .map_err(|e| ctx.relocate(e))?;

        for child in elem.xsd_children() {
            if let Some(kind) = ConstraintKind::from_local_name(child.local_name()) {
                let constraint = self.parse_identity(ctx, child, kind)?;
                let key = self.schema.add_constraint(constraint)?;
                decl.constraints.push(key);
            }
        }
        Ok(self.schema.add_element(decl))
    }

    fn parse_identity(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        kind: ConstraintKind,
    ) -> Result<IdentityConstraint> {
        let name = ctx.global_name(elem)?;
        let selector = elem
            .xsd_child(xe::SELECTOR)
            .ok_or_else(|| ctx.error(elem, format!("xs:{} needs an xs:selector", kind)))?;
        let xpath = selector
            .attribute("xpath")
            .ok_or_else(|| ctx.error(selector, "xs:selector needs an 'xpath'"))?;
        let selector_expr =
            PathExpr::parse(xpath, false, selector.namespaces()).map_err(|e| ctx.relocate(e))?;
        let mut fields = Vec::new();
        for field in elem.xsd_children().filter(|c| c.local_name() == xe::FIELD) {
            let xpath = field
                .attribute("xpath")
                .ok_or_else(|| ctx.error(field, "xs:field needs an 'xpath'"))?;
            fields.push(PathExpr::parse(xpath, true, field.namespaces()).map_err(|e| ctx.relocate(e))?);
        }
        if fields.is_empty() {
            return Err(ctx.error(elem, format!("xs:{} needs at least one xs:field", kind)));
        }
        let refer = match kind {
            ConstraintKind::KeyRef => Some(
                ctx.reference(elem, "refer")?
                    .ok_or_else(|| ctx.error(elem, "xs:keyref needs a 'refer'"))?,
            ),
            _ => None,
        };
        Ok(IdentityConstraint {
            name,
            kind,
            selector: selector_expr,
            fields,
            refer,
            line: elem.line,
        })
    }

    fn parse_attribute_decl(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        name: QName,
        global: bool,
    ) -> Result<AttributeDecl> {
        let type_use = self.parse_type_use(ctx, elem, "type", false)?;
        let value_constraint = if global {
            ValueConstraint::from_attrs(elem.attribute("default"), elem.attribute("fixed"))
                .map_err(|e| ctx.relocate(e))?
        } else {
            None
        };
        Ok(AttributeDecl {
            name,
            type_use,
            value_constraint,
            global,
            line: elem.line,
        })
    }

    fn parse_attribute_use(&mut self, ctx: &DocumentContext, elem: &XmlElement) -> Result<AttributeUseDef> {
        let use_ = match elem.attribute("use") {
            Some(value) => AttributeUse::parse(value).map_err(|e| ctx.relocate(e))?,
            None => AttributeUse::Optional,
        };
        let value_constraint =
            ValueConstraint::from_attrs(elem.attribute("default"), elem.attribute("fixed"))
                .map_err(|e| ctx.relocate(e))?;
        if matches!(value_constraint, Some(ValueConstraint::Default(_))) && use_ != AttributeUse::Optional {
            return Err(ctx.error(elem, "an attribute with a default must be optional"));
        }
        let target = match ctx.reference(elem, "ref")? {
            Some(name) => AttributeTarget::Ref(name),
            None => {
                let local = elem
                    .attribute("name")
                    .ok_or_else(|| ctx.error(elem, "a local xs:attribute needs 'name' or 'ref'"))?
                    .trim();
                let form = match elem.attribute("form") {
                    Some(value) => Form::parse(value).map_err(|e| ctx.relocate(e))?,
                    None => ctx.attribute_form,
                };
                let name = match form {
                    Form::Qualified => QName::new(ctx.target_namespace.clone(), local),
                    Form::Unqualified => QName::local(local),
                };
                let decl = self.parse_attribute_decl(ctx, elem, name, false)?;
                AttributeTarget::Local(self.schema.add_attribute(decl))
            }
        };
        Ok(AttributeUseDef {
            target,
            use_,
            value_constraint,
        })
    }

    fn parse_attribute_items(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
    ) -> Result<(Vec<AttributeItem>, Option<Wildcard>)> {
        let mut items = Vec::new();
        let mut wildcard = None;
        for child in elem.xsd_children() {
            match child.local_name() {
                xe::ATTRIBUTE => items.push(AttributeItem::Use(self.parse_attribute_use(ctx, child)?)),
                xe::ATTRIBUTE_GROUP => {
                    let name = ctx
                        .reference(child, "ref")?
                        .ok_or_else(|| ctx.error(child, "xs:attributeGroup reference needs 'ref'"))?;
                    items.push(AttributeItem::GroupRef(name));
                }
                xe::ANY_ATTRIBUTE => {
                    if wildcard.is_some() {
                        return Err(ctx.error(child, "more than one xs:anyAttribute"));
                    }
                    wildcard = Some(
                        Wildcard::parse(
                            child.attribute("namespace"),
                            child.attribute("processContents"),
                            &ctx.target_namespace,
                        )
                        .map_err(|e| ctx.relocate(e))?,
                    );
                }
                _ => {}
            }
        }
        Ok((items, wildcard))
    }

    // =========================================================================
    // Types
    // =========================================================================

    fn parse_simple_type(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        name: Option<QName>,
    ) -> Result<TypeKey> {
        let final_set = match elem.attribute("final") {
            Some(value) => DerivationSet::from_attr(value, DerivationSet::SIMPLE_FINAL),
            None => Ok(ctx.final_default.intersection(DerivationSet::SIMPLE_FINAL)),
        }
        .map_err(|e| ctx.relocate(e))?;
        let body = elem
            .xsd_children()
            .find(|c| matches!(c.local_name(), xe::RESTRICTION | xe::LIST | xe::UNION))
            .ok_or_else(|| ctx.error(elem, "xs:simpleType needs a restriction, list, or union"))?;
        let variety = match body.local_name() {
            xe::RESTRICTION => SimpleVariety::Restriction {
                base: self.parse_type_use(ctx, body, "base", false)?,
                facets: self.parse_facets(ctx, body)?,
            },
            xe::LIST => SimpleVariety::List {
                item: self.parse_type_use(ctx, body, "itemType", false)?,
            },
            _ => {
                let mut members = Vec::new();
                if let Some(list) = body.attribute("memberTypes") {
                    for token in list.split_whitespace() {
                        let qname = body
                            .resolve_qname(token)
                            .ok_or_else(|| ctx.error(body, format!("unbound prefix in '{}'", token)))?;
                        members.push(TypeUse::Named(ctx.adopt(qname)));
                    }
                }
                for inline in body.xsd_children().filter(|c| c.local_name() == xe::SIMPLE_TYPE) {
                    members.push(TypeUse::Anonymous(self.parse_simple_type(ctx, inline, None)?));
                }
                SimpleVariety::Union { members }
            }
        };
        if let SimpleVariety::Restriction { base: TypeUse::Unspecified, .. }
        | SimpleVariety::List { item: TypeUse::Unspecified } = variety
        {
            return Err(ctx.error(body, "a base or item type is required"));
        }
        if let SimpleVariety::Union { members } = &variety {
            if members.is_empty() {
                return Err(ctx.error(body, "xs:union needs member types"));
            }
        }
        Ok(self.schema.add_type(TypeDef::Simple(SimpleTypeDef {
            name,
            final_set,
            variety,
            line: elem.line,
        })))
    }

    fn parse_facets(&mut self, ctx: &DocumentContext, elem: &XmlElement) -> Result<Vec<FacetSpec>> {
        let mut facets = Vec::new();
        for child in elem.xsd_children() {
            if let Some(kind) = FacetKind::from_local_name(child.local_name()) {
                let value = child
                    .attribute("value")
                    .ok_or_else(|| ctx.error(child, format!("xs:{} needs a 'value'", kind)))?;
                let mut facet = FacetSpec::new(kind, value);
                facet.fixed = parse_bool(ctx, child, "fixed")?;
                facets.push(facet);
            }
        }
        Ok(facets)
    }

    fn parse_complex_type(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        name: Option<QName>,
    ) -> Result<TypeKey> {
        let mut def = ComplexTypeDef {
            name,
            line: elem.line,
            ..ComplexTypeDef::default()
        };
        def.is_abstract = parse_bool(ctx, elem, "abstract")?;
        def.mixed = parse_bool(ctx, elem, "mixed")?;
        def.block = match elem.attribute("block") {
            Some(value) => DerivationSet::from_attr(value, DerivationSet::COMPLEX),
            None => Ok(ctx.block_default.intersection(DerivationSet::COMPLEX)),
        }
        .map_err(|e| ctx.relocate(e))?;
        def.final_set = match elem.attribute("final") {
            Some(value) => DerivationSet::from_attr(value, DerivationSet::COMPLEX),
            None => Ok(ctx.final_default.intersection(DerivationSet::COMPLEX)),
        }
        .map_err(|e| ctx.relocate(e))?;

        let content_elem = elem
            .xsd_children()
            .find(|c| matches!(c.local_name(), xe::SIMPLE_CONTENT | xe::COMPLEX_CONTENT));
        match content_elem {
            Some(content) => {
                let simple = content.local_name() == xe::SIMPLE_CONTENT;
                if !simple && content.attribute("mixed").is_some() {
                    def.mixed = parse_bool(ctx, content, "mixed")?;
                }
                let body = content
                    .xsd_children()
                    .find(|c| matches!(c.local_name(), xe::RESTRICTION | xe::EXTENSION))
                    .ok_or_else(|| ctx.error(content, "expected xs:restriction or xs:extension"))?;
                def.derivation = DerivationMethod::from_local_name(body.local_name())
                    .unwrap_or_default();
                def.base = Some(
                    ctx.reference(body, "base")?
                        .ok_or_else(|| ctx.error(body, "a derivation needs a 'base'"))?,
                );
                if simple {
                    let (facets, inline) = if def.derivation == DerivationMethod::Restriction {
                        let inline = match body.xsd_child(xe::SIMPLE_TYPE) {
                            Some(st) => Some(self.parse_simple_type(ctx, st, None)?),
                            None => None,
                        };
                        (self.parse_facets(ctx, body)?, inline)
                    } else {
                        (Vec::new(), None)
                    };
                    def.content = ComplexContent::Simple { facets, inline };
                } else {
                    def.content = ComplexContent::Elements(self.parse_content_particle(ctx, body)?);
                }
                let (attributes, any_attribute) = self.parse_attribute_items(ctx, body)?;
                def.attributes = attributes;
                def.any_attribute = any_attribute;
            }
            None => {
                def.content = ComplexContent::Elements(self.parse_content_particle(ctx, elem)?);
                let (attributes, any_attribute) = self.parse_attribute_items(ctx, elem)?;
                def.attributes = attributes;
                def.any_attribute = any_attribute;
            }
        }
        Ok(self.schema.add_type(TypeDef::Complex(def)))
    }

    // =========================================================================
    // Particles
    // =========================================================================

    /// The single group or group reference of a complex type body
    fn parse_content_particle(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
    ) -> Result<Option<Particle>> {
        let mut found = None;
        for child in elem.xsd_children() {
            let is_particle = child.local_name() == xe::GROUP
                || Compositor::from_local_name(child.local_name()).is_some();
            if is_particle {
                if found.is_some() {
                    return Err(ctx.error(child, "a complex type has at most one model group"));
                }
                found = self.parse_particle(ctx, child)?;
            }
        }
        Ok(found)
    }

    fn parse_particle(&mut self, ctx: &DocumentContext, elem: &XmlElement) -> Result<Option<Particle>> {
        let occurs = parse_occurs(
            elem.attribute("minOccurs"),
            elem.attribute("maxOccurs"),
            self.config,
        )
        .map_err(|e| match e {
            Error::Structural(message) => {
                Error::Structural(format!("line {}: {}", elem.line, message))
            }
            other => other,
        })?;
        let term = match elem.local_name() {
            xe::ELEMENT => match ctx.reference(elem, "ref")? {
                Some(name) => Term::ElementRef(name),
                None => Term::Element(self.parse_element(ctx, elem, false)?),
            },
            xe::ANY => Term::Wildcard(
                Wildcard::parse(
                    elem.attribute("namespace"),
                    elem.attribute("processContents"),
                    &ctx.target_namespace,
                )
                .map_err(|e| ctx.relocate(e))?,
            ),
            xe::GROUP => Term::GroupRef(
                ctx.reference(elem, "ref")?
                    .ok_or_else(|| ctx.error(elem, "xs:group reference needs 'ref'"))?,
            ),
            local => match Compositor::from_local_name(local) {
                Some(Compositor::All) => {
                    if occurs.max.map_or(true, |max| max > 1) || occurs.min > 1 {
                        return Err(Error::structural(format!(
                            "line {}: xs:all must have minOccurs 0 or 1 and maxOccurs 1",
                            elem.line
                        )));
                    }
                    Term::Group(self.parse_model_group(ctx, elem, Compositor::All)?)
                }
                Some(compositor) => Term::Group(self.parse_model_group(ctx, elem, compositor)?),
                None => return Ok(None),
            },
        };
        Ok(Some(Particle::new(occurs, term)))
    }

    fn parse_model_group(
        &mut self,
        ctx: &DocumentContext,
        elem: &XmlElement,
        compositor: Compositor,
    ) -> Result<ModelGroup> {
        let mut group = ModelGroup::new(compositor);
        for child in elem.xsd_children() {
            if compositor == Compositor::All && child.local_name() != xe::ELEMENT {
                return Err(ctx.error(child, "xs:all may only contain element declarations"));
            }
            if let Some(particle) = self.parse_particle(ctx, child)? {
                if compositor == Compositor::All && particle.occurs.max.map_or(true, |m| m > 1) {
                    return Err(Error::structural(format!(
                        "line {}: elements of xs:all must have maxOccurs 0 or 1",
                        child.line
                    )));
                }
                group.push(particle);
            }
        }
        Ok(group)
    }
}

/// Parse the document at `entry` and everything it references
pub fn parse_schema(
    loader: &dyn SchemaLoader,
    entry: &str,
    config: &CompileConfig,
) -> Result<ParsedSchema> {
    SchemaParser::new(loader, config).parse(entry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loaders::MemoryLoader;
    use crate::validators::globals::DeclarationKind;

    const XS: &str = r#"xmlns:xs="http://www.w3.org/2001/XMLSchema""#;

    fn parse(xml: &str) -> Result<ParsedSchema> {
        let loader = MemoryLoader::new().with_document("main.xsd", xml);
        parse_schema(&loader, "main.xsd", &CompileConfig::default())
    }

    #[test]
    fn test_declaration_order() {
        let xml = format!(
            r#"<xs:schema {XS} targetNamespace="urn:t">
                <xs:complexType name="T"><xs:sequence/></xs:complexType>
                <xs:element name="root" type="T"/>
                <xs:attribute name="a" type="xs:int"/>
            </xs:schema>"#
        );
        let schema = parse(&xml).unwrap();
        assert_eq!(
            schema.declaration_order,
            vec![
                (DeclarationKind::Type, QName::new("urn:t", "T")),
                (DeclarationKind::Element, QName::new("urn:t", "root")),
                (DeclarationKind::Attribute, QName::new("urn:t", "a")),
            ]
        );
        let root = schema.element(schema.global_elements[&QName::new("urn:t", "root")]);
        // unprefixed type reference without default namespace is unqualified
        assert_eq!(root.type_use, TypeUse::Named(QName::local("T")));
    }

    #[test]
    fn test_local_element_forms() {
        let xml = format!(
            r#"<xs:schema {XS} targetNamespace="urn:t" elementFormDefault="qualified">
                <xs:element name="root">
                  <xs:complexType>
                    <xs:sequence>
                      <xs:element name="a" type="xs:string"/>
                      <xs:element name="b" form="unqualified" type="xs:string" minOccurs="0"/>
                    </xs:sequence>
                  </xs:complexType>
                </xs:element>
            </xs:schema>"#
        );
        let schema = parse(&xml).unwrap();
        let names: Vec<_> = schema.elements.iter().map(|e| e.name.clone()).collect();
        assert!(names.contains(&QName::new("urn:t", "a")));
        assert!(names.contains(&QName::local("b")));
    }

    #[test]
    fn test_include_chameleon() {
        let main = format!(
            r#"<xs:schema {XS} xmlns="urn:t" targetNamespace="urn:t">
                <xs:include schemaLocation="types.xsd"/>
                <xs:element name="root" type="Code"/>
            </xs:schema>"#
        );
        let types = format!(
            r#"<xs:schema {XS}>
                <xs:simpleType name="Code"><xs:restriction base="Base"/></xs:simpleType>
                <xs:simpleType name="Base"><xs:restriction base="xs:string"/></xs:simpleType>
            </xs:schema>"#
        );
        let loader = MemoryLoader::new()
            .with_document("main.xsd", main)
            .with_document("types.xsd", types);
        let schema = parse_schema(&loader, "main.xsd", &CompileConfig::default()).unwrap();
        let code = schema.global_types[&QName::new("urn:t", "Code")];
        match schema.type_def(code) {
            TypeDef::Simple(def) => match &def.variety {
                SimpleVariety::Restriction { base, .. } => {
                    assert_eq!(base, &TypeUse::Named(QName::new("urn:t", "Base")))
                }
                other => panic!("unexpected variety {:?}", other),
            },
            other => panic!("unexpected type {:?}", other),
        }
        assert_eq!(schema.documents.len(), 2);
    }

    #[test]
    fn test_import_namespace_mismatch() {
        let main = format!(
            r#"<xs:schema {XS} targetNamespace="urn:a">
                <xs:import namespace="urn:b" schemaLocation="b.xsd"/>
            </xs:schema>"#
        );
        let other = format!(r#"<xs:schema {XS} targetNamespace="urn:c"/>"#);
        let loader = MemoryLoader::new()
            .with_document("main.xsd", main)
            .with_document("b.xsd", other);
        let result = parse_schema(&loader, "main.xsd", &CompileConfig::default());
        assert!(matches!(result, Err(Error::Load(_))));
    }

    #[test]
    fn test_cyclic_include_is_loaded_once() {
        let a = format!(r#"<xs:schema {XS}><xs:include schemaLocation="b.xsd"/></xs:schema>"#);
        let b = format!(r#"<xs:schema {XS}><xs:include schemaLocation="a.xsd"/></xs:schema>"#);
        let loader = MemoryLoader::new()
            .with_document("a.xsd", a)
            .with_document("b.xsd", b);
        let schema = parse_schema(&loader, "a.xsd", &CompileConfig::default()).unwrap();
        assert_eq!(schema.documents.len(), 2);
    }

    #[test]
    fn test_redefine_rejected() {
        let xml = format!(r#"<xs:schema {XS}><xs:redefine schemaLocation="x.xsd"/></xs:schema>"#);
        assert!(matches!(parse(&xml), Err(Error::Load(_))));
    }

    #[test]
    fn test_all_with_max_occurs_rejected() {
        let xml = format!(
            r#"<xs:schema {XS}>
                <xs:complexType name="T">
                  <xs:all maxOccurs="2"><xs:element name="a"/></xs:all>
                </xs:complexType>
            </xs:schema>"#
        );
        assert!(matches!(parse(&xml), Err(Error::Structural(_))));
    }

    #[test]
    fn test_occurs_limit() {
        let xml = |n: u32| {
            format!(
                r#"<xs:schema {XS}>
                    <xs:complexType name="T">
                      <xs:sequence><xs:element name="a" maxOccurs="{n}"/></xs:sequence>
                    </xs:complexType>
                </xs:schema>"#
            )
        };
        let config = CompileConfig::default().with_max_occurs_limit(10);
        let loader = MemoryLoader::new().with_document("ok.xsd", xml(10)).with_document("bad.xsd", xml(11));
        assert!(parse_schema(&loader, "ok.xsd", &config).is_ok());
        assert!(matches!(
            parse_schema(&loader, "bad.xsd", &config),
            Err(Error::OccursTooLarge { value: 11, limit: 10 })
        ));
    }

    #[test]
    fn test_identity_constraints() {
        let xml = format!(
            r#"<xs:schema {XS} targetNamespace="urn:t" xmlns:t="urn:t">
                <xs:element name="root">
                  <xs:complexType><xs:sequence/></xs:complexType>
                  <xs:key name="k"><xs:selector xpath="item"/><xs:field xpath="@id"/></xs:key>
                  <xs:keyref name="r" refer="t:k"><xs:selector xpath="ref"/><xs:field xpath="@to"/></xs:keyref>
                </xs:element>
            </xs:schema>"#
        );
        let schema = parse(&xml).unwrap();
        assert_eq!(schema.constraints.len(), 2);
        assert_eq!(schema.constraints[1].refer, Some(QName::new("urn:t", "k")));
        let root = schema.element(schema.global_elements[&QName::new("urn:t", "root")]);
        assert_eq!(root.constraints.len(), 2);
    }

    #[test]
    fn test_duplicate_global_rejected() {
        let xml = format!(
            r#"<xs:schema {XS}>
                <xs:element name="a"/>
                <xs:element name="a"/>
            </xs:schema>"#
        );
        assert!(matches!(parse(&xml), Err(Error::Structural(_))));
    }

    #[test]
    fn test_not_a_schema() {
        assert!(matches!(parse("<root/>"), Err(Error::Load(_))));
    }
}
