//! Validation sessions
//!
//! A [`ValidationSession`] pulls tokens from a [`Tokenizer`] and keeps one
//! [`Frame`] per open element: the element's effective type, its content
//! cursor, and the text accumulated for simple content. Problems are
//! recorded as [`Diagnostic`]s; the first well-formedness error ends the run.
//!
//! After a child is rejected its whole subtree is skipped and the parent's
//! cursor stays where it was, so one misplaced child yields one diagnostic.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::automata::Input;
use crate::error::{Error, Result};
use crate::names::is_xml_space;
use crate::namespaces::{NamespaceContext, QName, XSI_NAMESPACE};
use crate::runtime::{RuntimeSchema, TypeKind};
use crate::tokenizer::{Position, StartTag, Token, Tokenizer, TokenizerOptions};
use crate::validators::simple_types::TextVariety;
use crate::validators::{
    Builtin, ContentKind, DerivationSet, ElemId, ProcessContents, TypeId, ValidatorId, ValueConstraint,
};

use super::cursor::{Cursor, Step};
use super::diagnostics::{Diagnostic, DiagnosticCode, ValidationReport};
use super::identity::IdentityTracker;

/// Session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Stop recording after this many diagnostics (0 = unlimited)
    pub max_diagnostics: usize,
    /// Options of the underlying tokenizer
    pub tokenizer: TokenizerOptions,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_diagnostics: 0,
            tokenizer: TokenizerOptions::for_validation(),
        }
    }
}

impl SessionOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Tight limits for untrusted input
    pub fn strict() -> Self {
        Self {
            max_diagnostics: 1000,
            tokenizer: TokenizerOptions::strict(),
        }
    }

    /// Set `max_diagnostics`
    pub fn with_max_diagnostics(mut self, max: usize) -> Self {
        self.max_diagnostics = max;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IdRole {
    Plain,
    Id,
    IdRef,
    IdRefs,
}

#[derive(Debug)]
struct Frame {
    path_len: usize,
    children: HashMap<String, u32>,
    skip: bool,
    tracked: bool,
    type_id: TypeId,
    cursor: Cursor,
    text_validator: Option<ValidatorId>,
    element_content: bool,
    accepts_text: bool,
    mixed: bool,
    collect_text: bool,
    text: String,
    has_children: bool,
    nilled: bool,
    value: Option<ValueConstraint>,
}

impl Frame {
    fn skipped(path_len: usize, tracked: bool) -> Self {
        Self {
            path_len,
            children: HashMap::new(),
            skip: true,
            tracked,
            type_id: TypeId::INVALID,
            cursor: Cursor::Empty,
            text_validator: None,
            element_content: false,
            accepts_text: true,
            mixed: false,
            collect_text: tracked,
            text: String::new(),
            has_children: false,
            nilled: false,
            value: None,
        }
    }
}

/// What an incoming child resolved to
enum Resolved {
    Declared(ElemId),
    Skip,
}

/// Validates instance documents against one shared [`RuntimeSchema`]
///
/// A session can be reused for any number of documents, one at a time.
/// Sessions over the same schema may run on different threads.
pub struct ValidationSession {
    schema: Arc<RuntimeSchema>,
    options: SessionOptions,
    namespaces: NamespaceContext,
    stack: Vec<Frame>,
    path: String,
    root_children: HashMap<String, u32>,
    identity: IdentityTracker,
    ids: HashSet<String>,
    idrefs: Vec<(String, String, Position)>,
    seen_attrs: Vec<QName>,
    identity_attrs: Vec<(QName, String)>,
    diagnostics: Vec<Diagnostic>,
    truncated: bool,
}

impl ValidationSession {
    /// Create a session with default options
    pub fn new(schema: Arc<RuntimeSchema>) -> Self {
        Self::with_options(schema, SessionOptions::default())
    }

    /// Create a session
    pub fn with_options(schema: Arc<RuntimeSchema>, options: SessionOptions) -> Self {
        Self {
            schema,
            options,
            namespaces: NamespaceContext::new(),
            stack: Vec::new(),
            path: String::new(),
            root_children: HashMap::new(),
            identity: IdentityTracker::new(),
            ids: HashSet::new(),
            idrefs: Vec::new(),
            seen_attrs: Vec::new(),
            identity_attrs: Vec::new(),
            diagnostics: Vec::new(),
            truncated: false,
        }
    }

    /// The schema this session validates against
    pub fn schema(&self) -> &Arc<RuntimeSchema> {
        &self.schema
    }

    /// The session options
    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Validate a document held in memory
    pub fn validate_bytes(&mut self, document: &[u8]) -> Result<ValidationReport> {
        self.validate_reader(document)
    }

    /// Validate a document read from `reader`
    pub fn validate_reader<R: Read>(&mut self, reader: R) -> Result<ValidationReport> {
        self.validate_reader_with(reader, |_| {})
    }

    /// Validate a document, handing every diagnostic to `sink` as soon as
    /// it is found. I/O failures are returned as errors; well-formedness
    /// errors end the run and are reported in [`ValidationReport::fatal`].
    pub fn validate_reader_with<R, F>(&mut self, reader: R, mut sink: F) -> Result<ValidationReport>
    where
        R: Read,
        F: FnMut(&Diagnostic),
    {
        self.reset();
        let mut tokenizer = Tokenizer::new(reader, self.options.tokenizer.clone());
        let mut delivered = 0;
        let mut fatal = None;
        loop {
            let (token, position) = match tokenizer.next_with_position() {
                Ok(next) => next,
                Err(Error::Syntax(err)) => {
                    fatal = Some(err);
                    break;
                }
                Err(err) => return Err(err),
            };
            let done = match token {
                Token::StartElement(tag) => {
                    self.start_element(&tag, position);
                    false
                }
                Token::EndElement(_) => {
                    self.end_element(position);
                    false
                }
                Token::CharData(text) | Token::CData(text) => {
                    self.text(text.value, position);
                    false
                }
                Token::Eof => true,
                Token::Comment(_) | Token::ProcessingInstruction(_) | Token::Directive(_) => false,
            };
            if done {
                self.finish();
            }
            for diagnostic in &self.diagnostics[delivered..] {
                sink(diagnostic);
            }
            delivered = self.diagnostics.len();
            if done {
                break;
            }
        }

        let report = ValidationReport {
            diagnostics: std::mem::take(&mut self.diagnostics),
            fatal,
            truncated: self.truncated,
        };
        tracing::debug!(
            diagnostics = report.diagnostics.len(),
            fatal = report.fatal.is_some(),
            truncated = report.truncated,
            "validation session finished"
        );
        Ok(report)
    }

    fn reset(&mut self) {
        self.namespaces.clear();
        self.stack.clear();
        self.path.clear();
        self.root_children.clear();
        self.identity.reset();
        self.ids.clear();
        self.idrefs.clear();
        self.diagnostics.clear();
        self.truncated = false;
    }

    fn report(&mut self, diagnostic: Diagnostic) {
        let max = self.options.max_diagnostics;
        if max > 0 && self.diagnostics.len() >= max {
            self.truncated = true;
            return;
        }
        self.diagnostics.push(diagnostic);
    }

    fn diagnostic(&self, code: DiagnosticCode, message: String, position: Position) -> Diagnostic {
        Diagnostic::new(code, message)
            .with_path(self.path.clone())
            .at(position.line, position.column)
    }

    fn push_segment(&mut self, qualified: &str) -> usize {
        let path_len = self.path.len();
        let counts = match self.stack.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root_children,
        };
        let count = counts.entry(qualified.to_string()).or_insert(0);
        *count += 1;
        let index = *count;
        self.path.push('/');
        self.path.push_str(qualified);
        self.path.push('[');
        self.path.push_str(&index.to_string());
        self.path.push(']');
        path_len
    }

    fn start_element(&mut self, tag: &StartTag<'_>, position: Position) {
        self.namespaces.push_scope();
        for attr in tag.attributes() {
            if attr.name.qualified == "xmlns" {
                self.namespaces.add_prefix("", attr.value);
            } else if attr.name.prefix == "xmlns" {
                self.namespaces.add_prefix(attr.name.local, attr.value);
            }
        }
        let element_name = tag.name();
        let path_len = self.push_segment(element_name.qualified);
        let parent_skipped = self.stack.last().map_or(false, |f| f.skip);

        let Some(name) = self
            .namespaces
            .resolve_element(element_name.prefix, element_name.local)
        else {
            let d = self.diagnostic(
                DiagnosticCode::UnboundPrefix,
                format!("prefix '{}' is not bound", element_name.prefix),
                position,
            );
            self.report(d);
            self.push_skipped(path_len, None, tag);
            return;
        };

        if parent_skipped {
            self.push_skipped(path_len, Some(&name), tag);
            return;
        }

        match self.resolve_child(&name, position) {
            Resolved::Declared(elem) => self.enter_declared(elem, &name, tag, path_len, position),
            Resolved::Skip => self.push_skipped(path_len, Some(&name), tag),
        }
    }

    fn push_skipped(&mut self, path_len: usize, name: Option<&QName>, tag: &StartTag<'_>) {
        let mut tracked = false;
        if let Some(name) = name {
            if self.identity.is_active() {
                self.identity_attrs.clear();
                for attr in tag.attributes() {
                    if let Some(qname) = self.attribute_name(attr.name.qualified, attr.name.prefix, attr.name.local) {
                        self.identity_attrs.push((qname, attr.value.to_string()));
                    }
                }
                let schema = Arc::clone(&self.schema);
                self.identity.enter(&schema, name, &[], &self.identity_attrs);
                tracked = true;
            }
        }
        self.stack.push(Frame::skipped(path_len, tracked));
    }

    fn attribute_name(&self, qualified: &str, prefix: &str, local: &str) -> Option<QName> {
        if qualified == "xmlns" || prefix == "xmlns" {
            return None;
        }
        self.namespaces.resolve_attribute(prefix, local)
    }

    /// Match a child against the root policy or the parent's content model
    fn resolve_child(&mut self, name: &QName, position: Position) -> Resolved {
        let schema = Arc::clone(&self.schema);
        let symbol = schema.symbols().lookup(&name.namespace, &name.local);
        let Some(parent) = self.stack.last_mut() else {
            return match schema.element_by_name(name) {
                Some(elem) => Resolved::Declared(elem),
                None => {
                    let d = self.diagnostic(
                        DiagnosticCode::UnknownRoot,
                        format!("no global declaration for root element '{}'", name),
                        position,
                    );
                    self.report(d.with_actual(name.to_string()));
                    Resolved::Skip
                }
            };
        };
        parent.has_children = true;
        if parent.nilled {
            let d = self.diagnostic(
                DiagnosticCode::NilledWithContent,
                "a nilled element must be empty".to_string(),
                position,
            );
            self.report(d.with_actual(name.to_string()));
            return Resolved::Skip;
        }

        let input = Input {
            symbol,
            namespace: schema.symbols().namespace_id(&name.namespace),
        };
        match parent.cursor.step(&schema, &input) {
            Step::Element(elem) => Resolved::Declared(elem),
            Step::Wildcard(rule) => {
                let process = schema
                    .wildcard(rule)
                    .map_or(ProcessContents::Strict, |r| r.process_contents);
                let global = symbol.and_then(|s| schema.global_element(s));
                match (process, global) {
                    (ProcessContents::Skip, _) => Resolved::Skip,
                    (_, Some(elem)) => Resolved::Declared(elem),
                    (ProcessContents::Lax, None) => Resolved::Skip,
                    (ProcessContents::Strict, None) => {
                        let d = self.diagnostic(
                            DiagnosticCode::UndeclaredElement,
                            format!("'{}' matches a strict wildcard but has no global declaration", name),
                            position,
                        );
                        self.report(d.with_actual(name.to_string()));
                        Resolved::Skip
                    }
                }
            }
            Step::Duplicate => {
                let d = self.diagnostic(
                    DiagnosticCode::DuplicateElement,
                    format!("'{}' may appear at most once here", name),
                    position,
                );
                self.report(d.with_actual(name.to_string()));
                Resolved::Skip
            }
            Step::Rejected => {
                let (code, message, expected) = if parent.element_content {
                    (
                        DiagnosticCode::UnexpectedElement,
                        format!("unexpected child element '{}'", name),
                        parent.cursor.expected(&schema),
                    )
                } else {
                    (
                        DiagnosticCode::ChildrenNotAllowed,
                        format!("type '{}' does not allow child elements", schema.type_name(parent.type_id)),
                        Vec::new(),
                    )
                };
                let d = self.diagnostic(code, message, position);
                self.report(d.with_expected(expected).with_actual(name.to_string()));
                Resolved::Skip
            }
        }
    }

    fn enter_declared(
        &mut self,
        elem: ElemId,
        name: &QName,
        tag: &StartTag<'_>,
        path_len: usize,
        position: Position,
    ) {
        let schema = Arc::clone(&self.schema);
        let Some(element) = schema.element(elem) else {
            self.push_skipped(path_len, Some(name), tag);
            return;
        };
        if element.is_abstract {
            let d = self.diagnostic(
                DiagnosticCode::AbstractElement,
                format!("element '{}' is abstract", name),
                position,
            );
            self.report(d);
            self.push_skipped(path_len, Some(name), tag);
            return;
        }

        let mut type_id = element.type_id;
        let mut nilled = false;
        for attr in tag.attributes() {
            let Some(qname) = self.attribute_name(attr.name.qualified, attr.name.prefix, attr.name.local) else {
                continue;
            };
            if qname.namespace != XSI_NAMESPACE {
                continue;
            }
            match qname.local.as_str() {
                "type" => match self.xsi_type(attr.value, type_id, element.block, position) {
                    Some(id) => type_id = id,
                    None => {
                        self.push_skipped(path_len, Some(name), tag);
                        return;
                    }
                },
                "nil" => match attr.value.trim() {
                    "true" | "1" if element.nillable => nilled = true,
                    "false" | "0" => {}
                    value => {
                        let message = if matches!(value, "true" | "1") {
                            format!("element '{}' is not nillable", name)
                        } else {
                            format!("'{}' is not a valid xsi:nil value", value)
                        };
                        let d = self.diagnostic(DiagnosticCode::NotNillable, message, position);
                        self.report(d.with_actual(value.to_string()));
                    }
                },
                _ => {}
            }
        }
        if nilled && matches!(element.value, Some(ValueConstraint::Fixed(_))) {
            let d = self.diagnostic(
                DiagnosticCode::NilledWithContent,
                format!("element '{}' has a fixed value and cannot be nilled", name),
                position,
            );
            self.report(d);
        }

        let Some(type_def) = schema.type_def(type_id) else {
            self.push_skipped(path_len, Some(name), tag);
            return;
        };
        if type_def.is_abstract {
            let d = self.diagnostic(
                DiagnosticCode::AbstractType,
                format!("type '{}' is abstract", schema.type_name(type_id)),
                position,
            );
            self.report(d);
            self.push_skipped(path_len, Some(name), tag);
            return;
        }

        let mut frame = Frame {
            path_len,
            children: HashMap::new(),
            skip: false,
            tracked: false,
            type_id,
            cursor: Cursor::Empty,
            text_validator: None,
            element_content: false,
            accepts_text: true,
            mixed: false,
            collect_text: false,
            text: String::new(),
            has_children: false,
            nilled,
            value: element.value.clone(),
        };
        match (type_def.kind, schema.complex_of(type_id)) {
            (TypeKind::Complex, Some(complex)) => {
                if !nilled {
                    frame.cursor = Cursor::start(complex.model);
                }
                frame.text_validator = complex.text;
                frame.element_content = matches!(complex.content, ContentKind::ElementOnly | ContentKind::Mixed);
                frame.accepts_text = complex.content.accepts_text();
                frame.mixed = complex.content == ContentKind::Mixed;
                frame.collect_text = complex.content == ContentKind::Simple
                    || (frame.mixed && matches!(frame.value, Some(ValueConstraint::Fixed(_))));
            }
            _ => {
                frame.text_validator = type_def.validator;
                frame.collect_text = true;
            }
        }

        self.check_attributes(type_id, tag, position);

        let track = self.identity.is_active() || !element.constraints.is_empty();
        if track {
            let wants_text = self.identity.enter(&schema, name, &element.constraints, &self.identity_attrs);
            frame.tracked = true;
            frame.collect_text |= wants_text;
        }
        self.stack.push(frame);
    }

    /// Resolve `xsi:type`; `None` after reporting a diagnostic
    fn xsi_type(
        &mut self,
        lexical: &str,
        declared: TypeId,
        element_block: DerivationSet,
        position: Position,
    ) -> Option<TypeId> {
        let schema = Arc::clone(&self.schema);
        let lexical = lexical.trim();
        let Some(qname) = self.namespaces.resolve(lexical) else {
            let d = self.diagnostic(
                DiagnosticCode::UnboundPrefix,
                format!("prefix of xsi:type '{}' is not bound", lexical),
                position,
            );
            self.report(d.with_actual(lexical.to_string()));
            return None;
        };
        let Some(id) = schema
            .symbols()
            .lookup(&qname.namespace, &qname.local)
            .and_then(|s| schema.global_type(s))
        else {
            let d = self.diagnostic(
                DiagnosticCode::UnknownType,
                format!("xsi:type '{}' does not name a global type", qname),
                position,
            );
            self.report(d.with_actual(qname.to_string()));
            return None;
        };
        let blocked = schema
            .type_def(declared)
            .map_or(element_block, |t| element_block.union(t.block));
        match schema.derivation_mask(id, declared) {
            Some(mask) if !mask.intersects(blocked) => Some(id),
            Some(_) => {
                let d = self.diagnostic(
                    DiagnosticCode::InvalidTypeSubstitution,
                    format!(
                        "xsi:type '{}' derives from '{}' by a blocked method",
                        qname,
                        schema.type_name(declared)
                    ),
                    position,
                );
                self.report(d.with_actual(qname.to_string()));
                None
            }
            None => {
                let d = self.diagnostic(
                    DiagnosticCode::InvalidTypeSubstitution,
                    format!(
                        "xsi:type '{}' is not derived from '{}'",
                        qname,
                        schema.type_name(declared)
                    ),
                    position,
                );
                self.report(d.with_expected(vec![schema.type_name(declared)]).with_actual(qname.to_string()));
                None
            }
        }
    }

    /// Validate the attributes of an element of type `type_id`, leaving
    /// the effective attribute set in `identity_attrs`
    fn check_attributes(&mut self, type_id: TypeId, tag: &StartTag<'_>, position: Position) {
        let schema = Arc::clone(&self.schema);
        let complex = schema.complex_of(type_id);
        self.seen_attrs.clear();
        self.identity_attrs.clear();

        for attr in tag.attributes() {
            if attr.name.qualified == "xmlns" || attr.name.prefix == "xmlns" {
                continue;
            }
            let Some(qname) = self.namespaces.resolve_attribute(attr.name.prefix, attr.name.local) else {
                let d = self.diagnostic(
                    DiagnosticCode::UnboundPrefix,
                    format!("prefix '{}' of attribute '{}' is not bound", attr.name.prefix, attr.name.qualified),
                    position,
                );
                self.report(d);
                continue;
            };
            if qname.namespace == XSI_NAMESPACE
                && matches!(
                    qname.local.as_str(),
                    "type" | "nil" | "schemaLocation" | "noNamespaceSchemaLocation"
                )
            {
                continue;
            }
            let symbol = schema.symbols().lookup(&qname.namespace, &qname.local);
            let found = complex.and_then(|c| symbol.and_then(|s| schema.attr_table().find(c.attrs, s)));

            let declaration = match found {
                Some(attr_use) => schema
                    .attribute(attr_use.attr)
                    .map(|decl| (decl.validator, attr_use.value.clone().or_else(|| decl.value.clone()))),
                None => {
                    let wildcard = complex.and_then(|c| c.any_attribute);
                    let namespace = schema.symbols().namespace_id(&qname.namespace);
                    match wildcard {
                        Some(rule) if schema.wildcard_admits(rule, namespace) => {
                            let process = schema
                                .wildcard(rule)
                                .map_or(ProcessContents::Strict, |r| r.process_contents);
                            let global = symbol
                                .and_then(|s| schema.global_attribute(s))
                                .and_then(|id| schema.attribute(id));
                            match (process, global) {
                                (ProcessContents::Skip, _) => None,
                                (_, Some(decl)) => Some((decl.validator, decl.value.clone())),
                                (ProcessContents::Lax, None) => None,
                                (ProcessContents::Strict, None) => {
                                    let d = self.diagnostic(
                                        DiagnosticCode::UndeclaredAttribute,
                                        format!("attribute '{}' has no global declaration", qname),
                                        position,
                                    );
                                    self.report(d.with_actual(qname.to_string()));
                                    None
                                }
                            }
                        }
                        _ => {
                            let expected = complex
                                .map(|c| {
                                    schema
                                        .attr_table()
                                        .uses(c.attrs)
                                        .iter()
                                        .filter_map(|u| schema.symbol_name(u.symbol))
                                        .map(|n| n.to_string())
                                        .collect()
                                })
                                .unwrap_or_default();
                            let d = self.diagnostic(
                                DiagnosticCode::UnexpectedAttribute,
                                format!("attribute '{}' is not allowed here", qname),
                                position,
                            );
                            self.report(d.with_expected(expected).with_actual(qname.to_string()));
                            continue;
                        }
                    }
                }
            };

            let value = match declaration {
                Some((validator, constraint)) => {
                    match schema.validators().validate(validator, attr.value, &self.namespaces) {
                        Ok(normalized) => {
                            if let Some(ValueConstraint::Fixed(fixed)) = &constraint {
                                self.check_fixed(validator, fixed, &normalized, format!("attribute '{}'", qname), position);
                            }
                            self.record_ids(validator, &normalized, position);
                            normalized
                        }
                        Err(reason) => {
                            let d = self.diagnostic(
                                DiagnosticCode::InvalidAttributeValue,
                                format!("attribute '{}': {}", qname, reason),
                                position,
                            );
                            self.report(d.with_actual(attr.value.to_string()));
                            attr.value.to_string()
                        }
                    }
                }
                None => attr.value.to_string(),
            };
            self.seen_attrs.push(qname.clone());
            self.identity_attrs.push((qname, value));
        }

        let Some(complex) = complex else {
            return;
        };
        for attr_use in schema.attr_table().uses(complex.attrs) {
            let Some(name) = schema.symbol_name(attr_use.symbol) else {
                continue;
            };
            if self.seen_attrs.contains(&name) {
                continue;
            }
            if attr_use.required {
                let d = self.diagnostic(
                    DiagnosticCode::MissingAttribute,
                    format!("required attribute '{}' is missing", name),
                    position,
                );
                self.report(d.with_expected(vec![name.to_string()]));
                continue;
            }
            let default = attr_use
                .value
                .clone()
                .or_else(|| schema.attribute(attr_use.attr).and_then(|d| d.value.clone()));
            if let Some(ValueConstraint::Default(value) | ValueConstraint::Fixed(value)) = default {
                self.identity_attrs.push((name, value));
            }
        }
    }

    fn check_fixed(
        &mut self,
        validator: ValidatorId,
        fixed: &str,
        actual: &str,
        subject: String,
        position: Position,
    ) {
        let expected = self
            .schema
            .validators()
            .validate(validator, fixed, &self.namespaces)
            .unwrap_or_else(|_| fixed.to_string());
        if expected != actual {
            let d = self.diagnostic(
                DiagnosticCode::FixedValueMismatch,
                format!("{} must have the fixed value '{}'", subject, expected),
                position,
            );
            self.report(d.with_expected(vec![expected]).with_actual(actual.to_string()));
        }
    }

    fn id_role(&self, validator: ValidatorId) -> IdRole {
        let validators = self.schema.validators();
        let Some(v) = validators.get(validator) else {
            return IdRole::Plain;
        };
        match &v.variety {
            TextVariety::Atomic(Builtin::Id) => IdRole::Id,
            TextVariety::Atomic(Builtin::IdRef) => IdRole::IdRef,
            TextVariety::List(item) => match validators.get(*item).and_then(|i| i.atomic()) {
                Some(Builtin::IdRef) => IdRole::IdRefs,
                _ => IdRole::Plain,
            },
            _ => IdRole::Plain,
        }
    }

    fn record_ids(&mut self, validator: ValidatorId, value: &str, position: Position) {
        match self.id_role(validator) {
            IdRole::Plain => {}
            IdRole::Id => {
                if !self.ids.insert(value.to_string()) {
                    let d = self.diagnostic(
                        DiagnosticCode::DuplicateId,
                        format!("ID '{}' is not unique", value),
                        position,
                    );
                    self.report(d.with_actual(value.to_string()));
                }
            }
            IdRole::IdRef => self.idrefs.push((value.to_string(), self.path.clone(), position)),
            IdRole::IdRefs => {
                for token in value.split(' ').filter(|t| !t.is_empty()) {
                    self.idrefs.push((token.to_string(), self.path.clone(), position));
                }
            }
        }
    }

    fn text(&mut self, value: &str, position: Position) {
        let Some(frame) = self.stack.last_mut() else {
            return;
        };
        if frame.collect_text {
            frame.text.push_str(value);
        }
        if frame.skip || value.chars().all(is_xml_space) {
            return;
        }
        if frame.nilled {
            let d = self.diagnostic(
                DiagnosticCode::NilledWithContent,
                "a nilled element must be empty".to_string(),
                position,
            );
            self.report(d);
        } else if !frame.accepts_text {
            let type_name = self.schema.type_name(frame.type_id);
            let d = self.diagnostic(
                DiagnosticCode::UnexpectedText,
                format!("type '{}' does not allow character data", type_name),
                position,
            );
            self.report(d.with_actual(value.trim().to_string()));
        }
    }

    fn end_element(&mut self, position: Position) {
        let Some(mut frame) = self.stack.pop() else {
            return;
        };
        let schema = Arc::clone(&self.schema);
        let mut normalized = None;

        if !frame.skip {
            if !frame.nilled && !frame.cursor.is_accepting(&schema) {
                let d = self.diagnostic(
                    DiagnosticCode::IncompleteContent,
                    format!("content of '{}' is incomplete", schema.type_name(frame.type_id)),
                    position,
                );
                self.report(d.with_expected(frame.cursor.expected(&schema)));
            }
            if let (Some(validator), false) = (frame.text_validator, frame.nilled) {
                let mut text = std::mem::take(&mut frame.text);
                if text.is_empty() && !frame.has_children {
                    if let Some(ValueConstraint::Default(value) | ValueConstraint::Fixed(value)) = &frame.value {
                        text = value.clone();
                    }
                }
                match schema.validators().validate(validator, &text, &self.namespaces) {
                    Ok(value) => {
                        if let Some(ValueConstraint::Fixed(fixed)) = &frame.value {
                            self.check_fixed(validator, fixed, &value, "element content".to_string(), position);
                        }
                        self.record_ids(validator, &value, position);
                        normalized = Some(value);
                    }
                    Err(reason) => {
                        let d = self.diagnostic(DiagnosticCode::InvalidValue, reason, position);
                        self.report(d.with_actual(text));
                    }
                }
            } else if let (Some(ValueConstraint::Fixed(fixed)), false) = (&frame.value, frame.nilled) {
                if frame.mixed && !frame.has_children {
                    let actual = frame.text.as_str();
                    if !actual.is_empty() && actual != fixed.as_str() {
                        let d = self.diagnostic(
                            DiagnosticCode::FixedValueMismatch,
                            format!("content must have the fixed value '{}'", fixed),
                            position,
                        );
                        self.report(d.with_expected(vec![fixed.clone()]).with_actual(actual.to_string()));
                    }
                }
            }
        }

        if frame.tracked {
            let text = normalized.unwrap_or_else(|| frame.text.trim().to_string());
            let mut found = Vec::new();
            self.identity.leave(&schema, &text, &mut found);
            for d in found {
                let d = d.with_path(self.path.clone()).at(position.line, position.column);
                self.report(d);
            }
        }

        self.path.truncate(frame.path_len);
        self.namespaces.pop_scope();
    }

    fn finish(&mut self) {
        let idrefs = std::mem::take(&mut self.idrefs);
        for (value, path, position) in idrefs {
            if !self.ids.contains(&value) {
                let d = Diagnostic::new(
                    DiagnosticCode::UnresolvedIdRef,
                    format!("IDREF '{}' does not match any ID", value),
                )
                .with_path(path)
                .at(position.line, position.column)
                .with_actual(value);
                self.report(d);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::SchemaCompiler;

    const ORDER: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"
            targetNamespace="urn:po" xmlns="urn:po" elementFormDefault="qualified">
          <xs:element name="order" type="Order"/>
          <xs:complexType name="Order">
            <xs:sequence>
              <xs:element name="item" maxOccurs="unbounded">
                <xs:complexType>
                  <xs:simpleContent>
                    <xs:extension base="xs:string">
                      <xs:attribute name="qty" type="xs:positiveInteger" use="required"/>
                    </xs:extension>
                  </xs:simpleContent>
                </xs:complexType>
              </xs:element>
              <xs:element name="note" type="xs:string" minOccurs="0"/>
            </xs:sequence>
            <xs:attribute name="id" type="xs:ID"/>
            <xs:attribute name="currency" type="xs:string" fixed="EUR"/>
          </xs:complexType>
        </xs:schema>"#;

    fn session() -> ValidationSession {
        let schema = Arc::new(SchemaCompiler::new().compile_str(ORDER).unwrap());
        ValidationSession::new(schema)
    }

    fn validate(doc: &str) -> ValidationReport {
        session().validate_bytes(doc.as_bytes()).unwrap()
    }

    #[test]
    fn test_valid_document() {
        let report = validate(
            r#"<order xmlns="urn:po" id="o1" currency="EUR"><item qty="2">pen</item><note>x</note></order>"#,
        );
        assert!(report.is_valid(), "{:?}", report.diagnostics);
    }

    #[test]
    fn test_unexpected_child_is_reported_once() {
        let report = validate(
            r#"<order xmlns="urn:po"><item qty="1">a</item><bogus><deep/></bogus><item qty="1">b</item></order>"#,
        );
        assert_eq!(report.diagnostics.len(), 1, "{:?}", report.diagnostics);
        let d = &report.diagnostics[0];
        assert_eq!(d.code, DiagnosticCode::UnexpectedElement);
        assert_eq!(d.path, "/order[1]/bogus[1]");
        assert!(d.expected.contains(&"{urn:po}item".to_string()));
        assert_eq!(d.actual, "{urn:po}bogus");
    }

    #[test]
    fn test_incomplete_content() {
        let report = validate(r#"<order xmlns="urn:po"></order>"#);
        assert_eq!(report.count(DiagnosticCode::IncompleteContent), 1);
    }

    #[test]
    fn test_attribute_checks() {
        let report = validate(
            r#"<order xmlns="urn:po" currency="USD" other="1"><item qty="0">a</item><item>b</item></order>"#,
        );
        assert_eq!(report.count(DiagnosticCode::FixedValueMismatch), 1);
        assert_eq!(report.count(DiagnosticCode::UnexpectedAttribute), 1);
        assert_eq!(report.count(DiagnosticCode::InvalidAttributeValue), 1);
        assert_eq!(report.count(DiagnosticCode::MissingAttribute), 1);
    }

    #[test]
    fn test_unknown_root() {
        let report = validate(r#"<invoice xmlns="urn:po"/>"#);
        assert_eq!(report.count(DiagnosticCode::UnknownRoot), 1);
    }

    #[test]
    fn test_fatal_error_stops_validation() {
        let report = validate(r#"<order xmlns="urn:po"><item qty="1">a</note></order>"#);
        assert!(report.fatal.is_some());
        assert!(!report.is_valid());
    }

    #[test]
    fn test_text_in_element_only_content() {
        let report = validate(r#"<order xmlns="urn:po">stray<item qty="1">a</item></order>"#);
        assert_eq!(report.count(DiagnosticCode::UnexpectedText), 1);
    }

    #[test]
    fn test_sink_sees_every_diagnostic() {
        let mut session = session();
        let mut seen = Vec::new();
        let report = session
            .validate_reader_with(r#"<order xmlns="urn:po"><x/><y/></order>"#.as_bytes(), |d| {
                seen.push(d.code)
            })
            .unwrap();
        assert_eq!(seen.len(), report.diagnostics.len());
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_max_diagnostics() {
        let schema = Arc::new(SchemaCompiler::new().compile_str(ORDER).unwrap());
        let mut session =
            ValidationSession::with_options(schema, SessionOptions::new().with_max_diagnostics(1));
        let report = session
            .validate_bytes(br#"<order xmlns="urn:po"><x/><y/></order>"#)
            .unwrap();
        assert_eq!(report.diagnostics.len(), 1);
        assert!(report.truncated);
    }

    #[test]
    fn test_session_is_reusable() {
        let mut session = session();
        assert!(!session.validate_bytes(br#"<order xmlns="urn:po"/>"#).unwrap().is_valid());
        let report = session
            .validate_bytes(br#"<order xmlns="urn:po"><item qty="3">a</item></order>"#)
            .unwrap();
        assert!(report.is_valid(), "{:?}", report.diagnostics);
    }
}
