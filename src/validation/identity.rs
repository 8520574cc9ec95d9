//! Identity-constraint evaluation
//!
//! `xs:unique`, `xs:key`, and `xs:keyref` are evaluated over the element
//! stream. Each constraint opens a scope on its declaring element; selector
//! paths pick target elements below that scope, and field paths capture one
//! value per field from the target's attributes or descendants' text.
//!
//! Key and unique tables are complete when their scope closes. A keyref is
//! checked when its own scope closes, against the tables of the referenced
//! constraint that were opened on the same element or below it.

use std::collections::HashSet;

use crate::namespaces::QName;
use crate::runtime::RuntimeSchema;
use crate::validators::ConstraintKind;

use super::diagnostics::{Diagnostic, DiagnosticCode};

type KeyValue = Vec<String>;

#[derive(Debug)]
struct Scope {
    constraint: u32,
    depth: usize,
    serial: u64,
    keys: HashSet<KeyValue>,
    refs: Vec<KeyValue>,
}

#[derive(Debug)]
struct Target {
    scope: usize,
    depth: usize,
    values: Vec<Option<String>>,
    counts: Vec<u32>,
}

#[derive(Debug)]
struct Capture {
    target: usize,
    field: usize,
    depth: usize,
}

#[derive(Debug)]
struct ClosedTable {
    constraint: u32,
    serial: u64,
    keys: HashSet<KeyValue>,
}

/// Tracks open identity-constraint scopes over one document
#[derive(Debug, Default)]
pub struct IdentityTracker {
    names: Vec<QName>,
    scopes: Vec<Scope>,
    targets: Vec<Target>,
    captures: Vec<Capture>,
    closed: Vec<ClosedTable>,
    serial: u64,
}

fn display(values: &[String]) -> String {
    format!("({})", values.join(", "))
}

impl IdentityTracker {
    /// Create an idle tracker
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop all state
    pub fn reset(&mut self) {
        self.names.clear();
        self.scopes.clear();
        self.targets.clear();
        self.captures.clear();
        self.closed.clear();
        self.serial = 0;
    }

    /// Whether any scope is open
    pub fn is_active(&self) -> bool {
        !self.scopes.is_empty()
    }

    /// An element opened. `attributes` are its attributes after defaulting,
    /// with normalized values. Returns whether the element's text is
    /// captured by a field.
    pub fn enter(
        &mut self,
        schema: &RuntimeSchema,
        name: &QName,
        constraints: &[u32],
        attributes: &[(QName, String)],
    ) -> bool {
        let depth = self.names.len();
        self.names.push(name.clone());
        self.serial += 1;

        for (index, scope) in self.scopes.iter().enumerate() {
            let Some(constraint) = schema.constraint(scope.constraint) else {
                continue;
            };
            let relative: Vec<&QName> = self.names[scope.depth + 1..].iter().collect();
            if constraint
                .selector
                .alternatives
                .iter()
                .any(|path| path.matches_elements(&relative))
            {
                let fields = constraint.fields.len();
                self.targets.push(Target {
                    scope: index,
                    depth,
                    values: vec![None; fields],
                    counts: vec![0; fields],
                });
            }
        }

        let mut wants_text = false;
        for (index, target) in self.targets.iter_mut().enumerate() {
            let Some(constraint) = self
                .scopes
                .get(target.scope)
                .and_then(|s| schema.constraint(s.constraint))
            else {
                continue;
            };
            let relative: Vec<&QName> = self.names[target.depth + 1..].iter().collect();
            for (field, expr) in constraint.fields.iter().enumerate() {
                for path in &expr.alternatives {
                    if !path.matches_elements(&relative) {
                        continue;
                    }
                    match &path.attribute {
                        None => {
                            self.captures.push(Capture {
                                target: index,
                                field,
                                depth,
                            });
                            wants_text = true;
                        }
                        Some(test) => {
                            for (attr, value) in attributes {
                                if test.matches(attr) {
                                    target.counts[field] += 1;
                                    target.values[field] = Some(value.clone());
                                }
                            }
                        }
                    }
                }
            }
        }

        for &constraint in constraints {
            self.scopes.push(Scope {
                constraint,
                depth,
                serial: self.serial,
                keys: HashSet::new(),
                refs: Vec::new(),
            });
        }
        wants_text
    }

    /// The innermost open element closed with `text` as its normalized
    /// value
    pub fn leave(&mut self, schema: &RuntimeSchema, text: &str, out: &mut Vec<Diagnostic>) {
        let Some(depth) = self.names.len().checked_sub(1) else {
            return;
        };

        while self.captures.last().map_or(false, |c| c.depth == depth) {
            if let Some(capture) = self.captures.pop() {
                if let Some(target) = self.targets.get_mut(capture.target) {
                    target.counts[capture.field] += 1;
                    target.values[capture.field] = Some(text.to_string());
                }
            }
        }

        while self.targets.last().map_or(false, |t| t.depth == depth) {
            if let Some(target) = self.targets.pop() {
                self.finish_target(schema, target, out);
            }
        }

        let mut closing = Vec::new();
        while self.scopes.last().map_or(false, |s| s.depth == depth) {
            if let Some(scope) = self.scopes.pop() {
                closing.push(scope);
            }
        }
        let (keyrefs, tables): (Vec<Scope>, Vec<Scope>) = closing.into_iter().partition(|s| {
            schema
                .constraint(s.constraint)
                .map_or(false, |c| c.kind == ConstraintKind::KeyRef)
        });
        for scope in tables {
            self.closed.push(ClosedTable {
                constraint: scope.constraint,
                serial: scope.serial,
                keys: scope.keys,
            });
        }
        for scope in keyrefs {
            self.check_keyref(schema, scope, out);
        }

        self.names.pop();
        if self.scopes.is_empty() {
            self.closed.clear();
        }
    }

    fn finish_target(&mut self, schema: &RuntimeSchema, target: Target, out: &mut Vec<Diagnostic>) {
        let Some(scope) = self.scopes.get_mut(target.scope) else {
            return;
        };
        let Some(constraint) = schema.constraint(scope.constraint) else {
            return;
        };
        for (field, count) in target.counts.iter().enumerate() {
            if *count > 1 {
                out.push(
                    Diagnostic::new(
                        DiagnosticCode::AmbiguousField,
                        format!(
                            "field '{}' of {} '{}' selects more than one node",
                            constraint.fields[field].source, constraint.kind, constraint.name
                        ),
                    )
                    .with_actual(count.to_string()),
                );
                return;
            }
        }
        if target.values.iter().any(Option::is_none) {
            if constraint.kind == ConstraintKind::Key {
                let missing: Vec<String> = target
                    .values
                    .iter()
                    .zip(&constraint.fields)
                    .filter(|(v, _)| v.is_none())
                    .map(|(_, f)| f.source.clone())
                    .collect();
                out.push(
                    Diagnostic::new(
                        DiagnosticCode::MissingKeyField,
                        format!("key '{}' is missing a value for a field", constraint.name),
                    )
                    .with_expected(missing),
                );
            }
            return;
        }
        let value: KeyValue = target.values.into_iter().flatten().collect();
        match constraint.kind {
            ConstraintKind::KeyRef => scope.refs.push(value),
            ConstraintKind::Unique | ConstraintKind::Key => {
                if scope.keys.contains(&value) {
                    out.push(
                        Diagnostic::new(
                            DiagnosticCode::DuplicateKey,
                            format!("duplicate value {} for {} '{}'", display(&value), constraint.kind, constraint.name),
                        )
                        .with_actual(display(&value)),
                    );
                } else {
                    scope.keys.insert(value);
                }
            }
        }
    }

    fn check_keyref(&self, schema: &RuntimeSchema, scope: Scope, out: &mut Vec<Diagnostic>) {
        let Some(constraint) = schema.constraint(scope.constraint) else {
            return;
        };
        let Some(refer) = constraint.refer else {
            return;
        };
        let tables: Vec<&HashSet<KeyValue>> = self
            .closed
            .iter()
            .filter(|t| t.constraint == refer && t.serial >= scope.serial)
            .map(|t| &t.keys)
            .collect();
        let refer_name = schema
            .constraint(refer)
            .map_or_else(String::new, |c| c.name.to_string());
        for value in &scope.refs {
            if !tables.iter().any(|t| t.contains(value)) {
                out.push(
                    Diagnostic::new(
                        DiagnosticCode::UnresolvedKeyRef,
                        format!(
                            "keyref '{}' value {} has no match in '{}'",
                            constraint.name,
                            display(value),
                            refer_name
                        ),
                    )
                    .with_actual(display(value)),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validators::SchemaCompiler;

    const LIBRARY: &str = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
          <xs:element name="library">
            <xs:complexType>
              <xs:sequence>
                <xs:element name="book" maxOccurs="unbounded">
                  <xs:complexType>
                    <xs:sequence><xs:element name="isbn" type="xs:string"/></xs:sequence>
                  </xs:complexType>
                </xs:element>
                <xs:element name="loan" minOccurs="0" maxOccurs="unbounded">
                  <xs:complexType><xs:attribute name="book" type="xs:string"/></xs:complexType>
                </xs:element>
              </xs:sequence>
            </xs:complexType>
            <xs:key name="bookKey"><xs:selector xpath="book"/><xs:field xpath="isbn"/></xs:key>
            <xs:keyref name="loanRef" refer="bookKey"><xs:selector xpath="loan"/><xs:field xpath="@book"/></xs:keyref>
          </xs:element>
        </xs:schema>"#;

    fn schema() -> RuntimeSchema {
        SchemaCompiler::new().compile_str(LIBRARY).unwrap()
    }

    fn constraints(schema: &RuntimeSchema) -> Vec<u32> {
        let root = schema.element_by_name(&QName::local("library")).unwrap();
        schema.element(root).unwrap().constraints.clone()
    }

    fn book(tracker: &mut IdentityTracker, schema: &RuntimeSchema, isbn: &str, out: &mut Vec<Diagnostic>) {
        tracker.enter(schema, &QName::local("book"), &[], &[]);
        assert!(tracker.enter(schema, &QName::local("isbn"), &[], &[]));
        tracker.leave(schema, isbn, out);
        tracker.leave(schema, "", out);
    }

    fn loan(tracker: &mut IdentityTracker, schema: &RuntimeSchema, isbn: &str, out: &mut Vec<Diagnostic>) {
        let attrs = vec![(QName::local("book"), isbn.to_string())];
        assert!(!tracker.enter(schema, &QName::local("loan"), &[], &attrs));
        tracker.leave(schema, "", out);
    }

    #[test]
    fn test_key_and_keyref() {
        let schema = schema();
        let mut tracker = IdentityTracker::new();
        let mut out = Vec::new();
        tracker.enter(&schema, &QName::local("library"), &constraints(&schema), &[]);
        assert!(tracker.is_active());
        book(&mut tracker, &schema, "1", &mut out);
        book(&mut tracker, &schema, "2", &mut out);
        loan(&mut tracker, &schema, "2", &mut out);
        tracker.leave(&schema, "", &mut out);
        assert!(out.is_empty(), "{:?}", out);
        assert!(!tracker.is_active());
    }

    #[test]
    fn test_duplicate_key() {
        let schema = schema();
        let mut tracker = IdentityTracker::new();
        let mut out = Vec::new();
        tracker.enter(&schema, &QName::local("library"), &constraints(&schema), &[]);
        book(&mut tracker, &schema, "1", &mut out);
        book(&mut tracker, &schema, "1", &mut out);
        tracker.leave(&schema, "", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, DiagnosticCode::DuplicateKey);
        assert_eq!(out[0].actual, "(1)");
    }

    #[test]
    fn test_unresolved_keyref() {
        let schema = schema();
        let mut tracker = IdentityTracker::new();
        let mut out = Vec::new();
        tracker.enter(&schema, &QName::local("library"), &constraints(&schema), &[]);
        book(&mut tracker, &schema, "1", &mut out);
        loan(&mut tracker, &schema, "9", &mut out);
        tracker.leave(&schema, "", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, DiagnosticCode::UnresolvedKeyRef);
    }

    #[test]
    fn test_missing_key_field() {
        let schema = schema();
        let mut tracker = IdentityTracker::new();
        let mut out = Vec::new();
        tracker.enter(&schema, &QName::local("library"), &constraints(&schema), &[]);
        tracker.enter(&schema, &QName::local("book"), &[], &[]);
        tracker.leave(&schema, "", &mut out);
        tracker.leave(&schema, "", &mut out);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].code, DiagnosticCode::MissingKeyField);
        assert_eq!(out[0].expected, vec!["isbn".to_string()]);
    }
}
