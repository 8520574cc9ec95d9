//! Validation diagnostics
//!
//! A [`Diagnostic`] describes one way an instance document departs from its
//! schema. Diagnostics are plain data: they are collected by a session,
//! handed to a sink as they occur, and exported as JSON.

use std::fmt;

use serde::Serialize;

use crate::error::SyntaxError;

/// What went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiagnosticCode {
    /// The root element has no global declaration
    UnknownRoot,
    /// A child the content model does not admit here
    UnexpectedElement,
    /// A second occurrence of an `xs:all` member
    DuplicateElement,
    /// The content model is not satisfied when the element closes
    IncompleteContent,
    /// A declaration or type that may not appear in an instance
    AbstractElement,
    /// An abstract type used for an element
    AbstractType,
    /// A strict wildcard matched a name without a global declaration
    UndeclaredElement,
    /// Non-whitespace text where only elements are allowed
    UnexpectedText,
    /// Children in an element of simple or empty content
    ChildrenNotAllowed,
    /// Text that fails its simple type
    InvalidValue,
    /// Text that differs from a `fixed` value
    FixedValueMismatch,
    /// An attribute the type does not declare or admit
    UnexpectedAttribute,
    /// A required attribute is absent
    MissingAttribute,
    /// A strict attribute wildcard matched an undeclared name
    UndeclaredAttribute,
    /// An attribute value that fails its simple type
    InvalidAttributeValue,
    /// An `xsi:type` naming an unknown type
    UnknownType,
    /// An `xsi:type` that does not validly derive from the declared type
    InvalidTypeSubstitution,
    /// `xsi:nil` on an element that is not nillable, or malformed
    NotNillable,
    /// A nilled element with content
    NilledWithContent,
    /// A prefix that is not bound
    UnboundPrefix,
    /// Two `xs:ID` values that are equal
    DuplicateId,
    /// An `xs:IDREF` naming no `xs:ID`
    UnresolvedIdRef,
    /// Two selected nodes with the same unique or key value
    DuplicateKey,
    /// A key field that selects nothing
    MissingKeyField,
    /// A field that selects more than one node
    AmbiguousField,
    /// A keyref value without a matching key
    UnresolvedKeyRef,
}

impl DiagnosticCode {
    /// The code as it appears in exported diagnostics
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownRoot => "unknown-root",
            Self::UnexpectedElement => "unexpected-element",
            Self::DuplicateElement => "duplicate-element",
            Self::IncompleteContent => "incomplete-content",
            Self::AbstractElement => "abstract-element",
            Self::AbstractType => "abstract-type",
            Self::UndeclaredElement => "undeclared-element",
            Self::UnexpectedText => "unexpected-text",
            Self::ChildrenNotAllowed => "children-not-allowed",
            Self::InvalidValue => "invalid-value",
            Self::FixedValueMismatch => "fixed-value-mismatch",
            Self::UnexpectedAttribute => "unexpected-attribute",
            Self::MissingAttribute => "missing-attribute",
            Self::UndeclaredAttribute => "undeclared-attribute",
            Self::InvalidAttributeValue => "invalid-attribute-value",
            Self::UnknownType => "unknown-type",
            Self::InvalidTypeSubstitution => "invalid-type-substitution",
            Self::NotNillable => "not-nillable",
            Self::NilledWithContent => "nilled-with-content",
            Self::UnboundPrefix => "unbound-prefix",
            Self::DuplicateId => "duplicate-id",
            Self::UnresolvedIdRef => "unresolved-id-ref",
            Self::DuplicateKey => "duplicate-key",
            Self::MissingKeyField => "missing-key-field",
            Self::AmbiguousField => "ambiguous-field",
            Self::UnresolvedKeyRef => "unresolved-key-ref",
        }
    }
}

impl fmt::Display for DiagnosticCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One validation problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    /// Category
    pub code: DiagnosticCode,
    /// Human readable message
    pub message: String,
    /// Path of the offending element (`/ns:root[1]/child[2]`)
    pub path: String,
    /// 1-based line of the token that triggered the diagnostic
    pub line: usize,
    /// 1-based column
    pub column: usize,
    /// What the schema admits at this point
    pub expected: Vec<String>,
    /// What the document contains
    pub actual: String,
}

impl Diagnostic {
    /// Create a diagnostic without location
    pub fn new(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path: String::new(),
            line: 0,
            column: 0,
            expected: Vec::new(),
            actual: String::new(),
        }
    }

    /// Set the element path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set line and column
    pub fn at(mut self, line: usize, column: usize) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    /// Set the admissible alternatives
    pub fn with_expected(mut self, expected: Vec<String>) -> Self {
        self.expected = expected;
        self
    }

    /// Set the actual value
    pub fn with_actual(mut self, actual: impl Into<String>) -> Self {
        self.actual = actual.into();
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)?;
        if !self.path.is_empty() {
            write!(f, " at {}", self.path)?;
        }
        if self.line > 0 {
            write!(f, " (line {}, column {})", self.line, self.column)?;
        }
        if !self.expected.is_empty() {
            write!(f, "; expected {}", self.expected.join(" | "))?;
        }
        Ok(())
    }
}

/// Outcome of validating one document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Every diagnostic, in document order
    pub diagnostics: Vec<Diagnostic>,
    /// The well-formedness error that stopped validation, if any
    pub fatal: Option<SyntaxError>,
    /// Whether `max_diagnostics` cut the list short
    pub truncated: bool,
}

impl ValidationReport {
    /// Whether the document is well-formed and valid
    pub fn is_valid(&self) -> bool {
        self.fatal.is_none() && self.diagnostics.is_empty()
    }

    /// Number of diagnostics with `code`
    pub fn count(&self, code: DiagnosticCode) -> usize {
        self.diagnostics.iter().filter(|d| d.code == code).count()
    }

    /// The report as pretty-printed JSON
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyntaxErrorKind;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::new(DiagnosticCode::UnexpectedElement, "unexpected element 'c'")
            .with_path("/root[1]/c[1]")
            .at(3, 7)
            .with_expected(vec!["a".to_string(), "b".to_string()])
            .with_actual("c");
        let text = d.to_string();
        assert!(text.starts_with("[unexpected-element]"));
        assert!(text.contains("/root[1]/c[1]"));
        assert!(text.contains("line 3, column 7"));
        assert!(text.contains("a | b"));
    }

    #[test]
    fn test_report_json() {
        let mut report = ValidationReport::default();
        assert!(report.is_valid());
        report
            .diagnostics
            .push(Diagnostic::new(DiagnosticCode::MissingAttribute, "attribute 'id' is required"));
        report.fatal = Some(SyntaxError::new(SyntaxErrorKind::UnexpectedEof, "unexpected end of input"));
        assert!(!report.is_valid());
        assert_eq!(report.count(DiagnosticCode::MissingAttribute), 1);

        let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        assert_eq!(json["diagnostics"][0]["code"], "missing-attribute");
        assert_eq!(json["fatal"]["kind"], "unexpected-eof");
    }

    #[test]
    fn test_code_strings_match_serde() {
        for code in [
            DiagnosticCode::UnknownRoot,
            DiagnosticCode::UnresolvedIdRef,
            DiagnosticCode::InvalidTypeSubstitution,
        ] {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }
}
