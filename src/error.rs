//! Error types for xsdstream
//!
//! Every failure of the compile pipeline or of the tokenizer is returned as an
//! [`Error`]. Instance-document validity problems are not errors: they are
//! collected as [`Diagnostic`](crate::validation::Diagnostic) records by a
//! validation session.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::namespaces::QName;

/// Result type alias using the crate [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for xsdstream operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O or parse failure on a schema document
    #[error("load error: {0}")]
    Load(#[from] LoadError),

    /// A QName reference that does not resolve to a global declaration
    #[error("reference error: {0}")]
    Reference(#[from] ReferenceError),

    /// Illegal base type, forbidden derivation, or derivation cycle
    #[error("derivation error: {0}")]
    Derivation(String),

    /// Illegal repetition bounds, surviving placeholder, recursion, overflow
    #[error("structural error: {0}")]
    Structural(String),

    /// An occurrence bound above the configured `max_occurs_limit`
    #[error("occurrence bound {value} exceeds the configured limit {limit}")]
    OccursTooLarge {
        /// The offending bound as written in the schema
        value: u64,
        /// The configured limit
        limit: u32,
    },

    /// A content model that violates Unique Particle Attribution
    #[error("UPA violation: {0}")]
    Upa(#[from] UpaError),

    /// Automaton construction failed even after NFA fallback
    #[error("compile error: {0}")]
    Compile(String),

    /// Well-formedness failure reported by the tokenizer
    #[error("syntax error: {0}")]
    Syntax(#[from] SyntaxError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl Error {
    /// Shorthand for a [`Error::Structural`] error
    pub fn structural(message: impl Into<String>) -> Self {
        Error::Structural(message.into())
    }

    /// Shorthand for a [`Error::Derivation`] error
    pub fn derivation(message: impl Into<String>) -> Self {
        Error::Derivation(message.into())
    }
}

/// Failure to load or parse a schema document
#[derive(Debug, Clone)]
pub struct LoadError {
    /// Error message
    pub message: String,
    /// Schema location that was being loaded
    pub location: Option<String>,
}

impl LoadError {
    /// Create a new load error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            location: None,
        }
    }

    /// Set the location
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref loc) = self.location {
            write!(f, " (in '{}')", loc)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadError {}

/// The kind of schema component a reference points at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReferenceKind {
    /// `<element ref="…"/>`
    Element,
    /// `<attribute ref="…"/>`
    Attribute,
    /// `<group ref="…"/>`
    Group,
    /// `<attributeGroup ref="…"/>`
    AttributeGroup,
    /// `type=`, `base=`, `itemType=`, `memberTypes=`
    Type,
    /// `substitutionGroup=`
    SubstitutionHead,
    /// `keyref/@refer`
    IdentityConstraint,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ReferenceKind::Element => "element",
            ReferenceKind::Attribute => "attribute",
            ReferenceKind::Group => "group",
            ReferenceKind::AttributeGroup => "attribute group",
            ReferenceKind::Type => "type",
            ReferenceKind::SubstitutionHead => "substitution group head",
            ReferenceKind::IdentityConstraint => "identity constraint",
        };
        f.write_str(label)
    }
}

/// An unresolved QName reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceError {
    /// The component holding the reference
    pub referrer: String,
    /// What kind of component was expected
    pub kind: ReferenceKind,
    /// The name that did not resolve
    pub missing: QName,
}

impl ReferenceError {
    /// Create a new reference error
    pub fn new(referrer: impl Into<String>, kind: ReferenceKind, missing: QName) -> Self {
        Self {
            referrer: referrer.into(),
            kind,
            missing,
        }
    }
}

impl fmt::Display for ReferenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} refers to undeclared {} '{}'",
            self.referrer, self.kind, self.missing
        )
    }
}

impl std::error::Error for ReferenceError {}

/// Two positions of one content model overlap
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpaError {
    /// Name of the complex type (or `#anonymous`) owning the content model
    pub type_name: String,
    /// First overlapping position
    pub first: usize,
    /// Second overlapping position
    pub second: usize,
    /// What both positions admit
    pub symbol: Option<String>,
}

impl UpaError {
    /// Create a new UPA error
    pub fn new(type_name: impl Into<String>, first: usize, second: usize) -> Self {
        Self {
            type_name: type_name.into(),
            first,
            second,
            symbol: None,
        }
    }

    /// Set the contested symbol
    pub fn with_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.symbol = Some(symbol.into());
        self
    }
}

impl fmt::Display for UpaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "positions {} and {} overlap in the content model of {}",
            self.first, self.second, self.type_name
        )?;
        if let Some(ref symbol) = self.symbol {
            write!(f, " (both admit {})", symbol)?;
        }
        Ok(())
    }
}

impl std::error::Error for UpaError {}

/// Well-formedness failure categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyntaxErrorKind {
    /// End tag does not match the open element
    MismatchedEndTag,
    /// A second root element
    MultipleRoots,
    /// Non-whitespace content before or after the root element
    ContentOutsideRoot,
    /// Two attributes with the same name on one element
    DuplicateAttribute,
    /// `<!DOCTYPE` after the root element started
    DirectiveAfterRoot,
    /// A second `<!DOCTYPE`
    DuplicateDirective,
    /// `<?xml …?>` anywhere but the very start, or twice
    MisplacedXmlDeclaration,
    /// A character outside the XML `Char` production, or invalid UTF-8
    InvalidCharacter,
    /// A malformed element, attribute, PI, or entity name
    InvalidName,
    /// `<?` without `?>`
    UnterminatedPi,
    /// `<!--` without `-->`
    UnterminatedComment,
    /// `<![CDATA[` without `]]>`
    UnterminatedCdata,
    /// `]]>` inside character data
    CdataEndInCharData,
    /// `--` inside a comment
    DoubleHyphenInComment,
    /// `max_depth` exceeded
    DepthLimitExceeded,
    /// `max_attrs` exceeded
    AttributeLimitExceeded,
    /// `max_token_size` exceeded
    TokenTooLarge,
    /// An encoding the tokenizer cannot transcode
    UnsupportedEncoding,
    /// A named entity that is neither predefined nor configured
    UndefinedEntity,
    /// `&` not followed by a well-formed reference
    MalformedEntity,
    /// Markup that does not follow the XML grammar
    MalformedMarkup,
    /// Input ended with open elements or inside markup
    UnexpectedEof,
    /// Input ended without any root element
    MissingRoot,
}

/// A fatal well-formedness error with its position in the input
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxError {
    /// Error category
    pub kind: SyntaxErrorKind,
    /// Human readable message
    pub message: String,
    /// Absolute byte offset in the (transcoded) input
    pub offset: u64,
    /// 1-based line
    pub line: usize,
    /// 1-based column, counted in characters
    pub column: usize,
    /// Open-element path at the point of failure (`/a/b`)
    pub path: String,
    /// Up to 32 bytes either side of the offset
    pub snippet: String,
}

impl SyntaxError {
    /// Create a new syntax error without position information
    pub fn new(kind: SyntaxErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            offset: 0,
            line: 0,
            column: 0,
            path: String::new(),
            snippet: String::new(),
        }
    }

    /// Set the position
    pub fn at(mut self, offset: u64, line: usize, column: usize) -> Self {
        self.offset = offset;
        self.line = line;
        self.column = column;
        self
    }

    /// Set the open-element path
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the input snippet
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = snippet.into();
        self
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} at line {}, column {} (offset {})",
            self.message, self.line, self.column, self.offset
        )?;
        if !self.path.is_empty() {
            write!(f, " in {}", self.path)?;
        }
        if !self.snippet.is_empty() {
            write!(f, ": {:?}", self.snippet)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyntaxError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_error_display() {
        let err = LoadError::new("not a schema document").with_location("a.xsd");
        assert_eq!(format!("{}", err), "not a schema document (in 'a.xsd')");
    }

    #[test]
    fn test_reference_error_display() {
        let err = ReferenceError::new(
            "element 'order'",
            ReferenceKind::Type,
            QName::new("urn:x", "OrderType"),
        );
        let msg = err.to_string();
        assert!(msg.contains("element 'order'"));
        assert!(msg.contains("undeclared type"));
        assert!(msg.contains("{urn:x}OrderType"));
    }

    #[test]
    fn test_upa_error_names_positions() {
        let err = UpaError::new("T", 0, 1).with_symbol("a");
        let msg = err.to_string();
        assert!(msg.contains("positions 0 and 1 overlap"));
        assert!(msg.contains("both admit a"));
    }

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::new(SyntaxErrorKind::MismatchedEndTag, "expected </a>")
            .at(12, 2, 5)
            .with_path("/root/a")
            .with_snippet("<a></b>");
        let msg = err.to_string();
        assert!(msg.contains("line 2, column 5"));
        assert!(msg.contains("/root/a"));
    }

    #[test]
    fn test_error_conversion() {
        let err: Error = UpaError::new("T", 1, 2).into();
        assert!(matches!(err, Error::Upa(_)));
        let err: Error = SyntaxError::new(SyntaxErrorKind::MissingRoot, "no root").into();
        assert!(matches!(err, Error::Syntax(_)));
    }
}
