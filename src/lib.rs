//! # xsdstream
//!
//! Compiles XML Schema 1.0 documents into deterministic content-model
//! automata and validates XML instance streams against them.
//!
//! Compilation runs once per schema and produces an immutable
//! [`RuntimeSchema`]: dense tables of types, elements, and attributes, one
//! DFA (or NFA, or all-group model) per complex type, and a stable build
//! hash. Validation streams the instance through a pull tokenizer and never
//! builds a tree.
//!
//! ## Features
//!
//! - Pull tokenizer with entity expansion, encoding detection, and limits
//! - `xs:include` / `xs:import` through pluggable schema loaders
//! - Glushkov construction, subset construction with an NFA fallback, and
//!   Unique Particle Attribution checking
//! - Substitution groups, `block` / `final` / `abstract`, `xsi:type`,
//!   `xsi:nil`
//! - Simple types with facets, lists, and unions
//! - `xs:unique`, `xs:key`, `xs:keyref`
//! - Structured diagnostics with JSON export
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use xsdstream::{SchemaCompiler, ValidationSession};
//!
//! let schema = SchemaCompiler::new().compile_str(
//!     r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
//!          <xs:element name="note" type="xs:string"/>
//!        </xs:schema>"#,
//! )?;
//! let mut session = ValidationSession::new(Arc::new(schema));
//! let report = session.validate_bytes(b"<note>hello</note>")?;
//! assert!(report.is_valid());
//! # Ok::<(), xsdstream::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

// Foundation
pub mod error;
pub mod limits;

// Names and locations
pub mod names;
pub mod namespaces;
pub mod locations;

// Input
pub mod tokenizer;
pub mod loaders;
pub mod documents;

// Compile pipeline
pub mod validators;
pub mod automata;
pub mod runtime;

// Instance validation
pub mod validation;

use std::sync::Arc;

// Re-exports for convenience
pub use error::{Error, Result};
pub use limits::CompileConfig;
pub use loaders::{FsLoader, LoaderOptions, MemoryLoader, SchemaLoader};
pub use namespaces::QName;
pub use runtime::RuntimeSchema;
pub use tokenizer::{Token, Tokenizer, TokenizerOptions};
pub use validation::{Diagnostic, DiagnosticCode, SessionOptions, ValidationReport, ValidationSession};
pub use validators::SchemaCompiler;

/// Version of the xsdstream library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// XSD 1.0 namespace
pub const XSD_1_0_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// XML namespace
pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";

/// XMLNS namespace
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

/// Compile a self-contained schema document with default configuration
pub fn compile_str(source: &str) -> Result<RuntimeSchema> {
    SchemaCompiler::new().compile_str(source)
}

/// Compile a self-contained schema document given as bytes
pub fn compile_bytes(source: &[u8]) -> Result<RuntimeSchema> {
    SchemaCompiler::new().compile_bytes(source)
}

/// Validate one document against a compiled schema
pub fn validate_bytes(schema: Arc<RuntimeSchema>, document: &[u8]) -> Result<ValidationReport> {
    ValidationSession::new(schema).validate_bytes(document)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_helpers() {
        let schema = compile_str(
            r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
                 <xs:element name="n" type="xs:int"/>
               </xs:schema>"#,
        )
        .unwrap();
        let schema = Arc::new(schema);
        assert!(validate_bytes(Arc::clone(&schema), b"<n>42</n>").unwrap().is_valid());
        let report = validate_bytes(schema, b"<n>forty-two</n>").unwrap();
        assert_eq!(report.count(DiagnosticCode::InvalidValue), 1);
    }
}
