//! Streaming instance validation
//!
//! A [`ValidationSession`] drives the tokenizer over an instance document
//! and checks it against a compiled [`RuntimeSchema`](crate::runtime::RuntimeSchema):
//! content models through per-element [`Cursor`]s, attributes through the
//! per-type attribute indexes, text through the simple-type validators, and
//! identity constraints through an [`IdentityTracker`].

pub mod cursor;
pub mod diagnostics;
pub mod identity;
pub mod session;

pub use cursor::{Cursor, Step};
pub use diagnostics::{Diagnostic, DiagnosticCode, ValidationReport};
pub use identity::IdentityTracker;
pub use session::{SessionOptions, ValidationSession};
