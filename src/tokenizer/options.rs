//! Tokenizer options

use encoding_rs::Encoding;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Maps a declared `encoding="…"` label to a decoder
///
/// Consulted only for labels other than UTF-8, UTF-16, and US-ASCII.
/// Returning `None` makes the label an unsupported encoding.
pub type CharsetReader = Arc<dyn Fn(&str) -> Option<&'static Encoding> + Send + Sync>;

/// Tokenizer configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TokenizerOptions {
    /// Expand entity and character references in text and attribute values
    pub resolve_entities: bool,
    /// Emit `Comment` tokens
    pub emit_comments: bool,
    /// Emit processing instruction tokens
    pub emit_pi: bool,
    /// Emit `<!DOCTYPE …>` tokens
    pub emit_directives: bool,
    /// Compute line and column numbers
    pub track_line_column: bool,
    /// Merge adjacent character data and CDATA sections into one token
    pub coalesce_char_data: bool,
    /// Maximum element depth (0 = unlimited)
    pub max_depth: usize,
    /// Maximum attributes on one element (0 = unlimited)
    pub max_attrs: usize,
    /// Maximum size of one token, and of the scan buffer (0 = unlimited)
    pub max_token_size: usize,
    /// Named entities beyond the five predefined ones; values are inserted
    /// literally
    pub entities: BTreeMap<String, String>,
    /// Decoder lookup for declared non-UTF encodings
    #[serde(skip)]
    pub charset_reader: Option<CharsetReader>,
}

impl Default for TokenizerOptions {
    fn default() -> Self {
        Self {
            resolve_entities: false,
            emit_comments: false,
            emit_pi: false,
            emit_directives: false,
            track_line_column: true,
            coalesce_char_data: false,
            max_depth: 0,
            max_attrs: 0,
            max_token_size: 0,
            entities: BTreeMap::new(),
            charset_reader: None,
        }
    }
}

impl TokenizerOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Options for feeding a validator: references expanded, text coalesced
    pub fn for_validation() -> Self {
        Self {
            resolve_entities: true,
            coalesce_char_data: true,
            ..Self::default()
        }
    }

    /// Create strict limits for untrusted input
    pub fn strict() -> Self {
        Self {
            max_depth: 256,
            max_attrs: 256,
            max_token_size: 1024 * 1024, // 1 MB
            ..Self::for_validation()
        }
    }

    /// Register a custom named entity
    pub fn with_entity(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.entities.insert(name.into(), value.into());
        self
    }

    /// Install a charset reader
    pub fn with_charset_reader(mut self, reader: CharsetReader) -> Self {
        self.charset_reader = Some(reader);
        self
    }

    /// Install a charset reader that accepts every label `encoding_rs` knows
    pub fn with_encoding_rs_charsets(self) -> Self {
        self.with_charset_reader(Arc::new(|label: &str| Encoding::for_label(label.as_bytes())))
    }
}

impl fmt::Debug for TokenizerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenizerOptions")
            .field("resolve_entities", &self.resolve_entities)
            .field("emit_comments", &self.emit_comments)
            .field("emit_pi", &self.emit_pi)
            .field("emit_directives", &self.emit_directives)
            .field("track_line_column", &self.track_line_column)
            .field("coalesce_char_data", &self.coalesce_char_data)
            .field("max_depth", &self.max_depth)
            .field("max_attrs", &self.max_attrs)
            .field("max_token_size", &self.max_token_size)
            .field("entities", &self.entities)
            .field("charset_reader", &self.charset_reader.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = TokenizerOptions::default();
        assert!(!options.resolve_entities);
        assert!(options.track_line_column);
        assert_eq!(options.max_depth, 0);
    }

    #[test]
    fn test_json_skips_charset_reader() {
        let options = TokenizerOptions::default()
            .with_entity("copy", "\u{A9}")
            .with_encoding_rs_charsets();
        let json = serde_json::to_string(&options).unwrap();
        assert!(!json.contains("charset_reader"));
        let back: TokenizerOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(back.entities.get("copy").map(String::as_str), Some("\u{A9}"));
        assert!(back.charset_reader.is_none());
    }
}
