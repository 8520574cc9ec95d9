//! Entity and character references
//!
//! Expansion writes into a caller-owned side buffer so the raw bytes stay
//! addressable. Custom entity values are inserted literally and never
//! re-scanned, so expansion output is bounded by input size plus the largest
//! configured value per reference.

use std::collections::BTreeMap;

use crate::error::SyntaxErrorKind;
use crate::names::{is_name_char, is_name_start_char, is_xml_char};

/// A parsed reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Reference<'a> {
    /// `&name;`
    Named(&'a str),
    /// `&#nnn;` or `&#xhh;`
    Char(char),
}

/// Failure inside a run of text, with its offset relative to the run start
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExpandError {
    pub kind: SyntaxErrorKind,
    pub message: String,
    pub at: usize,
}

impl ExpandError {
    fn new(kind: SyntaxErrorKind, message: impl Into<String>, at: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            at,
        }
    }
}

/// What the expanded text is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TextMode {
    /// Character data: line endings normalized
    Content,
    /// Attribute value: literal tab/CR/LF become spaces
    Attribute,
}

/// The five entities every XML processor knows
pub(crate) fn predefined(name: &str) -> Option<&'static str> {
    match name {
        "lt" => Some("<"),
        "gt" => Some(">"),
        "amp" => Some("&"),
        "apos" => Some("'"),
        "quot" => Some("\""),
        _ => None,
    }
}

/// Parse the reference at the start of `bytes` (which begins with `&`).
/// Returns the reference and its length including the closing `;`.
pub(crate) fn scan_reference(bytes: &[u8]) -> Result<(Reference<'_>, usize), ExpandError> {
    let malformed = || ExpandError::new(SyntaxErrorKind::MalformedEntity, "malformed reference", 0);
    let semi = memchr::memchr(b';', bytes).ok_or_else(malformed)?;
    let body = std::str::from_utf8(&bytes[1..semi]).map_err(|_| malformed())?;
    if let Some(num) = body.strip_prefix('#') {
        let value = if let Some(hex) = num.strip_prefix('x') {
            if hex.is_empty() || !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
                return Err(malformed());
            }
            u32::from_str_radix(hex, 16).ok()
        } else {
            if num.is_empty() || !num.bytes().all(|b| b.is_ascii_digit()) {
                return Err(malformed());
            }
            num.parse::<u32>().ok()
        };
        let c = value.and_then(char::from_u32).filter(|&c| is_xml_char(c)).ok_or_else(|| {
            ExpandError::new(
                SyntaxErrorKind::InvalidCharacter,
                format!("character reference &{}; is not an XML character", body),
                0,
            )
        })?;
        return Ok((Reference::Char(c), semi + 1));
    }
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if is_name_start_char(c) && c != ':' && chars.all(is_name_char) => {
            Ok((Reference::Named(body), semi + 1))
        }
        _ => Err(malformed()),
    }
}

/// Whether `raw` must go through [`expand`] to obtain its value
pub(crate) fn needs_expansion(raw: &[u8], mode: TextMode) -> bool {
    match mode {
        TextMode::Content => memchr::memchr2(b'&', b'\r', raw).is_some(),
        TextMode::Attribute => {
            memchr::memchr3(b'&', b'\r', b'\n', raw).is_some() || memchr::memchr(b'\t', raw).is_some()
        }
    }
}

/// Check reference syntax without expanding
pub(crate) fn check_references(raw: &[u8]) -> Result<(), ExpandError> {
    let mut i = 0;
    while let Some(off) = memchr::memchr(b'&', &raw[i..]) {
        let at = i + off;
        let (_, len) = scan_reference(&raw[at..]).map_err(|mut e| {
            e.at = at;
            e
        })?;
        i = at + len;
    }
    Ok(())
}

/// Expand `raw` into `out` (appending). `limit` bounds the output size
/// (0 = unlimited).
pub(crate) fn expand(
    raw: &[u8],
    mode: TextMode,
    custom: &BTreeMap<String, String>,
    out: &mut Vec<u8>,
    limit: usize,
) -> Result<(), ExpandError> {
    let start_len = out.len();
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        match b {
            b'&' => {
                let (reference, len) = scan_reference(&raw[i..]).map_err(|mut e| {
                    e.at = i;
                    e
                })?;
                match reference {
                    Reference::Char(c) => {
                        let mut tmp = [0u8; 4];
                        out.extend_from_slice(c.encode_utf8(&mut tmp).as_bytes());
                    }
                    Reference::Named(name) => {
                        let value = predefined(name)
                            .or_else(|| custom.get(name).map(String::as_str))
                            .ok_or_else(|| {
                                ExpandError::new(
                                    SyntaxErrorKind::UndefinedEntity,
                                    format!("undefined entity &{};", name),
                                    i,
                                )
                            })?;
                        if let Some(bad) = value.chars().find(|&c| !is_xml_char(c)) {
                            return Err(ExpandError::new(
                                SyntaxErrorKind::InvalidCharacter,
                                format!("entity &{}; expands to invalid character {:?}", name, bad),
                                i,
                            ));
                        }
                        out.extend_from_slice(value.as_bytes());
                    }
                }
                i += len;
            }
            b'\r' => {
                out.push(if mode == TextMode::Attribute { b' ' } else { b'\n' });
                i += if raw.get(i + 1) == Some(&b'\n') { 2 } else { 1 };
            }
            b'\n' | b'\t' if mode == TextMode::Attribute => {
                out.push(b' ');
                i += 1;
            }
            _ => {
                let stop = raw[i..]
                    .iter()
                    .position(|&c| matches!(c, b'&' | b'\r' | b'\n' | b'\t'))
                    .map_or(raw.len(), |p| i + p.max(1));
                out.extend_from_slice(&raw[i..stop]);
                i = stop;
            }
        }
        if limit != 0 && out.len() - start_len > limit {
            return Err(ExpandError::new(
                SyntaxErrorKind::TokenTooLarge,
                format!("expanded text exceeds {} bytes", limit),
                i.min(raw.len()),
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand_str(raw: &str, mode: TextMode) -> Result<String, ExpandError> {
        let mut out = Vec::new();
        expand(raw.as_bytes(), mode, &BTreeMap::new(), &mut out, 0)?;
        Ok(String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_predefined_and_char_refs() {
        assert_eq!(
            expand_str("a &lt; b &amp;&#65;&#x42;", TextMode::Content).unwrap(),
            "a < b &AB"
        );
    }

    #[test]
    fn test_line_endings() {
        assert_eq!(expand_str("a\r\nb\rc", TextMode::Content).unwrap(), "a\nb\nc");
    }

    #[test]
    fn test_attribute_normalization() {
        assert_eq!(
            expand_str("a\tb\r\nc&#10;d", TextMode::Attribute).unwrap(),
            "a b c\nd"
        );
    }

    #[test]
    fn test_undefined_entity() {
        let err = expand_str("x &nope; y", TextMode::Content).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::UndefinedEntity);
        assert_eq!(err.at, 2);
    }

    #[test]
    fn test_custom_entity() {
        let mut custom = BTreeMap::new();
        custom.insert("me".to_string(), "xsdstream".to_string());
        let mut out = Vec::new();
        expand(b"hi &me;", TextMode::Content, &custom, &mut out, 0).unwrap();
        assert_eq!(out, b"hi xsdstream");
    }

    #[test]
    fn test_malformed_and_invalid_refs() {
        assert_eq!(
            check_references(b"a & b").unwrap_err().kind,
            SyntaxErrorKind::MalformedEntity
        );
        assert_eq!(
            check_references(b"&#0;").unwrap_err().kind,
            SyntaxErrorKind::InvalidCharacter
        );
        assert!(check_references(b"&foo; &#x20;").is_ok());
    }

    #[test]
    fn test_limit() {
        let mut out = Vec::new();
        let err = expand(b"0123456789", TextMode::Content, &BTreeMap::new(), &mut out, 4).unwrap_err();
        assert_eq!(err.kind, SyntaxErrorKind::TokenTooLarge);
    }
}
