//! Token types
//!
//! Every borrowed piece of a token points into the tokenizer's buffers and
//! lives only until the next advance. The borrow checker enforces this: a
//! [`Token`] borrows the tokenizer, so callers must copy what they keep.

use serde::Serialize;

use super::interner::NameId;

/// Token categories
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TokenKind {
    /// `<name …>` or `<name …/>`
    StartElement,
    /// `</name>`, also synthesized after a self-closing tag
    EndElement,
    /// Character data
    CharData,
    /// `<![CDATA[…]]>`
    CData,
    /// `<!--…-->`
    Comment,
    /// `<?target data?>`
    ProcessingInstruction,
    /// `<!DOCTYPE …>`
    Directive,
    /// End of input
    Eof,
}

/// Position of a token in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct Position {
    /// Absolute byte offset
    pub offset: u64,
    /// 1-based line (0 when tracking is off)
    pub line: usize,
    /// 1-based column in characters (0 when tracking is off)
    pub column: usize,
}

/// A qualified name as written in the document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlName<'a> {
    /// `prefix:local` or `local`
    pub qualified: &'a str,
    /// Prefix, empty when absent
    pub prefix: &'a str,
    /// Local part
    pub local: &'a str,
}

impl<'a> XmlName<'a> {
    /// Split a qualified name at its colon
    pub fn split(qualified: &'a str) -> Self {
        let (prefix, local) = qualified.split_once(':').unwrap_or(("", qualified));
        Self {
            qualified,
            prefix,
            local,
        }
    }
}

/// Offsets of one attribute inside its start tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct AttrRecord {
    pub name: (usize, usize),
    pub value: (usize, usize),
    pub expanded: Option<(usize, usize)>,
}

/// One attribute of a start tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attribute<'a> {
    /// Attribute name
    pub name: XmlName<'a>,
    /// Value exactly as written between the quotes
    pub raw_value: &'a str,
    /// Value after reference expansion and normalization (equals
    /// `raw_value` when nothing needed expanding or expansion is off)
    pub value: &'a str,
}

/// A start tag
#[derive(Debug, Clone, Copy)]
pub struct StartTag<'a> {
    source: &'a str,
    aux: &'a str,
    records: &'a [AttrRecord],
    name: XmlName<'a>,
    name_id: NameId,
    self_closing: bool,
}

impl<'a> StartTag<'a> {
    pub(crate) fn new(
        source: &'a str,
        aux: &'a str,
        records: &'a [AttrRecord],
        name_len: usize,
        name_id: NameId,
        self_closing: bool,
    ) -> Self {
        Self {
            source,
            aux,
            records,
            name: XmlName::split(&source[1..1 + name_len]),
            name_id,
            self_closing,
        }
    }

    /// Element name
    pub fn name(&self) -> XmlName<'a> {
        self.name
    }

    /// Interned handle of the element name
    pub fn name_id(&self) -> NameId {
        self.name_id
    }

    /// Whether the tag was written `<name/>`; an `EndElement` follows
    pub fn is_self_closing(&self) -> bool {
        self.self_closing
    }

    /// The whole tag as written
    pub fn raw(&self) -> &'a str {
        self.source
    }

    /// Number of attributes
    pub fn attribute_count(&self) -> usize {
        self.records.len()
    }

    /// The attribute at `index`, in document order
    pub fn attribute(&self, index: usize) -> Attribute<'a> {
        let record = self.records[index];
        let raw_value = &self.source[record.value.0..record.value.1];
        Attribute {
            name: XmlName::split(&self.source[record.name.0..record.name.1]),
            raw_value,
            value: match record.expanded {
                Some((start, end)) => &self.aux[start..end],
                None => raw_value,
            },
        }
    }

    /// Attributes in document order
    pub fn attributes(&self) -> impl Iterator<Item = Attribute<'a>> + 'a {
        let tag = *self;
        (0..tag.records.len()).map(move |i| tag.attribute(i))
    }

    /// Look up an attribute by its qualified name
    pub fn get(&self, qualified: &str) -> Option<Attribute<'a>> {
        self.attributes().find(|a| a.name.qualified == qualified)
    }
}

/// An end tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndTag<'a> {
    /// Element name
    pub name: XmlName<'a>,
    /// Interned handle of the element name
    pub name_id: NameId,
}

/// Character data or a CDATA section
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Text<'a> {
    /// Text as written (the merged value when coalescing)
    pub raw: &'a str,
    /// Text after reference expansion and line-end normalization
    pub value: &'a str,
}

/// A processing instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessingInstruction<'a> {
    /// PI target
    pub target: &'a str,
    /// Everything after the target and its separating white space
    pub data: &'a str,
}

/// A scanned token
#[derive(Debug, Clone, Copy)]
pub enum Token<'a> {
    /// Start tag
    StartElement(StartTag<'a>),
    /// End tag
    EndElement(EndTag<'a>),
    /// Character data
    CharData(Text<'a>),
    /// CDATA section
    CData(Text<'a>),
    /// Comment body
    Comment(&'a str),
    /// Processing instruction
    ProcessingInstruction(ProcessingInstruction<'a>),
    /// Directive body (after `<!`)
    Directive(&'a str),
    /// End of input
    Eof,
}

impl Token<'_> {
    /// The token category
    pub fn kind(&self) -> TokenKind {
        match self {
            Token::StartElement(_) => TokenKind::StartElement,
            Token::EndElement(_) => TokenKind::EndElement,
            Token::CharData(_) => TokenKind::CharData,
            Token::CData(_) => TokenKind::CData,
            Token::Comment(_) => TokenKind::Comment,
            Token::ProcessingInstruction(_) => TokenKind::ProcessingInstruction,
            Token::Directive(_) => TokenKind::Directive,
            Token::Eof => TokenKind::Eof,
        }
    }
}

/// The `<?xml …?>` declaration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct XmlDeclaration {
    /// `version` pseudo-attribute
    pub version: String,
    /// `encoding` pseudo-attribute
    pub encoding: Option<String>,
    /// `standalone` pseudo-attribute
    pub standalone: Option<bool>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        let name = XmlName::split("xs:element");
        assert_eq!(name.prefix, "xs");
        assert_eq!(name.local, "element");
        let name = XmlName::split("element");
        assert_eq!(name.prefix, "");
        assert_eq!(name.local, "element");
    }
}
