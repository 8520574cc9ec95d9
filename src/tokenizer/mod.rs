//! Streaming XML tokenizer
//!
//! A pull scanner over one reusable byte buffer. Each call to
//! [`Tokenizer::next_token`] completes one token in the buffer, checks it for
//! well-formedness, and hands out borrowed views into the buffer. When the
//! read position passes the middle of the buffer the unread tail is moved to
//! the front and `base_offset` absorbs the shift, so reported offsets are
//! always absolute.
//!
//! The first well-formedness violation is fatal and reported as a
//! [`SyntaxError`] with offset, line, column, open-element path, and a snippet
//! of the surrounding input.

mod encoding;
mod entities;
mod interner;
mod options;
mod token;

pub use interner::{NameId, NameInterner};
pub use options::{CharsetReader, TokenizerOptions};
pub use token::{
    Attribute, EndTag, Position, ProcessingInstruction, StartTag, Text, Token, TokenKind,
    XmlDeclaration, XmlName,
};

use std::io::{self, Read};

use self::encoding::{classify_declared, sniff, DeclaredEncoding, Sniffed, Source};
use self::entities::{check_references, expand, needs_expansion, ExpandError, TextMode};
use self::token::AttrRecord;
use crate::error::{Error, Result, SyntaxError, SyntaxErrorKind};
use crate::names::{is_name_char, is_name_start_char, is_space_byte, is_valid_qname};

const INITIAL_BUFFER: usize = 8 * 1024;
const SNIPPET_RADIUS: usize = 32;

/// A scanned token expressed as buffer offsets
#[derive(Debug, Clone, Copy)]
enum Raw {
    Start {
        start: usize,
        stop: usize,
        name_len: usize,
        name_id: NameId,
        self_closing: bool,
    },
    End {
        name_id: NameId,
    },
    Text {
        range: Option<(usize, usize)>,
        expanded: bool,
        cdata: bool,
    },
    Comment {
        start: usize,
        stop: usize,
    },
    Pi {
        target: (usize, usize),
        data: (usize, usize),
    },
    Directive {
        start: usize,
        stop: usize,
    },
    Eof,
}

/// Failure found while parsing a complete tag, relative to the tag start
struct TagError {
    kind: SyntaxErrorKind,
    message: String,
    at: usize,
}

impl TagError {
    fn new(kind: SyntaxErrorKind, message: impl Into<String>, at: usize) -> Self {
        Self {
            kind,
            message: message.into(),
            at,
        }
    }

    fn malformed(message: impl Into<String>, at: usize) -> Self {
        Self::new(SyntaxErrorKind::MalformedMarkup, message, at)
    }
}

impl From<ExpandError> for TagError {
    fn from(e: ExpandError) -> Self {
        Self::new(e.kind, e.message, e.at)
    }
}

struct TagInfo {
    name_len: usize,
    self_closing: bool,
}

/// Pull-based XML tokenizer
pub struct Tokenizer<R> {
    source: Source<R>,
    options: TokenizerOptions,
    buf: Vec<u8>,
    pos: usize,
    filled: usize,
    base_offset: u64,
    eof: bool,
    started: bool,
    content_start: u64,
    line: usize,
    column: usize,
    token_position: Position,
    stack: Vec<NameId>,
    interner: NameInterner,
    seen_root: bool,
    root_closed: bool,
    seen_doctype: bool,
    declaration: Option<XmlDeclaration>,
    pending_end: Option<NameId>,
    finished: bool,
    attrs: Vec<AttrRecord>,
    aux: Vec<u8>,
    text: Vec<u8>,
}

impl<R: Read> Tokenizer<R> {
    /// Create a tokenizer over `reader`
    pub fn new(reader: R, options: TokenizerOptions) -> Self {
        let initial = match options.max_token_size {
            0 => INITIAL_BUFFER,
            max => max.clamp(16, INITIAL_BUFFER),
        };
        Self {
            source: Source::Raw(reader),
            options,
            buf: vec![0; initial],
            pos: 0,
            filled: 0,
            base_offset: 0,
            eof: false,
            started: false,
            content_start: 0,
            line: 1,
            column: 1,
            token_position: Position::default(),
            stack: Vec::new(),
            interner: NameInterner::default(),
            seen_root: false,
            root_closed: false,
            seen_doctype: false,
            declaration: None,
            pending_end: None,
            finished: false,
            attrs: Vec::new(),
            aux: Vec::new(),
            text: Vec::new(),
        }
    }

    /// Start over on a new document, keeping the allocated buffers.
    /// Previously issued [`NameId`]s become invalid.
    pub fn reset(&mut self, reader: R) {
        self.source = Source::Raw(reader);
        self.pos = 0;
        self.filled = 0;
        self.base_offset = 0;
        self.eof = false;
        self.started = false;
        self.content_start = 0;
        self.line = 1;
        self.column = 1;
        self.token_position = Position::default();
        self.stack.clear();
        self.interner.clear();
        self.seen_root = false;
        self.root_closed = false;
        self.seen_doctype = false;
        self.declaration = None;
        self.pending_end = None;
        self.finished = false;
        self.attrs.clear();
        self.aux.clear();
        self.text.clear();
    }

    /// The options in effect
    pub fn options(&self) -> &TokenizerOptions {
        &self.options
    }

    /// Absolute offset of the next unread byte
    pub fn input_offset(&self) -> u64 {
        self.base_offset + self.pos as u64
    }

    /// Start position of the most recent token
    pub fn position(&self) -> Position {
        self.token_position
    }

    /// Number of open elements
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Open-element path such as `/root/child`
    pub fn stack_path(&self) -> String {
        let mut path = String::new();
        for &id in &self.stack {
            path.push('/');
            path.push_str(self.interner.resolve(id));
        }
        path
    }

    /// The XML declaration, once scanned
    pub fn xml_declaration(&self) -> Option<&XmlDeclaration> {
        self.declaration.as_ref()
    }

    /// The name interner backing [`NameId`] handles
    pub fn interner(&self) -> &NameInterner {
        &self.interner
    }

    /// Scan the next token
    pub fn next_token(&mut self) -> Result<Token<'_>> {
        let raw = self.advance()?;
        self.materialize(raw)
    }

    /// Scan the next token together with its start position
    pub fn next_with_position(&mut self) -> Result<(Token<'_>, Position)> {
        let raw = self.advance()?;
        let position = self.token_position;
        Ok((self.materialize(raw)?, position))
    }

    fn advance(&mut self) -> Result<Raw> {
        if !self.started {
            self.start()?;
        }
        loop {
            if self.finished {
                return Ok(Raw::Eof);
            }
            if let Some(name_id) = self.pending_end.take() {
                self.mark_token_start();
                self.pop_element();
                return Ok(Raw::End { name_id });
            }
            self.mark_token_start();
            if !self.need(1)? {
                return self.at_eof();
            }
            if self.buf[self.pos] != b'<' {
                if self.stack.is_empty() {
                    self.skip_outside_text()?;
                    continue;
                }
                return if self.options.coalesce_char_data {
                    self.coalesce_text()
                } else {
                    self.scan_text()
                };
            }
            if !self.need(2)? {
                return Err(self.error_at(
                    SyntaxErrorKind::UnexpectedEof,
                    "unexpected end of input in markup",
                    self.filled,
                ));
            }
            match self.buf[self.pos + 1] {
                b'/' => return self.scan_end_tag(),
                b'?' => {
                    if let Some(raw) = self.scan_pi()? {
                        return Ok(raw);
                    }
                }
                b'!' => {
                    if let Some(raw) = self.scan_bang()? {
                        return Ok(raw);
                    }
                }
                _ => return self.scan_start_tag(),
            }
        }
    }

    fn start(&mut self) -> Result<()> {
        self.started = true;
        while self.filled - self.pos < 4 && self.fill()? {}
        let sniffed = sniff(&self.buf[self.pos..self.filled], true).unwrap_or(Sniffed::Plain);
        match sniffed {
            Sniffed::Utf8Bom => {
                self.pos += 3;
                self.content_start = 3;
            }
            Sniffed::Utf16Bom(encoding) => {
                let pending = self.buf[self.pos + 2..self.filled].to_vec();
                self.restart_decoded(encoding, &pending);
            }
            Sniffed::Utf16(encoding) => {
                let pending = self.buf[self.pos..self.filled].to_vec();
                self.restart_decoded(encoding, &pending);
            }
            Sniffed::Plain => {}
        }
        Ok(())
    }

    fn restart_decoded(&mut self, encoding: &'static encoding_rs::Encoding, pending: &[u8]) {
        self.source.transcode(encoding, pending);
        self.pos = 0;
        self.filled = 0;
        self.base_offset = 0;
        self.content_start = 0;
        self.eof = false;
        tracing::trace!(encoding = encoding.name(), "transcoding input");
    }

    fn mark_token_start(&mut self) {
        self.token_position = Position {
            offset: self.input_offset(),
            line: if self.options.track_line_column { self.line } else { 0 },
            column: if self.options.track_line_column { self.column } else { 0 },
        };
    }

    // ---- buffer management ----

    /// Read more input. Returns false at end of input.
    fn fill(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        if self.pos > 0 && (self.pos > self.buf.len() / 2 || self.filled == self.buf.len()) {
            self.buf.copy_within(self.pos..self.filled, 0);
            self.base_offset += self.pos as u64;
            self.filled -= self.pos;
            self.pos = 0;
        }
        if self.filled == self.buf.len() {
            let max = self.options.max_token_size;
            if max != 0 && self.buf.len() >= max {
                return Err(self.error_at(
                    SyntaxErrorKind::TokenTooLarge,
                    format!("token exceeds the {} byte limit", max),
                    self.pos,
                ));
            }
            let mut grown = self.buf.len() * 2;
            if max != 0 {
                grown = grown.min(max);
            }
            self.buf.resize(grown, 0);
        }
        loop {
            match self.source.read(&mut self.buf[self.filled..]) {
                Ok(0) => {
                    self.eof = true;
                    return Ok(false);
                }
                Ok(n) => {
                    self.filled += n;
                    return Ok(true);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                    return Err(self.error_at(
                        SyntaxErrorKind::InvalidCharacter,
                        e.to_string(),
                        self.filled,
                    ))
                }
                Err(e) => return Err(Error::Io(e)),
            }
        }
    }

    /// Make sure `n` unread bytes are buffered. Returns false if the input
    /// ends first.
    fn need(&mut self, n: usize) -> Result<bool> {
        while self.filled - self.pos < n {
            if !self.fill()? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Find `needle` at or after `from` bytes past the read position;
    /// returns the offset relative to the read position
    fn find(&mut self, from: usize, needle: &[u8]) -> Result<Option<usize>> {
        let mut from = from;
        loop {
            let avail = self.filled - self.pos;
            let start = from.min(avail);
            let hay = &self.buf[self.pos + start..self.filled];
            let hit = if needle.len() == 1 {
                memchr::memchr(needle[0], hay)
            } else {
                memchr::memmem::find(hay, needle)
            };
            if let Some(i) = hit {
                return Ok(Some(start + i));
            }
            from = start.max((avail + 1).saturating_sub(needle.len()));
            if !self.fill()? {
                return Ok(None);
            }
        }
    }

    /// Advance the read position, updating line and column
    fn consume(&mut self, n: usize) {
        if self.options.track_line_column {
            advance_position(&self.buf[self.pos..self.pos + n], &mut self.line, &mut self.column);
        }
        self.pos += n;
    }

    fn locate(&self, idx: usize) -> (usize, usize) {
        if !self.options.track_line_column {
            return (0, 0);
        }
        let (mut line, mut column) = (self.line, self.column);
        let idx = idx.min(self.filled);
        if idx > self.pos {
            advance_position(&self.buf[self.pos..idx], &mut line, &mut column);
        }
        (line, column)
    }

    fn error_at(&self, kind: SyntaxErrorKind, message: impl Into<String>, idx: usize) -> Error {
        let (line, column) = self.locate(idx);
        let idx = idx.min(self.filled);
        let lo = idx.saturating_sub(SNIPPET_RADIUS);
        let hi = (idx + SNIPPET_RADIUS).min(self.filled);
        let snippet = String::from_utf8_lossy(&self.buf[lo..hi]).into_owned();
        SyntaxError::new(kind, message)
            .at(self.base_offset + idx as u64, line, column)
            .with_path(self.stack_path())
            .with_snippet(snippet)
            .into()
    }

    /// Validate UTF-8 and the XML `Char` production over a buffer range
    fn check_chars(&self, start: usize, stop: usize) -> Result<()> {
        let bytes = &self.buf[start..stop];
        if let Err(e) = std::str::from_utf8(bytes) {
            return Err(self.error_at(
                SyntaxErrorKind::InvalidCharacter,
                "input is not valid UTF-8",
                start + e.valid_up_to(),
            ));
        }
        for (i, &b) in bytes.iter().enumerate() {
            let bad = (b < 0x20 && !matches!(b, b'\t' | b'\n' | b'\r'))
                || (b == 0xEF
                    && bytes.get(i + 1) == Some(&0xBF)
                    && matches!(bytes.get(i + 2), Some(&0xBE) | Some(&0xBF)));
            if bad {
                return Err(self.error_at(
                    SyntaxErrorKind::InvalidCharacter,
                    "character not allowed in XML",
                    start + i,
                ));
            }
        }
        Ok(())
    }

    fn str_at(&self, start: usize, stop: usize) -> Result<&str> {
        std::str::from_utf8(&self.buf[start..stop]).map_err(|_| {
            self.error_at(SyntaxErrorKind::InvalidCharacter, "input is not valid UTF-8", start)
        })
    }

    fn map_expand(&self, base: usize, e: ExpandError) -> Error {
        self.error_at(e.kind, e.message, base + e.at)
    }

    fn pop_element(&mut self) {
        self.stack.pop();
        if self.stack.is_empty() {
            self.root_closed = true;
        }
    }

    fn at_eof(&mut self) -> Result<Raw> {
        if let Some(&top) = self.stack.last() {
            let message = format!(
                "unexpected end of input inside <{}>",
                self.interner.resolve(top)
            );
            return Err(self.error_at(SyntaxErrorKind::UnexpectedEof, message, self.filled));
        }
        if !self.seen_root {
            return Err(self.error_at(
                SyntaxErrorKind::MissingRoot,
                "document has no root element",
                self.filled,
            ));
        }
        self.finished = true;
        Ok(Raw::Eof)
    }

    // ---- character data ----

    /// Length of the text run at the read position (up to `<` or end of input)
    fn text_run(&mut self) -> Result<usize> {
        Ok(match self.find(0, b"<")? {
            Some(end) => end,
            None => self.filled - self.pos,
        })
    }

    fn skip_outside_text(&mut self) -> Result<()> {
        let len = self.text_run()?;
        let start = self.pos;
        self.check_chars(start, start + len)?;
        if let Some(i) = self.buf[start..start + len]
            .iter()
            .position(|&b| !is_space_byte(b))
        {
            return Err(self.error_at(
                SyntaxErrorKind::ContentOutsideRoot,
                "character data outside the root element",
                start + i,
            ));
        }
        self.consume(len);
        Ok(())
    }

    /// Validate one text run and consume it; expanded output is appended to
    /// the text buffer when `into_text` is set or expansion is needed.
    /// Returns (start, stop, expanded).
    fn take_text_piece(&mut self, into_text: bool) -> Result<(usize, usize, bool)> {
        let len = self.text_run()?;
        let start = self.pos;
        let stop = start + len;
        self.check_chars(start, stop)?;
        if let Some(i) = memchr::memmem::find(&self.buf[start..stop], b"]]>") {
            return Err(self.error_at(
                SyntaxErrorKind::CdataEndInCharData,
                "']]>' is not allowed in character data",
                start + i,
            ));
        }
        let raw = &self.buf[start..stop];
        let mut expanded = false;
        if self.options.resolve_entities {
            if needs_expansion(raw, TextMode::Content) {
                let result = expand(
                    raw,
                    TextMode::Content,
                    &self.options.entities,
                    &mut self.text,
                    self.options.max_token_size,
                );
                if let Err(e) = result {
                    return Err(self.map_expand(start, e));
                }
                expanded = true;
            } else if into_text {
                self.text.extend_from_slice(raw);
            }
        } else {
            if let Err(e) = check_references(raw) {
                return Err(self.map_expand(start, e));
            }
            if into_text {
                self.text.extend_from_slice(raw);
            }
        }
        self.consume(len);
        Ok((start, stop, expanded))
    }

    fn scan_text(&mut self) -> Result<Raw> {
        self.text.clear();
        let (start, stop, expanded) = self.take_text_piece(false)?;
        Ok(Raw::Text {
            range: Some((start, stop)),
            expanded,
            cdata: false,
        })
    }

    /// Merge text, CDATA sections, and unreported comments and PIs into one
    /// character data token
    fn coalesce_text(&mut self) -> Result<Raw> {
        self.text.clear();
        loop {
            if !self.need(1)? {
                break;
            }
            if self.buf[self.pos] != b'<' {
                self.take_text_piece(true)?;
                continue;
            }
            self.need(9)?;
            let rest = &self.buf[self.pos..self.filled];
            if rest.starts_with(b"<![CDATA[") {
                let (start, stop) = self.take_cdata()?;
                // Borrow split: copy out of the main buffer into the text buffer
                let (buf, text) = (&self.buf, &mut self.text);
                text.extend_from_slice(&buf[start..stop]);
            } else if rest.starts_with(b"<!--") && !self.options.emit_comments {
                self.take_comment()?;
            } else if rest.starts_with(b"<?") && !self.options.emit_pi {
                self.scan_pi()?;
            } else {
                break;
            }
            let max = self.options.max_token_size;
            if max != 0 && self.text.len() > max {
                return Err(self.error_at(
                    SyntaxErrorKind::TokenTooLarge,
                    format!("character data exceeds the {} byte limit", max),
                    self.pos,
                ));
            }
        }
        Ok(Raw::Text {
            range: None,
            expanded: true,
            cdata: false,
        })
    }

    // ---- markup ----

    fn scan_bang(&mut self) -> Result<Option<Raw>> {
        self.need(9)?;
        let rest = &self.buf[self.pos..self.filled];
        if rest.starts_with(b"<!--") {
            let (start, stop) = self.take_comment()?;
            return Ok(self
                .options
                .emit_comments
                .then_some(Raw::Comment { start, stop }));
        }
        if rest.starts_with(b"<![CDATA[") {
            if self.options.coalesce_char_data && !self.stack.is_empty() {
                return self.coalesce_text().map(Some);
            }
            let (start, stop) = self.take_cdata()?;
            return Ok(Some(Raw::Text {
                range: Some((start, stop)),
                expanded: false,
                cdata: true,
            }));
        }
        if rest.starts_with(b"<!DOCTYPE") {
            return self.scan_directive();
        }
        Err(self.error_at(
            SyntaxErrorKind::MalformedMarkup,
            "unknown markup declaration",
            self.pos,
        ))
    }

    /// Consume a comment; returns the body range
    fn take_comment(&mut self) -> Result<(usize, usize)> {
        let dash = match self.find(4, b"--")? {
            Some(dash) => dash,
            None => {
                return Err(self.error_at(
                    SyntaxErrorKind::UnterminatedComment,
                    "unterminated comment",
                    self.pos,
                ))
            }
        };
        if !self.need(dash + 3)? || self.buf[self.pos + dash + 2] != b'>' {
            return Err(self.error_at(
                SyntaxErrorKind::DoubleHyphenInComment,
                "'--' is not allowed inside a comment",
                self.pos + dash,
            ));
        }
        let start = self.pos;
        self.check_chars(start, start + dash)?;
        self.consume(dash + 3);
        Ok((start + 4, start + dash))
    }

    /// Consume a CDATA section; returns the content range
    fn take_cdata(&mut self) -> Result<(usize, usize)> {
        if self.stack.is_empty() {
            return Err(self.error_at(
                SyntaxErrorKind::ContentOutsideRoot,
                "CDATA section outside the root element",
                self.pos,
            ));
        }
        let end = match self.find(9, b"]]>")? {
            Some(end) => end,
            None => {
                return Err(self.error_at(
                    SyntaxErrorKind::UnterminatedCdata,
                    "unterminated CDATA section",
                    self.pos,
                ))
            }
        };
        let start = self.pos;
        self.check_chars(start, start + end)?;
        self.consume(end + 3);
        Ok((start + 9, start + end))
    }

    fn scan_directive(&mut self) -> Result<Option<Raw>> {
        if self.seen_root {
            return Err(self.error_at(
                SyntaxErrorKind::DirectiveAfterRoot,
                "DOCTYPE after the root element",
                self.pos,
            ));
        }
        if self.seen_doctype {
            return Err(self.error_at(
                SyntaxErrorKind::DuplicateDirective,
                "second DOCTYPE declaration",
                self.pos,
            ));
        }
        let mut i = 2;
        let mut quote: Option<u8> = None;
        let mut depth = 0usize;
        let end = loop {
            if self.pos + i >= self.filled {
                if !self.fill()? {
                    return Err(self.error_at(
                        SyntaxErrorKind::UnexpectedEof,
                        "unterminated DOCTYPE declaration",
                        self.pos,
                    ));
                }
                continue;
            }
            let b = self.buf[self.pos + i];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None => match b {
                    b'"' | b'\'' => quote = Some(b),
                    b'[' => depth += 1,
                    b']' => depth = depth.saturating_sub(1),
                    b'>' if depth == 0 => break i,
                    _ => {}
                },
            }
            i += 1;
        };
        let start = self.pos;
        self.check_chars(start, start + end + 1)?;
        self.seen_doctype = true;
        self.consume(end + 1);
        Ok(self.options.emit_directives.then_some(Raw::Directive {
            start: start + 2,
            stop: start + end,
        }))
    }

    fn scan_pi(&mut self) -> Result<Option<Raw>> {
        let end = match self.find(2, b"?>")? {
            Some(end) => end,
            None => {
                return Err(self.error_at(
                    SyntaxErrorKind::UnterminatedPi,
                    "unterminated processing instruction",
                    self.pos,
                ))
            }
        };
        let start = self.pos;
        let stop = start + end + 2;
        self.check_chars(start, stop)?;
        let body = self.str_at(start + 2, start + end)?;
        let target_len = body
            .char_indices()
            .find(|&(i, c)| if i == 0 { !is_name_start_char(c) } else { !is_name_char(c) })
            .map_or(body.len(), |(i, _)| i);
        let target = &body[..target_len];
        if target.is_empty() {
            return Err(self.error_at(
                SyntaxErrorKind::InvalidName,
                "processing instruction without a valid target",
                start + 2,
            ));
        }
        let rest = &body[target_len..];
        if !rest.is_empty() && !rest.starts_with(|c: char| c.is_ascii_whitespace()) {
            return Err(self.error_at(
                SyntaxErrorKind::InvalidName,
                "invalid processing instruction target",
                start + 2 + target_len,
            ));
        }
        let data_start = start + 2 + target_len + (rest.len() - rest.trim_start().len());
        if target.eq_ignore_ascii_case("xml") {
            let at_start = target == "xml"
                && self.input_offset() == self.content_start
                && self.declaration.is_none();
            if !at_start {
                return Err(self.error_at(
                    SyntaxErrorKind::MisplacedXmlDeclaration,
                    "XML declaration is only allowed at the very start of the document",
                    start,
                ));
            }
            let declaration = match parse_declaration(rest) {
                Ok(declaration) => declaration,
                Err(message) => {
                    return Err(self.error_at(SyntaxErrorKind::MalformedMarkup, message, start))
                }
            };
            self.consume(stop - start);
            self.apply_declared_encoding(&declaration, start)?;
            self.declaration = Some(declaration);
            return Ok(None);
        }
        self.consume(stop - start);
        Ok(self.options.emit_pi.then_some(Raw::Pi {
            target: (start + 2, start + 2 + target_len),
            data: (data_start.min(start + end), start + end),
        }))
    }

    fn apply_declared_encoding(&mut self, declaration: &XmlDeclaration, at: usize) -> Result<()> {
        let label = match declaration.encoding.as_deref() {
            Some(label) => label,
            None => return Ok(()),
        };
        match classify_declared(label) {
            DeclaredEncoding::Utf8Compatible => Ok(()),
            DeclaredEncoding::Utf16 if self.source.is_decoded() => Ok(()),
            DeclaredEncoding::Utf16 => Err(self.error_at(
                SyntaxErrorKind::UnsupportedEncoding,
                "document declares UTF-16 but has no byte order mark",
                at,
            )),
            DeclaredEncoding::Other => {
                if self.source.is_decoded() {
                    return Ok(());
                }
                let encoding = self
                    .options
                    .charset_reader
                    .as_ref()
                    .and_then(|reader| reader(label));
                match encoding {
                    Some(encoding) => {
                        let pending = self.buf[self.pos..self.filled].to_vec();
                        self.source.transcode(encoding, &pending);
                        self.filled = self.pos;
                        tracing::trace!(encoding = encoding.name(), "switched to declared encoding");
                        Ok(())
                    }
                    None => Err(self.error_at(
                        SyntaxErrorKind::UnsupportedEncoding,
                        format!("unsupported encoding '{}'", label),
                        at,
                    )),
                }
            }
        }
    }

    /// Find the `>` closing a start tag, skipping quoted attribute values
    fn find_tag_end(&mut self) -> Result<usize> {
        let mut i = 1;
        let mut quote: Option<u8> = None;
        loop {
            let hay = &self.buf[self.pos + i..self.filled];
            let hit = match quote {
                Some(q) => memchr::memchr(q, hay),
                None => memchr::memchr3(b'>', b'"', b'\'', hay),
            };
            match hit {
                Some(off) => {
                    let b = hay[off];
                    i += off + 1;
                    match quote {
                        Some(_) => quote = None,
                        None if b == b'>' => return Ok(i - 1),
                        None => quote = Some(b),
                    }
                }
                None => {
                    i = self.filled - self.pos;
                    if !self.fill()? {
                        return Err(self.error_at(
                            SyntaxErrorKind::UnexpectedEof,
                            "unterminated start tag",
                            self.pos,
                        ));
                    }
                }
            }
        }
    }

    fn scan_start_tag(&mut self) -> Result<Raw> {
        let end = self.find_tag_end()?;
        let start = self.pos;
        let stop = start + end + 1;
        self.check_chars(start, stop)?;
        if self.stack.is_empty() && self.root_closed {
            return Err(self.error_at(
                SyntaxErrorKind::MultipleRoots,
                "document has more than one root element",
                start,
            ));
        }
        let max_depth = self.options.max_depth;
        if max_depth != 0 && self.stack.len() >= max_depth {
            return Err(self.error_at(
                SyntaxErrorKind::DepthLimitExceeded,
                format!("element depth exceeds {}", max_depth),
                start,
            ));
        }
        self.attrs.clear();
        self.aux.clear();
        let parsed = match std::str::from_utf8(&self.buf[start..stop]) {
            Ok(tag) => parse_start_tag(tag, &mut self.attrs, &mut self.aux, &self.options),
            Err(_) => Err(TagError::new(
                SyntaxErrorKind::InvalidCharacter,
                "input is not valid UTF-8",
                0,
            )),
        };
        let info = match parsed {
            Ok(info) => info,
            Err(e) => return Err(self.error_at(e.kind, e.message, start + e.at)),
        };
        let max_attrs = self.options.max_attrs;
        if max_attrs != 0 && self.attrs.len() > max_attrs {
            return Err(self.error_at(
                SyntaxErrorKind::AttributeLimitExceeded,
                format!("element has more than {} attributes", max_attrs),
                start,
            ));
        }
        let name_id = match std::str::from_utf8(&self.buf[start + 1..start + 1 + info.name_len]) {
            Ok(name) => self.interner.intern(name),
            Err(_) => {
                return Err(self.error_at(SyntaxErrorKind::InvalidName, "invalid element name", start))
            }
        };
        self.consume(stop - start);
        self.seen_root = true;
        self.stack.push(name_id);
        if info.self_closing {
            self.pending_end = Some(name_id);
        }
        Ok(Raw::Start {
            start,
            stop,
            name_len: info.name_len,
            name_id,
            self_closing: info.self_closing,
        })
    }

    fn scan_end_tag(&mut self) -> Result<Raw> {
        let end = match self.find(2, b">")? {
            Some(end) => end,
            None => {
                return Err(self.error_at(
                    SyntaxErrorKind::UnexpectedEof,
                    "unterminated end tag",
                    self.pos,
                ))
            }
        };
        let start = self.pos;
        self.check_chars(start, start + end + 1)?;
        let written = self.str_at(start + 2, start + end)?;
        let name = written.trim_end_matches(|c: char| c.is_ascii_whitespace());
        if !is_valid_qname(name) {
            return Err(self.error_at(SyntaxErrorKind::InvalidName, "invalid end tag name", start + 2));
        }
        let top = match self.stack.last() {
            Some(&top) => top,
            None => {
                let message = format!("end tag </{}> without an open element", name);
                return Err(self.error_at(SyntaxErrorKind::MismatchedEndTag, message, start));
            }
        };
        if self.interner.resolve(top) != name {
            let message = format!(
                "expected </{}>, found </{}>",
                self.interner.resolve(top),
                name
            );
            return Err(self.error_at(SyntaxErrorKind::MismatchedEndTag, message, start));
        }
        self.consume(end + 1);
        self.pop_element();
        Ok(Raw::End { name_id: top })
    }

    fn materialize(&self, raw: Raw) -> Result<Token<'_>> {
        Ok(match raw {
            Raw::Start {
                start,
                stop,
                name_len,
                name_id,
                self_closing,
            } => {
                let source = self.str_at(start, stop)?;
                let aux = std::str::from_utf8(&self.aux).map_err(|_| {
                    self.error_at(SyntaxErrorKind::InvalidCharacter, "invalid expansion", start)
                })?;
                Token::StartElement(StartTag::new(
                    source,
                    aux,
                    &self.attrs,
                    name_len,
                    name_id,
                    self_closing,
                ))
            }
            Raw::End { name_id } => Token::EndElement(EndTag {
                name: XmlName::split(self.interner.resolve(name_id)),
                name_id,
            }),
            Raw::Text {
                range,
                expanded,
                cdata,
            } => {
                let buffered = std::str::from_utf8(&self.text).map_err(|_| {
                    self.error_at(SyntaxErrorKind::InvalidCharacter, "invalid expansion", self.pos)
                })?;
                let raw_text = match range {
                    Some((start, stop)) => self.str_at(start, stop)?,
                    None => buffered,
                };
                let text = Text {
                    raw: raw_text,
                    value: if expanded { buffered } else { raw_text },
                };
                if cdata {
                    Token::CData(text)
                } else {
                    Token::CharData(text)
                }
            }
            Raw::Comment { start, stop } => Token::Comment(self.str_at(start, stop)?),
            Raw::Pi { target, data } => Token::ProcessingInstruction(ProcessingInstruction {
                target: self.str_at(target.0, target.1)?,
                data: self.str_at(data.0, data.1)?,
            }),
            Raw::Directive { start, stop } => Token::Directive(self.str_at(start, stop)?),
            Raw::Eof => Token::Eof,
        })
    }
}

impl<R> std::fmt::Debug for Tokenizer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tokenizer")
            .field("offset", &(self.base_offset + self.pos as u64))
            .field("depth", &self.stack.len())
            .field("buffer", &self.buf.len())
            .finish()
    }
}

/// Update line/column counters over consumed bytes
fn advance_position(bytes: &[u8], line: &mut usize, column: &mut usize) {
    let mut last_newline = None;
    for nl in memchr::memchr_iter(b'\n', bytes) {
        *line += 1;
        last_newline = Some(nl);
    }
    let tail = match last_newline {
        Some(nl) => {
            *column = 1;
            &bytes[nl + 1..]
        }
        None => bytes,
    };
    *column += tail.iter().filter(|&&b| b & 0xC0 != 0x80).count();
}

/// Scan a name starting at byte `i`; returns its end
fn scan_name(tag: &str, i: usize) -> std::result::Result<usize, TagError> {
    let mut chars = tag[i..].char_indices();
    match chars.next() {
        Some((_, c)) if is_name_start_char(c) => {}
        Some((_, c)) if is_name_char(c) => {
            return Err(TagError::new(SyntaxErrorKind::InvalidName, "invalid name", i))
        }
        _ => return Err(TagError::malformed("expected a name", i)),
    }
    let end = chars
        .find(|&(_, c)| !is_name_char(c))
        .map_or(tag.len(), |(off, _)| i + off);
    if !is_valid_qname(&tag[i..end]) {
        return Err(TagError::new(
            SyntaxErrorKind::InvalidName,
            format!("'{}' is not a valid qualified name", &tag[i..end]),
            i,
        ));
    }
    Ok(end)
}

fn skip_space(bytes: &[u8], mut i: usize) -> usize {
    while i < bytes.len() && is_space_byte(bytes[i]) {
        i += 1;
    }
    i
}

/// Parse a complete start tag (`<` through `>`)
fn parse_start_tag(
    tag: &str,
    attrs: &mut Vec<AttrRecord>,
    aux: &mut Vec<u8>,
    options: &TokenizerOptions,
) -> std::result::Result<TagInfo, TagError> {
    let bytes = tag.as_bytes();
    let name_end = scan_name(tag, 1)?;
    let mut i = name_end;
    loop {
        let before = i;
        i = skip_space(bytes, i);
        match bytes.get(i) {
            Some(b'>') => {
                return Ok(TagInfo {
                    name_len: name_end - 1,
                    self_closing: false,
                })
            }
            Some(b'/') => {
                if i + 2 == bytes.len() && bytes[i + 1] == b'>' {
                    return Ok(TagInfo {
                        name_len: name_end - 1,
                        self_closing: true,
                    });
                }
                return Err(TagError::malformed("unexpected '/' in start tag", i));
            }
            None => return Err(TagError::malformed("unterminated start tag", i)),
            Some(_) => {}
        }
        if i == before {
            return Err(TagError::malformed("white space required before attribute", i));
        }
        let name_start = i;
        let attr_name_end = scan_name(tag, i)?;
        i = skip_space(bytes, attr_name_end);
        if bytes.get(i) != Some(&b'=') {
            return Err(TagError::malformed("expected '=' after attribute name", i));
        }
        i = skip_space(bytes, i + 1);
        let quote = match bytes.get(i) {
            Some(&q) if q == b'"' || q == b'\'' => q,
            _ => return Err(TagError::malformed("attribute value must be quoted", i)),
        };
        let value_start = i + 1;
        let value_end = memchr::memchr(quote, &bytes[value_start..])
            .map(|off| value_start + off)
            .ok_or_else(|| TagError::malformed("unterminated attribute value", i))?;
        let raw = &bytes[value_start..value_end];
        if let Some(lt) = memchr::memchr(b'<', raw) {
            return Err(TagError::malformed(
                "'<' is not allowed in attribute values",
                value_start + lt,
            ));
        }
        let expanded = if options.resolve_entities && needs_expansion(raw, TextMode::Attribute) {
            let from = aux.len();
            expand(raw, TextMode::Attribute, &options.entities, aux, options.max_token_size)
                .map_err(|mut e| {
                    e.at += value_start;
                    TagError::from(e)
                })?;
            Some((from, aux.len()))
        } else {
            if !options.resolve_entities {
                check_references(raw).map_err(|mut e| {
                    e.at += value_start;
                    TagError::from(e)
                })?;
            }
            None
        };
        let name = &bytes[name_start..attr_name_end];
        if attrs.iter().any(|a| &bytes[a.name.0..a.name.1] == name) {
            return Err(TagError::new(
                SyntaxErrorKind::DuplicateAttribute,
                format!("duplicate attribute '{}'", &tag[name_start..attr_name_end]),
                name_start,
            ));
        }
        attrs.push(AttrRecord {
            name: (name_start, attr_name_end),
            value: (value_start, value_end),
            expanded,
        });
        i = value_end + 1;
    }
}

/// Parse the pseudo-attributes of an XML declaration
fn parse_declaration(body: &str) -> std::result::Result<XmlDeclaration, String> {
    let mut pairs: Vec<(&str, &str)> = Vec::new();
    let mut rest = body.trim();
    while !rest.is_empty() {
        let eq = rest
            .find('=')
            .ok_or_else(|| "malformed XML declaration".to_string())?;
        let name = rest[..eq].trim();
        let after = rest[eq + 1..].trim_start();
        let quote = after
            .chars()
            .next()
            .filter(|&c| c == '"' || c == '\'')
            .ok_or_else(|| "XML declaration values must be quoted".to_string())?;
        let close = after[1..]
            .find(quote)
            .ok_or_else(|| "unterminated XML declaration value".to_string())?;
        pairs.push((name, &after[1..1 + close]));
        rest = after[close + 2..].trim_start();
    }
    let mut declaration = XmlDeclaration::default();
    let mut expected = ["version", "encoding", "standalone"].iter();
    for (name, value) in pairs {
        if !expected.any(|e| *e == name) {
            return Err(format!("unexpected '{}' in XML declaration", name));
        }
        match name {
            "version" => {
                if !value.starts_with("1.") {
                    return Err(format!("unsupported XML version '{}'", value));
                }
                declaration.version = value.to_string();
            }
            "encoding" => declaration.encoding = Some(value.to_string()),
            _ => {
                declaration.standalone = Some(match value {
                    "yes" => true,
                    "no" => false,
                    _ => return Err(format!("invalid standalone value '{}'", value)),
                })
            }
        }
    }
    if declaration.version.is_empty() {
        return Err("XML declaration without version".to_string());
    }
    Ok(declaration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(xml: &str, options: TokenizerOptions) -> Result<Vec<TokenKind>> {
        let mut tokenizer = Tokenizer::new(xml.as_bytes(), options);
        let mut out = Vec::new();
        loop {
            let kind = tokenizer.next_token()?.kind();
            out.push(kind);
            if kind == TokenKind::Eof {
                return Ok(out);
            }
        }
    }

    fn syntax_kind(xml: &str, options: TokenizerOptions) -> SyntaxErrorKind {
        match kinds(xml, options) {
            Err(Error::Syntax(e)) => e.kind,
            other => panic!("expected a syntax error, got {:?}", other),
        }
    }

    #[test]
    fn test_simple_document() {
        use TokenKind::*;
        let got = kinds("<a x='1'><b/>text</a>", TokenizerOptions::default()).unwrap();
        assert_eq!(got, vec![StartElement, StartElement, EndElement, CharData, EndElement, Eof]);
    }

    #[test]
    fn test_attributes_and_names() {
        let mut tokenizer = Tokenizer::new(
            &b"<p:root xmlns:p='urn:p' a=\"1 &amp; 2\"/>"[..],
            TokenizerOptions::for_validation(),
        );
        match tokenizer.next_token().unwrap() {
            Token::StartElement(tag) => {
                assert_eq!(tag.name().prefix, "p");
                assert_eq!(tag.name().local, "root");
                assert!(tag.is_self_closing());
                let a = tag.get("a").unwrap();
                assert_eq!(a.raw_value, "1 &amp; 2");
                assert_eq!(a.value, "1 & 2");
                assert_eq!(tag.attribute_count(), 2);
            }
            other => panic!("unexpected {:?}", other),
        }
        match tokenizer.next_token().unwrap() {
            Token::EndElement(end) => assert_eq!(end.name.qualified, "p:root"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_entities_left_raw_by_default() {
        let mut tokenizer = Tokenizer::new(&b"<a>x &lt; y</a>"[..], TokenizerOptions::default());
        tokenizer.next_token().unwrap();
        match tokenizer.next_token().unwrap() {
            Token::CharData(text) => assert_eq!(text.value, "x &lt; y"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_coalesce() {
        let options = TokenizerOptions::for_validation();
        let mut tokenizer = Tokenizer::new(
            &b"<a>one <!-- c --><![CDATA[<two>]]> &amp; three</a>"[..],
            options,
        );
        tokenizer.next_token().unwrap();
        match tokenizer.next_token().unwrap() {
            Token::CharData(text) => assert_eq!(text.value, "one <two> & three"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tokenizer.next_token().unwrap().kind(), TokenKind::EndElement);
    }

    #[test]
    fn test_well_formedness_errors() {
        let o = TokenizerOptions::default;
        assert_eq!(syntax_kind("<a></b>", o()), SyntaxErrorKind::MismatchedEndTag);
        assert_eq!(syntax_kind("<a/><b/>", o()), SyntaxErrorKind::MultipleRoots);
        assert_eq!(syntax_kind("x<a/>", o()), SyntaxErrorKind::ContentOutsideRoot);
        assert_eq!(syntax_kind("<a x='1' x='2'/>", o()), SyntaxErrorKind::DuplicateAttribute);
        assert_eq!(syntax_kind("<a/><!DOCTYPE a>", o()), SyntaxErrorKind::DirectiveAfterRoot);
        assert_eq!(
            syntax_kind("<!DOCTYPE a><!DOCTYPE a><a/>", o()),
            SyntaxErrorKind::DuplicateDirective
        );
        assert_eq!(
            syntax_kind(" <?xml version='1.0'?><a/>", o()),
            SyntaxErrorKind::MisplacedXmlDeclaration
        );
        assert_eq!(syntax_kind("<a>\u{1}</a>", o()), SyntaxErrorKind::InvalidCharacter);
        assert_eq!(syntax_kind("<1a/>", o()), SyntaxErrorKind::InvalidName);
        assert_eq!(syntax_kind("<a><?pi x</a>", o()), SyntaxErrorKind::UnterminatedPi);
        assert_eq!(syntax_kind("<a><!-- x</a>", o()), SyntaxErrorKind::UnterminatedComment);
        assert_eq!(syntax_kind("<a><![CDATA[x</a>", o()), SyntaxErrorKind::UnterminatedCdata);
        assert_eq!(syntax_kind("<a>]]></a>", o()), SyntaxErrorKind::CdataEndInCharData);
        assert_eq!(syntax_kind("<a><!-- a -- b --></a>", o()), SyntaxErrorKind::DoubleHyphenInComment);
        assert_eq!(syntax_kind("<a>", o()), SyntaxErrorKind::UnexpectedEof);
        assert_eq!(syntax_kind("  ", o()), SyntaxErrorKind::MissingRoot);
        assert_eq!(syntax_kind("<a x='<'/>", o()), SyntaxErrorKind::MalformedMarkup);
        assert_eq!(syntax_kind("<![CDATA[x]]><a/>", o()), SyntaxErrorKind::ContentOutsideRoot);
    }

    #[test]
    fn test_limits() {
        let options = TokenizerOptions {
            max_depth: 2,
            ..TokenizerOptions::default()
        };
        assert_eq!(syntax_kind("<a><b><c/></b></a>", options), SyntaxErrorKind::DepthLimitExceeded);

        let options = TokenizerOptions {
            max_attrs: 1,
            ..TokenizerOptions::default()
        };
        assert_eq!(syntax_kind("<a x='1' y='2'/>", options), SyntaxErrorKind::AttributeLimitExceeded);

        let options = TokenizerOptions {
            max_token_size: 32,
            ..TokenizerOptions::default()
        };
        let xml = format!("<a>{}</a>", "x".repeat(100));
        assert_eq!(syntax_kind(&xml, options), SyntaxErrorKind::TokenTooLarge);
    }

    #[test]
    fn test_undefined_entity_when_resolving() {
        assert_eq!(
            syntax_kind("<a>&bogus;</a>", TokenizerOptions::for_validation()),
            SyntaxErrorKind::UndefinedEntity
        );
        assert!(kinds("<a>&bogus;</a>", TokenizerOptions::default()).is_ok());
    }

    #[test]
    fn test_error_position() {
        let err = match kinds("<root>\n  <a>\n  </b>\n</root>", TokenizerOptions::default()) {
            Err(Error::Syntax(e)) => e,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!(err.line, 3);
        assert_eq!(err.column, 3);
        assert_eq!(err.path, "/root/a");
        assert!(err.snippet.contains("</b>"));
    }

    #[test]
    fn test_xml_declaration_and_encoding() {
        let mut tokenizer = Tokenizer::new(
            &b"<?xml version=\"1.0\" encoding=\"UTF-8\" standalone=\"yes\"?><a/>"[..],
            TokenizerOptions::default(),
        );
        assert_eq!(tokenizer.next_token().unwrap().kind(), TokenKind::StartElement);
        let declaration = tokenizer.xml_declaration().unwrap();
        assert_eq!(declaration.version, "1.0");
        assert_eq!(declaration.standalone, Some(true));

        assert_eq!(
            syntax_kind("<?xml version='1.0' encoding='ISO-8859-1'?><a/>", TokenizerOptions::default()),
            SyntaxErrorKind::UnsupportedEncoding
        );
    }

    #[test]
    fn test_charset_reader_transcodes() {
        let mut bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><a>".to_vec();
        bytes.push(0xE9);
        bytes.extend_from_slice(b"</a>");
        let options = TokenizerOptions::default().with_encoding_rs_charsets();
        let mut tokenizer = Tokenizer::new(&bytes[..], options);
        tokenizer.next_token().unwrap();
        match tokenizer.next_token().unwrap() {
            Token::CharData(text) => assert_eq!(text.value, "é"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_utf16_bom() {
        let mut bytes = vec![0xFF, 0xFE];
        bytes.extend("<a>ü</a>".encode_utf16().flat_map(|u| u.to_le_bytes()));
        let mut tokenizer = Tokenizer::new(&bytes[..], TokenizerOptions::default());
        tokenizer.next_token().unwrap();
        match tokenizer.next_token().unwrap() {
            Token::CharData(text) => assert_eq!(text.value, "ü"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_compaction_keeps_offsets() {
        let body: String = (0..2000).map(|i| format!("<e{}>v</e{}>", i % 7, i % 7)).collect();
        let xml = format!("<root>{}</root>", body);
        let mut tokenizer = Tokenizer::new(xml.as_bytes(), TokenizerOptions::default());
        let mut last = 0;
        loop {
            let token = tokenizer.next_token().unwrap();
            if token.kind() == TokenKind::Eof {
                break;
            }
            let offset = tokenizer.position().offset;
            assert!(offset >= last);
            last = offset;
        }
        assert_eq!(tokenizer.input_offset(), xml.len() as u64);
    }

    #[test]
    fn test_reset_reuses_tokenizer() {
        let mut tokenizer = Tokenizer::new(&b"<a/>"[..], TokenizerOptions::default());
        while tokenizer.next_token().unwrap().kind() != TokenKind::Eof {}
        tokenizer.reset(&b"<b>t</b>"[..]);
        match tokenizer.next_token().unwrap() {
            Token::StartElement(tag) => assert_eq!(tag.name().local, "b"),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(tokenizer.depth(), 1);
        assert_eq!(tokenizer.stack_path(), "/b");
    }

    #[test]
    fn test_emit_flags() {
        use TokenKind::*;
        let options = TokenizerOptions {
            emit_comments: true,
            emit_pi: true,
            emit_directives: true,
            ..TokenizerOptions::default()
        };
        let got = kinds("<!DOCTYPE a [<!ENTITY x 'y'>]><a><!--c--><?p d?></a>", options).unwrap();
        assert_eq!(
            got,
            vec![Directive, StartElement, Comment, ProcessingInstruction, EndElement, Eof]
        );
    }
}
