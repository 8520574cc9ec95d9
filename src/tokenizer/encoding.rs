//! Input transcoding
//!
//! The scanner only ever sees UTF-8. UTF-16 input (detected from its byte
//! order mark or from the `<?` pattern) and encodings resolved through the
//! charset reader are decoded on the fly with `encoding_rs`.

use encoding_rs::{Decoder, DecoderResult, Encoding, UTF_16BE, UTF_16LE};
use std::io::{self, Read};

const RAW_CHUNK: usize = 8 * 1024;
// Room for one raw chunk of UTF-16 decoded to UTF-8
const DECODED_CHUNK: usize = 3 * RAW_CHUNK + 16;

/// What the first bytes of a stream say about its encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Sniffed {
    /// UTF-8 with a byte order mark of the given length
    Utf8Bom,
    /// UTF-16 with a byte order mark
    Utf16Bom(&'static Encoding),
    /// UTF-16 without a byte order mark
    Utf16(&'static Encoding),
    /// Nothing conclusive; treat as UTF-8
    Plain,
}

/// Inspect up to four leading bytes. Returns `None` when more bytes are
/// needed to decide.
pub(crate) fn sniff(prefix: &[u8], eof: bool) -> Option<Sniffed> {
    match prefix {
        [0xEF, 0xBB, 0xBF, ..] => Some(Sniffed::Utf8Bom),
        [0xFF, 0xFE, ..] => Some(Sniffed::Utf16Bom(UTF_16LE)),
        [0xFE, 0xFF, ..] => Some(Sniffed::Utf16Bom(UTF_16BE)),
        [0x3C, 0x00, 0x3F, 0x00, ..] => Some(Sniffed::Utf16(UTF_16LE)),
        [0x00, 0x3C, 0x00, 0x3F, ..] => Some(Sniffed::Utf16(UTF_16BE)),
        _ if prefix.len() >= 4 || eof => Some(Sniffed::Plain),
        [0xEF] | [0xEF, 0xBB] | [0xFF] | [0xFE] | [0x3C] | [0x3C, 0x00] | [0x3C, 0x00, 0x3F]
        | [0x00] | [0x00, 0x3C] | [0x00, 0x3C, 0x00] | [] => None,
        _ => Some(Sniffed::Plain),
    }
}

/// How a declared encoding label is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DeclaredEncoding {
    /// Bytes are already what the scanner reads
    Utf8Compatible,
    /// Only valid when the stream was detected as UTF-16
    Utf16,
    /// Needs the charset reader
    Other,
}

pub(crate) fn classify_declared(label: &str) -> DeclaredEncoding {
    let label = label.trim().to_ascii_lowercase();
    match label.as_str() {
        "utf-8" | "utf8" | "us-ascii" | "ascii" => DeclaredEncoding::Utf8Compatible,
        "utf-16" | "utf-16le" | "utf-16be" | "utf16" => DeclaredEncoding::Utf16,
        _ => DeclaredEncoding::Other,
    }
}

/// Decodes an inner reader into UTF-8. Decoded bytes go through an
/// internal buffer, so a character never has to fit the caller's slice.
pub(crate) struct Transcoder<R> {
    inner: R,
    decoder: Decoder,
    raw: Vec<u8>,
    start: usize,
    end: usize,
    decoded: Vec<u8>,
    decoded_start: usize,
    decoded_end: usize,
    eof: bool,
    finished: bool,
}

impl<R: Read> Transcoder<R> {
    /// Wrap `inner`; `pending` holds raw bytes already pulled from it
    pub(crate) fn new(inner: R, encoding: &'static Encoding, pending: &[u8]) -> Self {
        let mut raw = vec![0u8; RAW_CHUNK.max(pending.len())];
        raw[..pending.len()].copy_from_slice(pending);
        Self {
            inner,
            decoder: encoding.new_decoder_without_bom_handling(),
            raw,
            start: 0,
            end: pending.len(),
            decoded: vec![0u8; DECODED_CHUNK],
            decoded_start: 0,
            decoded_end: 0,
            eof: false,
            finished: false,
        }
    }

    /// Decode the next raw chunk into the internal buffer
    fn decode_chunk(&mut self) -> io::Result<()> {
        if self.start == self.end && !self.eof {
            self.start = 0;
            self.raw.resize(RAW_CHUNK, 0);
            self.end = self.inner.read(&mut self.raw)?;
            if self.end == 0 {
                self.eof = true;
            }
        }
        let (result, read, written) = self.decoder.decode_to_utf8_without_replacement(
            &self.raw[self.start..self.end],
            &mut self.decoded,
            self.eof,
        );
        self.start += read;
        self.decoded_start = 0;
        self.decoded_end = written;
        match result {
            DecoderResult::Malformed(_, _) => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "input is malformed for its declared encoding",
            )),
            DecoderResult::OutputFull => Ok(()),
            DecoderResult::InputEmpty => {
                self.finished = self.eof;
                Ok(())
            }
        }
    }
}

impl<R: Read> Read for Transcoder<R> {
    /// Returns 0 only once the inner reader is exhausted and every decoded
    /// byte has been handed out
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        loop {
            if self.decoded_start < self.decoded_end {
                let n = out.len().min(self.decoded_end - self.decoded_start);
                out[..n].copy_from_slice(&self.decoded[self.decoded_start..self.decoded_start + n]);
                self.decoded_start += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            self.decode_chunk()?;
        }
    }
}

/// The byte source behind a tokenizer
pub(crate) enum Source<R> {
    Raw(R),
    Decoded(Transcoder<R>),
    Detached,
}

impl<R: Read> Source<R> {
    /// Switch to decoding with `encoding`, replaying `pending` raw bytes first
    pub(crate) fn transcode(&mut self, encoding: &'static Encoding, pending: &[u8]) {
        if let Source::Raw(inner) = std::mem::replace(self, Source::Detached) {
            *self = Source::Decoded(Transcoder::new(inner, encoding, pending));
        }
    }

    pub(crate) fn is_decoded(&self) -> bool {
        matches!(self, Source::Decoded(_))
    }
}

impl<R: Read> Read for Source<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        match self {
            Source::Raw(inner) => inner.read(out),
            Source::Decoded(transcoder) => transcoder.read(out),
            Source::Detached => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sniff() {
        assert_eq!(sniff(b"\xEF\xBB\xBF<a/>", false), Some(Sniffed::Utf8Bom));
        assert_eq!(sniff(b"\xFF\xFE<\x00", false), Some(Sniffed::Utf16Bom(UTF_16LE)));
        assert_eq!(sniff(b"<\x00?\x00", false), Some(Sniffed::Utf16(UTF_16LE)));
        assert_eq!(sniff(b"<a/>", false), Some(Sniffed::Plain));
        assert_eq!(sniff(b"<", false), None);
        assert_eq!(sniff(b"<", true), Some(Sniffed::Plain));
    }

    #[test]
    fn test_classify_declared() {
        assert_eq!(classify_declared("UTF-8"), DeclaredEncoding::Utf8Compatible);
        assert_eq!(classify_declared("utf-16"), DeclaredEncoding::Utf16);
        assert_eq!(classify_declared("ISO-8859-1"), DeclaredEncoding::Other);
    }

    #[test]
    fn test_transcode_utf16() {
        let bytes: Vec<u8> = "<a>é</a>"
            .encode_utf16()
            .flat_map(|u| u.to_le_bytes())
            .collect();
        let mut source = Source::Raw(&bytes[4..]);
        source.transcode(UTF_16LE, &bytes[..4]);
        let mut out = String::new();
        source.read_to_string(&mut out).unwrap();
        assert_eq!(out, "<a>é</a>");
    }

    #[test]
    fn test_transcode_into_tiny_buffers() {
        let text = format!("<r>{}</r>", "é€𝄞".repeat(3000));
        let bytes: Vec<u8> = text.encode_utf16().flat_map(|u| u.to_be_bytes()).collect();
        let mut source = Source::Raw(&bytes[4..]);
        source.transcode(UTF_16BE, &bytes[..4]);
        let mut out = Vec::new();
        let mut byte = [0u8; 1];
        loop {
            match source.read(&mut byte).unwrap() {
                0 => break,
                n => out.extend_from_slice(&byte[..n]),
            }
        }
        assert_eq!(String::from_utf8(out).unwrap(), text);
    }

    #[test]
    fn test_transcode_malformed() {
        let bytes = [0x3C, 0x00, 0x00, 0xD8];
        let mut source = Source::Raw(&bytes[..0]);
        source.transcode(UTF_16LE, &bytes);
        let mut out = Vec::new();
        assert!(source.read_to_end(&mut out).is_err());
    }
}
