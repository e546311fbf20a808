//! Input buffer management.
//!
//! One `ParsingState` exists per open input source: the document itself and
//! every entity currently being expanded. It owns the decoded character
//! buffer the tokenizer scans, plus whatever feeds it (raw bytes and a
//! decoder, or a text source).
//!
//! Invariants:
//! - `char_pos <= chars_used < chars.len()` and `chars[chars_used] == 0`
//!   (NUL sentinel), so scanners can look one byte ahead without bounds
//!   checks failing.
//! - `chars[..chars_used]` is valid UTF-8 and ends on a character boundary.
//! - In append mode the buffer is never shifted, so offsets recorded while
//!   sniffing the declaration stay valid until the encoding is settled.

use std::io::{self, Read};
use std::sync::Arc;

use encoding_rs::{Decoder, DecoderResult, Encoding};
use tools::utf8::{floor_char_boundary, utf8_seq_len};
use url::Url;

use crate::dtd::EntityDecl;
use crate::error::EncodingError;

pub mod encoding;
mod line;
mod source;

pub use encoding::Detected;
pub(crate) use line::LineTracker;
pub use source::InputSource;

/// Room for the widest UTF-8 scalar.
const MIN_FREE: usize = 4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Fill {
    /// This many bytes of decoded text were appended.
    Chars(usize),
    /// The source is permanently exhausted.
    Eof,
    /// The source has nothing buffered; pump or feed it and retry.
    NeedInput,
}

enum Feed {
    /// Blocking reader, pumped by the driver on demand.
    Reader(Box<dyn Read>),
    /// Bytes arrive through `push_bytes` (or were all supplied up front).
    Pushed,
    Text { text: String, offset: usize },
}

struct RawBytes {
    bytes: Vec<u8>,
    pos: usize,
    end_of_stream: bool,
    decoder: Option<Decoder>,
    detected: Option<Detected>,
    bom_len: usize,
    finished: bool,
    /// Malformed input found after some characters were already decoded.
    pending_error: Option<EncodingError>,
}

impl RawBytes {
    fn new(bytes: Vec<u8>, end_of_stream: bool) -> Self {
        Self {
            bytes,
            pos: 0,
            end_of_stream,
            decoder: None,
            detected: None,
            bom_len: 0,
            finished: false,
            pending_error: None,
        }
    }
}

pub(crate) struct ParsingState {
    pub(crate) chars: Vec<u8>,
    pub(crate) char_pos: usize,
    pub(crate) chars_used: usize,
    feed: Feed,
    raw: RawBytes,
    max_fill: usize,
    pub(crate) is_eof: bool,
    pub(crate) append_mode: bool,
    /// Line breaks were already normalized (internal entity replacement text).
    pub(crate) eol_normalized: bool,
    /// A text declaration may still appear at the start of this source.
    pub(crate) text_decl_pending: bool,
    pub(crate) base_uri: Option<Url>,
    pub(crate) line: LineTracker,
    pub(crate) entity: Option<Arc<EntityDecl>>,
    pub(crate) entity_id: u32,
    pub(crate) entity_resolved_manually: bool,
}

impl ParsingState {
    pub(crate) fn new(source: InputSource, buffer_size: usize, base_uri: Option<Url>) -> Self {
        let (feed, raw) = match source {
            InputSource::Reader(reader) => (Feed::Reader(reader), RawBytes::new(Vec::new(), false)),
            InputSource::Bytes(bytes) => (Feed::Pushed, RawBytes::new(bytes, true)),
            InputSource::Text(text) => (
                Feed::Text { text, offset: 0 },
                RawBytes::new(Vec::new(), true),
            ),
        };
        Self::with_feed(feed, raw, buffer_size, base_uri)
    }

    /// Document state whose bytes are pushed by the caller.
    pub(crate) fn pushed(buffer_size: usize, base_uri: Option<Url>) -> Self {
        Self::with_feed(
            Feed::Pushed,
            RawBytes::new(Vec::new(), false),
            buffer_size,
            base_uri,
        )
    }

    /// Internal entity replacement text.
    pub(crate) fn for_entity_text(text: String, buffer_size: usize, base_uri: Option<Url>) -> Self {
        let mut ps = Self::with_feed(
            Feed::Text { text, offset: 0 },
            RawBytes::new(Vec::new(), true),
            buffer_size,
            base_uri,
        );
        ps.eol_normalized = true;
        ps.append_mode = false;
        ps.text_decl_pending = false;
        ps
    }

    fn with_feed(feed: Feed, raw: RawBytes, buffer_size: usize, base_uri: Option<Url>) -> Self {
        let capacity = buffer_size.max(1);
        Self {
            chars: vec![0; capacity + 1],
            char_pos: 0,
            chars_used: 0,
            feed,
            raw,
            max_fill: capacity,
            is_eof: false,
            append_mode: true,
            eol_normalized: false,
            text_decl_pending: true,
            base_uri,
            line: LineTracker::new(),
            entity: None,
            entity_id: 0,
            entity_resolved_manually: false,
        }
    }

    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.chars.len() - 1
    }

    #[inline]
    pub(crate) fn free(&self) -> usize {
        self.capacity() - self.chars_used
    }

    /// Decoded, not yet consumed characters.
    #[cfg(test)]
    pub(crate) fn unread(&self) -> &[u8] {
        &self.chars[self.char_pos..self.chars_used]
    }

    pub(crate) fn is_text_source(&self) -> bool {
        matches!(self.feed, Feed::Text { .. })
    }

    pub(crate) fn detected(&self) -> Option<Detected> {
        self.raw.detected
    }

    pub(crate) fn encoding_name(&self) -> &'static str {
        match &self.raw.decoder {
            Some(decoder) => decoder.encoding().name(),
            None => "UTF-8",
        }
    }

    /// 1-based column of buffer offset `pos` on the current line.
    pub(crate) fn line_position(&self, pos: usize) -> usize {
        self.line.position(&self.chars, pos)
    }

    /// True when a rewrite-mode refill will move unread characters to the
    /// front; buffer-backed values must be materialized first.
    pub(crate) fn needs_shift(&self) -> bool {
        !self.append_mode && self.char_pos > 0 && self.free() <= self.capacity() / 2
    }

    pub(crate) fn shift_to_front(&mut self) {
        debug_assert!(!self.append_mode);
        let start = self.char_pos;
        self.line.discard_prefix(&self.chars, start);
        self.chars.copy_within(start..self.chars_used, 0);
        self.chars_used -= start;
        self.char_pos = 0;
        self.chars[self.chars_used] = 0;
    }

    fn grow(&mut self) {
        let new_capacity = (self.capacity() * 2).max(MIN_FREE * 2);
        self.chars.resize(new_capacity + 1, 0);
        log::debug!(target: "xml.input", "character buffer grown to {new_capacity} bytes");
    }

    /// Append decoded characters after `chars_used`.
    pub(crate) fn fill(&mut self) -> Result<Fill, EncodingError> {
        if self.is_eof {
            return Ok(Fill::Eof);
        }
        while self.free() < MIN_FREE || self.free() <= self.capacity() / 2 {
            self.grow();
        }
        let filled = if self.is_text_source() {
            self.fill_from_text()
        } else {
            self.fill_from_bytes()?
        };
        self.chars[self.chars_used] = 0;
        if filled == Fill::Eof {
            self.is_eof = true;
        }
        Ok(filled)
    }

    fn fill_from_text(&mut self) -> Fill {
        let Feed::Text { text, offset } = &mut self.feed else {
            return Fill::Eof;
        };
        if *offset >= text.len() {
            return Fill::Eof;
        }
        let room = (self.chars.len() - 1 - self.chars_used).min(self.max_fill);
        let mut end = floor_char_boundary(text, *offset + room);
        if end == *offset {
            end = *offset + utf8_seq_len(text.as_bytes()[*offset]).max(1);
        }
        let count = end - *offset;
        self.chars[self.chars_used..self.chars_used + count]
            .copy_from_slice(&text.as_bytes()[*offset..end]);
        *offset = end;
        self.chars_used += count;
        Fill::Chars(count)
    }

    fn fill_from_bytes(&mut self) -> Result<Fill, EncodingError> {
        if let Some(err) = self.raw.pending_error.take() {
            return Err(err);
        }
        if self.raw.finished {
            return Ok(Fill::Eof);
        }
        if self.raw.decoder.is_none() {
            let available = &self.raw.bytes[self.raw.pos..];
            let Some(sniffed) = encoding::sniff(available, self.raw.end_of_stream)? else {
                return Ok(Fill::NeedInput);
            };
            self.raw.pos += sniffed.bom_len;
            self.raw.bom_len = sniffed.bom_len;
            self.raw.detected = Some(sniffed.detected);
            self.raw.decoder = Some(sniffed.detected.encoding().new_decoder_without_bom_handling());
            log::debug!(
                target: "xml.input",
                "detected {:?} (bom {} bytes)",
                sniffed.detected,
                sniffed.bom_len
            );
        }
        let Some(decoder) = self.raw.decoder.as_mut() else {
            return Ok(Fill::NeedInput);
        };

        let free = self.chars.len() - 1 - self.chars_used;
        let mut room = free.min(self.max_fill);
        loop {
            let dst = &mut self.chars[self.chars_used..self.chars_used + room];
            let src = &self.raw.bytes[self.raw.pos..];
            let last = self.raw.end_of_stream;
            let (result, read, written) =
                decoder.decode_to_utf8_without_replacement(src, dst, last);
            self.raw.pos += read;
            self.chars_used += written;
            match result {
                DecoderResult::Malformed(_, _) => {
                    let err = EncodingError::Malformed {
                        encoding: decoder.encoding().name(),
                    };
                    if written == 0 {
                        return Err(err);
                    }
                    self.raw.pending_error = Some(err);
                }
                DecoderResult::OutputFull if written == 0 && room < free => {
                    room = free;
                    continue;
                }
                DecoderResult::OutputFull => {}
                DecoderResult::InputEmpty => {
                    if last {
                        self.raw.finished = true;
                    }
                }
            }
            return Ok(if written > 0 {
                Fill::Chars(written)
            } else if self.raw.finished {
                Fill::Eof
            } else {
                Fill::NeedInput
            });
        }
    }

    /// Whether a blocking pump could make progress on this source.
    pub(crate) fn wants_pump(&self) -> bool {
        matches!(self.feed, Feed::Reader(_)) && !self.raw.end_of_stream
    }

    /// Pull one block from a blocking reader. Returns false when there is
    /// nothing to pump.
    pub(crate) fn pump(&mut self, block: usize) -> io::Result<bool> {
        let Feed::Reader(reader) = &mut self.feed else {
            return Ok(false);
        };
        if self.raw.end_of_stream {
            return Ok(false);
        }
        if !self.append_mode && self.raw.pos > 0 {
            self.raw.bytes.drain(..self.raw.pos);
            self.raw.pos = 0;
        }
        let start = self.raw.bytes.len();
        self.raw.bytes.resize(start + block.max(1), 0);
        let read = loop {
            match reader.read(&mut self.raw.bytes[start..]) {
                Ok(n) => break n,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    self.raw.bytes.truncate(start);
                    return Err(err);
                }
            }
        };
        self.raw.bytes.truncate(start + read);
        if read == 0 {
            self.raw.end_of_stream = true;
        }
        Ok(true)
    }

    /// Append caller-supplied bytes to a push-fed source.
    pub(crate) fn push_bytes(&mut self, data: &[u8]) {
        if !self.append_mode && self.raw.pos > 0 {
            self.raw.bytes.drain(..self.raw.pos);
            self.raw.pos = 0;
        }
        self.raw.bytes.extend_from_slice(data);
    }

    pub(crate) fn mark_end_of_stream(&mut self) {
        self.raw.end_of_stream = true;
    }

    /// Re-decode everything after `char_pos` with `encoding`.
    ///
    /// Only valid in append mode on a BOM-less UTF-8 stream, where every
    /// character before `char_pos` is ASCII and therefore one byte.
    pub(crate) fn switch_encoding(&mut self, encoding: &'static Encoding) {
        debug_assert!(self.append_mode);
        log::debug!(
            target: "xml.input",
            "switching encoding {} -> {} at offset {}",
            self.encoding_name(),
            encoding.name(),
            self.char_pos
        );
        self.raw.pos = self.raw.bom_len + self.char_pos;
        self.chars_used = self.char_pos;
        self.chars[self.chars_used] = 0;
        self.raw.decoder = Some(encoding.new_decoder_without_bom_handling());
        self.raw.finished = false;
        self.raw.pending_error = None;
        self.is_eof = false;
    }

    /// Release the underlying source.
    pub(crate) fn close(&mut self) {
        self.feed = Feed::Pushed;
        self.raw = RawBytes::new(Vec::new(), true);
        self.raw.finished = true;
        self.chars_used = self.char_pos;
        self.chars[self.chars_used] = 0;
        self.is_eof = true;
    }
}

/// Decode a complete source into a string, honouring BOMs and the
/// declared encoding of a leading XML/text declaration.
pub(crate) fn decode_to_string(source: InputSource) -> Result<String, io::Error> {
    let bytes = match source {
        InputSource::Text(text) => return Ok(text),
        InputSource::Bytes(bytes) => bytes,
        InputSource::Reader(mut reader) => {
            let mut bytes = Vec::new();
            reader.read_to_end(&mut bytes)?;
            bytes
        }
    };
    let invalid = |err: EncodingError| io::Error::new(io::ErrorKind::InvalidData, err.to_string());
    let sniffed = encoding::sniff(&bytes, true)
        .map_err(invalid)?
        .unwrap_or(encoding::Sniffed {
            detected: Detected::Utf8Default,
            bom_len: 0,
        });
    let body = &bytes[sniffed.bom_len..];
    let mut enc = sniffed.detected.encoding();
    if sniffed.detected == Detected::Utf8Default
        && let Some(label) = sniff_declared_label(body)
        && let Some(switch) = encoding::declared_switch(sniffed.detected, &label).map_err(invalid)?
    {
        enc = switch;
    }
    let mut decoder = enc.new_decoder_without_bom_handling();
    let mut out = String::with_capacity(
        decoder
            .max_utf8_buffer_length_without_replacement(body.len())
            .unwrap_or(body.len()),
    );
    let (result, _) = decoder.decode_to_string_without_replacement(body, &mut out, true);
    match result {
        DecoderResult::InputEmpty => Ok(out),
        _ => Err(invalid(EncodingError::Malformed {
            encoding: enc.name(),
        })),
    }
}

/// Pull the `encoding` pseudo-attribute out of an ASCII declaration prefix.
fn sniff_declared_label(body: &[u8]) -> Option<String> {
    if !body.starts_with(b"<?xml") {
        return None;
    }
    let end = memchr::memmem::find(body, b"?>")?;
    let decl = std::str::from_utf8(&body[..end]).ok()?;
    let at = decl.find("encoding")?;
    let rest = decl[at + "encoding".len()..].trim_start().strip_prefix('=')?.trim_start();
    let quote = rest.chars().next()?;
    if quote != '"' && quote != '\'' {
        return None;
    }
    let value = &rest[1..];
    let close = value.find(quote)?;
    Some(value[..close].to_string())
}
