//! Incremental Base64 and BinHex decoders.
//!
//! Both decoders take UTF-8 text a slice at a time and write bytes into a
//! caller buffer. They stop when either side runs out and keep partial
//! digits in their state, so a value can be decoded across many calls and
//! many text chunks.

use tools::chars::is_whitespace;
use tools::utf8::utf8_seq_len;

use crate::error::ErrorKind;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Decoded {
    /// Input bytes consumed.
    pub consumed: usize,
    /// Output bytes written.
    pub written: usize,
}

pub trait IncrementalDecoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> Result<Decoded, ErrorKind>;

    /// Check that the value ended on a digit boundary.
    fn finish(&self) -> Result<(), ErrorKind>;

    fn reset(&mut self);
}

fn invalid(input: &[u8], at: usize, target: &'static str) -> ErrorKind {
    let len = utf8_seq_len(input[at]).max(1).min(input.len() - at);
    ErrorKind::Conversion {
        value: String::from_utf8_lossy(&input[at..at + len]).into_owned(),
        target,
    }
}

#[derive(Clone, Debug, Default)]
pub struct Base64Decoder {
    bits: u32,
    bit_count: u32,
    padding: bool,
}

impl Base64Decoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn digit(byte: u8) -> Option<u32> {
        Some(match byte {
            b'A'..=b'Z' => byte - b'A',
            b'a'..=b'z' => byte - b'a' + 26,
            b'0'..=b'9' => byte - b'0' + 52,
            b'+' => 62,
            b'/' => 63,
            _ => return None,
        } as u32)
    }
}

impl IncrementalDecoder for Base64Decoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> Result<Decoded, ErrorKind> {
        let mut consumed = 0;
        let mut written = 0;
        while consumed < input.len() && written < out.len() {
            let byte = input[consumed];
            if is_whitespace(byte) {
                consumed += 1;
                continue;
            }
            if byte == b'=' {
                self.padding = true;
                consumed += 1;
                continue;
            }
            if self.padding {
                return Err(invalid(input, consumed, "base64"));
            }
            let Some(digit) = Self::digit(byte) else {
                return Err(invalid(input, consumed, "base64"));
            };
            consumed += 1;
            self.bits = (self.bits << 6) | digit;
            self.bit_count += 6;
            if self.bit_count >= 8 {
                self.bit_count -= 8;
                out[written] = (self.bits >> self.bit_count) as u8;
                written += 1;
                self.bits &= (1 << self.bit_count) - 1;
            }
        }
        // Trailing padding and whitespace need no output room.
        while consumed < input.len() && (input[consumed] == b'=' || is_whitespace(input[consumed])) {
            if input[consumed] == b'=' {
                self.padding = true;
            }
            consumed += 1;
        }
        Ok(Decoded { consumed, written })
    }

    /// A lone trailing digit or set leftover bits would be dropped.
    fn finish(&self) -> Result<(), ErrorKind> {
        if self.bit_count == 6 || self.bits != 0 {
            return Err(ErrorKind::Conversion {
                value: "incomplete base64 quantum".to_string(),
                target: "base64",
            });
        }
        Ok(())
    }

    fn reset(&mut self) {
        *self = Self::default();
    }
}

#[derive(Clone, Debug, Default)]
pub struct BinHexDecoder {
    high: Option<u8>,
}

impl BinHexDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    fn nibble(byte: u8) -> Option<u8> {
        match byte {
            b'0'..=b'9' => Some(byte - b'0'),
            b'a'..=b'f' => Some(byte - b'a' + 10),
            b'A'..=b'F' => Some(byte - b'A' + 10),
            _ => None,
        }
    }
}

impl IncrementalDecoder for BinHexDecoder {
    fn decode(&mut self, input: &[u8], out: &mut [u8]) -> Result<Decoded, ErrorKind> {
        let mut consumed = 0;
        let mut written = 0;
        while consumed < input.len() {
            let byte = input[consumed];
            if is_whitespace(byte) {
                consumed += 1;
                continue;
            }
            let Some(nibble) = Self::nibble(byte) else {
                return Err(invalid(input, consumed, "binhex"));
            };
            match self.high.take() {
                None => self.high = Some(nibble),
                Some(high) => {
                    if written == out.len() {
                        self.high = Some(high);
                        break;
                    }
                    out[written] = (high << 4) | nibble;
                    written += 1;
                }
            }
            consumed += 1;
        }
        Ok(Decoded { consumed, written })
    }

    fn finish(&self) -> Result<(), ErrorKind> {
        match self.high {
            None => Ok(()),
            Some(_) => Err(ErrorKind::Conversion {
                value: "odd number of hex digits".to_string(),
                target: "binhex",
            }),
        }
    }

    fn reset(&mut self) {
        self.high = None;
    }
}

/// Which decoder a binary read is using.
#[derive(Clone, Debug)]
pub(crate) enum ActiveDecoder {
    Base64(Base64Decoder),
    BinHex(BinHexDecoder),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DecoderKind {
    Base64,
    BinHex,
}

impl ActiveDecoder {
    pub(crate) fn new(kind: DecoderKind) -> Self {
        match kind {
            DecoderKind::Base64 => ActiveDecoder::Base64(Base64Decoder::new()),
            DecoderKind::BinHex => ActiveDecoder::BinHex(BinHexDecoder::new()),
        }
    }

    pub(crate) fn kind(&self) -> DecoderKind {
        match self {
            ActiveDecoder::Base64(_) => DecoderKind::Base64,
            ActiveDecoder::BinHex(_) => DecoderKind::BinHex,
        }
    }

    pub(crate) fn get_mut(&mut self) -> &mut dyn IncrementalDecoder {
        match self {
            ActiveDecoder::Base64(decoder) => decoder,
            ActiveDecoder::BinHex(decoder) => decoder,
        }
    }
}

#[cfg(test)]
mod tests;
