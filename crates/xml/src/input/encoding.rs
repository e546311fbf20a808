//! Byte-order sniffing and encoding-declaration checks.

use encoding_rs::{Encoding, UTF_8, UTF_16BE, UTF_16LE};

use crate::error::EncodingError;

/// What the first bytes of a stream said about its encoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Detected {
    /// No BOM and no UTF-16 pattern; UTF-8 until a declaration says otherwise.
    Utf8Default,
    Utf8Bom,
    Utf16Le { bom: bool },
    Utf16Be { bom: bool },
}

impl Detected {
    pub fn encoding(self) -> &'static Encoding {
        match self {
            Detected::Utf8Default | Detected::Utf8Bom => UTF_8,
            Detected::Utf16Le { .. } => UTF_16LE,
            Detected::Utf16Be { .. } => UTF_16BE,
        }
    }

    pub fn name(self) -> &'static str {
        self.encoding().name()
    }

    fn is_utf16(self) -> bool {
        matches!(self, Detected::Utf16Le { .. } | Detected::Utf16Be { .. })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Sniffed {
    pub detected: Detected,
    pub bom_len: usize,
}

/// Inspect the first bytes of a stream.
///
/// Returns `Ok(None)` when fewer than four bytes are available and more may
/// still arrive.
pub fn sniff(bytes: &[u8], at_eof: bool) -> Result<Option<Sniffed>, EncodingError> {
    if bytes.len() < 4 && !at_eof {
        return Ok(None);
    }
    let mut head = [0xAAu8; 4];
    let n = bytes.len().min(4);
    head[..n].copy_from_slice(&bytes[..n]);

    let sniffed = match head {
        [0x00, 0x00, 0xFE, 0xFF]
        | [0xFF, 0xFE, 0x00, 0x00]
        | [0x00, 0x00, 0x00, 0x3C]
        | [0x3C, 0x00, 0x00, 0x00]
        | [0x00, 0x00, 0x3C, 0x00]
        | [0x00, 0x3C, 0x00, 0x00] => {
            return Err(EncodingError::Unsupported {
                label: "UCS-4".to_string(),
            });
        }
        [0x4C, 0x6F, 0xA7, 0x94] => {
            return Err(EncodingError::Unsupported {
                label: "EBCDIC".to_string(),
            });
        }
        [0xEF, 0xBB, 0xBF, _] if n >= 3 => Sniffed {
            detected: Detected::Utf8Bom,
            bom_len: 3,
        },
        [0xFE, 0xFF, _, _] if n >= 2 => Sniffed {
            detected: Detected::Utf16Be { bom: true },
            bom_len: 2,
        },
        [0xFF, 0xFE, _, _] if n >= 2 => Sniffed {
            detected: Detected::Utf16Le { bom: true },
            bom_len: 2,
        },
        [0x00, 0x3C, _, _] if n >= 2 => Sniffed {
            detected: Detected::Utf16Be { bom: false },
            bom_len: 0,
        },
        [0x3C, 0x00, _, _] if n >= 2 => Sniffed {
            detected: Detected::Utf16Le { bom: false },
            bom_len: 0,
        },
        _ => Sniffed {
            detected: Detected::Utf8Default,
            bom_len: 0,
        },
    };
    Ok(Some(sniffed))
}

/// Decide what to do with an `encoding="..."` declaration.
///
/// Returns the encoding to switch to, or `None` when the stream is already
/// decoded correctly.
pub fn declared_switch(
    detected: Detected,
    label: &str,
) -> Result<Option<&'static Encoding>, EncodingError> {
    let declared = lookup_label(label)?;
    let declared_utf16 = declared == UTF_16LE || declared == UTF_16BE;

    if detected.is_utf16() {
        return if declared_utf16 {
            Ok(None)
        } else {
            Err(EncodingError::IncompatibleDeclaration {
                detected: detected.name(),
                declared: label.to_string(),
            })
        };
    }
    if declared_utf16 {
        return Err(EncodingError::IncompatibleDeclaration {
            detected: detected.name(),
            declared: label.to_string(),
        });
    }
    if declared == UTF_8 {
        return Ok(None);
    }
    if detected == Detected::Utf8Bom || !declared.is_ascii_compatible() {
        return Err(EncodingError::IncompatibleDeclaration {
            detected: detected.name(),
            declared: label.to_string(),
        });
    }
    Ok(Some(declared))
}

/// Resolve an encoding label, accepting the UCS-2 alias for UTF-16.
pub fn lookup_label(label: &str) -> Result<&'static Encoding, EncodingError> {
    let trimmed = label.trim();
    if trimmed.eq_ignore_ascii_case("ucs-2") || trimmed.eq_ignore_ascii_case("iso-10646-ucs-2") {
        return Ok(UTF_16LE);
    }
    Encoding::for_label(trimmed.as_bytes()).ok_or_else(|| EncodingError::Unsupported {
        label: label.to_string(),
    })
}

/// `EncName ::= [A-Za-z] ([A-Za-z0-9._] | '-')*`
pub fn is_valid_encoding_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            bytes.all(|b| b.is_ascii_alphanumeric() || matches!(b, b'.' | b'_' | b'-'))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sniffs_boms_and_patterns() {
        let s = sniff(&[0xEF, 0xBB, 0xBF, b'<'], false).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf8Bom);
        assert_eq!(s.bom_len, 3);

        let s = sniff(&[0xFF, 0xFE, b'<', 0], false).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf16Le { bom: true });

        let s = sniff(&[0x00, 0x3C, 0x00, 0x3F], false).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf16Be { bom: false });
        assert_eq!(s.bom_len, 0);

        let s = sniff(b"<?xm", false).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf8Default);
    }

    #[test]
    fn waits_for_four_bytes_unless_eof() {
        assert_eq!(sniff(b"<a", false).unwrap(), None);
        let s = sniff(b"<a", true).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf8Default);
        let s = sniff(b"", true).unwrap().unwrap();
        assert_eq!(s.detected, Detected::Utf8Default);
    }

    #[test]
    fn ucs4_is_unsupported() {
        assert!(matches!(
            sniff(&[0x00, 0x00, 0x00, 0x3C], false),
            Err(EncodingError::Unsupported { .. })
        ));
    }

    #[test]
    fn declaration_rules() {
        assert_eq!(declared_switch(Detected::Utf8Default, "UTF-8").unwrap(), None);
        let switched = declared_switch(Detected::Utf8Default, "ISO-8859-1").unwrap();
        assert!(switched.is_some());
        assert!(matches!(
            declared_switch(Detected::Utf8Default, "UTF-16"),
            Err(EncodingError::IncompatibleDeclaration { .. })
        ));
        assert_eq!(
            declared_switch(Detected::Utf16Le { bom: true }, "utf-16").unwrap(),
            None
        );
        assert!(matches!(
            declared_switch(Detected::Utf16Be { bom: true }, "utf-8"),
            Err(EncodingError::IncompatibleDeclaration { .. })
        ));
        assert!(matches!(
            declared_switch(Detected::Utf8Default, "no-such-encoding"),
            Err(EncodingError::Unsupported { .. })
        ));
    }

    #[test]
    fn encoding_name_syntax() {
        assert!(is_valid_encoding_name("UTF-8"));
        assert!(is_valid_encoding_name("ISO-8859-1"));
        assert!(!is_valid_encoding_name("8bit"));
        assert!(!is_valid_encoding_name(""));
    }
}
