//! Blocking driver.
//!
//! `XmlReader` owns an `XmlTokenizer` whose sources are `std::io::Read`
//! implementations (or complete strings and byte vectors). Whenever the
//! tokenizer reports `NeedMoreInput` the driver pulls one block from the
//! active source and retries the same operation, so callers see plain
//! `Result`s. Node accessors come from the tokenizer through `Deref`.

use std::io::{self, Read};
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::convert::FromXmlValue;
use crate::error::{ErrorKind, XmlError};
use crate::input::InputSource;
use crate::settings::ReaderSettings;
use crate::step::{Step, StepResult};
use crate::tokenizer::{ReaderParts, XmlTokenizer};

#[derive(Debug)]
pub struct XmlReader {
    tokenizer: XmlTokenizer,
}

impl XmlReader {
    pub fn new(source: impl Into<InputSource>, settings: ReaderSettings) -> Self {
        Self::with_parts(source, settings, ReaderParts::default())
    }

    pub fn with_parts(
        source: impl Into<InputSource>,
        settings: ReaderSettings,
        parts: ReaderParts,
    ) -> Self {
        Self {
            tokenizer: XmlTokenizer::with_parts(source.into(), settings, parts),
        }
    }

    /// Reader over decoded text; encoding detection is skipped.
    pub fn from_str(text: &str, settings: ReaderSettings) -> Self {
        Self::new(InputSource::Text(text.to_string()), settings)
    }

    /// Reader over raw bytes; the encoding is detected from the BOM or the
    /// XML declaration.
    pub fn from_bytes(bytes: impl Into<Vec<u8>>, settings: ReaderSettings) -> Self {
        Self::new(InputSource::Bytes(bytes.into()), settings)
    }

    pub fn from_reader<R: Read + 'static>(reader: R, settings: ReaderSettings) -> Self {
        Self::new(InputSource::from_reader(reader), settings)
    }

    pub fn tokenizer(&self) -> &XmlTokenizer {
        &self.tokenizer
    }

    pub fn into_tokenizer(self) -> XmlTokenizer {
        self.tokenizer
    }

    /// Run `op` until it completes, pumping the active source in between.
    fn drive<T>(
        &mut self,
        mut op: impl FnMut(&mut XmlTokenizer) -> StepResult<T>,
    ) -> Result<T, XmlError> {
        loop {
            match op(&mut self.tokenizer)? {
                Step::Ready(value) => return Ok(value),
                Step::NeedMoreInput => self.pump()?,
            }
        }
    }

    fn pump(&mut self) -> Result<(), XmlError> {
        if !self.tokenizer.active_wants_pump() {
            let stalled = io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "input source has no more data but did not end",
            );
            return Err(self.tokenizer.driver_failure(ErrorKind::Io(Arc::new(stalled))));
        }
        match self.tokenizer.pump_active() {
            Ok(_) => Ok(()),
            Err(err) => {
                log::debug!(target: "xml.input", "read from source failed: {err}");
                Err(self.tokenizer.driver_failure(ErrorKind::Io(Arc::new(err))))
            }
        }
    }

    /// Advance to the next node. `Ok(false)` at the end of the document or
    /// once the reader is closed or failed.
    pub fn read(&mut self) -> Result<bool, XmlError> {
        self.drive(XmlTokenizer::read)
    }

    /// Value of the current node, scanning the rest of a long text node
    /// first.
    pub fn value(&mut self) -> Result<&str, XmlError> {
        self.drive(XmlTokenizer::finish_value)?;
        Ok(self.tokenizer.value())
    }

    pub fn skip(&mut self) -> Result<(), XmlError> {
        self.drive(XmlTokenizer::skip)
    }

    pub fn read_content_as_string(&mut self) -> Result<String, XmlError> {
        self.drive(XmlTokenizer::read_content_as_string)
    }

    pub fn read_content_as<T: FromXmlValue>(&mut self) -> Result<T, XmlError> {
        self.drive(XmlTokenizer::read_content_as::<T>)
    }

    pub fn read_element_content_as_string(&mut self) -> Result<String, XmlError> {
        self.drive(XmlTokenizer::read_element_content_as_string)
    }

    pub fn read_element_content_as<T: FromXmlValue>(&mut self) -> Result<T, XmlError> {
        self.drive(XmlTokenizer::read_element_content_as::<T>)
    }

    pub fn read_string(&mut self) -> Result<String, XmlError> {
        self.drive(XmlTokenizer::read_string)
    }

    pub fn read_value_chunk(&mut self, out: &mut String, max_chars: usize) -> Result<usize, XmlError> {
        self.drive(|tokenizer| tokenizer.read_value_chunk(out, max_chars))
    }

    pub fn read_content_as_base64(&mut self, buf: &mut [u8]) -> Result<usize, XmlError> {
        self.drive(|tokenizer| tokenizer.read_content_as_base64(buf))
    }

    pub fn read_content_as_bin_hex(&mut self, buf: &mut [u8]) -> Result<usize, XmlError> {
        self.drive(|tokenizer| tokenizer.read_content_as_bin_hex(buf))
    }

    pub fn read_element_content_as_base64(&mut self, buf: &mut [u8]) -> Result<usize, XmlError> {
        self.drive(|tokenizer| tokenizer.read_element_content_as_base64(buf))
    }

    pub fn read_element_content_as_bin_hex(&mut self, buf: &mut [u8]) -> Result<usize, XmlError> {
        self.drive(|tokenizer| tokenizer.read_element_content_as_bin_hex(buf))
    }
}

impl Deref for XmlReader {
    type Target = XmlTokenizer;

    fn deref(&self) -> &XmlTokenizer {
        &self.tokenizer
    }
}

impl DerefMut for XmlReader {
    fn deref_mut(&mut self) -> &mut XmlTokenizer {
        &mut self.tokenizer
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::nodes::NodeType;

    /// Hands out at most `step` bytes per read.
    struct Trickle {
        data: Cursor<Vec<u8>>,
        step: usize,
    }

    impl Read for Trickle {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let len = buf.len().min(self.step);
            self.data.read(&mut buf[..len])
        }
    }

    struct Failing;

    impl Read for Failing {
        fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
            Err(io::Error::other("disk on fire"))
        }
    }

    #[test]
    fn blocking_reader_pumps_small_reads() {
        let source = Trickle {
            data: Cursor::new(b"<a x='1'>hello<b/></a>".to_vec()),
            step: 1,
        };
        let mut reader = XmlReader::from_reader(source, ReaderSettings::default());
        let mut seen = Vec::new();
        while reader.read().unwrap() {
            seen.push((reader.node_type(), reader.name().to_string()));
        }
        assert_eq!(
            seen,
            vec![
                (NodeType::Element, "a".to_string()),
                (NodeType::Text, String::new()),
                (NodeType::Element, "b".to_string()),
                (NodeType::EndElement, "a".to_string()),
            ]
        );
        assert!(reader.eof());
    }

    #[test]
    fn value_completes_long_text() {
        let text = "x".repeat(5000);
        let doc = format!("<a>{text}</a>");
        let settings = ReaderSettings {
            buffer_size: 64,
            ..ReaderSettings::default()
        };
        let source = Trickle {
            data: Cursor::new(doc.into_bytes()),
            step: 7,
        };
        let mut reader = XmlReader::from_reader(source, settings);
        assert!(reader.read().unwrap());
        assert!(reader.read().unwrap());
        assert_eq!(reader.node_type(), NodeType::Text);
        assert_eq!(reader.value().unwrap(), text);
    }

    #[test]
    fn io_failure_moves_reader_to_error() {
        let mut reader = XmlReader::from_reader(Failing, ReaderSettings::default());
        let err = reader.read().unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert_eq!(reader.read_state(), crate::tokenizer::ReadState::Error);
        assert!(!reader.read().unwrap());
    }

    #[test]
    fn typed_element_content() {
        let mut reader = XmlReader::from_str("<r><n> 42 </n><f>INF</f></r>", ReaderSettings::default());
        reader.read().unwrap();
        reader.read().unwrap();
        assert_eq!(reader.read_element_content_as::<i32>().unwrap(), 42);
        assert_eq!(reader.name(), "f");
        assert_eq!(reader.read_element_content_as::<f64>().unwrap(), f64::INFINITY);
        assert_eq!(reader.node_type(), NodeType::EndElement);
    }
}
