use std::fmt;
use std::io::Read;

/// Where a document or external entity's characters come from.
pub enum InputSource {
    /// A blocking byte stream; encoding is sniffed and declared.
    Reader(Box<dyn Read>),
    /// A complete byte buffer; encoding is sniffed and declared.
    Bytes(Vec<u8>),
    /// Already-decoded text; any encoding declaration is only checked for syntax.
    Text(String),
}

impl InputSource {
    pub fn from_reader<R: Read + 'static>(reader: R) -> Self {
        InputSource::Reader(Box::new(reader))
    }
}

impl fmt::Debug for InputSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputSource::Reader(_) => f.write_str("InputSource::Reader(..)"),
            InputSource::Bytes(bytes) => write!(f, "InputSource::Bytes({} bytes)", bytes.len()),
            InputSource::Text(text) => write!(f, "InputSource::Text({} bytes)", text.len()),
        }
    }
}

impl From<String> for InputSource {
    fn from(text: String) -> Self {
        InputSource::Text(text)
    }
}

impl From<&str> for InputSource {
    fn from(text: &str) -> Self {
        InputSource::Text(text.to_owned())
    }
}

impl From<Vec<u8>> for InputSource {
    fn from(bytes: Vec<u8>) -> Self {
        InputSource::Bytes(bytes)
    }
}

impl From<&[u8]> for InputSource {
    fn from(bytes: &[u8]) -> Self {
        InputSource::Bytes(bytes.to_vec())
    }
}
