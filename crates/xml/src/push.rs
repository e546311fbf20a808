//! Suspend/resume driver.
//!
//! The caller owns the input: bytes arrive through `feed()` in chunks of any
//! size, and `finish()` marks the end of the document. Reader operations
//! come from the tokenizer through `Deref` and return `Step` directly; a
//! `Step::NeedMoreInput` is answered with another `feed()` (or `finish()`)
//! and a repeat of the same call.
//!
//! Text can be reported before all of it has been scanned. While
//! `has_partial_value()` holds, `value()` is the part seen so far and
//! `finish_value()` completes it, suspending like any other operation.

use std::ops::{Deref, DerefMut};

use crate::error::{UsageError, XmlError};
use crate::settings::ReaderSettings;
use crate::tokenizer::{ReaderParts, XmlTokenizer};

#[derive(Debug)]
pub struct XmlPushReader {
    tokenizer: XmlTokenizer,
    finished: bool,
}

impl XmlPushReader {
    pub fn new(settings: ReaderSettings) -> Self {
        Self::with_parts(settings, ReaderParts::default())
    }

    pub fn with_parts(settings: ReaderSettings, parts: ReaderParts) -> Self {
        Self {
            tokenizer: XmlTokenizer::pushed(settings, parts),
            finished: false,
        }
    }

    /// Append document bytes.
    pub fn feed(&mut self, data: &[u8]) -> Result<(), XmlError> {
        if self.finished {
            return Err(XmlError::usage(UsageError::FeedAfterFinish));
        }
        if !data.is_empty() {
            self.tokenizer.document_state().push_bytes(data);
        }
        Ok(())
    }

    /// No more bytes will be fed. Idempotent.
    pub fn finish(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.tokenizer.document_state().mark_end_of_stream();
        log::debug!(target: "xml.input", "push input finished");
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn tokenizer(&self) -> &XmlTokenizer {
        &self.tokenizer
    }

    pub fn into_tokenizer(self) -> XmlTokenizer {
        self.tokenizer
    }
}

impl Deref for XmlPushReader {
    type Target = XmlTokenizer;

    fn deref(&self) -> &XmlTokenizer {
        &self.tokenizer
    }
}

impl DerefMut for XmlPushReader {
    fn deref_mut(&mut self) -> &mut XmlTokenizer {
        &mut self.tokenizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::nodes::NodeType;
    use crate::step::Step;

    #[test]
    fn read_suspends_until_fed() {
        let mut reader = XmlPushReader::new(ReaderSettings::default());
        assert_eq!(reader.read().unwrap(), Step::NeedMoreInput);
        reader.feed(b"<doc a='1").unwrap();
        assert_eq!(reader.read().unwrap(), Step::NeedMoreInput);
        reader.feed(b"'>te").unwrap();
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.node_type(), NodeType::Element);
        assert_eq!(reader.get_attribute("a"), Some("1"));
        reader.feed(b"xt</doc>").unwrap();
        reader.finish();
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.node_type(), NodeType::Text);
        assert!(reader.has_partial_value());
        assert_eq!(reader.value(), "te");
        assert_eq!(reader.finish_value().unwrap(), Step::Ready(()));
        assert!(!reader.has_partial_value());
        assert_eq!(reader.value(), "text");
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.node_type(), NodeType::EndElement);
        assert_eq!(reader.read().unwrap(), Step::Ready(false));
        assert!(reader.eof());
    }

    #[test]
    fn finishing_a_value_waits_for_input() {
        let mut reader = XmlPushReader::new(ReaderSettings::default());
        reader.feed(b"<doc>ab").unwrap();
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert!(reader.has_partial_value());
        assert_eq!(reader.value(), "ab");
        assert_eq!(reader.finish_value().unwrap(), Step::NeedMoreInput);
        reader.feed(b"cd</doc>").unwrap();
        assert_eq!(reader.finish_value().unwrap(), Step::Ready(()));
        assert_eq!(reader.value(), "abcd");
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.node_type(), NodeType::EndElement);
    }

    #[test]
    fn feed_after_finish_is_rejected() {
        let mut reader = XmlPushReader::new(ReaderSettings::default());
        reader.feed(b"<a/>").unwrap();
        reader.finish();
        let err = reader.feed(b"<b/>").unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Usage(UsageError::FeedAfterFinish)
        );
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
    }

    #[test]
    fn other_operation_while_suspended_is_rejected() {
        let mut reader = XmlPushReader::new(ReaderSettings::default());
        reader.feed(b"<root><a>").unwrap();
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.read().unwrap(), Step::NeedMoreInput);
        let err = reader.skip().unwrap_err();
        assert_eq!(
            err.kind(),
            &ErrorKind::Usage(UsageError::OperationPending { pending: "read" })
        );
        reader.feed(b"</a></root>").unwrap();
        reader.finish();
        assert_eq!(reader.read().unwrap(), Step::Ready(true));
        assert_eq!(reader.node_type(), NodeType::EndElement);
    }
}
