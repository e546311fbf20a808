//! Node-stream snapshots.
//!
//! A document is read to the end and every node becomes one line:
//!
//! ```text
//! 0 Element r
//!   @a="1"
//! 1 Text "x&y"
//! 1 Element e empty
//! 0 EndElement r
//! #error element 'r' is not closed
//! ```
//!
//! Values are completed before a node line is written, so a document split
//! into different chunks yields the same lines even where a long text node
//! is reported before its end.

use std::vec;

use xml::{
    DtdProcessing, EntityHandling, InputSource, NodeType, ReaderSettings, Step, StepResult,
    WhitespaceHandling, XmlError, XmlPushReader, XmlTokenizer,
};
use xml::{Conformance, ErrorKind, SyntaxError};

use crate::chunker::ChunkPlan;
use crate::corpus::{CorpusCase, EntityMode, WhitespaceMode};
use crate::escape_text;

/// How node values are collected.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ValueMode {
    /// `finish_value()` then `value()`.
    Whole,
    /// Repeated `read_value_chunk()` calls of at most this many characters.
    Chunks(usize),
}

pub fn settings_for(case: &CorpusCase) -> ReaderSettings {
    let mut settings = ReaderSettings::default();
    if case.dtd {
        settings.dtd_processing = DtdProcessing::Parse;
    }
    settings.entity_handling = match case.entities {
        EntityMode::Expand => EntityHandling::ExpandEntities,
        EntityMode::ExpandCharEntities => EntityHandling::ExpandCharEntities,
    };
    settings.whitespace_handling = match case.whitespace {
        WhitespaceMode::All => WhitespaceHandling::All,
        WhitespaceMode::Significant => WhitespaceHandling::Significant,
        WhitespaceMode::None => WhitespaceHandling::None,
    };
    if case.fragment {
        settings.conformance = Conformance::Fragment;
    }
    settings.ignore_comments = case.ignore_comments;
    if let Some(namespaces) = case.namespaces {
        settings.namespaces = namespaces;
    }
    settings
}

enum Session<'a> {
    Complete(XmlTokenizer),
    Pushed {
        reader: XmlPushReader,
        chunks: vec::IntoIter<&'a [u8]>,
    },
}

impl Session<'_> {
    fn tokenizer(&mut self) -> &mut XmlTokenizer {
        match self {
            Session::Complete(tokenizer) => tokenizer,
            Session::Pushed { reader, .. } => &mut **reader,
        }
    }

    /// Feed the next chunk, or finish the input once all are fed.
    fn supply(&mut self) -> bool {
        let Session::Pushed { reader, chunks } = self else {
            return false;
        };
        if let Some(chunk) = chunks.next() {
            reader.feed(chunk).expect("feed before finish");
            true
        } else if !reader.is_finished() {
            reader.finish();
            true
        } else {
            false
        }
    }

    fn drive<T>(
        &mut self,
        mut op: impl FnMut(&mut XmlTokenizer) -> StepResult<T>,
    ) -> Result<T, XmlError> {
        loop {
            match op(self.tokenizer())? {
                Step::Ready(value) => return Ok(value),
                Step::NeedMoreInput => {
                    assert!(self.supply(), "reader suspended after the input ended");
                }
            }
        }
    }
}

/// Snapshot of decoded text; encoding detection is skipped.
pub fn snapshot_str(input: &str, settings: ReaderSettings, mode: ValueMode) -> Vec<String> {
    let tokenizer = XmlTokenizer::new(InputSource::from(input), settings);
    snapshot(Session::Complete(tokenizer), mode)
}

/// Snapshot of a complete byte buffer.
pub fn snapshot_bytes(input: &[u8], settings: ReaderSettings, mode: ValueMode) -> Vec<String> {
    let tokenizer = XmlTokenizer::new(InputSource::from(input), settings);
    snapshot(Session::Complete(tokenizer), mode)
}

/// Snapshot of bytes fed to a push reader as `plan` splits them. Chunks are
/// fed only when the reader asks for more input.
pub fn snapshot_pushed(
    input: &[u8],
    plan: &ChunkPlan,
    settings: ReaderSettings,
    mode: ValueMode,
) -> Vec<String> {
    let session = Session::Pushed {
        reader: XmlPushReader::new(settings),
        chunks: plan.split(input).into_iter(),
    };
    snapshot(session, mode)
}

fn snapshot(mut session: Session<'_>, mode: ValueMode) -> Vec<String> {
    let mut lines = Vec::new();
    loop {
        match session.drive(XmlTokenizer::read) {
            Ok(true) => {}
            Ok(false) => break,
            Err(err) => {
                lines.push(error_line(&err));
                break;
            }
        }
        let value = match read_value(&mut session, mode) {
            Ok(value) => value,
            Err(err) => {
                lines.push(error_line(&err));
                break;
            }
        };
        let tokenizer = session.tokenizer();
        lines.push(node_line(tokenizer, value.as_deref()));
        if tokenizer.node_type() == NodeType::Element {
            attribute_lines(tokenizer, &mut lines);
        }
    }
    lines
}

fn read_value(session: &mut Session<'_>, mode: ValueMode) -> Result<Option<String>, XmlError> {
    if !session.tokenizer().node_type().has_value() {
        return Ok(None);
    }
    match mode {
        ValueMode::Whole => {
            session.drive(XmlTokenizer::finish_value)?;
            Ok(Some(session.tokenizer().value().to_string()))
        }
        ValueMode::Chunks(max_chars) => {
            let mut value = String::new();
            while session.drive(|tokenizer| tokenizer.read_value_chunk(&mut value, max_chars))? > 0
            {}
            Ok(Some(value))
        }
    }
}

pub fn node_line(tokenizer: &XmlTokenizer, value: Option<&str>) -> String {
    let mut line = format!("{} {}", tokenizer.depth(), tokenizer.node_type().as_str());
    if !tokenizer.name().is_empty() {
        line.push(' ');
        line.push_str(tokenizer.name());
    }
    if let Some(value) = value {
        line.push_str(&format!(" \"{}\"", escape_text(value)));
    }
    if tokenizer.is_empty_element() {
        line.push_str(" empty");
    }
    line
}

fn attribute_lines(tokenizer: &mut XmlTokenizer, lines: &mut Vec<String>) {
    for i in 0..tokenizer.attribute_count() {
        let moved = tokenizer
            .move_to_attribute_at(i)
            .expect("attribute navigation while idle");
        assert!(moved, "attribute {i} of {}", tokenizer.attribute_count());
        let mut line = format!(
            "  @{}=\"{}\"",
            tokenizer.name(),
            escape_text(tokenizer.value())
        );
        if !tokenizer.namespace_uri().is_empty() {
            line.push_str(&format!(" ns={}", tokenizer.namespace_uri()));
        }
        if tokenizer.is_default() {
            line.push_str(" default");
        }
        lines.push(line);
    }
    if tokenizer.attribute_count() > 0 {
        tokenizer
            .move_to_element()
            .expect("attribute navigation while idle");
    }
}

/// Error lines leave out positions so that they stay comparable across
/// chunkings.
pub fn error_line(err: &XmlError) -> String {
    match err.kind() {
        ErrorKind::Syntax(SyntaxError::TagMismatch {
            expected, found, ..
        }) => format!("#error end tag '{found}' does not match start tag '{expected}'"),
        kind => format!("#error {kind}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_lists_nodes_and_attributes() {
        let lines = snapshot_str(
            "<r a='1'>x&amp;y<e/></r>",
            ReaderSettings::default(),
            ValueMode::Whole,
        );
        assert_eq!(
            lines,
            vec![
                "0 Element r",
                "  @a=\"1\"",
                "1 Text \"x&y\"",
                "1 Element e empty",
                "0 EndElement r",
            ]
        );
    }

    #[test]
    fn errors_terminate_the_snapshot() {
        let lines = snapshot_str("<a><b></a>", ReaderSettings::default(), ValueMode::Whole);
        assert_eq!(
            lines.last().map(String::as_str),
            Some("#error end tag 'a' does not match start tag 'b'")
        );
    }

    #[test]
    fn pushed_single_bytes_match_whole_input() {
        let input = "<r>caf\u{e9} \u{20ac}<!--c--></r>";
        let whole = snapshot_str(input, ReaderSettings::default(), ValueMode::Whole);
        let pushed = snapshot_pushed(
            input.as_bytes(),
            &ChunkPlan::fixed(1),
            ReaderSettings::default(),
            ValueMode::Whole,
        );
        assert_eq!(whole, pushed);
    }
}
