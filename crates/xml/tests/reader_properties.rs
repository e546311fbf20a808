use std::io::{self, Cursor, Read};

use xml::{
    EncodingError, ErrorKind, NodeType, QualifiedName, ReadState, ReaderSettings, Step,
    SyntaxError, UsageError, XmlError, XmlPushReader, XmlReader,
};

struct Trickle {
    data: Cursor<Vec<u8>>,
    step: usize,
}

impl Trickle {
    fn new(data: impl Into<Vec<u8>>, step: usize) -> Self {
        Self {
            data: Cursor::new(data.into()),
            step,
        }
    }
}

impl Read for Trickle {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let len = buf.len().min(self.step);
        self.data.read(&mut buf[..len])
    }
}

fn small_buffer(buffer_size: usize) -> ReaderSettings {
    ReaderSettings {
        buffer_size,
        ..ReaderSettings::default()
    }
}

fn first_error(reader: &mut XmlReader) -> XmlError {
    loop {
        match reader.read() {
            Ok(true) => {
                if let Err(err) = reader.value() {
                    return err;
                }
            }
            Ok(false) => panic!("document read without error"),
            Err(err) => return err,
        }
    }
}

#[test]
fn line_info_survives_small_reads() {
    let doc = "<a>\n  <b c='1'/>\n  text\n</a>";
    let mut reader = XmlReader::from_reader(Trickle::new(doc, 1), small_buffer(4));
    let mut seen = Vec::new();
    while reader.read().unwrap() {
        seen.push((
            reader.node_type(),
            reader.line_number(),
            reader.line_position(),
        ));
        if reader.name() == "b" {
            assert!(reader.move_to_attribute("c").unwrap());
            assert_eq!((reader.line_number(), reader.line_position()), (2, 6));
            reader.move_to_element().unwrap();
        }
    }
    assert_eq!(
        seen,
        vec![
            (NodeType::Element, 1, 2),
            (NodeType::Whitespace, 1, 4),
            (NodeType::Element, 2, 4),
            (NodeType::Text, 2, 13),
            (NodeType::EndElement, 4, 3),
        ]
    );
}

fn element_positions(doc: &str, settings: ReaderSettings) -> Vec<(String, usize, usize)> {
    let mut reader = XmlReader::from_str(doc, settings);
    let mut seen = Vec::new();
    while reader.read().unwrap() {
        if reader.node_type() == NodeType::Element {
            seen.push((
                reader.name().to_string(),
                reader.line_number(),
                reader.line_position(),
            ));
        }
    }
    seen
}

#[test]
fn columns_after_rewritten_text_are_exact() {
    for (doc, expected) in [
        ("<r>&lt;\u{1F600}<b/></r>", (1, 10)),
        ("<r>&lt;\u{e9}<b/></r>", (1, 10)),
        ("<r>&#233;&#x1F600;x<b/></r>", (1, 21)),
        ("<r>a\r\nb&lt;c<d/></r>", (2, 8)),
    ] {
        let whole = element_positions(doc, ReaderSettings::default());
        let (_, line, position) = &whole[1];
        assert_eq!((*line, *position), expected, "{doc:?}");
        assert_eq!(element_positions(doc, small_buffer(1)), whole, "{doc:?}");
    }
}

#[test]
fn error_columns_after_rewritten_text_match_small_buffers() {
    let doc = "<r>&lt;\u{e9}&amp;</x>";
    let whole = first_error(&mut XmlReader::from_str(doc, ReaderSettings::default()));
    let small = first_error(&mut XmlReader::from_str(doc, small_buffer(1)));
    assert!(matches!(
        whole.kind(),
        ErrorKind::Syntax(SyntaxError::TagMismatch { .. })
    ));
    assert_eq!((whole.line(), whole.position()), (1, 16));
    assert_eq!((small.line(), small.position()), (1, 16));
}

#[test]
fn utf16_bom_is_detected() {
    let mut bytes = vec![0xFF, 0xFE];
    for unit in "<r>\u{e9}t\u{e9}</r>".encode_utf16() {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    let mut reader = XmlReader::from_bytes(bytes, ReaderSettings::default());
    assert!(reader.read().unwrap());
    assert_eq!(reader.encoding(), "UTF-16LE");
    assert!(reader.read().unwrap());
    assert_eq!(reader.value().unwrap(), "\u{e9}t\u{e9}");
}

#[test]
fn declared_single_byte_encoding_is_honoured() {
    let mut bytes = b"<?xml version='1.0' encoding='ISO-8859-1'?><r>caf".to_vec();
    bytes.push(0xE9);
    bytes.extend_from_slice(b"</r>");
    let mut reader = XmlReader::from_reader(Trickle::new(bytes, 3), ReaderSettings::default());
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::XmlDeclaration);
    assert_eq!(reader.get_attribute("encoding"), Some("ISO-8859-1"));
    assert!(reader.read().unwrap());
    assert!(reader.read().unwrap());
    assert_eq!(reader.value().unwrap(), "caf\u{e9}");
}

#[test]
fn malformed_utf8_is_an_encoding_error() {
    let mut reader = XmlReader::from_bytes(b"<r>ab\xFFcd</r>".to_vec(), ReaderSettings::default());
    let err = first_error(&mut reader);
    assert!(matches!(
        err.kind(),
        ErrorKind::Encoding(EncodingError::Malformed { .. })
    ));
    assert_eq!(reader.read_state(), ReadState::Error);
}

#[test]
fn read_state_follows_the_document() {
    let mut reader = XmlReader::from_str("<r/>", ReaderSettings::default());
    assert_eq!(reader.read_state(), ReadState::Initial);
    assert!(reader.read().unwrap());
    assert_eq!(reader.read_state(), ReadState::Interactive);
    assert!(!reader.read().unwrap());
    assert_eq!(reader.read_state(), ReadState::EndOfFile);
    assert!(reader.eof());
    assert!(!reader.read().unwrap());
}

#[test]
fn closed_reader_rejects_operations() {
    let mut reader = XmlReader::from_str("<r><a/></r>", ReaderSettings::default());
    assert!(reader.read().unwrap());
    reader.close();
    reader.close();
    assert_eq!(reader.read_state(), ReadState::Closed);
    assert_eq!(reader.node_type(), NodeType::None);
    assert!(!reader.read().unwrap());
    let err = reader.skip().unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Usage(UsageError::Closed));
}

#[test]
fn errors_are_sticky() {
    let mut reader = XmlReader::from_str("<r><a></b></r>", ReaderSettings::default());
    let err = first_error(&mut reader);
    assert!(matches!(
        err.kind(),
        ErrorKind::Syntax(SyntaxError::TagMismatch { .. })
    ));
    assert!(err.is_fatal());
    assert_eq!((err.line(), err.position()), (1, 9));
    assert_eq!(reader.read_state(), ReadState::Error);
    assert_eq!(reader.error().map(XmlError::kind), Some(err.kind()));
    assert!(!reader.read().unwrap());
    assert_eq!(reader.skip().unwrap_err().kind(), err.kind());
}

#[test]
fn push_reader_waits_for_input() {
    let mut reader = XmlPushReader::new(ReaderSettings::default());
    reader.feed(b"").unwrap();
    assert_eq!(reader.read().unwrap(), Step::NeedMoreInput);
    reader.feed(b"<r>one").unwrap();
    assert_eq!(reader.read().unwrap(), Step::Ready(true));
    assert_eq!(reader.read().unwrap(), Step::Ready(true));
    assert_eq!(reader.node_type(), NodeType::Text);
    assert!(reader.has_partial_value());
    assert_eq!(reader.value(), "one");
    assert_eq!(reader.finish_value().unwrap(), Step::NeedMoreInput);
    let err = reader.read_content_as_string().unwrap_err();
    assert_eq!(
        err.kind(),
        &ErrorKind::Usage(UsageError::OperationPending {
            pending: "finish_value"
        })
    );
    reader.feed(b" two</r>").unwrap();
    assert_eq!(reader.finish_value().unwrap(), Step::Ready(()));
    assert!(!reader.has_partial_value());
    assert_eq!(reader.value(), "one two");
    assert_eq!(reader.read().unwrap(), Step::Ready(true));
    assert_eq!(reader.node_type(), NodeType::EndElement);
    assert_eq!(reader.read().unwrap(), Step::NeedMoreInput);
    reader.finish();
    assert_eq!(reader.read().unwrap(), Step::Ready(false));
}

#[test]
fn truncated_push_input_is_an_error() {
    let mut reader = XmlPushReader::new(ReaderSettings::default());
    reader.feed(b"<r><a>").unwrap();
    reader.finish();
    let err = loop {
        match reader.read() {
            Ok(Step::Ready(true)) => continue,
            Ok(other) => panic!("unexpected {other:?}"),
            Err(err) => break err,
        }
    };
    assert!(matches!(
        err.kind(),
        ErrorKind::Syntax(SyntaxError::UnclosedElements { .. })
    ));
}

#[test]
fn typed_content_uses_namespace_scope() {
    let mut reader = XmlReader::from_str(
        "<r xmlns:p='urn:p'><q>p:item</q><b> 1 </b><n>none</n></r>",
        ReaderSettings::default(),
    );
    assert!(reader.read().unwrap());
    assert!(reader.read().unwrap());
    assert_eq!(
        reader.read_element_content_as::<QualifiedName>().unwrap(),
        QualifiedName::new("item", "urn:p")
    );
    assert!(reader.read_element_content_as::<bool>().unwrap());
    let err = reader.read_element_content_as::<bool>().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Conversion { target: "bool", .. }));
    assert!(!err.is_fatal());
}

#[test]
fn long_names_grow_the_buffer() {
    let name = "n".repeat(300);
    let doc = format!("<{name} a='1'>x</{name}>");
    let mut reader = XmlReader::from_bytes(doc.into_bytes(), small_buffer(8));
    assert!(reader.read().unwrap());
    assert_eq!(reader.name(), name);
    while reader.read().unwrap() {}
    let stats = reader.stats();
    assert!(stats.buffer_growths > 0, "{stats:?}");
    assert!(stats.refills > 1, "{stats:?}");
    assert_eq!(stats.nodes_reported, 3);
}
