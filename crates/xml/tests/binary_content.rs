use std::io::{self, Cursor, Read};

use xml::{
    ErrorKind, NodeType, ReaderSettings, Step, StepResult, UsageError, XmlPushReader, XmlReader,
    XmlTokenizer,
};

const BASE64: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

fn base64(bytes: &[u8]) -> String {
    let mut out = String::new();
    for group in bytes.chunks(3) {
        let b = [group[0], *group.get(1).unwrap_or(&0), *group.get(2).unwrap_or(&0)];
        let n = (u32::from(b[0]) << 16) | (u32::from(b[1]) << 8) | u32::from(b[2]);
        for i in 0..4 {
            if i <= group.len() {
                out.push(BASE64[(n >> (18 - 6 * i) & 63) as usize] as char);
            } else {
                out.push('=');
            }
        }
    }
    out
}

fn bin_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 + 3) as u8).collect()
}

/// Wrap encoded text every `width` characters.
fn wrap(text: &str, width: usize) -> String {
    text.as_bytes()
        .chunks(width)
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect::<Vec<_>>()
        .join("\n  ")
}

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

fn read_to_element(reader: &mut XmlReader, name: &str) {
    while reader.read().unwrap() {
        if reader.node_type() == NodeType::Element && reader.name() == name {
            return;
        }
    }
    panic!("no element '{name}'");
}

#[test]
fn element_base64_from_trickling_source() {
    let data = payload(1000);
    let doc = format!("<doc><bin>\n  {}\n</bin><after/></doc>", wrap(&base64(&data), 76));
    let settings = ReaderSettings {
        buffer_size: 32,
        ..ReaderSettings::default()
    };
    let source = Trickle {
        data: Cursor::new(doc.into_bytes()),
        step: 5,
    };
    let mut reader = XmlReader::from_reader(source, settings);
    read_to_element(&mut reader, "bin");
    let mut out = Vec::new();
    let mut buf = [0u8; 17];
    loop {
        let n = reader.read_element_content_as_base64(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert_eq!((reader.node_type(), reader.name()), (NodeType::Element, "after"));
}

#[test]
fn element_bin_hex_through_blocking_reader() {
    let data = payload(300);
    let doc = format!("<r><h>{}</h></r>", bin_hex(&data));
    let mut reader = XmlReader::from_str(&doc, ReaderSettings::default());
    read_to_element(&mut reader, "h");
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    loop {
        let n = reader.read_element_content_as_bin_hex(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert_eq!((reader.node_type(), reader.name()), (NodeType::EndElement, "r"));
}

/// Runs `op` against a push reader, feeding one more chunk whenever it
/// suspends.
fn pushed<T>(
    reader: &mut XmlPushReader,
    chunks: &mut std::slice::Chunks<'_, u8>,
    mut op: impl FnMut(&mut XmlTokenizer) -> StepResult<T>,
) -> T {
    loop {
        match op(&mut **reader).unwrap() {
            Step::Ready(value) => return value,
            Step::NeedMoreInput => match chunks.next() {
                Some(chunk) => reader.feed(chunk).unwrap(),
                None => reader.finish(),
            },
        }
    }
}

#[test]
fn element_base64_fed_byte_by_byte() {
    let data = payload(200);
    let doc = format!("<r><b>{}</b><c/></r>", base64(&data));
    let bytes = doc.into_bytes();
    let mut chunks = bytes.chunks(1);
    let mut reader = XmlPushReader::new(ReaderSettings {
        buffer_size: 16,
        ..ReaderSettings::default()
    });
    while pushed(&mut reader, &mut chunks, XmlTokenizer::read) {
        if reader.name() == "b" {
            break;
        }
    }
    let mut out = Vec::new();
    let mut buf = [0u8; 10];
    loop {
        let n = pushed(&mut reader, &mut chunks, |t| t.read_element_content_as_base64(&mut buf));
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert_eq!(reader.name(), "c");
}

#[test]
fn content_base64_spans_text_cdata_and_comments() {
    let data = payload(90);
    let encoded = base64(&data);
    let (a, rest) = encoded.split_at(40);
    let (b, c) = rest.split_at(40);
    let doc = format!("<r>{a}<![CDATA[{b}]]><!-- skip -->{c}<end/></r>");
    let mut reader = XmlReader::from_str(&doc, ReaderSettings::default());
    read_to_element(&mut reader, "r");
    assert!(reader.read().unwrap());
    let mut out = Vec::new();
    let mut buf = [0u8; 7];
    loop {
        let n = reader.read_content_as_base64(&mut buf).unwrap();
        if n == 0 {
            break;
        }
        out.extend_from_slice(&buf[..n]);
    }
    assert_eq!(out, data);
    assert_eq!((reader.node_type(), reader.name()), (NodeType::Element, "end"));
}

#[test]
fn read_during_element_binary_lands_after_end_tag() {
    let doc = format!("<r><b>{}</b><next/></r>", base64(&payload(120)));
    let mut reader = XmlReader::from_str(&doc, ReaderSettings::default());
    read_to_element(&mut reader, "b");
    let mut buf = [0u8; 4];
    assert_eq!(reader.read_element_content_as_base64(&mut buf).unwrap(), 4);
    assert!(reader.read().unwrap());
    assert_eq!((reader.node_type(), reader.name()), (NodeType::Element, "next"));
}

/// The walk that drops the rest of the run consumes the node ending it, so
/// `read()` continues after that node.
#[test]
fn read_during_content_binary_skips_the_run() {
    let doc = format!(
        "<r>{}<!--c--><![CDATA[QUJD]]><stop/><next/></r>",
        base64(&payload(120))
    );
    let mut reader = XmlReader::from_str(&doc, ReaderSettings::default());
    read_to_element(&mut reader, "r");
    assert!(reader.read().unwrap());
    let mut buf = [0u8; 4];
    assert_eq!(reader.read_content_as_base64(&mut buf).unwrap(), 4);
    assert!(reader.read().unwrap());
    assert_eq!((reader.node_type(), reader.name()), (NodeType::Element, "next"));
}

#[test]
fn exhausted_content_read_leaves_reader_on_next_node() {
    let mut reader = XmlReader::from_str("<r>QUJD<stop/></r>", ReaderSettings::default());
    read_to_element(&mut reader, "r");
    assert!(reader.read().unwrap());
    let mut buf = [0u8; 8];
    assert_eq!(reader.read_content_as_base64(&mut buf).unwrap(), 3);
    assert_eq!(reader.read_content_as_base64(&mut buf).unwrap(), 0);
    assert_eq!(reader.name(), "stop");
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::EndElement);
}

#[test]
fn value_is_hidden_during_binary_reads() {
    let mut reader = XmlReader::from_str("<r>QUJDREVG</r>", ReaderSettings::default());
    read_to_element(&mut reader, "r");
    assert!(reader.read().unwrap());
    let mut buf = [0u8; 2];
    assert_eq!(reader.read_content_as_base64(&mut buf).unwrap(), 2);
    assert_eq!(&buf, b"AB");
    assert_eq!(reader.tokenizer().value(), "");
}

#[test]
fn switching_decoders_is_rejected() {
    let mut reader = XmlReader::from_str("<r>QUJDREVG</r>", ReaderSettings::default());
    read_to_element(&mut reader, "r");
    let mut buf = [0u8; 2];
    assert_eq!(reader.read_element_content_as_base64(&mut buf).unwrap(), 2);
    let err = reader.read_element_content_as_bin_hex(&mut buf).unwrap_err();
    assert_eq!(err.kind(), &ErrorKind::Usage(UsageError::MixedContentReads));
    assert!(!err.is_fatal());
    assert_eq!(reader.read_element_content_as_base64(&mut buf).unwrap(), 2);
    assert_eq!(&buf, b"CD");
}

#[test]
fn element_with_children_cannot_be_decoded() {
    let mut reader = XmlReader::from_str("<r>QUJD<x/></r>", ReaderSettings::default());
    read_to_element(&mut reader, "r");
    let mut buf = [0u8; 16];
    let result = loop {
        match reader.read_element_content_as_base64(&mut buf) {
            Ok(0) => panic!("children not detected"),
            Ok(_) => continue,
            Err(err) => break err,
        }
    };
    assert_eq!(result.kind(), &ErrorKind::Usage(UsageError::ElementHasChildren));
}

#[test]
fn odd_bin_hex_digit_count_is_an_error() {
    let mut reader = XmlReader::from_str("<r>abc</r>", ReaderSettings::default());
    read_to_element(&mut reader, "r");
    let mut buf = [0u8; 16];
    let err = loop {
        match reader.read_element_content_as_bin_hex(&mut buf) {
            Ok(0) => panic!("odd digit count accepted"),
            Ok(_) => continue,
            Err(err) => break err,
        }
    };
    assert!(matches!(err.kind(), ErrorKind::Conversion { target: "binhex", .. }));
}

#[test]
fn empty_element_decodes_to_nothing() {
    let mut reader = XmlReader::from_str("<r><b/><b></b><c/></r>", ReaderSettings::default());
    read_to_element(&mut reader, "b");
    let mut buf = [0u8; 4];
    assert_eq!(reader.read_element_content_as_base64(&mut buf).unwrap(), 0);
    assert_eq!(reader.name(), "b");
    assert_eq!(reader.read_element_content_as_base64(&mut buf).unwrap(), 0);
    assert_eq!(reader.name(), "c");
}
