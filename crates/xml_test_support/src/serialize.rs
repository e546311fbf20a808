//! Minimal node-stream writer used to check that a read document can be
//! written back and read again to the same nodes.
//!
//! Only what the reader reports is written: no DOCTYPE, and entity
//! references arrive already expanded. Characters the reader would
//! normalize away are written as character references.

use xml::{NodeType, ReaderSettings, XmlError, XmlReader};

fn push_escaped(out: &mut String, text: &str, in_attribute: bool) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if in_attribute => out.push_str("&quot;"),
            '\r' => out.push_str("&#13;"),
            '\t' if in_attribute => out.push_str("&#9;"),
            '\n' if in_attribute => out.push_str("&#10;"),
            ch => out.push(ch),
        }
    }
}

fn push_start_tag(reader: &mut XmlReader, out: &mut String) -> Result<(), XmlError> {
    out.push('<');
    out.push_str(reader.name());
    for i in 0..reader.attribute_count() {
        reader.move_to_attribute_at(i)?;
        out.push(' ');
        out.push_str(reader.name());
        out.push_str("=\"");
        push_escaped(out, reader.tokenizer().value(), true);
        out.push('"');
    }
    if reader.attribute_count() > 0 {
        reader.move_to_element()?;
    }
    out.push_str(if reader.is_empty_element() { "/>" } else { ">" });
    Ok(())
}

/// Read `input` to the end and write every reported node back as markup.
pub fn write_nodes(input: &str, settings: ReaderSettings) -> Result<String, XmlError> {
    let mut reader = XmlReader::from_str(input, settings);
    let mut out = String::with_capacity(input.len());
    while reader.read()? {
        match reader.node_type() {
            NodeType::Element => push_start_tag(&mut reader, &mut out)?,
            NodeType::EndElement => {
                out.push_str("</");
                out.push_str(reader.name());
                out.push('>');
            }
            NodeType::Text | NodeType::Whitespace | NodeType::SignificantWhitespace => {
                let value = reader.value()?;
                push_escaped(&mut out, value, false);
            }
            NodeType::CData => {
                let value = reader.value()?;
                out.push_str("<![CDATA[");
                out.push_str(value);
                out.push_str("]]>");
            }
            NodeType::Comment => {
                let value = reader.value()?;
                out.push_str("<!--");
                out.push_str(value);
                out.push_str("-->");
            }
            NodeType::ProcessingInstruction => {
                let target = reader.name().to_string();
                let value = reader.value()?;
                out.push_str("<?");
                out.push_str(&target);
                if !value.is_empty() {
                    out.push(' ');
                    out.push_str(value);
                }
                out.push_str("?>");
            }
            NodeType::XmlDeclaration => {
                let value = reader.value()?;
                out.push_str("<?xml ");
                out.push_str(value);
                out.push_str("?>");
            }
            _ => {}
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_markup_back() {
        let written = write_nodes(
            "<?xml version='1.0'?><r a='x&#9;&quot;'><!--c--><?p d?>1 &lt; 2<e/><![CDATA[<]]></r>",
            ReaderSettings::default(),
        )
        .unwrap();
        assert_eq!(
            written,
            "<?xml version='1.0'?><r a=\"x&#9;&quot;\"><!--c--><?p d?>1 &lt; 2<e/><![CDATA[<]]></r>"
        );
    }
}
