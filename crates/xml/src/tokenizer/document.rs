//! Document level: the XML declaration, text declarations of external
//! entities, and everything outside the root element.

use tools::chars::is_whitespace;

use super::states::{Construct, ParsingFunction, Prescan, ReadState};
use super::{XmlTokenizer, buffer_str};
use crate::error::{SyntaxError, XmlError};
use crate::input::encoding::{declared_switch, is_valid_encoding_name};
use crate::names::AtomId;
use crate::nodes::{NodeType, NodeValue};
use crate::settings::{Conformance, DtdProcessing};
use crate::step::{Step, StepResult, ready};

/// A pseudo-attribute of an XML or text declaration.
struct PseudoAttribute {
    name: &'static str,
    value: String,
    quote: u8,
    line: usize,
    position: usize,
}

#[derive(Default)]
struct Declaration {
    version: Option<String>,
    encoding: Option<String>,
    standalone: Option<bool>,
    attributes: Vec<PseudoAttribute>,
}

impl Declaration {
    /// `name="value"` pairs as written, separated by single spaces.
    fn value(&self) -> String {
        let mut out = String::new();
        for attr in &self.attributes {
            if !out.is_empty() {
                out.push(' ');
            }
            let quote = char::from(attr.quote);
            out.push_str(attr.name);
            out.push('=');
            out.push(quote);
            out.push_str(&attr.value);
            out.push(quote);
        }
        out
    }
}

impl XmlTokenizer {
    pub(crate) fn parse_document_content(&mut self) -> StepResult<bool> {
        let fragment = self.settings.conformance == Conformance::Fragment;
        loop {
            if self.construct != Construct::None {
                if ready!(self.resume_construct()?) {
                    return Ok(Step::Ready(true));
                }
                continue;
            }
            if self.ps.text_decl_pending {
                ready!(self.parse_text_declaration()?);
            }
            let pos = self.ps.char_pos;
            let avail = self.ps.chars_used - pos;
            if avail == 0 {
                if ready!(self.read_data()?) > 0 {
                    continue;
                }
                if !self.entities.is_empty() {
                    if self.handle_entity_end(true)? {
                        self.setup_end_entity_node();
                        return Ok(Step::Ready(true));
                    }
                    continue;
                }
                return self.on_document_end();
            }
            let b = self.ps.chars[pos];
            if b != b'<' {
                if fragment {
                    if ready!(self.parse_text()?) {
                        return Ok(Step::Ready(true));
                    }
                    continue;
                }
                if is_whitespace(b) {
                    if ready!(self.parse_root_level_whitespace()?) {
                        return Ok(Step::Ready(true));
                    }
                    continue;
                }
                return Err(self.unexpected_root_data(pos));
            }
            if avail < 2 {
                ready!(self.more_markup()?);
                continue;
            }
            match self.ps.chars[pos + 1] {
                b'?' => {
                    self.ps.char_pos = pos + 2;
                    if ready!(self.parse_pi()?) {
                        return Ok(Step::Ready(true));
                    }
                }
                b'!' => {
                    if avail < 4 {
                        ready!(self.more_markup()?);
                        continue;
                    }
                    match self.ps.chars[pos + 2] {
                        b'-' => {
                            if self.ps.chars[pos + 3] != b'-' {
                                return Err(self.unexpected_char(pos + 3, "'-'"));
                            }
                            self.ps.char_pos = pos + 4;
                            if ready!(self.parse_comment()?) {
                                return Ok(Step::Ready(true));
                            }
                        }
                        b'[' => {
                            if !fragment {
                                return Err(self.error_at(SyntaxError::DataAtRootLevel, pos));
                            }
                            if avail < 9 {
                                ready!(self.more_markup()?);
                                continue;
                            }
                            if &self.ps.chars[pos + 3..pos + 9] != b"CDATA[" {
                                return Err(self.unexpected_char(pos + 3, "'CDATA['"));
                            }
                            self.ps.char_pos = pos + 9;
                            if ready!(self.parse_cdata()?) {
                                return Ok(Step::Ready(true));
                            }
                        }
                        b'D' => {
                            if avail < 9 {
                                ready!(self.more_markup()?);
                                continue;
                            }
                            if &self.ps.chars[pos + 2..pos + 9] != b"DOCTYPE" {
                                return Err(self.unexpected_char(pos + 2, "'DOCTYPE'"));
                            }
                            self.check_doctype_allowed(pos)?;
                            self.ps.char_pos = pos + 9;
                            if ready!(self.parse_doctype()?) {
                                return Ok(Step::Ready(true));
                            }
                        }
                        _ => {
                            return Err(
                                self.unexpected_char(pos + 2, "comment, CDATA section or DOCTYPE")
                            );
                        }
                    }
                }
                b'/' => return Err(self.error_at(SyntaxError::UnexpectedEndTag, pos + 2)),
                _ => {
                    if self.root_element_parsed && !fragment {
                        return Err(self.error_at(SyntaxError::MultipleRoots, pos + 1));
                    }
                    self.root_element_parsed = true;
                    self.ps.char_pos = pos + 1;
                    ready!(self.parse_element()?);
                    return Ok(Step::Ready(true));
                }
            }
        }
    }

    fn unexpected_root_data(&self, pos: usize) -> XmlError {
        match tools::utf8::char_at(&self.ps.chars[..self.ps.chars_used], pos) {
            Some((ch, _)) if !tools::chars::is_xml_char(ch) => self.error_at(
                SyntaxError::InvalidChar {
                    code_point: ch as u32,
                },
                pos,
            ),
            _ => self.error_at(SyntaxError::DataAtRootLevel, pos),
        }
    }

    fn check_doctype_allowed(&self, pos: usize) -> Result<(), XmlError> {
        if self.settings.conformance == Conformance::Fragment || self.root_element_parsed {
            return Err(self.error_at(SyntaxError::MisplacedDoctype, pos));
        }
        if self.doctype_seen {
            return Err(self.error_at(SyntaxError::MultipleDoctypes, pos));
        }
        if self.settings.dtd_processing == DtdProcessing::Prohibit {
            return Err(self.error_at(SyntaxError::DoctypeProhibited, pos));
        }
        Ok(())
    }

    fn on_document_end(&mut self) -> StepResult<bool> {
        if !self.root_element_parsed && self.settings.conformance == Conformance::Document {
            return Err(self.error_here(SyntaxError::MissingRoot));
        }
        self.reset_attributes();
        self.index = 0;
        self.cur = self.nodes.add_node(0, 0);
        self.set_function(ParsingFunction::Eof);
        self.read_state = ReadState::EndOfFile;
        log::debug!(
            target: "xml.input",
            "end of document after {} nodes",
            self.stats.nodes_reported
        );
        Ok(Step::Ready(false))
    }

    /// Wait until it is known whether the input starts with `<?xml `.
    fn starts_with_declaration(&mut self) -> StepResult<bool> {
        loop {
            let avail = self.ps.chars_used - self.ps.char_pos;
            if avail >= 6 || self.ps.is_eof {
                let pos = self.ps.char_pos;
                return Ok(Step::Ready(
                    avail >= 6
                        && &self.ps.chars[pos..pos + 5] == b"<?xml"
                        && is_whitespace(self.ps.chars[pos + 5]),
                ));
            }
            ready!(self.read_data()?);
        }
    }

    /// Buffer up to the closing `?>` of a declaration.
    fn prescan_declaration(&mut self) -> StepResult<()> {
        loop {
            let base = self.ps.char_pos;
            let used = self.ps.chars_used;
            let mut pos = base + self.prescan.rel.max(2);
            while pos < used {
                match self.ps.chars[pos] {
                    b'?' if pos + 1 >= used => break,
                    b'?' if self.ps.chars[pos + 1] == b'>' => {
                        self.prescan = Prescan::default();
                        return Ok(Step::Ready(()));
                    }
                    b'<' => {
                        self.prescan = Prescan::default();
                        return Ok(Step::Ready(()));
                    }
                    _ => pos += 1,
                }
            }
            self.prescan.rel = pos - base;
            if ready!(self.read_data()?) == 0 {
                self.prescan = Prescan::default();
                return Ok(Step::Ready(()));
            }
        }
    }

    /// The optional `<?xml ...?>` at the start of the document.
    pub(crate) fn parse_xml_declaration(&mut self) -> StepResult<bool> {
        if !ready!(self.starts_with_declaration()?) {
            self.end_declaration_sniffing();
            self.set_function(self.next_parsing_function);
            return Ok(Step::Ready(false));
        }
        ready!(self.prescan_declaration()?);
        let start = self.ps.char_pos;
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(start + 2);
        let decl = self.parse_declaration_body(false)?;
        self.standalone = decl.standalone == Some(true);
        self.apply_declared_encoding(decl.encoding.as_deref(), start)?;
        self.end_declaration_sniffing();

        let name = self.names.intern("xml");
        self.cur = self.nodes.add_node(0, 0);
        let node = self.nodes.get_mut(0);
        node.node_type = NodeType::XmlDeclaration;
        node.set_name(name, AtomId::EMPTY, name);
        node.set_position(line, position);
        node.value = NodeValue::owned(decl.value());
        self.attr_count = 0;
        for attr in decl.attributes {
            let atom = self.names.intern(attr.name);
            self.attr_count += 1;
            let slot = self.nodes.add_node(self.attr_count, 1);
            let node = self.nodes.get_mut(slot);
            node.node_type = NodeType::Attribute;
            node.set_name(atom, AtomId::EMPTY, atom);
            node.set_position(attr.line, attr.position);
            node.quote = attr.quote;
            node.value = NodeValue::owned(attr.value);
        }
        self.next_parsing_function = ParsingFunction::DocumentContent;
        self.set_function(ParsingFunction::ResetAttributesRootLevel);
        log::debug!(
            target: "xml.input",
            "XML declaration read; encoding {}",
            self.ps.encoding_name()
        );
        Ok(Step::Ready(true))
    }

    /// A text declaration may open an external entity; it produces no node.
    pub(crate) fn parse_text_declaration(&mut self) -> StepResult<()> {
        if !ready!(self.starts_with_declaration()?) {
            self.end_declaration_sniffing();
            return Ok(Step::Ready(()));
        }
        ready!(self.prescan_declaration()?);
        let start = self.ps.char_pos;
        let decl = self.parse_declaration_body(true)?;
        self.apply_declared_encoding(decl.encoding.as_deref(), start)?;
        self.end_declaration_sniffing();
        Ok(Step::Ready(()))
    }

    fn end_declaration_sniffing(&mut self) {
        self.ps.text_decl_pending = false;
        self.ps.append_mode = false;
    }

    /// Parse the pseudo-attributes after `<?xml` up to and including `?>`.
    /// The whole declaration is buffered.
    fn parse_declaration_body(&mut self, text_decl: bool) -> Result<Declaration, XmlError> {
        let mut pos = self.ps.char_pos + 5;
        let mut decl = Declaration::default();
        // 0 = version, 1 = encoding, 2 = standalone
        let mut next_allowed = 0;
        loop {
            let ws_start = pos;
            pos = self.eat_whitespace(pos);
            if pos >= self.ps.chars_used {
                return Err(self.eof_error("XML declaration"));
            }
            if self.ps.chars[pos] == b'?' {
                if self.ps.chars[pos + 1] != b'>' {
                    return Err(self.unexpected_char(pos + 1, "'>'"));
                }
                if !text_decl && decl.version.is_none() {
                    return Err(self.bad_declaration(pos, "version is required"));
                }
                if text_decl && decl.encoding.is_none() {
                    return Err(self.bad_declaration(pos, "encoding is required"));
                }
                self.ps.char_pos = pos + 2;
                return Ok(decl);
            }
            if pos == ws_start {
                return Err(self.error_at(SyntaxError::ExpectedWhitespace, pos));
            }
            let name_start = pos;
            while self.ps.chars[pos].is_ascii_alphabetic() {
                pos += 1;
            }
            let which = match &self.ps.chars[name_start..pos] {
                b"version" if next_allowed == 0 => 0,
                b"encoding" if next_allowed <= 1 && (text_decl || decl.version.is_some()) => 1,
                b"standalone" if !text_decl && next_allowed <= 2 && decl.version.is_some() => 2,
                _ => {
                    return Err(self.bad_declaration(name_start, "unexpected pseudo-attribute"));
                }
            };
            let line = self.ps.line.line_no;
            let position = self.ps.line_position(name_start);
            pos = self.eat_whitespace(pos);
            if self.ps.chars[pos] != b'=' {
                return Err(self.unexpected_char(pos, "'='"));
            }
            pos = self.eat_whitespace(pos + 1);
            let quote = self.ps.chars[pos];
            if quote != b'"' && quote != b'\'' {
                return Err(self.unexpected_char(pos, "'\"' or '''"));
            }
            let value_start = pos + 1;
            let Some(len) = memchr::memchr(quote, &self.ps.chars[value_start..self.ps.chars_used])
            else {
                return Err(self.eof_error("XML declaration"));
            };
            let value = buffer_str(&self.ps.chars, value_start, value_start + len).to_string();
            pos = value_start + len + 1;
            let name = match which {
                0 => {
                    if !is_valid_version(&value) {
                        return Err(self.bad_declaration(value_start, "version must be 1.x"));
                    }
                    decl.version = Some(value.clone());
                    "version"
                }
                1 => {
                    if !is_valid_encoding_name(&value) {
                        return Err(self.bad_declaration(value_start, "invalid encoding name"));
                    }
                    decl.encoding = Some(value.clone());
                    "encoding"
                }
                _ => {
                    decl.standalone = Some(match value.as_str() {
                        "yes" => true,
                        "no" => false,
                        _ => {
                            return Err(self.bad_declaration(
                                value_start,
                                "standalone must be 'yes' or 'no'",
                            ));
                        }
                    });
                    "standalone"
                }
            };
            next_allowed = which + 1;
            decl.attributes.push(PseudoAttribute {
                name,
                value,
                quote,
                line,
                position,
            });
        }
    }

    fn bad_declaration(&self, pos: usize, reason: &'static str) -> XmlError {
        self.error_at(SyntaxError::BadXmlDeclaration { reason }, pos)
    }

    /// Switch the decoder if the declared encoding differs from the sniffed
    /// one. Text sources only have the label checked for syntax.
    fn apply_declared_encoding(&mut self, label: Option<&str>, pos: usize) -> Result<(), XmlError> {
        let Some(label) = label else {
            return Ok(());
        };
        if self.ps.is_text_source() {
            return Ok(());
        }
        let Some(detected) = self.ps.detected() else {
            return Ok(());
        };
        match declared_switch(detected, label) {
            Ok(Some(encoding)) => {
                self.invalidate_values();
                self.ps.switch_encoding(encoding);
                Ok(())
            }
            Ok(None) => Ok(()),
            Err(err) => Err(self.error_at(err, pos)),
        }
    }
}

/// `VersionNum ::= '1.' [0-9]+`
fn is_valid_version(value: &str) -> bool {
    value
        .strip_prefix("1.")
        .is_some_and(|digits| !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()))
}

#[cfg(test)]
mod version_tests {
    use super::is_valid_version;

    #[test]
    fn version_numbers() {
        assert!(is_valid_version("1.0"));
        assert!(is_valid_version("1.10"));
        assert!(!is_valid_version("1."));
        assert!(!is_valid_version("2.0"));
        assert!(!is_valid_version("1.x"));
    }
}
