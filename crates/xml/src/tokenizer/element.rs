//! Element content, start tags with their attributes, and end tags.

use std::sync::Arc;

use tools::chars::{is_name_char, is_whitespace};
use tools::utf8::char_at;

use super::entities::RefScan;
use super::states::{Construct, ParsingFunction, ParsingMode, XmlContext, XmlSpace};
use super::{DefaultAttribute, XmlTokenizer, buffer_str, push_slice};
use crate::dtd::{AttributeType, collapse_whitespace};
use crate::error::{EntityError, SyntaxError, XmlError};
use crate::names::AtomId;
use crate::nodes::{NodeType, NodeValue, ValueChunk};
use crate::settings::EntityHandling;
use crate::step::{Step, StepResult, ready};

/// Below this many attributes duplicates are found by pairwise comparison.
const MAX_ATTRS_LINEAR_CHECK: usize = 32;

impl XmlTokenizer {
    pub(crate) fn parse_element_content(&mut self) -> StepResult<bool> {
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
                let open = self
                    .names
                    .resolve(self.nodes.get(self.index.saturating_sub(1)).name)
                    .to_string();
                return Err(self.error_here(SyntaxError::UnclosedElements { open }));
            }
            if self.ps.chars[pos] != b'<' {
                if ready!(self.parse_text()?) {
                    return Ok(Step::Ready(true));
                }
                continue;
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
                        b'D' if avail < 9 && !self.ps.is_eof => {
                            ready!(self.more_markup()?);
                        }
                        b'D' if avail >= 9 && &self.ps.chars[pos + 2..pos + 9] == b"DOCTYPE" => {
                            return Err(self.error_at(SyntaxError::MisplacedDoctype, pos));
                        }
                        _ => {
                            return Err(self.unexpected_char(pos + 2, "comment or CDATA section"));
                        }
                    }
                }
                b'/' => {
                    self.ps.char_pos = pos + 2;
                    ready!(self.parse_end_element()?);
                    return Ok(Step::Ready(true));
                }
                _ => {
                    self.ps.char_pos = pos + 1;
                    ready!(self.parse_element()?);
                    return Ok(Step::Ready(true));
                }
            }
        }
    }

    /// A markup opener straddles the end of the buffer.
    pub(crate) fn more_markup(&mut self) -> StepResult<()> {
        if ready!(self.read_data()?) == 0 {
            return Err(self.eof_error("markup"));
        }
        Ok(Step::Ready(()))
    }

    /// `char_pos` is just past the `<` of a start tag.
    pub(crate) fn parse_element(&mut self) -> StepResult<()> {
        self.construct = Construct::StartTag;
        ready!(self.prescan_tag(true)?);
        self.construct = Construct::None;
        self.parse_start_tag()?;
        Ok(Step::Ready(()))
    }

    /// `char_pos` is just past `</`.
    pub(crate) fn parse_end_element(&mut self) -> StepResult<()> {
        self.construct = Construct::EndTag;
        ready!(self.prescan_tag(false)?);
        self.construct = Construct::None;
        self.parse_end_tag()?;
        Ok(Step::Ready(()))
    }

    /// Buffer characters until the closing `>` of a tag (or a `<` or the end
    /// of input, which the parse then reports precisely).
    fn prescan_tag(&mut self, quoted: bool) -> StepResult<()> {
        loop {
            let base = self.ps.char_pos;
            let end = self.ps.chars_used;
            let mut pos = base + self.prescan.rel;
            let mut quote = self.prescan.quote;
            while pos < end {
                if quote != 0 {
                    match memchr::memchr(quote, &self.ps.chars[pos..end]) {
                        Some(offset) => {
                            pos += offset + 1;
                            quote = 0;
                        }
                        None => pos = end,
                    }
                    continue;
                }
                match self.ps.chars[pos] {
                    b @ (b'"' | b'\'') if quoted => quote = b,
                    b'>' | b'<' => {
                        self.prescan = Default::default();
                        return Ok(Step::Ready(()));
                    }
                    _ => {}
                }
                pos += 1;
            }
            self.prescan.rel = pos - base;
            self.prescan.quote = quote;
            if ready!(self.read_data()?) == 0 {
                self.prescan = Default::default();
                return Ok(Step::Ready(()));
            }
        }
    }

    fn parse_start_tag(&mut self) -> Result<(), XmlError> {
        let start = self.ps.char_pos;
        let (name_end, colon) = self.scan_name(start, self.settings.namespaces)?;
        if name_end >= self.ps.chars_used {
            return Err(self.eof_error("start tag"));
        }
        if name_end == start {
            return Err(self.unexpected_char(start, "name"));
        }
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(start);
        let (name, prefix, local) = self.intern_qname(start, name_end, colon);
        self.cur = self.nodes.add_node(self.index, self.index);
        let node = self.nodes.get_mut(self.cur);
        node.node_type = NodeType::Element;
        node.set_name(name, prefix, local);
        node.set_position(line, position);
        node.entity_id = self.ps.entity_id;
        if self.settings.namespaces {
            self.ns.push_scope();
        }
        self.attr_count = 0;

        let pos = name_end;
        match self.ps.chars[pos] {
            b'>' => {
                self.ps.char_pos = pos + 1;
                self.set_function(ParsingFunction::MoveToElementContent);
            }
            b'/' => self.close_empty_tag(pos)?,
            b if is_whitespace(b) => self.parse_attributes(pos)?,
            _ => return Err(self.unexpected_char(pos, "whitespace, '>' or '/>'")),
        }
        self.finish_start_tag()
    }

    fn close_empty_tag(&mut self, pos: usize) -> Result<(), XmlError> {
        if self.ps.chars[pos + 1] != b'>' {
            return Err(self.unexpected_char(pos + 1, "'>'"));
        }
        self.ps.char_pos = pos + 2;
        self.nodes.get_mut(self.index).empty_or_default = true;
        self.next_parsing_function = self.parsing_function;
        self.set_function(ParsingFunction::PopEmptyElementContext);
        Ok(())
    }

    fn parse_attributes(&mut self, mut pos: usize) -> Result<(), XmlError> {
        loop {
            let ws_start = pos;
            pos = self.eat_whitespace(pos);
            if pos >= self.ps.chars_used {
                return Err(self.eof_error("start tag"));
            }
            match self.ps.chars[pos] {
                b'>' => {
                    self.ps.char_pos = pos + 1;
                    self.set_function(ParsingFunction::MoveToElementContent);
                    return Ok(());
                }
                b'/' => return self.close_empty_tag(pos),
                _ => {}
            }
            if pos == ws_start {
                return Err(self.error_at(SyntaxError::ExpectedWhitespace, pos));
            }
            pos = self.parse_attribute(pos)?;
        }
    }

    /// Parse one `name = "value"` at `pos`; returns the offset after the
    /// closing quote.
    fn parse_attribute(&mut self, start: usize) -> Result<usize, XmlError> {
        let (name_end, colon) = self.scan_name(start, self.settings.namespaces)?;
        if name_end >= self.ps.chars_used {
            return Err(self.eof_error("attribute"));
        }
        if name_end == start {
            return Err(self.unexpected_char(start, "name"));
        }
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(start);
        let (name, prefix, local) = self.intern_qname(start, name_end, colon);
        self.attr_count += 1;
        let slot = self.nodes.add_node(self.index + self.attr_count, self.index + 1);
        {
            let attr = self.nodes.get_mut(slot);
            attr.node_type = NodeType::Attribute;
            attr.set_name(name, prefix, local);
            attr.set_position(line, position);
            attr.entity_id = self.ps.entity_id;
        }

        let mut pos = self.eat_whitespace(name_end);
        if self.ps.chars[pos] != b'=' {
            return Err(self.unexpected_char(pos, "'='"));
        }
        pos = self.eat_whitespace(pos + 1);
        let quote = self.ps.chars[pos];
        if quote != b'"' && quote != b'\'' {
            return Err(self.unexpected_char(pos, "'\"' or '''"));
        }
        pos += 1;
        let value_line = self.ps.line.line_no;
        let value_position = self.ps.line_position(pos);
        {
            let attr = self.nodes.get_mut(slot);
            attr.quote = quote;
            attr.value_line = value_line;
            attr.value_position = value_position;
        }

        let value_start = pos;
        let used = self.ps.chars_used;
        while pos < used && is_plain_attribute_byte(self.ps.chars[pos], quote) {
            pos += 1;
        }
        if pos < used && self.ps.chars[pos] == quote {
            self.nodes
                .get_mut(slot)
                .value
                .set_buffer(value_start, pos - value_start);
            return Ok(pos + 1);
        }
        self.parse_attribute_value_slow(slot, value_start, pos, quote)
    }

    /// Attribute value with line breaks, references or characters that need
    /// checking. `chars[start..pos]` is plain text already scanned.
    fn parse_attribute_value_slow(
        &mut self,
        slot: usize,
        start: usize,
        mut pos: usize,
        quote: u8,
    ) -> Result<usize, XmlError> {
        let mut value = String::new();
        push_slice(&mut value, &self.ps.chars, start, pos);
        let mut chunks: Vec<ValueChunk> = Vec::new();
        let mut chunk_start = 0;
        let (mut chunk_line, mut chunk_position) = {
            let attr = self.nodes.get(slot);
            (attr.value_line, attr.value_position)
        };
        let report_refs = self.settings.entity_handling == EntityHandling::ExpandCharEntities;
        let skipping = self.parsing_mode == ParsingMode::SkipContent;
        let check = self.settings.check_characters;
        loop {
            if pos >= self.ps.chars_used {
                return Err(self.error_at(SyntaxError::UnclosedQuote, pos));
            }
            let b = self.ps.chars[pos];
            match b {
                _ if b == quote => {
                    pos += 1;
                    break;
                }
                b'\t' => {
                    value.push(' ');
                    pos += 1;
                }
                b'\n' => {
                    value.push(' ');
                    pos += 1;
                    self.ps.line.on_new_line(pos);
                }
                b'\r' => {
                    value.push(' ');
                    pos += 1;
                    if self.ps.chars[pos] == b'\n' {
                        pos += 1;
                    }
                    self.ps.line.on_new_line(pos);
                }
                b'<' => return Err(self.error_at(SyntaxError::LessThanInAttributeValue, pos)),
                b'&' => match self.scan_reference(pos)? {
                    RefScan::Incomplete => return Err(self.eof_error("attribute value")),
                    RefScan::Char { ch, end } => {
                        value.push(ch);
                        pos = end;
                    }
                    RefScan::General {
                        name_start,
                        name_end,
                        end,
                    } => {
                        let name = buffer_str(&self.ps.chars, name_start, name_end).to_string();
                        if skipping {
                            pos = end;
                            continue;
                        }
                        let expansion = self.expand_in_attribute(&name, pos, &mut Vec::new())?;
                        let ref_line = self.ps.line.line_no;
                        let ref_position = self.ps.line_position(pos);
                        pos = end;
                        let Some(expansion) = expansion else {
                            continue;
                        };
                        if !report_refs {
                            value.push_str(&expansion);
                            continue;
                        }
                        if value.len() > chunk_start {
                            chunks.push(ValueChunk {
                                node_type: NodeType::Text,
                                name: AtomId::EMPTY,
                                value: value[chunk_start..].to_string(),
                                line: chunk_line,
                                position: chunk_position,
                            });
                        }
                        let atom = self.names.intern(&name);
                        chunks.push(ValueChunk {
                            node_type: NodeType::EntityReference,
                            name: atom,
                            value: expansion,
                            line: ref_line,
                            position: ref_position,
                        });
                        value.push('&');
                        value.push_str(&name);
                        value.push(';');
                        chunk_start = value.len();
                        chunk_line = self.ps.line.line_no;
                        chunk_position = self.ps.line_position(pos);
                    }
                },
                _ if b < 0x20 => {
                    if check {
                        return Err(self.error_at(
                            SyntaxError::InvalidChar {
                                code_point: u32::from(b),
                            },
                            pos,
                        ));
                    }
                    value.push(char::from(b));
                    pos += 1;
                }
                _ => {
                    let Some((ch, len)) = char_at(&self.ps.chars[..self.ps.chars_used], pos) else {
                        return Err(self.error_at(SyntaxError::InvalidChar { code_point: 0xFFFD }, pos));
                    };
                    if check && matches!(ch, '\u{FFFE}' | '\u{FFFF}') {
                        return Err(self.error_at(
                            SyntaxError::InvalidChar {
                                code_point: ch as u32,
                            },
                            pos,
                        ));
                    }
                    value.push(ch);
                    pos += len;
                }
            }
        }
        if !chunks.is_empty() && value.len() > chunk_start {
            chunks.push(ValueChunk {
                node_type: NodeType::Text,
                name: AtomId::EMPTY,
                value: value[chunk_start..].to_string(),
                line: chunk_line,
                position: chunk_position,
            });
        }
        let attr = self.nodes.get_mut(slot);
        attr.value = NodeValue::owned(value);
        attr.chunks = chunks;
        Ok(pos)
    }

    /// Attribute post-processing once the whole tag has been read.
    fn finish_start_tag(&mut self) -> Result<(), XmlError> {
        if self.attr_count > 0 {
            self.check_duplicate_names()?;
        }
        if self.dtd.is_some() {
            self.apply_attribute_defaults()?;
        }
        let mut space = None;
        let mut lang = None;
        for slot in self.index + 1..=self.index + self.attr_count {
            let (prefix, local, name) = {
                let attr = self.nodes.get(slot);
                (attr.prefix, attr.local_name, attr.name)
            };
            if self.settings.namespaces
                && (prefix == self.names.xmlns
                    || (prefix == AtomId::EMPTY && local == self.names.xmlns))
            {
                self.declare_namespace(slot)?;
                continue;
            }
            match self.names.resolve(name) {
                "xml:space" => space = Some(self.parse_xml_space(slot)?),
                "xml:lang" => {
                    lang = Some(Arc::<str>::from(
                        self.nodes.get(slot).value.as_str(&self.ps.chars),
                    ));
                }
                _ => {}
            }
        }
        if space.is_some() || lang.is_some() {
            let parent = self.xml_contexts.last().cloned().unwrap_or_default();
            self.xml_contexts.push(XmlContext {
                space: space.unwrap_or(parent.space),
                lang: lang.unwrap_or(parent.lang),
            });
            self.nodes.get_mut(self.index).xml_context_pushed = true;
        }
        if self.settings.namespaces {
            self.resolve_namespaces()?;
            if self.attr_count > 1 {
                self.check_duplicate_expanded_names()?;
            }
        }
        Ok(())
    }

    fn attribute_error(&self, slot: usize, kind: SyntaxError) -> XmlError {
        let attr = self.nodes.get(slot);
        self.error_at_line(kind, attr.line, attr.position)
    }

    fn check_duplicate_names(&mut self) -> Result<(), XmlError> {
        let first = self.index + 1;
        let last = self.index + self.attr_count;
        if self.attr_count < MAX_ATTRS_LINEAR_CHECK {
            for i in first + 1..=last {
                let name = self.nodes.get(i).name;
                if (first..i).any(|j| self.nodes.get(j).name == name) {
                    return Err(self.duplicate_attribute(i));
                }
            }
            return Ok(());
        }
        self.seen_names.clear();
        for i in first..=last {
            let name = self.nodes.get(i).name;
            if !self.seen_names.insert((name, AtomId::EMPTY)) {
                return Err(self.duplicate_attribute(i));
            }
        }
        Ok(())
    }

    fn check_duplicate_expanded_names(&mut self) -> Result<(), XmlError> {
        let first = self.index + 1;
        let last = self.index + self.attr_count;
        let key = |this: &Self, slot: usize| {
            let attr = this.nodes.get(slot);
            (attr.local_name, attr.ns)
        };
        if self.attr_count < MAX_ATTRS_LINEAR_CHECK {
            for i in first + 1..=last {
                let expanded = key(self, i);
                if (first..i).any(|j| key(self, j) == expanded) {
                    return Err(self.duplicate_attribute(i));
                }
            }
            return Ok(());
        }
        self.seen_names.clear();
        for i in first..=last {
            let expanded = key(self, i);
            if !self.seen_names.insert(expanded) {
                return Err(self.duplicate_attribute(i));
            }
        }
        Ok(())
    }

    fn duplicate_attribute(&self, slot: usize) -> XmlError {
        let name = self.names.resolve(self.nodes.get(slot).name).to_string();
        self.attribute_error(slot, SyntaxError::DuplicateAttribute { name })
    }

    /// Normalize declared non-CDATA attributes and add missing defaults.
    fn apply_attribute_defaults(&mut self) -> Result<(), XmlError> {
        let element = self.names.resolve(self.nodes.get(self.index).name).to_string();
        let decls = match &self.dtd {
            Some(dtd) if !dtd.attributes(&element).is_empty() => dtd.attributes(&element).to_vec(),
            _ => return Ok(()),
        };
        for slot in self.index + 1..=self.index + self.attr_count {
            let qname = self.names.resolve(self.nodes.get(slot).name);
            let tokenized = decls
                .iter()
                .any(|decl| decl.name == qname && decl.ty != AttributeType::CData);
            if tokenized {
                let attr = self.nodes.get_mut(slot);
                let collapsed = collapse_whitespace(attr.value.as_str(&self.ps.chars));
                attr.value.set_owned(&collapsed);
            }
        }
        let (line, position) = {
            let node = self.nodes.get(self.index);
            (node.line, node.position)
        };
        for decl in &decls {
            let Some(default) = decl.default.value() else {
                continue;
            };
            let specified = (self.index + 1..=self.index + self.attr_count)
                .any(|slot| self.names.resolve(self.nodes.get(slot).name) == decl.name);
            if specified {
                continue;
            }
            let name = self.names.intern(&decl.name);
            let (prefix, local) = match decl.name.find(':') {
                Some(colon) if self.settings.namespaces => (
                    self.names.intern(&decl.name[..colon]),
                    self.names.intern(&decl.name[colon + 1..]),
                ),
                _ => (AtomId::EMPTY, name),
            };
            self.attr_count += 1;
            let slot = self.nodes.add_node(self.index + self.attr_count, self.index + 1);
            let attr = self.nodes.get_mut(slot);
            attr.node_type = NodeType::Attribute;
            attr.set_name(name, prefix, local);
            attr.set_position(line, position);
            attr.value_line = line;
            attr.value_position = position;
            attr.value = NodeValue::owned(default);
            attr.empty_or_default = true;
            attr.entity_id = self.ps.entity_id;
            self.observe_default(DefaultAttribute {
                element: &element,
                name: &decl.name,
                value: default,
            });
        }
        Ok(())
    }

    fn declare_namespace(&mut self, slot: usize) -> Result<(), XmlError> {
        let (declared, uri_text) = {
            let attr = self.nodes.get(slot);
            let declared = if attr.prefix == self.names.xmlns {
                attr.local_name
            } else {
                AtomId::EMPTY
            };
            (declared, attr.value.as_str(&self.ps.chars).to_string())
        };
        let uri = self.names.intern(&uri_text);
        let prefix = self.names.resolve(declared).to_string();
        let reserved = declared == self.names.xmlns
            || (declared == self.names.xml && uri != self.names.xml_ns)
            || (declared != self.names.xml && uri == self.names.xml_ns)
            || uri == self.names.xmlns_ns;
        if reserved {
            return Err(self.attribute_error(
                slot,
                SyntaxError::ReservedNamespace {
                    prefix,
                    uri: uri_text,
                },
            ));
        }
        if declared != AtomId::EMPTY && uri == AtomId::EMPTY {
            return Err(self.attribute_error(slot, SyntaxError::EmptyPrefixedNamespace { prefix }));
        }
        self.ns.add(declared, uri);
        Ok(())
    }

    fn parse_xml_space(&self, slot: usize) -> Result<XmlSpace, XmlError> {
        let value = self.nodes.get(slot).value.as_str(&self.ps.chars);
        match value.trim_matches(|c: char| c.is_ascii_whitespace()) {
            "preserve" => Ok(XmlSpace::Preserve),
            "default" => Ok(XmlSpace::Default),
            _ => Err(self.attribute_error(
                slot,
                SyntaxError::InvalidXmlSpace {
                    value: value.to_string(),
                },
            )),
        }
    }

    fn resolve_namespaces(&mut self) -> Result<(), XmlError> {
        let element = self.index;
        let prefix = self.nodes.get(element).prefix;
        let ns = self.lookup_prefix_atom(element, prefix, true)?;
        self.nodes.get_mut(element).ns = ns;
        for slot in element + 1..=element + self.attr_count {
            let (prefix, local) = {
                let attr = self.nodes.get(slot);
                (attr.prefix, attr.local_name)
            };
            let ns = if prefix == AtomId::EMPTY {
                if local == self.names.xmlns {
                    self.names.xmlns_ns
                } else {
                    AtomId::EMPTY
                }
            } else if prefix == self.names.xmlns {
                self.names.xmlns_ns
            } else {
                self.lookup_prefix_atom(slot, prefix, false)?
            };
            self.nodes.get_mut(slot).ns = ns;
        }
        Ok(())
    }

    fn lookup_prefix_atom(
        &self,
        slot: usize,
        prefix: AtomId,
        element: bool,
    ) -> Result<AtomId, XmlError> {
        match self.ns.lookup(prefix) {
            Some(uri) => Ok(uri),
            None if prefix == AtomId::EMPTY && element => Ok(AtomId::EMPTY),
            None => {
                let prefix = self.names.resolve(prefix).to_string();
                let node = self.nodes.get(slot);
                Err(self.error_at_line(
                    SyntaxError::UndeclaredPrefix { prefix },
                    node.line,
                    node.position,
                ))
            }
        }
    }

    fn parse_end_tag(&mut self) -> Result<(), XmlError> {
        let pos = self.ps.char_pos;
        if self.index == 0 || !self.node_is(self.index - 1, NodeType::Element) {
            return Err(self.error_at(SyntaxError::UnexpectedEndTag, pos));
        }
        let start_slot = self.index - 1;
        let (expected_atom, start_line, start_position, start_entity) = {
            let start = self.nodes.get(start_slot);
            (start.name, start.line, start.position, start.entity_id)
        };
        let expected = self.names.resolve(expected_atom);
        let used = self.ps.chars_used;
        let end = pos + expected.len();
        let matches = end <= used
            && &self.ps.chars[pos..end] == expected.as_bytes()
            && !char_at(&self.ps.chars[..used], end).is_some_and(|(ch, _)| is_name_char(ch));
        if !matches {
            let found_end = self
                .scan_name(pos, false)
                .map_or(pos, |(found_end, _)| found_end.min(used));
            let found = buffer_str(&self.ps.chars, pos, found_end).to_string();
            return Err(self.error_at(
                SyntaxError::TagMismatch {
                    expected: expected.to_string(),
                    start_line,
                    start_position,
                    found,
                },
                pos,
            ));
        }
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(pos);
        let close = self.eat_whitespace(end);
        if close >= self.ps.chars_used {
            return Err(self.eof_error("end tag"));
        }
        if self.ps.chars[close] != b'>' {
            return Err(self.unexpected_char(close, "'>'"));
        }
        if start_entity != self.ps.entity_id {
            return Err(self.error_at(EntityError::CrossesBoundary, pos));
        }
        self.ps.char_pos = close + 1;
        self.index -= 1;
        self.cur = self.index;
        self.attr_count = 0;
        let node = self.nodes.get_mut(self.index);
        node.node_type = NodeType::EndElement;
        node.set_position(line, position);
        node.empty_or_default = false;
        node.value.clear();
        self.next_parsing_function = if self.index > 0 {
            ParsingFunction::ElementContent
        } else {
            ParsingFunction::DocumentContent
        };
        self.set_function(ParsingFunction::PopElementContext);
        Ok(())
    }
}

/// Bytes the attribute fast path copies as they are.
#[inline]
fn is_plain_attribute_byte(b: u8, quote: u8) -> bool {
    b >= 0x20 && b != quote && b != b'&' && b != b'<' && b != 0xEF
}
