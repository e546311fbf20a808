//! Names, whitespace and the delimited constructs: comments, processing
//! instructions, CDATA sections and whitespace at the root level.

use tools::chars::{is_ncname_char, is_ncname_start_char, is_whitespace, is_xml_char};
use tools::utf8::char_at;

use super::states::{Construct, MarkupPhase, ParsingMode};
use super::{XmlTokenizer, push_slice};
use crate::error::{SyntaxError, XmlError};
use crate::names::AtomId;
use crate::nodes::{NodeType, NodeValue};
use crate::step::{Step, StepResult, ready};

impl XmlTokenizer {
    /// Scan a name starting at `start`. Returns its end and, when colons
    /// separate prefix and local name, the colon offset.
    ///
    /// Reaching the end of the buffer is not an error here; callers that
    /// need the whole name check `end < chars_used`.
    pub(crate) fn scan_name(
        &self,
        start: usize,
        qualified: bool,
    ) -> Result<(usize, Option<usize>), XmlError> {
        let chars = &self.ps.chars[..self.ps.chars_used];
        let mut pos = start;
        let mut colon = None;
        let mut part_start = true;
        while pos < chars.len() {
            let Some((ch, len)) = char_at(chars, pos) else {
                break;
            };
            if ch == ':' && qualified {
                if part_start || colon.is_some() {
                    return Err(self.error_at(SyntaxError::InvalidNameStart { found: ':' }, pos));
                }
                colon = Some(pos);
                part_start = true;
                pos += 1;
                continue;
            }
            let valid = if part_start {
                is_ncname_start_char(ch) || ch == ':'
            } else {
                is_ncname_char(ch) || ch == ':'
            };
            if !valid {
                if part_start {
                    if !is_xml_char(ch) {
                        return Err(self.error_at(
                            SyntaxError::InvalidChar {
                                code_point: ch as u32,
                            },
                            pos,
                        ));
                    }
                    return Err(self.error_at(SyntaxError::InvalidNameStart { found: ch }, pos));
                }
                break;
            }
            part_start = false;
            pos += len;
        }
        Ok((pos, colon))
    }

    /// Intern the qualified name `chars[start..end]` and its parts.
    pub(crate) fn intern_qname(
        &mut self,
        start: usize,
        end: usize,
        colon: Option<usize>,
    ) -> (AtomId, AtomId, AtomId) {
        let text = std::str::from_utf8(&self.ps.chars[start..end]).unwrap_or("");
        let name = self.names.intern(text);
        match colon {
            Some(colon) if self.settings.namespaces => {
                let split = colon - start;
                let prefix = self.names.intern(&text[..split]);
                let local = self.names.intern(&text[split + 1..]);
                (name, prefix, local)
            }
            _ => (name, AtomId::EMPTY, name),
        }
    }

    /// Skip whitespace inside a fully buffered construct, tracking lines.
    pub(crate) fn eat_whitespace(&mut self, mut pos: usize) -> usize {
        let end = self.ps.chars_used;
        while pos < end {
            match self.ps.chars[pos] {
                b' ' | b'\t' => pos += 1,
                b'\n' => {
                    pos += 1;
                    self.ps.line.on_new_line(pos);
                }
                b'\r' => {
                    pos += 1;
                    if self.ps.chars[pos] == b'\n' {
                        pos += 1;
                    }
                    self.ps.line.on_new_line(pos);
                }
                _ => break,
            }
        }
        pos
    }

    /// Count the line breaks of `chars[start..end]`, which the caller
    /// consumed without scanning byte by byte.
    pub(crate) fn track_lines(&mut self, start: usize, end: usize) {
        let mut pos = start;
        while let Some(offset) = memchr::memchr2(b'\n', b'\r', &self.ps.chars[pos..end]) {
            pos += offset + 1;
            if self.ps.chars[pos - 1] == b'\r' && pos < end && self.ps.chars[pos] == b'\n' {
                pos += 1;
            }
            self.ps.line.on_new_line(pos);
        }
    }

    fn begin_markup(&mut self, construct: Construct) {
        self.construct = construct;
        self.markup.phase = MarkupPhase::Start;
        self.markup.builder.clear();
        self.markup.target.clear();
        self.markup.line = self.ps.line.line_no;
        self.markup.position = self.ps.line_position(self.ps.char_pos);
    }

    /// Put a finished markup node into the content slot.
    fn report_markup(&mut self, node_type: NodeType, name: AtomId) {
        let value = std::mem::take(&mut self.markup.builder);
        let slot = self.nodes.add_node(self.index, self.index);
        self.cur = slot;
        let node = self.nodes.get_mut(slot);
        node.node_type = node_type;
        node.set_name(name, AtomId::EMPTY, name);
        node.set_position(self.markup.line, self.markup.position);
        node.entity_id = self.ps.entity_id;
        node.value = NodeValue::owned(value);
    }

    /// `char_pos` is just past `<!--`.
    pub(crate) fn parse_comment(&mut self) -> StepResult<bool> {
        if self.construct != Construct::Comment {
            self.begin_markup(Construct::Comment);
        }
        let build = self.parsing_mode == ParsingMode::Full && !self.settings.ignore_comments;
        ready!(self.scan_delimited(b"-->", build, "comment")?);
        self.construct = Construct::None;
        if !build {
            return Ok(Step::Ready(false));
        }
        self.report_markup(NodeType::Comment, AtomId::EMPTY);
        Ok(Step::Ready(true))
    }

    /// `char_pos` is just past `<![CDATA[`.
    pub(crate) fn parse_cdata(&mut self) -> StepResult<bool> {
        if self.construct != Construct::CData {
            self.begin_markup(Construct::CData);
        }
        let build = self.parsing_mode == ParsingMode::Full;
        ready!(self.scan_delimited(b"]]>", build, "CDATA section")?);
        self.construct = Construct::None;
        if !build {
            return Ok(Step::Ready(false));
        }
        self.report_markup(NodeType::CData, AtomId::EMPTY);
        Ok(Step::Ready(true))
    }

    /// `char_pos` is just past `<?`.
    pub(crate) fn parse_pi(&mut self) -> StepResult<bool> {
        if self.construct != Construct::Pi {
            self.begin_markup(Construct::Pi);
        }
        if self.markup.phase == MarkupPhase::Start {
            ready!(self.parse_pi_target()?);
        }
        if self.markup.phase == MarkupPhase::Whitespace {
            ready!(self.skip_pi_whitespace()?);
            self.markup.phase = MarkupPhase::Body;
        }
        let build = self.parsing_mode == ParsingMode::Full
            && !self.settings.ignore_processing_instructions;
        ready!(self.scan_delimited(b"?>", build, "processing instruction")?);
        self.construct = Construct::None;
        self.markup.phase = MarkupPhase::Start;
        if !build {
            return Ok(Step::Ready(false));
        }
        let target = std::mem::take(&mut self.markup.target);
        let name = self.names.intern(&target);
        self.report_markup(NodeType::ProcessingInstruction, name);
        Ok(Step::Ready(true))
    }

    fn parse_pi_target(&mut self) -> StepResult<()> {
        loop {
            let start = self.ps.char_pos;
            let (end, _) = self.scan_name(start, false)?;
            // the target and the character after it must both be buffered
            if end + 1 >= self.ps.chars_used {
                if ready!(self.read_data()?) == 0 {
                    return Err(self.eof_error("processing instruction"));
                }
                continue;
            }
            if end == start {
                return Err(self.unexpected_char(start, "name"));
            }
            let target = std::str::from_utf8(&self.ps.chars[start..end]).unwrap_or("");
            if target == "xml" {
                return Err(self.error_at(SyntaxError::MisplacedXmlDeclaration, start));
            }
            if target.eq_ignore_ascii_case("xml") {
                return Err(self.error_at(SyntaxError::ReservedPiTarget, start));
            }
            self.markup.target.clear();
            self.markup.target.push_str(target);
            match self.ps.chars[end] {
                b'?' => {
                    if self.ps.chars[end + 1] != b'>' {
                        return Err(self.unexpected_char(end + 1, "'>'"));
                    }
                    self.ps.char_pos = end;
                    self.markup.phase = MarkupPhase::Body;
                }
                b if is_whitespace(b) => {
                    self.ps.char_pos = end;
                    self.markup.phase = MarkupPhase::Whitespace;
                }
                _ => return Err(self.unexpected_char(end, "whitespace or '?>'")),
            }
            return Ok(Step::Ready(()));
        }
    }

    /// Whitespace between a PI target and its data is not part of the value.
    fn skip_pi_whitespace(&mut self) -> StepResult<()> {
        loop {
            let end = self.ps.chars_used;
            let mut pos = self.ps.char_pos;
            while pos < end {
                match self.ps.chars[pos] {
                    b' ' | b'\t' => pos += 1,
                    b'\n' => {
                        pos += 1;
                        self.ps.line.on_new_line(pos);
                    }
                    b'\r' => {
                        if pos + 1 >= end && !self.ps.is_eof {
                            break;
                        }
                        pos += if self.ps.chars[pos + 1] == b'\n' { 2 } else { 1 };
                        self.ps.line.on_new_line(pos);
                    }
                    _ => {
                        self.ps.char_pos = pos;
                        return Ok(Step::Ready(()));
                    }
                }
            }
            self.ps.char_pos = pos;
            if ready!(self.read_data()?) == 0 {
                return Ok(Step::Ready(()));
            }
        }
    }

    /// Scan to `delim`, appending the text before it to the markup builder
    /// when `build` is set. Line breaks are normalized to `\n`.
    fn scan_delimited(
        &mut self,
        delim: &'static [u8],
        build: bool,
        construct: &'static str,
    ) -> StepResult<()> {
        let first = delim[0];
        let comment = delim == b"-->";
        let check = self.settings.check_characters;
        loop {
            let used = self.ps.chars_used;
            let mut seg = self.ps.char_pos;
            let mut pos = seg;
            while pos < used {
                let b = self.ps.chars[pos];
                if b == first {
                    let avail = used - pos;
                    if avail < delim.len() && !self.ps.is_eof {
                        break;
                    }
                    if self.ps.chars[pos..used].starts_with(delim) {
                        if build {
                            push_slice(&mut self.markup.builder, &self.ps.chars, seg, pos);
                        }
                        self.ps.char_pos = pos + delim.len();
                        return Ok(Step::Ready(()));
                    }
                    if comment && avail >= 2 && self.ps.chars[pos + 1] == b'-' {
                        return Err(self.error_at(SyntaxError::DoubleHyphenInComment, pos));
                    }
                    pos += 1;
                    continue;
                }
                match b {
                    b'\n' => {
                        pos += 1;
                        self.ps.line.on_new_line(pos);
                    }
                    b'\r' => {
                        if pos + 1 >= used && !self.ps.is_eof {
                            break;
                        }
                        if build {
                            push_slice(&mut self.markup.builder, &self.ps.chars, seg, pos);
                            self.markup.builder.push('\n');
                        }
                        pos += if self.ps.chars[pos + 1] == b'\n' { 2 } else { 1 };
                        seg = pos;
                        self.ps.line.on_new_line(pos);
                    }
                    b'\t' => pos += 1,
                    0xEF if check => {
                        if pos + 2 < used
                            && self.ps.chars[pos + 1] == 0xBF
                            && matches!(self.ps.chars[pos + 2], 0xBE | 0xBF)
                        {
                            let code_point = 0xFFF0 | u32::from(self.ps.chars[pos + 2] & 0x0F);
                            return Err(self.error_at(SyntaxError::InvalidChar { code_point }, pos));
                        }
                        pos += 1;
                    }
                    _ if b < 0x20 && check => {
                        return Err(self.error_at(
                            SyntaxError::InvalidChar {
                                code_point: u32::from(b),
                            },
                            pos,
                        ));
                    }
                    _ => pos += 1,
                }
            }
            if build {
                push_slice(&mut self.markup.builder, &self.ps.chars, seg, pos);
            }
            self.ps.char_pos = pos;
            if ready!(self.read_data()?) == 0 {
                return Err(self.error_here(SyntaxError::UnexpectedEof { construct }));
            }
        }
    }

    /// Whitespace between top-level constructs of a document.
    pub(crate) fn parse_root_level_whitespace(&mut self) -> StepResult<bool> {
        if self.construct != Construct::RootWhitespace {
            self.begin_markup(Construct::RootWhitespace);
        }
        let node_type = self.whitespace_node_type();
        let build = node_type != NodeType::None && self.parsing_mode == ParsingMode::Full;
        loop {
            let used = self.ps.chars_used;
            let mut seg = self.ps.char_pos;
            let mut pos = seg;
            let mut need_more = false;
            while pos < used {
                match self.ps.chars[pos] {
                    b' ' | b'\t' => pos += 1,
                    b'\n' => {
                        pos += 1;
                        self.ps.line.on_new_line(pos);
                    }
                    b'\r' => {
                        if pos + 1 >= used && !self.ps.is_eof {
                            need_more = true;
                            break;
                        }
                        if build {
                            push_slice(&mut self.markup.builder, &self.ps.chars, seg, pos);
                            self.markup.builder.push('\n');
                        }
                        pos += if self.ps.chars[pos + 1] == b'\n' { 2 } else { 1 };
                        seg = pos;
                        self.ps.line.on_new_line(pos);
                    }
                    _ => break,
                }
            }
            if build {
                push_slice(&mut self.markup.builder, &self.ps.chars, seg, pos);
            }
            self.ps.char_pos = pos;
            if pos < used && !need_more {
                if self.ps.chars[pos] != b'<' {
                    self.construct = Construct::None;
                    let err = match char_at(&self.ps.chars[..used], pos) {
                        Some((ch, _)) if !is_xml_char(ch) => SyntaxError::InvalidChar {
                            code_point: ch as u32,
                        },
                        _ => SyntaxError::DataAtRootLevel,
                    };
                    return Err(self.error_at(err, pos));
                }
                break;
            }
            if ready!(self.read_data()?) == 0 {
                break;
            }
        }
        self.construct = Construct::None;
        if !build || self.markup.builder.is_empty() {
            self.markup.builder.clear();
            return Ok(Step::Ready(false));
        }
        self.report_markup(node_type, AtomId::EMPTY);
        Ok(Step::Ready(true))
    }
}
