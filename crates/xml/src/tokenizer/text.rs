//! Character data.
//!
//! Text is scanned in chunks: each call of `parse_text_chunk` normalizes
//! line breaks and inline references in place and returns the range of
//! finished characters. A value is either reported straight from the buffer
//! (single chunk), accumulated in `text.builder`, or reported early as a
//! partial node whose remainder is scanned on demand.

use std::mem;

use tools::chars::is_whitespace;

use super::entities::RefScan;
use super::states::{AfterText, Construct, ParsingFunction, ParsingMode, TextChunk, TextPhase};
use super::{XmlTokenizer, buffer_str, push_slice};
use crate::error::{EntityError, SyntaxError, XmlError};
use crate::input::LineTracker;
use crate::nodes::{NodeType, NodeValue};
use crate::settings::{EntityHandling, WhitespaceHandling, WhitespaceLookahead};
use crate::step::{Step, StepResult, ready};

use super::states::XmlSpace;

/// Whitespace runs longer than this are reported as Text without further
/// lookahead.
const MIN_WHITESPACE_LOOKAHEAD: usize = 4096;

/// Bytes the text fast path steps over: printable ASCII except `&`, `<`
/// and `]`, and every non-ASCII byte except the lead byte of U+FFFx.
static TEXT_SAFE: [bool; 256] = text_safe_table();

const fn text_safe_table() -> [bool; 256] {
    let mut table = [false; 256];
    let mut i = 0x20;
    while i < 256 {
        table[i] = true;
        i += 1;
    }
    table[b'&' as usize] = false;
    table[b'<' as usize] = false;
    table[b']' as usize] = false;
    table[0xEF] = false;
    table
}

/// Filler for dead bytes; continuation bytes count as no characters, so
/// columns on the current line stay exact.
const DEAD: u8 = 0x80;

/// Dead bytes left behind by in-place rewrites of the current chunk.
#[derive(Default)]
struct Gap {
    pos: usize,
    count: usize,
}

impl Gap {
    /// Mark `chars[at..at + count]` dead, moving the live bytes since the
    /// previous gap down so the dead region stays contiguous.
    fn add(&mut self, chars: &mut [u8], line: &mut LineTracker, at: usize, count: usize) {
        if self.count > 0 {
            chars.copy_within(self.pos + self.count..at, self.pos);
            line.on_moved_down(self.pos + self.count, at, self.count);
            self.pos = at - self.count;
        } else {
            self.pos = at;
        }
        self.count += count;
        chars[self.pos..self.pos + self.count].fill(DEAD);
    }

    /// Close the gap before `end`; returns the end of the live text.
    fn close(&mut self, chars: &mut [u8], line: &mut LineTracker, end: usize) -> usize {
        if self.count == 0 {
            return end;
        }
        chars.copy_within(self.pos + self.count..end, self.pos);
        line.on_moved_down(self.pos + self.count, end, self.count);
        let live_end = end - self.count;
        chars[live_end..end].fill(DEAD);
        live_end
    }
}

/// What a general entity reference in text turned into.
enum EntityInText {
    /// Stay on the reference; it becomes an EntityReference node.
    Report,
    /// The reference was dropped.
    Skipped,
    /// The replacement text is now the active input.
    Pushed,
}

impl XmlTokenizer {
    /// Scan the next chunk of text starting at `char_pos`.
    pub(crate) fn parse_text_chunk(&mut self) -> StepResult<TextChunk> {
        let full = self.parsing_mode == ParsingMode::Full;
        let check = self.settings.check_characters;
        let mut or_chars = self.text.or_chars;
        'source: loop {
            if self.ps.text_decl_pending {
                self.text.or_chars = or_chars;
                ready!(self.parse_text_declaration()?);
            }
            let mut start = self.ps.char_pos;
            let mut pos = start;
            let mut gap = Gap::default();
            loop {
                // scan until something needs more characters
                loop {
                    while TEXT_SAFE[self.ps.chars[pos] as usize] {
                        or_chars |= u32::from(self.ps.chars[pos]);
                        pos += 1;
                    }
                    let used = self.ps.chars_used;
                    let b = self.ps.chars[pos];
                    match b {
                        b'\t' => pos += 1,
                        b'\n' => {
                            pos += 1;
                            self.ps.line.on_new_line(pos);
                        }
                        b'\r' => {
                            if self.ps.chars[pos + 1] == b'\n' {
                                if full && !self.ps.eol_normalized {
                                    if pos > start {
                                        gap.add(&mut self.ps.chars, &mut self.ps.line, pos, 1);
                                    } else {
                                        start += 1;
                                    }
                                }
                                pos += 2;
                            } else if pos + 1 < used || self.ps.is_eof {
                                if full && !self.ps.eol_normalized {
                                    self.ps.chars[pos] = b'\n';
                                }
                                pos += 1;
                            } else {
                                break;
                            }
                            self.ps.line.on_new_line(pos);
                        }
                        b'<' => {
                            let chunk = self.finish_chunk(start, pos, &mut gap, or_chars, true);
                            return Ok(Step::Ready(chunk));
                        }
                        b']' => {
                            let closes_cdata = if pos + 1 < used && self.ps.chars[pos + 1] != b']' {
                                Some(false)
                            } else if pos + 2 < used {
                                Some(self.ps.chars[pos + 2] == b'>')
                            } else if self.ps.is_eof {
                                Some(false)
                            } else {
                                None
                            };
                            match closes_cdata {
                                Some(true) => {
                                    return Err(self.error_at(SyntaxError::CDataEndInText, pos));
                                }
                                Some(false) => {
                                    or_chars |= u32::from(b']');
                                    pos += 1;
                                }
                                None => break,
                            }
                        }
                        0xEF => {
                            if check && pos + 2 < used && self.ps.chars[pos + 1] == 0xBF {
                                let last = self.ps.chars[pos + 2];
                                if last == 0xBE || last == 0xBF {
                                    let code_point = 0xFFF0 | u32::from(last & 0x0F);
                                    return Err(
                                        self.error_at(SyntaxError::InvalidChar { code_point }, pos)
                                    );
                                }
                            }
                            or_chars |= 0xEF;
                            pos += 1;
                        }
                        b'&' => {
                            if !full {
                                match self.scan_reference(pos)? {
                                    RefScan::Incomplete => break,
                                    RefScan::Char { end, .. } | RefScan::General { end, .. } => {
                                        pos = end;
                                        continue;
                                    }
                                }
                            }
                            match self.scan_reference(pos)? {
                                RefScan::Incomplete => break,
                                RefScan::Char { ch, end } => {
                                    let len = ch.len_utf8();
                                    gap.add(
                                        &mut self.ps.chars,
                                        &mut self.ps.line,
                                        pos,
                                        end - len - pos,
                                    );
                                    ch.encode_utf8(&mut self.ps.chars[end - len..end]);
                                    // references are ASCII; one character remains
                                    self.ps.line.on_rewritten(end - pos - 1);
                                    if !ch.is_ascii() || !is_whitespace(ch as u8) {
                                        or_chars |= 0xFF;
                                    }
                                    pos = end;
                                }
                                RefScan::General {
                                    name_start,
                                    name_end,
                                    end,
                                } => {
                                    if pos > start {
                                        let chunk =
                                            self.finish_chunk(start, pos, &mut gap, or_chars, false);
                                        return Ok(Step::Ready(chunk));
                                    }
                                    match self.entity_in_text(pos, name_start, name_end, end)? {
                                        EntityInText::Report => {
                                            self.text.after = AfterText::EntityReference;
                                            let chunk =
                                                self.finish_chunk(pos, pos, &mut gap, or_chars, true);
                                            return Ok(Step::Ready(chunk));
                                        }
                                        EntityInText::Skipped => {
                                            pos = end;
                                            start = end;
                                        }
                                        EntityInText::Pushed => continue 'source,
                                    }
                                }
                            }
                        }
                        _ => {
                            if pos >= used {
                                break;
                            }
                            if check {
                                return Err(self.error_at(
                                    SyntaxError::InvalidChar {
                                        code_point: u32::from(b),
                                    },
                                    pos,
                                ));
                            }
                            pos += 1;
                        }
                    }
                }

                // more characters are needed to continue
                if pos > start {
                    let chunk = self.finish_chunk(start, pos, &mut gap, or_chars, false);
                    return Ok(Step::Ready(chunk));
                }
                self.ps.char_pos = pos;
                self.text.or_chars = or_chars;
                if ready!(self.read_data()?) == 0 {
                    if self.ps.chars_used > self.ps.char_pos {
                        // a trailing `\r` or `]` can be decided now
                    } else if self.entities.is_empty() {
                        let end = self.ps.char_pos;
                        return Ok(Step::Ready(TextChunk {
                            start: end,
                            end,
                            complete: true,
                        }));
                    } else if self.handle_entity_end(true)? {
                        self.text.after = AfterText::EndEntity;
                        let end = self.ps.char_pos;
                        return Ok(Step::Ready(TextChunk {
                            start: end,
                            end,
                            complete: true,
                        }));
                    } else {
                        continue 'source;
                    }
                }
                start = self.ps.char_pos;
                pos = start;
            }
        }
    }

    fn finish_chunk(
        &mut self,
        start: usize,
        pos: usize,
        gap: &mut Gap,
        or_chars: u32,
        complete: bool,
    ) -> TextChunk {
        let end = gap.close(&mut self.ps.chars, &mut self.ps.line, pos);
        self.ps.char_pos = pos;
        self.text.or_chars = or_chars;
        TextChunk {
            start,
            end,
            complete,
        }
    }

    /// A general entity reference at the start of a chunk.
    fn entity_in_text(
        &mut self,
        pos: usize,
        name_start: usize,
        name_end: usize,
        end: usize,
    ) -> Result<EntityInText, XmlError> {
        let name = buffer_str(&self.ps.chars, name_start, name_end).to_string();
        let Some(decl) = self.dtd.as_ref().and_then(|dtd| dtd.entity(&name)).cloned() else {
            if self.settings.check_undeclared_entities {
                return Err(self.error_at(EntityError::Undeclared { name }, pos));
            }
            log::debug!(target: "xml.entity", "undeclared entity '{name}' skipped");
            self.ps.char_pos = end;
            return Ok(EntityInText::Skipped);
        };
        if decl.is_unparsed() {
            return Err(self.error_at(EntityError::Unparsed { name }, pos));
        }
        if self.standalone && decl.declared_externally {
            return Err(self.error_at(EntityError::ExternalInStandalone { name }, pos));
        }
        if self.settings.entity_handling == EntityHandling::ExpandCharEntities {
            self.ps.char_pos = pos;
            return Ok(EntityInText::Report);
        }
        self.ps.char_pos = end;
        self.push_entity(decl, false, pos)?;
        Ok(EntityInText::Pushed)
    }

    /// Report (or skip) a run of character data starting at `char_pos`.
    pub(crate) fn parse_text(&mut self) -> StepResult<bool> {
        loop {
            match self.text.phase {
                TextPhase::Idle => {
                    self.construct = Construct::Text;
                    self.text.or_chars = 0;
                    self.text.builder.clear();
                    self.text.after = AfterText::None;
                    if self.parsing_mode != ParsingMode::Full {
                        self.text.phase = TextPhase::SkipRest;
                        continue;
                    }
                    self.text.line = self.ps.line.line_no;
                    self.text.position = self.ps.line_position(self.ps.char_pos);
                    self.text.phase = TextPhase::First;
                }
                TextPhase::First => {
                    let chunk = ready!(self.parse_text_chunk()?);
                    if chunk.complete {
                        self.end_text();
                        let node_type = self.text_node_type(self.text.or_chars);
                        if chunk.len() == 0 || node_type == NodeType::None {
                            return self.ignored_text();
                        }
                        let slot = self.report_text(node_type);
                        self.nodes
                            .get_mut(slot)
                            .value
                            .set_buffer(chunk.start, chunk.len());
                        return Ok(Step::Ready(self.after_text_reported()));
                    }
                    if self.settings.whitespace_lookahead == WhitespaceLookahead::CacheAll {
                        self.push_chunk(chunk);
                        self.text.phase = TextPhase::CacheAll;
                        continue;
                    }
                    if self.text.or_chars > 0x20 {
                        self.end_text();
                        let slot = self.report_text(NodeType::Text);
                        self.nodes
                            .get_mut(slot)
                            .value
                            .set_buffer(chunk.start, chunk.len());
                        self.next_parsing_function = self.parsing_function;
                        self.set_function(ParsingFunction::PartialTextValue);
                        return Ok(Step::Ready(true));
                    }
                    self.push_chunk(chunk);
                    self.text.phase = TextPhase::WsLookahead;
                }
                TextPhase::CacheAll => {
                    let chunk = ready!(self.parse_text_chunk()?);
                    self.push_chunk(chunk);
                    if chunk.complete {
                        self.end_text();
                        let node_type = self.text_node_type(self.text.or_chars);
                        if node_type == NodeType::None || self.text.builder.is_empty() {
                            self.text.builder.clear();
                            return self.ignored_text();
                        }
                        self.report_built_text(node_type);
                        return Ok(Step::Ready(self.after_text_reported()));
                    }
                }
                TextPhase::WsLookahead => {
                    let chunk = ready!(self.parse_text_chunk()?);
                    self.push_chunk(chunk);
                    let long = self.text.builder.len() >= MIN_WHITESPACE_LOOKAHEAD;
                    if !(chunk.complete || self.text.or_chars > 0x20 || long) {
                        continue;
                    }
                    let node_type = if long {
                        NodeType::Text
                    } else {
                        self.text_node_type(self.text.or_chars)
                    };
                    if node_type == NodeType::None {
                        self.text.builder.clear();
                        if !chunk.complete {
                            self.text.phase = TextPhase::SkipRest;
                            continue;
                        }
                        self.end_text();
                        return self.ignored_text();
                    }
                    self.end_text();
                    self.report_built_text(node_type);
                    if !chunk.complete {
                        self.next_parsing_function = self.parsing_function;
                        self.set_function(ParsingFunction::PartialTextValue);
                        return Ok(Step::Ready(true));
                    }
                    return Ok(Step::Ready(self.after_text_reported()));
                }
                TextPhase::SkipRest => {
                    let chunk = ready!(self.parse_text_chunk()?);
                    if chunk.complete {
                        self.end_text();
                        return self.ignored_text();
                    }
                }
            }
        }
    }

    fn end_text(&mut self) {
        self.text.phase = TextPhase::Idle;
        self.construct = Construct::None;
    }

    fn push_chunk(&mut self, chunk: TextChunk) {
        push_slice(&mut self.text.builder, &self.ps.chars, chunk.start, chunk.end);
    }

    fn report_text(&mut self, node_type: NodeType) -> usize {
        let slot = self.nodes.add_node(self.index, self.index);
        self.cur = slot;
        let node = self.nodes.get_mut(slot);
        node.node_type = node_type;
        node.set_position(self.text.line, self.text.position);
        node.entity_id = self.ps.entity_id;
        slot
    }

    fn report_built_text(&mut self, node_type: NodeType) {
        let value = mem::take(&mut self.text.builder);
        let slot = self.report_text(node_type);
        self.nodes.get_mut(slot).value = NodeValue::owned(value);
    }

    /// Schedule what the scanner stopped at once the text node is consumed.
    pub(crate) fn after_text_reported(&mut self) -> bool {
        match mem::take(&mut self.text.after) {
            AfterText::None => {}
            AfterText::EntityReference => {
                self.next_parsing_function = self.parsing_function;
                self.set_function(ParsingFunction::EntityReference);
            }
            AfterText::EndEntity => {
                self.next_parsing_function = self.parsing_function;
                self.set_function(ParsingFunction::ReportEndEntity);
            }
        }
        true
    }

    /// No text node; report what the scanner stopped at, if anything.
    fn ignored_text(&mut self) -> StepResult<bool> {
        match mem::take(&mut self.text.after) {
            AfterText::None => Ok(Step::Ready(false)),
            AfterText::EndEntity => {
                self.setup_end_entity_node();
                Ok(Step::Ready(true))
            }
            AfterText::EntityReference => {
                ready!(self.parse_entity_reference_node()?);
                Ok(Step::Ready(true))
            }
        }
    }

    pub(crate) fn text_node_type(&self, or_chars: u32) -> NodeType {
        if or_chars > 0x20 {
            return NodeType::Text;
        }
        self.whitespace_node_type()
    }

    /// Node type for whitespace-only text, `None` when it is not reported.
    pub(crate) fn whitespace_node_type(&self) -> NodeType {
        match self.settings.effective_whitespace_handling() {
            WhitespaceHandling::None => NodeType::None,
            handling => {
                if self.xml_space() == XmlSpace::Preserve {
                    NodeType::SignificantWhitespace
                } else if handling == WhitespaceHandling::All {
                    NodeType::Whitespace
                } else {
                    NodeType::None
                }
            }
        }
    }

    /// Scan the rest of a partially reported text node into its value.
    pub(crate) fn finish_partial_value(&mut self) -> StepResult<()> {
        let slot = self.cur;
        loop {
            let chunk = ready!(self.parse_text_chunk()?);
            let chars = &self.ps.chars;
            let value = self.nodes.get_mut(slot).value.owned_mut(chars);
            push_slice(value, chars, chunk.start, chunk.end);
            if chunk.complete {
                break;
            }
        }
        self.set_function(self.next_parsing_function);
        self.after_text_reported();
        Ok(Step::Ready(()))
    }

    /// Scan past the rest of a partially reported text node.
    pub(crate) fn skip_partial_text_value(&mut self) -> StepResult<()> {
        loop {
            let chunk = ready!(self.parse_text_chunk()?);
            if chunk.complete {
                break;
            }
        }
        self.set_function(self.next_parsing_function);
        self.after_text_reported();
        Ok(Step::Ready(()))
    }
}
