//! `<!DOCTYPE ...>`: name, external id and internal subset. The subset text
//! is handed to the configured `DtdParser`.

use tools::chars::is_pubid_char;

use super::states::{Construct, ParsingFunction, Prescan};
use super::{XmlTokenizer, buffer_str};
use crate::dtd::{DtdContext, DtdInfo};
use crate::error::{SyntaxError, XmlError};
use crate::names::AtomId;
use crate::nodes::{NodeType, NodeValue};
use crate::settings::DtdProcessing;
use crate::step::{Step, StepResult, ready};

impl XmlTokenizer {
    /// `char_pos` is just past `<!DOCTYPE`.
    pub(crate) fn parse_doctype(&mut self) -> StepResult<bool> {
        if self.construct != Construct::Doctype {
            self.construct = Construct::Doctype;
            self.markup.line = self.ps.line.line_no;
            self.markup.position = self.ps.line_position(self.ps.char_pos);
        }
        ready!(self.prescan_doctype()?);
        self.construct = Construct::None;
        self.doctype_seen = true;
        self.parse_doctype_decl()
    }

    /// Buffer the whole declaration, skipping `>` inside literals, the
    /// internal subset, and comments or PIs within it.
    fn prescan_doctype(&mut self) -> StepResult<()> {
        loop {
            let base = self.ps.char_pos;
            let used = self.ps.chars_used;
            let mut pos = base + self.prescan.rel;
            let mut state = self.prescan;
            match scan_doctype(&self.ps.chars[..used], &mut pos, &mut state) {
                Some(_) => {
                    self.prescan = Prescan::default();
                    return Ok(Step::Ready(()));
                }
                None => {
                    self.prescan = state;
                    self.prescan.rel = pos - base;
                }
            }
            if ready!(self.read_data()?) == 0 {
                self.prescan = Prescan::default();
                return Ok(Step::Ready(()));
            }
        }
    }

    fn parse_doctype_decl(&mut self) -> StepResult<bool> {
        let mut pos = self.ps.char_pos;
        let after_keyword = self.eat_whitespace(pos);
        if after_keyword == pos {
            return Err(self.error_at(SyntaxError::ExpectedWhitespace, pos));
        }
        pos = after_keyword;
        let (name_end, _) = self.scan_name(pos, self.settings.namespaces)?;
        if name_end >= self.ps.chars_used {
            return Err(self.eof_error("DOCTYPE"));
        }
        if name_end == pos {
            return Err(self.unexpected_char(pos, "name"));
        }
        let name_line = self.ps.line.line_no;
        let name_position = self.ps.line_position(pos);
        let name = buffer_str(&self.ps.chars, pos, name_end).to_string();
        pos = self.eat_whitespace(name_end);

        let mut public_id = None;
        let mut system_id = None;
        if self.ps.chars[pos..self.ps.chars_used].starts_with(b"PUBLIC") {
            pos = self.require_whitespace(pos + 6)?;
            let (literal, end) = self.parse_literal(pos)?;
            if let Some(bad) = literal.chars().find(|&ch| !is_pubid_char(ch)) {
                return Err(self.error_at(
                    SyntaxError::UnexpectedChar {
                        found: bad,
                        expected: "public id character",
                    },
                    pos,
                ));
            }
            public_id = Some(literal);
            pos = self.require_whitespace(end)?;
            let (literal, end) = self.parse_literal(pos)?;
            system_id = Some(literal);
            pos = self.eat_whitespace(end);
        } else if self.ps.chars[pos..self.ps.chars_used].starts_with(b"SYSTEM") {
            pos = self.require_whitespace(pos + 6)?;
            let (literal, end) = self.parse_literal(pos)?;
            system_id = Some(literal);
            pos = self.eat_whitespace(end);
        }

        let mut subset = String::new();
        let mut origin = (name_line, name_position);
        if self.ps.chars[pos] == b'[' {
            pos += 1;
            origin = (self.ps.line.line_no, self.ps.line_position(pos));
            let mut end = pos;
            let mut state = Prescan {
                depth: 1,
                ..Prescan::default()
            };
            let used = self.ps.chars_used;
            // stops at the `]` that closes the subset
            if !scan_subset(&self.ps.chars[..used], &mut end, &mut state) {
                return Err(self.eof_error("DOCTYPE internal subset"));
            }
            subset = normalize_newlines(buffer_str(&self.ps.chars, pos, end));
            self.track_lines(pos, end);
            pos = self.eat_whitespace(end + 1);
        }
        if pos >= self.ps.chars_used {
            return Err(self.eof_error("DOCTYPE"));
        }
        if self.ps.chars[pos] != b'>' {
            return Err(self.unexpected_char(pos, "'>'"));
        }
        self.ps.char_pos = pos + 1;

        if self.settings.dtd_processing == DtdProcessing::Ignore {
            log::debug!(target: "xml.dtd", "DOCTYPE '{name}' ignored");
            return Ok(Step::Ready(false));
        }
        let mut info = DtdInfo::new(name.clone());
        info.public_id = public_id.clone();
        info.system_id = system_id.clone();
        info.internal_subset = subset.clone();
        self.load_dtd(&mut info, &subset, origin)?;
        log::debug!(
            target: "xml.dtd",
            "DOCTYPE '{name}' parsed: {} general entities",
            info.entity_count()
        );
        self.dtd = Some(info);

        let atom = self.names.intern(&name);
        self.cur = self.nodes.add_node(self.index, self.index);
        let node = self.nodes.get_mut(self.cur);
        node.node_type = NodeType::DocumentType;
        node.set_name(atom, AtomId::EMPTY, atom);
        node.set_position(name_line, name_position);
        node.value = NodeValue::owned(subset);
        self.attr_count = 0;
        for (key, value) in [("PUBLIC", public_id), ("SYSTEM", system_id)] {
            let Some(value) = value else {
                continue;
            };
            let atom = self.names.intern(key);
            self.attr_count += 1;
            let slot = self.nodes.add_node(self.index + self.attr_count, self.index + 1);
            let attr = self.nodes.get_mut(slot);
            attr.node_type = NodeType::Attribute;
            attr.set_name(atom, AtomId::EMPTY, atom);
            attr.set_position(name_line, name_position);
            attr.value = NodeValue::owned(value);
        }
        self.next_parsing_function = self.parsing_function;
        self.set_function(ParsingFunction::ResetAttributesRootLevel);
        Ok(Step::Ready(true))
    }

    fn load_dtd(
        &mut self,
        info: &mut DtdInfo,
        subset: &str,
        origin: (usize, usize),
    ) -> Result<(), XmlError> {
        let base = self.ps.base_uri.clone();
        let system_id = info.system_id.clone();
        let public_id = info.public_id.clone();
        let (resolver, parser) = self.resolver_and_parser();
        let mut ctx = DtdContext::new(info, resolver, base, origin);
        parser.parse_internal_subset(&mut ctx, subset)?;
        let Some(system_id) = system_id else {
            return Ok(());
        };
        match ctx.open_external(public_id.as_deref(), &system_id)? {
            Some(external) => ctx.with_external(external.uri.clone(), |ctx| {
                parser.parse_external_subset(ctx, &external.text)
            }),
            None => {
                log::debug!(
                    target: "xml.dtd",
                    "external subset '{system_id}' not resolved; skipped"
                );
                Ok(())
            }
        }
    }

    fn require_whitespace(&mut self, pos: usize) -> Result<usize, XmlError> {
        let end = self.eat_whitespace(pos);
        if end == pos {
            return Err(self.error_at(SyntaxError::ExpectedWhitespace, pos));
        }
        Ok(end)
    }

    /// A quoted literal at `pos`; returns its text and the offset after the
    /// closing quote.
    fn parse_literal(&mut self, pos: usize) -> Result<(String, usize), XmlError> {
        let quote = self.ps.chars[pos];
        if quote != b'"' && quote != b'\'' {
            return Err(self.unexpected_char(pos, "'\"' or '''"));
        }
        let start = pos + 1;
        let Some(len) = memchr::memchr(quote, &self.ps.chars[start..self.ps.chars_used]) else {
            return Err(self.eof_error("DOCTYPE literal"));
        };
        self.track_lines(start, start + len);
        let text = normalize_newlines(buffer_str(&self.ps.chars, start, start + len));
        Ok((text, start + len + 1))
    }
}

/// Advance `pos` through DOCTYPE text; returns the offset of the closing
/// `>` or `None` when the buffer ran out first.
fn scan_doctype(chars: &[u8], pos: &mut usize, state: &mut Prescan) -> Option<usize> {
    while *pos < chars.len() {
        if state.depth > 0 {
            if !scan_subset(chars, pos, state) {
                return None;
            }
            *pos += 1;
            state.depth = 0;
            continue;
        }
        let b = chars[*pos];
        if state.quote != 0 {
            if b == state.quote {
                state.quote = 0;
            }
        } else {
            match b {
                b'"' | b'\'' => state.quote = b,
                b'[' => state.depth = 1,
                b'>' => return Some(*pos),
                _ => {}
            }
        }
        *pos += 1;
    }
    None
}

/// Advance `pos` to the `]` closing an internal subset. Returns false when
/// the buffer ran out first; `pos` then marks where to resume.
fn scan_subset(chars: &[u8], pos: &mut usize, state: &mut Prescan) -> bool {
    let len = chars.len();
    while *pos < len {
        let b = chars[*pos];
        if state.in_comment {
            if *pos + 3 > len {
                return false;
            }
            if &chars[*pos..*pos + 3] == b"-->" {
                state.in_comment = false;
                *pos += 3;
            } else {
                *pos += 1;
            }
            continue;
        }
        if state.in_pi {
            if *pos + 2 > len {
                return false;
            }
            if &chars[*pos..*pos + 2] == b"?>" {
                state.in_pi = false;
                *pos += 2;
            } else {
                *pos += 1;
            }
            continue;
        }
        if state.quote != 0 {
            if b == state.quote {
                state.quote = 0;
            }
            *pos += 1;
            continue;
        }
        match b {
            b'"' | b'\'' => state.quote = b,
            b']' => return true,
            b'<' => {
                if *pos + 4 > len {
                    return false;
                }
                if &chars[*pos + 1..*pos + 4] == b"!--" {
                    state.in_comment = true;
                    *pos += 4;
                    continue;
                }
                if chars[*pos + 1] == b'?' {
                    state.in_pi = true;
                    *pos += 2;
                    continue;
                }
            }
            _ => {}
        }
        *pos += 1;
    }
    false
}

fn normalize_newlines(text: &str) -> String {
    if !text.contains('\r') {
        return text.to_string();
    }
    text.replace("\r\n", "\n").replace('\r', "\n")
}

#[cfg(test)]
mod scan_tests {
    use super::*;

    #[test]
    fn doctype_end_skips_subset_literals_and_comments() {
        let text = b"<!DOCTYPE a [<!ENTITY x '>'><!-- ] > --><?pi > ?>]>rest";
        let mut pos = 9;
        let mut state = Prescan::default();
        let end = scan_doctype(text, &mut pos, &mut state);
        assert_eq!(end, Some(text.len() - 5));
    }

    #[test]
    fn doctype_scan_resumes_after_running_out() {
        let text = b" a [<!ENTITY x '>";
        let mut pos = 0;
        let mut state = Prescan::default();
        assert_eq!(scan_doctype(text, &mut pos, &mut state), None);
        assert_eq!(state.depth, 1);
        assert_eq!(state.quote, b'\'');
    }

    #[test]
    fn newlines_are_normalized() {
        assert_eq!(normalize_newlines("a\r\nb\rc"), "a\nb\nc");
    }
}
