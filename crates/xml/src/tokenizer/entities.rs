//! Character and entity references, and entity expansion.
//!
//! Entities referenced from content are expanded by pushing their
//! replacement text as a new active input; the tokenizer keeps scanning
//! there until it runs out and then pops back. Entities referenced from
//! attribute values are expanded at the string level, since the attribute
//! value is already fully buffered.

use std::sync::Arc;

use super::states::{Construct, EntityWalk, ParsingFunction, ParsingMode};
use super::{XmlTokenizer, buffer_str};
use crate::dtd::{EntityDecl, EntityKind, parse_char_ref, predefined_entity};
use crate::entity::resolve_uri;
use crate::error::{EntityError, ErrorKind, SyntaxError, UsageError, XmlError};
use crate::input::ParsingState;
use crate::names::AtomId;
use crate::nodes::NodeType;
use crate::step::{Step, StepResult, ready};

/// Result of looking at a `&` in the buffer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RefScan {
    /// The reference runs past the buffered characters.
    Incomplete,
    /// A character reference or predefined entity, ending at `end`.
    Char { ch: char, end: usize },
    General {
        name_start: usize,
        name_end: usize,
        end: usize,
    },
}

impl XmlTokenizer {
    /// Classify the reference starting at `chars[pos] == b'&'`.
    pub(crate) fn scan_reference(&self, pos: usize) -> Result<RefScan, XmlError> {
        let used = self.ps.chars_used;
        let chars = &self.ps.chars;
        let mut i = pos + 1;
        if i >= used {
            return self.incomplete_reference();
        }
        if chars[i] == b'#' {
            i += 1;
            let hex = i < used && chars[i] == b'x';
            if hex {
                i += 1;
            }
            let digits_start = i;
            loop {
                if i >= used {
                    return self.incomplete_reference();
                }
                let b = chars[i];
                let is_digit = if hex {
                    b.is_ascii_hexdigit()
                } else {
                    b.is_ascii_digit()
                };
                if is_digit {
                    i += 1;
                    continue;
                }
                if b == b';' && i > digits_start {
                    break;
                }
                return Err(self.error_at(SyntaxError::InvalidCharRef, pos));
            }
            let digits = buffer_str(chars, pos + 2, i);
            let Some(ch) = parse_char_ref(digits) else {
                let radix = if hex { 16 } else { 10 };
                let code_point = u32::from_str_radix(&digits[usize::from(hex)..], radix)
                    .unwrap_or(u32::MAX);
                return Err(self.error_at(SyntaxError::InvalidChar { code_point }, pos));
            };
            return Ok(RefScan::Char { ch, end: i + 1 });
        }
        let name_start = i;
        let (name_end, _) = self.scan_name(name_start, false)?;
        if name_end >= used {
            return self.incomplete_reference();
        }
        if name_end == name_start {
            return Err(self.unexpected_char(name_start, "entity name"));
        }
        if chars[name_end] != b';' {
            return Err(self.unexpected_char(name_end, "';'"));
        }
        let name = buffer_str(chars, name_start, name_end);
        if let Some(ch) = predefined_entity(name) {
            return Ok(RefScan::Char {
                ch,
                end: name_end + 1,
            });
        }
        Ok(RefScan::General {
            name_start,
            name_end,
            end: name_end + 1,
        })
    }

    fn incomplete_reference(&self) -> Result<RefScan, XmlError> {
        if self.ps.is_eof {
            return Err(self.eof_error("entity reference"));
        }
        Ok(RefScan::Incomplete)
    }

    /// Make `decl`'s replacement text the active input.
    pub(crate) fn push_entity(
        &mut self,
        decl: Arc<EntityDecl>,
        manual: bool,
        ref_pos: usize,
    ) -> Result<(), XmlError> {
        if self.entities.is_open(&self.ps, decl.id) {
            return Err(self.error_at(
                EntityError::Recursive {
                    name: decl.name.clone(),
                },
                ref_pos,
            ));
        }
        let buffer_size = self.settings.buffer_size;
        let base = decl.base_uri.clone().or_else(|| self.ps.base_uri.clone());
        let mut state = match &decl.kind {
            EntityKind::Internal { text } => {
                ParsingState::for_entity_text(text.clone(), buffer_size, base)
            }
            EntityKind::External {
                public_id,
                system_id,
            } => {
                let resolved = self
                    .resolver()
                    .resolve(base.as_ref(), public_id.as_deref(), system_id);
                match resolved {
                    Ok(Some(resolved)) => {
                        let uri = resolved
                            .uri
                            .or_else(|| resolve_uri(base.as_ref(), system_id));
                        ParsingState::new(resolved.input, buffer_size, uri)
                    }
                    Ok(None) => {
                        let uri = resolve_uri(base.as_ref(), system_id)
                            .map_or_else(|| system_id.clone(), |url| url.to_string());
                        return Err(self.error_at(ErrorKind::Unresolved { uri, cause: None }, ref_pos));
                    }
                    Err(err) => {
                        let uri = resolve_uri(base.as_ref(), system_id)
                            .map_or_else(|| system_id.clone(), |url| url.to_string());
                        return Err(self.error_at(
                            ErrorKind::Unresolved {
                                uri,
                                cause: Some(Arc::new(err)),
                            },
                            ref_pos,
                        ));
                    }
                }
            }
            EntityKind::Unparsed { .. } => {
                return Err(self.error_at(
                    EntityError::Unparsed {
                        name: decl.name.clone(),
                    },
                    ref_pos,
                ));
            }
        };
        state.entity_id = decl.id;
        state.entity_resolved_manually = manual;
        log::debug!(
            target: "xml.entity",
            "entering entity '{}' (depth {})",
            decl.name,
            self.entities.depth() + 1
        );
        state.entity = Some(decl);
        self.invalidate_values();
        self.entities.push(&mut self.ps, state);
        self.stats.entity_pushes = self.stats.entity_pushes.saturating_add(1);
        Ok(())
    }

    /// The active entity ran out. Pops it and returns whether it was
    /// resolved manually (an EndEntity node is due).
    pub(crate) fn handle_entity_end(&mut self, check_nesting: bool) -> Result<bool, XmlError> {
        if check_nesting && self.index > 0 {
            let open = self.nodes.get(self.index - 1);
            if open.node_type == NodeType::Element && open.entity_id == self.ps.entity_id {
                return Err(self.error_here(EntityError::CrossesBoundary));
            }
        }
        let manual = self.ps.entity_resolved_manually;
        self.invalidate_values();
        let finished = self.entities.pop(&mut self.ps);
        self.last_entity = finished.and_then(|ps| ps.entity);
        if let Some(entity) = &self.last_entity {
            log::debug!(target: "xml.entity", "leaving entity '{}'", entity.name);
        }
        Ok(manual)
    }

    /// Turn the EntityReference frame back into the current node as an
    /// EndEntity.
    pub(crate) fn setup_end_entity_node(&mut self) {
        self.index = self.index.saturating_sub(1);
        self.cur = self.index;
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(self.ps.char_pos);
        let node = self.nodes.get_mut(self.index);
        node.node_type = NodeType::EndEntity;
        node.value.clear();
        node.set_position(line, position);
        if self.index == 0 && self.parsing_function == ParsingFunction::ElementContent {
            self.set_function(ParsingFunction::DocumentContent);
        }
    }

    /// Report the general entity reference at `char_pos` as a node.
    pub(crate) fn parse_entity_reference_node(&mut self) -> StepResult<()> {
        self.construct = Construct::EntityRefNode;
        loop {
            let pos = self.ps.char_pos;
            match self.scan_reference(pos)? {
                RefScan::Incomplete => {
                    if ready!(self.read_data()?) == 0 {
                        return Err(self.eof_error("entity reference"));
                    }
                }
                RefScan::Char { .. } => {
                    self.construct = Construct::None;
                    return Err(self.error_at(SyntaxError::InvalidCharRef, pos));
                }
                RefScan::General {
                    name_start,
                    name_end,
                    end,
                } => {
                    let line = self.ps.line.line_no;
                    let position = self.ps.line_position(name_start);
                    let name = self
                        .names
                        .intern(buffer_str(&self.ps.chars, name_start, name_end));
                    self.ps.char_pos = end;
                    self.construct = Construct::None;
                    self.cur = self.nodes.add_node(self.index, self.index);
                    let node = self.nodes.get_mut(self.cur);
                    node.node_type = NodeType::EntityReference;
                    node.set_name(name, AtomId::EMPTY, name);
                    node.set_position(line, position);
                    node.entity_id = self.ps.entity_id;
                    return Ok(Step::Ready(()));
                }
            }
        }
    }

    pub fn can_resolve_entity(&self) -> bool {
        true
    }

    /// Expand the EntityReference node the reader is positioned on. The
    /// next `read()` (or `read_attribute_value()` for references inside an
    /// attribute value) returns the first node of the replacement text,
    /// and an EndEntity node follows its last one.
    pub fn resolve_entity(&mut self) -> Result<(), XmlError> {
        self.check_idle()?;
        self.resolve_entity_inner().inspect_err(|err| {
            if err.is_fatal() {
                self.fail(err.clone());
            }
        })
    }

    pub(crate) fn resolve_entity_inner(&mut self) -> Result<(), XmlError> {
        let node = self.nodes.get(self.cur);
        if node.node_type != NodeType::EntityReference {
            return Err(XmlError::usage(UsageError::NotOnEntityReference));
        }
        if self.parsing_function == ParsingFunction::InReadAttributeValue {
            let expansion = node.value.as_str(&self.ps.chars).to_string();
            let depth = node.depth + 1;
            let decl = self
                .dtd
                .as_ref()
                .and_then(|dtd| dtd.entity(self.names.resolve(node.name)))
                .cloned();
            if let Some(walk) = self.attr_walk.as_mut() {
                walk.entity = Some(EntityWalk {
                    decl,
                    expansion,
                    reported_text: false,
                    depth,
                });
            }
            return Ok(());
        }
        let name = self.names.resolve(node.name).to_string();
        let Some(decl) = self.dtd.as_ref().and_then(|dtd| dtd.entity(&name)).cloned() else {
            return Err(self.error_here(EntityError::Undeclared { name }));
        };
        let pos = self.ps.char_pos;
        self.push_entity(decl, true, pos)?;
        self.index += 1;
        self.cur = self.nodes.add_node(self.index, self.index);
        Ok(())
    }

    /// Normalized replacement text of general entity `name` referenced from
    /// an attribute value. `None` for an undeclared entity that is skipped.
    pub(crate) fn expand_in_attribute(
        &mut self,
        name: &str,
        ref_pos: usize,
        open: &mut Vec<u32>,
    ) -> Result<Option<String>, XmlError> {
        let Some(decl) = self.dtd.as_ref().and_then(|dtd| dtd.entity(name)).cloned() else {
            if self.settings.check_undeclared_entities {
                return Err(self.error_at(
                    EntityError::Undeclared {
                        name: name.to_string(),
                    },
                    ref_pos,
                ));
            }
            return Ok(None);
        };
        let name = decl.name.clone();
        if decl.is_unparsed() {
            return Err(self.error_at(EntityError::Unparsed { name }, ref_pos));
        }
        if decl.is_external() {
            return Err(self.error_at(EntityError::ExternalInAttribute { name }, ref_pos));
        }
        if self.standalone && decl.declared_externally {
            return Err(self.error_at(EntityError::ExternalInStandalone { name }, ref_pos));
        }
        if open.contains(&decl.id) || self.entities.is_open(&self.ps, decl.id) {
            return Err(self.error_at(EntityError::Recursive { name }, ref_pos));
        }
        let text = decl.text().unwrap_or("");
        open.push(decl.id);
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(ch) = rest.chars().next() {
            match ch {
                '\t' | '\n' | '\r' => {
                    out.push(' ');
                    rest = &rest[1..];
                }
                '<' => return Err(self.error_at(SyntaxError::LessThanInAttributeValue, ref_pos)),
                '&' => {
                    let Some(semi) = rest.find(';') else {
                        return Err(self.error_at(SyntaxError::InvalidCharRef, ref_pos));
                    };
                    let reference = &rest[1..semi];
                    if let Some(digits) = reference.strip_prefix('#') {
                        let ch = parse_char_ref(digits)
                            .ok_or_else(|| self.error_at(SyntaxError::InvalidCharRef, ref_pos))?;
                        out.push(ch);
                    } else if let Some(ch) = predefined_entity(reference) {
                        out.push(ch);
                    } else if let Some(nested) = self.expand_in_attribute(reference, ref_pos, open)? {
                        out.push_str(&nested);
                    }
                    rest = &rest[semi + 1..];
                }
                _ => {
                    out.push(ch);
                    rest = &rest[ch.len_utf8()..];
                }
            }
        }
        open.pop();
        if self.parsing_mode == ParsingMode::Full {
            self.count_entity_chars(out.chars().count() as u64)?;
        }
        Ok(Some(out))
    }
}
