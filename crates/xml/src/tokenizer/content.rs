//! Typed and chunked content reads.
//!
//! These walk the text-like nodes of a content run (Text, CDATA and both
//! whitespace kinds), skipping comments, PIs and entity boundaries, and
//! stop at the first node that is none of these.

use std::mem;

use super::XmlTokenizer;
use super::states::{
    ContentPhase, ElementContentPhase, Op, ParsingFunction, ReadState, Restore, StringPhase,
    ValueSource,
};
use crate::convert::FromXmlValue;
use crate::error::{UsageError, XmlError};
use crate::nodes::NodeType;
use crate::step::{Step, StepResult, ready};

/// Nodes a content read may start on.
pub(crate) fn can_read_content(node_type: NodeType) -> bool {
    matches!(
        node_type,
        NodeType::Attribute
            | NodeType::Text
            | NodeType::CData
            | NodeType::Whitespace
            | NodeType::SignificantWhitespace
            | NodeType::ProcessingInstruction
            | NodeType::Comment
            | NodeType::EndElement
            | NodeType::EndEntity
            | NodeType::EntityReference
    )
}

impl XmlTokenizer {
    pub(crate) fn wrong_node_type(&self, operation: &'static str) -> XmlError {
        XmlError::usage(UsageError::WrongNodeType {
            operation,
            node_type: self.node_type().as_str(),
        })
    }

    /// Reject a content read while another incremental read owns the node.
    pub(crate) fn check_no_incremental_read(&self) -> Result<(), XmlError> {
        match self.parsing_function {
            ParsingFunction::InReadValueChunk
            | ParsingFunction::InReadContentAsBinary
            | ParsingFunction::InReadElementContentAsBinary => {
                Err(XmlError::usage(UsageError::MixedContentReads))
            }
            _ => Ok(()),
        }
    }

    /// Advance inside the content run: through the attribute value while
    /// walking one, otherwise to the next node.
    fn advance_content(&mut self) -> StepResult<bool> {
        if self.parsing_function == ParsingFunction::InReadAttributeValue {
            return Ok(Step::Ready(self.attribute_value_step()));
        }
        self.read_internal()
    }

    /// Position on the next text-like node of the current content run.
    /// With `move_if_on_content` the current node is left even if it is
    /// text-like. Returns false at the first node that ends the run.
    pub(crate) fn move_to_next_content_node(&mut self, move_if_on_content: bool) -> StepResult<bool> {
        if !self.walk.active {
            self.walk.active = true;
            self.walk.move_if_on_content = move_if_on_content;
            self.walk.read_pending = false;
        }
        loop {
            if self.walk.read_pending {
                let more = ready!(self.advance_content().inspect_err(|_| self.walk.active = false)?);
                self.walk.read_pending = false;
                if !more {
                    self.walk.active = false;
                    return Ok(Step::Ready(false));
                }
            }
            match self.nodes.get(self.cur).node_type {
                NodeType::Attribute => {
                    self.walk.active = false;
                    return Ok(Step::Ready(!self.walk.move_if_on_content));
                }
                node_type if node_type.is_text_content() => {
                    if !self.walk.move_if_on_content {
                        self.walk.active = false;
                        return Ok(Step::Ready(true));
                    }
                }
                NodeType::ProcessingInstruction | NodeType::Comment | NodeType::EndEntity => {}
                NodeType::EntityReference => {
                    if let Err(err) = self.resolve_entity_inner() {
                        self.walk.active = false;
                        return Err(err);
                    }
                }
                _ => {
                    self.walk.active = false;
                    return Ok(Step::Ready(false));
                }
            }
            self.walk.move_if_on_content = false;
            self.walk.read_pending = true;
        }
    }

    /// Concatenated text of the content run starting at the current node.
    pub fn read_content_as_string(&mut self) -> StepResult<String> {
        self.run(Op::ReadContent, |this| {
            if !this.content.active {
                if this.read_state != ReadState::Interactive {
                    return Ok(Step::Ready(String::new()));
                }
                this.check_no_incremental_read()?;
                let node_type = this.node_type();
                if !can_read_content(node_type) {
                    return Err(this.wrong_node_type("read_content_as"));
                }
                if node_type == NodeType::Attribute {
                    return Ok(Step::Ready(this.value().to_string()));
                }
            }
            this.content_string()
                .inspect_err(|_| this.content.active = false)
        })
    }

    pub fn read_content_as<T: FromXmlValue>(&mut self) -> StepResult<T> {
        let text = ready!(self.read_content_as_string()?);
        self.convert(&text)
    }

    fn convert<T: FromXmlValue>(&self, text: &str) -> StepResult<T> {
        T::from_xml_value(text, self)
            .map(Step::Ready)
            .map_err(|kind| self.error_here(kind))
    }

    fn content_string(&mut self) -> StepResult<String> {
        if !self.content.active {
            self.content.active = true;
            self.content.phase = ContentPhase::Examine;
            self.content.acc.clear();
        }
        loop {
            match self.content.phase {
                ContentPhase::Examine => match self.nodes.get(self.cur).node_type {
                    node_type if node_type.is_text_content() => {
                        self.content.phase = ContentPhase::FinishValue;
                    }
                    NodeType::ProcessingInstruction | NodeType::Comment | NodeType::EndEntity => {
                        self.content.phase = ContentPhase::Read;
                    }
                    NodeType::EntityReference => {
                        self.resolve_entity_inner()
                            .inspect_err(|_| self.content.active = false)?;
                        self.content.phase = ContentPhase::Read;
                    }
                    _ => {
                        self.content.active = false;
                        return Ok(Step::Ready(mem::take(&mut self.content.acc)));
                    }
                },
                ContentPhase::FinishValue => {
                    if self.has_partial_value() {
                        ready!(self.finish_partial_value()?);
                    }
                    let value = self.nodes.get(self.cur).value.as_str(&self.ps.chars);
                    self.content.acc.push_str(value);
                    self.content.phase = ContentPhase::Read;
                }
                ContentPhase::Read => {
                    let more = ready!(self.advance_content()?);
                    self.content.phase = ContentPhase::Examine;
                    if !more {
                        self.content.active = false;
                        return Ok(Step::Ready(mem::take(&mut self.content.acc)));
                    }
                }
            }
        }
    }

    /// Text content of the current element, which must not have child
    /// elements. The reader ends up after the element's end tag.
    pub fn read_element_content_as_string(&mut self) -> StepResult<String> {
        self.run(Op::ReadElementContent, |this| {
            this.element_content_string().inspect_err(|_| {
                this.element_content = ElementContentPhase::Start;
                this.content.active = false;
            })
        })
    }

    fn element_content_string(&mut self) -> StepResult<String> {
        loop {
            match self.element_content {
                ElementContentPhase::Start => {
                    if self.node_type() != NodeType::Element {
                        return Err(self.wrong_node_type("read_element_content_as"));
                    }
                    self.element_content = ElementContentPhase::ReadOff {
                        was_empty: self.is_empty_element(),
                    };
                }
                ElementContentPhase::ReadOff { was_empty } => {
                    ready!(self.read_internal()?);
                    if was_empty {
                        self.element_content = ElementContentPhase::Start;
                        return Ok(Step::Ready(String::new()));
                    }
                    match self.node_type() {
                        NodeType::EndElement => {
                            self.element_content = ElementContentPhase::ReadOffEnd;
                        }
                        NodeType::Element => {
                            self.element_content = ElementContentPhase::Start;
                            return Err(XmlError::usage(UsageError::ElementHasChildren));
                        }
                        _ => self.element_content = ElementContentPhase::Content,
                    }
                }
                ElementContentPhase::ReadOffEnd => {
                    ready!(self.read_internal()?);
                    self.element_content = ElementContentPhase::Start;
                    return Ok(Step::Ready(String::new()));
                }
                ElementContentPhase::Content => {
                    let text = ready!(self.content_string()?);
                    if self.node_type() != NodeType::EndElement {
                        self.element_content = ElementContentPhase::Start;
                        return Err(XmlError::usage(UsageError::ElementHasChildren));
                    }
                    self.content.acc = text;
                    self.element_content = ElementContentPhase::FinalRead;
                }
                ElementContentPhase::FinalRead => {
                    ready!(self.read_internal()?);
                    self.element_content = ElementContentPhase::Start;
                    return Ok(Step::Ready(mem::take(&mut self.content.acc)));
                }
            }
        }
    }

    pub fn read_element_content_as<T: FromXmlValue>(&mut self) -> StepResult<T> {
        let text = ready!(self.read_element_content_as_string()?);
        self.convert(&text)
    }

    /// Concatenated text of the current element or text run. On an element
    /// the reader moves into its content first; it stops on the first node
    /// that is not text-like.
    pub fn read_string(&mut self) -> StepResult<String> {
        self.run(Op::ReadString, |this| {
            this.string_content()
                .inspect_err(|_| this.string_read.phase = StringPhase::Start)
        })
    }

    fn string_content(&mut self) -> StepResult<String> {
        loop {
            match self.string_read.phase {
                StringPhase::Start => {
                    if self.read_state != ReadState::Interactive {
                        return Ok(Step::Ready(String::new()));
                    }
                    self.check_no_incremental_read()?;
                    self.move_to_element_inner();
                    self.string_read.acc.clear();
                    if self.node_type() == NodeType::Element {
                        if self.is_empty_element() {
                            return Ok(Step::Ready(String::new()));
                        }
                        self.string_read.phase = StringPhase::ReadIntoContent;
                    } else {
                        self.string_read.phase = StringPhase::Examine;
                    }
                }
                StringPhase::ReadIntoContent => {
                    let more = ready!(self.read_internal()?);
                    if !more || self.node_type() == NodeType::EndElement {
                        self.string_read.phase = StringPhase::Start;
                        return Ok(Step::Ready(String::new()));
                    }
                    self.string_read.phase = StringPhase::Examine;
                }
                StringPhase::Examine => {
                    if !self.node_type().is_text_content() {
                        self.string_read.phase = StringPhase::Start;
                        return Ok(Step::Ready(mem::take(&mut self.string_read.acc)));
                    }
                    self.string_read.phase = StringPhase::FinishValue;
                }
                StringPhase::FinishValue => {
                    if self.has_partial_value() {
                        ready!(self.finish_partial_value()?);
                    }
                    let value = self.nodes.get(self.cur).value.as_str(&self.ps.chars);
                    self.string_read.acc.push_str(value);
                    self.string_read.phase = StringPhase::Read;
                }
                StringPhase::Read => {
                    let more = ready!(self.read_internal()?);
                    self.string_read.phase = StringPhase::Examine;
                    if !more {
                        self.string_read.phase = StringPhase::Start;
                        return Ok(Step::Ready(mem::take(&mut self.string_read.acc)));
                    }
                }
            }
        }
    }

    /// Copy up to `max_chars` characters of the current node's value into
    /// `out`, continuing where the previous call stopped. `Ready(0)` once
    /// the value is exhausted. Long text is scanned chunk by chunk and never
    /// materialized as a whole.
    pub fn read_value_chunk(&mut self, out: &mut String, max_chars: usize) -> StepResult<usize> {
        self.run(Op::ReadValueChunk, |this| {
            if this.parsing_function != ParsingFunction::InReadValueChunk {
                if this.read_state != ReadState::Interactive {
                    return Ok(Step::Ready(0));
                }
                if matches!(
                    this.parsing_function,
                    ParsingFunction::InReadContentAsBinary
                        | ParsingFunction::InReadElementContentAsBinary
                ) {
                    return Err(XmlError::usage(UsageError::MixedContentReads));
                }
                if !this.node_type().has_value() {
                    return Err(this.wrong_node_type("read_value_chunk"));
                }
                if max_chars == 0 {
                    return Ok(Step::Ready(0));
                }
                this.begin_value_chunk();
            }
            this.value_chunk_step(out, max_chars)
        })
    }

    fn begin_value_chunk(&mut self) {
        self.value_chunk.source = if self.has_partial_value() {
            ValueSource::Partial
        } else {
            ValueSource::Cached
        };
        self.value_chunk.offset = 0;
        self.value_chunk.restore = Some((self.parsing_function, self.next_parsing_function));
        self.set_function(ParsingFunction::InReadValueChunk);
    }

    fn value_chunk_step(&mut self, out: &mut String, max_chars: usize) -> StepResult<usize> {
        let mut copied = 0;
        loop {
            let value = self.nodes.get(self.cur).value.as_str(&self.ps.chars);
            let rest = value.get(self.value_chunk.offset..).unwrap_or("");
            let mut taken = 0;
            for ch in rest.chars().take(max_chars - copied) {
                out.push(ch);
                taken += ch.len_utf8();
                copied += 1;
            }
            self.value_chunk.offset += taken;
            if copied == max_chars || self.value_chunk.source == ValueSource::Cached {
                return Ok(Step::Ready(copied));
            }
            let chunk = match self.parse_text_chunk()? {
                Step::Ready(chunk) => chunk,
                Step::NeedMoreInput if copied > 0 => return Ok(Step::Ready(copied)),
                Step::NeedMoreInput => return Ok(Step::NeedMoreInput),
            };
            self.nodes
                .get_mut(self.cur)
                .value
                .set_buffer(chunk.start, chunk.len());
            self.value_chunk.offset = 0;
            if chunk.complete {
                let restore = self.value_chunk.restore.take();
                self.value_chunk.restore = restore.map(|restore| self.complete_partial(restore));
                self.value_chunk.source = ValueSource::Cached;
                self.set_function(ParsingFunction::InReadValueChunk);
            }
        }
    }

    /// The text of a partially reported node has been scanned to its end:
    /// resume where `PartialTextValue` would have and return the functions
    /// to restore once the incremental read is left.
    pub(crate) fn complete_partial(&mut self, restore: Restore) -> Restore {
        self.set_function(restore.1);
        self.after_text_reported();
        (self.parsing_function, self.next_parsing_function)
    }

    /// `read()` after `read_value_chunk`: drop the rest of the value.
    pub(crate) fn finish_read_value_chunk(&mut self) -> StepResult<()> {
        if self.value_chunk.source == ValueSource::Partial {
            loop {
                let chunk = ready!(self.parse_text_chunk()?);
                if chunk.complete {
                    break;
                }
            }
            let restore = self.value_chunk.restore.take();
            self.value_chunk.restore = restore.map(|restore| self.complete_partial(restore));
            self.value_chunk.source = ValueSource::Cached;
        }
        if let Some((function, next)) = self.value_chunk.restore.take() {
            self.set_function(function);
            self.next_parsing_function = next;
        }
        self.value_chunk.offset = 0;
        Ok(Step::Ready(()))
    }
}
