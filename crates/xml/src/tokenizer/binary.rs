//! Base64 and BinHex content reads.
//!
//! A binary read decodes the text of a content run straight into the
//! caller's buffer. It parks the tokenizer in `InReadContentAsBinary` (or the
//! element variant) between calls; `read()` from there drops the rest of the
//! run.

use super::XmlTokenizer;
use super::content::can_read_content;
use super::states::{
    BinaryPhase, BinaryState, ElementBinaryPhase, FinishPhase, Op, ParsingFunction, ReadState,
    ValueSource,
};
use crate::decode::{ActiveDecoder, DecoderKind};
use crate::error::{UsageError, XmlError};
use crate::nodes::NodeType;
use crate::step::{Step, StepResult, ready};

impl XmlTokenizer {
    /// Decode Base64 content into `buf`. Returns the number of bytes
    /// written; `Ready(0)` once the content run is exhausted, leaving the
    /// reader on the node that ended it.
    pub fn read_content_as_base64(&mut self, buf: &mut [u8]) -> StepResult<usize> {
        self.read_content_as_binary(buf, DecoderKind::Base64)
    }

    pub fn read_content_as_bin_hex(&mut self, buf: &mut [u8]) -> StepResult<usize> {
        self.read_content_as_binary(buf, DecoderKind::BinHex)
    }

    /// Like `read_content_as_base64` but positioned on an element whose
    /// content is decoded. The final `Ready(0)` moves the reader past the
    /// element's end tag.
    pub fn read_element_content_as_base64(&mut self, buf: &mut [u8]) -> StepResult<usize> {
        self.read_element_content_as_binary(buf, DecoderKind::Base64)
    }

    pub fn read_element_content_as_bin_hex(&mut self, buf: &mut [u8]) -> StepResult<usize> {
        self.read_element_content_as_binary(buf, DecoderKind::BinHex)
    }

    fn check_decoder(&self, kind: DecoderKind) -> Result<(), XmlError> {
        match &self.binary.decoder {
            Some(decoder) if decoder.kind() != kind => {
                Err(XmlError::usage(UsageError::MixedContentReads))
            }
            _ => Ok(()),
        }
    }

    fn read_content_as_binary(&mut self, buf: &mut [u8], kind: DecoderKind) -> StepResult<usize> {
        self.run(Op::ReadContentBinary, |this| {
            if this.binary.element != ElementBinaryPhase::Start {
                return Err(XmlError::usage(UsageError::MixedContentReads));
            }
            if this.binary.decoder.is_some() {
                this.check_decoder(kind)?;
                return this.read_binary(buf, ParsingFunction::InReadContentAsBinary);
            }
            if this.read_state != ReadState::Interactive {
                return Ok(Step::Ready(0));
            }
            if this.parsing_function == ParsingFunction::InReadValueChunk {
                return Err(XmlError::usage(UsageError::MixedContentReads));
            }
            let node_type = this.node_type();
            if !can_read_content(node_type) {
                return Err(this.wrong_node_type("read_content_as_binary"));
            }
            this.binary.decoder = Some(ActiveDecoder::new(kind));
            if node_type.is_text_content() || node_type == NodeType::Attribute {
                this.begin_binary_value(ParsingFunction::InReadContentAsBinary);
            } else {
                this.binary.phase = BinaryPhase::Move;
            }
            this.read_binary(buf, ParsingFunction::InReadContentAsBinary)
        })
    }

    fn read_element_content_as_binary(
        &mut self,
        buf: &mut [u8],
        kind: DecoderKind,
    ) -> StepResult<usize> {
        self.run(Op::ReadElementContentBinary, |this| {
            this.element_binary(buf, kind).inspect_err(|err| {
                if err.is_fatal() {
                    this.reset_binary();
                }
            })
        })
    }

    fn element_binary(&mut self, buf: &mut [u8], kind: DecoderKind) -> StepResult<usize> {
        const FUNCTION: ParsingFunction = ParsingFunction::InReadElementContentAsBinary;
        loop {
            match self.binary.element {
                ElementBinaryPhase::Start => {
                    if self.binary.decoder.is_some() {
                        return Err(XmlError::usage(UsageError::MixedContentReads));
                    }
                    if self.read_state != ReadState::Interactive {
                        return Ok(Step::Ready(0));
                    }
                    if self.parsing_function == ParsingFunction::InReadValueChunk {
                        return Err(XmlError::usage(UsageError::MixedContentReads));
                    }
                    if self.node_type() != NodeType::Element {
                        return Err(self.wrong_node_type("read_element_content_as_binary"));
                    }
                    self.binary.element = ElementBinaryPhase::ReadOff {
                        was_empty: self.is_empty_element(),
                    };
                }
                ElementBinaryPhase::ReadOff { was_empty } => {
                    ready!(self.read_internal()?);
                    if was_empty {
                        self.binary.element = ElementBinaryPhase::Start;
                        return Ok(Step::Ready(0));
                    }
                    self.binary.decoder = Some(ActiveDecoder::new(kind));
                    if self.node_type().is_text_content() {
                        self.begin_binary_value(FUNCTION);
                    } else {
                        self.binary.phase = BinaryPhase::Move;
                    }
                    self.binary.element = ElementBinaryPhase::Decoding;
                }
                ElementBinaryPhase::Decoding => {
                    self.check_decoder(kind)?;
                    if buf.is_empty() {
                        return Ok(Step::Ready(0));
                    }
                    let written = ready!(self.read_binary(buf, FUNCTION)?);
                    if written > 0 {
                        return Ok(Step::Ready(written));
                    }
                    let node_type = self.node_type();
                    self.restore_binary_function();
                    self.reset_binary();
                    match node_type {
                        NodeType::EndElement => {}
                        NodeType::Element => {
                            return Err(XmlError::usage(UsageError::ElementHasChildren));
                        }
                        _ => return Err(self.wrong_node_type("read_element_content_as_binary")),
                    }
                    self.binary.element = ElementBinaryPhase::FinalRead;
                }
                ElementBinaryPhase::FinalRead => {
                    ready!(self.read_internal()?);
                    self.binary.element = ElementBinaryPhase::Start;
                    return Ok(Step::Ready(0));
                }
            }
        }
    }

    /// Start decoding the value of the current node.
    fn begin_binary_value(&mut self, function: ParsingFunction) {
        self.binary.source = if self.has_partial_value() {
            ValueSource::Partial
        } else {
            ValueSource::Cached
        };
        self.binary.offset = 0;
        self.binary.phase = BinaryPhase::Value;
        self.binary.restore = Some((self.parsing_function, self.next_parsing_function));
        self.set_function(function);
    }

    fn restore_binary_function(&mut self) {
        if let Some((function, next)) = self.binary.restore.take() {
            self.set_function(function);
            self.next_parsing_function = next;
        }
    }

    fn reset_binary(&mut self) {
        self.binary = BinaryState::default();
    }

    fn read_binary(&mut self, buf: &mut [u8], function: ParsingFunction) -> StepResult<usize> {
        let mut written = 0;
        loop {
            match self.binary.phase {
                BinaryPhase::End => return Ok(Step::Ready(written)),
                BinaryPhase::Value => {
                    if written == buf.len() {
                        return Ok(Step::Ready(written));
                    }
                    let result = match self.binary.decoder.as_mut() {
                        Some(decoder) => {
                            let value = self.nodes.get(self.cur).value.as_str(&self.ps.chars);
                            let input = value.as_bytes().get(self.binary.offset..).unwrap_or(&[]);
                            decoder
                                .get_mut()
                                .decode(input, &mut buf[written..])
                                .map(|decoded| (decoded, input.len()))
                        }
                        None => return Ok(Step::Ready(written)),
                    };
                    let (decoded, available) = result.map_err(|kind| self.error_here(kind))?;
                    self.binary.offset += decoded.consumed;
                    written += decoded.written;
                    if decoded.consumed < available {
                        continue;
                    }
                    if self.binary.source == ValueSource::Partial {
                        let chunk = match self.parse_text_chunk()? {
                            Step::Ready(chunk) => chunk,
                            Step::NeedMoreInput if written > 0 => return Ok(Step::Ready(written)),
                            Step::NeedMoreInput => return Ok(Step::NeedMoreInput),
                        };
                        self.nodes
                            .get_mut(self.cur)
                            .value
                            .set_buffer(chunk.start, chunk.len());
                        self.binary.offset = 0;
                        if chunk.complete {
                            let restore = self.binary.restore.take();
                            self.binary.restore = restore.map(|restore| self.complete_partial(restore));
                            self.binary.source = ValueSource::Cached;
                            self.set_function(function);
                        }
                        continue;
                    }
                    self.binary.phase = BinaryPhase::Move;
                    if written > 0 {
                        return Ok(Step::Ready(written));
                    }
                }
                BinaryPhase::Move => {
                    self.restore_binary_function();
                    if ready!(self.move_to_next_content_node(true)?) {
                        self.begin_binary_value(function);
                        continue;
                    }
                    self.binary.phase = BinaryPhase::End;
                    self.binary.restore = Some((self.parsing_function, self.next_parsing_function));
                    self.set_function(function);
                    if let Some(decoder) = self.binary.decoder.as_mut()
                        && let Err(kind) = decoder.get_mut().finish()
                    {
                        return Err(self.error_here(kind));
                    }
                    return Ok(Step::Ready(written));
                }
            }
        }
    }

    /// `read()` while a binary read owns the node: drop the rest of the
    /// content run. For an element read the run must end at the element's
    /// end tag.
    pub(crate) fn finish_read_content_as_binary(&mut self) -> StepResult<()> {
        loop {
            match self.binary.finish {
                FinishPhase::Start => {
                    if self.binary.source == ValueSource::Partial {
                        self.binary.finish = FinishPhase::SkipPartial;
                    } else {
                        self.restore_binary_function();
                        self.binary.finish = FinishPhase::Walk;
                    }
                }
                FinishPhase::SkipPartial => {
                    loop {
                        let chunk = ready!(self.parse_text_chunk()?);
                        if chunk.complete {
                            break;
                        }
                    }
                    if let Some(restore) = self.binary.restore.take() {
                        self.complete_partial(restore);
                    }
                    self.binary.source = ValueSource::Cached;
                    self.binary.finish = FinishPhase::Walk;
                }
                FinishPhase::Walk => {
                    if self.binary.phase != BinaryPhase::End {
                        while ready!(self.move_to_next_content_node(true)?) {}
                    }
                    let element = self.binary.element != ElementBinaryPhase::Start;
                    self.reset_binary();
                    if element && !self.node_is(self.cur, NodeType::EndElement) {
                        return Err(XmlError::usage(UsageError::ElementHasChildren));
                    }
                    return Ok(Step::Ready(()));
                }
            }
        }
    }

    /// A suspended `finish_read_content_as_binary` walk has already restored
    /// the parsing function, so `read()` resumes it here.
    pub(crate) fn resume_binary_finish(&mut self) -> StepResult<()> {
        if self.binary.finish == FinishPhase::Walk {
            return self.finish_read_content_as_binary();
        }
        Ok(Step::Ready(()))
    }
}
