use super::XmlTokenizer;
use super::states::{Op, ParsingFunction, ParsingMode, ReadState, SkipPhase};
use crate::nodes::NodeType;
use crate::step::{Step, StepResult, ready};

impl XmlTokenizer {
    /// Skip the children of the current element and move to the node after
    /// it. On any other node this is a `read()`.
    ///
    /// Content inside the skipped element is scanned in `SkipContent` mode:
    /// nothing is materialized, but well-formedness is still checked.
    pub fn skip(&mut self) -> StepResult<()> {
        self.run(Op::Skip, |this| {
            this.skip_inner().inspect_err(|_| {
                this.skip_phase = SkipPhase::Start;
                this.parsing_mode = ParsingMode::Full;
            })
        })
    }

    fn skip_inner(&mut self) -> StepResult<()> {
        loop {
            match self.skip_phase {
                SkipPhase::Start => {
                    if self.read_state != ReadState::Interactive {
                        return Ok(Step::Ready(()));
                    }
                    ready!(self.finish_incremental_reads()?);
                    if self.node_type() == NodeType::Attribute {
                        self.move_to_element_inner();
                    }
                    self.skip_phase = if self.node_type() == NodeType::Element
                        && !self.is_empty_element()
                    {
                        self.parsing_mode = ParsingMode::SkipContent;
                        SkipPhase::Skipping {
                            initial_depth: self.index,
                        }
                    } else {
                        SkipPhase::FinalRead
                    };
                }
                SkipPhase::Skipping { initial_depth } => {
                    loop {
                        let more = ready!(self.read_internal()?);
                        if !more || self.index <= initial_depth {
                            break;
                        }
                    }
                    self.parsing_mode = ParsingMode::Full;
                    self.skip_phase = SkipPhase::FinalRead;
                }
                SkipPhase::FinalRead => {
                    ready!(self.read_internal()?);
                    self.skip_phase = SkipPhase::Start;
                    return Ok(Step::Ready(()));
                }
            }
        }
    }

    /// Leave an attribute value walk, chunked read or binary read so that
    /// the current node is an ordinary one again.
    fn finish_incremental_reads(&mut self) -> StepResult<()> {
        ready!(self.resume_binary_finish()?);
        match self.parsing_function {
            ParsingFunction::InReadAttributeValue => self.finish_attribute_value_iterator(),
            ParsingFunction::InReadValueChunk => ready!(self.finish_read_value_chunk()?),
            ParsingFunction::InReadContentAsBinary
            | ParsingFunction::InReadElementContentAsBinary => {
                ready!(self.finish_read_content_as_binary()?)
            }
            _ => {}
        }
        Ok(Step::Ready(()))
    }
}
