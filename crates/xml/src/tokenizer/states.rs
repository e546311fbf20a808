//! Tokenizer state definitions.
//!
//! `ParsingFunction` is the "where to resume" tag of the state machine. The
//! remaining types carry the locals a routine needs to pick up again after
//! it returned `NeedMoreInput`.

use std::sync::Arc;

use crate::decode::ActiveDecoder;
use crate::dtd::EntityDecl;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParsingFunction {
    ElementContent,
    DocumentContent,
    /// Initial state: look for the XML declaration.
    SwitchToInteractiveXmlDecl,
    /// Drop the pseudo-attributes of an XmlDeclaration/DocumentType node.
    ResetAttributesRootLevel,
    /// The start tag just reported was not empty; descend into its content.
    MoveToElementContent,
    /// Pop the namespace and xml:space scopes of the element just closed.
    PopElementContext,
    /// Same for an empty element, which is reported only once.
    PopEmptyElementContext,
    /// Report the entity reference the text scanner stopped at.
    EntityReference,
    ReportEndEntity,
    InReadAttributeValue,
    /// The current Text node was reported before its end was scanned.
    PartialTextValue,
    InReadValueChunk,
    InReadContentAsBinary,
    InReadElementContentAsBinary,
    Eof,
    Error,
    Closed,
}

/// Public lifecycle of a reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadState {
    Initial,
    Interactive,
    Error,
    EndOfFile,
    Closed,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ParsingMode {
    Full,
    /// Inside `skip()`: only element boundaries matter, nothing is
    /// materialized.
    SkipContent,
}

/// A content construct suspended mid-scan; the dispatchers resume it before
/// looking at the buffer again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Construct {
    None,
    Text,
    Comment,
    Pi,
    CData,
    RootWhitespace,
    StartTag,
    EndTag,
    Doctype,
    EntityRefNode,
}

/// Operations that can suspend; used to reject interleaving.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    Read,
    Skip,
    FinishValue,
    ReadContent,
    ReadElementContent,
    ReadString,
    ReadValueChunk,
    ReadContentBinary,
    ReadElementContentBinary,
}

impl Op {
    pub(crate) fn name(self) -> &'static str {
        match self {
            Op::Read => "read",
            Op::Skip => "skip",
            Op::FinishValue => "finish_value",
            Op::ReadContent => "read_content_as",
            Op::ReadElementContent => "read_element_content_as",
            Op::ReadString => "read_string",
            Op::ReadValueChunk => "read_value_chunk",
            Op::ReadContentBinary => "read_content_as_binary",
            Op::ReadElementContentBinary => "read_element_content_as_binary",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct TextChunk {
    pub(crate) start: usize,
    pub(crate) end: usize,
    /// The text run ended (markup, end of document or a reported entity
    /// boundary follows).
    pub(crate) complete: bool,
}

impl TextChunk {
    pub(crate) fn len(&self) -> usize {
        self.end - self.start
    }
}

/// What the text scanner stopped at when it finished a run.
#[derive(Clone, Debug, Default)]
pub(crate) enum AfterText {
    #[default]
    None,
    /// An unexpanded general entity reference starts at `char_pos`.
    EntityReference,
    /// A manually resolved entity just ended.
    EndEntity,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum TextPhase {
    #[default]
    Idle,
    First,
    CacheAll,
    WsLookahead,
    SkipRest,
}

#[derive(Debug, Default)]
pub(crate) struct TextState {
    pub(crate) phase: TextPhase,
    pub(crate) or_chars: u32,
    pub(crate) builder: String,
    pub(crate) line: usize,
    pub(crate) position: usize,
    pub(crate) after: AfterText,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum MarkupPhase {
    #[default]
    Start,
    /// Between a PI target and its data.
    Whitespace,
    Body,
}

/// Locals of a delimited construct (comment, PI, CDATA, root whitespace).
#[derive(Debug, Default)]
pub(crate) struct MarkupState {
    pub(crate) phase: MarkupPhase,
    pub(crate) builder: String,
    pub(crate) target: String,
    pub(crate) line: usize,
    pub(crate) position: usize,
}

/// Progress of a look-ahead scan for the end of a restart-tier construct.
/// Offsets are relative to `char_pos`, so buffer shifts do not disturb them.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct Prescan {
    pub(crate) rel: usize,
    pub(crate) quote: u8,
    pub(crate) depth: u32,
    pub(crate) in_comment: bool,
    pub(crate) in_pi: bool,
}

/// `(parsing_function, next_parsing_function)` to restore when an
/// incremental read leaves its node.
pub(crate) type Restore = (ParsingFunction, ParsingFunction);

#[derive(Debug, Default)]
pub(crate) struct ContentWalk {
    pub(crate) active: bool,
    pub(crate) move_if_on_content: bool,
    pub(crate) read_pending: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ValueSource {
    /// The current node's value is complete.
    #[default]
    Cached,
    /// More of the value remains to be scanned.
    Partial,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum BinaryPhase {
    #[default]
    Value,
    /// The current content node is exhausted; walk to the next one.
    Move,
    End,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum FinishPhase {
    #[default]
    Start,
    SkipPartial,
    Walk,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ElementBinaryPhase {
    #[default]
    Start,
    /// Reading off the start tag.
    ReadOff { was_empty: bool },
    Decoding,
    /// Reading off the end tag.
    FinalRead,
}

#[derive(Debug, Default)]
pub(crate) struct BinaryState {
    pub(crate) decoder: Option<ActiveDecoder>,
    pub(crate) source: ValueSource,
    pub(crate) phase: BinaryPhase,
    pub(crate) offset: usize,
    pub(crate) restore: Option<Restore>,
    pub(crate) finish: FinishPhase,
    pub(crate) element: ElementBinaryPhase,
}

#[derive(Debug, Default)]
pub(crate) struct ValueChunkState {
    pub(crate) source: ValueSource,
    pub(crate) offset: usize,
    pub(crate) restore: Option<Restore>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ContentPhase {
    #[default]
    Examine,
    FinishValue,
    Read,
}

#[derive(Debug, Default)]
pub(crate) struct ContentRead {
    pub(crate) active: bool,
    pub(crate) phase: ContentPhase,
    pub(crate) acc: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum ElementContentPhase {
    #[default]
    Start,
    ReadOff { was_empty: bool },
    /// Reading off the end tag of an element without content.
    ReadOffEnd,
    Content,
    FinalRead,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum StringPhase {
    #[default]
    Start,
    ReadIntoContent,
    Examine,
    FinishValue,
    Read,
}

#[derive(Debug, Default)]
pub(crate) struct StringRead {
    pub(crate) phase: StringPhase,
    pub(crate) acc: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) enum SkipPhase {
    #[default]
    Start,
    Skipping { initial_depth: usize },
    FinalRead,
}

/// `read_attribute_value` position.
#[derive(Clone, Debug)]
pub(crate) struct AttrWalk {
    pub(crate) attr: usize,
    /// Next chunk of `nodes[attr].chunks` to report.
    pub(crate) next_chunk: usize,
    pub(crate) entity: Option<EntityWalk>,
    pub(crate) restore: Restore,
}

#[derive(Clone, Debug)]
pub(crate) struct EntityWalk {
    pub(crate) decl: Option<Arc<EntityDecl>>,
    pub(crate) expansion: String,
    pub(crate) reported_text: bool,
    pub(crate) depth: usize,
}

/// `xml:space` scope value.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum XmlSpace {
    #[default]
    None,
    Default,
    Preserve,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct XmlContext {
    pub(crate) space: XmlSpace,
    pub(crate) lang: Arc<str>,
}

/// Counters describing the work a reader did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReaderStats {
    pub nodes_reported: u64,
    pub state_transitions: u64,
    pub refills: u64,
    pub buffer_shifts: u64,
    pub buffer_growths: u64,
    pub entity_pushes: u64,
}
