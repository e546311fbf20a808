//! Resumable XML pull tokenizer.
//!
//! `XmlTokenizer` never blocks. Every operation that may need characters
//! which are not buffered yet returns `Step::NeedMoreInput`; the driver then
//! supplies input (by pumping a blocking source or by a `feed()` from the
//! caller) and calls the same operation again. All locals a routine needs to
//! resume live on the tokenizer:
//!
//! - `parsing_function` says which routine `read()` dispatches to next;
//! - `construct` marks a content construct that was suspended mid-scan;
//! - delimited constructs (text, comments, PIs, CDATA) keep their partial
//!   value in `text`/`markup` and continue from `char_pos`;
//! - tags, declarations and the DOCTYPE are prescanned until their end is
//!   buffered and then parsed in one go.
//!
//! Only one suspendable operation may be in progress at a time; calling a
//! different one while another is pending is a usage error.

use std::collections::HashSet;
use std::sync::Arc;

use tools::utf8::{char_at, char_count};
use url::Url;

use crate::dtd::{BasicDtdParser, DtdInfo, DtdParser, EntityDecl};
use crate::entity::{EntityStack, NullResolver, XmlResolver};
use crate::error::{ErrorKind, Limit, SyntaxError, UsageError, XmlError};
use crate::input::{Fill, InputSource, ParsingState};
use crate::names::NameTable;
use crate::namespace::NamespaceManager;
use crate::nodes::{NodeStore, NodeType};
use crate::settings::ReaderSettings;
use crate::step::{Step, StepResult, ready};

mod access;
mod binary;
mod content;
mod doctype;
mod document;
mod element;
mod entities;
mod markup;
mod skip;
mod states;
mod text;

pub use states::{ReadState, ReaderStats, XmlSpace};

use states::{
    AttrWalk, BinaryState, Construct, ContentRead, ContentWalk, ElementContentPhase, MarkupState,
    Op, ParsingFunction, ParsingMode, Prescan, SkipPhase, StringRead, TextState, ValueChunkState,
    XmlContext,
};

/// An attribute added from a DTD default, as passed to the observer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DefaultAttribute<'a> {
    pub element: &'a str,
    pub name: &'a str,
    pub value: &'a str,
}

pub type DefaultAttributeObserver = Box<dyn FnMut(DefaultAttribute<'_>)>;

/// Pluggable collaborators of a reader.
pub struct ReaderParts {
    pub resolver: Box<dyn XmlResolver>,
    pub dtd_parser: Box<dyn DtdParser>,
    pub default_attribute_observer: Option<DefaultAttributeObserver>,
    /// Base URI of the document; relative system ids resolve against it.
    pub base_uri: Option<Url>,
}

impl Default for ReaderParts {
    fn default() -> Self {
        Self {
            resolver: Box::new(NullResolver),
            dtd_parser: Box::new(BasicDtdParser::new()),
            default_attribute_observer: None,
            base_uri: None,
        }
    }
}

impl std::fmt::Debug for ReaderParts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderParts")
            .field("base_uri", &self.base_uri)
            .field(
                "default_attribute_observer",
                &self.default_attribute_observer.is_some(),
            )
            .finish_non_exhaustive()
    }
}

pub struct XmlTokenizer {
    pub(crate) settings: ReaderSettings,
    pub(crate) names: NameTable,
    /// The active input: the document, or the innermost expanding entity.
    pub(crate) ps: ParsingState,
    pub(crate) entities: EntityStack,
    resolver: Box<dyn XmlResolver>,
    dtd_parser: Box<dyn DtdParser>,
    default_attribute_observer: Option<DefaultAttributeObserver>,
    pub(crate) dtd: Option<DtdInfo>,

    pub(crate) nodes: NodeStore,
    /// Slot of the innermost open element's content.
    pub(crate) index: usize,
    /// Slot of the node the caller is positioned on.
    pub(crate) cur: usize,
    pub(crate) attr_count: usize,
    pub(crate) ns: NamespaceManager,
    pub(crate) xml_contexts: Vec<XmlContext>,

    pub(crate) parsing_function: ParsingFunction,
    pub(crate) next_parsing_function: ParsingFunction,
    pub(crate) parsing_mode: ParsingMode,
    pub(crate) read_state: ReadState,
    pub(crate) root_element_parsed: bool,
    pub(crate) doctype_seen: bool,
    pub(crate) standalone: bool,

    pub(crate) construct: Construct,
    pub(crate) text: TextState,
    pub(crate) markup: MarkupState,
    pub(crate) prescan: Prescan,
    pending_op: Option<Op>,

    pub(crate) walk: ContentWalk,
    pub(crate) binary: BinaryState,
    pub(crate) value_chunk: ValueChunkState,
    pub(crate) content: ContentRead,
    pub(crate) element_content: ElementContentPhase,
    pub(crate) string_read: StringRead,
    pub(crate) skip_phase: SkipPhase,
    pub(crate) attr_walk: Option<AttrWalk>,
    /// Entity whose end was last consumed; names the EndEntity node.
    pub(crate) last_entity: Option<Arc<EntityDecl>>,

    chars_in_document: u64,
    chars_from_entities: u64,
    pub(crate) stats: ReaderStats,
    error: Option<XmlError>,
    pub(crate) seen_names: HashSet<(crate::names::AtomId, crate::names::AtomId)>,
}

impl std::fmt::Debug for XmlTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmlTokenizer")
            .field("read_state", &self.read_state)
            .field("parsing_function", &self.parsing_function)
            .field("node_type", &self.node_type())
            .field("depth", &self.depth())
            .finish_non_exhaustive()
    }
}

impl XmlTokenizer {
    pub fn new(source: InputSource, settings: ReaderSettings) -> Self {
        Self::with_parts(source, settings, ReaderParts::default())
    }

    pub fn with_parts(source: InputSource, settings: ReaderSettings, parts: ReaderParts) -> Self {
        let ps = ParsingState::new(source, settings.buffer_size, parts.base_uri.clone());
        Self::from_state(ps, settings, parts)
    }

    /// Tokenizer over a document whose bytes are fed by the caller.
    pub(crate) fn pushed(settings: ReaderSettings, parts: ReaderParts) -> Self {
        let ps = ParsingState::pushed(settings.buffer_size, parts.base_uri.clone());
        Self::from_state(ps, settings, parts)
    }

    fn from_state(ps: ParsingState, settings: ReaderSettings, parts: ReaderParts) -> Self {
        let names = NameTable::new();
        let ns = NamespaceManager::new(&names);
        let mut nodes = NodeStore::new();
        nodes.add_node(0, 0);
        Self {
            settings,
            names,
            ps,
            entities: EntityStack::new(),
            resolver: parts.resolver,
            dtd_parser: parts.dtd_parser,
            default_attribute_observer: parts.default_attribute_observer,
            dtd: None,
            nodes,
            index: 0,
            cur: 0,
            attr_count: 0,
            ns,
            xml_contexts: vec![XmlContext::default()],
            parsing_function: ParsingFunction::SwitchToInteractiveXmlDecl,
            next_parsing_function: ParsingFunction::DocumentContent,
            parsing_mode: ParsingMode::Full,
            read_state: ReadState::Initial,
            root_element_parsed: false,
            doctype_seen: false,
            standalone: false,
            construct: Construct::None,
            text: TextState::default(),
            markup: MarkupState::default(),
            prescan: Prescan::default(),
            pending_op: None,
            walk: ContentWalk::default(),
            binary: BinaryState::default(),
            value_chunk: ValueChunkState::default(),
            content: ContentRead::default(),
            element_content: ElementContentPhase::default(),
            string_read: StringRead::default(),
            skip_phase: SkipPhase::default(),
            attr_walk: None,
            last_entity: None,
            chars_in_document: 0,
            chars_from_entities: 0,
            stats: ReaderStats::default(),
            error: None,
            seen_names: HashSet::new(),
        }
    }

    /// Advance to the next node. `Ready(false)` at the end of the document,
    /// after an error, or once closed.
    pub fn read(&mut self) -> StepResult<bool> {
        self.run(Op::Read, |this| {
            ready!(this.resume_binary_finish()?);
            let more = ready!(this.read_internal()?);
            if more {
                this.stats.nodes_reported = this.stats.nodes_reported.saturating_add(1);
            }
            Ok(Step::Ready(more))
        })
    }

    pub fn read_state(&self) -> ReadState {
        self.read_state
    }

    pub fn eof(&self) -> bool {
        self.read_state == ReadState::EndOfFile
    }

    pub fn settings(&self) -> &ReaderSettings {
        &self.settings
    }

    pub fn name_table(&self) -> &NameTable {
        &self.names
    }

    pub fn dtd_info(&self) -> Option<&DtdInfo> {
        self.dtd.as_ref()
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// The error that stopped the reader, if any.
    pub fn error(&self) -> Option<&XmlError> {
        self.error.as_ref()
    }

    /// Release the input and move to `Closed`. Idempotent.
    pub fn close(&mut self) {
        if self.read_state == ReadState::Closed {
            return;
        }
        self.entities.unwind(&mut self.ps);
        self.ps.close();
        self.index = 0;
        self.attr_count = 0;
        self.cur = self.nodes.add_node(0, 0);
        self.attr_walk = None;
        self.pending_op = None;
        self.construct = Construct::None;
        self.read_state = ReadState::Closed;
        self.set_function(ParsingFunction::Closed);
        log::debug!(target: "xml.tokenizer", "reader closed");
    }

    /// Guard for suspendable operations: rejects interleaving, remembers the
    /// pending operation and moves the reader to `Error` on fatal failures.
    pub(crate) fn run<T>(
        &mut self,
        op: Op,
        f: impl FnOnce(&mut Self) -> StepResult<T>,
    ) -> StepResult<T> {
        self.check_op(op)?;
        let result = f(self);
        match &result {
            Ok(Step::NeedMoreInput) => self.pending_op = Some(op),
            Ok(Step::Ready(_)) => self.pending_op = None,
            Err(err) => {
                self.pending_op = None;
                if err.is_fatal() {
                    self.fail(err.clone());
                }
            }
        }
        result
    }

    pub(crate) fn check_op(&self, op: Op) -> Result<(), XmlError> {
        if let Some(pending) = self.pending_op
            && pending != op
        {
            return Err(XmlError::usage(UsageError::OperationPending {
                pending: pending.name(),
            }));
        }
        if op == Op::Read {
            return Ok(());
        }
        match self.read_state {
            ReadState::Closed => Err(XmlError::usage(UsageError::Closed)),
            ReadState::Error => Err(self
                .error
                .clone()
                .unwrap_or_else(|| XmlError::usage(UsageError::Closed))),
            _ => Ok(()),
        }
    }

    /// Non-suspending operations are still rejected while another one is
    /// pending.
    pub(crate) fn check_idle(&self) -> Result<(), XmlError> {
        match self.pending_op {
            Some(pending) => Err(XmlError::usage(UsageError::OperationPending {
                pending: pending.name(),
            })),
            None => Ok(()),
        }
    }

    fn fail(&mut self, err: XmlError) {
        log::debug!(target: "xml.tokenizer", "reader failed: {err}");
        self.invalidate_values();
        self.entities.unwind(&mut self.ps);
        self.construct = Construct::None;
        self.attr_walk = None;
        self.read_state = ReadState::Error;
        self.set_function(ParsingFunction::Error);
        self.error = Some(err);
    }

    /// Record a failure detected by a driver (for example an I/O error while
    /// pumping) and return it with the current location attached.
    pub(crate) fn driver_failure(&mut self, kind: ErrorKind) -> XmlError {
        let err = self.error_here(kind);
        self.pending_op = None;
        self.fail(err.clone());
        err
    }

    pub(crate) fn read_internal(&mut self) -> StepResult<bool> {
        loop {
            match self.parsing_function {
                ParsingFunction::ElementContent => return self.parse_element_content(),
                ParsingFunction::DocumentContent => return self.parse_document_content(),
                ParsingFunction::SwitchToInteractiveXmlDecl => {
                    self.read_state = ReadState::Interactive;
                    if ready!(self.parse_xml_declaration()?) {
                        return Ok(Step::Ready(true));
                    }
                }
                ParsingFunction::ResetAttributesRootLevel => {
                    self.reset_attributes();
                    self.cur = self.index;
                    self.set_function(self.next_parsing_function);
                }
                ParsingFunction::MoveToElementContent => {
                    self.reset_attributes();
                    self.index += 1;
                    self.cur = self.nodes.add_node(self.index, self.index);
                    self.set_function(ParsingFunction::ElementContent);
                }
                ParsingFunction::PopElementContext => {
                    self.pop_element_context();
                    self.set_function(self.next_parsing_function);
                }
                ParsingFunction::PopEmptyElementContext => {
                    self.cur = self.index;
                    self.nodes.get_mut(self.index).empty_or_default = false;
                    self.reset_attributes();
                    self.pop_element_context();
                    self.set_function(self.next_parsing_function);
                }
                ParsingFunction::EntityReference => {
                    self.set_function(self.next_parsing_function);
                    ready!(self.parse_entity_reference_node()?);
                    return Ok(Step::Ready(true));
                }
                ParsingFunction::ReportEndEntity => {
                    self.set_function(self.next_parsing_function);
                    self.setup_end_entity_node();
                    return Ok(Step::Ready(true));
                }
                ParsingFunction::InReadAttributeValue => {
                    self.finish_attribute_value_iterator();
                    self.cur = self.index;
                }
                ParsingFunction::PartialTextValue => {
                    ready!(self.skip_partial_text_value()?);
                }
                ParsingFunction::InReadValueChunk => {
                    ready!(self.finish_read_value_chunk()?);
                }
                ParsingFunction::InReadContentAsBinary
                | ParsingFunction::InReadElementContentAsBinary => {
                    ready!(self.finish_read_content_as_binary()?);
                }
                ParsingFunction::Eof | ParsingFunction::Error | ParsingFunction::Closed => {
                    return Ok(Step::Ready(false));
                }
            }
        }
    }

    /// Resume the construct a content dispatcher was in the middle of.
    pub(crate) fn resume_construct(&mut self) -> StepResult<bool> {
        match self.construct {
            Construct::None => Ok(Step::Ready(false)),
            Construct::Text => self.parse_text(),
            Construct::Comment => self.parse_comment(),
            Construct::Pi => self.parse_pi(),
            Construct::CData => self.parse_cdata(),
            Construct::RootWhitespace => self.parse_root_level_whitespace(),
            Construct::StartTag => Ok(self.parse_element()?.map(|()| true)),
            Construct::EndTag => Ok(self.parse_end_element()?.map(|()| true)),
            Construct::Doctype => self.parse_doctype(),
            Construct::EntityRefNode => Ok(self.parse_entity_reference_node()?.map(|()| true)),
        }
    }

    pub(crate) fn set_function(&mut self, next: ParsingFunction) {
        if self.parsing_function == next {
            return;
        }
        #[cfg(any(test, feature = "debug-stats"))]
        log::trace!(
            target: "xml.tokenizer",
            "state {:?} -> {:?} @{}",
            self.parsing_function,
            next,
            self.ps.char_pos
        );
        self.parsing_function = next;
        self.stats.state_transitions = self.stats.state_transitions.saturating_add(1);
    }

    /// Drop the current element's attributes and any attribute value walk.
    pub(crate) fn reset_attributes(&mut self) {
        self.attr_count = 0;
        self.attr_walk = None;
    }

    pub(crate) fn pop_element_context(&mut self) {
        if self.settings.namespaces {
            self.ns.pop_scope();
        }
        let node = self.nodes.get_mut(self.index);
        if node.xml_context_pushed {
            node.xml_context_pushed = false;
            if self.xml_contexts.len() > 1 {
                self.xml_contexts.pop();
            }
        }
    }

    /// Copy buffer-backed values out before the active buffer changes.
    pub(crate) fn invalidate_values(&mut self) {
        let live = self.index + self.attr_count + 2;
        self.nodes.invalidate(live, &self.ps.chars);
        self.nodes.forget_stale(live);
    }

    /// Append characters to the active buffer. `Ready(0)` means the active
    /// source is exhausted.
    pub(crate) fn read_data(&mut self) -> StepResult<usize> {
        if self.ps.is_eof {
            return Ok(Step::Ready(0));
        }
        if self.ps.needs_shift() {
            self.invalidate_values();
            self.ps.shift_to_front();
            self.stats.buffer_shifts = self.stats.buffer_shifts.saturating_add(1);
        }
        let capacity = self.ps.capacity();
        let before = self.ps.chars_used;
        let filled = match self.ps.fill() {
            Ok(filled) => filled,
            Err(err) => return Err(self.error_at(err, self.ps.chars_used)),
        };
        if self.ps.capacity() != capacity {
            self.stats.buffer_growths = self.stats.buffer_growths.saturating_add(1);
        }
        match filled {
            Fill::Chars(count) => {
                self.stats.refills = self.stats.refills.saturating_add(1);
                self.count_chars(before, count)?;
                Ok(Step::Ready(count))
            }
            Fill::Eof => Ok(Step::Ready(0)),
            Fill::NeedInput => Ok(Step::NeedMoreInput),
        }
    }

    fn count_chars(&mut self, start: usize, len: usize) -> Result<(), XmlError> {
        let count = char_count(&self.ps.chars[start..start + len]) as u64;
        if self.ps.entity_id == 0 {
            self.chars_in_document = self.chars_in_document.saturating_add(count);
            if let Some(max) = self.settings.max_characters_in_document
                && self.chars_in_document > max
            {
                return Err(self.error_here(ErrorKind::LimitExceeded(Limit::CharactersInDocument)));
            }
            Ok(())
        } else {
            self.count_entity_chars(count)
        }
    }

    pub(crate) fn count_entity_chars(&mut self, count: u64) -> Result<(), XmlError> {
        self.chars_from_entities = self.chars_from_entities.saturating_add(count);
        if let Some(max) = self.settings.max_characters_from_entities
            && self.chars_from_entities > max
        {
            return Err(self.error_here(ErrorKind::LimitExceeded(Limit::CharactersFromEntities)));
        }
        Ok(())
    }

    pub(crate) fn error_at(&self, kind: impl Into<ErrorKind>, pos: usize) -> XmlError {
        let line = self.ps.line.line_no;
        let position = self.ps.line_position(pos);
        self.error_at_line(kind, line, position)
    }

    pub(crate) fn error_here(&self, kind: impl Into<ErrorKind>) -> XmlError {
        self.error_at(kind, self.ps.char_pos)
    }

    pub(crate) fn error_at_line(
        &self,
        kind: impl Into<ErrorKind>,
        line: usize,
        position: usize,
    ) -> XmlError {
        XmlError::new(kind.into())
            .at(line, position)
            .with_source(self.ps.base_uri.as_ref().map(Url::to_string))
    }

    pub(crate) fn eof_error(&self, construct: &'static str) -> XmlError {
        self.error_at(
            SyntaxError::UnexpectedEof { construct },
            self.ps.chars_used,
        )
    }

    /// Error for the character at `pos`, which is not what was `expected`.
    pub(crate) fn unexpected_char(&self, pos: usize, expected: &'static str) -> XmlError {
        if pos >= self.ps.chars_used {
            return self.error_at(SyntaxError::UnexpectedEof { construct: expected }, pos);
        }
        match char_at(&self.ps.chars[..self.ps.chars_used], pos) {
            Some((found, _)) if tools::chars::is_xml_char(found) => {
                self.error_at(SyntaxError::UnexpectedChar { found, expected }, pos)
            }
            Some((found, _)) => self.error_at(
                SyntaxError::InvalidChar {
                    code_point: found as u32,
                },
                pos,
            ),
            None => self.error_at(SyntaxError::InvalidChar { code_point: 0xFFFD }, pos),
        }
    }

    /// Whether a blocking driver can make progress by pumping the active
    /// source.
    pub(crate) fn active_wants_pump(&self) -> bool {
        self.ps.wants_pump()
    }

    pub(crate) fn pump_active(&mut self) -> std::io::Result<bool> {
        let block = self.settings.read_block_size;
        self.ps.pump(block)
    }

    /// The state reading the document, wherever it sits on the entity stack.
    pub(crate) fn document_state(&mut self) -> &mut ParsingState {
        self.entities.document_state(&mut self.ps)
    }

    pub(crate) fn node_is(&self, slot: usize, node_type: NodeType) -> bool {
        self.nodes.get(slot).node_type == node_type
    }

    pub(crate) fn resolver_and_parser(&mut self) -> (&mut dyn XmlResolver, &mut dyn DtdParser) {
        (self.resolver.as_mut(), self.dtd_parser.as_mut())
    }

    pub(crate) fn observe_default(&mut self, attribute: DefaultAttribute<'_>) {
        if let Some(observer) = self.default_attribute_observer.as_mut() {
            observer(attribute);
        }
    }

    pub(crate) fn resolver(&mut self) -> &mut dyn XmlResolver {
        self.resolver.as_mut()
    }
}

/// `chars[start..end]` as text; the buffer only ever holds whole characters.
pub(crate) fn buffer_str(chars: &[u8], start: usize, end: usize) -> &str {
    std::str::from_utf8(&chars[start..end]).unwrap_or("")
}

pub(crate) fn push_slice(out: &mut String, chars: &[u8], start: usize, end: usize) {
    out.push_str(buffer_str(chars, start, end));
}
