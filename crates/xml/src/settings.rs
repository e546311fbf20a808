//! Reader configuration.

/// Whether the input must be a complete document or may be a fragment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Conformance {
    /// Exactly one root element, optional prolog and DOCTYPE.
    Document,
    /// Any sequence of element content at the top level; no DOCTYPE.
    Fragment,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntityHandling {
    /// General entities are expanded in place and never reported.
    ExpandEntities,
    /// Only character and predefined entities are expanded; general entity
    /// references are reported as `EntityReference` nodes.
    ExpandCharEntities,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhitespaceHandling {
    All,
    /// Only whitespace inside `xml:space="preserve"` is reported.
    Significant,
    None,
}

/// How much of a text run is buffered before it is reported.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WhitespaceLookahead {
    /// A run whose first chunk contains non-whitespace is reported as a
    /// partially parsed Text node. Whitespace runs are accumulated up to
    /// 4096 bytes and then promoted to Text.
    Bounded,
    /// Every text node is materialized in full before it is reported.
    CacheAll,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DtdProcessing {
    /// A DOCTYPE is a fatal error.
    Prohibit,
    /// The DOCTYPE is skipped and not reported.
    Ignore,
    /// The DOCTYPE is reported and its subsets are parsed.
    Parse,
}

#[derive(Clone, Debug)]
pub struct ReaderSettings {
    pub conformance: Conformance,
    pub entity_handling: EntityHandling,
    pub whitespace_handling: WhitespaceHandling,
    pub whitespace_lookahead: WhitespaceLookahead,
    pub dtd_processing: DtdProcessing,
    pub ignore_comments: bool,
    pub ignore_processing_instructions: bool,
    /// Drops insignificant whitespace; same as `WhitespaceHandling::Significant`
    /// when the handling is `All`.
    pub ignore_whitespace: bool,
    pub namespaces: bool,
    pub check_characters: bool,
    pub check_undeclared_entities: bool,
    pub max_characters_in_document: Option<u64>,
    pub max_characters_from_entities: Option<u64>,
    /// Initial character buffer capacity in bytes; also caps how much is
    /// decoded per refill.
    pub buffer_size: usize,
    /// Bytes pulled from a blocking source per refill.
    pub read_block_size: usize,
}

impl ReaderSettings {
    pub(crate) fn effective_whitespace_handling(&self) -> WhitespaceHandling {
        if self.ignore_whitespace && self.whitespace_handling == WhitespaceHandling::All {
            WhitespaceHandling::Significant
        } else {
            self.whitespace_handling
        }
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self {
            conformance: Conformance::Document,
            entity_handling: EntityHandling::ExpandEntities,
            whitespace_handling: WhitespaceHandling::All,
            whitespace_lookahead: WhitespaceLookahead::Bounded,
            dtd_processing: DtdProcessing::Prohibit,
            ignore_comments: false,
            ignore_processing_instructions: false,
            ignore_whitespace: false,
            namespaces: true,
            check_characters: true,
            check_undeclared_entities: true,
            max_characters_in_document: None,
            max_characters_from_entities: Some(10_000_000),
            buffer_size: 4096,
            read_block_size: 4096,
        }
    }
}
