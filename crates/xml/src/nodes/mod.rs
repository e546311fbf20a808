//! Node and attribute records.
//!
//! `NodeStore` is an arena of reusable `NodeData` slots. Slot `i` holds the
//! open element at depth `i` while its content is being read; the current
//! element's attributes occupy the slots right after it, followed by one
//! scratch slot for attribute value chunks. Slots are reset in place, so
//! once the document depth stabilizes `read()` stops allocating.

use crate::names::AtomId;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum NodeType {
    #[default]
    None,
    Element,
    Attribute,
    Text,
    CData,
    EntityReference,
    ProcessingInstruction,
    Comment,
    DocumentType,
    Whitespace,
    SignificantWhitespace,
    EndElement,
    EndEntity,
    XmlDeclaration,
}

impl NodeType {
    pub fn as_str(self) -> &'static str {
        match self {
            NodeType::None => "None",
            NodeType::Element => "Element",
            NodeType::Attribute => "Attribute",
            NodeType::Text => "Text",
            NodeType::CData => "CDATA",
            NodeType::EntityReference => "EntityReference",
            NodeType::ProcessingInstruction => "ProcessingInstruction",
            NodeType::Comment => "Comment",
            NodeType::DocumentType => "DocumentType",
            NodeType::Whitespace => "Whitespace",
            NodeType::SignificantWhitespace => "SignificantWhitespace",
            NodeType::EndElement => "EndElement",
            NodeType::EndEntity => "EndEntity",
            NodeType::XmlDeclaration => "XmlDeclaration",
        }
    }

    /// Node kinds that carry a value.
    pub fn has_value(self) -> bool {
        matches!(
            self,
            NodeType::Attribute
                | NodeType::Text
                | NodeType::CData
                | NodeType::ProcessingInstruction
                | NodeType::Comment
                | NodeType::DocumentType
                | NodeType::Whitespace
                | NodeType::SignificantWhitespace
                | NodeType::XmlDeclaration
        )
    }

    /// Text-like nodes that content reads concatenate.
    pub fn is_text_content(self) -> bool {
        matches!(
            self,
            NodeType::Text
                | NodeType::CData
                | NodeType::Whitespace
                | NodeType::SignificantWhitespace
        )
    }
}

/// A node value: owned text, or a byte range of the active character buffer.
///
/// Exactly one of the two is meaningful: while `range` is set the owned
/// string is unused scratch space.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub(crate) struct NodeValue {
    text: String,
    range: Option<(usize, usize)>,
}

impl NodeValue {
    pub(crate) fn owned(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            range: None,
        }
    }

    #[cfg(test)]
    pub(crate) fn buffer(start: usize, len: usize) -> Self {
        Self {
            text: String::new(),
            range: Some((start, len)),
        }
    }

    pub(crate) fn as_str<'a>(&'a self, chars: &'a [u8]) -> &'a str {
        match self.range {
            None => &self.text,
            Some((start, len)) => chars
                .get(start..start + len)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
                .unwrap_or(""),
        }
    }

    pub(crate) fn is_buffer(&self) -> bool {
        self.range.is_some()
    }

    pub(crate) fn clear(&mut self) {
        self.text.clear();
        self.range = None;
    }

    pub(crate) fn set_buffer(&mut self, start: usize, len: usize) {
        self.text.clear();
        self.range = Some((start, len));
    }

    pub(crate) fn set_owned(&mut self, text: &str) {
        self.text.clear();
        self.text.push_str(text);
        self.range = None;
    }

    /// Copy a buffer-backed value out of `chars`.
    pub(crate) fn materialize(&mut self, chars: &[u8]) {
        if let Some((start, len)) = self.range.take() {
            self.text.clear();
            if let Some(text) = chars
                .get(start..start + len)
                .and_then(|bytes| std::str::from_utf8(bytes).ok())
            {
                self.text.push_str(text);
            }
        }
    }

    /// Mutable owned string, materializing from `chars` first.
    pub(crate) fn owned_mut(&mut self, chars: &[u8]) -> &mut String {
        self.materialize(chars);
        &mut self.text
    }
}

/// One piece of an attribute value reported under `ExpandCharEntities`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct ValueChunk {
    pub(crate) node_type: NodeType,
    /// Entity name for `EntityReference` chunks.
    pub(crate) name: AtomId,
    /// Literal text, or the normalized expansion of the entity.
    pub(crate) value: String,
    pub(crate) line: usize,
    pub(crate) position: usize,
}

#[derive(Clone, Debug, Default)]
pub(crate) struct NodeData {
    pub(crate) node_type: NodeType,
    /// Qualified name as written.
    pub(crate) name: AtomId,
    pub(crate) local_name: AtomId,
    pub(crate) prefix: AtomId,
    pub(crate) ns: AtomId,
    pub(crate) depth: usize,
    pub(crate) value: NodeValue,
    pub(crate) line: usize,
    pub(crate) position: usize,
    /// Empty element for elements, defaulted from the DTD for attributes.
    pub(crate) empty_or_default: bool,
    /// The element pushed an `xml:space`/`xml:lang` context.
    pub(crate) xml_context_pushed: bool,
    /// Entity whose replacement text the node started in (0 = document).
    pub(crate) entity_id: u32,
    pub(crate) quote: u8,
    pub(crate) value_line: usize,
    pub(crate) value_position: usize,
    pub(crate) chunks: Vec<ValueChunk>,
}

impl NodeData {
    fn reset(&mut self, depth: usize) {
        self.node_type = NodeType::None;
        self.name = AtomId::EMPTY;
        self.local_name = AtomId::EMPTY;
        self.prefix = AtomId::EMPTY;
        self.ns = AtomId::EMPTY;
        self.depth = depth;
        self.value.clear();
        self.line = 0;
        self.position = 0;
        self.empty_or_default = false;
        self.xml_context_pushed = false;
        self.entity_id = 0;
        self.quote = b'"';
        self.value_line = 0;
        self.value_position = 0;
        self.chunks.clear();
    }

    pub(crate) fn set_name(&mut self, name: AtomId, prefix: AtomId, local_name: AtomId) {
        self.name = name;
        self.prefix = prefix;
        self.local_name = local_name;
    }

    pub(crate) fn set_position(&mut self, line: usize, position: usize) {
        self.line = line;
        self.position = position;
    }
}

#[derive(Debug, Default)]
pub(crate) struct NodeStore {
    nodes: Vec<NodeData>,
}

impl NodeStore {
    pub(crate) fn new() -> Self {
        let mut nodes = Vec::with_capacity(8);
        nodes.resize_with(8, NodeData::default);
        Self { nodes }
    }

    /// Reset slot `slot` for a node at `depth` and return its index.
    pub(crate) fn add_node(&mut self, slot: usize, depth: usize) -> usize {
        if slot >= self.nodes.len() {
            let new_len = (self.nodes.len() * 2).max(slot + 1);
            self.nodes.resize_with(new_len, NodeData::default);
        }
        self.nodes[slot].reset(depth);
        slot
    }

    #[inline]
    pub(crate) fn get(&self, slot: usize) -> &NodeData {
        &self.nodes[slot]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, slot: usize) -> &mut NodeData {
        &mut self.nodes[slot]
    }

    #[cfg(test)]
    pub(crate) fn slots(&self) -> usize {
        self.nodes.len()
    }

    /// Copy every buffer-backed value among the first `live` slots out of
    /// `chars` before the buffer is shifted or replaced.
    pub(crate) fn invalidate(&mut self, live: usize, chars: &[u8]) {
        let live = live.min(self.nodes.len());
        for node in &mut self.nodes[..live] {
            node.value.materialize(chars);
        }
    }

    /// Drop stale buffer references past the live region.
    pub(crate) fn forget_stale(&mut self, live: usize) {
        for node in self.nodes.iter_mut().skip(live) {
            if node.value.is_buffer() {
                node.value.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests;
