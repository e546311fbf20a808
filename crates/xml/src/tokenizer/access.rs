//! Current-node accessors, attribute navigation and namespace queries.

use std::collections::BTreeMap;

use url::Url;

use super::XmlTokenizer;
use super::states::{AttrWalk, Op, ParsingFunction, ReadState, XmlSpace};
use crate::error::XmlError;
use crate::names::AtomId;
use crate::namespace::{NamespaceResolver, NamespaceScope};
use crate::nodes::{NodeData, NodeType};
use crate::step::{Step, StepResult, ready};

impl XmlTokenizer {
    /// The node the caller is positioned on, if the reader is on one.
    fn current(&self) -> Option<&NodeData> {
        match self.read_state {
            ReadState::Interactive => Some(self.nodes.get(self.cur)),
            _ => None,
        }
    }

    pub fn node_type(&self) -> NodeType {
        self.current().map_or(NodeType::None, |node| node.node_type)
    }

    /// Qualified name as written: element and attribute names, PI targets,
    /// entity names and the DOCTYPE name.
    pub fn name(&self) -> &str {
        self.current().map_or("", |node| self.names.resolve(node.name))
    }

    pub fn local_name(&self) -> &str {
        self.current()
            .map_or("", |node| self.names.resolve(node.local_name))
    }

    pub fn prefix(&self) -> &str {
        self.current().map_or("", |node| self.names.resolve(node.prefix))
    }

    pub fn namespace_uri(&self) -> &str {
        self.current().map_or("", |node| self.names.resolve(node.ns))
    }

    pub fn depth(&self) -> usize {
        self.current().map_or(0, |node| node.depth)
    }

    pub fn has_value(&self) -> bool {
        self.node_type().has_value()
    }

    /// Value of the current node.
    ///
    /// A Text node may be reported before its end has been scanned; until
    /// `finish_value()` completes, this returns only the part scanned so
    /// far. While a chunked or binary read is consuming the node the value
    /// is empty.
    pub fn value(&self) -> &str {
        let Some(node) = self.current() else {
            return "";
        };
        if !node.node_type.has_value() {
            return "";
        }
        if matches!(
            self.parsing_function,
            ParsingFunction::InReadValueChunk
                | ParsingFunction::InReadContentAsBinary
                | ParsingFunction::InReadElementContentAsBinary
        ) {
            return "";
        }
        node.value.as_str(&self.ps.chars)
    }

    /// Whether `value()` is still missing part of the current text.
    pub fn has_partial_value(&self) -> bool {
        self.parsing_function == ParsingFunction::PartialTextValue && self.cur == self.index
    }

    /// Scan the rest of a partially reported Text node so that `value()`
    /// returns all of it.
    pub fn finish_value(&mut self) -> StepResult<()> {
        self.run(Op::FinishValue, |this| {
            if this.has_partial_value() {
                ready!(this.finish_partial_value()?);
            }
            Ok(Step::Ready(()))
        })
    }

    pub fn is_empty_element(&self) -> bool {
        self.current()
            .is_some_and(|node| node.node_type == NodeType::Element && node.empty_or_default)
    }

    /// The current attribute was added from a DTD default.
    pub fn is_default(&self) -> bool {
        self.current()
            .is_some_and(|node| node.node_type == NodeType::Attribute && node.empty_or_default)
    }

    pub fn quote_char(&self) -> char {
        match self.current() {
            Some(node) if node.node_type == NodeType::Attribute => char::from(node.quote),
            _ => '"',
        }
    }

    pub fn xml_space(&self) -> XmlSpace {
        self.xml_contexts
            .last()
            .map_or(XmlSpace::None, |context| context.space)
    }

    pub fn xml_lang(&self) -> &str {
        self.xml_contexts
            .last()
            .map_or("", |context| context.lang.as_ref())
    }

    pub fn line_number(&self) -> usize {
        self.current().map_or(0, |node| node.line)
    }

    pub fn line_position(&self) -> usize {
        self.current().map_or(0, |node| node.position)
    }

    /// Base URI of the input the current node came from.
    pub fn base_uri(&self) -> Option<&Url> {
        self.ps.base_uri.as_ref()
    }

    /// Name of the encoding the document is decoded with.
    pub fn encoding(&self) -> &'static str {
        self.entities.document_state_ref(&self.ps).encoding_name()
    }

    fn on_attribute_owner(&self) -> bool {
        self.read_state == ReadState::Interactive
            && self.attr_count > 0
            && self.cur >= self.index
            && self.cur <= self.index + self.attr_count + 1
    }

    fn attribute_slots(&self) -> std::ops::RangeInclusive<usize> {
        self.index + 1..=self.index + self.attr_count
    }

    pub fn attribute_count(&self) -> usize {
        if self.on_attribute_owner() {
            self.attr_count
        } else {
            0
        }
    }

    fn find_attribute(&self, name: &str) -> Option<usize> {
        if !self.on_attribute_owner() {
            return None;
        }
        self.attribute_slots()
            .find(|&slot| self.names.resolve(self.nodes.get(slot).name) == name)
    }

    fn find_attribute_ns(&self, local_name: &str, namespace: &str) -> Option<usize> {
        if !self.on_attribute_owner() {
            return None;
        }
        self.attribute_slots().find(|&slot| {
            let attr = self.nodes.get(slot);
            self.names.resolve(attr.local_name) == local_name
                && self.names.resolve(attr.ns) == namespace
        })
    }

    fn attribute_value(&self, slot: usize) -> &str {
        self.nodes.get(slot).value.as_str(&self.ps.chars)
    }

    pub fn get_attribute(&self, name: &str) -> Option<&str> {
        self.find_attribute(name)
            .map(|slot| self.attribute_value(slot))
    }

    pub fn get_attribute_ns(&self, local_name: &str, namespace: &str) -> Option<&str> {
        self.find_attribute_ns(local_name, namespace)
            .map(|slot| self.attribute_value(slot))
    }

    pub fn get_attribute_at(&self, i: usize) -> Option<&str> {
        if i >= self.attribute_count() {
            return None;
        }
        Some(self.attribute_value(self.index + 1 + i))
    }

    fn move_to_slot(&mut self, slot: Option<usize>) -> Result<bool, XmlError> {
        self.check_idle()?;
        let Some(slot) = slot else {
            return Ok(false);
        };
        self.finish_attribute_value_iterator();
        self.cur = slot;
        Ok(true)
    }

    pub fn move_to_attribute(&mut self, name: &str) -> Result<bool, XmlError> {
        let slot = self.find_attribute(name);
        self.move_to_slot(slot)
    }

    pub fn move_to_attribute_ns(
        &mut self,
        local_name: &str,
        namespace: &str,
    ) -> Result<bool, XmlError> {
        let slot = self.find_attribute_ns(local_name, namespace);
        self.move_to_slot(slot)
    }

    pub fn move_to_attribute_at(&mut self, i: usize) -> Result<bool, XmlError> {
        let slot = (i < self.attribute_count()).then(|| self.index + 1 + i);
        self.move_to_slot(slot)
    }

    pub fn move_to_first_attribute(&mut self) -> Result<bool, XmlError> {
        self.move_to_attribute_at(0)
    }

    pub fn move_to_next_attribute(&mut self) -> Result<bool, XmlError> {
        if !self.on_attribute_owner() {
            return self.move_to_slot(None);
        }
        let current = match &self.attr_walk {
            Some(walk) => walk.attr,
            None => self.cur,
        };
        let next = if current == self.index {
            self.index + 1
        } else {
            current + 1
        };
        let slot = (next <= self.index + self.attr_count).then_some(next);
        self.move_to_slot(slot)
    }

    /// Move from an attribute (or attribute value) back to its element.
    pub fn move_to_element(&mut self) -> Result<bool, XmlError> {
        self.check_idle()?;
        Ok(self.move_to_element_inner())
    }

    pub(crate) fn move_to_element_inner(&mut self) -> bool {
        if !self.on_attribute_owner() || self.cur == self.index {
            return false;
        }
        self.finish_attribute_value_iterator();
        self.cur = self.index;
        true
    }

    /// Step through the value of the current attribute as Text and
    /// EntityReference nodes. Returns false once the value is exhausted.
    pub fn read_attribute_value(&mut self) -> Result<bool, XmlError> {
        self.check_idle()?;
        Ok(self.attribute_value_step())
    }

    pub(crate) fn attribute_value_step(&mut self) -> bool {
        if self.parsing_function != ParsingFunction::InReadAttributeValue {
            if !self.on_attribute_owner() || !self.node_is(self.cur, NodeType::Attribute) {
                return false;
            }
            self.attr_walk = Some(AttrWalk {
                attr: self.cur,
                next_chunk: 0,
                entity: None,
                restore: (self.parsing_function, self.next_parsing_function),
            });
            self.set_function(ParsingFunction::InReadAttributeValue);
        }
        let Some(walk) = self.attr_walk.as_mut() else {
            return false;
        };
        let scratch = self.index + self.attr_count + 1;
        if let Some(entity) = walk.entity.as_mut() {
            let depth = entity.depth;
            if !entity.reported_text {
                entity.reported_text = true;
                if !entity.expansion.is_empty() {
                    let text = std::mem::take(&mut entity.expansion);
                    let (line, position) = {
                        let reference = self.nodes.get(scratch);
                        (reference.line, reference.position)
                    };
                    let slot = self.nodes.add_node(scratch, depth);
                    let node = self.nodes.get_mut(slot);
                    node.node_type = NodeType::Text;
                    node.value.set_owned(&text);
                    node.set_position(line, position);
                    self.cur = slot;
                    return true;
                }
            }
            let name = entity
                .decl
                .as_ref()
                .map(|decl| decl.name.clone())
                .unwrap_or_default();
            walk.entity = None;
            let atom = self.names.intern(&name);
            let slot = self.nodes.add_node(scratch, depth.saturating_sub(1));
            let node = self.nodes.get_mut(slot);
            node.node_type = NodeType::EndEntity;
            node.set_name(atom, AtomId::EMPTY, atom);
            self.cur = slot;
            return true;
        }

        let attr = self.nodes.get(walk.attr);
        let depth = attr.depth + 1;
        let index = walk.next_chunk;
        if attr.chunks.is_empty() {
            if index > 0 {
                return false;
            }
            walk.next_chunk = 1;
            let text = attr.value.as_str(&self.ps.chars).to_string();
            let (line, position) = (attr.value_line, attr.value_position);
            let slot = self.nodes.add_node(scratch, depth);
            let node = self.nodes.get_mut(slot);
            node.node_type = NodeType::Text;
            node.value.set_owned(&text);
            node.set_position(line, position);
            self.cur = slot;
            return true;
        }
        let Some(chunk) = attr.chunks.get(index).cloned() else {
            return false;
        };
        walk.next_chunk += 1;
        let slot = self.nodes.add_node(scratch, depth);
        let node = self.nodes.get_mut(slot);
        node.node_type = chunk.node_type;
        node.set_position(chunk.line, chunk.position);
        if chunk.node_type == NodeType::EntityReference {
            node.set_name(chunk.name, AtomId::EMPTY, chunk.name);
        }
        node.value.set_owned(&chunk.value);
        self.cur = slot;
        true
    }

    /// Leave an attribute value walk, returning to the attribute.
    pub(crate) fn finish_attribute_value_iterator(&mut self) {
        if self.parsing_function != ParsingFunction::InReadAttributeValue {
            return;
        }
        if let Some(walk) = self.attr_walk.take() {
            let (function, next) = walk.restore;
            self.set_function(function);
            self.next_parsing_function = next;
            self.cur = walk.attr;
        }
    }

    pub fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        if !self.settings.namespaces {
            return None;
        }
        let atom = self.names.get(prefix)?;
        self.ns.lookup(atom).map(|uri| self.names.resolve(uri))
    }

    pub fn lookup_prefix(&self, namespace: &str) -> Option<&str> {
        if !self.settings.namespaces {
            return None;
        }
        let atom = self.names.get(namespace)?;
        self.ns
            .lookup_prefix(atom)
            .map(|prefix| self.names.resolve(prefix))
    }

    pub fn namespaces_in_scope(&self, scope: NamespaceScope) -> BTreeMap<String, String> {
        if !self.settings.namespaces {
            return BTreeMap::new();
        }
        self.ns.in_scope(scope, &self.names)
    }
}

impl NamespaceResolver for XmlTokenizer {
    fn lookup_namespace(&self, prefix: &str) -> Option<&str> {
        XmlTokenizer::lookup_namespace(self, prefix)
    }

    fn lookup_prefix(&self, namespace: &str) -> Option<&str> {
        XmlTokenizer::lookup_prefix(self, namespace)
    }

    fn namespaces_in_scope(&self, scope: NamespaceScope) -> BTreeMap<String, String> {
        XmlTokenizer::namespaces_in_scope(self, scope)
    }
}
