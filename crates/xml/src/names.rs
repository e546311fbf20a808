//! Name table for interned element/attribute names, prefixes and namespace URIs.

use std::collections::HashMap;
use std::sync::Arc;

/// Opaque interned-name identifier.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(pub u32);

impl AtomId {
    /// The empty string; always present.
    pub const EMPTY: AtomId = AtomId(0);
}

/// Reader-level name table.
///
/// Invariant: names are stored exactly as written (XML names are
/// case-sensitive), and ids are dense indices into `atoms`.
#[derive(Debug)]
pub struct NameTable {
    atoms: Vec<Arc<str>>,
    map: HashMap<Arc<str>, AtomId>,
    pub(crate) xml: AtomId,
    pub(crate) xmlns: AtomId,
    pub(crate) xml_ns: AtomId,
    pub(crate) xmlns_ns: AtomId,
}

pub const XML_NAMESPACE: &str = "http://www.w3.org/XML/1998/namespace";
pub const XMLNS_NAMESPACE: &str = "http://www.w3.org/2000/xmlns/";

impl NameTable {
    pub fn new() -> Self {
        let mut table = Self {
            atoms: Vec::new(),
            map: HashMap::new(),
            xml: AtomId::EMPTY,
            xmlns: AtomId::EMPTY,
            xml_ns: AtomId::EMPTY,
            xmlns_ns: AtomId::EMPTY,
        };
        let empty = table.intern("");
        debug_assert_eq!(empty, AtomId::EMPTY);
        table.xml = table.intern("xml");
        table.xmlns = table.intern("xmlns");
        table.xml_ns = table.intern(XML_NAMESPACE);
        table.xmlns_ns = table.intern(XMLNS_NAMESPACE);
        table
    }

    pub fn intern(&mut self, name: &str) -> AtomId {
        if let Some(id) = self.map.get(name) {
            return *id;
        }
        debug_assert!(self.atoms.len() < u32::MAX as usize);
        let id = AtomId(self.atoms.len() as u32);
        let atom = Arc::<str>::from(name);
        self.atoms.push(Arc::clone(&atom));
        self.map.insert(atom, id);
        id
    }

    /// Look up a name without interning it.
    pub fn get(&self, name: &str) -> Option<AtomId> {
        self.map.get(name).copied()
    }

    pub fn resolve(&self, id: AtomId) -> &str {
        self.atoms.get(id.0 as usize).map_or("", |s| s.as_ref())
    }

    pub fn resolve_arc(&self, id: AtomId) -> Option<Arc<str>> {
        self.atoms.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }
}

impl Default for NameTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_is_case_sensitive_and_stable() {
        let mut table = NameTable::new();
        let a = table.intern("Item");
        let b = table.intern("item");
        assert_ne!(a, b);
        assert_eq!(table.intern("Item"), a);
        assert_eq!(table.resolve(a), "Item");
    }

    #[test]
    fn reserved_names_are_preinterned() {
        let table = NameTable::new();
        assert_eq!(table.resolve(AtomId::EMPTY), "");
        assert_eq!(table.get("xmlns"), Some(table.xmlns));
        assert_eq!(table.resolve(table.xml_ns), XML_NAMESPACE);
    }
}
