//! Namespace scope stack.

use std::collections::BTreeMap;

use crate::names::{AtomId, NameTable};

/// Which bindings `namespaces_in_scope` reports.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NamespaceScope {
    /// Every binding visible at the current node, including `xml`.
    All,
    /// Every visible binding except the built-in `xml` prefix.
    ExcludeXml,
    /// Only bindings declared on the current element.
    Local,
}

/// Prefix/namespace lookups against the bindings in scope.
pub trait NamespaceResolver {
    fn lookup_namespace(&self, prefix: &str) -> Option<&str>;
    fn lookup_prefix(&self, namespace: &str) -> Option<&str>;
    fn namespaces_in_scope(&self, scope: NamespaceScope) -> BTreeMap<String, String>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Binding {
    prefix: AtomId,
    uri: AtomId,
}

/// Stack of per-element binding scopes; innermost binding wins.
///
/// The built-in `xml`/`xmlns` bindings and the empty default namespace sit
/// below every scope and are never popped.
#[derive(Clone, Debug)]
pub(crate) struct NamespaceManager {
    bindings: Vec<Binding>,
    scopes: Vec<usize>,
    builtin: usize,
}

impl NamespaceManager {
    pub(crate) fn new(names: &NameTable) -> Self {
        let bindings = vec![
            Binding {
                prefix: AtomId::EMPTY,
                uri: AtomId::EMPTY,
            },
            Binding {
                prefix: names.xml,
                uri: names.xml_ns,
            },
            Binding {
                prefix: names.xmlns,
                uri: names.xmlns_ns,
            },
        ];
        let builtin = bindings.len();
        Self {
            bindings,
            scopes: Vec::new(),
            builtin,
        }
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(self.bindings.len());
    }

    pub(crate) fn pop_scope(&mut self) {
        if let Some(start) = self.scopes.pop() {
            self.bindings.truncate(start.max(self.builtin));
        }
    }

    pub(crate) fn add(&mut self, prefix: AtomId, uri: AtomId) {
        self.bindings.push(Binding { prefix, uri });
    }

    pub(crate) fn lookup(&self, prefix: AtomId) -> Option<AtomId> {
        self.bindings
            .iter()
            .rev()
            .find(|binding| binding.prefix == prefix)
            .map(|binding| binding.uri)
    }

    /// Innermost prefix bound to `uri` that is not shadowed by a later
    /// binding of the same prefix.
    pub(crate) fn lookup_prefix(&self, uri: AtomId) -> Option<AtomId> {
        self.bindings
            .iter()
            .rev()
            .filter(|binding| binding.uri == uri)
            .map(|binding| binding.prefix)
            .find(|&prefix| self.lookup(prefix) == Some(uri))
    }

    /// Bindings declared since the innermost `push_scope`.
    fn local(&self) -> &[Binding] {
        let start = self.scopes.last().copied().unwrap_or(self.builtin);
        &self.bindings[start.min(self.bindings.len())..]
    }

    pub(crate) fn in_scope(&self, scope: NamespaceScope, names: &NameTable) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        let source = match scope {
            NamespaceScope::Local => self.local(),
            NamespaceScope::All | NamespaceScope::ExcludeXml => &self.bindings[..],
        };
        for binding in source {
            let prefix = names.resolve(binding.prefix).to_string();
            let uri = names.resolve(binding.uri).to_string();
            out.insert(prefix, uri);
        }
        // Inherited/undeclared default namespace and the reserved xmlns binding
        // are not reported.
        if out.get("").is_some_and(String::is_empty) {
            out.remove("");
        }
        out.remove("xmlns");
        match scope {
            NamespaceScope::All => {}
            NamespaceScope::ExcludeXml | NamespaceScope::Local => {
                out.remove("xml");
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::names::XML_NAMESPACE;

    #[test]
    fn innermost_binding_wins_and_pops() {
        let mut names = NameTable::new();
        let mut ns = NamespaceManager::new(&names);
        let p = names.intern("p");
        let u1 = names.intern("u1");
        let u2 = names.intern("u2");

        ns.push_scope();
        ns.add(p, u1);
        ns.push_scope();
        ns.add(p, u2);
        assert_eq!(ns.lookup(p), Some(u2));
        assert_eq!(ns.lookup_prefix(u1), None);
        ns.pop_scope();
        assert_eq!(ns.lookup(p), Some(u1));
        assert_eq!(ns.lookup_prefix(u1), Some(p));
        ns.pop_scope();
        assert_eq!(ns.lookup(p), None);
    }

    #[test]
    fn builtins_survive_pops() {
        let names = NameTable::new();
        let mut ns = NamespaceManager::new(&names);
        ns.pop_scope();
        ns.pop_scope();
        assert_eq!(ns.lookup(names.xml), Some(names.xml_ns));
        assert_eq!(ns.lookup(AtomId::EMPTY), Some(AtomId::EMPTY));
    }

    #[test]
    fn scope_listing() {
        let mut names = NameTable::new();
        let mut ns = NamespaceManager::new(&names);
        let a = names.intern("a");
        let ua = names.intern("urn:a");
        let ud = names.intern("urn:default");
        ns.push_scope();
        ns.add(a, ua);
        ns.push_scope();
        ns.add(AtomId::EMPTY, ud);

        let all = ns.in_scope(NamespaceScope::All, &names);
        assert_eq!(all.get("a").map(String::as_str), Some("urn:a"));
        assert_eq!(all.get("").map(String::as_str), Some("urn:default"));
        assert_eq!(all.get("xml").map(String::as_str), Some(XML_NAMESPACE));

        let no_xml = ns.in_scope(NamespaceScope::ExcludeXml, &names);
        assert!(!no_xml.contains_key("xml"));

        let local = ns.in_scope(NamespaceScope::Local, &names);
        assert_eq!(local.len(), 1);
        assert!(local.contains_key(""));
    }
}
