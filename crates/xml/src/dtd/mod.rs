//! DOCTYPE declarations and the adapter the DTD grammar parser runs against.
//!
//! The tokenizer owns a `DtdInfo` once a DOCTYPE has been seen. Subset text
//! is handed to a `DtdParser`, which records what it finds through a
//! `DtdContext`. The context is the only way a parser touches reader state:
//! it declares entities and attribute lists, opens external resources
//! through the reader's resolver, and maps subset offsets to document
//! positions for error reporting.

use std::collections::HashMap;
use std::sync::Arc;

use url::Url;

use crate::entity::{XmlResolver, resolve_uri};
use crate::error::{ErrorKind, SyntaxError, XmlError};
use crate::input::decode_to_string;

mod parser;

pub use parser::BasicDtdParser;
pub(crate) use parser::{collapse_whitespace, parse_char_ref, predefined_entity};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityKind {
    Internal {
        text: String,
    },
    External {
        public_id: Option<String>,
        system_id: String,
    },
    Unparsed {
        public_id: Option<String>,
        system_id: String,
        notation: String,
    },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntityDecl {
    pub name: String,
    pub kind: EntityKind,
    /// Declared in the external subset (or a parameter entity it pulled in).
    pub declared_externally: bool,
    /// URI of the resource holding the declaration; relative system ids are
    /// resolved against it.
    pub base_uri: Option<Url>,
    /// Nonzero identity used to tell entity expansions apart. The document
    /// itself is entity 0.
    pub id: u32,
}

impl EntityDecl {
    pub fn is_external(&self) -> bool {
        !matches!(self.kind, EntityKind::Internal { .. })
    }

    pub fn is_unparsed(&self) -> bool {
        matches!(self.kind, EntityKind::Unparsed { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            EntityKind::Internal { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AttributeType {
    CData,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Notation(Vec<String>),
    Enumeration(Vec<String>),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DefaultDecl {
    Required,
    Implied,
    Fixed(String),
    Value(String),
}

impl DefaultDecl {
    pub fn value(&self) -> Option<&str> {
        match self {
            DefaultDecl::Fixed(value) | DefaultDecl::Value(value) => Some(value),
            DefaultDecl::Required | DefaultDecl::Implied => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AttributeDecl {
    /// Qualified name as written in the `<!ATTLIST>`.
    pub name: String,
    pub ty: AttributeType,
    pub default: DefaultDecl,
    pub declared_externally: bool,
}

/// Everything learned from the DOCTYPE.
#[derive(Clone, Debug, Default)]
pub struct DtdInfo {
    pub name: String,
    pub public_id: Option<String>,
    pub system_id: Option<String>,
    pub internal_subset: String,
    entities: HashMap<String, Arc<EntityDecl>>,
    param_entities: HashMap<String, Arc<EntityDecl>>,
    /// Element qualified name to its attribute declarations, in order.
    attlists: HashMap<String, Vec<AttributeDecl>>,
    next_entity_id: u32,
}

impl DtdInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            next_entity_id: 1,
            ..Self::default()
        }
    }

    pub fn entity(&self, name: &str) -> Option<&Arc<EntityDecl>> {
        self.entities.get(name)
    }

    pub fn param_entity(&self, name: &str) -> Option<&Arc<EntityDecl>> {
        self.param_entities.get(name)
    }

    pub fn attributes(&self, element: &str) -> &[AttributeDecl] {
        self.attlists.get(element).map_or(&[], Vec::as_slice)
    }

    pub fn attribute(&self, element: &str, name: &str) -> Option<&AttributeDecl> {
        self.attributes(element).iter().find(|decl| decl.name == name)
    }

    pub fn has_attribute_defaults(&self) -> bool {
        self.attlists
            .values()
            .flatten()
            .any(|decl| decl.default.value().is_some())
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    fn take_id(&mut self) -> u32 {
        let id = self.next_entity_id.max(1);
        self.next_entity_id = id.saturating_add(1);
        id
    }
}

/// Text of an external subset or external parameter entity.
#[derive(Clone, Debug)]
pub struct ExternalText {
    pub text: String,
    pub uri: Option<Url>,
}

/// Grammar parser for DOCTYPE subsets.
pub trait DtdParser {
    fn parse_internal_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError>;

    fn parse_external_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError>;
}

impl<P: DtdParser + ?Sized> DtdParser for Box<P> {
    fn parse_internal_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError> {
        (**self).parse_internal_subset(ctx, subset)
    }

    fn parse_external_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        subset: &str,
    ) -> Result<(), XmlError> {
        (**self).parse_external_subset(ctx, subset)
    }
}

pub struct DtdContext<'a> {
    info: &'a mut DtdInfo,
    resolver: &'a mut dyn XmlResolver,
    base_uri: Option<Url>,
    external: bool,
    /// Document line/position of offset 0 of the subset being parsed.
    origin: (usize, usize),
}

impl<'a> DtdContext<'a> {
    pub(crate) fn new(
        info: &'a mut DtdInfo,
        resolver: &'a mut dyn XmlResolver,
        base_uri: Option<Url>,
        origin: (usize, usize),
    ) -> Self {
        Self {
            info,
            resolver,
            base_uri,
            external: false,
            origin,
        }
    }

    pub fn doctype_name(&self) -> &str {
        &self.info.name
    }

    pub fn public_id(&self) -> Option<&str> {
        self.info.public_id.as_deref()
    }

    pub fn system_id(&self) -> Option<&str> {
        self.info.system_id.as_deref()
    }

    pub fn base_uri(&self) -> Option<&Url> {
        self.base_uri.as_ref()
    }

    /// Whether declarations currently come from external resources.
    pub fn is_external(&self) -> bool {
        self.external
    }

    pub fn info(&self) -> &DtdInfo {
        self.info
    }

    /// Record an entity. The first declaration of a name wins; returns false
    /// for a later duplicate.
    pub fn declare_entity(&mut self, name: &str, kind: EntityKind, parameter: bool) -> bool {
        let table = if parameter {
            &self.info.param_entities
        } else {
            &self.info.entities
        };
        if table.contains_key(name) {
            log::debug!(target: "xml.dtd", "duplicate entity declaration '{name}' ignored");
            return false;
        }
        let decl = Arc::new(EntityDecl {
            name: name.to_string(),
            kind,
            declared_externally: self.external,
            base_uri: self.base_uri.clone(),
            id: self.info.take_id(),
        });
        let table = if parameter {
            &mut self.info.param_entities
        } else {
            &mut self.info.entities
        };
        table.insert(name.to_string(), decl);
        true
    }

    /// Record an attribute declaration. The first one for a given element
    /// and attribute name wins.
    pub fn declare_attribute(&mut self, element: &str, mut decl: AttributeDecl) -> bool {
        decl.declared_externally = self.external;
        let list = self.info.attlists.entry(element.to_string()).or_default();
        if list.iter().any(|existing| existing.name == decl.name) {
            return false;
        }
        list.push(decl);
        true
    }

    pub fn param_entity(&self, name: &str) -> Option<Arc<EntityDecl>> {
        self.info.param_entities.get(name).cloned()
    }

    pub fn entity(&self, name: &str) -> Option<Arc<EntityDecl>> {
        self.info.entities.get(name).cloned()
    }

    /// Fetch and fully decode an external resource.
    pub fn open_external(
        &mut self,
        public_id: Option<&str>,
        system_id: &str,
    ) -> Result<Option<ExternalText>, XmlError> {
        let resolved = self
            .resolver
            .resolve(self.base_uri.as_ref(), public_id, system_id)
            .map_err(|err| {
                XmlError::new(ErrorKind::Unresolved {
                    uri: self.display_uri(system_id),
                    cause: Some(Arc::new(err)),
                })
            })?;
        let Some(resolved) = resolved else {
            return Ok(None);
        };
        let uri = resolved.uri.or_else(|| resolve_uri(self.base_uri.as_ref(), system_id));
        let text = decode_to_string(resolved.input).map_err(|err| {
            XmlError::new(ErrorKind::Unresolved {
                uri: self.display_uri(system_id),
                cause: Some(Arc::new(err)),
            })
            .with_source(uri.as_ref().map(Url::to_string))
        })?;
        log::debug!(
            target: "xml.dtd",
            "loaded external DTD text '{system_id}' ({} bytes)",
            text.len()
        );
        Ok(Some(ExternalText {
            text: strip_text_declaration(text),
            uri,
        }))
    }

    /// Run `f` with declarations attributed to an external resource.
    pub fn with_external<T>(
        &mut self,
        uri: Option<Url>,
        f: impl FnOnce(&mut DtdContext<'_>) -> T,
    ) -> T {
        let base = uri.or_else(|| self.base_uri.clone());
        let saved_base = std::mem::replace(&mut self.base_uri, base);
        let saved_external = std::mem::replace(&mut self.external, true);
        let saved_origin = std::mem::replace(&mut self.origin, (1, 1));
        let out = f(self);
        self.base_uri = saved_base;
        self.external = saved_external;
        self.origin = saved_origin;
        out
    }

    pub fn display_uri(&self, system_id: &str) -> String {
        resolve_uri(self.base_uri.as_ref(), system_id)
            .map_or_else(|| system_id.to_string(), |url| url.to_string())
    }

    /// Syntax error at byte `offset` of `text`, the subset being parsed.
    pub fn error_at(&self, text: &str, offset: usize, message: impl Into<String>) -> XmlError {
        let (line, position) = self.position_of(text, offset);
        let source = if self.external {
            self.base_uri.as_ref().map(Url::to_string)
        } else {
            None
        };
        XmlError::new(ErrorKind::Syntax(SyntaxError::Dtd {
            message: message.into(),
        }))
        .at(line, position)
        .with_source(source)
    }

    fn position_of(&self, text: &str, offset: usize) -> (usize, usize) {
        let offset = tools::utf8::floor_char_boundary(text, offset);
        let before = &text[..offset];
        let (mut line, mut position) = self.origin;
        match before.rfind('\n') {
            Some(last) => {
                line += before.matches('\n').count();
                position = before[last + 1..].chars().count() + 1;
            }
            None => position += before.chars().count(),
        }
        (line, position)
    }
}

/// Drop a leading `<?xml ... ?>` text declaration from external DTD text.
fn strip_text_declaration(text: String) -> String {
    let bytes = text.as_bytes();
    if bytes.len() > 5
        && bytes.starts_with(b"<?xml")
        && tools::chars::is_whitespace(bytes[5])
        && let Some(end) = text.find("?>")
    {
        return text[end + 2..].to_string();
    }
    text
}

#[cfg(test)]
mod tests;
