//! Pluggable lookup of external entities and DTD subsets.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::Path;

use url::Url;

use crate::input::InputSource;

/// An opened external resource.
#[derive(Debug)]
pub struct ResolvedEntity {
    /// Absolute URI of the resource; becomes the base URI for anything it
    /// references in turn.
    pub uri: Option<Url>,
    pub input: InputSource,
}

/// Opens external entities and DTD subsets.
///
/// `Ok(None)` means "could not resolve". An unresolvable external entity is
/// reported as `ErrorKind::Unresolved`; an unresolvable external DTD subset
/// is skipped. `Err` carries a genuine I/O failure.
pub trait XmlResolver {
    fn resolve(
        &mut self,
        base_uri: Option<&Url>,
        public_id: Option<&str>,
        system_id: &str,
    ) -> io::Result<Option<ResolvedEntity>>;
}

/// Resolves nothing.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullResolver;

impl XmlResolver for NullResolver {
    fn resolve(
        &mut self,
        _base_uri: Option<&Url>,
        _public_id: Option<&str>,
        _system_id: &str,
    ) -> io::Result<Option<ResolvedEntity>> {
        Ok(None)
    }
}

/// Absolute form of `system_id`, joined against `base_uri` when relative.
pub fn resolve_uri(base_uri: Option<&Url>, system_id: &str) -> Option<Url> {
    match base_uri {
        Some(base) => base.join(system_id).ok(),
        None => Url::parse(system_id).ok(),
    }
}

/// Reads `file:` URIs from the local filesystem.
///
/// Relative system ids without a base URI are taken relative to the
/// current working directory.
#[derive(Clone, Copy, Debug, Default)]
pub struct FileResolver;

impl FileResolver {
    fn locate(base_uri: Option<&Url>, system_id: &str) -> io::Result<Option<Url>> {
        if let Some(url) = resolve_uri(base_uri, system_id) {
            return Ok(Some(url));
        }
        let path = Path::new(system_id);
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };
        Ok(Url::from_file_path(absolute).ok())
    }
}

impl XmlResolver for FileResolver {
    fn resolve(
        &mut self,
        base_uri: Option<&Url>,
        _public_id: Option<&str>,
        system_id: &str,
    ) -> io::Result<Option<ResolvedEntity>> {
        let Some(url) = Self::locate(base_uri, system_id)? else {
            return Ok(None);
        };
        if url.scheme() != "file" {
            return Ok(None);
        }
        let Ok(path) = url.to_file_path() else {
            return Ok(None);
        };
        match File::open(&path) {
            Ok(file) => {
                log::debug!(target: "xml.entity", "opened {}", path.display());
                Ok(Some(ResolvedEntity {
                    uri: Some(url),
                    input: InputSource::from_reader(BufReader::new(file)),
                }))
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// In-memory resources keyed by absolute URI or by literal system id.
#[derive(Clone, Debug, Default)]
pub struct MemoryResolver {
    entries: HashMap<String, Vec<u8>>,
}

impl MemoryResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> &mut Self {
        self.entries.insert(key.into(), content.into());
        self
    }

    pub fn with(mut self, key: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        self.insert(key, content);
        self
    }
}

impl XmlResolver for MemoryResolver {
    fn resolve(
        &mut self,
        base_uri: Option<&Url>,
        _public_id: Option<&str>,
        system_id: &str,
    ) -> io::Result<Option<ResolvedEntity>> {
        let url = resolve_uri(base_uri, system_id);
        if let Some(url) = &url
            && let Some(bytes) = self.entries.get(url.as_str())
        {
            return Ok(Some(ResolvedEntity {
                uri: Some(url.clone()),
                input: InputSource::Bytes(bytes.clone()),
            }));
        }
        Ok(self.entries.get(system_id).map(|bytes| ResolvedEntity {
            uri: url,
            input: InputSource::Bytes(bytes.clone()),
        }))
    }
}

impl<R: XmlResolver + ?Sized> XmlResolver for Box<R> {
    fn resolve(
        &mut self,
        base_uri: Option<&Url>,
        public_id: Option<&str>,
        system_id: &str,
    ) -> io::Result<Option<ResolvedEntity>> {
        (**self).resolve(base_uri, public_id, system_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_resolver_matches_absolute_then_literal() {
        let mut resolver = MemoryResolver::new()
            .with("http://example.com/dtd/a.ent", "A")
            .with("b.ent", "B");
        let base = Url::parse("http://example.com/dtd/doc.xml").unwrap();

        let a = resolver.resolve(Some(&base), None, "a.ent").unwrap().unwrap();
        assert_eq!(a.uri.unwrap().as_str(), "http://example.com/dtd/a.ent");
        assert!(matches!(a.input, InputSource::Bytes(ref bytes) if bytes == b"A"));

        let b = resolver.resolve(Some(&base), None, "b.ent").unwrap().unwrap();
        assert!(matches!(b.input, InputSource::Bytes(ref bytes) if bytes == b"B"));

        assert!(resolver.resolve(Some(&base), None, "c.ent").unwrap().is_none());
    }

    #[test]
    fn null_resolver_resolves_nothing() {
        assert!(NullResolver.resolve(None, None, "x").unwrap().is_none());
    }

    #[test]
    fn file_resolver_reads_relative_to_base() {
        let dir = std::env::temp_dir().join(format!("xml-resolver-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("part.ent"), "<p/>").unwrap();
        let base = Url::from_file_path(dir.join("doc.xml")).unwrap();

        let mut resolver = FileResolver;
        let found = resolver.resolve(Some(&base), None, "part.ent").unwrap().unwrap();
        assert!(found.uri.unwrap().path().ends_with("/part.ent"));
        assert!(resolver.resolve(Some(&base), None, "missing.ent").unwrap().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn file_resolver_ignores_other_schemes() {
        let mut resolver = FileResolver;
        assert!(
            resolver
                .resolve(None, None, "http://example.com/x.dtd")
                .unwrap()
                .is_none()
        );
    }
}
