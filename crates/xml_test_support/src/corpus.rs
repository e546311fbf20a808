//! TOML fixture corpus for reader tests.
//!
//! ```toml
//! format = "xml-corpus-v1"
//!
//! [[case]]
//! id = "attributes"
//! input = "<r a='1'/>"
//! expected = ["0 Element r empty", "  @a=\"1\""]
//! ```
//!
//! A case lists either the expected node lines or an `error` substring that
//! the terminating error line must contain.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use serde::Deserialize;

pub const CORPUS_FORMAT_V1: &str = "xml-corpus-v1";

#[derive(Clone, Debug, Deserialize)]
struct CorpusFile {
    format: String,
    #[serde(rename = "case")]
    cases: Vec<CorpusCase>,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CorpusCase {
    pub id: String,
    pub input: String,
    /// Parse DOCTYPEs instead of rejecting them.
    pub dtd: bool,
    pub entities: EntityMode,
    pub whitespace: WhitespaceMode,
    pub fragment: bool,
    pub ignore_comments: bool,
    pub namespaces: Option<bool>,
    pub expected: Option<Vec<String>>,
    pub error: Option<String>,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EntityMode {
    #[default]
    Expand,
    ExpandCharEntities,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum WhitespaceMode {
    #[default]
    All,
    Significant,
    None,
}

pub fn load_corpus(path: &Path) -> Vec<CorpusCase> {
    let content = fs::read_to_string(path)
        .unwrap_or_else(|err| panic!("failed to read corpus {path:?}: {err}"));
    parse_corpus(&content, path)
}

pub fn parse_corpus(content: &str, path: &Path) -> Vec<CorpusCase> {
    let file: CorpusFile = toml::from_str(content)
        .unwrap_or_else(|err| panic!("failed to parse corpus {path:?}: {err}"));
    assert_eq!(
        file.format, CORPUS_FORMAT_V1,
        "unsupported corpus format in {path:?}"
    );
    let mut seen = BTreeSet::new();
    for case in &file.cases {
        assert!(!case.id.is_empty(), "corpus case without id in {path:?}");
        assert!(
            seen.insert(case.id.clone()),
            "duplicate corpus id '{}' in {path:?}",
            case.id
        );
        assert!(
            case.expected.is_some() != case.error.is_some(),
            "corpus case '{}' in {path:?} needs exactly one of `expected` or `error`",
            case.id
        );
    }
    file.cases
}
