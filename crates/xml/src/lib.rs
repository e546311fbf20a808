//! Incremental, resumable XML pull reader.
//!
//! The engine is `XmlTokenizer`, a state machine that never blocks: every
//! operation returns `Step::NeedMoreInput` when it runs out of characters
//! and picks up where it stopped when called again. Two drivers sit on top
//! of it:
//!
//! - `XmlReader` pulls from `std::io::Read` sources and hides suspension;
//! - `XmlPushReader` is fed byte chunks by the caller and hands `Step`
//!   results straight back.

pub mod step;

pub mod convert;
pub mod decode;
pub mod dtd;
pub mod entity;
pub mod error;
pub mod input;
pub mod names;
pub mod namespace;
pub mod nodes;
pub mod push;
pub mod reader;
pub mod settings;
pub mod tokenizer;

pub use crate::convert::{FromXmlValue, QualifiedName};
pub use crate::decode::{Base64Decoder, BinHexDecoder, Decoded, IncrementalDecoder};
pub use crate::dtd::{BasicDtdParser, DtdContext, DtdInfo, DtdParser, EntityDecl};
pub use crate::entity::{FileResolver, MemoryResolver, NullResolver, ResolvedEntity, XmlResolver};
pub use crate::error::{
    EncodingError, EntityError, ErrorKind, Limit, SyntaxError, UsageError, XmlError,
};
pub use crate::input::InputSource;
pub use crate::names::{AtomId, NameTable};
pub use crate::namespace::{NamespaceResolver, NamespaceScope};
pub use crate::nodes::NodeType;
pub use crate::push::XmlPushReader;
pub use crate::reader::XmlReader;
pub use crate::settings::{
    Conformance, DtdProcessing, EntityHandling, ReaderSettings, WhitespaceHandling,
    WhitespaceLookahead,
};
pub use crate::step::{Step, StepResult};
pub use crate::tokenizer::{
    DefaultAttribute, DefaultAttributeObserver, ReadState, ReaderParts, ReaderStats, XmlSpace,
    XmlTokenizer,
};
