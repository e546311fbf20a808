//! Reader errors.
//!
//! Every error carries the 1-based line/position of the input location that
//! triggered it. Usage and conversion errors are recoverable; everything else
//! moves the reader into its terminal `Error` state.

use std::fmt;
use std::io;
use std::sync::Arc;

/// Well-formedness violations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyntaxError {
    UnexpectedEof { construct: &'static str },
    UnexpectedChar { found: char, expected: &'static str },
    InvalidChar { code_point: u32 },
    InvalidNameStart { found: char },
    InvalidCharRef,
    ExpectedWhitespace,
    TagMismatch {
        expected: String,
        start_line: usize,
        start_position: usize,
        found: String,
    },
    UnexpectedEndTag,
    UnclosedElements { open: String },
    DuplicateAttribute { name: String },
    MultipleRoots,
    MissingRoot,
    DataAtRootLevel,
    CDataEndInText,
    LessThanInAttributeValue,
    UnclosedQuote,
    BadXmlDeclaration { reason: &'static str },
    MisplacedXmlDeclaration,
    ReservedPiTarget,
    DoubleHyphenInComment,
    MisplacedDoctype,
    MultipleDoctypes,
    DoctypeProhibited,
    UndeclaredPrefix { prefix: String },
    ReservedNamespace { prefix: String, uri: String },
    EmptyPrefixedNamespace { prefix: String },
    InvalidXmlSpace { value: String },
    Dtd { message: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodingError {
    Unsupported { label: String },
    IncompatibleDeclaration { detected: &'static str, declared: String },
    Malformed { encoding: &'static str },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityError {
    Undeclared { name: String },
    Unparsed { name: String },
    Recursive { name: String },
    ExternalInAttribute { name: String },
    ExternalInStandalone { name: String },
    /// An element or markup construct started inside an entity's replacement
    /// text and was not closed before it ended (or the reverse).
    CrossesBoundary,
}

/// Misuse of the reader API. These never change parser state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UsageError {
    /// Another resumable operation is suspended on missing input.
    OperationPending { pending: &'static str },
    /// The operation is not valid on the current node type.
    WrongNodeType { operation: &'static str, node_type: &'static str },
    /// A binary read is in progress with the other decoder kind, or a value
    /// chunk read is in progress.
    MixedContentReads,
    ElementHasChildren,
    NotOnEntityReference,
    Closed,
    /// The push reader was fed after `finish()`.
    FeedAfterFinish,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Limit {
    CharactersInDocument,
    CharactersFromEntities,
}

#[derive(Clone, Debug)]
pub enum ErrorKind {
    Syntax(SyntaxError),
    Encoding(EncodingError),
    Entity(EntityError),
    Unresolved {
        uri: String,
        cause: Option<Arc<io::Error>>,
    },
    Usage(UsageError),
    Conversion { value: String, target: &'static str },
    Io(Arc<io::Error>),
    LimitExceeded(Limit),
}

#[derive(Clone, Debug)]
pub struct XmlError {
    kind: ErrorKind,
    line: usize,
    position: usize,
    source_uri: Option<String>,
}

impl XmlError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            line: 0,
            position: 0,
            source_uri: None,
        }
    }

    pub(crate) fn at(mut self, line: usize, position: usize) -> Self {
        self.line = line;
        self.position = position;
        self
    }

    pub(crate) fn with_source(mut self, uri: Option<String>) -> Self {
        self.source_uri = uri;
        self
    }

    pub(crate) fn usage(err: UsageError) -> Self {
        Self::new(ErrorKind::Usage(err))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }

    /// 1-based line of the failure, 0 when no position is known.
    pub fn line(&self) -> usize {
        self.line
    }

    /// 1-based character position within `line()`, 0 when unknown.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn source_uri(&self) -> Option<&str> {
        self.source_uri.as_deref()
    }

    /// Fatal errors put the reader in the `Error` state for good.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.kind,
            ErrorKind::Usage(_) | ErrorKind::Conversion { .. }
        )
    }
}

impl PartialEq for XmlError {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line
            && self.position == other.position
            && self.source_uri == other.source_uri
            && self.kind == other.kind
    }
}

impl PartialEq for ErrorKind {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ErrorKind::Syntax(a), ErrorKind::Syntax(b)) => a == b,
            (ErrorKind::Encoding(a), ErrorKind::Encoding(b)) => a == b,
            (ErrorKind::Entity(a), ErrorKind::Entity(b)) => a == b,
            (ErrorKind::Unresolved { uri: a, .. }, ErrorKind::Unresolved { uri: b, .. }) => a == b,
            (ErrorKind::Usage(a), ErrorKind::Usage(b)) => a == b,
            (
                ErrorKind::Conversion { value: va, target: ta },
                ErrorKind::Conversion { value: vb, target: tb },
            ) => va == vb && ta == tb,
            (ErrorKind::Io(a), ErrorKind::Io(b)) => a.kind() == b.kind(),
            (ErrorKind::LimitExceeded(a), ErrorKind::LimitExceeded(b)) => a == b,
            _ => false,
        }
    }
}

impl From<SyntaxError> for ErrorKind {
    fn from(err: SyntaxError) -> Self {
        ErrorKind::Syntax(err)
    }
}

impl From<EncodingError> for ErrorKind {
    fn from(err: EncodingError) -> Self {
        ErrorKind::Encoding(err)
    }
}

impl From<EntityError> for ErrorKind {
    fn from(err: EntityError) -> Self {
        ErrorKind::Entity(err)
    }
}

impl From<io::Error> for XmlError {
    fn from(err: io::Error) -> Self {
        XmlError::new(ErrorKind::Io(Arc::new(err)))
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::UnexpectedEof { construct } => {
                write!(f, "unexpected end of input while parsing {construct}")
            }
            SyntaxError::UnexpectedChar { found, expected } => {
                write!(f, "unexpected character {found:?}, expected {expected}")
            }
            SyntaxError::InvalidChar { code_point } => {
                write!(f, "invalid character U+{code_point:04X}")
            }
            SyntaxError::InvalidNameStart { found } => {
                write!(f, "name cannot begin with {found:?}")
            }
            SyntaxError::InvalidCharRef => f.write_str("invalid character reference"),
            SyntaxError::ExpectedWhitespace => f.write_str("expected whitespace"),
            SyntaxError::TagMismatch {
                expected,
                start_line,
                start_position,
                found,
            } => write!(
                f,
                "start tag '{expected}' on line {start_line} position {start_position} does not match end tag '{found}'"
            ),
            SyntaxError::UnexpectedEndTag => f.write_str("unexpected end tag"),
            SyntaxError::UnclosedElements { open } => {
                write!(f, "unexpected end of input, element '{open}' is not closed")
            }
            SyntaxError::DuplicateAttribute { name } => {
                write!(f, "attribute '{name}' is specified more than once")
            }
            SyntaxError::MultipleRoots => f.write_str("multiple root elements"),
            SyntaxError::MissingRoot => f.write_str("root element is missing"),
            SyntaxError::DataAtRootLevel => f.write_str("data at the root level is invalid"),
            SyntaxError::CDataEndInText => f.write_str("']]>' is not allowed in text content"),
            SyntaxError::LessThanInAttributeValue => {
                f.write_str("'<' is not allowed in attribute values")
            }
            SyntaxError::UnclosedQuote => f.write_str("attribute value quote is not closed"),
            SyntaxError::BadXmlDeclaration { reason } => {
                write!(f, "malformed XML declaration: {reason}")
            }
            SyntaxError::MisplacedXmlDeclaration => {
                f.write_str("XML declaration is only allowed at the start of the input")
            }
            SyntaxError::ReservedPiTarget => {
                f.write_str("processing instruction target 'xml' is reserved")
            }
            SyntaxError::DoubleHyphenInComment => f.write_str("'--' is not allowed in comments"),
            SyntaxError::MisplacedDoctype => f.write_str("DOCTYPE is not allowed here"),
            SyntaxError::MultipleDoctypes => f.write_str("only one DOCTYPE is allowed"),
            SyntaxError::DoctypeProhibited => f.write_str("DTD processing is prohibited"),
            SyntaxError::UndeclaredPrefix { prefix } => {
                write!(f, "prefix '{prefix}' is not declared")
            }
            SyntaxError::ReservedNamespace { prefix, uri } => {
                write!(f, "prefix '{prefix}' cannot be bound to '{uri}'")
            }
            SyntaxError::EmptyPrefixedNamespace { prefix } => {
                write!(f, "prefix '{prefix}' cannot be bound to an empty namespace")
            }
            SyntaxError::InvalidXmlSpace { value } => {
                write!(f, "invalid xml:space value '{value}'")
            }
            SyntaxError::Dtd { message } => write!(f, "DTD: {message}"),
        }
    }
}

impl fmt::Display for EncodingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncodingError::Unsupported { label } => write!(f, "unsupported encoding '{label}'"),
            EncodingError::IncompatibleDeclaration { detected, declared } => write!(
                f,
                "declared encoding '{declared}' does not match detected encoding {detected}"
            ),
            EncodingError::Malformed { encoding } => {
                write!(f, "invalid byte sequence for encoding {encoding}")
            }
        }
    }
}

impl fmt::Display for EntityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityError::Undeclared { name } => write!(f, "entity '{name}' is not declared"),
            EntityError::Unparsed { name } => {
                write!(f, "unparsed entity '{name}' cannot be referenced here")
            }
            EntityError::Recursive { name } => {
                write!(f, "entity '{name}' references itself")
            }
            EntityError::ExternalInAttribute { name } => {
                write!(f, "external entity '{name}' cannot be referenced in an attribute value")
            }
            EntityError::ExternalInStandalone { name } => write!(
                f,
                "entity '{name}' is declared externally and cannot be used in a standalone document"
            ),
            EntityError::CrossesBoundary => {
                f.write_str("markup crosses an entity replacement text boundary")
            }
        }
    }
}

impl fmt::Display for UsageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UsageError::OperationPending { pending } => {
                write!(f, "'{pending}' is still waiting for input")
            }
            UsageError::WrongNodeType {
                operation,
                node_type,
            } => write!(f, "{operation} is not supported on node type {node_type}"),
            UsageError::MixedContentReads => {
                f.write_str("cannot mix binary decoders or value chunk reads on the same content")
            }
            UsageError::ElementHasChildren => {
                f.write_str("element content reads require an element without child elements")
            }
            UsageError::NotOnEntityReference => {
                f.write_str("the current node is not an entity reference")
            }
            UsageError::Closed => f.write_str("the reader is closed"),
            UsageError::FeedAfterFinish => f.write_str("input was fed after finish()"),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Syntax(err) => err.fmt(f),
            ErrorKind::Encoding(err) => err.fmt(f),
            ErrorKind::Entity(err) => err.fmt(f),
            ErrorKind::Unresolved { uri, cause } => match cause {
                Some(cause) => write!(f, "cannot resolve '{uri}': {cause}"),
                None => write!(f, "cannot resolve '{uri}'"),
            },
            ErrorKind::Usage(err) => err.fmt(f),
            ErrorKind::Conversion { value, target } => {
                write!(f, "cannot convert '{value}' to {target}")
            }
            ErrorKind::Io(err) => write!(f, "I/O error: {err}"),
            ErrorKind::LimitExceeded(Limit::CharactersInDocument) => {
                f.write_str("document exceeds the configured character limit")
            }
            ErrorKind::LimitExceeded(Limit::CharactersFromEntities) => {
                f.write_str("entity expansion exceeds the configured character limit")
            }
        }
    }
}

impl fmt::Display for XmlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.kind.fmt(f)?;
        if self.line > 0 {
            write!(f, " (line {}, position {})", self.line, self.position)?;
        }
        if let Some(uri) = &self.source_uri {
            write!(f, " in {uri}")?;
        }
        Ok(())
    }
}

impl std::error::Error for XmlError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(err) => Some(err.as_ref()),
            ErrorKind::Unresolved {
                cause: Some(cause), ..
            } => Some(cause.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_position() {
        let err = XmlError::new(ErrorKind::Syntax(SyntaxError::MultipleRoots)).at(3, 7);
        assert_eq!(err.to_string(), "multiple root elements (line 3, position 7)");
    }

    #[test]
    fn usage_and_conversion_are_recoverable() {
        assert!(!XmlError::usage(UsageError::Closed).is_fatal());
        let conv = XmlError::new(ErrorKind::Conversion {
            value: "x".to_string(),
            target: "i32",
        });
        assert!(!conv.is_fatal());
        assert!(XmlError::new(SyntaxError::MissingRoot.into()).is_fatal());
    }

    #[test]
    fn tag_mismatch_names_both_tags() {
        let err = SyntaxError::TagMismatch {
            expected: "b".to_string(),
            start_line: 1,
            start_position: 5,
            found: "a".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("'b' on line 1 position 5"));
        assert!(text.contains("end tag 'a'"));
    }
}
