use std::cell::RefCell;
use std::rc::Rc;

use url::Url;
use xml::dtd::EntityKind;
use xml::{
    DefaultAttribute, DtdContext, DtdParser, DtdProcessing, EntityError, EntityHandling,
    ErrorKind, Limit, MemoryResolver, NodeType, ReaderParts, ReaderSettings, SyntaxError,
    XmlError, XmlReader,
};

fn dtd_settings() -> ReaderSettings {
    ReaderSettings {
        dtd_processing: DtdProcessing::Parse,
        ..ReaderSettings::default()
    }
}

fn base() -> Url {
    Url::parse("http://example.com/docs/doc.xml").unwrap()
}

fn resolving_reader(doc: &str, resolver: MemoryResolver) -> XmlReader {
    let parts = ReaderParts {
        resolver: Box::new(resolver),
        base_uri: Some(base()),
        ..ReaderParts::default()
    };
    XmlReader::with_parts(doc, dtd_settings(), parts)
}

fn read_until(reader: &mut XmlReader, node_type: NodeType, name: &str) {
    while reader.read().unwrap() {
        if reader.node_type() == node_type && reader.name() == name {
            return;
        }
    }
    panic!("no {node_type:?} '{name}'");
}

fn first_error(reader: &mut XmlReader) -> XmlError {
    loop {
        match reader.read() {
            Ok(true) => {
                if let Err(err) = reader.value() {
                    return err;
                }
            }
            Ok(false) => panic!("document read without error"),
            Err(err) => return err,
        }
    }
}

#[test]
fn external_entity_resolves_against_base_uri() {
    let resolver = MemoryResolver::new().with(
        "http://example.com/docs/ext.xml",
        "<?xml encoding=\"UTF-8\"?>hello<b/>",
    );
    let mut reader = resolving_reader(
        r#"<!DOCTYPE r [<!ENTITY ext SYSTEM "ext.xml">]><r>&ext;</r>"#,
        resolver,
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::Text);
    assert_eq!(reader.value().unwrap(), "hello");
    assert!(reader.read().unwrap());
    assert_eq!((reader.node_type(), reader.name()), (NodeType::Element, "b"));
    assert_eq!(
        reader.base_uri().map(Url::as_str),
        Some("http://example.com/docs/ext.xml")
    );
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::EndElement);
    assert_eq!(
        reader.base_uri().map(Url::as_str),
        Some("http://example.com/docs/doc.xml")
    );
}

#[test]
fn unresolvable_external_entity_names_its_uri() {
    let mut reader = resolving_reader(
        r#"<!DOCTYPE r [<!ENTITY ext SYSTEM "missing.xml">]><r>&ext;</r>"#,
        MemoryResolver::new(),
    );
    let err = first_error(&mut reader);
    assert!(matches!(
        err.kind(),
        ErrorKind::Unresolved { uri, cause: None } if uri == "http://example.com/docs/missing.xml"
    ));
    assert!(err.is_fatal());
}

#[test]
fn missing_external_subset_is_skipped() {
    let mut reader = resolving_reader(r#"<!DOCTYPE r SYSTEM "none.dtd"><r/>"#, MemoryResolver::new());
    assert!(reader.read().unwrap());
    assert_eq!(reader.node_type(), NodeType::DocumentType);
    assert_eq!(reader.get_attribute("SYSTEM"), Some("none.dtd"));
    assert!(reader.read().unwrap());
    assert_eq!(reader.name(), "r");
}

#[test]
fn external_subset_declares_entities_and_defaults() {
    let resolver = MemoryResolver::new().with(
        "http://example.com/docs/doc.dtd",
        r#"<!ENTITY who "world"><!ATTLIST r v CDATA "d">"#,
    );
    let mut reader = resolving_reader(
        r#"<!DOCTYPE r SYSTEM "doc.dtd"><r>hello &who;</r>"#,
        resolver,
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert_eq!(reader.get_attribute("v"), Some("d"));
    let info = reader.dtd_info().expect("DOCTYPE parsed");
    assert!(info.entity("who").is_some_and(|decl| decl.declared_externally));
    assert!(reader.read().unwrap());
    assert_eq!(reader.read_content_as_string().unwrap(), "hello world");
}

#[test]
fn internal_subset_wins_over_external() {
    let resolver = MemoryResolver::new().with(
        "http://example.com/docs/doc.dtd",
        r#"<!ENTITY who "external">"#,
    );
    let mut reader = resolving_reader(
        r#"<!DOCTYPE r SYSTEM "doc.dtd" [<!ENTITY who "internal">]><r>&who;</r>"#,
        resolver,
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert!(reader.read().unwrap());
    assert_eq!(reader.read_content_as_string().unwrap(), "internal");
}

#[test]
fn parameter_entities_expand_in_the_subset() {
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [<!ENTITY % decl "<!ENTITY e 'from pe'>">%decl;]><r>&e;</r>"#,
        dtd_settings(),
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert!(reader.read().unwrap());
    assert_eq!(reader.read_content_as_string().unwrap(), "from pe");
}

#[test]
fn undeclared_parameter_entity_is_an_error() {
    let mut reader = XmlReader::from_str(r#"<!DOCTYPE r [%nope;]><r/>"#, dtd_settings());
    let err = reader.read().unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Syntax(SyntaxError::Dtd { .. })));
}

#[test]
fn entity_expansion_is_limited() {
    let settings = ReaderSettings {
        max_characters_from_entities: Some(500),
        ..dtd_settings()
    };
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [
<!ENTITY a "aaaaaaaaaa">
<!ENTITY b "&a;&a;&a;&a;&a;&a;&a;&a;&a;&a;">
<!ENTITY c "&b;&b;&b;&b;&b;&b;&b;&b;&b;&b;">
]><r>&c;</r>"#,
        settings,
    );
    let err = first_error(&mut reader);
    assert_eq!(
        err.kind(),
        &ErrorKind::LimitExceeded(Limit::CharactersFromEntities)
    );
}

#[test]
fn document_size_is_limited() {
    let settings = ReaderSettings {
        max_characters_in_document: Some(64),
        ..ReaderSettings::default()
    };
    let doc = format!("<r>{}</r>", "x".repeat(200));
    let mut reader = XmlReader::from_str(&doc, settings);
    let err = first_error(&mut reader);
    assert_eq!(
        err.kind(),
        &ErrorKind::LimitExceeded(Limit::CharactersInDocument)
    );
}

#[test]
fn unparsed_entity_reference_is_rejected() {
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [
<!NOTATION gif SYSTEM "image/gif">
<!ENTITY pic SYSTEM "pic.gif" NDATA gif>
]><r>&pic;</r>"#,
        dtd_settings(),
    );
    let err = first_error(&mut reader);
    assert!(matches!(
        err.kind(),
        ErrorKind::Entity(EntityError::Unparsed { name }) if name == "pic"
    ));
}

#[test]
fn markup_may_not_cross_entity_boundaries() {
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [<!ENTITY open "<a>">]><r>&open;</a></r>"#,
        dtd_settings(),
    );
    let err = first_error(&mut reader);
    assert_eq!(err.kind(), &ErrorKind::Entity(EntityError::CrossesBoundary));
}

#[test]
fn external_entity_in_attribute_is_rejected() {
    let mut reader = resolving_reader(
        r#"<!DOCTYPE r [<!ENTITY ext SYSTEM "ext.xml">]><r a="&ext;"/>"#,
        MemoryResolver::new().with("http://example.com/docs/ext.xml", "x"),
    );
    let err = first_error(&mut reader);
    assert!(matches!(
        err.kind(),
        ErrorKind::Entity(EntityError::ExternalInAttribute { name }) if name == "ext"
    ));
}

#[test]
fn default_attributes_are_observed() {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let parts = ReaderParts {
        default_attribute_observer: Some(Box::new(move |attr: DefaultAttribute<'_>| {
            sink.borrow_mut()
                .push(format!("{}@{}={}", attr.element, attr.name, attr.value));
        })),
        ..ReaderParts::default()
    };
    let mut reader = XmlReader::with_parts(
        r#"<!DOCTYPE r [<!ATTLIST r a CDATA "1" b CDATA #IMPLIED c CDATA #FIXED "3">]><r c="3"/>"#,
        dtd_settings(),
        parts,
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert_eq!(reader.attribute_count(), 2);
    assert!(reader.move_to_attribute("a").unwrap());
    assert!(reader.is_default());
    assert!(reader.move_to_attribute("c").unwrap());
    assert!(!reader.is_default());
    assert_eq!(*seen.borrow(), vec!["r@a=1".to_string()]);
}

#[test]
fn tokenized_attribute_types_are_normalized() {
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [<!ATTLIST r t NMTOKENS #IMPLIED>]><r t="  a   b  " u="  a   b  "/>"#,
        dtd_settings(),
    );
    read_until(&mut reader, NodeType::Element, "r");
    assert_eq!(reader.get_attribute("t"), Some("a b"));
    assert_eq!(reader.get_attribute("u"), Some("  a   b  "));
}

struct FixedEntities;

impl DtdParser for FixedEntities {
    fn parse_internal_subset(
        &mut self,
        ctx: &mut DtdContext<'_>,
        _subset: &str,
    ) -> Result<(), XmlError> {
        ctx.declare_entity(
            "made",
            EntityKind::Internal {
                text: "by hand".to_string(),
            },
            false,
        );
        Ok(())
    }

    fn parse_external_subset(
        &mut self,
        _ctx: &mut DtdContext<'_>,
        _subset: &str,
    ) -> Result<(), XmlError> {
        Ok(())
    }
}

#[test]
fn dtd_parser_is_pluggable() {
    let parts = ReaderParts {
        dtd_parser: Box::new(FixedEntities),
        ..ReaderParts::default()
    };
    let mut reader = XmlReader::with_parts("<!DOCTYPE r [ ]><r>&made;</r>", dtd_settings(), parts);
    read_until(&mut reader, NodeType::Element, "r");
    assert!(reader.read().unwrap());
    assert_eq!(reader.read_content_as_string().unwrap(), "by hand");
}

#[test]
fn manual_resolution_in_blocking_reader() {
    let settings = ReaderSettings {
        entity_handling: EntityHandling::ExpandCharEntities,
        ..dtd_settings()
    };
    let mut reader = XmlReader::from_str(
        r#"<!DOCTYPE r [<!ENTITY e "one &f; three"><!ENTITY f "two">]><r>&e;</r>"#,
        settings,
    );
    read_until(&mut reader, NodeType::EntityReference, "e");
    reader.resolve_entity().unwrap();
    let mut seen = Vec::new();
    while reader.read().unwrap() {
        let value = if reader.has_value() {
            reader.value().unwrap().to_string()
        } else {
            String::new()
        };
        seen.push(format!("{}:{}:{}", reader.node_type().as_str(), reader.name(), value));
        if reader.node_type() == NodeType::EndEntity {
            break;
        }
    }
    assert_eq!(
        seen,
        vec![
            "Text::one ",
            "EntityReference:f:",
            "Text:: three",
            "EndEntity:e:",
        ]
    );
}
