use super::*;
use crate::entity::{MemoryResolver, NullResolver};

fn parse_internal(subset: &str) -> Result<DtdInfo, XmlError> {
    let mut info = DtdInfo::new("doc");
    let mut resolver = NullResolver;
    let mut ctx = DtdContext::new(&mut info, &mut resolver, None, (1, 1));
    BasicDtdParser::new().parse_internal_subset(&mut ctx, subset)?;
    Ok(info)
}

#[test]
fn internal_entities_expand_char_refs_and_keep_general_refs() {
    let info = parse_internal(r#"<!ENTITY e "X&amp;Y&#65;"> <!ENTITY f 'a&#x0D;b'>"#).unwrap();
    assert_eq!(info.entity("e").unwrap().text(), Some("X&amp;YA"));
    assert_eq!(info.entity("f").unwrap().text(), Some("a\rb"));
    assert!(!info.entity("e").unwrap().declared_externally);
}

#[test]
fn first_declaration_wins_and_ids_are_distinct() {
    let info = parse_internal(r#"<!ENTITY e "one"><!ENTITY e "two"><!ENTITY g "three">"#).unwrap();
    let e = info.entity("e").unwrap();
    assert_eq!(e.text(), Some("one"));
    assert_ne!(e.id, info.entity("g").unwrap().id);
    assert_ne!(e.id, 0);
}

#[test]
fn external_and_unparsed_entities() {
    let info = parse_internal(
        r#"<!ENTITY ext SYSTEM "ext.xml">
           <!ENTITY pub PUBLIC "-//X//EN" "pub.xml">
           <!ENTITY pic SYSTEM "pic.png" NDATA png>"#,
    )
    .unwrap();
    assert_eq!(
        info.entity("ext").unwrap().kind,
        EntityKind::External {
            public_id: None,
            system_id: "ext.xml".to_string()
        }
    );
    assert!(info.entity("pub").unwrap().is_external());
    assert!(info.entity("pic").unwrap().is_unparsed());
}

#[test]
fn attlist_types_and_defaults() {
    let info = parse_internal(
        r#"<!ATTLIST item
              id ID #REQUIRED
              kind (a|b| c) "b"
              note CDATA "  two  words "
              tokens NMTOKENS "  x   y "
              lang CDATA #FIXED "en">"#,
    )
    .unwrap();
    let attrs = info.attributes("item");
    assert_eq!(attrs.len(), 5);
    assert_eq!(attrs[0].default, DefaultDecl::Required);
    assert_eq!(
        attrs[1].ty,
        AttributeType::Enumeration(vec!["a".into(), "b".into(), "c".into()])
    );
    assert_eq!(attrs[2].default.value(), Some("  two  words "));
    assert_eq!(attrs[3].default.value(), Some("x y"));
    assert_eq!(attrs[4].default, DefaultDecl::Fixed("en".into()));
    assert!(info.has_attribute_defaults());
}

#[test]
fn default_values_expand_internal_entities() {
    let info = parse_internal(
        r#"<!ENTITY who "world"><!ATTLIST a greet CDATA "hello &who;&#33;">"#,
    )
    .unwrap();
    assert_eq!(
        info.attribute("a", "greet").unwrap().default.value(),
        Some("hello world!")
    );
}

#[test]
fn less_than_in_default_is_rejected() {
    let err = parse_internal(r#"<!ATTLIST a b CDATA "x<y">"#).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Syntax(SyntaxError::Dtd { .. })));
}

#[test]
fn skips_element_notation_comments_and_pis() {
    let info = parse_internal(
        "<!ELEMENT doc (#PCDATA|b)*>\n<!-- c > -->\n<?pi data?>\n<!NOTATION png SYSTEM \"image/png\">\n<!ENTITY e 'v'>",
    )
    .unwrap();
    assert_eq!(info.entity_count(), 1);
}

#[test]
fn parameter_entities_between_declarations() {
    let info = parse_internal(r#"<!ENTITY % decls '<!ENTITY inner "x">'> %decls;"#).unwrap();
    assert_eq!(info.entity("inner").unwrap().text(), Some("x"));
    assert!(info.param_entity("decls").is_some());
}

#[test]
fn parameter_reference_inside_internal_declaration_is_rejected() {
    let err = parse_internal(r#"<!ENTITY % p "x"><!ENTITY e "%p;">"#).unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::Syntax(SyntaxError::Dtd { .. })));
}

#[test]
fn errors_report_document_positions() {
    let mut info = DtdInfo::new("doc");
    let mut resolver = NullResolver;
    let mut ctx = DtdContext::new(&mut info, &mut resolver, None, (3, 10));
    let err = BasicDtdParser::new()
        .parse_internal_subset(&mut ctx, "\n  <!BOGUS>")
        .unwrap_err();
    assert_eq!(err.line(), 4);
    assert_eq!(err.position(), 3);
}

#[test]
fn external_subset_conditionals_and_parameter_refs() {
    let mut info = DtdInfo::new("doc");
    let mut resolver = MemoryResolver::new().with(
        "file:///dtd/mod.ent",
        r#"<!ENTITY from-mod "m">"#,
    );
    let base = Url::parse("file:///dtd/main.dtd").unwrap();
    let mut ctx = DtdContext::new(&mut info, &mut resolver, Some(base.clone()), (1, 1));
    let subset = r#"<?xml version="1.0" encoding="UTF-8"?>
        <!ENTITY % on "INCLUDE">
        <!ENTITY % mod SYSTEM "mod.ent">
        <![%on;[ <!ENTITY kept "k"> ]]>
        <![IGNORE[ <![INCLUDE[ <!ENTITY dropped "d"> ]]> ]]>
        <!ENTITY % ty "CDATA">
        <!ATTLIST a b %ty; "v">
        %mod;"#;
    let stripped = strip_text_declaration(subset.to_string());
    let mut parser = BasicDtdParser::new();
    ctx.with_external(Some(base), |ctx| parser.parse_external_subset(ctx, &stripped))
        .unwrap();
    drop(ctx);
    assert_eq!(info.entity("kept").unwrap().text(), Some("k"));
    assert!(info.entity("kept").unwrap().declared_externally);
    assert!(info.entity("dropped").is_none());
    assert_eq!(info.attribute("a", "b").unwrap().ty, AttributeType::CData);
    assert_eq!(info.entity("from-mod").unwrap().text(), Some("m"));
}

#[test]
fn conditional_sections_are_rejected_in_internal_subset() {
    assert!(parse_internal("<![INCLUDE[ ]]>").is_err());
}

#[test]
fn recursive_parameter_entity_is_detected() {
    // the character reference smuggles a self-reference into the replacement text
    let err = parse_internal(r#"<!ENTITY % a "&#37;a;"> %a;"#).unwrap_err();
    assert!(matches!(
        err.kind(),
        ErrorKind::Entity(crate::error::EntityError::Recursive { .. })
    ));
}

#[test]
fn collapse_folds_spaces() {
    assert_eq!(collapse_whitespace("  a   b c  "), "a b c");
    assert_eq!(collapse_whitespace("   "), "");
}
