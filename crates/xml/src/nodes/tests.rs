use super::*;

#[test]
fn slots_are_reused_and_reset() {
    let mut store = NodeStore::new();
    let slot = store.add_node(0, 0);
    let node = store.get_mut(slot);
    node.node_type = NodeType::Element;
    node.empty_or_default = true;
    node.value = NodeValue::owned("old");
    node.chunks.push(ValueChunk {
        node_type: NodeType::Text,
        name: AtomId::EMPTY,
        value: "x".into(),
        line: 1,
        position: 1,
    });

    store.add_node(0, 3);
    let node = store.get(0);
    assert_eq!(node.node_type, NodeType::None);
    assert_eq!(node.depth, 3);
    assert!(!node.empty_or_default);
    assert!(node.chunks.is_empty());
    assert_eq!(node.value.as_str(&[]), "");
}

#[test]
fn default_node_has_empty_names() {
    let node = NodeData::default();
    assert_eq!(node.node_type, NodeType::None);
    assert_eq!(node.name, AtomId::EMPTY);
    assert_eq!(node.local_name, AtomId::EMPTY);
    assert_eq!(node.prefix, AtomId::default());
    assert_eq!(node.ns, AtomId::EMPTY);
    assert_eq!(node.entity_id, 0);
}

#[test]
fn arena_grows_geometrically() {
    let mut store = NodeStore::new();
    store.add_node(20, 20);
    assert!(store.slots() >= 21);
    assert_eq!(store.get(20).depth, 20);
}

#[test]
fn buffer_values_materialize_on_invalidation() {
    let chars = b"<a>hello</a>\0";
    let mut store = NodeStore::new();
    store.add_node(0, 0);
    store.add_node(1, 1);
    store.get_mut(1).value = NodeValue::buffer(3, 5);
    assert_eq!(store.get(1).value.as_str(chars), "hello");

    store.invalidate(2, chars);
    assert_eq!(store.get(1).value, NodeValue::owned("hello"));
    // independent of the old buffer now
    assert_eq!(store.get(1).value.as_str(b"xxxxxxxx"), "hello");
}

#[test]
fn stale_buffer_values_are_dropped() {
    let mut store = NodeStore::new();
    store.add_node(3, 3);
    store.get_mut(3).value = NodeValue::buffer(0, 2);
    store.forget_stale(1);
    assert!(!store.get(3).value.is_buffer());
}

#[test]
fn owned_mut_materializes_first() {
    let chars = b"abc\0";
    let mut value = NodeValue::buffer(1, 2);
    value.owned_mut(chars).push('!');
    assert_eq!(value.as_str(&[]), "bc!");
    assert!(!value.is_buffer());
}

#[test]
fn node_type_classes() {
    assert!(NodeType::Whitespace.is_text_content());
    assert!(!NodeType::Comment.is_text_content());
    assert!(NodeType::Comment.has_value());
    assert!(!NodeType::Element.has_value());
    assert_eq!(NodeType::CData.as_str(), "CDATA");
}
