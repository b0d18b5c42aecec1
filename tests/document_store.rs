//! Store lifecycle: load, mutate, batch, undo/redo, save, events.

mod common;

use std::cell::RefCell;
use std::rc::Rc;

use common::{doc_with, frame, text};
use scenedoc::store::{MutationKind, StoreEvent};
use scenedoc::{
    DocumentStore, NodeId, PropertyChange, StoreConfig, canonical_bytes, document_hash,
};
use serde_json::json;

fn fixture() -> scenedoc::Document {
    // `visible` must be present up front: property changes go through
    // `replace`, which fails on a missing key.
    let mut sub = text("t-2", "Sub", "World");
    sub["visible"] = json!(true);
    doc_with(json!([frame(
        "f-1",
        "Hero",
        json!([text("t-1", "Title", "Hello"), sub])
    )]))
}

fn change(node: &str, key: &str, value: serde_json::Value) -> PropertyChange {
    PropertyChange {
        node_id: NodeId::new(node).unwrap(),
        property_key: key.to_owned(),
        new_value: value,
        old_value: None,
    }
}

#[test]
fn full_editing_session() {
    common::init_tracing();
    let mut store = DocumentStore::new(StoreConfig::default());
    store.load(fixture(), None).unwrap();
    let original = canonical_bytes(store.current().unwrap());

    store
        .apply_property_change(&change("t-1", "text", json!("Hello World")))
        .unwrap();
    store
        .apply_property_change(&change("f-1", "name", json!("Hero Banner")))
        .unwrap();
    store
        .apply_batch(&[
            change("t-2", "text", json!("Everyone")),
            change("t-2", "visible", json!(false)),
        ])
        .unwrap();

    assert_eq!(store.history().len(), 3);
    assert_eq!(store.history()[2].kind, MutationKind::Batch);

    let doc = store.current().unwrap();
    assert_eq!(doc.artboards[0].children[0].name(), "Hero Banner");
    assert_eq!(
        doc.artboards[0].children[0].children()[1].text_content(),
        Some("Everyone")
    );

    // Unwind everything: canonical bytes return to the original.
    store.undo().unwrap();
    store.undo().unwrap();
    store.undo().unwrap();
    assert_eq!(canonical_bytes(store.current().unwrap()), original);
}

#[test]
fn mutation_events_chain_hashes() {
    let mut store = DocumentStore::new(StoreConfig::default());
    store.load(fixture(), None).unwrap();

    let h0 = document_hash(store.current().unwrap());
    let e1 = store
        .apply_property_change(&change("t-1", "text", json!("v1")))
        .unwrap();
    let h1 = document_hash(store.current().unwrap());
    let e2 = store
        .apply_property_change(&change("t-1", "text", json!("v2")))
        .unwrap();

    assert_eq!(e1.document_hash, h0, "event i carries the hash as of event i-1");
    assert_eq!(e2.document_hash, h1);
    assert_ne!(e1.mutation_id, e2.mutation_id);
}

#[test]
fn batch_atomicity_across_nodes() {
    let mut store = DocumentStore::new(StoreConfig::default());
    store.load(fixture(), None).unwrap();
    let before = canonical_bytes(store.current().unwrap());

    let err = store
        .apply_batch(&[
            change("t-1", "text", json!("fine")),
            change("ghost", "text", json!("missing node")),
        ])
        .unwrap_err();
    match err {
        scenedoc::StoreError::BatchFailed { index, error } => {
            assert_eq!(index, 1);
            assert_eq!(error.kind(), "node-not-found");
        }
        other => panic!("expected BatchFailed, got {other:?}"),
    }
    assert_eq!(canonical_bytes(store.current().unwrap()), before);
    assert!(store.history().is_empty());
}

#[test]
fn save_and_reload_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("design.json");

    let mut store = DocumentStore::new(StoreConfig::default());
    store.load(fixture(), Some(path.clone())).unwrap();
    store
        .apply_property_change(&change("t-1", "text", json!("Persisted")))
        .unwrap();
    store.save().unwrap();

    let bytes = std::fs::read(&path).unwrap();
    let reloaded = scenedoc::parse(&bytes).unwrap();
    assert_eq!(&reloaded, store.current().unwrap());

    // Saved form is canonical: saving the reload is byte-identical.
    let mut second = DocumentStore::new(StoreConfig::default());
    let path2 = dir.path().join("design2.json");
    second.load(reloaded, Some(path2.clone())).unwrap();
    second.save().unwrap();
    assert_eq!(std::fs::read(&path).unwrap(), std::fs::read(&path2).unwrap());
}

#[test]
fn event_stream_covers_the_session() {
    let events: Rc<RefCell<Vec<String>>> = Rc::default();
    let sink = Rc::clone(&events);

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out.json");

    let mut store = DocumentStore::new(StoreConfig::default());
    store.subscribe(move |event| {
        let tag = match event {
            StoreEvent::DocumentLoaded { node_count, .. } => format!("loaded:{node_count}"),
            StoreEvent::MutationApplied { kind, .. } => format!("mutated:{kind}"),
            StoreEvent::DocumentSaved { .. } => "saved".to_owned(),
            StoreEvent::Undo { .. } => "undo".to_owned(),
            StoreEvent::Redo { .. } => "redo".to_owned(),
        };
        sink.borrow_mut().push(tag);
    });

    store.load(fixture(), Some(path)).unwrap();
    store
        .apply_property_change(&change("t-1", "text", json!("x")))
        .unwrap();
    store.undo().unwrap();
    store.redo().unwrap();
    store.save().unwrap();

    assert_eq!(
        *events.borrow(),
        [
            "loaded:4",
            "mutated:property-change",
            "undo",
            "redo",
            "saved"
        ]
    );
}

#[test]
fn undo_depth_bound_discards_oldest() {
    let mut store = DocumentStore::new(StoreConfig {
        max_undo_depth: 2,
        persistence_path: None,
    });
    store.load(fixture(), None).unwrap();

    for value in ["a", "b", "c", "d"] {
        store
            .apply_property_change(&change("t-1", "text", json!(value)))
            .unwrap();
    }
    assert!(store.undo().is_some());
    assert!(store.undo().is_some());
    assert!(store.undo().is_none());
    assert_eq!(
        store.current().unwrap().artboards[0].children[0].children()[0].text_content(),
        Some("b")
    );
}

#[test]
fn find_node_reflects_latest_mutation() {
    let mut store = DocumentStore::new(StoreConfig::default());
    store.load(fixture(), None).unwrap();

    store
        .apply_property_change(&change("t-1", "name", json!("Renamed")))
        .unwrap();
    let found = store.find_node(&NodeId::new("t-1").unwrap()).unwrap();
    assert_eq!(found.entity.name(), "Renamed");
    assert_eq!(found.parent_id, Some(NodeId::new("f-1").unwrap()));
    assert_eq!(found.depth, 2);
}
