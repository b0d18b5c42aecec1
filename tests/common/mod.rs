//! Shared fixtures for integration tests.
//!
//! Documents are described as JSON values and routed through the public
//! parser, so every fixture exercises the same validation path production
//! input takes.

use scenedoc::Document;
use serde_json::{Value, json};

/// Install a test tracing subscriber once; later calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_test_writer()
        .try_init();
}

/// Parse a full document JSON value through the public API.
pub fn doc(value: &Value) -> Document {
    let bytes = serde_json::to_vec(value).expect("fixture serializes");
    scenedoc::parse(&bytes).expect("fixture is a valid document")
}

/// A single-artboard document with the given children.
pub fn doc_with(children: Value) -> Document {
    doc(&json!({
        "schemaVersion": "0.1.0",
        "id": "doc-1",
        "name": "Fixture",
        "artboards": [{
            "id": "ab-1",
            "name": "Board",
            "frame": {"x": 0, "y": 0, "width": 1440, "height": 900},
            "children": children
        }]
    }))
}

/// A text node value.
pub fn text(id: &str, name: &str, content: &str) -> Value {
    json!({
        "type": "text",
        "id": id,
        "name": name,
        "frame": {"x": 0, "y": 0, "width": 200, "height": 32},
        "text": content
    })
}

/// A frame node value.
pub fn frame(id: &str, name: &str, children: Value) -> Value {
    json!({
        "type": "frame",
        "id": id,
        "name": name,
        "frame": {"x": 0, "y": 0, "width": 600, "height": 400},
        "children": children
    })
}

/// A component node value.
pub fn component(id: &str, name: &str, key: &str, props: Value) -> Value {
    json!({
        "type": "component",
        "id": id,
        "name": name,
        "frame": {"x": 0, "y": 0, "width": 120, "height": 40},
        "componentKey": key,
        "props": props
    })
}

/// Child ids of the first artboard, in order.
pub fn child_ids(document: &Document) -> Vec<String> {
    document.artboards[0]
        .children
        .iter()
        .map(|n| n.id().as_str().to_owned())
        .collect()
}
