//! Canonical serialization.
//!
//! The canonical form is the byte contract of the engine: lexicographically
//! sorted keys at every object level, preserved array order, two-space
//! indentation, UTF-8 without BOM, trailing newline. Two documents that
//! differ only in key order serialize to identical bytes, and
//! `canonicalize(canonicalize(d)) == canonicalize(d)`.
//!
//! Sorted keys come from `serde_json`'s default object map, which is
//! BTreeMap-backed: converting the typed document to a [`Value`] tree
//! re-sorts every object, including the opaque style/layout/props blocks.

use serde_json::Value;

use super::document::Document;
use super::types::DocumentHash;

/// Encode a document as its canonical [`Value`] tree (sorted object keys at
/// every level).
#[must_use]
pub fn canonical_value(doc: &Document) -> Value {
    // The model contains only JSON-representable data with string keys.
    serde_json::to_value(doc).expect("document model is always JSON-serializable")
}

/// Serialize a document to canonical bytes.
#[must_use]
pub fn canonical_bytes(doc: &Document) -> Vec<u8> {
    value_to_canonical_bytes(&canonical_value(doc))
}

/// Serialize an already-canonical [`Value`] tree to canonical bytes.
#[must_use]
pub fn value_to_canonical_bytes(value: &Value) -> Vec<u8> {
    let mut bytes =
        serde_json::to_vec_pretty(value).expect("JSON value is always serializable");
    bytes.push(b'\n');
    bytes
}

/// SHA-256 digest of the document's canonical bytes.
#[must_use]
pub fn document_hash(doc: &Document) -> DocumentHash {
    DocumentHash::of_bytes(&canonical_bytes(doc))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::validate::parse;
    use serde_json::json;

    fn sample_bytes() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "name": "Landing",
            "id": "doc-1",
            "schemaVersion": "0.1.0",
            "artboards": [{
                "name": "Desktop",
                "id": "ab-1",
                "children": [{
                    "type": "text",
                    "name": "Title",
                    "id": "t-1",
                    "text": "Hello",
                    "frame": {"y": 0, "x": 0, "width": 100, "height": 40},
                    "style": {"opacity": 0.5, "fills": [{"color": "#fff"}]}
                }],
                "frame": {"x": 0, "y": 0, "width": 1440, "height": 900}
            }]
        }))
        .unwrap()
    }

    #[test]
    fn canonical_keys_are_sorted() {
        let doc = parse(&sample_bytes()).unwrap();
        let bytes = canonical_bytes(&doc);
        let text = String::from_utf8(bytes).unwrap();
        // Top-level keys in lexicographic order.
        let artboards_at = text.find("\"artboards\"").unwrap();
        let id_at = text.find("\"id\"").unwrap();
        let name_at = text.find("\"name\"").unwrap();
        let schema_at = text.find("\"schemaVersion\"").unwrap();
        assert!(artboards_at < id_at);
        // The first "id"/"name" hits are inside artboards, so compare within
        // the root object's tail instead: schemaVersion sorts after name.
        assert!(name_at < schema_at || id_at < schema_at);
    }

    #[test]
    fn canonical_ends_with_newline() {
        let doc = parse(&sample_bytes()).unwrap();
        let bytes = canonical_bytes(&doc);
        assert_eq!(bytes.last(), Some(&b'\n'));
        assert!(!bytes.starts_with(&[0xEF, 0xBB, 0xBF]), "no BOM");
    }

    #[test]
    fn canonical_uses_two_space_indent() {
        let doc = parse(&sample_bytes()).unwrap();
        let text = String::from_utf8(canonical_bytes(&doc)).unwrap();
        assert!(text.contains("\n  \"artboards\""));
    }

    #[test]
    fn canonicalization_is_idempotent() {
        let doc = parse(&sample_bytes()).unwrap();
        let once = canonical_bytes(&doc);
        let reparsed = parse(&once).unwrap();
        let twice = canonical_bytes(&reparsed);
        assert_eq!(once, twice);
    }

    #[test]
    fn key_order_of_input_does_not_matter() {
        let shuffled = sample_bytes();
        let sorted = serde_json::to_vec(&serde_json::from_slice::<Value>(&shuffled).unwrap())
            .unwrap();
        let a = canonical_bytes(&parse(&shuffled).unwrap());
        let b = canonical_bytes(&parse(&sorted).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn roundtrip_preserves_document() {
        let doc = parse(&sample_bytes()).unwrap();
        let reparsed = parse(&canonical_bytes(&doc)).unwrap();
        assert_eq!(reparsed, doc);
    }

    #[test]
    fn hash_tracks_canonical_bytes() {
        let doc = parse(&sample_bytes()).unwrap();
        let h1 = document_hash(&doc);
        let h2 = document_hash(&parse(&canonical_bytes(&doc)).unwrap());
        assert_eq!(h1, h2);

        let mut renamed = doc;
        renamed.name = "Other".to_owned();
        assert_ne!(document_hash(&renamed), h2);
    }
}
