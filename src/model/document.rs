//! Document and artboard roots of the scene graph.
//!
//! A [`Document`] owns an ordered sequence of [`Artboard`]s; each artboard
//! owns an ordered forest of [`Node`]s. Ownership is exclusive — no shared
//! subtrees, no cycles — so deep copies are honest snapshots.

use serde::{Deserialize, Serialize};

use super::node::Node;
use super::types::{DocumentId, NodeId, Rect, SchemaVersion};

// ---------------------------------------------------------------------------
// Artboard
// ---------------------------------------------------------------------------

/// A top-level container under a document.
///
/// Artboards share the node id namespace but are not [`Node`]s: they carry
/// no visibility, style, or layout of their own.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Artboard {
    /// Unique within the document (shared namespace with nodes).
    pub id: NodeId,
    /// Human label.
    pub name: String,
    /// The artboard's rectangle in abstract document pixels.
    pub frame: Rect,
    /// Root nodes of this artboard, in paint order.
    #[serde(default)]
    pub children: Vec<Node>,
}

impl Artboard {
    /// Create an artboard with no children.
    #[must_use]
    pub const fn new(id: NodeId, name: String, frame: Rect) -> Self {
        Self {
            id,
            name,
            frame,
            children: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Document
// ---------------------------------------------------------------------------

/// Root entity of the scene graph.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Schema version string (`0.1.x` accepted).
    pub schema_version: SchemaVersion,
    /// Globally unique document identifier.
    pub id: DocumentId,
    /// Human label.
    pub name: String,
    /// Ordered artboards.
    #[serde(default)]
    pub artboards: Vec<Artboard>,
}

impl Document {
    /// Create an empty document at the current schema version.
    #[must_use]
    pub fn new(id: DocumentId, name: String) -> Self {
        Self {
            schema_version: SchemaVersion::current(),
            id,
            name,
            artboards: Vec::new(),
        }
    }

    /// Find an artboard by id.
    #[must_use]
    pub fn artboard(&self, id: &NodeId) -> Option<&Artboard> {
        self.artboards.iter().find(|a| &a.id == id)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::node::NodeHeader;

    fn sample() -> Document {
        let mut doc = Document::new(DocumentId::new("doc-1").unwrap(), "Landing".to_owned());
        let mut board = Artboard::new(
            NodeId::new("ab-1").unwrap(),
            "Desktop".to_owned(),
            Rect::new(0.0, 0.0, 1440.0, 900.0),
        );
        board.children.push(Node::text(
            NodeHeader::new(
                NodeId::new("t-1").unwrap(),
                "Title".to_owned(),
                Rect::new(32.0, 32.0, 400.0, 64.0),
            ),
            "Hello".to_owned(),
        ));
        doc.artboards.push(board);
        doc
    }

    #[test]
    fn new_document_uses_current_schema() {
        let doc = Document::new(DocumentId::new("d").unwrap(), "Empty".to_owned());
        assert!(doc.schema_version.is_supported());
        assert!(doc.artboards.is_empty());
    }

    #[test]
    fn artboard_lookup_by_id() {
        let doc = sample();
        assert!(doc.artboard(&NodeId::new("ab-1").unwrap()).is_some());
        assert!(doc.artboard(&NodeId::new("missing").unwrap()).is_none());
    }

    #[test]
    fn document_serializes_camel_case() {
        let doc = sample();
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["schemaVersion"], "0.1.0");
        assert!(json.get("schema_version").is_none());
        assert_eq!(json["artboards"][0]["id"], "ab-1");
    }

    #[test]
    fn document_serde_roundtrip() {
        let doc = sample();
        let json = serde_json::to_string(&doc).unwrap();
        let decoded: Document = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, doc);
    }
}
