//! The tagged node variant and its shared header.
//!
//! Every node is one of three variants — `frame`, `text`, `component` —
//! discriminated by a `"type"` tag in the document format. Shared fields
//! (id, name, visibility, frame, style, layout, semantic key, data) factor
//! into [`NodeHeader`]; variant-specific payload hangs off the tag.
//!
//! Style, layout, and text-style blocks are opaque to the engine: they are
//! stored as JSON objects, compared and merged as units, and never
//! interpreted. `serde_json`'s default object map is ordered, so these
//! blocks serialize canonically for free.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::{IdError, NodeId, Rect};

/// An ordered JSON object, as used for style/layout/props/data blocks.
pub type JsonMap = serde_json::Map<String, Value>;

// ---------------------------------------------------------------------------
// SemanticKey
// ---------------------------------------------------------------------------

/// An opaque dotted key (`hero.title`, `nav.items[0]`) consumed by code
/// generation. The engine validates shape only and never interprets it.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SemanticKey(String);

impl SemanticKey {
    /// Create a semantic key, validating that it is non-empty and free of
    /// whitespace.
    ///
    /// # Errors
    /// Returns an error for empty strings or strings containing whitespace.
    pub fn new(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError {
                value: s.to_owned(),
                reason: "semantic key must not be empty".to_owned(),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(IdError {
                value: s.to_owned(),
                reason: "semantic key must not contain whitespace".to_owned(),
            });
        }
        Ok(Self(s.to_owned()))
    }

    /// Return the key as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SemanticKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SemanticKey {
    type Err = IdError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for SemanticKey {
    type Error = IdError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(&s)
    }
}

impl From<SemanticKey> for String {
    fn from(k: SemanticKey) -> Self {
        k.0
    }
}

// ---------------------------------------------------------------------------
// NodeType
// ---------------------------------------------------------------------------

/// The variant tag of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeType {
    /// A container with an ordered child list.
    Frame,
    /// A text run.
    Text,
    /// A component instance.
    Component,
}

impl NodeType {
    /// The tag string used in the document format.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Frame => "frame",
            Self::Text => "text",
            Self::Component => "component",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// NodeHeader
// ---------------------------------------------------------------------------

/// Fields shared by every node variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeHeader {
    /// Unique within the document; stable across versions (the merge anchor).
    pub id: NodeId,
    /// Human label; not unique.
    pub name: String,
    /// Whether the node renders. Unset renders as `true` but is distinct
    /// from an explicit `true` for diffing and merging.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    /// Position and size in abstract document pixels.
    pub frame: Rect,
    /// Opaque style block (fills, strokes, radius, opacity, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub style: Option<JsonMap>,
    /// Opaque layout block (gap, direction, padding, …).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub layout: Option<JsonMap>,
    /// Opaque code-generation key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub semantic_key: Option<SemanticKey>,
    /// Free-form string→scalar map. The validator enforces scalar values.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<JsonMap>,
}

impl NodeHeader {
    /// Create a header with the required fields; optional blocks start empty.
    #[must_use]
    pub const fn new(id: NodeId, name: String, frame: Rect) -> Self {
        Self {
            id,
            name,
            visible: None,
            frame,
            style: None,
            layout: None,
            semantic_key: None,
            data: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A node in the scene graph.
///
/// Serialized internally tagged (`"type": "frame" | "text" | "component"`)
/// with camelCase field names, matching the document byte format.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Node {
    /// A container node owning an ordered list of children.
    Frame {
        /// Shared header fields.
        #[serde(flatten)]
        header: NodeHeader,
        /// Owned children, in paint order.
        #[serde(default)]
        children: Vec<Node>,
    },
    /// A text node.
    Text {
        /// Shared header fields.
        #[serde(flatten)]
        header: NodeHeader,
        /// The text content.
        text: String,
        /// Opaque text style block.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text_style: Option<JsonMap>,
    },
    /// A component instance node.
    Component {
        /// Shared header fields.
        #[serde(flatten)]
        header: NodeHeader,
        /// Key of the component definition this node instantiates.
        component_key: String,
        /// Instance properties (scalar | array | object values).
        #[serde(default)]
        props: JsonMap,
    },
}

impl Node {
    /// Construct a frame node.
    #[must_use]
    pub const fn frame(header: NodeHeader, children: Vec<Self>) -> Self {
        Self::Frame { header, children }
    }

    /// Construct a text node.
    #[must_use]
    pub const fn text(header: NodeHeader, text: String) -> Self {
        Self::Text {
            header,
            text,
            text_style: None,
        }
    }

    /// Construct a component node.
    #[must_use]
    pub const fn component(header: NodeHeader, component_key: String, props: JsonMap) -> Self {
        Self::Component {
            header,
            component_key,
            props,
        }
    }

    /// Shared header fields.
    #[must_use]
    pub const fn header(&self) -> &NodeHeader {
        match self {
            Self::Frame { header, .. }
            | Self::Text { header, .. }
            | Self::Component { header, .. } => header,
        }
    }

    /// Mutable access to the shared header.
    pub fn header_mut(&mut self) -> &mut NodeHeader {
        match self {
            Self::Frame { header, .. }
            | Self::Text { header, .. }
            | Self::Component { header, .. } => header,
        }
    }

    /// The node id.
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.header().id
    }

    /// The human label.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.header().name
    }

    /// Whether the node renders (unset counts as visible).
    #[must_use]
    pub fn is_visible(&self) -> bool {
        self.header().visible.unwrap_or(true)
    }

    /// The variant tag.
    #[must_use]
    pub const fn node_type(&self) -> NodeType {
        match self {
            Self::Frame { .. } => NodeType::Frame,
            Self::Text { .. } => NodeType::Text,
            Self::Component { .. } => NodeType::Component,
        }
    }

    /// Children of a frame node; empty for leaf variants.
    #[must_use]
    pub fn children(&self) -> &[Self] {
        match self {
            Self::Frame { children, .. } => children,
            Self::Text { .. } | Self::Component { .. } => &[],
        }
    }

    /// Mutable children, if this node is a frame.
    pub fn children_mut(&mut self) -> Option<&mut Vec<Self>> {
        match self {
            Self::Frame { children, .. } => Some(children),
            Self::Text { .. } | Self::Component { .. } => None,
        }
    }

    /// Text content, if this node is a text node.
    #[must_use]
    pub fn text_content(&self) -> Option<&str> {
        match self {
            Self::Text { text, .. } => Some(text),
            Self::Frame { .. } | Self::Component { .. } => None,
        }
    }

    /// Total node count of this subtree, including `self`.
    #[must_use]
    pub fn subtree_size(&self) -> usize {
        1 + self
            .children()
            .iter()
            .map(Self::subtree_size)
            .sum::<usize>()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
