//! Semantic diff between two documents.
//!
//! Nodes are paired by id (ids are stable across versions). For each id in
//! both documents the engine compares fields in a fixed order and emits one
//! `modify` operation per changed field. Ids only in `from` emit `remove`
//! (descendants included, deepest first); ids only in `to` emit `add`
//! (shallowest first); an id whose parent or sibling position changed emits
//! `move`.
//!
//! Operation order is part of the contract: removes, then adds, then moves
//! (by source path), then modifies (by target path); ties broken by node id.
//! The output is a pure function of the two documents.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::index::{DocEntity, NodePath};
use crate::model::document::Document;
use crate::model::node::Node;
use crate::model::types::{DocumentId, NodeId, Severity};

use super::types::CancelToken;

// ---------------------------------------------------------------------------
// DiffField
// ---------------------------------------------------------------------------

/// A comparable field of a node, in the fixed comparison order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum DiffField {
    /// Human label.
    #[serde(rename = "name")]
    Name,
    /// Visibility flag.
    #[serde(rename = "visible")]
    Visible,
    /// Frame x offset.
    #[serde(rename = "frame.x")]
    FrameX,
    /// Frame y offset.
    #[serde(rename = "frame.y")]
    FrameY,
    /// Frame width.
    #[serde(rename = "frame.width")]
    FrameWidth,
    /// Frame height.
    #[serde(rename = "frame.height")]
    FrameHeight,
    /// Layout block, compared as a unit.
    #[serde(rename = "layout")]
    Layout,
    /// Style block, compared as a unit.
    #[serde(rename = "style")]
    Style,
    /// Text content.
    #[serde(rename = "text")]
    Text,
    /// Text style block, compared as a unit.
    #[serde(rename = "textStyle")]
    TextStyle,
    /// Component definition key.
    #[serde(rename = "componentKey")]
    ComponentKey,
    /// Component props, compared key-wise by the conflict detector.
    #[serde(rename = "props")]
    Props,
}

/// Which diff-option gate a field belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FieldCategory {
    /// Gated by `include_property`.
    Property,
    /// Gated by `include_content`.
    Content,
    /// Gated by `include_metadata`.
    Metadata,
}

impl DiffField {
    /// The fixed comparison order.
    pub const COMPARE_ORDER: [Self; 12] = [
        Self::Name,
        Self::Visible,
        Self::FrameX,
        Self::FrameY,
        Self::FrameWidth,
        Self::FrameHeight,
        Self::Layout,
        Self::Style,
        Self::Text,
        Self::TextStyle,
        Self::ComponentKey,
        Self::Props,
    ];

    /// The wire name (`"frame.x"`, `"componentKey"`, …).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Name => "name",
            Self::Visible => "visible",
            Self::FrameX => "frame.x",
            Self::FrameY => "frame.y",
            Self::FrameWidth => "frame.width",
            Self::FrameHeight => "frame.height",
            Self::Layout => "layout",
            Self::Style => "style",
            Self::Text => "text",
            Self::TextStyle => "textStyle",
            Self::ComponentKey => "componentKey",
            Self::Props => "props",
        }
    }

    /// The option gate this field belongs to.
    #[must_use]
    pub const fn category(self) -> FieldCategory {
        match self {
            Self::Name => FieldCategory::Metadata,
            Self::Visible
            | Self::FrameX
            | Self::FrameY
            | Self::FrameWidth
            | Self::FrameHeight
            | Self::Layout
            | Self::Style => FieldCategory::Property,
            Self::Text | Self::TextStyle | Self::ComponentKey | Self::Props => {
                FieldCategory::Content
            }
        }
    }

    /// Position in the fixed comparison order (modify tie-break).
    #[must_use]
    fn order_index(self) -> usize {
        Self::COMPARE_ORDER
            .iter()
            .position(|f| *f == self)
            .unwrap_or(usize::MAX)
    }
}

impl fmt::Display for DiffField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Operations
// ---------------------------------------------------------------------------

/// The kind of a diff operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffOpKind {
    /// Node exists only in `to`.
    Add,
    /// Node exists only in `from`.
    Remove,
    /// Node changed parent or sibling position.
    Move,
    /// A field value changed.
    Modify,
}

impl fmt::Display for DiffOpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Add => write!(f, "add"),
            Self::Remove => write!(f, "remove"),
            Self::Move => write!(f, "move"),
            Self::Modify => write!(f, "modify"),
        }
    }
}

/// Presentation metadata attached to every operation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationMetadata {
    /// Human-readable description.
    pub description: String,
    /// Severity for UI triage.
    pub severity: Severity,
}

/// One semantic difference.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffOperation {
    /// Operation kind.
    #[serde(rename = "type")]
    pub kind: DiffOpKind,
    /// The affected node id.
    pub node_id: NodeId,
    /// The changed field, for `modify` operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<DiffField>,
    /// Prior value (field value, or placement for moves/removes).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
    /// New value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<Value>,
    /// Presentation metadata.
    pub metadata: OperationMetadata,
}

/// Histogram over an operation list.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffSummary {
    /// `add` operations.
    pub added: usize,
    /// `remove` operations.
    pub removed: usize,
    /// `move` operations.
    pub moved: usize,
    /// `modify` operations.
    pub modified: usize,
    /// All operations.
    pub total: usize,
}

/// Provenance and timing of a diff run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiffMetadata {
    /// Id of the `from` document.
    pub from_document_id: DocumentId,
    /// Id of the `to` document.
    pub to_document_id: DocumentId,
    /// Wall-clock start, milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Elapsed milliseconds.
    pub duration: u64,
}

/// The complete result of a diff run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DocumentDiff {
    /// Operations in the contractual order.
    pub operations: Vec<DiffOperation>,
    /// Histogram over `operations`.
    pub summary: DiffSummary,
    /// Provenance and timing.
    pub metadata: DiffMetadata,
}

impl DocumentDiff {
    /// `true` when the documents are semantically identical.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Options / errors
// ---------------------------------------------------------------------------

/// Default safety cap on emitted operations.
pub const DEFAULT_MAX_OPERATIONS: usize = 100_000;
/// Default cancellation-check interval, in node visits.
pub const DEFAULT_YIELD_EVERY: usize = 1_000;

/// Tuning for a diff run.
#[derive(Clone, Debug)]
pub struct DiffOptions {
    /// Emit add/remove/move operations.
    pub include_structural: bool,
    /// Emit visible/frame/layout/style modifications.
    pub include_property: bool,
    /// Emit text/text-style/component modifications.
    pub include_content: bool,
    /// Emit name modifications.
    pub include_metadata: bool,
    /// Safety cap; exceeding it fails the diff.
    pub max_operations: usize,
    /// Check cancellation/deadline every N node visits.
    pub yield_every: usize,
    /// Cooperative cancellation signal.
    pub cancel: Option<CancelToken>,
    /// Wall-clock deadline; exceeded → `timeout`.
    pub deadline: Option<Instant>,
}

impl Default for DiffOptions {
    fn default() -> Self {
        Self {
            include_structural: true,
            include_property: true,
            include_content: true,
            include_metadata: true,
            max_operations: DEFAULT_MAX_OPERATIONS,
            yield_every: DEFAULT_YIELD_EVERY,
            cancel: None,
            deadline: None,
        }
    }
}

impl DiffOptions {
    const fn includes(&self, category: FieldCategory) -> bool {
        match category {
            FieldCategory::Property => self.include_property,
            FieldCategory::Content => self.include_content,
            FieldCategory::Metadata => self.include_metadata,
        }
    }
}

/// The machine-stable kind of a diff failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DiffErrorKind {
    /// More operations than `max_operations` would be emitted.
    OperationLimit,
    /// The cancellation token fired.
    Cancelled,
    /// The deadline passed.
    Timeout,
}

impl DiffErrorKind {
    /// Stable tag.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OperationLimit => "operation-limit",
            Self::Cancelled => "cancelled",
            Self::Timeout => "timeout",
        }
    }
}

/// A failed diff. No partial operations are observable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiffError {
    /// What went wrong.
    pub kind: DiffErrorKind,
    /// Human-readable detail.
    pub message: String,
}

impl fmt::Display for DiffError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

impl std::error::Error for DiffError {}

// ---------------------------------------------------------------------------
// Entity placement table
// ---------------------------------------------------------------------------

/// Placement of one entity within its document.
pub(crate) struct EntityInfo<'doc> {
    pub(crate) entity: DocEntity<'doc>,
    pub(crate) path: NodePath,
    pub(crate) parent: Option<NodeId>,
    pub(crate) position: usize,
    pub(crate) depth: usize,
}

/// Build the id → placement table for a document.
pub(crate) fn collect(doc: &Document) -> BTreeMap<NodeId, EntityInfo<'_>> {
    let mut map = BTreeMap::new();
    for (ai, artboard) in doc.artboards.iter().enumerate() {
        let path = NodePath::artboard(ai);
        map.insert(
            artboard.id.clone(),
            EntityInfo {
                entity: DocEntity::Artboard(artboard),
                path: path.clone(),
                parent: None,
                position: ai,
                depth: 0,
            },
        );
        for (ci, child) in artboard.children.iter().enumerate() {
            collect_node(child, path.child(ci), &artboard.id, ci, &mut map);
        }
    }
    map
}

fn collect_node<'doc>(
    node: &'doc Node,
    path: NodePath,
    parent: &NodeId,
    position: usize,
    map: &mut BTreeMap<NodeId, EntityInfo<'doc>>,
) {
    let depth = path.depth();
    map.insert(
        node.id().clone(),
        EntityInfo {
            entity: DocEntity::Node(node),
            path: path.clone(),
            parent: Some(parent.clone()),
            position,
            depth,
        },
    );
    for (ci, child) in node.children().iter().enumerate() {
        collect_node(child, path.child(ci), node.id(), ci, map);
    }
}

/// `true` if two versions of an id are the same kind of thing. A variant
/// change (or artboard↔node change) is treated as a remove + add pair —
/// identity does not survive a type change.
pub(crate) fn same_shape(a: &DocEntity<'_>, b: &DocEntity<'_>) -> bool {
    a.node_type() == b.node_type()
        && matches!(
            (a, b),
            (DocEntity::Artboard(_), DocEntity::Artboard(_))
                | (DocEntity::Node(_), DocEntity::Node(_))
        )
}

/// Canonical JSON of an entity without its children (so subtree operations
/// stay linear in the subtree size).
fn shallow_value(entity: &DocEntity<'_>) -> Value {
    let mut value = match entity {
        DocEntity::Artboard(a) => {
            serde_json::to_value(a).expect("artboard is always JSON-serializable")
        }
        DocEntity::Node(n) => serde_json::to_value(n).expect("node is always JSON-serializable"),
    };
    if let Some(obj) = value.as_object_mut() {
        obj.remove("children");
    }
    value
}

// ---------------------------------------------------------------------------
// Field extraction
// ---------------------------------------------------------------------------

/// The comparable value of one field, or `None` when the field does not
/// apply to this entity kind.
pub(crate) fn field_value(entity: &DocEntity<'_>, field: DiffField) -> Option<Value> {
    match (entity, field) {
        (e, DiffField::Name) => Some(json!(e.name())),
        (e, DiffField::FrameX) => Some(json!(e.frame().x)),
        (e, DiffField::FrameY) => Some(json!(e.frame().y)),
        (e, DiffField::FrameWidth) => Some(json!(e.frame().width)),
        (e, DiffField::FrameHeight) => Some(json!(e.frame().height)),
        // Raw tri-state: unset diffs as absent, distinct from explicit true.
        (DocEntity::Node(n), DiffField::Visible) => n.header().visible.map(|b| json!(b)),
        (DocEntity::Node(n), DiffField::Layout) => {
            n.header().layout.as_ref().map(|m| Value::Object(m.clone()))
        }
        (DocEntity::Node(n), DiffField::Style) => {
            n.header().style.as_ref().map(|m| Value::Object(m.clone()))
        }
        (DocEntity::Node(n), DiffField::Text) => n.text_content().map(|t| json!(t)),
        (DocEntity::Node(Node::Text { text_style, .. }), DiffField::TextStyle) => {
            text_style.as_ref().map(|m| Value::Object(m.clone()))
        }
        (DocEntity::Node(Node::Component { component_key, .. }), DiffField::ComponentKey) => {
            Some(json!(component_key))
        }
        (DocEntity::Node(Node::Component { props, .. }), DiffField::Props) => {
            Some(Value::Object(props.clone()))
        }
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

struct Ticker<'opt> {
    visits: usize,
    yield_every: usize,
    cancel: Option<&'opt CancelToken>,
    deadline: Option<Instant>,
}

impl Ticker<'_> {
    fn tick(&mut self) -> Result<(), DiffError> {
        self.visits += 1;
        if self.visits % self.yield_every.max(1) != 0 {
            return Ok(());
        }
        if self.cancel.is_some_and(CancelToken::is_cancelled) {
            return Err(DiffError {
                kind: DiffErrorKind::Cancelled,
                message: format!("cancelled after {} node visits", self.visits),
            });
        }
        if self.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(DiffError {
                kind: DiffErrorKind::Timeout,
                message: format!("deadline exceeded after {} node visits", self.visits),
            });
        }
        Ok(())
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

/// Compute the semantic diff from `from` to `to`.
///
/// # Errors
/// Fails with `operation-limit` when the cap is exceeded, `cancelled` when
/// the token fires, or `timeout` past the deadline. No partial result is
/// observable on failure.
pub fn diff(
    from: &Document,
    to: &Document,
    options: &DiffOptions,
) -> Result<DocumentDiff, DiffError> {
    let timestamp = now_ms();
    let started = Instant::now();

    let from_map = collect(from);
    let to_map = collect(to);

    let mut ticker = Ticker {
        visits: 0,
        yield_every: options.yield_every,
        cancel: options.cancel.as_ref(),
        deadline: options.deadline,
    };

    // (sort key, operation) per class; keys strip down to the contract order.
    let mut removes: Vec<(std::cmp::Reverse<usize>, NodeId, DiffOperation)> = Vec::new();
    let mut adds: Vec<(usize, NodeId, DiffOperation)> = Vec::new();
    let mut moves: Vec<(NodePath, NodeId, DiffOperation)> = Vec::new();
    let mut modifies: Vec<(NodePath, NodeId, usize, DiffOperation)> = Vec::new();

    for (id, from_info) in &from_map {
        ticker.tick()?;
        match to_map.get(id) {
            None => {
                if options.include_structural {
                    removes.push(make_remove(id, from_info));
                }
            }
            Some(to_info) if !same_shape(&from_info.entity, &to_info.entity) => {
                if options.include_structural {
                    removes.push(make_remove(id, from_info));
                    adds.push(make_add(id, to_info));
                }
            }
            Some(to_info) => {
                if options.include_structural
                    && (from_info.parent != to_info.parent
                        || from_info.position != to_info.position)
                {
                    moves.push(make_move(id, from_info, to_info));
                }
                for field in DiffField::COMPARE_ORDER {
                    if !options.includes(field.category()) {
                        continue;
                    }
                    let old = field_value(&from_info.entity, field);
                    let new = field_value(&to_info.entity, field);
                    if old != new {
                        modifies.push(make_modify(id, to_info, field, old, new));
                    }
                }
            }
        }
    }

    if options.include_structural {
        for (id, to_info) in &to_map {
            ticker.tick()?;
            if !from_map.contains_key(id) {
                adds.push(make_add(id, to_info));
            }
        }
    }

    let total = removes.len() + adds.len() + moves.len() + modifies.len();
    if total > options.max_operations {
        return Err(DiffError {
            kind: DiffErrorKind::OperationLimit,
            message: format!(
                "{total} operations exceed the cap of {}",
                options.max_operations
            ),
        });
    }

    removes.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    adds.sort_by(|a, b| (a.0, &a.1).cmp(&(b.0, &b.1)));
    moves.sort_by(|a, b| (&a.0, &a.1).cmp(&(&b.0, &b.1)));
    modifies.sort_by(|a, b| (&a.0, &a.1, a.2).cmp(&(&b.0, &b.1, b.2)));

    let mut operations = Vec::with_capacity(total);
    operations.extend(removes.into_iter().map(|(_, _, op)| op));
    operations.extend(adds.into_iter().map(|(_, _, op)| op));
    operations.extend(moves.into_iter().map(|(_, _, op)| op));
    operations.extend(modifies.into_iter().map(|(_, _, _, op)| op));

    let mut summary = DiffSummary::default();
    for op in &operations {
        match op.kind {
            DiffOpKind::Add => summary.added += 1,
            DiffOpKind::Remove => summary.removed += 1,
            DiffOpKind::Move => summary.moved += 1,
            DiffOpKind::Modify => summary.modified += 1,
        }
        summary.total += 1;
    }

    let duration = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    tracing::debug!(
        from = %from.id,
        to = %to.id,
        total = summary.total,
        "diff complete"
    );

    Ok(DocumentDiff {
        operations,
        summary,
        metadata: DiffMetadata {
            from_document_id: from.id.clone(),
            to_document_id: to.id.clone(),
            timestamp,
            duration,
        },
    })
}

fn make_remove(
    id: &NodeId,
    info: &EntityInfo<'_>,
) -> (std::cmp::Reverse<usize>, NodeId, DiffOperation) {
    let kind_label = info
        .entity
        .node_type()
        .map_or("artboard", |t| t.as_str());
    (
        std::cmp::Reverse(info.depth),
        id.clone(),
        DiffOperation {
            kind: DiffOpKind::Remove,
            node_id: id.clone(),
            field: None,
            old_value: Some(shallow_value(&info.entity)),
            new_value: None,
            metadata: OperationMetadata {
                description: format!("removed {kind_label} {:?}", info.entity.name()),
                severity: Severity::Warning,
            },
        },
    )
}

fn make_add(id: &NodeId, info: &EntityInfo<'_>) -> (usize, NodeId, DiffOperation) {
    let kind_label = info
        .entity
        .node_type()
        .map_or("artboard", |t| t.as_str());
    (
        info.depth,
        id.clone(),
        DiffOperation {
            kind: DiffOpKind::Add,
            node_id: id.clone(),
            field: None,
            old_value: None,
            new_value: Some(shallow_value(&info.entity)),
            metadata: OperationMetadata {
                description: format!("added {kind_label} {:?}", info.entity.name()),
                severity: Severity::Info,
            },
        },
    )
}

fn placement(info: &EntityInfo<'_>) -> Value {
    json!({
        "parent": info.parent.as_ref().map(NodeId::as_str),
        "index": info.position,
    })
}

fn make_move(
    id: &NodeId,
    from_info: &EntityInfo<'_>,
    to_info: &EntityInfo<'_>,
) -> (NodePath, NodeId, DiffOperation) {
    (
        from_info.path.clone(),
        id.clone(),
        DiffOperation {
            kind: DiffOpKind::Move,
            node_id: id.clone(),
            field: None,
            old_value: Some(placement(from_info)),
            new_value: Some(placement(to_info)),
            metadata: OperationMetadata {
                description: format!(
                    "moved {:?} from {} to {}",
                    from_info.entity.name(),
                    from_info.path,
                    to_info.path
                ),
                severity: Severity::Info,
            },
        },
    )
}

fn make_modify(
    id: &NodeId,
    to_info: &EntityInfo<'_>,
    field: DiffField,
    old: Option<Value>,
    new: Option<Value>,
) -> (NodePath, NodeId, usize, DiffOperation) {
    (
        to_info.path.clone(),
        id.clone(),
        field.order_index(),
        DiffOperation {
            kind: DiffOpKind::Modify,
            node_id: id.clone(),
            field: Some(field),
            metadata: OperationMetadata {
                description: format!("changed {field} of {:?}", to_info.entity.name()),
                severity: Severity::Info,
            },
            old_value: old,
            new_value: new,
        },
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::validate::parse;

    fn doc(artboard_children: Value) -> Document {
        let bytes = serde_json::to_vec(&json!({
            "schemaVersion": "0.1.0",
            "id": "doc-1",
            "name": "Fixture",
            "artboards": [{
                "id": "ab-1",
                "name": "Board",
                "frame": {"x": 0, "y": 0, "width": 1000, "height": 1000},
                "children": artboard_children
            }]
        }))
        .unwrap();
        parse(&bytes).unwrap()
    }

    fn text(id: &str, name: &str, content: &str) -> Value {
        json!({
            "type": "text",
            "id": id,
            "name": name,
            "frame": {"x": 0, "y": 0, "width": 100, "height": 20},
            "text": content
        })
    }

    fn frame(id: &str, name: &str, children: Value) -> Value {
        json!({
            "type": "frame",
            "id": id,
            "name": name,
            "frame": {"x": 0, "y": 0, "width": 500, "height": 500},
            "children": children
        })
    }

    #[test]
    fn diff_of_equals_is_empty() {
        let a = doc(json!([frame("f-1", "Hero", json!([text("t-1", "Title", "Hi")]))]));
        let out = diff(&a, &a, &DiffOptions::default()).unwrap();
        assert!(out.is_empty());
        assert_eq!(out.summary.total, 0);
    }

    #[test]
    fn modify_emits_one_op_per_field() {
        let a = doc(json!([text("t-1", "Title", "Hi")]));
        let mut b_json = text("t-1", "Headline", "Hello");
        b_json["visible"] = json!(false);
        let b = doc(json!([b_json]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        let fields: Vec<DiffField> = out.operations.iter().filter_map(|o| o.field).collect();
        assert_eq!(
            fields,
            [DiffField::Name, DiffField::Visible, DiffField::Text]
        );
        assert_eq!(out.summary.modified, 3);
    }

    #[test]
    fn removed_frame_emits_descendants_deepest_first() {
        let a = doc(json!([frame(
            "f-1",
            "Hero",
            json!([frame("f-2", "Inner", json!([text("t-1", "Title", "Hi")]))])
        )]));
        let b = doc(json!([]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        let removed: Vec<&str> = out
            .operations
            .iter()
            .filter(|o| o.kind == DiffOpKind::Remove)
            .map(|o| o.node_id.as_str())
            .collect();
        assert_eq!(removed, ["t-1", "f-2", "f-1"]);
    }

    #[test]
    fn added_frame_emits_descendants_shallowest_first() {
        let a = doc(json!([]));
        let b = doc(json!([frame(
            "f-1",
            "Hero",
            json!([frame("f-2", "Inner", json!([text("t-1", "Title", "Hi")]))])
        )]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        let added: Vec<&str> = out
            .operations
            .iter()
            .filter(|o| o.kind == DiffOpKind::Add)
            .map(|o| o.node_id.as_str())
            .collect();
        assert_eq!(added, ["f-1", "f-2", "t-1"]);
    }

    #[test]
    fn reorder_emits_moves() {
        let a = doc(json!([text("t-1", "A", "a"), text("t-2", "B", "b")]));
        let b = doc(json!([text("t-2", "B", "b"), text("t-1", "A", "a")]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        assert_eq!(out.summary.moved, 2);
        assert_eq!(out.summary.modified, 0);
    }

    #[test]
    fn reparent_emits_move_with_placement() {
        let a = doc(json!([
            frame("f-1", "Left", json!([text("t-1", "Title", "Hi")])),
            frame("f-2", "Right", json!([]))
        ]));
        let b = doc(json!([
            frame("f-1", "Left", json!([])),
            frame("f-2", "Right", json!([text("t-1", "Title", "Hi")]))
        ]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        let mv = out
            .operations
            .iter()
            .find(|o| o.kind == DiffOpKind::Move)
            .unwrap();
        assert_eq!(mv.node_id.as_str(), "t-1");
        assert_eq!(mv.old_value.as_ref().unwrap()["parent"], "f-1");
        assert_eq!(mv.new_value.as_ref().unwrap()["parent"], "f-2");
    }

    #[test]
    fn variant_change_is_remove_plus_add() {
        let a = doc(json!([text("n-1", "Thing", "hi")]));
        let b = doc(json!([frame("n-1", "Thing", json!([]))]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        assert_eq!(out.summary.removed, 1);
        assert_eq!(out.summary.added, 1);
        assert_eq!(out.summary.modified, 0);
    }

    #[test]
    fn class_order_is_remove_add_move_modify() {
        let a = doc(json!([
            text("gone", "Gone", "x"),
            text("stay", "Stay", "x"),
            text("mover", "Mover", "x")
        ]));
        let b = doc(json!([
            text("mover", "Mover", "x"),
            text("stay", "Renamed", "x"),
            text("new", "New", "x")
        ]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        let kinds: Vec<DiffOpKind> = out.operations.iter().map(|o| o.kind).collect();
        let first_remove = kinds.iter().position(|k| *k == DiffOpKind::Remove).unwrap();
        let first_add = kinds.iter().position(|k| *k == DiffOpKind::Add).unwrap();
        let first_move = kinds.iter().position(|k| *k == DiffOpKind::Move).unwrap();
        let first_modify = kinds.iter().position(|k| *k == DiffOpKind::Modify).unwrap();
        assert!(first_remove < first_add);
        assert!(first_add < first_move);
        assert!(first_move < first_modify);
    }

    #[test]
    fn options_gate_categories() {
        let a = doc(json!([text("t-1", "Title", "Hi")]));
        let b = doc(json!([text("t-1", "Renamed", "Changed")]));

        let structural_only = DiffOptions {
            include_property: false,
            include_content: false,
            include_metadata: false,
            ..DiffOptions::default()
        };
        let out = diff(&a, &b, &structural_only).unwrap();
        assert!(out.is_empty());

        let metadata_only = DiffOptions {
            include_structural: false,
            include_property: false,
            include_content: false,
            ..DiffOptions::default()
        };
        let out = diff(&a, &b, &metadata_only).unwrap();
        assert_eq!(out.summary.modified, 1);
        assert_eq!(out.operations[0].field, Some(DiffField::Name));
    }

    #[test]
    fn operation_limit_fails() {
        let a = doc(json!([]));
        let b = doc(json!([text("t-1", "A", "a"), text("t-2", "B", "b")]));
        let options = DiffOptions {
            max_operations: 1,
            ..DiffOptions::default()
        };
        let e = diff(&a, &b, &options).unwrap_err();
        assert_eq!(e.kind, DiffErrorKind::OperationLimit);
    }

    #[test]
    fn cancellation_fails_the_diff() {
        let a = doc(json!([text("t-1", "A", "a")]));
        let token = CancelToken::new();
        token.cancel();
        let options = DiffOptions {
            cancel: Some(token),
            yield_every: 1,
            ..DiffOptions::default()
        };
        let e = diff(&a, &a, &options).unwrap_err();
        assert_eq!(e.kind, DiffErrorKind::Cancelled);
    }

    #[test]
    fn metadata_carries_document_ids() {
        let a = doc(json!([]));
        let out = diff(&a, &a, &DiffOptions::default()).unwrap();
        assert_eq!(out.metadata.from_document_id.as_str(), "doc-1");
        assert_eq!(out.metadata.to_document_id.as_str(), "doc-1");
    }

    #[test]
    fn diff_is_deterministic() {
        let a = doc(json!([
            frame("f-1", "Hero", json!([text("t-1", "Title", "Hi")])),
            text("t-2", "Footer", "fine")
        ]));
        let b = doc(json!([
            text("t-2", "Footer", "print"),
            frame("f-1", "Hero Banner", json!([]))
        ]));
        let x = diff(&a, &b, &DiffOptions::default()).unwrap();
        let y = diff(&a, &b, &DiffOptions::default()).unwrap();
        assert_eq!(x.operations, y.operations);
        assert_eq!(x.summary, y.summary);
    }

    #[test]
    fn style_block_compared_as_unit() {
        let mut styled = text("t-1", "Title", "Hi");
        styled["style"] = json!({"opacity": 0.5});
        let a = doc(json!([text("t-1", "Title", "Hi")]));
        let b = doc(json!([styled]));
        let out = diff(&a, &b, &DiffOptions::default()).unwrap();
        assert_eq!(out.summary.modified, 1);
        let op = &out.operations[0];
        assert_eq!(op.field, Some(DiffField::Style));
        assert!(op.old_value.is_none());
        assert_eq!(op.new_value.as_ref().unwrap()["opacity"], 0.5);
    }
}
