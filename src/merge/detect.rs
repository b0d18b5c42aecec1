//! Conflict detection between two divergent branches.
//!
//! Given base, local, and remote, every node id touched by either branch is
//! classified against the conflict table. Changes present in only one branch
//! are not conflicts — they apply directly. Two branches that made the
//! identical change are not conflicts either, including both branches adding
//! the same id with a byte-identical payload.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::model::conflict::{Conflict, ConflictCode, ConflictSet};
use crate::model::document::Document;
use crate::model::node::JsonMap;
use crate::model::types::NodeId;

use super::diff::{DiffField, EntityInfo, collect, field_value, same_shape};

// ---------------------------------------------------------------------------
// Branch change tables
// ---------------------------------------------------------------------------

/// A container of children: `None` is the document root (the artboard list),
/// `Some(id)` an artboard or frame.
pub(crate) type ContainerKey = Option<NodeId>;

/// Where a node ended up in one branch.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct MoveChange {
    pub(crate) from_parent: ContainerKey,
    pub(crate) to_parent: ContainerKey,
    pub(crate) from_index: usize,
    pub(crate) to_index: usize,
}

/// Per-field old/new values for one node in one branch.
pub(crate) type FieldChanges = BTreeMap<DiffField, (Option<Value>, Option<Value>)>;

/// Everything one branch did relative to base.
#[derive(Debug, Default)]
pub(crate) struct BranchChanges {
    /// Ids present in the branch but not in base (includes ids whose
    /// variant changed — identity does not survive a type change).
    pub(crate) added: BTreeSet<NodeId>,
    /// Ids present in base but not in the branch (includes variant changes).
    pub(crate) removed: BTreeSet<NodeId>,
    /// Ids whose parent or sibling position changed.
    pub(crate) moved: BTreeMap<NodeId, MoveChange>,
    /// Ids with changed field values.
    pub(crate) modified: BTreeMap<NodeId, FieldChanges>,
}

impl BranchChanges {
    /// `true` if the branch modified or moved the id (used for
    /// delete-versus-touch classification).
    pub(crate) fn touched(&self, id: &NodeId) -> bool {
        self.modified.contains_key(id) || self.moved.contains_key(id)
    }

    /// `true` if the branch swapped the id's variant (remove + re-add).
    pub(crate) fn replaced(&self, id: &NodeId) -> bool {
        self.removed.contains(id) && self.added.contains(id)
    }

    /// `true` if the branch removed the id without re-adding it.
    pub(crate) fn deleted(&self, id: &NodeId) -> bool {
        self.removed.contains(id) && !self.added.contains(id)
    }

    /// Every id this branch changed in any way.
    pub(crate) fn touched_ids(&self) -> BTreeSet<NodeId> {
        let mut ids = BTreeSet::new();
        ids.extend(self.added.iter().cloned());
        ids.extend(self.removed.iter().cloned());
        ids.extend(self.moved.keys().cloned());
        ids.extend(self.modified.keys().cloned());
        ids
    }
}

/// Compute what `branch` did relative to `base`.
pub(crate) fn branch_changes(
    base_map: &BTreeMap<NodeId, EntityInfo<'_>>,
    branch_map: &BTreeMap<NodeId, EntityInfo<'_>>,
) -> BranchChanges {
    let mut out = BranchChanges::default();

    for (id, base_info) in base_map {
        match branch_map.get(id) {
            None => {
                out.removed.insert(id.clone());
            }
            Some(branch_info) if !same_shape(&base_info.entity, &branch_info.entity) => {
                out.removed.insert(id.clone());
                out.added.insert(id.clone());
            }
            Some(branch_info) => {
                if base_info.parent != branch_info.parent
                    || base_info.position != branch_info.position
                {
                    out.moved.insert(
                        id.clone(),
                        MoveChange {
                            from_parent: base_info.parent.clone(),
                            to_parent: branch_info.parent.clone(),
                            from_index: base_info.position,
                            to_index: branch_info.position,
                        },
                    );
                }
                let mut fields = FieldChanges::new();
                for field in DiffField::COMPARE_ORDER {
                    let old = field_value(&base_info.entity, field);
                    let new = field_value(&branch_info.entity, field);
                    if old != new {
                        fields.insert(field, (old, new));
                    }
                }
                if !fields.is_empty() {
                    out.modified.insert(id.clone(), fields);
                }
            }
        }
    }

    for id in branch_map.keys() {
        if !base_map.contains_key(id) {
            out.added.insert(id.clone());
        }
    }

    out
}

// ---------------------------------------------------------------------------
// MergeContext
// ---------------------------------------------------------------------------

/// Precomputed placement tables and branch change sets for one merge.
pub(crate) struct MergeContext<'docs> {
    pub(crate) base: &'docs Document,
    pub(crate) local: &'docs Document,
    pub(crate) remote: &'docs Document,
    pub(crate) base_map: BTreeMap<NodeId, EntityInfo<'docs>>,
    pub(crate) local_map: BTreeMap<NodeId, EntityInfo<'docs>>,
    pub(crate) remote_map: BTreeMap<NodeId, EntityInfo<'docs>>,
    pub(crate) local_changes: BranchChanges,
    pub(crate) remote_changes: BranchChanges,
}

impl<'docs> MergeContext<'docs> {
    pub(crate) fn build(
        base: &'docs Document,
        local: &'docs Document,
        remote: &'docs Document,
    ) -> Self {
        let base_map = collect(base);
        let local_map = collect(local);
        let remote_map = collect(remote);
        let local_changes = branch_changes(&base_map, &local_map);
        let remote_changes = branch_changes(&base_map, &remote_map);
        Self {
            base,
            local,
            remote,
            base_map,
            local_map,
            remote_map,
            local_changes,
            remote_changes,
        }
    }

    /// The JSON pointer of an id, preferring its base placement.
    pub(crate) fn path_of(&self, id: &NodeId) -> String {
        self.base_map
            .get(id)
            .or_else(|| self.local_map.get(id))
            .or_else(|| self.remote_map.get(id))
            .map_or_else(String::new, |info| info.path.pointer().to_string())
    }

    /// Child id sequence of a container in one document.
    pub(crate) fn child_seq(
        doc_map: &BTreeMap<NodeId, EntityInfo<'_>>,
        doc: &Document,
        container: &ContainerKey,
    ) -> Option<Vec<NodeId>> {
        match container {
            None => Some(doc.artboards.iter().map(|a| a.id.clone()).collect()),
            Some(id) => doc_map
                .get(id)
                .map(|info| info.entity.child_nodes().iter().map(|n| n.id().clone()).collect()),
        }
    }

    /// The deep canonical payload of an id in one document (subtree
    /// included) — used for the identical-add check.
    pub(crate) fn deep_value(
        doc_map: &BTreeMap<NodeId, EntityInfo<'_>>,
        id: &NodeId,
    ) -> Option<Value> {
        doc_map.get(id).map(|info| match info.entity {
            crate::index::DocEntity::Artboard(a) => {
                serde_json::to_value(a).expect("artboard is always JSON-serializable")
            }
            crate::index::DocEntity::Node(n) => {
                serde_json::to_value(n).expect("node is always JSON-serializable")
            }
        })
    }
}

// ---------------------------------------------------------------------------
// Props key-level comparison
// ---------------------------------------------------------------------------

/// Keys a branch added, changed, or removed (`None` = removed).
pub(crate) fn changed_props(
    base: Option<&JsonMap>,
    branch: Option<&JsonMap>,
) -> BTreeMap<String, Option<Value>> {
    static EMPTY: std::sync::LazyLock<JsonMap> = std::sync::LazyLock::new(JsonMap::new);
    let base = base.unwrap_or(&EMPTY);
    let branch = branch.unwrap_or(&EMPTY);
    let mut out = BTreeMap::new();
    for (key, value) in branch {
        if base.get(key) != Some(value) {
            out.insert(key.clone(), Some(value.clone()));
        }
    }
    for key in base.keys() {
        if !branch.contains_key(key) {
            out.insert(key.clone(), None);
        }
    }
    out
}

fn props_of<'m>(map: &'m BTreeMap<NodeId, EntityInfo<'_>>, id: &NodeId) -> Option<&'m JsonMap> {
    map.get(id).and_then(|info| match info.entity.as_node() {
        Some(crate::model::node::Node::Component { props, .. }) => Some(props),
        _ => None,
    })
}

// ---------------------------------------------------------------------------
// detect
// ---------------------------------------------------------------------------

/// Detect every conflict between local and remote relative to base.
#[must_use]
pub fn detect(base: &Document, local: &Document, remote: &Document) -> ConflictSet {
    let ctx = MergeContext::build(base, local, remote);
    detect_in(&ctx)
}

pub(crate) fn detect_in(ctx: &MergeContext<'_>) -> ConflictSet {
    let mut set = ConflictSet::new();
    let l = &ctx.local_changes;
    let r = &ctx.remote_changes;

    let mut touched: BTreeSet<NodeId> = l.touched_ids();
    touched.extend(r.touched_ids());

    for id in &touched {
        detect_structural(ctx, id, &mut set);
        detect_fields(ctx, id, &mut set);
    }

    detect_order(ctx, &mut set);
    set.sort();
    set
}

fn detect_structural(ctx: &MergeContext<'_>, id: &NodeId, set: &mut ConflictSet) {
    let l = &ctx.local_changes;
    let r = &ctx.remote_changes;

    // S-DEL-MOD: deleted on one side, touched (modified, moved, or variant
    // replaced) on the other.
    let del_mod = (l.deleted(id) && !r.deleted(id) && (r.touched(id) || r.replaced(id)))
        || (r.deleted(id) && !l.deleted(id) && (l.touched(id) || l.replaced(id)));
    if del_mod {
        set.push(Conflict::new(
            ConflictCode::DeleteModify,
            ctx.path_of(id),
            Some(id.clone()),
            format!("{id} was deleted in one branch and modified in the other"),
        ));
        return;
    }

    // S-ADD-ADD: added on both sides with differing payloads. Identical
    // payloads collapse into one add and are not a conflict.
    if l.added.contains(id) && r.added.contains(id) {
        let local_payload = MergeContext::deep_value(&ctx.local_map, id);
        let remote_payload = MergeContext::deep_value(&ctx.remote_map, id);
        if local_payload != remote_payload {
            set.push(Conflict::new(
                ConflictCode::AddAdd,
                ctx.local_map
                    .get(id)
                    .map_or_else(String::new, |i| i.path.pointer().to_string()),
                Some(id.clone()),
                format!("{id} was added in both branches with different content"),
            ));
        }
        return;
    }

    // S-MOVE-MOVE: moved to different parents.
    if let (Some(lm), Some(rm)) = (l.moved.get(id), r.moved.get(id))
        && lm.to_parent != rm.to_parent
    {
        set.push(Conflict::new(
            ConflictCode::MoveMove,
            ctx.path_of(id),
            Some(id.clone()),
            format!("{id} was moved to different parents in each branch"),
        ));
    }
}

fn detect_fields(ctx: &MergeContext<'_>, id: &NodeId, set: &mut ConflictSet) {
    let l = &ctx.local_changes;
    let r = &ctx.remote_changes;
    let (Some(lf), Some(rf)) = (l.modified.get(id), r.modified.get(id)) else {
        return;
    };
    // Deleted-anywhere ids were handled structurally.
    if l.removed.contains(id) || r.removed.contains(id) {
        return;
    }

    let path = ctx.path_of(id);
    // One conflict per (node, code): frame components collapse into a single
    // P-GEOMETRY entry, style/textStyle into P-STYLE, componentKey/props
    // into C-COMPONENT-PROPS.
    let mut conflicted: BTreeMap<ConflictCode, (&'static str, String)> = BTreeMap::new();

    for field in DiffField::COMPARE_ORDER {
        let (Some((_, l_new)), Some((_, r_new))) = (lf.get(&field), rf.get(&field)) else {
            continue;
        };
        if l_new == r_new {
            // Identical change in both branches: not a conflict.
            continue;
        }
        let entry = match field {
            DiffField::FrameX
            | DiffField::FrameY
            | DiffField::FrameWidth
            | DiffField::FrameHeight => Some((
                ConflictCode::Geometry,
                "/frame",
                format!("frame geometry of {id} diverged"),
            )),
            DiffField::Visible => Some((
                ConflictCode::Visibility,
                "/visible",
                format!(
                    "visibility of {id} diverged (local={}, remote={})",
                    l_new.as_ref().map_or_else(|| "unset".into(), Value::to_string),
                    r_new.as_ref().map_or_else(|| "unset".into(), Value::to_string),
                ),
            )),
            DiffField::Layout => Some((
                ConflictCode::Layout,
                "/layout",
                format!("layout of {id} diverged"),
            )),
            DiffField::Style => Some((
                ConflictCode::Style,
                "/style",
                format!("style of {id} diverged"),
            )),
            DiffField::TextStyle => Some((
                ConflictCode::Style,
                "/textStyle",
                format!("text style of {id} diverged"),
            )),
            DiffField::Text => Some((
                ConflictCode::Text,
                "/text",
                format!("text content of {id} diverged"),
            )),
            DiffField::ComponentKey => Some((
                ConflictCode::ComponentProps,
                "/componentKey",
                format!("component key of {id} diverged"),
            )),
            DiffField::Props => {
                let base_props = props_of(&ctx.base_map, id);
                let l_changed = changed_props(base_props, props_of(&ctx.local_map, id));
                let r_changed = changed_props(base_props, props_of(&ctx.remote_map, id));
                let clash = l_changed.iter().any(|(key, l_value)| {
                    r_changed
                        .get(key)
                        .is_some_and(|r_value| r_value != l_value)
                });
                clash.then(|| {
                    (
                        ConflictCode::ComponentProps,
                        "/props",
                        format!("component props of {id} diverged on the same keys"),
                    )
                })
            }
            DiffField::Name => Some((
                ConflictCode::Name,
                "/name",
                format!(
                    "name of {id} diverged (local={}, remote={})",
                    l_new.as_ref().map_or_else(|| "unset".into(), Value::to_string),
                    r_new.as_ref().map_or_else(|| "unset".into(), Value::to_string),
                ),
            )),
        };
        if let Some((code, suffix, message)) = entry {
            conflicted.entry(code).or_insert((suffix, message));
        }
    }

    for (code, (suffix, message)) in conflicted {
        set.push(Conflict::new(
            code,
            format!("{path}{suffix}"),
            Some(id.clone()),
            message,
        ));
    }
}

/// S-ORDER: sibling order under a parent changed differently in both
/// branches while the child id set stayed identical.
fn detect_order(ctx: &MergeContext<'_>, set: &mut ConflictSet) {
    let mut containers: BTreeSet<ContainerKey> = BTreeSet::new();
    containers.insert(None);
    for (id, info) in &ctx.base_map {
        if !info.entity.child_nodes().is_empty() || info.entity.node_type().is_none() {
            containers.insert(Some(id.clone()));
        }
    }

    for container in containers {
        let Some(base_seq) = MergeContext::child_seq(&ctx.base_map, ctx.base, &container) else {
            continue;
        };
        let Some(local_seq) = MergeContext::child_seq(&ctx.local_map, ctx.local, &container)
        else {
            continue;
        };
        let Some(remote_seq) = MergeContext::child_seq(&ctx.remote_map, ctx.remote, &container)
        else {
            continue;
        };

        let local_set: BTreeSet<&NodeId> = local_seq.iter().collect();
        let remote_set: BTreeSet<&NodeId> = remote_seq.iter().collect();
        if local_set != remote_set {
            // Membership changed; additions/removals are covered elsewhere.
            continue;
        }
        let base_restricted: Vec<&NodeId> = base_seq
            .iter()
            .filter(|id| local_set.contains(id))
            .collect();
        let local_refs: Vec<&NodeId> = local_seq.iter().collect();
        let remote_refs: Vec<&NodeId> = remote_seq.iter().collect();
        if local_refs != remote_refs
            && local_refs != base_restricted
            && remote_refs != base_restricted
        {
            let (path, node_id) = match &container {
                None => ("/artboards".to_owned(), None),
                Some(id) => (format!("{}/children", ctx.path_of(id)), Some(id.clone())),
            };
            let label = node_id
                .as_ref()
                .map_or_else(|| "the artboard list".to_owned(), ToString::to_string);
            set.push(Conflict::new(
                ConflictCode::Order,
                path,
                node_id,
                format!("sibling order under {label} diverged in both branches"),
            ));
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
