//! The resolution engine: build the merged document.
//!
//! Resolution starts from base, applies every non-conflicting change from
//! both branches, then applies the configured strategy for each conflict
//! the engine is allowed to resolve. Conflicts left to manual review keep
//! the target branch's value in the best-effort document.
//!
//! The build is top-down: artboard order, then per-container child order,
//! then per-node field values. Child ordering uses a three-sequence merge —
//! the primary branch's order as the skeleton, the secondary branch's
//! additions appended in first-seen order, base order as the final
//! tie-break.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::model::conflict::{Conflict, ConflictCode, ConflictSet};
use crate::model::document::{Artboard, Document};
use crate::model::node::{JsonMap, Node};
use crate::model::types::NodeId;

use super::detect::{ContainerKey, MergeContext, changed_props};
use super::diff::{DiffField, EntityInfo, field_value};
use super::types::{
    AppliedResolution, MergeError, MergeErrorKind, MergeOptions, MergeTarget, Strategy,
};

// ---------------------------------------------------------------------------
// Decisions
// ---------------------------------------------------------------------------

/// Which version wins a contested value.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pick {
    Local,
    Remote,
    Base,
}

impl Pick {
    const fn of_target(target: MergeTarget) -> Self {
        match target {
            MergeTarget::Local => Self::Local,
            MergeTarget::Remote => Self::Remote,
        }
    }
}

/// How a container's child order is decided.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OrderDecision {
    /// Three-sequence merge, local priority.
    MergeSeq,
    /// One version's order wins outright.
    Pick(Pick),
}

/// Every conflict's outcome, keyed for the tree builder.
#[derive(Debug, Default)]
struct Decisions {
    /// Field-level codes, per node.
    field: BTreeMap<(NodeId, ConflictCode), Pick>,
    /// S-ORDER, per container.
    order: BTreeMap<ContainerKey, OrderDecision>,
    /// S-DEL-MOD / S-ADD-ADD / S-MOVE-MOVE, per node.
    structure: BTreeMap<NodeId, Pick>,
}

/// Output of [`resolve`].
#[derive(Debug)]
pub(crate) struct Resolved {
    pub(crate) document: Document,
    pub(crate) applied: Vec<AppliedResolution>,
    pub(crate) unresolved: Vec<Conflict>,
}

const fn strategy_pick(strategy: Strategy, target: MergeTarget) -> Pick {
    match strategy {
        Strategy::PreferLocal => Pick::Local,
        Strategy::PreferRemote => Pick::Remote,
        Strategy::PreferBase => Pick::Base,
        // `Merge` has dedicated handling only for child order; for scalar
        // values it degrades to the target branch.
        Strategy::Merge | Strategy::Manual => Pick::of_target(target),
    }
}

/// Resolve every conflict and build the merged document.
///
/// # Errors
/// Returns `merge-internal` if the resolved tree cannot be constructed
/// (e.g. branch moves formed a containment cycle).
pub(crate) fn resolve(
    ctx: &MergeContext<'_>,
    conflicts: &ConflictSet,
    options: &MergeOptions,
    target: MergeTarget,
) -> Result<Resolved, MergeError> {
    let mut decisions = Decisions::default();
    let mut applied = Vec::new();
    let mut unresolved = Vec::new();

    for conflict in conflicts.iter() {
        let auto = options.can_auto_resolve(conflict);
        let strategy = if auto {
            options.strategies.for_code(conflict.code)
        } else {
            Strategy::Manual
        };
        let pick = strategy_pick(strategy, target);

        match conflict.code {
            ConflictCode::Order => {
                let container = conflict.node_id.clone();
                let decision = if auto && strategy == Strategy::Merge {
                    OrderDecision::MergeSeq
                } else {
                    OrderDecision::Pick(pick)
                };
                decisions.order.insert(container, decision);
            }
            ConflictCode::DeleteModify | ConflictCode::AddAdd | ConflictCode::MoveMove => {
                if let Some(id) = &conflict.node_id {
                    decisions.structure.insert(id.clone(), pick);
                }
            }
            _ => {
                if let Some(id) = &conflict.node_id {
                    decisions.field.insert((id.clone(), conflict.code), pick);
                }
            }
        }

        if auto {
            applied.push(AppliedResolution {
                conflict_id: conflict.id.clone(),
                code: conflict.code,
                strategy,
                confidence: conflict.confidence,
                description: format!("applied {strategy} to {conflict}"),
            });
        } else {
            unresolved.push(conflict.clone());
        }
    }

    if !unresolved.is_empty() {
        tracing::debug!(
            unresolved = unresolved.len(),
            %target,
            "leaving conflicts to manual review; best-effort document keeps the target branch"
        );
    }

    let document = build_document(ctx, &decisions, target)?;
    Ok(Resolved {
        document,
        applied,
        unresolved,
    })
}

// ---------------------------------------------------------------------------
// Existence / payload source / parents
// ---------------------------------------------------------------------------

/// Does the id exist in the merged document?
fn exists(ctx: &MergeContext<'_>, decisions: &Decisions, target: MergeTarget, id: &NodeId) -> bool {
    let l = &ctx.local_changes;
    let r = &ctx.remote_changes;
    let target_pick = Pick::of_target(target);

    if ctx.base_map.contains_key(id) {
        let gone_l = l.deleted(id);
        let gone_r = r.deleted(id);
        return match (gone_l, gone_r) {
            (true, true) => false,
            (false, false) => true,
            (true, false) => {
                if r.touched(id) || r.replaced(id) {
                    // S-DEL-MOD: follow the decided branch's state.
                    match decisions.structure.get(id).copied().unwrap_or(target_pick) {
                        Pick::Local => false,
                        Pick::Remote | Pick::Base => true,
                    }
                } else {
                    false
                }
            }
            (false, true) => {
                if l.touched(id) || l.replaced(id) {
                    match decisions.structure.get(id).copied().unwrap_or(target_pick) {
                        Pick::Remote => false,
                        Pick::Local | Pick::Base => true,
                    }
                } else {
                    false
                }
            }
        };
    }

    // Added id.
    match (l.added.contains(id), r.added.contains(id)) {
        (true, true) => {
            // Identical payloads collapsed; divergent payloads resolved by
            // pick. PreferBase drops both additions.
            decisions.structure.get(id).copied().unwrap_or(target_pick) != Pick::Base
        }
        (true, false) | (false, true) => true,
        (false, false) => false,
    }
}

/// Which document's node supplies the payload skeleton for an id.
fn payload_source(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
) -> Pick {
    let l = &ctx.local_changes;
    let r = &ctx.remote_changes;
    let target_pick = Pick::of_target(target);

    if ctx.base_map.contains_key(id) {
        let repl_l = l.replaced(id);
        let repl_r = r.replaced(id);
        if repl_l || repl_r {
            let pick = decisions.structure.get(id).copied().unwrap_or({
                if repl_l && !repl_r {
                    Pick::Local
                } else if repl_r && !repl_l {
                    Pick::Remote
                } else {
                    target_pick
                }
            });
            return pick;
        }
        return Pick::Base;
    }
    match (l.added.contains(id), r.added.contains(id)) {
        (true, true) => match decisions.structure.get(id).copied().unwrap_or(target_pick) {
            Pick::Base => target_pick,
            pick => pick,
        },
        (true, false) => Pick::Local,
        _ => Pick::Remote,
    }
}

fn map_of<'ctx, 'docs>(
    ctx: &'ctx MergeContext<'docs>,
    pick: Pick,
) -> &'ctx BTreeMap<NodeId, EntityInfo<'docs>> {
    match pick {
        Pick::Local => &ctx.local_map,
        Pick::Remote => &ctx.remote_map,
        Pick::Base => &ctx.base_map,
    }
}

/// The merged document's parent container for an id.
fn resolved_parent(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
) -> ContainerKey {
    let source = payload_source(ctx, decisions, target, id);
    if source != Pick::Base {
        return map_of(ctx, source)
            .get(id)
            .and_then(|info| info.parent.clone());
    }

    let l_move = ctx.local_changes.moved.get(id);
    let r_move = ctx.remote_changes.moved.get(id);
    match (l_move, r_move) {
        (Some(lm), Some(rm)) if lm.to_parent == rm.to_parent => lm.to_parent.clone(),
        (Some(lm), Some(rm)) => {
            // S-MOVE-MOVE.
            let target_pick = Pick::of_target(target);
            match decisions.structure.get(id).copied().unwrap_or(target_pick) {
                Pick::Local => lm.to_parent.clone(),
                Pick::Remote => rm.to_parent.clone(),
                Pick::Base => lm.from_parent.clone(),
            }
        }
        (Some(lm), None) => lm.to_parent.clone(),
        (None, Some(rm)) => rm.to_parent.clone(),
        (None, None) => ctx.base_map.get(id).and_then(|info| info.parent.clone()),
    }
}

// ---------------------------------------------------------------------------
// Child ordering
// ---------------------------------------------------------------------------

/// Merge the child sequences of one container into the final order, before
/// existence/parent filtering.
fn merged_child_order(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    container: &ContainerKey,
) -> Vec<NodeId> {
    let base_seq =
        MergeContext::child_seq(&ctx.base_map, ctx.base, container).unwrap_or_default();
    let local_seq = MergeContext::child_seq(&ctx.local_map, ctx.local, container);
    let remote_seq = MergeContext::child_seq(&ctx.remote_map, ctx.remote, container);

    let decision = decisions.order.get(container).copied();
    let (primary, secondary, tail) = match decision {
        Some(OrderDecision::Pick(Pick::Remote)) => (remote_seq, local_seq, base_seq),
        Some(OrderDecision::Pick(Pick::Base)) => {
            (Some(base_seq.clone()), local_seq, remote_seq.unwrap_or_default())
        }
        Some(OrderDecision::Pick(Pick::Local) | OrderDecision::MergeSeq) => {
            (local_seq, remote_seq, base_seq)
        }
        None => {
            // No order conflict: follow the branch that actually reordered.
            let reordered = |seq: &Option<Vec<NodeId>>| {
                seq.as_ref().is_some_and(|s| {
                    let present: BTreeSet<&NodeId> = s.iter().collect();
                    let restricted: Vec<&NodeId> =
                        base_seq.iter().filter(|id| present.contains(id)).collect();
                    let branch_restricted: Vec<&NodeId> = s
                        .iter()
                        .filter(|id| base_seq.contains(id))
                        .collect();
                    branch_restricted != restricted
                })
            };
            if reordered(&remote_seq) && !reordered(&local_seq) {
                (remote_seq, local_seq, base_seq)
            } else {
                (local_seq, remote_seq, base_seq)
            }
        }
    };

    let mut out = Vec::new();
    let mut seen = BTreeSet::new();
    for id in primary
        .into_iter()
        .flatten()
        .chain(secondary.into_iter().flatten())
        .chain(tail)
    {
        if seen.insert(id.clone()) {
            out.push(id);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Field values
// ---------------------------------------------------------------------------

const fn code_for_field(field: DiffField) -> ConflictCode {
    match field {
        DiffField::Name => ConflictCode::Name,
        DiffField::Visible => ConflictCode::Visibility,
        DiffField::FrameX | DiffField::FrameY | DiffField::FrameWidth | DiffField::FrameHeight => {
            ConflictCode::Geometry
        }
        DiffField::Layout => ConflictCode::Layout,
        DiffField::Style | DiffField::TextStyle => ConflictCode::Style,
        DiffField::Text => ConflictCode::Text,
        DiffField::ComponentKey | DiffField::Props => ConflictCode::ComponentProps,
    }
}

/// The final value of one field for a base-sourced id. `None` means unset.
fn final_field(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    field: DiffField,
) -> Option<Value> {
    let base_value = ctx
        .base_map
        .get(id)
        .and_then(|info| field_value(&info.entity, field));
    let l_change = ctx
        .local_changes
        .modified
        .get(id)
        .and_then(|fields| fields.get(&field));
    let r_change = ctx
        .remote_changes
        .modified
        .get(id)
        .and_then(|fields| fields.get(&field));

    match (l_change, r_change) {
        (None, None) => base_value,
        (Some((_, l_new)), None) => l_new.clone(),
        (None, Some((_, r_new))) => r_new.clone(),
        (Some((_, l_new)), Some((_, r_new))) if l_new == r_new => l_new.clone(),
        (Some((_, l_new)), Some((_, r_new))) => {
            let pick = decisions
                .field
                .get(&(id.clone(), code_for_field(field)))
                .copied()
                .unwrap_or(Pick::of_target(target));
            match pick {
                Pick::Local => l_new.clone(),
                Pick::Remote => r_new.clone(),
                Pick::Base => base_value,
            }
        }
    }
}

fn final_string(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    field: DiffField,
    fallback: &str,
) -> String {
    final_field(ctx, decisions, target, id, field)
        .and_then(|v| v.as_str().map(ToOwned::to_owned))
        .unwrap_or_else(|| fallback.to_owned())
}

fn final_f64(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    field: DiffField,
    fallback: f64,
) -> f64 {
    final_field(ctx, decisions, target, id, field)
        .and_then(|v| v.as_f64())
        .unwrap_or(fallback)
}

fn final_object(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    field: DiffField,
) -> Option<JsonMap> {
    match final_field(ctx, decisions, target, id, field) {
        Some(Value::Object(map)) => Some(map),
        _ => None,
    }
}

/// Key-level merge of component props: base plus both branches' key changes,
/// contested keys resolved by the node's C-COMPONENT-PROPS pick.
fn final_props(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    base_props: &JsonMap,
) -> JsonMap {
    let node_props = |map: &BTreeMap<NodeId, EntityInfo<'_>>| -> Option<JsonMap> {
        map.get(id).and_then(|info| match info.entity.as_node() {
            Some(Node::Component { props, .. }) => Some(props.clone()),
            _ => None,
        })
    };
    let local_props = node_props(&ctx.local_map);
    let remote_props = node_props(&ctx.remote_map);
    let l_changed = changed_props(Some(base_props), local_props.as_ref());
    let r_changed = changed_props(Some(base_props), remote_props.as_ref());

    let pick = decisions
        .field
        .get(&(id.clone(), ConflictCode::ComponentProps))
        .copied()
        .unwrap_or(Pick::of_target(target));

    let mut out = base_props.clone();
    let mut apply = |changes: &BTreeMap<String, Option<Value>>| {
        for (key, change) in changes {
            match change {
                Some(value) => {
                    out.insert(key.clone(), value.clone());
                }
                None => {
                    out.remove(key);
                }
            }
        }
    };

    let mut keys: BTreeSet<&String> = l_changed.keys().collect();
    keys.extend(r_changed.keys());
    for key in keys {
        let l = l_changed.get(key);
        let r = r_changed.get(key);
        let change = match (l, r) {
            (Some(lc), Some(rc)) if lc == rc => Some(lc),
            (Some(lc), Some(rc)) => match pick {
                Pick::Local => Some(lc),
                Pick::Remote => Some(rc),
                Pick::Base => None,
            },
            (Some(lc), None) => Some(lc),
            (None, Some(rc)) => Some(rc),
            (None, None) => None,
        };
        if let Some(change) = change {
            apply(&BTreeMap::from([(key.clone(), change.clone())]));
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tree construction
// ---------------------------------------------------------------------------

fn internal(detail: impl Into<String>) -> MergeError {
    MergeError::new(MergeErrorKind::MergeInternal, detail)
}

fn build_document(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
) -> Result<Document, MergeError> {
    let mut doc = Document {
        schema_version: ctx.base.schema_version.clone(),
        id: ctx.base.id.clone(),
        name: ctx.base.name.clone(),
        artboards: Vec::new(),
    };

    let mut stack = BTreeSet::new();
    for id in merged_child_order(ctx, decisions, target, &None) {
        if !exists(ctx, decisions, target, &id) {
            continue;
        }
        if resolved_parent(ctx, decisions, target, &id).is_some() {
            // Re-homed under a node; the owning container builds it.
            continue;
        }
        if let Some(artboard) = build_artboard(ctx, decisions, target, &id, &mut stack)? {
            doc.artboards.push(artboard);
        }
    }
    audit_orphans(ctx, decisions, target, &doc)?;
    Ok(doc)
}

/// Check every id that should exist but was not placed. An orphan whose
/// ancestor chain loops is a containment cycle (branch moves nested two
/// containers inside each other) and fails the merge; an orphan absorbed by
/// a deleted or wholesale-cloned ancestor is dropped with a warning.
fn audit_orphans(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    doc: &Document,
) -> Result<(), MergeError> {
    let built: BTreeSet<NodeId> = crate::index::iter(doc)
        .map(|v| v.entity.id().clone())
        .collect();

    let mut candidates: BTreeSet<&NodeId> = ctx.base_map.keys().collect();
    candidates.extend(ctx.local_map.keys());
    candidates.extend(ctx.remote_map.keys());

    for id in candidates {
        if built.contains(id) || !exists(ctx, decisions, target, id) {
            continue;
        }
        let mut seen = BTreeSet::new();
        let mut cursor = id.clone();
        loop {
            if !seen.insert(cursor.clone()) {
                return Err(internal(format!(
                    "containment cycle through {cursor} produced by branch moves"
                )));
            }
            match resolved_parent(ctx, decisions, target, &cursor) {
                None => {
                    tracing::warn!(%id, "merged node could not be placed; dropping it");
                    break;
                }
                Some(parent) => {
                    if !exists(ctx, decisions, target, &parent)
                        || payload_source(ctx, decisions, target, &parent) != Pick::Base
                    {
                        tracing::warn!(
                            %id,
                            %parent,
                            "merged node absorbed by its ancestor's resolution; dropping it"
                        );
                        break;
                    }
                    cursor = parent;
                }
            }
        }
    }
    Ok(())
}

fn build_artboard(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    stack: &mut BTreeSet<NodeId>,
) -> Result<Option<Artboard>, MergeError> {
    let source = payload_source(ctx, decisions, target, id);
    if source != Pick::Base {
        let Some(info) = map_of(ctx, source).get(id) else {
            return Err(internal(format!("artboard {id} missing from its source branch")));
        };
        return match info.entity {
            crate::index::DocEntity::Artboard(a) => Ok(Some(a.clone())),
            crate::index::DocEntity::Node(_) => {
                Err(internal(format!("{id} is an artboard in base but a node in a branch")))
            }
        };
    }

    let Some(base_info) = ctx.base_map.get(id) else {
        return Err(internal(format!("artboard {id} missing from base")));
    };
    let crate::index::DocEntity::Artboard(base_artboard) = base_info.entity else {
        return Err(internal(format!("{id} is not an artboard in base")));
    };

    let mut artboard = Artboard {
        id: id.clone(),
        name: final_string(ctx, decisions, target, id, DiffField::Name, &base_artboard.name),
        frame: crate::model::types::Rect {
            x: final_f64(ctx, decisions, target, id, DiffField::FrameX, base_artboard.frame.x),
            y: final_f64(ctx, decisions, target, id, DiffField::FrameY, base_artboard.frame.y),
            width: final_f64(
                ctx,
                decisions,
                target,
                id,
                DiffField::FrameWidth,
                base_artboard.frame.width,
            ),
            height: final_f64(
                ctx,
                decisions,
                target,
                id,
                DiffField::FrameHeight,
                base_artboard.frame.height,
            ),
        },
        children: Vec::new(),
    };
    artboard.children = build_children(ctx, decisions, target, id, stack)?;
    Ok(Some(artboard))
}

fn build_children(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    container: &NodeId,
    stack: &mut BTreeSet<NodeId>,
) -> Result<Vec<Node>, MergeError> {
    if !stack.insert(container.clone()) {
        return Err(internal(format!(
            "containment cycle through {container} produced by branch moves"
        )));
    }
    let key = Some(container.clone());
    let mut children = Vec::new();
    for child_id in merged_child_order(ctx, decisions, target, &key) {
        if !exists(ctx, decisions, target, &child_id) {
            continue;
        }
        if resolved_parent(ctx, decisions, target, &child_id) != key {
            continue;
        }
        if let Some(node) = build_node(ctx, decisions, target, &child_id, stack)? {
            children.push(node);
        }
    }
    stack.remove(container);
    Ok(children)
}

fn build_node(
    ctx: &MergeContext<'_>,
    decisions: &Decisions,
    target: MergeTarget,
    id: &NodeId,
    stack: &mut BTreeSet<NodeId>,
) -> Result<Option<Node>, MergeError> {
    let source = payload_source(ctx, decisions, target, id);
    if source != Pick::Base {
        let Some(info) = map_of(ctx, source).get(id) else {
            return Err(internal(format!("node {id} missing from its source branch")));
        };
        return match info.entity.as_node() {
            Some(node) => Ok(Some(node.clone())),
            None => Err(internal(format!("{id} is a node in base but an artboard in a branch"))),
        };
    }

    let Some(base_node) = ctx.base_map.get(id).and_then(|info| info.entity.as_node()) else {
        return Err(internal(format!("node {id} missing from base")));
    };

    let mut node = base_node.clone();
    {
        let header = node.header_mut();
        header.name = final_string(ctx, decisions, target, id, DiffField::Name, "");
        header.visible = final_field(ctx, decisions, target, id, DiffField::Visible)
            .and_then(|v| v.as_bool());
        header.frame.x =
            final_f64(ctx, decisions, target, id, DiffField::FrameX, header.frame.x);
        header.frame.y =
            final_f64(ctx, decisions, target, id, DiffField::FrameY, header.frame.y);
        header.frame.width = final_f64(
            ctx,
            decisions,
            target,
            id,
            DiffField::FrameWidth,
            header.frame.width,
        );
        header.frame.height = final_f64(
            ctx,
            decisions,
            target,
            id,
            DiffField::FrameHeight,
            header.frame.height,
        );
        header.layout = final_object(ctx, decisions, target, id, DiffField::Layout);
        header.style = final_object(ctx, decisions, target, id, DiffField::Style);
        // semanticKey and data are outside the diffed field set; the base
        // value carries through.
    }

    match &mut node {
        Node::Frame { children, .. } => {
            *children = build_children(ctx, decisions, target, id, stack)?;
        }
        Node::Text {
            text, text_style, ..
        } => {
            *text = final_string(ctx, decisions, target, id, DiffField::Text, text);
            *text_style = final_object(ctx, decisions, target, id, DiffField::TextStyle);
        }
        Node::Component {
            component_key,
            props,
            ..
        } => {
            *component_key = final_string(
                ctx,
                decisions,
                target,
                id,
                DiffField::ComponentKey,
                component_key,
            );
            *props = final_props(ctx, decisions, target, id, props);
        }
    }

    Ok(Some(node))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
