//! End-to-end merge scenarios.
//!
//! Coverage:
//! - Identical inputs: no conflicts, confidence 1.0
//! - Delete vs modify: one S-DEL-MOD, manual review, target branch wins
//! - Order divergence: S-ORDER, auto-resolve under strategy, target
//!   fallback under defaults
//! - Visibility: single-branch change applies; divergence auto-resolves
//!   with PreferLocal at confidence 0.7
//! - Add/add with different payloads: S-ADD-ADD, manual review
//! - Disjoint changes: no conflicts, both applied

mod common;

use common::{child_ids, component, doc_with, frame, text};
use scenedoc::merge::{MergeInput, MergeOptions, MergeTarget, Strategy, merge};
use scenedoc::{ConflictCode, Node};
use serde_json::json;

fn run(
    base: &scenedoc::Document,
    local: &scenedoc::Document,
    remote: &scenedoc::Document,
    options: &MergeOptions,
    target: MergeTarget,
) -> scenedoc::ResolutionResult {
    common::init_tracing();
    merge(
        MergeInput {
            base,
            local,
            remote,
            target,
        },
        options,
    )
    .expect("merge should not fail at the engine level")
}

// ---------------------------------------------------------------------------
// Scenario 1: identical inputs
// ---------------------------------------------------------------------------

#[test]
fn identical_inputs_produce_no_conflicts() {
    let d = doc_with(json!([frame("f-1", "Hero", json!([]))]));
    let result = run(&d, &d, &d, &MergeOptions::default(), MergeTarget::Local);

    assert!(result.success);
    assert!(result.unresolved_conflicts.is_empty());
    assert!(result.applied_resolutions.is_empty());
    assert!((result.confidence - 1.0).abs() < f64::EPSILON);
    assert!(!result.needs_manual_review);
    assert_eq!(result.resolved_document, d);
}

// ---------------------------------------------------------------------------
// Scenario 2: delete vs modify
// ---------------------------------------------------------------------------

#[test]
fn delete_versus_modify_needs_manual_review() {
    let base = doc_with(json!([frame("f-1", "Hero", json!([text("t-1", "Title", "Hello")]))]));
    let local = doc_with(json!([frame("f-1", "Hero", json!([]))]));
    let remote = doc_with(json!([frame(
        "f-1",
        "Hero",
        json!([text("t-1", "Title", "Hello Remote")])
    )]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);

    assert_eq!(result.unresolved_conflicts.len(), 1);
    let conflict = &result.unresolved_conflicts[0];
    assert_eq!(conflict.code, ConflictCode::DeleteModify);
    assert!(!conflict.auto_resolvable);
    assert_eq!(conflict.node_id.as_ref().unwrap().as_str(), "t-1");
    assert!(result.needs_manual_review);
    assert!(result.success, "fail_on_unresolved defaults to false");

    // target=local: the deletion wins in the best-effort document.
    assert!(result.resolved_document.artboards[0].children[0]
        .children()
        .is_empty());

    // target=remote keeps the modified text.
    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Remote);
    let kept = &result.resolved_document.artboards[0].children[0].children()[0];
    assert_eq!(kept.text_content(), Some("Hello Remote"));
}

// ---------------------------------------------------------------------------
// Scenario 3: order divergence
// ---------------------------------------------------------------------------

fn order_fixture() -> (scenedoc::Document, scenedoc::Document, scenedoc::Document) {
    let base = doc_with(json!([text("a", "A", "a"), text("b", "B", "b"), text("c", "C", "c")]));
    let local = doc_with(json!([text("b", "B", "b"), text("c", "C", "c"), text("a", "A", "a")]));
    let remote = doc_with(json!([text("c", "C", "c"), text("a", "A", "a"), text("b", "B", "b")]));
    (base, local, remote)
}

#[test]
fn order_divergence_is_auto_resolvable() {
    let (base, local, remote) = order_fixture();
    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);

    // Default threshold 0.7 outranks S-ORDER's 0.6: left to review, and the
    // best-effort document follows the target branch.
    assert_eq!(result.unresolved_conflicts.len(), 1);
    let conflict = &result.unresolved_conflicts[0];
    assert_eq!(conflict.code, ConflictCode::Order);
    assert!(conflict.auto_resolvable);
    assert_eq!(child_ids(&result.resolved_document), ["b", "c", "a"]);
}

#[test]
fn order_divergence_resolves_under_each_strategy() {
    let (base, local, remote) = order_fixture();

    // Local order under the default Merge strategy.
    let options = MergeOptions {
        max_auto_resolve_confidence: Some(0.6),
        ..MergeOptions::default()
    };
    let result = run(&base, &local, &remote, &options, MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    assert_eq!(result.applied_resolutions.len(), 1);
    assert_eq!(child_ids(&result.resolved_document), ["b", "c", "a"]);

    // PreferLocal.
    let mut options = MergeOptions {
        max_auto_resolve_confidence: Some(0.6),
        ..MergeOptions::default()
    };
    options.strategies.set(ConflictCode::Order, Strategy::PreferLocal);
    let result = run(&base, &local, &remote, &options, MergeTarget::Remote);
    assert_eq!(child_ids(&result.resolved_document), ["b", "c", "a"]);

    // PreferRemote.
    let mut options = MergeOptions {
        max_auto_resolve_confidence: Some(0.6),
        ..MergeOptions::default()
    };
    options.strategies.set(ConflictCode::Order, Strategy::PreferRemote);
    let result = run(&base, &local, &remote, &options, MergeTarget::Local);
    assert_eq!(child_ids(&result.resolved_document), ["c", "a", "b"]);
}

#[test]
fn agreeing_reorder_is_not_a_conflict() {
    let base = doc_with(json!([text("a", "A", "a"), text("b", "B", "b"), text("c", "C", "c")]));
    let agreed = doc_with(json!([text("c", "C", "c"), text("a", "A", "a"), text("b", "B", "b")]));
    let result = run(&base, &agreed, &agreed, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    assert_eq!(child_ids(&result.resolved_document), ["c", "a", "b"]);
}

// ---------------------------------------------------------------------------
// Scenario 4: visibility
// ---------------------------------------------------------------------------

#[test]
fn single_branch_visibility_change_applies_without_conflict() {
    let base = doc_with(json!([frame("f-1", "Hero", json!([]))]));
    let mut hidden = frame("f-1", "Hero", json!([]));
    hidden["visible"] = json!(false);
    let local = doc_with(json!([hidden]));

    let result = run(&base, &local, &base, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    assert!(!result.resolved_document.artboards[0].children[0].is_visible());
}

#[test]
fn divergent_visibility_auto_resolves_prefer_local() {
    // Base leaves `visible` unset; local hides, remote pins it visible.
    let base = doc_with(json!([frame("f-1", "Hero", json!([]))]));
    let mut hidden = frame("f-1", "Hero", json!([]));
    hidden["visible"] = json!(false);
    let mut shown = frame("f-1", "Hero", json!([]));
    shown["visible"] = json!(true);
    let local = doc_with(json!([hidden]));
    let remote = doc_with(json!([shown]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Remote);
    assert!(result.unresolved_conflicts.is_empty());
    assert_eq!(result.applied_resolutions.len(), 1);
    let applied = &result.applied_resolutions[0];
    assert_eq!(applied.code, ConflictCode::Visibility);
    assert_eq!(applied.strategy, Strategy::PreferLocal);
    assert!((applied.confidence - 0.7).abs() < f64::EPSILON);
    assert!((result.confidence - 0.7).abs() < f64::EPSILON);
    // PreferLocal beats the remote target.
    assert!(!result.resolved_document.artboards[0].children[0].is_visible());
}

// ---------------------------------------------------------------------------
// Scenario 5: add/add
// ---------------------------------------------------------------------------

#[test]
fn divergent_double_add_needs_manual_review() {
    let base = doc_with(json!([]));
    let mut local_add = text("n-1", "New", "local text");
    local_add["frame"] = json!({"x": 0, "y": 0, "width": 100, "height": 20});
    let mut remote_add = text("n-1", "New", "remote text");
    remote_add["frame"] = json!({"x": 40, "y": 40, "width": 300, "height": 60});
    let local = doc_with(json!([local_add]));
    let remote = doc_with(json!([remote_add]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);
    assert_eq!(result.unresolved_conflicts.len(), 1);
    assert_eq!(result.unresolved_conflicts[0].code, ConflictCode::AddAdd);
    assert!(result.needs_manual_review);
    assert_eq!(
        result.resolved_document.artboards[0].children[0].text_content(),
        Some("local text")
    );
}

#[test]
fn identical_double_add_is_not_a_conflict() {
    let base = doc_with(json!([]));
    let added = doc_with(json!([text("n-1", "New", "same text")]));
    let result = run(&base, &added, &added, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    assert_eq!(child_ids(&result.resolved_document), ["n-1"]);
}

// ---------------------------------------------------------------------------
// Scenario 6: disjoint changes
// ---------------------------------------------------------------------------

#[test]
fn disjoint_changes_merge_cleanly() {
    let base = doc_with(json!([
        frame("f-1", "Header", json!([])),
        frame("f-2", "Footer", json!([]))
    ]));

    let renamed = frame("f-1", "Header Renamed", json!([]));
    let local = doc_with(json!([renamed, frame("f-2", "Footer", json!([]))]));

    let mut shifted = frame("f-2", "Footer", json!([]));
    shifted["frame"] = json!({"x": 240, "y": 0, "width": 600, "height": 400});
    let remote = doc_with(json!([frame("f-1", "Header", json!([])), shifted]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    assert!(!result.needs_manual_review);

    let doc = &result.resolved_document;
    assert_eq!(doc.artboards[0].children[0].name(), "Header Renamed");
    assert!((doc.artboards[0].children[1].header().frame.x - 240.0).abs() < f64::EPSILON);
}

// ---------------------------------------------------------------------------
// Beyond the seed scenarios
// ---------------------------------------------------------------------------

#[test]
fn disjoint_subtree_edits_fast_path() {
    let base = doc_with(json!([
        frame("f-1", "Left", json!([text("t-1", "A", "alpha")])),
        frame("f-2", "Right", json!([text("t-2", "B", "beta")]))
    ]));
    let local = doc_with(json!([
        frame("f-1", "Left", json!([text("t-1", "A", "ALPHA")])),
        frame("f-2", "Right", json!([text("t-2", "B", "beta")]))
    ]));
    let remote = doc_with(json!([
        frame("f-1", "Left", json!([text("t-1", "A", "alpha")])),
        frame("f-2", "Right", json!([text("t-2", "B", "BETA"), text("t-3", "C", "new")]))
    ]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());

    let doc = &result.resolved_document;
    assert_eq!(doc.artboards[0].children[0].children()[0].text_content(), Some("ALPHA"));
    assert_eq!(doc.artboards[0].children[1].children()[0].text_content(), Some("BETA"));
    assert_eq!(doc.artboards[0].children[1].children()[1].id().as_str(), "t-3");
}

#[test]
fn component_props_merge_key_wise_across_branches() {
    let base = doc_with(json!([component("c-1", "Button", "button", json!({"label": "Go"}))]));
    let local = doc_with(json!([component(
        "c-1",
        "Button",
        "button",
        json!({"label": "Go", "size": "large"})
    )]));
    let remote = doc_with(json!([component(
        "c-1",
        "Button",
        "button",
        json!({"label": "Go", "tone": "primary"})
    )]));

    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);
    assert!(result.unresolved_conflicts.is_empty());
    let Node::Component { props, .. } = &result.resolved_document.artboards[0].children[0]
    else {
        panic!("expected component");
    };
    assert_eq!(props.get("label"), Some(&json!("Go")));
    assert_eq!(props.get("size"), Some(&json!("large")));
    assert_eq!(props.get("tone"), Some(&json!("primary")));
}

#[test]
fn merged_document_validates_and_roundtrips() {
    let (base, local, remote) = order_fixture();
    let result = run(&base, &local, &remote, &MergeOptions::default(), MergeTarget::Local);
    let doc = &result.resolved_document;
    assert!(scenedoc::validate(doc).is_ok());
    let bytes = scenedoc::canonical_bytes(doc);
    assert_eq!(&scenedoc::parse(&bytes).unwrap(), doc);
}

#[test]
fn fail_on_unresolved_reports_failure_but_returns_document() {
    let base = doc_with(json!([text("t-1", "Title", "base")]));
    let local = doc_with(json!([text("t-1", "Title", "local")]));
    let remote = doc_with(json!([text("t-1", "Title", "remote")]));

    let options = MergeOptions {
        fail_on_unresolved: true,
        ..MergeOptions::default()
    };
    let result = run(&base, &local, &remote, &options, MergeTarget::Local);
    assert!(!result.success);
    assert!(result.needs_manual_review);
    assert_eq!(result.unresolved_conflicts[0].code, ConflictCode::Text);
    assert_eq!(
        result.resolved_document.artboards[0].children[0].text_content(),
        Some("local")
    );
}
