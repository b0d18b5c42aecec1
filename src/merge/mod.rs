//! Deterministic three-way merge engine.
//!
//! Implements the diff → detect → resolve pipeline. Each phase is a
//! separate module:
//!
//! - **diff**: Pair nodes by id and compute semantic operations per branch.
//! - **detect**: Classify every divergence between the branches into the
//!   conflict table.
//! - **resolve**: Apply non-conflicting changes from both branches, apply
//!   strategies for auto-resolvable conflicts, and build the merged
//!   document.
//!
//! # Determinism guarantee
//!
//! The same `(base, local, remote, options)` always produce the same
//! conflict set and the same resolved document:
//!
//! - Ids are processed in lexicographic order.
//! - Child ordering merges are pure sequence functions.
//! - No phase iterates a hash-ordered container.
//!
//! Merge never mutates its inputs and never partially succeeds: it returns
//! a complete resolution or a merge-level error.

pub mod detect;
pub mod diff;
pub mod resolve;
pub mod types;


use std::time::Instant;

use crate::model::validate;

pub use detect::detect;
pub use diff::{
    DiffError, DiffErrorKind, DiffField, DiffOpKind, DiffOperation, DiffOptions, DiffSummary,
    DocumentDiff, diff,
};
pub use types::{
    AppliedResolution, CancelToken, MergeError, MergeErrorKind, MergeInput, MergeOptions,
    MergeTarget, ResolutionResult, Strategy, StrategySet,
};

fn check_input(
    doc: &crate::model::document::Document,
    role: &str,
) -> Result<(), MergeError> {
    validate::validate(doc).map_err(|errors| {
        MergeError::new(
            MergeErrorKind::InvalidInput,
            format!("{role} document is invalid: {}", errors[0]),
        )
    })
}

fn to_merge_error(e: DiffError) -> MergeError {
    match e.kind {
        DiffErrorKind::Cancelled => MergeError::new(MergeErrorKind::Cancelled, e.message),
        DiffErrorKind::Timeout => MergeError::new(MergeErrorKind::MergeTimeout, e.message),
        DiffErrorKind::OperationLimit => {
            MergeError::new(MergeErrorKind::InvalidInput, e.message)
        }
    }
}

/// Merge two divergent documents against their common ancestor.
///
/// Produces a best-effort document even when conflicts remain for manual
/// review; see [`ResolutionResult`].
///
/// # Errors
/// `invalid-input` for unvalidated inputs or mismatched schema versions,
/// `cancelled`/`merge-timeout` for interrupted runs, and `merge-internal`
/// when resolution violates a structural invariant (unreachable by
/// construction).
pub fn merge(
    input: MergeInput<'_>,
    options: &MergeOptions,
) -> Result<ResolutionResult, MergeError> {
    check_input(input.base, "base")?;
    check_input(input.local, "local")?;
    check_input(input.remote, "remote")?;

    if input.base.schema_version != input.local.schema_version
        || input.base.schema_version != input.remote.schema_version
    {
        return Err(MergeError::new(
            MergeErrorKind::InvalidInput,
            format!(
                "schema versions differ: base={}, local={}, remote={}",
                input.base.schema_version, input.local.schema_version, input.remote.schema_version
            ),
        ));
    }

    let mut diff_options = options.diff.clone();
    if let Some(timeout) = options.timeout {
        let deadline = Instant::now() + timeout;
        diff_options.deadline = Some(match diff_options.deadline {
            Some(existing) => existing.min(deadline),
            None => deadline,
        });
    }

    // The branch diffs drive cooperative cancellation and the operation
    // safety cap; detection re-derives per-field changes from the shared
    // placement tables.
    let local_diff = diff(input.base, input.local, &diff_options).map_err(to_merge_error)?;
    let remote_diff = diff(input.base, input.remote, &diff_options).map_err(to_merge_error)?;
    tracing::debug!(
        local_ops = local_diff.summary.total,
        remote_ops = remote_diff.summary.total,
        "branch diffs computed"
    );

    let ctx = detect::MergeContext::build(input.base, input.local, input.remote);
    let conflicts = detect::detect_in(&ctx);

    if diff_options
        .cancel
        .as_ref()
        .is_some_and(CancelToken::is_cancelled)
    {
        return Err(MergeError::new(
            MergeErrorKind::Cancelled,
            "cancelled before resolution",
        ));
    }
    if diff_options
        .deadline
        .is_some_and(|d| Instant::now() >= d)
    {
        return Err(MergeError::new(
            MergeErrorKind::MergeTimeout,
            "deadline exceeded before resolution",
        ));
    }

    let had_conflicts = !conflicts.is_empty();
    let resolved = resolve::resolve(&ctx, &conflicts, options, input.target)?;

    if let Err(errors) = validate::validate(&resolved.document) {
        return Err(MergeError::new(
            MergeErrorKind::MergeInternal,
            format!("resolved document violates invariants: {}", errors[0]),
        ));
    }

    let confidence = if had_conflicts {
        if resolved.applied.is_empty() {
            0.0
        } else {
            resolved.applied.iter().map(|r| r.confidence).sum::<f64>()
                / resolved.applied.len() as f64
        }
    } else {
        1.0
    };

    let needs_manual_review = !resolved.unresolved.is_empty();
    let success = !(options.fail_on_unresolved && needs_manual_review);
    tracing::debug!(
        conflicts = conflicts.len(),
        applied = resolved.applied.len(),
        unresolved = resolved.unresolved.len(),
        success,
        "merge complete"
    );

    Ok(ResolutionResult {
        success,
        resolved_document: resolved.document,
        applied_resolutions: resolved.applied,
        unresolved_conflicts: resolved.unresolved,
        confidence,
        needs_manual_review,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::Document;
    use crate::model::validate::parse;
    use serde_json::json;

    fn doc_with(children: serde_json::Value) -> Document {
        let bytes = serde_json::to_vec(&json!({
            "schemaVersion": "0.1.0",
            "id": "doc-1",
            "name": "Fixture",
            "artboards": [{
                "id": "ab-1",
                "name": "Board",
                "frame": {"x": 0, "y": 0, "width": 1000, "height": 1000},
                "children": children
            }]
        }))
        .unwrap();
        parse(&bytes).unwrap()
    }

    fn text(id: &str, content: &str) -> serde_json::Value {
        json!({
            "type": "text",
            "id": id,
            "name": id,
            "frame": {"x": 0, "y": 0, "width": 100, "height": 20},
            "text": content
        })
    }

    #[test]
    fn merge_of_equals() {
        let d = doc_with(json!([text("t-1", "Hello")]));
        let result = merge(
            MergeInput {
                base: &d,
                local: &d,
                remote: &d,
                target: MergeTarget::Local,
            },
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(result.success);
        assert_eq!(result.resolved_document, d);
        assert!(result.unresolved_conflicts.is_empty());
        assert!((result.confidence - 1.0).abs() < f64::EPSILON);
        assert!(!result.needs_manual_review);
    }

    #[test]
    fn mismatched_schema_versions_rejected() {
        let d = doc_with(json!([]));
        let mut other = d.clone();
        other.schema_version = crate::model::types::SchemaVersion::new("0.1.9").unwrap();
        let err = merge(
            MergeInput {
                base: &d,
                local: &other,
                remote: &d,
                target: MergeTarget::Local,
            },
            &MergeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, MergeErrorKind::InvalidInput);
    }

    #[test]
    fn invalid_input_rejected() {
        let d = doc_with(json!([text("t-1", "x")]));
        let mut broken = d.clone();
        broken.artboards[0].frame.width = -4.0;
        let err = merge(
            MergeInput {
                base: &d,
                local: &broken,
                remote: &d,
                target: MergeTarget::Local,
            },
            &MergeOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, MergeErrorKind::InvalidInput);
    }

    #[test]
    fn cancellation_propagates() {
        let d = doc_with(json!([text("t-1", "x")]));
        let token = CancelToken::new();
        token.cancel();
        let options = MergeOptions {
            diff: DiffOptions {
                cancel: Some(token),
                yield_every: 1,
                ..DiffOptions::default()
            },
            ..MergeOptions::default()
        };
        let err = merge(
            MergeInput {
                base: &d,
                local: &d,
                remote: &d,
                target: MergeTarget::Local,
            },
            &options,
        )
        .unwrap_err();
        assert_eq!(err.kind, MergeErrorKind::Cancelled);
    }

    #[test]
    fn fail_on_unresolved_flips_success() {
        let base = doc_with(json!([text("t-1", "Hello")]));
        let local = doc_with(json!([]));
        let remote = doc_with(json!([text("t-1", "Hello Remote")]));

        let lenient = merge(
            MergeInput {
                base: &base,
                local: &local,
                remote: &remote,
                target: MergeTarget::Local,
            },
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(lenient.success);
        assert!(lenient.needs_manual_review);

        let strict = merge(
            MergeInput {
                base: &base,
                local: &local,
                remote: &remote,
                target: MergeTarget::Local,
            },
            &MergeOptions {
                fail_on_unresolved: true,
                ..MergeOptions::default()
            },
        )
        .unwrap();
        assert!(!strict.success);
        assert!(strict.needs_manual_review);
    }

    #[test]
    fn disjoint_changes_fast_path() {
        let base = doc_with(json!([text("t-1", "one"), text("t-2", "two")]));
        let mut renamed = text("t-1", "one");
        renamed["name"] = json!("Renamed");
        let local = doc_with(json!([renamed, text("t-2", "two")]));
        let mut moved = text("t-2", "two");
        moved["frame"] = json!({"x": 50, "y": 0, "width": 100, "height": 20});
        let remote = doc_with(json!([text("t-1", "one"), moved]));

        let result = merge(
            MergeInput {
                base: &base,
                local: &local,
                remote: &remote,
                target: MergeTarget::Local,
            },
            &MergeOptions::default(),
        )
        .unwrap();
        assert!(result.unresolved_conflicts.is_empty());
        let doc = &result.resolved_document;
        assert_eq!(doc.artboards[0].children[0].name(), "Renamed");
        assert!(
            (doc.artboards[0].children[1].header().frame.x - 50.0).abs() < f64::EPSILON
        );
    }
}
