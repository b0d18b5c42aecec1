//! Core types for the three-way merge engine.
//!
//! Defines the data that flows through the diff → detect → resolve
//! pipeline: merge inputs, strategy configuration, resolution output, merge
//! errors, and the cooperative cancellation token.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::model::conflict::{Conflict, ConflictCode};
use crate::model::document::Document;

use super::diff::DiffOptions;

// ---------------------------------------------------------------------------
// CancelToken
// ---------------------------------------------------------------------------

/// Cooperative cancellation signal for long-running diff and merge work.
///
/// The engine checks the token only between node visits (every
/// `yield_every` visits), so no operation observes a partially-processed
/// node. Cancelled operations fail without producing a document.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    /// A fresh, un-cancelled token.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    /// `true` once [`cancel`](Self::cancel) has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// MergeTarget
// ---------------------------------------------------------------------------

/// Which branch's values win for conflicts left to manual review.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeTarget {
    /// Keep the local branch's value for unresolved conflicts.
    #[default]
    Local,
    /// Keep the remote branch's value for unresolved conflicts.
    Remote,
}

impl fmt::Display for MergeTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
        }
    }
}

// ---------------------------------------------------------------------------
// Strategy
// ---------------------------------------------------------------------------

/// How an auto-resolvable conflict code is resolved.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Strategy {
    /// Take the local branch's value.
    PreferLocal,
    /// Take the remote branch's value.
    PreferRemote,
    /// Keep the base value.
    PreferBase,
    /// Combine both branches (child-order merge for `S-ORDER`).
    Merge,
    /// Leave the conflict to a human.
    Manual,
}

impl Strategy {
    /// The wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PreferLocal => "prefer-local",
            Self::PreferRemote => "prefer-remote",
            Self::PreferBase => "prefer-base",
            Self::Merge => "merge",
            Self::Manual => "manual",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "prefer-local" => Ok(Self::PreferLocal),
            "prefer-remote" => Ok(Self::PreferRemote),
            "prefer-base" => Ok(Self::PreferBase),
            "merge" => Ok(Self::Merge),
            "manual" => Ok(Self::Manual),
            other => Err(format!("unknown strategy {other:?}")),
        }
    }
}

// ---------------------------------------------------------------------------
// StrategySet
// ---------------------------------------------------------------------------

/// Per-code strategy table.
///
/// Defaults: `S-ORDER` → `Merge`, `P-VISIBILITY` → `PreferLocal`,
/// `M-NAME` → `PreferRemote`, everything else → `Manual`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategySet {
    overrides: BTreeMap<ConflictCode, Strategy>,
}

impl Default for StrategySet {
    fn default() -> Self {
        let mut overrides = BTreeMap::new();
        overrides.insert(ConflictCode::Order, Strategy::Merge);
        overrides.insert(ConflictCode::Visibility, Strategy::PreferLocal);
        overrides.insert(ConflictCode::Name, Strategy::PreferRemote);
        Self { overrides }
    }
}

impl StrategySet {
    /// The default table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the strategy for a code.
    pub fn set(&mut self, code: ConflictCode, strategy: Strategy) -> &mut Self {
        self.overrides.insert(code, strategy);
        self
    }

    /// The effective strategy for a code (`Manual` when unset).
    #[must_use]
    pub fn for_code(&self, code: ConflictCode) -> Strategy {
        self.overrides
            .get(&code)
            .copied()
            .unwrap_or(Strategy::Manual)
    }
}

// ---------------------------------------------------------------------------
// MergeOptions
// ---------------------------------------------------------------------------

/// Default auto-resolve confidence threshold.
pub const DEFAULT_AUTO_RESOLVE_CONFIDENCE: f64 = 0.7;

/// Tuning for a merge run.
#[derive(Clone, Debug, Default)]
pub struct MergeOptions {
    /// Per-code resolution strategies.
    pub strategies: StrategySet,
    /// Minimum confidence a conflict needs to be auto-resolved.
    pub max_auto_resolve_confidence: Option<f64>,
    /// When set, `success` is false if any conflict stays unresolved.
    pub fail_on_unresolved: bool,
    /// Options forwarded to the two branch diffs.
    pub diff: DiffOptions,
    /// Wall-clock budget; exceeded → `merge-timeout`.
    pub timeout: Option<Duration>,
}

impl MergeOptions {
    /// The effective auto-resolve threshold.
    #[must_use]
    pub fn auto_resolve_threshold(&self) -> f64 {
        self.max_auto_resolve_confidence
            .unwrap_or(DEFAULT_AUTO_RESOLVE_CONFIDENCE)
    }

    /// Whether a conflict may be resolved without a human under these
    /// options. A `Manual` strategy never auto-resolves, regardless of
    /// confidence.
    #[must_use]
    pub fn can_auto_resolve(&self, conflict: &Conflict) -> bool {
        conflict.auto_resolvable
            && conflict.confidence >= self.auto_resolve_threshold()
            && self.strategies.for_code(conflict.code) != Strategy::Manual
    }
}

// ---------------------------------------------------------------------------
// MergeInput
// ---------------------------------------------------------------------------

/// The three documents of a merge, plus the fallback target branch.
#[derive(Clone, Copy, Debug)]
pub struct MergeInput<'docs> {
    /// Common ancestor.
    pub base: &'docs Document,
    /// One divergent version.
    pub local: &'docs Document,
    /// The other divergent version.
    pub remote: &'docs Document,
    /// Branch whose values win for unresolved conflicts.
    pub target: MergeTarget,
}

// ---------------------------------------------------------------------------
// AppliedResolution / ResolutionResult
// ---------------------------------------------------------------------------

/// One automatically applied conflict resolution.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedResolution {
    /// The resolved conflict's id.
    pub conflict_id: String,
    /// The resolved conflict's code.
    pub code: ConflictCode,
    /// Strategy that was applied.
    pub strategy: Strategy,
    /// Confidence of this resolution, in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable description of what was done.
    pub description: String,
}

/// The outcome of a merge.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionResult {
    /// False only when `fail_on_unresolved` is set and conflicts remain.
    pub success: bool,
    /// The merged document (best-effort when conflicts remain).
    pub resolved_document: Document,
    /// Automatically applied resolutions.
    pub applied_resolutions: Vec<AppliedResolution>,
    /// Conflicts requiring human input.
    pub unresolved_conflicts: Vec<Conflict>,
    /// Arithmetic mean of applied-resolution confidences (1.0 when there
    /// were no conflicts).
    pub confidence: f64,
    /// True whenever any conflict stays unresolved.
    pub needs_manual_review: bool,
}

// ---------------------------------------------------------------------------
// MergeError
// ---------------------------------------------------------------------------

/// The machine-stable kind of a merge failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MergeErrorKind {
    /// Inputs failed validation or disagree on schema version.
    InvalidInput,
    /// The resolution engine violated an internal invariant.
    MergeInternal,
    /// The configured wall-clock budget was exceeded.
    MergeTimeout,
    /// The cancellation token fired.
    Cancelled,
}

impl MergeErrorKind {
    /// Stable tag UIs can key translations off.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidInput => "invalid-input",
            Self::MergeInternal => "merge-internal",
            Self::MergeTimeout => "merge-timeout",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for MergeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A merge-level failure. No document is produced when this fires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeError {
    /// What went wrong.
    pub kind: MergeErrorKind,
    /// Human-readable detail.
    pub detail: String,
}

impl MergeError {
    /// Build an error of the given kind.
    #[must_use]
    pub fn new(kind: MergeErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }
}

impl fmt::Display for MergeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for MergeError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
