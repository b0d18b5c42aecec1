//! Structured conflict model.
//!
//! Conflicts are structured and localizable — per node, per field — not
//! marker soup. Each conflict carries a machine-stable code, a severity, the
//! path of the affected location, and the metadata the resolution engine
//! needs to decide whether it can act without a human.
//!
//! # Conflict codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | `S-DEL-MOD` | Deleted in one branch, modified in the other |
//! | `S-ADD-ADD` | Added in both branches with differing payloads |
//! | `S-MOVE-MOVE` | Moved to different parents in each branch |
//! | `S-ORDER` | Sibling order diverged in both branches |
//! | `P-GEOMETRY` | Frame geometry diverged |
//! | `P-VISIBILITY` | Visibility diverged |
//! | `P-LAYOUT` | Layout block diverged |
//! | `P-STYLE` | Style block diverged |
//! | `C-TEXT` | Text content diverged |
//! | `C-COMPONENT-PROPS` | Component props diverged on the same keys |
//! | `M-NAME` | Name diverged |

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::types::{NodeId, Severity};

// ---------------------------------------------------------------------------
// ConflictKind
// ---------------------------------------------------------------------------

/// Coarse classification of a conflict.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictKind {
    /// Tree shape: additions, removals, moves, ordering.
    Structural,
    /// Header properties: geometry, visibility, layout, style.
    Property,
    /// Payload content: text, component props.
    Content,
    /// Metadata: names.
    Metadata,
}

impl fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Structural => write!(f, "structural"),
            Self::Property => write!(f, "property"),
            Self::Content => write!(f, "content"),
            Self::Metadata => write!(f, "metadata"),
        }
    }
}

// ---------------------------------------------------------------------------
// ConflictCode
// ---------------------------------------------------------------------------

/// The machine-stable classification of a divergence.
///
/// Serialized as the wire code (`"S-DEL-MOD"`, …). Each code fixes its
/// [`ConflictKind`], default [`Severity`], auto-resolvability, and default
/// confidence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConflictCode {
    /// Removed in one branch, modified (or moved) in the other.
    #[serde(rename = "S-DEL-MOD")]
    DeleteModify,
    /// Added in both branches with differing payloads.
    #[serde(rename = "S-ADD-ADD")]
    AddAdd,
    /// Moved to different parents in each branch.
    #[serde(rename = "S-MOVE-MOVE")]
    MoveMove,
    /// Sibling order changed differently in both branches.
    #[serde(rename = "S-ORDER")]
    Order,
    /// A frame geometry field diverged.
    #[serde(rename = "P-GEOMETRY")]
    Geometry,
    /// Visibility diverged.
    #[serde(rename = "P-VISIBILITY")]
    Visibility,
    /// The layout block diverged.
    #[serde(rename = "P-LAYOUT")]
    Layout,
    /// The style block diverged.
    #[serde(rename = "P-STYLE")]
    Style,
    /// Text content diverged.
    #[serde(rename = "C-TEXT")]
    Text,
    /// Component props diverged on the same keys.
    #[serde(rename = "C-COMPONENT-PROPS")]
    ComponentProps,
    /// The human label diverged.
    #[serde(rename = "M-NAME")]
    Name,
}

impl ConflictCode {
    /// Every code, in classification-table order.
    pub const ALL: [Self; 11] = [
        Self::DeleteModify,
        Self::AddAdd,
        Self::MoveMove,
        Self::Order,
        Self::Geometry,
        Self::Visibility,
        Self::Layout,
        Self::Style,
        Self::Text,
        Self::ComponentProps,
        Self::Name,
    ];

    /// The wire code.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DeleteModify => "S-DEL-MOD",
            Self::AddAdd => "S-ADD-ADD",
            Self::MoveMove => "S-MOVE-MOVE",
            Self::Order => "S-ORDER",
            Self::Geometry => "P-GEOMETRY",
            Self::Visibility => "P-VISIBILITY",
            Self::Layout => "P-LAYOUT",
            Self::Style => "P-STYLE",
            Self::Text => "C-TEXT",
            Self::ComponentProps => "C-COMPONENT-PROPS",
            Self::Name => "M-NAME",
        }
    }

    /// Coarse kind derived from the code prefix.
    #[must_use]
    pub const fn kind(self) -> ConflictKind {
        match self {
            Self::DeleteModify | Self::AddAdd | Self::MoveMove | Self::Order => {
                ConflictKind::Structural
            }
            Self::Geometry | Self::Visibility | Self::Layout | Self::Style => {
                ConflictKind::Property
            }
            Self::Text | Self::ComponentProps => ConflictKind::Content,
            Self::Name => ConflictKind::Metadata,
        }
    }

    /// Default severity of the code.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self {
            Self::DeleteModify => Severity::Error,
            Self::AddAdd | Self::MoveMove | Self::Geometry | Self::Text | Self::ComponentProps => {
                Severity::Warning
            }
            Self::Order | Self::Visibility | Self::Layout | Self::Style | Self::Name => {
                Severity::Info
            }
        }
    }

    /// Whether the engine may resolve this code without a human.
    #[must_use]
    pub const fn auto_resolvable(self) -> bool {
        matches!(self, Self::Order | Self::Visibility | Self::Name)
    }

    /// Default confidence an automatic resolution would carry.
    #[must_use]
    pub const fn confidence(self) -> f64 {
        match self {
            Self::Order => 0.6,
            Self::Visibility => 0.7,
            Self::Name => 0.5,
            _ => 0.0,
        }
    }
}

impl fmt::Display for ConflictCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictCode {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|code| code.as_str() == s)
            .ok_or_else(|| format!("unknown conflict code {s:?}"))
    }
}

// ---------------------------------------------------------------------------
// Conflict
// ---------------------------------------------------------------------------

/// A single divergence between local and remote relative to base.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
    /// Deterministic identifier: `"<code>:<node-id-or-path>"`.
    pub id: String,
    /// Coarse classification.
    #[serde(rename = "type")]
    pub kind: ConflictKind,
    /// Machine-stable code.
    pub code: ConflictCode,
    /// Severity of the divergence.
    pub severity: Severity,
    /// JSON pointer of the affected location.
    pub path: String,
    /// The affected node id, when the conflict anchors to one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// Whether the engine may resolve this without a human.
    pub auto_resolvable: bool,
    /// Confidence an automatic resolution would carry, in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable description.
    pub message: String,
}

impl Conflict {
    /// Build a conflict with the code's default severity, resolvability, and
    /// confidence.
    #[must_use]
    pub fn new(
        code: ConflictCode,
        path: impl Into<String>,
        node_id: Option<NodeId>,
        message: impl Into<String>,
    ) -> Self {
        let path = path.into();
        let anchor = node_id
            .as_ref()
            .map_or_else(|| path.clone(), |id| id.as_str().to_owned());
        Self {
            id: format!("{}:{anchor}", code.as_str()),
            kind: code.kind(),
            code,
            severity: code.severity(),
            path,
            node_id,
            auto_resolvable: code.auto_resolvable(),
            confidence: code.confidence(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {} — {}", self.code, self.path, self.message)
    }
}

// ---------------------------------------------------------------------------
// ConflictSet
// ---------------------------------------------------------------------------

/// Every divergence between local and remote relative to base.
///
/// The list is sorted by `(code, anchor)` and is a pure function of the
/// three input documents.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ConflictSet {
    /// The conflicts, in deterministic order.
    pub conflicts: Vec<Conflict>,
}

impl ConflictSet {
    /// An empty set.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            conflicts: Vec::new(),
        }
    }

    /// `true` if no conflicts were detected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    /// The distinct codes present.
    #[must_use]
    pub fn codes(&self) -> BTreeSet<ConflictCode> {
        self.conflicts.iter().map(|c| c.code).collect()
    }

    /// Conflicts carrying the given code.
    #[must_use]
    pub fn by_code(&self, code: ConflictCode) -> Vec<&Conflict> {
        self.conflicts.iter().filter(|c| c.code == code).collect()
    }

    /// Append a conflict; callers sort once detection is complete.
    pub fn push(&mut self, conflict: Conflict) {
        self.conflicts.push(conflict);
    }

    /// Sort into the deterministic output order.
    pub fn sort(&mut self) {
        self.conflicts.sort_by(|a, b| {
            a.code
                .cmp(&b.code)
                .then_with(|| a.node_id.cmp(&b.node_id))
                .then_with(|| a.path.cmp(&b.path))
        });
    }

    /// Iterate the conflicts.
    pub fn iter(&self) -> impl Iterator<Item = &Conflict> {
        self.conflicts.iter()
    }
}

impl IntoIterator for ConflictSet {
    type Item = Conflict;
    type IntoIter = std::vec::IntoIter<Conflict>;
    fn into_iter(self) -> Self::IntoIter {
        self.conflicts.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
