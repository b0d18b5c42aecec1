//! Typed patches and the pure patch engine.
//!
//! A [`Patch`] is a mutation addressed by a JSON pointer from the document
//! root. [`apply`] is pure: the input document is encoded to its canonical
//! value tree, the pointer operation is applied there, and the result is
//! re-validated and re-decoded. On any failure the input is untouched —
//! atomicity falls out of operating on a copy.
//!
//! Determinism: applying the same patch to the same document always yields
//! the same canonical bytes.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::canonical::canonical_value;
use super::document::Document;
use super::validate::parse_value;
use crate::pointer::Pointer;

// ---------------------------------------------------------------------------
// Patch
// ---------------------------------------------------------------------------

/// A typed mutation addressed by a JSON-pointer path.
///
/// Serialized with an `"op"` tag:
/// `{"op":"replace","path":"/artboards/0/name","value":"Hero"}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum Patch {
    /// Replace the value at `path`. The location must exist and the new
    /// value must have the same JSON type as the old one.
    Replace {
        /// Location to replace.
        path: Pointer,
        /// The new value.
        value: Value,
    },
    /// Create the value at `path`. Missing object keys are created; array
    /// indices insert, shifting successors (index == length appends).
    Add {
        /// Location to create.
        path: Pointer,
        /// The value to insert.
        value: Value,
    },
    /// Remove the value at `path`. The location must exist.
    Remove {
        /// Location to remove.
        path: Pointer,
    },
    /// Remove the value at `from` and re-insert it at `path`, atomically.
    Move {
        /// Source location.
        from: Pointer,
        /// Destination location.
        path: Pointer,
    },
}

impl Patch {
    /// The primary path this patch addresses (destination for `move`).
    #[must_use]
    pub const fn path(&self) -> &Pointer {
        match self {
            Self::Replace { path, .. }
            | Self::Add { path, .. }
            | Self::Remove { path }
            | Self::Move { path, .. } => path,
        }
    }

    /// The op tag as a static string.
    #[must_use]
    pub const fn op_name(&self) -> &'static str {
        match self {
            Self::Replace { .. } => "replace",
            Self::Add { .. } => "add",
            Self::Remove { .. } => "remove",
            Self::Move { .. } => "move",
        }
    }

    /// Decode a patch from foreign JSON, mapping an unrecognized `op` tag to
    /// [`PatchErrorKind::UnknownOp`] instead of a bare serde error.
    ///
    /// # Errors
    /// Returns `unknown-op` for an unrecognized or missing tag, and
    /// `path-not-found` for malformed pointer syntax.
    pub fn from_value(value: &Value) -> Result<Self, PatchError> {
        let op = value
            .get("op")
            .and_then(Value::as_str)
            .ok_or_else(|| PatchError {
                kind: PatchErrorKind::UnknownOp,
                path: String::new(),
                message: "patch object is missing an `op` tag".to_owned(),
            })?;
        if !matches!(op, "replace" | "add" | "remove" | "move") {
            return Err(PatchError {
                kind: PatchErrorKind::UnknownOp,
                path: String::new(),
                message: format!("unknown op {op:?}"),
            });
        }
        serde_json::from_value(value.clone()).map_err(|e| PatchError {
            kind: PatchErrorKind::PathNotFound,
            path: String::new(),
            message: e.to_string(),
        })
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Move { from, path } => write!(f, "move {from} -> {path}"),
            other => write!(f, "{} {}", other.op_name(), other.path()),
        }
    }
}

// ---------------------------------------------------------------------------
// PatchError
// ---------------------------------------------------------------------------

/// The machine-stable kind of a patch failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PatchErrorKind {
    /// The path names a location that does not exist.
    PathNotFound,
    /// The replacement value has a different JSON type than the target.
    TypeMismatch,
    /// The patched document would violate a structural invariant.
    InvariantViolation,
    /// The patch carried an unrecognized `op` tag.
    UnknownOp,
}

impl PatchErrorKind {
    /// Stable tag UIs can key translations off.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PathNotFound => "path-not-found",
            Self::TypeMismatch => "type-mismatch",
            Self::InvariantViolation => "invariant-violation",
            Self::UnknownOp => "unknown-op",
        }
    }
}

impl fmt::Display for PatchErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A failed patch application. The document is unchanged when this fires.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchError {
    /// What went wrong.
    pub kind: PatchErrorKind,
    /// The offending path (escaped pointer form).
    pub path: String,
    /// Human-readable explanation.
    pub message: String,
}

impl PatchError {
    fn at(kind: PatchErrorKind, path: &Pointer, message: impl Into<String>) -> Self {
        Self {
            kind,
            path: path.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {:?}: {}", self.kind, self.path, self.message)
    }
}

impl std::error::Error for PatchError {}

// ---------------------------------------------------------------------------
// apply
// ---------------------------------------------------------------------------

/// Apply a patch to a document, producing a new document.
///
/// Pure: the input is never mutated. The result is re-validated; a patch
/// that would violate any structural invariant fails with
/// `invariant-violation` and the input stands.
///
/// # Errors
/// Returns a [`PatchError`] describing the first failure.
pub fn apply(doc: &Document, patch: &Patch) -> Result<Document, PatchError> {
    let mut tree = canonical_value(doc);
    apply_to_value(&mut tree, patch)?;
    parse_value(&tree).map_err(|e| PatchError {
        kind: PatchErrorKind::InvariantViolation,
        path: patch.path().to_string(),
        message: e.to_string(),
    })
}

fn apply_to_value(tree: &mut Value, patch: &Patch) -> Result<(), PatchError> {
    match patch {
        Patch::Replace { path, value } => replace_at(tree, path, value.clone()),
        Patch::Add { path, value } => add_at(tree, path, value.clone()),
        Patch::Remove { path } => remove_at(tree, path).map(|_| ()),
        Patch::Move { from, path } => {
            let moved = remove_at(tree, from)?;
            add_at(tree, path, moved)
        }
    }
}

/// Walk to the parent of the addressed location, returning the container and
/// the final token. Resolution rides on `serde_json`'s RFC 6901 pointer
/// lookup, whose index syntax (unsigned decimal, no leading zeros) matches
/// the patch contract.
fn resolve_parent<'tree>(
    tree: &'tree mut Value,
    path: &Pointer,
) -> Result<(&'tree mut Value, String), PatchError> {
    let Some((parent, last)) = path.split_parent() else {
        return Err(PatchError::at(
            PatchErrorKind::PathNotFound,
            path,
            "a patch cannot address the document root",
        ));
    };
    let last = last.to_owned();
    let container = tree.pointer_mut(&parent.to_string()).ok_or_else(|| {
        PatchError::at(
            PatchErrorKind::PathNotFound,
            path,
            format!("no container at \"{parent}\" while resolving the path"),
        )
    })?;
    Ok((container, last))
}

fn replace_at(tree: &mut Value, path: &Pointer, new_value: Value) -> Result<(), PatchError> {
    let (parent, last) = resolve_parent(tree, path)?;
    let slot = match parent {
        Value::Object(map) => map.get_mut(&last),
        Value::Array(items) => Pointer::as_index(&last).and_then(|idx| items.get_mut(idx)),
        _ => None,
    }
    .ok_or_else(|| {
        PatchError::at(
            PatchErrorKind::PathNotFound,
            path,
            "replace target does not exist",
        )
    })?;
    if json_discriminant(slot) != json_discriminant(&new_value) {
        return Err(PatchError::at(
            PatchErrorKind::TypeMismatch,
            path,
            format!(
                "cannot replace {} with {}",
                json_discriminant(slot),
                json_discriminant(&new_value)
            ),
        ));
    }
    *slot = new_value;
    Ok(())
}

fn add_at(tree: &mut Value, path: &Pointer, new_value: Value) -> Result<(), PatchError> {
    let (parent, last) = resolve_parent(tree, path)?;
    match parent {
        Value::Object(map) => {
            map.insert(last, new_value);
            Ok(())
        }
        Value::Array(items) => {
            let idx = Pointer::as_index(&last).ok_or_else(|| {
                PatchError::at(
                    PatchErrorKind::PathNotFound,
                    path,
                    format!("{last:?} is not a valid array index"),
                )
            })?;
            if idx > items.len() {
                return Err(PatchError::at(
                    PatchErrorKind::PathNotFound,
                    path,
                    format!("index {idx} is out of bounds for length {}", items.len()),
                ));
            }
            items.insert(idx, new_value);
            Ok(())
        }
        other => Err(PatchError::at(
            PatchErrorKind::PathNotFound,
            path,
            format!("cannot add into {}", json_discriminant(other)),
        )),
    }
}

fn remove_at(tree: &mut Value, path: &Pointer) -> Result<Value, PatchError> {
    let (parent, last) = resolve_parent(tree, path)?;
    match parent {
        Value::Object(map) => map.remove(&last).map_or_else(
            || {
                Err(PatchError::at(
                    PatchErrorKind::PathNotFound,
                    path,
                    "remove target does not exist",
                ))
            },
            Ok,
        ),
        Value::Array(items) => {
            let idx = Pointer::as_index(&last).filter(|&i| i < items.len()).ok_or_else(|| {
                PatchError::at(
                    PatchErrorKind::PathNotFound,
                    path,
                    "remove target does not exist",
                )
            })?;
            Ok(items.remove(idx))
        }
        other => Err(PatchError::at(
            PatchErrorKind::PathNotFound,
            path,
            format!("cannot remove from {}", json_discriminant(other)),
        )),
    }
}

const fn json_discriminant(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
