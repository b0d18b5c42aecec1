//! scenedoc — a deterministic design-document engine.
//!
//! Maintains a canonical scene-graph document (artboards containing
//! frame/text/component nodes), answers structural queries through an
//! id-indexed traversal layer, applies typed patches with validation and
//! undo/redo, and computes semantic diffs and three-way merges between
//! document versions.
//!
//! Rendering, editor UI, and code generation are external collaborators:
//! they feed documents in through [`model::validate::parse`] or
//! [`store::DocumentStore::load`] and consume query results, patch
//! outcomes, diff operations, and merge verdicts.
//!
//! Determinism is a cross-cutting contract: canonical bytes, diff
//! operation order, and conflict lists are pure functions of document
//! content, never of hash-table iteration.

pub mod config;
pub mod index;
pub mod merge;
pub mod model;
pub mod pointer;
pub mod store;

pub use config::EngineConfig;
pub use index::{DocumentIndex, DocumentStats, NodePath, TraverseOptions};
pub use merge::{
    CancelToken, DiffOptions, DocumentDiff, MergeError, MergeInput, MergeOptions, MergeTarget,
    ResolutionResult, Strategy, diff, merge,
};
pub use model::canonical::{canonical_bytes, document_hash};
pub use model::conflict::{Conflict, ConflictCode, ConflictSet};
pub use model::document::{Artboard, Document};
pub use model::node::{Node, NodeHeader, NodeType};
pub use model::patch::{Patch, PatchError, apply};
pub use model::types::{DocumentHash, DocumentId, NodeId, Rect, SchemaVersion, ValidationError};
pub use model::validate::{parse, validate};
pub use pointer::Pointer;
pub use store::{DocumentStore, PropertyChange, StoreConfig, StoreError, StoreEvent};
