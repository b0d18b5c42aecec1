//! The document store: exclusive owner of the current document.
//!
//! The store routes every mutation through the patch engine, re-validates,
//! maintains bounded undo/redo stacks of deep-copied snapshots, records a
//! mutation history, and emits synchronous events. All operations on one
//! store are serialized in submission order; callers wanting parallelism
//! hold one store per thread.
//!
//! # Hash & identity
//!
//! Each mutation event carries the SHA-256 of the canonical **pre-mutation**
//! bytes: event `i`'s hash describes the document as of event `i-1` (or the
//! initial load). Callers rely on this for change detection.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::index::{DocumentIndex, FoundNode};
use crate::model::canonical::{canonical_bytes, document_hash};
use crate::model::document::Document;
use crate::model::patch::{self, Patch, PatchError};
use crate::model::types::{DocumentHash, DocumentId, NodeId, ValidationError};
use crate::model::validate;
use crate::pointer::Pointer;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Default bound on the undo stack.
pub const DEFAULT_MAX_UNDO_DEPTH: usize = 200;

/// Store construction options.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoreConfig {
    /// Oldest snapshots are discarded past this depth.
    pub max_undo_depth: usize,
    /// Where [`DocumentStore::save`] writes, unless `load` overrides it.
    pub persistence_path: Option<PathBuf>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            max_undo_depth: DEFAULT_MAX_UNDO_DEPTH,
            persistence_path: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// The kind of a recorded mutation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MutationKind {
    /// A single property change.
    PropertyChange,
    /// An atomic batch of property changes.
    Batch,
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PropertyChange => write!(f, "property-change"),
            Self::Batch => write!(f, "batch"),
        }
    }
}

/// One entry of the store's mutation history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationEvent {
    /// ULID of this mutation.
    pub mutation_id: String,
    /// What kind of mutation ran.
    pub kind: MutationKind,
    /// The mutated node (absent for batches).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node_id: Option<NodeId>,
    /// The mutated property key (absent for batches).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub property_key: Option<String>,
    /// Wall-clock milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Elapsed milliseconds.
    pub duration_ms: u64,
    /// Hash of the canonical pre-mutation bytes.
    pub document_hash: DocumentHash,
}

/// Events emitted synchronously with the operation that caused them.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum StoreEvent {
    /// A document replaced the current one.
    #[serde(rename_all = "camelCase")]
    DocumentLoaded {
        /// Id of the loaded document.
        doc_id: DocumentId,
        /// Entity count (artboards and nodes).
        node_count: usize,
    },
    /// A mutation was applied.
    #[serde(rename_all = "camelCase")]
    MutationApplied {
        /// ULID of the mutation.
        mutation_id: String,
        /// Kind of the mutation.
        kind: MutationKind,
        /// The mutated node (absent for batches).
        node_id: Option<NodeId>,
        /// Elapsed milliseconds.
        duration_ms: u64,
        /// Hash of the canonical pre-mutation bytes.
        document_hash: DocumentHash,
    },
    /// The canonical bytes were written to the persistence path.
    #[serde(rename_all = "camelCase")]
    DocumentSaved {
        /// Where the bytes were written.
        path: PathBuf,
        /// Entity count (artboards and nodes).
        node_count: usize,
    },
    /// An undo restored a snapshot.
    #[serde(rename_all = "camelCase")]
    Undo {
        /// Id of the restored snapshot.
        snapshot_id: String,
    },
    /// A redo restored a snapshot.
    #[serde(rename_all = "camelCase")]
    Redo {
        /// Id of the restored snapshot.
        snapshot_id: String,
    },
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A failed store operation. The store's state is unchanged when this fires.
#[derive(Debug)]
pub enum StoreError {
    /// Every mutation before `load` fails with this.
    NoDocumentLoaded,
    /// The node id does not resolve in the current document.
    NodeNotFound {
        /// The id that failed to resolve.
        id: NodeId,
    },
    /// The patch engine rejected the mutation.
    PatchFailed {
        /// The inner patch failure.
        error: PatchError,
    },
    /// A batch failed; the document is as it was before index 0.
    BatchFailed {
        /// Index of the offending mutation.
        index: usize,
        /// The failure at that index.
        error: Box<StoreError>,
    },
    /// The document offered to `load` failed validation.
    InvalidDocument {
        /// The first violation.
        error: ValidationError,
    },
    /// `save` was called with no persistence path configured.
    NoPersistencePath,
    /// An I/O failure while saving.
    Io {
        /// The target path.
        path: PathBuf,
        /// The underlying error.
        error: std::io::Error,
    },
}

impl StoreError {
    /// Stable tag UIs can key translations off.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NoDocumentLoaded => "no-document-loaded",
            Self::NodeNotFound { .. } => "node-not-found",
            Self::PatchFailed { .. } => "patch-failed",
            Self::BatchFailed { .. } => "batch-failed",
            Self::InvalidDocument { .. } => "invalid-document",
            Self::NoPersistencePath => "no-persistence-path",
            Self::Io { .. } => "io",
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoDocumentLoaded => {
                write!(f, "no document is loaded; call load() before mutating")
            }
            Self::NodeNotFound { id } => write!(f, "node '{id}' not found in the current document"),
            Self::PatchFailed { error } => write!(f, "patch failed: {error}"),
            Self::BatchFailed { index, error } => {
                write!(f, "batch failed at index {index}: {error}")
            }
            Self::InvalidDocument { error } => write!(f, "document failed validation: {error}"),
            Self::NoPersistencePath => {
                write!(f, "no persistence path configured; pass one to load() or StoreConfig")
            }
            Self::Io { path, error } => {
                write!(f, "I/O error writing {}: {error}", path.display())
            }
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PatchFailed { error } => Some(error),
            Self::BatchFailed { error, .. } => Some(error),
            Self::InvalidDocument { error } => Some(error),
            Self::Io { error, .. } => Some(error),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// PropertyChange / Snapshot
// ---------------------------------------------------------------------------

/// One requested property mutation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyChange {
    /// The node to mutate.
    pub node_id: NodeId,
    /// Property key relative to the node (`visible`, `frame/x`, `text`).
    pub property_key: String,
    /// The replacement value.
    pub new_value: Value,
    /// The caller's view of the prior value; recorded, not enforced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<Value>,
}

/// A deep-copied document retained for undo/redo. Immutable from the moment
/// it is pushed until it is popped.
#[derive(Clone, Debug)]
struct Snapshot {
    snapshot_id: String,
    mutation_id: String,
    document: Document,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

fn ulid() -> String {
    ::ulid::Ulid::new().to_string()
}

// ---------------------------------------------------------------------------
// DocumentStore
// ---------------------------------------------------------------------------

type Listener = Box<dyn Fn(&StoreEvent)>;

/// Owns exactly one current document and its mutation machinery.
///
/// State machine: `Empty → Loaded → Loaded' → … → Empty` (on unload).
/// Nothing here is fatal to the store; failed operations leave its state
/// untouched and the caller decides whether to retry.
#[derive(Default)]
pub struct DocumentStore {
    config: StoreConfig,
    current: Option<Document>,
    persistence_path: Option<PathBuf>,
    index: Option<DocumentIndex>,
    undo: VecDeque<Snapshot>,
    redo: Vec<Snapshot>,
    history: Vec<MutationEvent>,
    listeners: Vec<Listener>,
}

impl DocumentStore {
    /// Create an empty store.
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            persistence_path: config.persistence_path.clone(),
            config,
            ..Self::default()
        }
    }

    /// Register a synchronous event listener. Delivery order follows
    /// registration order.
    pub fn subscribe(&mut self, listener: impl Fn(&StoreEvent) + 'static) {
        self.listeners.push(Box::new(listener));
    }

    fn emit(&self, event: &StoreEvent) {
        for listener in &self.listeners {
            listener(event);
        }
    }

    /// The current document, if loaded.
    #[must_use]
    pub const fn current(&self) -> Option<&Document> {
        self.current.as_ref()
    }

    /// `true` once a document has been loaded.
    #[must_use]
    pub const fn is_loaded(&self) -> bool {
        self.current.is_some()
    }

    /// Recorded mutation events, oldest first.
    #[must_use]
    pub fn history(&self) -> &[MutationEvent] {
        &self.history
    }

    /// Undo stack depth.
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo.len()
    }

    /// Redo stack depth.
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo.len()
    }

    fn entity_count(doc: &Document) -> usize {
        crate::index::iter(doc).count()
    }

    // -----------------------------------------------------------------------
    // load / unload
    // -----------------------------------------------------------------------

    /// Replace the current document, clearing history and undo/redo.
    ///
    /// # Errors
    /// Rejects documents that fail validation; the prior state is kept.
    pub fn load(&mut self, doc: Document, path: Option<PathBuf>) -> Result<(), StoreError> {
        if let Err(errors) = validate::validate(&doc) {
            return Err(StoreError::InvalidDocument {
                error: errors.into_iter().next().unwrap_or_else(|| {
                    ValidationError::new(
                        crate::model::types::ValidationErrorKind::InvalidValue,
                        "",
                        "unknown validation failure",
                    )
                }),
            });
        }
        let doc_id = doc.id.clone();
        let node_count = Self::entity_count(&doc);
        self.current = Some(doc);
        self.index = None;
        self.undo.clear();
        self.redo.clear();
        self.history.clear();
        if path.is_some() {
            self.persistence_path = path;
        }
        tracing::debug!(%doc_id, node_count, "document loaded");
        self.emit(&StoreEvent::DocumentLoaded { doc_id, node_count });
        Ok(())
    }

    /// Drop the current document and all history (terminal `Empty` state).
    pub fn unload(&mut self) {
        self.current = None;
        self.index = None;
        self.undo.clear();
        self.redo.clear();
        self.history.clear();
    }

    // -----------------------------------------------------------------------
    // Lookup
    // -----------------------------------------------------------------------

    fn ensure_index(&mut self) {
        if self.index.is_none()
            && let Some(doc) = &self.current
        {
            self.index = Some(DocumentIndex::build(doc));
        }
    }

    /// O(1) node lookup through the store's lazily-built index.
    pub fn find_node(&mut self, id: &NodeId) -> Option<FoundNode<'_>> {
        self.ensure_index();
        let doc = self.current.as_ref()?;
        self.index.as_ref()?.find(doc, id)
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    fn resolve_property_pointer(
        &mut self,
        change: &PropertyChange,
    ) -> Result<Pointer, StoreError> {
        self.ensure_index();
        let entry = self
            .index
            .as_ref()
            .and_then(|index| index.get(&change.node_id))
            .ok_or_else(|| StoreError::NodeNotFound {
                id: change.node_id.clone(),
            })?;
        let suffix = Pointer::parse_suffix(&change.property_key).map_err(|e| {
            StoreError::PatchFailed {
                error: PatchError {
                    kind: crate::model::patch::PatchErrorKind::PathNotFound,
                    path: change.property_key.clone(),
                    message: e.reason,
                },
            }
        })?;
        Ok(entry.path.pointer().append(&suffix))
    }

    /// Apply one property change as a `replace` patch at the node's
    /// resolved path.
    ///
    /// # Errors
    /// `no-document-loaded`, `node-not-found`, or `patch-failed`; the
    /// document is unchanged on failure.
    pub fn apply_property_change(
        &mut self,
        change: &PropertyChange,
    ) -> Result<MutationEvent, StoreError> {
        let started = Instant::now();
        if self.current.is_none() {
            return Err(StoreError::NoDocumentLoaded);
        }
        let pointer = self.resolve_property_pointer(change)?;
        let doc = self.current.as_ref().ok_or(StoreError::NoDocumentLoaded)?;

        let patch = Patch::Replace {
            path: pointer,
            value: change.new_value.clone(),
        };
        let new_doc =
            patch::apply(doc, &patch).map_err(|error| StoreError::PatchFailed { error })?;

        let event = self.commit(
            new_doc,
            MutationKind::PropertyChange,
            Some(change.node_id.clone()),
            Some(change.property_key.clone()),
            started,
        );
        Ok(event)
    }

    /// Apply a batch of property changes atomically: on the first failure
    /// the document is unchanged and the offending index is reported.
    ///
    /// # Errors
    /// `batch-failed` wrapping the failure at the offending index.
    pub fn apply_batch(
        &mut self,
        changes: &[PropertyChange],
    ) -> Result<MutationEvent, StoreError> {
        let started = Instant::now();
        if self.current.is_none() {
            return Err(StoreError::NoDocumentLoaded);
        }

        // Fold over a working copy; the store is untouched until every
        // change has applied.
        let mut working = self
            .current
            .clone()
            .ok_or(StoreError::NoDocumentLoaded)?;
        let mut working_index = DocumentIndex::build(&working);
        for (i, change) in changes.iter().enumerate() {
            let result = Self::apply_to(&working, &working_index, change);
            match result {
                Ok(next) => {
                    working_index = DocumentIndex::build(&next);
                    working = next;
                }
                Err(error) => {
                    return Err(StoreError::BatchFailed {
                        index: i,
                        error: Box::new(error),
                    });
                }
            }
        }

        let event = self.commit(working, MutationKind::Batch, None, None, started);
        Ok(event)
    }

    fn apply_to(
        doc: &Document,
        index: &DocumentIndex,
        change: &PropertyChange,
    ) -> Result<Document, StoreError> {
        let entry = index
            .get(&change.node_id)
            .ok_or_else(|| StoreError::NodeNotFound {
                id: change.node_id.clone(),
            })?;
        let suffix = Pointer::parse_suffix(&change.property_key).map_err(|e| {
            StoreError::PatchFailed {
                error: PatchError {
                    kind: crate::model::patch::PatchErrorKind::PathNotFound,
                    path: change.property_key.clone(),
                    message: e.reason,
                },
            }
        })?;
        let patch = Patch::Replace {
            path: entry.path.pointer().append(&suffix),
            value: change.new_value.clone(),
        };
        patch::apply(doc, &patch).map_err(|error| StoreError::PatchFailed { error })
    }

    /// Swap in the mutated document, push the prior state onto the undo
    /// stack, record history, and emit the event.
    fn commit(
        &mut self,
        new_doc: Document,
        kind: MutationKind,
        node_id: Option<NodeId>,
        property_key: Option<String>,
        started: Instant,
    ) -> MutationEvent {
        let mutation_id = ulid();
        let prior = self
            .current
            .take()
            .unwrap_or_else(|| Document::new(DocumentId::generate(), String::new()));
        let pre_hash = document_hash(&prior);

        self.undo.push_back(Snapshot {
            snapshot_id: ulid(),
            mutation_id: mutation_id.clone(),
            document: prior,
        });
        while self.undo.len() > self.config.max_undo_depth {
            self.undo.pop_front();
        }
        self.redo.clear();

        self.current = Some(new_doc);
        self.index = None;

        let event = MutationEvent {
            mutation_id: mutation_id.clone(),
            kind,
            node_id: node_id.clone(),
            property_key,
            timestamp: now_ms(),
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            document_hash: pre_hash.clone(),
        };
        self.history.push(event.clone());
        self.emit(&StoreEvent::MutationApplied {
            mutation_id,
            kind,
            node_id,
            duration_ms: event.duration_ms,
            document_hash: pre_hash,
        });
        event
    }

    // -----------------------------------------------------------------------
    // Undo / redo
    // -----------------------------------------------------------------------

    /// Restore the most recent undo snapshot, moving the current state to
    /// the redo stack. Returns the restored snapshot id, or `None` when
    /// there is nothing to undo.
    pub fn undo(&mut self) -> Option<String> {
        let snapshot = self.undo.pop_back()?;
        let current = self.current.take()?;
        self.redo.push(Snapshot {
            snapshot_id: ulid(),
            mutation_id: snapshot.mutation_id.clone(),
            document: current,
        });
        let snapshot_id = snapshot.snapshot_id.clone();
        self.current = Some(snapshot.document);
        self.index = None;
        self.emit(&StoreEvent::Undo {
            snapshot_id: snapshot_id.clone(),
        });
        Some(snapshot_id)
    }

    /// Re-apply the most recently undone state. Returns the restored
    /// snapshot id, or `None` when there is nothing to redo.
    pub fn redo(&mut self) -> Option<String> {
        let snapshot = self.redo.pop()?;
        let current = self.current.take()?;
        self.undo.push_back(Snapshot {
            snapshot_id: ulid(),
            mutation_id: snapshot.mutation_id.clone(),
            document: current,
        });
        let snapshot_id = snapshot.snapshot_id.clone();
        self.current = Some(snapshot.document);
        self.index = None;
        self.emit(&StoreEvent::Redo {
            snapshot_id: snapshot_id.clone(),
        });
        Some(snapshot_id)
    }

    // -----------------------------------------------------------------------
    // save
    // -----------------------------------------------------------------------

    /// Write the canonical bytes to the persistence path.
    ///
    /// # Errors
    /// `no-document-loaded`, `no-persistence-path`, or `io`.
    pub fn save(&self) -> Result<PathBuf, StoreError> {
        let doc = self.current.as_ref().ok_or(StoreError::NoDocumentLoaded)?;
        let path = self
            .persistence_path
            .clone()
            .ok_or(StoreError::NoPersistencePath)?;
        std::fs::write(&path, canonical_bytes(doc)).map_err(|error| StoreError::Io {
            path: path.clone(),
            error,
        })?;
        let node_count = Self::entity_count(doc);
        tracing::debug!(path = %path.display(), node_count, "document saved");
        self.emit(&StoreEvent::DocumentSaved {
            path: path.clone(),
            node_count,
        });
        Ok(path)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
