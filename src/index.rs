//! Traversal and the node lookup index.
//!
//! Pre-order iteration over a document (each artboard, then its subtree
//! depth-first, left to right), filtered traversal, an id→location index
//! with O(1) lookup, and the typed/name/batch queries built on top.
//!
//! Iteration order is a pure function of document content — never of hash
//! table iteration. The index stores locations ([`NodePath`]), not node
//! copies; entries are valid only for the document instance they were built
//! from and the index is rebuilt (never incrementally maintained) whenever
//! the document is replaced.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::model::document::{Artboard, Document};
use crate::model::node::{Node, NodeType};
use crate::model::types::{NodeId, Rect};
use crate::pointer::Pointer;

// ---------------------------------------------------------------------------
// NodePath
// ---------------------------------------------------------------------------

/// The structural address of an artboard or node: an artboard index plus the
/// chain of child indices below it.
///
/// Ordering is lexicographic over `(artboard, child indices)`, which matches
/// pre-order document position.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodePath {
    artboard: usize,
    children: Vec<usize>,
}

impl NodePath {
    /// The path of artboard `index`.
    #[must_use]
    pub const fn artboard(index: usize) -> Self {
        Self {
            artboard: index,
            children: Vec::new(),
        }
    }

    /// The path of child `index` under this path.
    #[must_use]
    pub fn child(&self, index: usize) -> Self {
        let mut children = self.children.clone();
        children.push(index);
        Self {
            artboard: self.artboard,
            children,
        }
    }

    /// Index of the owning artboard.
    #[must_use]
    pub const fn artboard_index(&self) -> usize {
        self.artboard
    }

    /// Child index chain below the artboard.
    #[must_use]
    pub fn child_indices(&self) -> &[usize] {
        &self.children
    }

    /// Depth below the artboard: `0` for the artboard itself.
    #[must_use]
    pub const fn depth(&self) -> usize {
        self.children.len()
    }

    /// The parent path, or `None` for an artboard path.
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.children.is_empty() {
            return None;
        }
        let mut children = self.children.clone();
        children.pop();
        Some(Self {
            artboard: self.artboard,
            children,
        })
    }

    /// `true` if `self` strictly contains `other`.
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.artboard == other.artboard
            && self.children.len() < other.children.len()
            && other.children[..self.children.len()] == self.children[..]
    }

    /// The JSON pointer addressing this location
    /// (`/artboards/{i}/children/{j}/...`).
    #[must_use]
    pub fn pointer(&self) -> Pointer {
        let mut p = Pointer::root()
            .child("artboards")
            .child(self.artboard.to_string());
        for idx in &self.children {
            p = p.child("children").child(idx.to_string());
        }
        p
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.pointer())
    }
}

// ---------------------------------------------------------------------------
// DocEntity
// ---------------------------------------------------------------------------

/// A borrowed artboard or node — the two entity kinds sharing the id
/// namespace.
#[derive(Clone, Copy, Debug)]
pub enum DocEntity<'doc> {
    /// A top-level artboard.
    Artboard(&'doc Artboard),
    /// A node within an artboard.
    Node(&'doc Node),
}

impl<'doc> DocEntity<'doc> {
    /// The entity's id.
    #[must_use]
    pub const fn id(&self) -> &'doc NodeId {
        match self {
            Self::Artboard(a) => &a.id,
            Self::Node(n) => n.id(),
        }
    }

    /// The entity's human label.
    #[must_use]
    pub fn name(&self) -> &'doc str {
        match self {
            Self::Artboard(a) => &a.name,
            Self::Node(n) => n.name(),
        }
    }

    /// The entity's frame rectangle.
    #[must_use]
    pub const fn frame(&self) -> &'doc Rect {
        match self {
            Self::Artboard(a) => &a.frame,
            Self::Node(n) => &n.header().frame,
        }
    }

    /// Children owned by this entity (artboard roots or frame children).
    #[must_use]
    pub fn child_nodes(&self) -> &'doc [Node] {
        match self {
            Self::Artboard(a) => &a.children,
            Self::Node(n) => n.children(),
        }
    }

    /// The node variant tag; `None` for artboards.
    #[must_use]
    pub const fn node_type(&self) -> Option<NodeType> {
        match self {
            Self::Artboard(_) => None,
            Self::Node(n) => Some(n.node_type()),
        }
    }

    /// The node, if this entity is one.
    #[must_use]
    pub const fn as_node(&self) -> Option<&'doc Node> {
        match self {
            Self::Artboard(_) => None,
            Self::Node(n) => Some(n),
        }
    }
}

/// Resolve a structural path against a document instance.
#[must_use]
pub fn entity_at<'doc>(doc: &'doc Document, path: &NodePath) -> Option<DocEntity<'doc>> {
    let artboard = doc.artboards.get(path.artboard_index())?;
    let mut indices = path.child_indices().iter();
    let Some(&first) = indices.next() else {
        return Some(DocEntity::Artboard(artboard));
    };
    let mut node = artboard.children.get(first)?;
    for &idx in indices {
        node = node.children().get(idx)?;
    }
    Some(DocEntity::Node(node))
}

// ---------------------------------------------------------------------------
// NodeVisit / NodeIter
// ---------------------------------------------------------------------------

/// One step of a pre-order traversal.
#[derive(Clone, Debug)]
pub struct NodeVisit<'doc> {
    /// The visited entity.
    pub entity: DocEntity<'doc>,
    /// Structural address of the entity.
    pub path: NodePath,
    /// Index of the owning artboard.
    pub artboard_index: usize,
    /// Depth below the artboard (`0` for the artboard itself).
    pub depth: usize,
}

/// Lazy pre-order iterator over every artboard and node.
pub struct NodeIter<'doc> {
    doc: &'doc Document,
    next_artboard: usize,
    stack: Vec<(&'doc Node, NodePath)>,
}

impl<'doc> Iterator for NodeIter<'doc> {
    type Item = NodeVisit<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((node, path)) = self.stack.pop() {
            for (i, child) in node.children().iter().enumerate().rev() {
                self.stack.push((child, path.child(i)));
            }
            let depth = path.depth();
            let artboard_index = path.artboard_index();
            return Some(NodeVisit {
                entity: DocEntity::Node(node),
                path,
                artboard_index,
                depth,
            });
        }
        let artboard = self.doc.artboards.get(self.next_artboard)?;
        let path = NodePath::artboard(self.next_artboard);
        for (i, child) in artboard.children.iter().enumerate().rev() {
            self.stack.push((child, path.child(i)));
        }
        self.next_artboard += 1;
        let artboard_index = path.artboard_index();
        Some(NodeVisit {
            entity: DocEntity::Artboard(artboard),
            path,
            artboard_index,
            depth: 0,
        })
    }
}

/// Iterate every artboard and node in pre-order.
#[must_use]
pub fn iter(doc: &Document) -> NodeIter<'_> {
    NodeIter {
        doc,
        next_artboard: 0,
        stack: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// Filtered traversal
// ---------------------------------------------------------------------------

/// Options for [`iter_filtered`].
///
/// `max_depth` and `include_invisible: false` prune whole subtrees; the
/// `predicate` filters emitted node visits without pruning descent.
pub struct TraverseOptions<'p> {
    /// Deepest visit to emit (`0` = artboards only). `None` = unbounded.
    pub max_depth: Option<usize>,
    /// When `false`, invisible nodes and their subtrees are skipped.
    pub include_invisible: bool,
    /// Restrict the walk to a single artboard.
    pub artboard_index: Option<usize>,
    /// Emit only nodes matching this predicate (artboards always pass).
    pub predicate: Option<Box<dyn Fn(&Node) -> bool + 'p>>,
}

impl Default for TraverseOptions<'_> {
    fn default() -> Self {
        Self::all()
    }
}

impl<'p> TraverseOptions<'p> {
    /// Options that visit everything (equivalent to [`iter`]).
    #[must_use]
    pub fn all() -> Self {
        Self {
            max_depth: None,
            include_invisible: true,
            artboard_index: None,
            predicate: None,
        }
    }

    /// Restrict to visible nodes.
    #[must_use]
    pub fn visible_only(mut self) -> Self {
        self.include_invisible = false;
        self
    }

    /// Restrict emitted depth.
    #[must_use]
    pub fn with_max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Restrict to one artboard.
    #[must_use]
    pub fn with_artboard(mut self, index: usize) -> Self {
        self.artboard_index = Some(index);
        self
    }

    /// Emit only nodes matching `f`.
    #[must_use]
    pub fn with_predicate(mut self, f: impl Fn(&Node) -> bool + 'p) -> Self {
        self.predicate = Some(Box::new(f));
        self
    }
}

/// Filtered pre-order iterator; see [`TraverseOptions`].
pub struct FilteredIter<'doc, 'p> {
    doc: &'doc Document,
    options: TraverseOptions<'p>,
    next_artboard: usize,
    stack: Vec<(&'doc Node, NodePath)>,
}

impl<'doc> FilteredIter<'doc, '_> {
    fn descend(&mut self, children: &'doc [Node], parent: &NodePath) {
        let child_depth = parent.depth() + 1;
        if self.options.max_depth.is_some_and(|max| child_depth > max) {
            return;
        }
        for (i, child) in children.iter().enumerate().rev() {
            if !self.options.include_invisible && !child.is_visible() {
                continue;
            }
            self.stack.push((child, parent.child(i)));
        }
    }
}

impl<'doc> Iterator for FilteredIter<'doc, '_> {
    type Item = NodeVisit<'doc>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some((node, path)) = self.stack.pop() {
                self.descend(node.children(), &path);
                if let Some(pred) = &self.options.predicate
                    && !pred(node)
                {
                    continue;
                }
                let depth = path.depth();
                let artboard_index = path.artboard_index();
                return Some(NodeVisit {
                    entity: DocEntity::Node(node),
                    path,
                    artboard_index,
                    depth,
                });
            }
            let index = self.next_artboard;
            let artboard = self.doc.artboards.get(index)?;
            self.next_artboard += 1;
            if self.options.artboard_index.is_some_and(|only| only != index) {
                continue;
            }
            let path = NodePath::artboard(index);
            self.descend(&artboard.children, &path);
            return Some(NodeVisit {
                entity: DocEntity::Artboard(artboard),
                path,
                artboard_index: index,
                depth: 0,
            });
        }
    }
}

/// Iterate with filtering options; see [`TraverseOptions`].
#[must_use]
pub fn iter_filtered<'doc, 'p>(
    doc: &'doc Document,
    options: TraverseOptions<'p>,
) -> FilteredIter<'doc, 'p> {
    FilteredIter {
        doc,
        options,
        next_artboard: 0,
        stack: Vec::new(),
    }
}

// ---------------------------------------------------------------------------
// DocumentIndex
// ---------------------------------------------------------------------------

/// A resolved lookup result carrying the entity and its placement.
#[derive(Clone, Debug)]
pub struct FoundNode<'doc> {
    /// The found artboard or node.
    pub entity: DocEntity<'doc>,
    /// Id of the owning artboard (the entity's own id for artboards).
    pub artboard_id: NodeId,
    /// Parent entity id; `None` for artboards.
    pub parent_id: Option<NodeId>,
    /// Depth below the artboard.
    pub depth: usize,
    /// Structural address.
    pub path: NodePath,
}

/// One entry of the [`DocumentIndex`]: a location, not a copy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Structural address of the entity.
    pub path: NodePath,
    /// Id of the owning artboard.
    pub artboard_id: NodeId,
    /// Parent entity id; `None` for artboards.
    pub parent_id: Option<NodeId>,
    /// Depth below the artboard.
    pub depth: usize,
}

/// An id → location side-table over one document instance.
///
/// Build cost is O(N); lookups are O(1) amortized (ordered-map depth aside).
/// Entries are valid only for the exact document the index was built from.
#[derive(Clone, Debug, Default)]
pub struct DocumentIndex {
    entries: BTreeMap<NodeId, IndexEntry>,
}

impl DocumentIndex {
    /// Build the index with a single traversal.
    #[must_use]
    pub fn build(doc: &Document) -> Self {
        let mut entries = BTreeMap::new();
        for (ai, artboard) in doc.artboards.iter().enumerate() {
            let path = NodePath::artboard(ai);
            entries.insert(
                artboard.id.clone(),
                IndexEntry {
                    path: path.clone(),
                    artboard_id: artboard.id.clone(),
                    parent_id: None,
                    depth: 0,
                },
            );
            for (ci, child) in artboard.children.iter().enumerate() {
                index_node(child, path.child(ci), &artboard.id, &artboard.id, &mut entries);
            }
        }
        Self { entries }
    }

    /// Look up an entry by id.
    #[must_use]
    pub fn get(&self, id: &NodeId) -> Option<&IndexEntry> {
        self.entries.get(id)
    }

    /// Resolve an id to its entity against the owning document.
    #[must_use]
    pub fn find<'doc>(&self, doc: &'doc Document, id: &NodeId) -> Option<FoundNode<'doc>> {
        let entry = self.entries.get(id)?;
        let entity = entity_at(doc, &entry.path)?;
        Some(FoundNode {
            entity,
            artboard_id: entry.artboard_id.clone(),
            parent_id: entry.parent_id.clone(),
            depth: entry.depth,
            path: entry.path.clone(),
        })
    }

    /// Number of indexed entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no entities are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn index_node(
    node: &Node,
    path: NodePath,
    artboard_id: &NodeId,
    parent_id: &NodeId,
    entries: &mut BTreeMap<NodeId, IndexEntry>,
) {
    let depth = path.depth();
    entries.insert(
        node.id().clone(),
        IndexEntry {
            path: path.clone(),
            artboard_id: artboard_id.clone(),
            parent_id: Some(parent_id.clone()),
            depth,
        },
    );
    for (ci, child) in node.children().iter().enumerate() {
        index_node(child, path.child(ci), artboard_id, node.id(), entries);
    }
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// Find an entity by id with a single traversal.
///
/// Absence is not an error; the result is `None`.
#[must_use]
pub fn find_by_id<'doc>(doc: &'doc Document, id: &NodeId) -> Option<FoundNode<'doc>> {
    let mut found = find_by_ids(doc, std::slice::from_ref(id));
    found.remove(id)
}

/// Batch lookup: a single traversal with early termination once every target
/// id has been found — O(N) in the document, not O(N·ids).
#[must_use]
pub fn find_by_ids<'doc>(
    doc: &'doc Document,
    ids: &[NodeId],
) -> BTreeMap<NodeId, FoundNode<'doc>> {
    let mut wanted: BTreeSet<&NodeId> = ids.iter().collect();
    let mut found = BTreeMap::new();
    if wanted.is_empty() {
        return found;
    }
    // Parent ids per depth level, maintained alongside the walk.
    let mut parents: Vec<NodeId> = Vec::new();
    for visit in iter(doc) {
        parents.truncate(visit.depth);
        let parent_id = parents.last().cloned();
        let artboard_id = doc.artboards[visit.artboard_index].id.clone();
        if wanted.remove(visit.entity.id()) {
            found.insert(
                visit.entity.id().clone(),
                FoundNode {
                    entity: visit.entity,
                    artboard_id,
                    parent_id: if visit.depth == 0 { None } else { parent_id },
                    depth: visit.depth,
                    path: visit.path.clone(),
                },
            );
            if wanted.is_empty() {
                break;
            }
        }
        parents.push(visit.entity.id().clone());
    }
    found
}

/// All nodes of the given variant, in pre-order.
#[must_use]
pub fn find_by_type<'doc>(doc: &'doc Document, node_type: NodeType) -> Vec<NodeVisit<'doc>> {
    iter(doc)
        .filter(|v| v.entity.node_type() == Some(node_type))
        .collect()
}

/// All entities whose name matches the regex, in pre-order. Artboards are
/// included — they carry names too.
#[must_use]
pub fn find_by_name<'doc>(doc: &'doc Document, pattern: &Regex) -> Vec<NodeVisit<'doc>> {
    iter(doc)
        .filter(|v| pattern.is_match(v.entity.name()))
        .collect()
}

/// Ancestors of the entity at `path`, nearest first, ending at the artboard.
/// Empty for artboard paths and unresolvable paths.
#[must_use]
pub fn ancestors<'doc>(doc: &'doc Document, path: &NodePath) -> Vec<DocEntity<'doc>> {
    let mut out = Vec::new();
    let mut cursor = path.parent();
    while let Some(p) = cursor {
        match entity_at(doc, &p) {
            Some(entity) => out.push(entity),
            None => return Vec::new(),
        }
        cursor = p.parent();
    }
    out
}

/// Strict descendants of the entity at `path`, in pre-order.
#[must_use]
pub fn descendants<'doc>(doc: &'doc Document, path: &NodePath) -> Vec<NodeVisit<'doc>> {
    let Some(root) = entity_at(doc, path) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    let mut stack: Vec<(&Node, NodePath)> = root
        .child_nodes()
        .iter()
        .enumerate()
        .rev()
        .map(|(i, n)| (n, path.child(i)))
        .collect();
    while let Some((node, node_path)) = stack.pop() {
        for (i, child) in node.children().iter().enumerate().rev() {
            stack.push((child, node_path.child(i)));
        }
        let depth = node_path.depth();
        let artboard_index = node_path.artboard_index();
        out.push(NodeVisit {
            entity: DocEntity::Node(node),
            path: node_path,
            artboard_index,
            depth,
        });
    }
    out
}

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Aggregate counts over a document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStats {
    /// Node entities (artboards excluded).
    pub total_nodes: usize,
    /// Artboard count.
    pub artboard_count: usize,
    /// Deepest node depth (artboards are depth 0).
    pub max_depth: usize,
    /// Node counts per variant; sums to `total_nodes`.
    pub counts_by_type: BTreeMap<NodeType, usize>,
}

/// Count node entities (artboards excluded).
#[must_use]
pub fn count_nodes(doc: &Document) -> usize {
    iter(doc).filter(|v| v.entity.as_node().is_some()).count()
}

/// Compute aggregate statistics in a single traversal.
#[must_use]
pub fn stats(doc: &Document) -> DocumentStats {
    let mut out = DocumentStats {
        artboard_count: doc.artboards.len(),
        ..DocumentStats::default()
    };
    for visit in iter(doc) {
        if let Some(node_type) = visit.entity.node_type() {
            out.total_nodes += 1;
            *out.counts_by_type.entry(node_type).or_insert(0) += 1;
            out.max_depth = out.max_depth.max(visit.depth);
        }
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
