use std::collections::HashMap;

use generational_arena::{Arena, Index};
use serde::Serialize;
use tracing::instrument;

use crate::domain::builder::BuildMode;
use crate::domain::diagnostics::Diagnostic;
use crate::domain::entities::{Entity, EntityCollection, EntityKey};
use crate::domain::links::Links;
use crate::domain::rank::{RankClassifier, SiblingKey};

/// Handle to a node inside one forest.
pub type NodeId = Index;

/// Whether a node's children have been computed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MaterializationState {
    NotLoaded,
    Loading,
    Loaded,
}

/// Tree node in the arena-based forest.
#[derive(Debug, Clone)]
pub struct TreeNode {
    /// Entity this node wraps
    pub entity: EntityKey,
    /// Index of parent node in the arena, None for root nodes
    pub parent: Option<NodeId>,
    /// Child nodes in sibling order
    pub children: Vec<NodeId>,
    /// Root = 0
    pub depth: usize,
    pub total_descendant_count: usize,
    pub direct_reports: usize,
    pub state: MaterializationState,
    pub expanded: bool,
    /// Entity carries at least one diagnostic
    pub flagged: bool,
}

/// Ordered sequence of root nodes plus the snapshot they were built from.
///
/// Each forest owns its own copy of the collection; forests built from the
/// same snapshot share nothing.
#[derive(Debug, Clone)]
pub struct Forest {
    pub(crate) arena: Arena<TreeNode>,
    pub(crate) roots: Vec<NodeId>,
    pub(crate) node_of: HashMap<EntityKey, NodeId>,
    pub(crate) collection: EntityCollection,
    pub(crate) links: Links,
    pub(crate) classifier: RankClassifier,
    pub(crate) mode: BuildMode,
    pub(crate) expand_depth: usize,
    pub(crate) diagnostics: Vec<Diagnostic>,
}

impl Forest {
    pub(crate) fn empty(
        collection: EntityCollection,
        links: Links,
        classifier: RankClassifier,
        mode: BuildMode,
        expand_depth: usize,
    ) -> Self {
        Self {
            arena: Arena::new(),
            roots: Vec::new(),
            node_of: HashMap::new(),
            collection,
            links,
            classifier,
            mode,
            expand_depth,
            diagnostics: Vec::new(),
        }
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.arena.get(id)
    }

    pub fn entity(&self, id: NodeId) -> Option<&Entity> {
        self.node(id).and_then(|n| self.collection.get(n.entity))
    }

    /// Materialized node for the canonical entity with this id.
    pub fn find(&self, entity_id: &str) -> Option<NodeId> {
        self.collection
            .key_of(entity_id)
            .and_then(|key| self.node_of.get(&key).copied())
    }

    pub fn collection(&self) -> &EntityCollection {
        &self.collection
    }

    pub fn classifier(&self) -> &RankClassifier {
        &self.classifier
    }

    pub fn mode(&self) -> BuildMode {
        self.mode
    }

    /// Diagnostics of the last build, kept current by local edits.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Number of materialized nodes.
    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// Pre-order over materialized nodes, roots in order.
    #[instrument(level = "trace", skip(self))]
    pub fn iter(&self) -> TreeIterator<'_> {
        TreeIterator::new(self)
    }

    #[instrument(level = "trace", skip(self))]
    pub fn iter_postorder(&self) -> PostOrderIterator<'_> {
        PostOrderIterator::new(self)
    }

    /// Number of levels in the deepest materialized branch.
    #[instrument(level = "debug", skip(self))]
    pub fn depth(&self) -> usize {
        self.iter().map(|(_, node)| node.depth + 1).max().unwrap_or(0)
    }

    /// Ids of materialized nodes without children, in pre-order.
    #[instrument(level = "debug", skip(self))]
    pub fn leaf_ids(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, node)| node.children.is_empty())
            .filter_map(|(id, _)| self.entity(id).map(|e| e.id.clone()))
            .collect()
    }

    pub(crate) fn sibling_key(&self, key: EntityKey) -> Option<SiblingKey> {
        self.collection
            .get(key)
            .map(|entity| self.classifier.sibling_key(key, entity))
    }

    /// Allocate a `NotLoaded` node for `key`; children are left to the caller.
    pub(crate) fn create_node(&mut self, key: EntityKey, parent: Option<NodeId>, depth: usize) -> NodeId {
        let node = TreeNode {
            entity: key,
            parent,
            children: Vec::new(),
            depth,
            total_descendant_count: self.links.count(key),
            direct_reports: self.links.children(key).len(),
            state: MaterializationState::NotLoaded,
            expanded: self.mode == BuildMode::Eager && depth < self.expand_depth,
            flagged: self.links.is_flagged(key),
        };
        let id = self.arena.insert(node);
        self.node_of.insert(key, id);
        id
    }

    /// Place `child` among its new siblings at its sorted position.
    pub(crate) fn insert_sorted(&mut self, child: NodeId, parent: Option<NodeId>) {
        let Some(key) = self.node(child).and_then(|n| self.sibling_key(n.entity)) else {
            return;
        };
        let siblings = match parent {
            Some(p) => self.arena.get(p).map(|n| n.children.as_slice()).unwrap_or(&[]),
            None => self.roots.as_slice(),
        };
        let position = siblings.partition_point(|&s| {
            self.node(s)
                .and_then(|n| self.sibling_key(n.entity))
                .map(|k| k < key)
                .unwrap_or(true)
        });
        match parent {
            Some(p) => {
                if let Some(node) = self.arena.get_mut(p) {
                    node.children.insert(position, child);
                }
            }
            None => self.roots.insert(position, child),
        }
        if let Some(node) = self.arena.get_mut(child) {
            node.parent = parent;
        }
    }

    /// Take `node` out of its sibling group without freeing it.
    pub(crate) fn unlink(&mut self, node: NodeId) {
        match self.arena.get(node).and_then(|n| n.parent) {
            Some(parent) => {
                if let Some(p) = self.arena.get_mut(parent) {
                    p.children.retain(|&c| c != node);
                }
            }
            None => self.roots.retain(|&r| r != node),
        }
        if let Some(n) = self.arena.get_mut(node) {
            n.parent = None;
        }
    }

    /// Free `node` and everything below it.
    pub(crate) fn drop_subtree(&mut self, node: NodeId) {
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            if let Some(removed) = self.arena.remove(current) {
                self.node_of.remove(&removed.entity);
                stack.extend(removed.children);
            }
        }
    }

    /// Re-derive depth for `node`'s subtree after a move.
    pub(crate) fn set_depth(&mut self, node: NodeId, depth: usize) {
        let mut stack = vec![(node, depth)];
        while let Some((current, d)) = stack.pop() {
            if let Some(n) = self.arena.get_mut(current) {
                n.depth = d;
                stack.extend(n.children.iter().map(|&c| (c, d + 1)));
            }
        }
    }

    /// Copy counts and flags from the effective hierarchy onto materialized nodes.
    pub(crate) fn refresh(&mut self, key: EntityKey) {
        let total = self.links.count(key);
        let direct = self.links.children(key).len();
        let flagged = self.links.is_flagged(key);
        if let Some(node) = self.node_of.get(&key).and_then(|&id| self.arena.get_mut(id)) {
            node.total_descendant_count = total;
            node.direct_reports = direct;
            node.flagged = flagged;
        }
    }

    /// Refresh `key` and every effective ancestor of it.
    pub(crate) fn refresh_path(&mut self, key: Option<EntityKey>) {
        let Some(key) = key else {
            return;
        };
        let path: Vec<EntityKey> = std::iter::once(key).chain(self.links.ancestors(key)).collect();
        for k in path {
            self.refresh(k);
        }
    }
}

pub struct TreeIterator<'a> {
    forest: &'a Forest,
    stack: Vec<NodeId>,
}

impl<'a> TreeIterator<'a> {
    fn new(forest: &'a Forest) -> Self {
        let stack = forest.roots.iter().rev().copied().collect();
        Self { forest, stack }
    }
}

impl<'a> Iterator for TreeIterator<'a> {
    type Item = (NodeId, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some(current) = self.stack.pop() {
            if let Some(node) = self.forest.node(current) {
                // Push children in reverse order for left-to-right traversal
                self.stack.extend(node.children.iter().rev());
                return Some((current, node));
            }
        }
        None
    }
}

pub struct PostOrderIterator<'a> {
    forest: &'a Forest,
    stack: Vec<(NodeId, bool)>,
}

impl<'a> PostOrderIterator<'a> {
    fn new(forest: &'a Forest) -> Self {
        let stack = forest.roots.iter().rev().map(|&r| (r, false)).collect();
        Self { forest, stack }
    }
}

impl<'a> Iterator for PostOrderIterator<'a> {
    type Item = (NodeId, &'a TreeNode);

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((current, visited)) = self.stack.pop() {
            if let Some(node) = self.forest.node(current) {
                if !visited {
                    self.stack.push((current, true));
                    for &child in node.children.iter().rev() {
                        self.stack.push((child, false));
                    }
                } else {
                    return Some((current, node));
                }
            }
        }
        None
    }
}
