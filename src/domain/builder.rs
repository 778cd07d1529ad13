//! Tree builder: turns a flat entity collection into a rooted forest.

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::{Forest, MaterializationState, NodeId};
use crate::domain::diagnostics::Diagnostic;
use crate::domain::entities::{Entity, EntityCollection, EntityKey};
use crate::domain::links::Links;
use crate::domain::rank::RankClassifier;

/// Nodes shallower than this start expanded in eager mode.
pub const DEFAULT_EXPAND_DEPTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    /// Whole subtree materialized up front
    #[default]
    Eager,
    /// Only roots; children computed when a node is expanded
    Lazy,
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BuildMode::Eager => write!(f, "eager"),
            BuildMode::Lazy => write!(f, "lazy"),
        }
    }
}

/// A best-effort forest paired with everything that was wrong with the input.
#[derive(Debug, Clone)]
pub struct BuildOutput {
    pub forest: Forest,
    pub diagnostics: Vec<Diagnostic>,
}

/// Constructs forests from entity collections.
#[derive(Debug, Clone)]
pub struct TreeBuilder {
    classifier: RankClassifier,
    expand_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self {
            classifier: RankClassifier::default(),
            expand_depth: DEFAULT_EXPAND_DEPTH,
        }
    }

    pub fn with_classifier(mut self, classifier: RankClassifier) -> Self {
        self.classifier = classifier;
        self
    }

    pub fn with_expand_depth(mut self, expand_depth: usize) -> Self {
        self.expand_depth = expand_depth;
        self
    }

    /// Build a forest from an unordered entity collection.
    ///
    /// Never fails: dangling and self references, cycles and duplicate ids
    /// degrade into extra roots and show up in `diagnostics`.
    #[instrument(level = "debug", skip(self, entities), fields(entities = entities.len()))]
    pub fn build(&self, entities: &[Entity], mode: BuildMode) -> BuildOutput {
        self.build_collection(EntityCollection::from_entities(entities.iter().cloned()), mode)
    }

    pub fn build_collection(&self, collection: EntityCollection, mode: BuildMode) -> BuildOutput {
        let forest = assemble(collection, self.classifier.clone(), mode, self.expand_depth);
        let diagnostics = forest.diagnostics.clone();
        debug!(
            "build: {} roots, {} nodes, {} diagnostics",
            forest.roots.len(),
            forest.len(),
            diagnostics.len()
        );
        BuildOutput {
            forest,
            diagnostics,
        }
    }
}

/// Derive the effective hierarchy and materialize it according to `mode`.
pub(crate) fn assemble(
    collection: EntityCollection,
    classifier: RankClassifier,
    mode: BuildMode,
    expand_depth: usize,
) -> Forest {
    let mut diagnostics = Vec::new();
    let links = Links::derive(&collection, &mut diagnostics);
    let mut forest = Forest::empty(collection, links, classifier, mode, expand_depth);
    forest.diagnostics = diagnostics;

    for key in forest.sorted(forest.links.roots()) {
        let root = forest.create_node(key, None, 0);
        forest.roots.push(root);
        if mode == BuildMode::Eager {
            forest.materialize_subtree(root);
        }
    }
    forest
}

impl Forest {
    /// Keys in sibling order.
    pub(crate) fn sorted(&self, keys: &[EntityKey]) -> Vec<EntityKey> {
        keys.iter()
            .copied()
            .sorted_by_cached_key(|&k| self.sibling_key(k))
            .collect()
    }

    /// Materialize the immediate children of `node` and mark it loaded.
    pub(crate) fn materialize_children(&mut self, node: NodeId) -> Vec<NodeId> {
        let Some((key, depth, state)) = self.node(node).map(|n| (n.entity, n.depth, n.state)) else {
            return Vec::new();
        };
        if state == MaterializationState::Loaded {
            return Vec::new();
        }
        let mut created = Vec::new();
        for child_key in self.sorted(self.links.children(key)) {
            if self.node_of.contains_key(&child_key) {
                debug!("materialize: {} already has a node, skipped", child_key);
                continue;
            }
            let child = self.create_node(child_key, Some(node), depth + 1);
            created.push(child);
        }
        if let Some(n) = self.arena.get_mut(node) {
            n.children.extend(created.iter().copied());
            n.state = MaterializationState::Loaded;
        }
        created
    }

    /// Materialize everything below `node`, guarded against revisits.
    pub(crate) fn materialize_subtree(&mut self, node: NodeId) {
        let mut seen = HashSet::new();
        let mut stack = vec![node];
        while let Some(current) = stack.pop() {
            let Some(key) = self.node(current).map(|n| n.entity) else {
                continue;
            };
            if !seen.insert(key) {
                debug!("materialize: revisited {}, not descending", key);
                continue;
            }
            // existing children are kept, missing ones are created
            self.materialize_children(current);
            stack.extend(self.node(current).map(|n| n.children.clone()).unwrap_or_default());
        }
    }
}
