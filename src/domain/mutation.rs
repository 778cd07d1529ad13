//! Mutation applier: in-place edits on a built forest.
//!
//! Edits stay local whenever the effective hierarchy only changes for one
//! entity and its subtree. Anything touching a reference loop or a
//! duplicated id falls back to a full rebuild from the edited snapshot,
//! carrying over which nodes were loaded and expanded.

use std::collections::HashSet;
use std::fmt;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::domain::arena::{Forest, MaterializationState, NodeId};
use crate::domain::builder::{assemble, BuildMode};
use crate::domain::cycle::CycleGuard;
use crate::domain::diagnostics::{Diagnostic, DiagnosticKind};
use crate::domain::entities::{Entity, EntityKey};
use crate::domain::error::{DomainError, RejectReason};
use crate::domain::resolver::{normalize_parent_id, resolve_parent, ParentRef};

/// What happens to the children of a removed entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OrphanPolicy {
    /// Children become roots
    #[default]
    #[serde(rename = "promote")]
    PromoteToRoot,
    /// Children move up to the removed entity's parent (roots if it had none)
    #[serde(rename = "reattach")]
    ReattachToGrandparent,
}

impl fmt::Display for OrphanPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrphanPolicy::PromoteToRoot => write!(f, "promote"),
            OrphanPolicy::ReattachToGrandparent => write!(f, "reattach"),
        }
    }
}

/// How an accepted edit was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationOutcome {
    /// Nothing to do, the forest already reflected the edit
    Unchanged,
    /// Patched in place
    Local,
    /// Re-derived from the edited snapshot
    Rebuilt,
}

impl Forest {
    /// Show the children of `node`, materializing them first if needed.
    pub fn expand(&mut self, node: NodeId) -> Result<(), DomainError> {
        let state = self.node(node).map(|n| n.state).ok_or(DomainError::StaleNode)?;
        if state != MaterializationState::Loaded {
            let created = self.materialize_children(node);
            debug!("expand: materialized {} children", created.len());
        }
        if let Some(n) = self.arena.get_mut(node) {
            n.expanded = true;
        }
        Ok(())
    }

    /// Hide the children of `node`. Loaded children stay cached.
    pub fn collapse(&mut self, node: NodeId) -> Result<(), DomainError> {
        let n = self.arena.get_mut(node).ok_or(DomainError::StaleNode)?;
        n.expanded = false;
        Ok(())
    }

    /// Flip visibility; returns the new `expanded` value.
    pub fn toggle(&mut self, node: NodeId) -> Result<bool, DomainError> {
        let expanded = self.node(node).map(|n| n.expanded).ok_or(DomainError::StaleNode)?;
        if expanded {
            self.collapse(node)?;
        } else {
            self.expand(node)?;
        }
        Ok(!expanded)
    }

    /// Mark a `NotLoaded` node as `Loading` while an external refresh is in
    /// flight. A later `expand` completes the load.
    pub fn begin_loading(&mut self, node: NodeId) -> Result<MaterializationState, DomainError> {
        let n = self.arena.get_mut(node).ok_or(DomainError::StaleNode)?;
        if n.state == MaterializationState::NotLoaded {
            n.state = MaterializationState::Loading;
        }
        Ok(n.state)
    }

    /// Expand every node, materializing the whole forest.
    #[instrument(level = "debug", skip(self))]
    pub fn expand_all(&mut self) {
        let mut stack = self.roots.clone();
        while let Some(node) = stack.pop() {
            if self.expand(node).is_ok() {
                stack.extend(self.node(node).map(|n| n.children.clone()).unwrap_or_default());
            }
        }
    }

    /// Expand the ancestors of `entity_id` so its node exists and is visible.
    pub fn reveal(&mut self, entity_id: &str) -> Result<NodeId, DomainError> {
        let key = self.canonical_key(entity_id)?;
        let path: Vec<EntityKey> = self.links.ancestors(key).into_iter().rev().collect();
        for ancestor in path {
            let node = self.node_of.get(&ancestor).copied().ok_or(DomainError::StaleNode)?;
            self.expand(node)?;
        }
        self.node_of
            .get(&key)
            .copied()
            .ok_or_else(|| DomainError::UnknownEntity(entity_id.to_string()))
    }

    /// Move `entity_id` under `new_parent_id`, or to the roots when `None`.
    ///
    /// The new parent chain is checked before anything changes; a rejected
    /// edit leaves the forest untouched.
    #[instrument(level = "debug", skip(self))]
    pub fn reparent(
        &mut self,
        entity_id: &str,
        new_parent_id: Option<&str>,
    ) -> Result<MutationOutcome, DomainError> {
        let key = self.canonical_key(entity_id)?;
        let new_parent_id = normalize_parent_id(new_parent_id);
        let new_parent = match new_parent_id {
            None => None,
            Some(p) if p == entity_id => {
                return Err(DomainError::RejectedReparent {
                    entity_id: entity_id.to_string(),
                    new_parent_id: p.to_string(),
                    reason: RejectReason::SelfReference,
                })
            }
            Some(p) => Some(self.canonical_key(p)?),
        };

        if let Some(parent) = new_parent {
            let walk = CycleGuard::resolved_ancestors(parent, &self.collection);
            if walk.contains(key) {
                let path = std::iter::once(parent)
                    .chain(walk.chain.iter().copied().take_while_inclusive(|&k| k != key))
                    .filter_map(|k| self.collection.get(k).map(|e| e.id.clone()))
                    .collect();
                return Err(DomainError::RejectedReparent {
                    entity_id: entity_id.to_string(),
                    new_parent_id: new_parent_id.unwrap_or_default().to_string(),
                    reason: RejectReason::WouldCreateCycle { path },
                });
            }
        }

        let current = self
            .collection
            .get(key)
            .and_then(|e| normalize_parent_id(e.parent_id.as_deref()));
        if current == new_parent_id {
            return Ok(MutationOutcome::Unchanged);
        }

        self.collection
            .set_parent(key, new_parent_id.map(String::from));
        if self.links.is_cycle_member(key) {
            debug!("reparent: {} sits on a reference loop, rebuilding", entity_id);
            self.rebuild();
            return Ok(MutationOutcome::Rebuilt);
        }

        self.move_entity(key, new_parent);
        self.clear_reference_diagnostics(key);
        Ok(MutationOutcome::Local)
    }

    /// Insert a new entity, or replace the attributes of an existing one.
    #[instrument(level = "debug", skip(self, entity), fields(id = %entity.id))]
    pub fn upsert_entity(&mut self, entity: Entity) -> Result<MutationOutcome, DomainError> {
        if entity.id.trim().is_empty() {
            return Err(DomainError::InvalidEntity {
                id: entity.id,
                message: "id must not be blank".to_string(),
            });
        }
        match self.collection.key_of(&entity.id) {
            Some(key) => self.update_entity(key, entity),
            None => self.insert_entity(entity),
        }
    }

    /// Remove an entity; its children are handled according to `policy`.
    #[instrument(level = "debug", skip(self))]
    pub fn remove_entity(
        &mut self,
        entity_id: &str,
        policy: OrphanPolicy,
    ) -> Result<MutationOutcome, DomainError> {
        let key = self.canonical_key(entity_id)?;
        let parent = self.links.parent(key);
        let children = self.links.children(key).to_vec();
        let has_successor = self.collection.has_duplicates_of(key);

        let new_parent = match policy {
            OrphanPolicy::PromoteToRoot => None,
            OrphanPolicy::ReattachToGrandparent => parent,
        };
        // a surviving duplicate takes over the id, children follow it
        if !has_successor {
            let new_parent_id = new_parent
                .and_then(|p| self.collection.get(p))
                .map(|e| e.id.clone());
            for &child in &children {
                self.collection.set_parent(child, new_parent_id.clone());
            }
        }

        if has_successor || self.links.is_cycle_member(key) {
            debug!("remove: {} needs a rebuild", entity_id);
            self.collection.remove(key);
            self.rebuild();
            return Ok(MutationOutcome::Rebuilt);
        }

        for &child in &children {
            self.links.detach(child);
        }
        self.links.detach(key);
        self.links.forget(key);
        for &child in &children {
            self.links.attach(child, new_parent);
            self.relocate(child, new_parent);
        }
        if let Some(node) = self.node_of.get(&key).copied() {
            self.unlink(node);
            self.drop_subtree(node);
        }
        self.collection.remove(key);
        self.diagnostics.retain(|d| d.entity_id != entity_id);
        self.refresh_path(parent);
        for &child in &children {
            self.refresh(child);
        }
        Ok(MutationOutcome::Local)
    }

    fn canonical_key(&self, entity_id: &str) -> Result<EntityKey, DomainError> {
        self.collection
            .key_of(entity_id)
            .ok_or_else(|| DomainError::UnknownEntity(entity_id.to_string()))
    }

    fn update_entity(&mut self, key: EntityKey, entity: Entity) -> Result<MutationOutcome, DomainError> {
        let old_parent = self
            .collection
            .get(key)
            .and_then(|e| normalize_parent_id(e.parent_id.as_deref()))
            .map(String::from);
        let new_parent = normalize_parent_id(entity.parent_id.as_deref()).map(String::from);

        let mut outcome = MutationOutcome::Unchanged;
        if old_parent != new_parent {
            let resolvable = match new_parent.as_deref() {
                None => true,
                Some(p) => p != entity.id && self.collection.key_of(p).is_some(),
            };
            if !resolvable {
                debug!("upsert: parent of {} does not resolve, rebuilding", entity.id);
                self.collection.replace(key, entity);
                self.rebuild();
                return Ok(MutationOutcome::Rebuilt);
            }
            outcome = self.reparent(&entity.id, new_parent.as_deref())?;
        }

        let before = self.sibling_key(key);
        let changed = self.collection.get(key) != Some(&entity);
        self.collection.replace(key, entity);
        if before != self.sibling_key(key) {
            self.resort(key);
        }

        Ok(match outcome {
            MutationOutcome::Unchanged if !changed => MutationOutcome::Unchanged,
            MutationOutcome::Rebuilt => MutationOutcome::Rebuilt,
            _ => MutationOutcome::Local,
        })
    }

    fn insert_entity(&mut self, entity: Entity) -> Result<MutationOutcome, DomainError> {
        let waiting = self.collection.referencing(&entity.id);
        let key = self.collection.push(entity);
        if !waiting.is_empty() {
            debug!("upsert: {} existing entities were waiting for this id, rebuilding", waiting.len());
            self.rebuild();
            return Ok(MutationOutcome::Rebuilt);
        }

        let Some(entity) = self.collection.get(key) else {
            return Ok(MutationOutcome::Unchanged);
        };
        let parent_ref = resolve_parent(entity, &self.collection);
        if let ParentRef::Unresolved(reason) = parent_ref {
            if let Some(diagnostic) = Diagnostic::for_unresolved(entity, reason) {
                diagnostic.emit(&mut self.diagnostics);
                self.links.set_flagged(key, true);
            }
        }

        let parent = parent_ref.key();
        self.links.attach(key, parent);
        self.relocate(key, parent);
        self.refresh_path(parent);
        Ok(MutationOutcome::Local)
    }

    /// Effective move of `key` with its subtree; counts follow both paths.
    fn move_entity(&mut self, key: EntityKey, new_parent: Option<EntityKey>) {
        let old_parent = self.links.detach(key);
        self.links.attach(key, new_parent);
        self.relocate(key, new_parent);
        self.refresh_path(old_parent);
        self.refresh_path(new_parent);
        self.refresh(key);
    }

    /// Put the node for `key` where the effective hierarchy says it belongs.
    ///
    /// Under a parent that has not loaded its children the node is dropped;
    /// the next expand of that parent creates it again.
    fn relocate(&mut self, key: EntityKey, new_parent: Option<EntityKey>) {
        let existing = self.node_of.get(&key).copied();
        if let Some(node) = existing {
            self.unlink(node);
        }

        let target = match new_parent {
            None => Some(None),
            Some(parent) => self
                .node_of
                .get(&parent)
                .copied()
                .filter(|&p| {
                    self.node(p)
                        .map(|n| n.state == MaterializationState::Loaded)
                        .unwrap_or(false)
                })
                .map(Some),
        };

        match target {
            None => {
                if let Some(node) = existing {
                    self.drop_subtree(node);
                }
            }
            Some(parent_node) => {
                let depth = parent_node
                    .and_then(|p| self.node(p))
                    .map(|n| n.depth + 1)
                    .unwrap_or(0);
                let node = match existing {
                    Some(node) => {
                        self.set_depth(node, depth);
                        node
                    }
                    None => {
                        let node = self.create_node(key, parent_node, depth);
                        if self.mode == BuildMode::Eager {
                            self.materialize_subtree(node);
                        }
                        node
                    }
                };
                self.insert_sorted(node, parent_node);
            }
        }
    }

    /// Re-place a node whose sibling key changed.
    fn resort(&mut self, key: EntityKey) {
        let Some(node) = self.node_of.get(&key).copied() else {
            return;
        };
        let parent = self.node(node).and_then(|n| n.parent);
        self.unlink(node);
        self.insert_sorted(node, parent);
    }

    /// A successful move resolves any dangling or self reference of `key`.
    fn clear_reference_diagnostics(&mut self, key: EntityKey) {
        let Some(id) = self.collection.get(key).map(|e| e.id.clone()) else {
            return;
        };
        self.diagnostics.retain(|d| {
            d.entity_id != id
                || !matches!(
                    d.kind,
                    DiagnosticKind::DanglingReference | DiagnosticKind::SelfReference
                )
        });
        let still_flagged = self
            .diagnostics
            .iter()
            .any(|d| d.entity_id == id && d.kind != DiagnosticKind::DuplicateId);
        self.links.set_flagged(key, still_flagged);
        self.refresh(key);
    }

    /// Re-derive everything from the current snapshot, keeping per-entity
    /// view state.
    fn rebuild(&mut self) {
        let known: HashSet<EntityKey> = self.node_of.keys().copied().collect();
        let expanded: HashSet<EntityKey> = self
            .arena
            .iter()
            .filter(|(_, n)| n.expanded)
            .map(|(_, n)| n.entity)
            .collect();
        let loaded: HashSet<EntityKey> = self
            .arena
            .iter()
            .filter(|(_, n)| n.state == MaterializationState::Loaded)
            .map(|(_, n)| n.entity)
            .collect();

        let collection = std::mem::take(&mut self.collection);
        let mut rebuilt = assemble(collection, self.classifier.clone(), self.mode, self.expand_depth);

        if rebuilt.mode == BuildMode::Lazy {
            let mut stack = rebuilt.roots.clone();
            while let Some(node) = stack.pop() {
                let Some(key) = rebuilt.node(node).map(|n| n.entity) else {
                    continue;
                };
                if loaded.contains(&key) {
                    rebuilt.materialize_children(node);
                    stack.extend(rebuilt.node(node).map(|n| n.children.clone()).unwrap_or_default());
                }
            }
        }
        for (_, node) in rebuilt.arena.iter_mut() {
            if known.contains(&node.entity) {
                node.expanded = expanded.contains(&node.entity);
            }
        }

        debug!("rebuild: {} nodes, {} diagnostics", rebuilt.len(), rebuilt.diagnostics.len());
        *self = rebuilt;
    }
}
