//! Effective hierarchy derived from a collection snapshot.
//!
//! Raw parent references go through the resolver, duplicate ids become
//! separate roots and every entity sitting on a reference loop is demoted
//! to root. What remains is acyclic, so every entity has exactly one place
//! in the forest.

use std::collections::{BTreeSet, HashMap};
use std::iter;

use itertools::Itertools;
use tracing::debug;

use crate::domain::cycle::CycleGuard;
use crate::domain::diagnostics::{Diagnostic, DiagnosticKind};
use crate::domain::entities::{EntityCollection, EntityKey};
use crate::domain::resolver::{resolve_parent, ParentRef, UnresolvedReason};

#[derive(Debug, Clone, Default)]
pub(crate) struct Links {
    parent_of: HashMap<EntityKey, EntityKey>,
    children_of: HashMap<EntityKey, Vec<EntityKey>>,
    /// Root keys in input order
    roots: Vec<EntityKey>,
    /// Total descendant count per entity
    counts: HashMap<EntityKey, usize>,
    cycle_members: BTreeSet<EntityKey>,
    /// Entities with at least one diagnostic
    flagged: BTreeSet<EntityKey>,
}

impl Links {
    pub(crate) fn derive(collection: &EntityCollection, diagnostics: &mut Vec<Diagnostic>) -> Self {
        let mut links = Self::default();

        for (key, entity) in collection.iter() {
            if collection.is_duplicate(key) {
                Diagnostic::new(
                    &entity.id,
                    DiagnosticKind::DuplicateId,
                    format!(
                        "id already taken by an earlier entity; occurrence at position {} kept as a separate root",
                        key.position()
                    ),
                )
                .emit(diagnostics);
                links.flagged.insert(key);
                links.roots.push(key);
                continue;
            }

            match resolve_parent(entity, collection) {
                ParentRef::Unresolved(UnresolvedReason::NoParent) => links.roots.push(key),
                ParentRef::Unresolved(reason) => {
                    if let Some(diagnostic) = Diagnostic::for_unresolved(entity, reason) {
                        diagnostic.emit(diagnostics);
                    }
                    links.flagged.insert(key);
                    links.roots.push(key);
                }
                ParentRef::Resolved(parent) => {
                    let walk = CycleGuard::resolved_ancestors(key, collection);
                    if walk.is_on_cycle() {
                        let path = walk
                            .chain
                            .iter()
                            .filter_map(|k| collection.get(*k))
                            .map(|e| e.id.as_str())
                            .join(" -> ");
                        Diagnostic::new(
                            &entity.id,
                            DiagnosticKind::CycleDetected,
                            format!("reporting line loops back through {path}; cycle broken here"),
                        )
                        .emit(diagnostics);
                        links.cycle_members.insert(key);
                        links.flagged.insert(key);
                        links.roots.push(key);
                    } else {
                        links.parent_of.insert(key, parent);
                        links.children_of.entry(parent).or_default().push(key);
                    }
                }
            }
        }

        links.recount();
        links
    }

    /// Recompute every total descendant count with one guarded walk per root.
    fn recount(&mut self) {
        self.counts.clear();
        for root in self.roots.clone() {
            let walk = CycleGuard::walk_descendants(root, |k| self.children(k).to_vec());
            if let Some(revisited) = walk.revisited {
                debug!("recount: revisited {} below root {}", revisited, root);
            }
            self.counts.insert(root, 0);
            for &key in &walk.order {
                self.counts.insert(key, 0);
            }
            // reversed pre-order: every entity comes after all of its descendants
            for &key in walk.order.iter().rev() {
                let weight = self.count(key) + 1;
                if let Some(parent) = self.parent(key) {
                    *self.counts.entry(parent).or_insert(0) += weight;
                }
            }
        }
    }

    pub(crate) fn parent(&self, key: EntityKey) -> Option<EntityKey> {
        self.parent_of.get(&key).copied()
    }

    /// Effective children in insertion order (not sibling order).
    pub(crate) fn children(&self, key: EntityKey) -> &[EntityKey] {
        self.children_of.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub(crate) fn roots(&self) -> &[EntityKey] {
        &self.roots
    }

    pub(crate) fn count(&self, key: EntityKey) -> usize {
        self.counts.get(&key).copied().unwrap_or(0)
    }

    pub(crate) fn is_cycle_member(&self, key: EntityKey) -> bool {
        self.cycle_members.contains(&key)
    }

    pub(crate) fn is_flagged(&self, key: EntityKey) -> bool {
        self.flagged.contains(&key)
    }

    pub(crate) fn set_flagged(&mut self, key: EntityKey, flagged: bool) {
        if flagged {
            self.flagged.insert(key);
        } else {
            self.flagged.remove(&key);
        }
    }

    /// Effective ancestors from the immediate parent upward.
    pub(crate) fn ancestors(&self, key: EntityKey) -> Vec<EntityKey> {
        CycleGuard::walk_ancestors(key, |k| self.parent(k)).chain
    }

    /// Unhook `key` (with its subtree) and subtract its weight along the old path.
    pub(crate) fn detach(&mut self, key: EntityKey) -> Option<EntityKey> {
        let weight = self.count(key) + 1;
        let parent = self.parent_of.remove(&key);
        match parent {
            Some(p) => {
                if let Some(siblings) = self.children_of.get_mut(&p) {
                    siblings.retain(|&c| c != key);
                }
                for ancestor in iter::once(p).chain(self.ancestors(p)) {
                    if let Some(count) = self.counts.get_mut(&ancestor) {
                        *count = count.saturating_sub(weight);
                    }
                }
            }
            None => self.roots.retain(|&r| r != key),
        }
        parent
    }

    /// Hook `key` (with its subtree) under `parent` and add its weight along the new path.
    pub(crate) fn attach(&mut self, key: EntityKey, parent: Option<EntityKey>) {
        let weight = *self.counts.entry(key).or_insert(0) + 1;
        match parent {
            Some(p) => {
                self.parent_of.insert(key, p);
                self.children_of.entry(p).or_default().push(key);
                for ancestor in iter::once(p).chain(self.ancestors(p)) {
                    *self.counts.entry(ancestor).or_insert(0) += weight;
                }
            }
            None => self.roots.push(key),
        }
    }

    /// Drop all bookkeeping for a detached, childless entity.
    pub(crate) fn forget(&mut self, key: EntityKey) {
        self.counts.remove(&key);
        self.children_of.remove(&key);
        self.cycle_members.remove(&key);
        self.flagged.remove(&key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::Entity;

    fn links_for(entities: Vec<Entity>) -> (EntityCollection, Links, Vec<Diagnostic>) {
        let collection = EntityCollection::from_entities(entities);
        let mut diagnostics = Vec::new();
        let links = Links::derive(&collection, &mut diagnostics);
        (collection, links, diagnostics)
    }

    #[test]
    fn given_chain_when_deriving_then_counts_all_descendants() {
        let (c, links, diagnostics) = links_for(vec![
            Entity::new("a"),
            Entity::new("b").with_parent("a"),
            Entity::new("c").with_parent("b"),
        ]);

        assert!(diagnostics.is_empty());
        assert_eq!(links.count(c.key_of("a").unwrap()), 2);
        assert_eq!(links.count(c.key_of("b").unwrap()), 1);
        assert_eq!(links.count(c.key_of("c").unwrap()), 0);
    }

    #[test]
    fn given_tail_into_cycle_when_deriving_then_tail_stays_attached() {
        // a -> b -> c -> a, d -> a
        let (c, links, diagnostics) = links_for(vec![
            Entity::new("a").with_parent("b"),
            Entity::new("b").with_parent("c"),
            Entity::new("c").with_parent("a"),
            Entity::new("d").with_parent("a"),
        ]);

        let a = c.key_of("a").unwrap();
        let d = c.key_of("d").unwrap();
        assert_eq!(links.roots().len(), 3);
        assert_eq!(links.parent(d), Some(a));
        assert_eq!(links.count(a), 1);
        assert_eq!(
            diagnostics
                .iter()
                .filter(|d| d.kind == DiagnosticKind::CycleDetected)
                .count(),
            3
        );
    }

    #[test]
    fn given_subtree_when_moving_then_counts_follow() {
        let (c, mut links, _) = links_for(vec![
            Entity::new("a"),
            Entity::new("b").with_parent("a"),
            Entity::new("c").with_parent("b"),
            Entity::new("x"),
        ]);
        let (a, b, x) = (c.key_of("a").unwrap(), c.key_of("b").unwrap(), c.key_of("x").unwrap());

        links.detach(b);
        links.attach(b, Some(x));

        assert_eq!(links.count(a), 0);
        assert_eq!(links.count(x), 2);
        assert_eq!(links.parent(b), Some(x));
    }
}
