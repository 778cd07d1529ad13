//! Cycle guard for ancestor and descendant walks.
//!
//! Every walk owns a fresh visited set, so a cycle in one lineage never
//! blocks an unrelated one. A walk visits each entity at most once and
//! therefore terminates in `O(N)` steps.

use std::collections::HashSet;

use crate::domain::entities::{EntityCollection, EntityKey};
use crate::domain::resolver::resolved_parent_of;

/// Result of walking parent links upward from `start`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AncestorWalk {
    pub start: EntityKey,
    /// Ancestors from the immediate parent upward, `start` excluded
    pub chain: Vec<EntityKey>,
    /// Entity whose revisit stopped the walk
    pub revisited: Option<EntityKey>,
}

impl AncestorWalk {
    pub fn has_cycle(&self) -> bool {
        self.revisited.is_some()
    }

    /// The walk came back to its own start: `start` sits on the loop.
    pub fn is_on_cycle(&self) -> bool {
        self.revisited == Some(self.start)
    }

    pub fn contains(&self, key: EntityKey) -> bool {
        self.chain.contains(&key)
    }
}

/// Result of walking child links downward from a start entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescendantWalk {
    /// Descendants in pre-order, start excluded
    pub order: Vec<EntityKey>,
    pub revisited: Option<EntityKey>,
}

impl DescendantWalk {
    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn has_cycle(&self) -> bool {
        self.revisited.is_some()
    }
}

pub struct CycleGuard;

impl CycleGuard {
    pub fn walk_ancestors<F>(start: EntityKey, mut parent_of: F) -> AncestorWalk
    where
        F: FnMut(EntityKey) -> Option<EntityKey>,
    {
        let mut visited = HashSet::from([start]);
        let mut chain = Vec::new();
        let mut revisited = None;
        let mut current = start;

        while let Some(parent) = parent_of(current) {
            if !visited.insert(parent) {
                revisited = Some(parent);
                break;
            }
            chain.push(parent);
            current = parent;
        }

        AncestorWalk {
            start,
            chain,
            revisited,
        }
    }

    /// Ancestor walk over raw resolved parent references.
    pub fn resolved_ancestors(start: EntityKey, collection: &EntityCollection) -> AncestorWalk {
        Self::walk_ancestors(start, |key| resolved_parent_of(key, collection))
    }

    pub fn has_ancestor_cycle(start: EntityKey, collection: &EntityCollection) -> bool {
        Self::resolved_ancestors(start, collection).has_cycle()
    }

    /// Depth-first walk of `children_of`. A child that was already seen in
    /// this walk is not descended into again.
    pub fn walk_descendants<F, I>(start: EntityKey, mut children_of: F) -> DescendantWalk
    where
        F: FnMut(EntityKey) -> I,
        I: IntoIterator<Item = EntityKey>,
    {
        let mut visited = HashSet::from([start]);
        let mut order = Vec::new();
        let mut revisited = None;
        let mut stack = vec![start];

        while let Some(current) = stack.pop() {
            let children: Vec<EntityKey> = children_of(current).into_iter().collect();
            // reversed so the first child is visited first
            for child in children.into_iter().rev() {
                if !visited.insert(child) {
                    revisited.get_or_insert(child);
                    continue;
                }
                stack.push(child);
            }
            if current != start {
                order.push(current);
            }
        }

        DescendantWalk { order, revisited }
    }
}
