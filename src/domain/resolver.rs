//! Relationship resolver: validates an entity's parent reference against the collection.

use std::fmt;

use serde::Serialize;

use crate::domain::entities::{Entity, EntityCollection, EntityKey};

/// Why an entity has no effective parent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    NoParent,
    SelfReference,
    DanglingReference,
}

impl fmt::Display for UnresolvedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnresolvedReason::NoParent => write!(f, "no parent"),
            UnresolvedReason::SelfReference => write!(f, "references itself"),
            UnresolvedReason::DanglingReference => write!(f, "parent not in collection"),
        }
    }
}

/// Outcome of resolving a parent reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentRef {
    Resolved(EntityKey),
    Unresolved(UnresolvedReason),
}

impl ParentRef {
    pub fn key(&self) -> Option<EntityKey> {
        match self {
            ParentRef::Resolved(key) => Some(*key),
            ParentRef::Unresolved(_) => None,
        }
    }
}

/// Collapse the "absent / null / empty / blank" spellings of "no parent" into `None`.
pub fn normalize_parent_id(parent_id: Option<&str>) -> Option<&str> {
    parent_id.map(str::trim).filter(|p| !p.is_empty())
}

/// Resolve `entity`'s parent reference.
///
/// Rules apply in order: blank reference, self reference, dangling
/// reference, resolved. Resolution always lands on the canonical (first)
/// occurrence of the parent id.
pub fn resolve_parent(entity: &Entity, collection: &EntityCollection) -> ParentRef {
    let Some(parent_id) = normalize_parent_id(entity.parent_id.as_deref()) else {
        return ParentRef::Unresolved(UnresolvedReason::NoParent);
    };
    if parent_id == entity.id {
        return ParentRef::Unresolved(UnresolvedReason::SelfReference);
    }
    match collection.key_of(parent_id) {
        Some(key) => ParentRef::Resolved(key),
        None => ParentRef::Unresolved(UnresolvedReason::DanglingReference),
    }
}

/// Resolved parent of the entity stored at `key`, if any.
pub fn resolved_parent_of(key: EntityKey, collection: &EntityCollection) -> Option<EntityKey> {
    collection
        .get(key)
        .and_then(|entity| resolve_parent(entity, collection).key())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn collection() -> EntityCollection {
        EntityCollection::from_entities(vec![Entity::new("a"), Entity::new("b").with_parent("a")])
    }

    #[rstest]
    #[case(None)]
    #[case(Some(""))]
    #[case(Some("   "))]
    fn given_blank_parent_when_resolving_then_no_parent(#[case] parent: Option<&str>) {
        let mut entity = Entity::new("c");
        entity.parent_id = parent.map(String::from);

        assert_eq!(
            resolve_parent(&entity, &collection()),
            ParentRef::Unresolved(UnresolvedReason::NoParent)
        );
    }

    #[test]
    fn given_own_id_as_parent_when_resolving_then_self_reference() {
        let entity = Entity::new("a").with_parent("a");
        assert_eq!(
            resolve_parent(&entity, &collection()),
            ParentRef::Unresolved(UnresolvedReason::SelfReference)
        );
    }

    #[test]
    fn given_unknown_parent_when_resolving_then_dangling() {
        let entity = Entity::new("c").with_parent("zz");
        assert_eq!(
            resolve_parent(&entity, &collection()),
            ParentRef::Unresolved(UnresolvedReason::DanglingReference)
        );
    }

    #[test]
    fn given_padded_parent_id_when_resolving_then_trims_before_lookup() {
        let coll = collection();
        let entity = Entity::new("c").with_parent(" b ");
        assert_eq!(
            resolve_parent(&entity, &coll),
            ParentRef::Resolved(coll.key_of("b").unwrap())
        );
    }
}
