//! Domain entities: raw input records and the collection snapshot they live in

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

/// Flat input record with an optional reference to its parent.
///
/// Field aliases accept the shapes HR data usually arrives in
/// (`reporting_to`, `manager_id`, `position`, ...). Everything not
/// recognized is kept in `payload` and never looked at by the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Stable identifier, unique within a snapshot
    #[serde(deserialize_with = "scalar_id")]
    pub id: String,
    /// Id of the parent entity; absent, null, empty or blank means "no parent"
    #[serde(
        default,
        alias = "parentId",
        alias = "reporting_to",
        alias = "manager_id",
        deserialize_with = "optional_scalar_id",
        skip_serializing_if = "Option::is_none"
    )]
    pub parent_id: Option<String>,
    /// Display name, secondary sibling ordering key
    #[serde(default)]
    pub name: String,
    /// Free-text role or title, only used for sibling ordering
    #[serde(
        default,
        alias = "position",
        alias = "title",
        alias = "designation"
    )]
    pub rank_hint: String,
    /// Opaque fields carried along for the presentation layer
    #[serde(flatten)]
    pub payload: BTreeMap<String, serde_json::Value>,
}

/// Ids arrive as strings or numbers depending on the exporter.
#[derive(Deserialize)]
#[serde(untagged)]
enum ScalarId {
    Text(String),
    Signed(i64),
    Unsigned(u64),
}

impl From<ScalarId> for String {
    fn from(id: ScalarId) -> Self {
        match id {
            ScalarId::Text(s) => s,
            ScalarId::Signed(n) => n.to_string(),
            ScalarId::Unsigned(n) => n.to_string(),
        }
    }
}

fn scalar_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    ScalarId::deserialize(deserializer).map(String::from)
}

fn optional_scalar_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<String>, D::Error> {
    Option::<ScalarId>::deserialize(deserializer).map(|id| id.map(String::from))
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent_id: None,
            name: String::new(),
            rank_hint: String::new(),
            payload: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_rank_hint(mut self, rank_hint: impl Into<String>) -> Self {
        self.rank_hint = rank_hint.into();
        self
    }

    /// Name to show and sort by; falls back to the id for nameless records.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.display_name(), self.id)
    }
}

/// Position of an entity inside an [`EntityCollection`].
///
/// Keys follow input order and stay valid across local edits: removed
/// entities leave a tombstone instead of shifting later slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityKey(pub(crate) usize);

impl EntityKey {
    pub fn position(&self) -> usize {
        self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Snapshot of the flat entity collection a forest is built from.
#[derive(Debug, Clone, Default)]
pub struct EntityCollection {
    slots: Vec<Option<Entity>>,
    /// First live occurrence of each id
    by_id: HashMap<String, EntityKey>,
    /// Later occurrences of an id that is already taken
    duplicates: BTreeSet<EntityKey>,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut collection = Self::new();
        for entity in entities {
            collection.push(entity);
        }
        collection
    }

    /// Number of live entities, duplicates included.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, key: EntityKey) -> Option<&Entity> {
        self.slots.get(key.0).and_then(Option::as_ref)
    }

    /// Canonical key for an id (first occurrence wins).
    pub fn key_of(&self, id: &str) -> Option<EntityKey> {
        self.by_id.get(id).copied()
    }

    pub fn find(&self, id: &str) -> Option<&Entity> {
        self.key_of(id).and_then(|key| self.get(key))
    }

    pub fn is_duplicate(&self, key: EntityKey) -> bool {
        self.duplicates.contains(&key)
    }

    /// Live entries in input order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityKey, &Entity)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|e| (EntityKey(i), e)))
    }

    pub fn keys(&self) -> impl Iterator<Item = EntityKey> + '_ {
        self.iter().map(|(key, _)| key)
    }

    /// Clones of the live entities in input order.
    pub fn entities(&self) -> Vec<Entity> {
        self.iter().map(|(_, e)| e.clone()).collect()
    }

    /// Live entities whose raw `parent_id` points at `id`.
    pub fn referencing(&self, id: &str) -> Vec<EntityKey> {
        self.iter()
            .filter(|(_, e)| e.parent_id.as_deref().map(str::trim) == Some(id))
            .map(|(key, _)| key)
            .collect()
    }

    /// Whether another live entity shares the id stored at `key`.
    pub fn has_duplicates_of(&self, key: EntityKey) -> bool {
        let Some(entity) = self.get(key) else {
            return false;
        };
        self.iter()
            .any(|(other, e)| other != key && e.id == entity.id)
    }

    pub(crate) fn push(&mut self, entity: Entity) -> EntityKey {
        let key = EntityKey(self.slots.len());
        if self.by_id.contains_key(&entity.id) {
            self.duplicates.insert(key);
        } else {
            self.by_id.insert(entity.id.clone(), key);
        }
        self.slots.push(Some(entity));
        key
    }

    pub(crate) fn set_parent(&mut self, key: EntityKey, parent_id: Option<String>) {
        if let Some(Some(entity)) = self.slots.get_mut(key.0) {
            entity.parent_id = parent_id;
        }
    }

    /// Replace the record at `key`; the id must stay the same.
    pub(crate) fn replace(&mut self, key: EntityKey, entity: Entity) {
        if let Some(slot) = self.slots.get_mut(key.0) {
            if slot.as_ref().map(|e| e.id == entity.id).unwrap_or(false) {
                *slot = Some(entity);
            }
        }
    }

    /// Tombstone the slot; the next live duplicate of the id becomes canonical.
    pub(crate) fn remove(&mut self, key: EntityKey) -> Option<Entity> {
        let entity = self.slots.get_mut(key.0)?.take()?;
        self.duplicates.remove(&key);
        if self.by_id.get(&entity.id) == Some(&key) {
            self.by_id.remove(&entity.id);
            let successor = self
                .iter()
                .find(|(_, e)| e.id == entity.id)
                .map(|(k, _)| k);
            if let Some(successor) = successor {
                self.duplicates.remove(&successor);
                self.by_id.insert(entity.id.clone(), successor);
            }
        }
        Some(entity)
    }
}
