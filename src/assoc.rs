//! Key-value associations against owning entities, with staged commits.
//!
//! Lab runs attach data to the entities the host platform tracks: items,
//! collections, operations, and plans. An [`AssociationMap`] is bound to
//! exactly one owning entity. Writes are staged locally and become visible
//! only when [`AssociationMap::save`] commits them, so a run step either
//! records all of its bookkeeping or none of it.
//!
//! A `put` never overwrites an existing key. When the requested key is
//! already in use (persisted or staged), the first free numeric suffix is
//! derived instead: `key`, `key_0`, `key_1`, and so on. The suffix scheme
//! is part of the persisted-state contract; downstream analysis relies on
//! prior run data staying untouched.
//!
//! The host platform is reached through the [`EntityStore`] trait. The
//! in-process [`MemoryStore`] implements it for tests and the demo binary.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::{AppResult, CytoError};
use crate::plate::WellGrid;

/// Identifier of an entity in the owning host platform.
pub type EntityId = u64;

/// The kind of entity an association can be attached to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A physical inventory item (tube, stock, plate of beads).
    Item,
    /// A multi-well container with a sample matrix.
    Collection,
    /// One executed protocol operation.
    Operation,
    /// The plan an operation belongs to.
    Plan,
}

/// A value stored under an association key.
///
/// The two shapes collaborators persist are a single reference id (one
/// upload attached to one entity) and a nested array (a serialized well
/// grid). `Text` carries free-form metadata such as reagent lot numbers.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AssocValue {
    /// Reference to an upload or entity by id.
    Reference(u64),
    /// Row-major serialized well grid.
    Matrix(Vec<Vec<i64>>),
    /// Free-form text value.
    Text(String),
}

/// Boundary to the host platform's entity registry.
///
/// The host owns entity lifecycles and durable association storage; this
/// crate only ever reads entity state and commits batches of entries.
/// Implementations must apply a `commit` batch atomically with respect to
/// readers.
pub trait EntityStore: Send + Sync {
    /// Mints a new entity of the given kind and returns its id.
    fn create_entity(&self, kind: EntityKind) -> EntityId;

    /// Removes an entity. Returns false if it did not exist.
    fn delete_entity(&self, entity: EntityId) -> bool;

    /// Whether the entity currently exists.
    fn exists(&self, entity: EntityId) -> bool;

    /// Whether a persisted association under `key` exists on the entity.
    fn contains_key(&self, entity: EntityId, key: &str) -> bool;

    /// Reads a persisted association value.
    fn read(&self, entity: EntityId, key: &str) -> Option<AssocValue>;

    /// Commits a batch of entries to the entity, atomically.
    ///
    /// Fails with [`CytoError::Persistence`] if the entity no longer
    /// exists; in that case nothing is written.
    fn commit(&self, entity: EntityId, entries: &[(String, AssocValue)]) -> AppResult<()>;

    /// The sample matrix of a collection entity, if it has one.
    fn sample_matrix(&self, entity: EntityId) -> Option<Vec<Vec<i64>>>;
}

/// Staged, collision-avoiding association writer bound to one entity.
pub struct AssociationMap {
    store: Arc<dyn EntityStore>,
    entity: EntityId,
    staged: Vec<(String, AssocValue)>,
}

impl AssociationMap {
    /// Binds a new map to `entity` in `store`.
    pub fn new(store: Arc<dyn EntityStore>, entity: EntityId) -> Self {
        Self {
            store,
            entity,
            staged: Vec::new(),
        }
    }

    /// The owning entity this map writes to.
    pub fn entity(&self) -> EntityId {
        self.entity
    }

    /// Reads a value under `key`, staged entries shadowing persisted ones.
    ///
    /// Never fails: a missing key is `None`.
    pub fn get(&self, key: &str) -> Option<AssocValue> {
        self.staged
            .iter()
            .rev()
            .find(|(staged_key, _)| staged_key == key)
            .map(|(_, value)| value.clone())
            .or_else(|| self.store.read(self.entity, key))
    }

    /// Stages `value` under `key`, or under the first free suffixed key
    /// (`key_0`, `key_1`, ...) if `key` is already in use.
    ///
    /// Returns the key actually used.
    pub fn put(&mut self, key: &str, value: AssocValue) -> String {
        let used = if self.key_in_use(key) {
            let mut i = 0usize;
            loop {
                let candidate = format!("{key}_{i}");
                if !self.key_in_use(&candidate) {
                    break candidate;
                }
                i += 1;
            }
        } else {
            key.to_string()
        };
        self.staged.push((used.clone(), value));
        used
    }

    /// Stages the grid's row-major array form under `key`, applying the
    /// same collision rule as [`AssociationMap::put`].
    pub fn put_matrix(&mut self, key: &str, grid: &WellGrid) -> String {
        self.put(key, AssocValue::Matrix(grid.to_array()))
    }

    /// Commits all staged entries to the owning entity atomically.
    ///
    /// Idempotent: with nothing staged this is a no-op. If the entity no
    /// longer exists the staged entries are discarded and
    /// [`CytoError::Persistence`] is returned; nothing is partially
    /// committed.
    pub fn save(&mut self) -> AppResult<()> {
        if self.staged.is_empty() {
            return Ok(());
        }
        let staged = std::mem::take(&mut self.staged);
        self.store.commit(self.entity, &staged)
    }

    fn key_in_use(&self, key: &str) -> bool {
        self.staged.iter().any(|(staged_key, _)| staged_key == key)
            || self.store.contains_key(self.entity, key)
    }
}

/// In-process [`EntityStore`] used by tests and the demo binary.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryState>,
}

#[derive(Default)]
struct MemoryState {
    next_id: EntityId,
    entities: HashMap<EntityId, EntityRecord>,
}

#[derive(Clone)]
struct EntityRecord {
    kind: EntityKind,
    sample_matrix: Option<Vec<Vec<i64>>>,
    associations: HashMap<String, AssocValue>,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mints a collection entity holding `matrix` as its sample matrix.
    pub fn create_collection(&self, matrix: Vec<Vec<i64>>) -> EntityId {
        let mut state = self.write_state();
        state.next_id += 1;
        let id = state.next_id;
        state.entities.insert(
            id,
            EntityRecord {
                kind: EntityKind::Collection,
                sample_matrix: Some(matrix),
                associations: HashMap::new(),
            },
        );
        id
    }

    /// All persisted associations on an entity, for inspection.
    pub fn associations(&self, entity: EntityId) -> Option<HashMap<String, AssocValue>> {
        self.read_state()
            .entities
            .get(&entity)
            .map(|record| record.associations.clone())
    }

    /// The kind of an entity, if it exists.
    pub fn kind(&self, entity: EntityId) -> Option<EntityKind> {
        self.read_state().entities.get(&entity).map(|r| r.kind)
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, MemoryState> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, MemoryState> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

impl EntityStore for MemoryStore {
    fn create_entity(&self, kind: EntityKind) -> EntityId {
        let mut state = self.write_state();
        state.next_id += 1;
        let id = state.next_id;
        state.entities.insert(
            id,
            EntityRecord {
                kind,
                sample_matrix: None,
                associations: HashMap::new(),
            },
        );
        id
    }

    fn delete_entity(&self, entity: EntityId) -> bool {
        self.write_state().entities.remove(&entity).is_some()
    }

    fn exists(&self, entity: EntityId) -> bool {
        self.read_state().entities.contains_key(&entity)
    }

    fn contains_key(&self, entity: EntityId, key: &str) -> bool {
        self.read_state()
            .entities
            .get(&entity)
            .is_some_and(|record| record.associations.contains_key(key))
    }

    fn read(&self, entity: EntityId, key: &str) -> Option<AssocValue> {
        self.read_state()
            .entities
            .get(&entity)
            .and_then(|record| record.associations.get(key).cloned())
    }

    fn commit(&self, entity: EntityId, entries: &[(String, AssocValue)]) -> AppResult<()> {
        let mut state = self.write_state();
        let record = state.entities.get_mut(&entity).ok_or_else(|| {
            CytoError::Persistence(format!("owning entity {entity} no longer exists"))
        })?;
        for (key, value) in entries {
            record.associations.insert(key.clone(), value.clone());
        }
        Ok(())
    }

    fn sample_matrix(&self, entity: EntityId) -> Option<Vec<Vec<i64>>> {
        self.read_state()
            .entities
            .get(&entity)
            .and_then(|record| record.sample_matrix.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plate::{WellGrid, EMPTY_WELL};

    fn store_with_item() -> (Arc<MemoryStore>, EntityId) {
        let store = Arc::new(MemoryStore::new());
        let item = store.create_entity(EntityKind::Item);
        (store, item)
    }

    #[test]
    fn test_get_missing_key_is_none() {
        let (store, item) = store_with_item();
        let map = AssociationMap::new(store, item);
        assert_eq!(map.get("Lot No."), None);
    }

    #[test]
    fn test_put_save_get_round_trip() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store.clone(), item);
        let used = map.put("Lot No.", AssocValue::Text("B-1172".to_string()));
        assert_eq!(used, "Lot No.");
        // Staged entries are readable before save through the map only.
        assert!(store.read(item, "Lot No.").is_none());
        map.save().unwrap();
        assert_eq!(
            store.read(item, "Lot No."),
            Some(AssocValue::Text("B-1172".to_string()))
        );
    }

    #[test]
    fn test_collision_suffix_chain() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store.clone(), item);
        map.put("K", AssocValue::Reference(1));
        map.save().unwrap();

        let mut map = AssociationMap::new(store.clone(), item);
        assert_eq!(map.put("K", AssocValue::Reference(2)), "K_0");
        assert_eq!(map.put("K", AssocValue::Reference(3)), "K_1");
        map.save().unwrap();

        let persisted = store.associations(item).unwrap();
        assert_eq!(persisted.get("K"), Some(&AssocValue::Reference(1)));
        assert_eq!(persisted.get("K_0"), Some(&AssocValue::Reference(2)));
        assert_eq!(persisted.get("K_1"), Some(&AssocValue::Reference(3)));
    }

    #[test]
    fn test_collision_checks_staged_and_persisted() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store, item);
        assert_eq!(map.put("K", AssocValue::Reference(1)), "K");
        // Still unsaved; the staged key must already count as occupied.
        assert_eq!(map.put("K", AssocValue::Reference(2)), "K_0");
    }

    #[test]
    fn test_save_idempotent() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store.clone(), item);
        map.put("K", AssocValue::Reference(1));
        map.save().unwrap();
        let before = store.associations(item).unwrap();
        map.save().unwrap();
        assert_eq!(store.associations(item).unwrap(), before);
    }

    #[test]
    fn test_save_fails_and_discards_when_entity_gone() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store.clone(), item);
        map.put("K", AssocValue::Reference(1));
        store.delete_entity(item);

        let err = map.save().unwrap_err();
        assert!(matches!(err, CytoError::Persistence(_)));
        // Staged entries were discarded: a later save is a clean no-op.
        assert!(map.save().is_ok());
    }

    #[test]
    fn test_put_matrix_round_trips_grid_form() {
        let (store, item) = store_with_item();
        let mut grid = WellGrid::create_empty(24, EMPTY_WELL).unwrap();
        grid.set("A1", 42).unwrap();
        let mut map = AssociationMap::new(store.clone(), item);
        let key = map.put_matrix("SAMPLE_UPLOADS", &grid);
        map.save().unwrap();

        match store.read(item, &key) {
            Some(AssocValue::Matrix(matrix)) => {
                let restored = WellGrid::from_array(matrix).unwrap();
                assert_eq!(restored.get("A1").unwrap(), 42);
                assert_eq!(restored.to_array(), grid.to_array());
            }
            other => panic!("expected matrix value, got {other:?}"),
        }
    }

    #[test]
    fn test_assoc_value_serde_round_trip() {
        for value in [
            AssocValue::Reference(7),
            AssocValue::Matrix(vec![vec![-1, 3], vec![2, -1]]),
            AssocValue::Text("PBS".to_string()),
        ] {
            let json = serde_json::to_string(&value).unwrap();
            let back: AssocValue = serde_json::from_str(&json).unwrap();
            assert_eq!(back, value);
        }
    }

    #[test]
    fn test_staged_entries_shadow_persisted_reads() {
        let (store, item) = store_with_item();
        let mut map = AssociationMap::new(store.clone(), item);
        map.put("K", AssocValue::Reference(1));
        map.save().unwrap();
        map.put("K_0", AssocValue::Reference(9));
        assert_eq!(map.get("K_0"), Some(AssocValue::Reference(9)));
        assert_eq!(map.get("K"), Some(AssocValue::Reference(1)));
    }
}
