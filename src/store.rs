//! Local flat entity store.
//!
//! The engine writes through the [`EntityStore`] trait only. [`MemoryStore`]
//! is the in-process implementation used by tests, benchmarks and callers
//! that do not bring their own store.

use crate::error::Result;
use crate::types::Entity;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;

/// Partial update of one record.
pub enum Patch {
    /// Merge these top-level fields into the record.
    Merge(Entity),
    /// Compute the fields to merge from the current record.
    Compute(Box<dyn FnOnce(&Entity) -> Entity + Send>),
}

impl Patch {
    pub fn compute<F>(f: F) -> Self
    where
        F: FnOnce(&Entity) -> Entity + Send + 'static,
    {
        Patch::Compute(Box::new(f))
    }

    /// Apply to a record in place.
    pub fn apply(self, record: &mut Entity) {
        let partial = match self {
            Patch::Merge(partial) => partial,
            Patch::Compute(f) => f(record),
        };
        for (key, value) in partial {
            record.insert(key, value);
        }
    }
}

impl fmt::Debug for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Merge(partial) => f.debug_tuple("Merge").field(partial).finish(),
            Patch::Compute(_) => f.write_str("Compute(..)"),
        }
    }
}

/// Builds the replacement for a record from its current value, if any.
pub type Replace = Box<dyn FnOnce(Option<&Entity>) -> Entity + Send>;

/// Capability to read and write flat records by id.
///
/// Every operation is synchronous and idempotent on id.
pub trait EntityStore: Send + Sync {
    fn get(&self, id: &str) -> Result<Option<Entity>>;

    /// Insert or fully replace a record.
    fn upsert(&self, id: &str, entity: Entity) -> Result<()>;

    /// Insert or fully replace a record with a value computed from the
    /// current one. Read and write happen as one operation.
    fn upsert_with(&self, id: &str, replace: Replace) -> Result<()>;

    /// Patch an existing record. Returns false, without writing, when the id
    /// is absent.
    fn update(&self, id: &str, patch: Patch) -> Result<bool>;

    /// Returns whether a record was removed.
    fn remove(&self, id: &str) -> Result<bool>;
}

/// In-memory entity store.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, Entity>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.read().contains_key(id)
    }

    /// Record ids, sorted.
    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.records.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Copy of a record, if present.
    pub fn entity(&self, id: &str) -> Option<Entity> {
        self.records.read().get(id).cloned()
    }

    /// Copy of every record.
    pub fn snapshot(&self) -> HashMap<String, Entity> {
        self.records.read().clone()
    }

    pub fn clear(&self) {
        self.records.write().clear();
    }
}

impl EntityStore for MemoryStore {
    fn get(&self, id: &str) -> Result<Option<Entity>> {
        Ok(self.entity(id))
    }

    fn upsert(&self, id: &str, entity: Entity) -> Result<()> {
        self.records.write().insert(id.to_string(), entity);
        Ok(())
    }

    fn upsert_with(&self, id: &str, replace: Replace) -> Result<()> {
        let mut records = self.records.write();
        let entity = replace(records.get(id));
        records.insert(id.to_string(), entity);
        Ok(())
    }

    fn update(&self, id: &str, patch: Patch) -> Result<bool> {
        let mut records = self.records.write();
        match records.get_mut(id) {
            Some(record) => {
                patch.apply(record);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn remove(&self, id: &str) -> Result<bool> {
        Ok(self.records.write().remove(id).is_some())
    }
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("records", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(value: serde_json::Value) -> Entity {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_upsert_replaces() {
        let store = MemoryStore::new();
        store.upsert("u1", entity(json!({"id": "u1", "name": "Ann", "age": 3}))).unwrap();
        store.upsert("u1", entity(json!({"id": "u1", "name": "Bo"}))).unwrap();

        let record = store.entity("u1").unwrap();
        assert_eq!(record["name"], "Bo");
        assert!(!record.contains_key("age"));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_update_merge_and_compute() {
        let store = MemoryStore::new();
        store.upsert("u1", entity(json!({"id": "u1", "n": 1, "keep": true}))).unwrap();

        assert!(store.update("u1", Patch::Merge(entity(json!({"n": 2})))).unwrap());
        assert!(store
            .update(
                "u1",
                Patch::compute(|current| {
                    let n = current["n"].as_i64().unwrap_or(0);
                    entity(json!({"n": n * 10}))
                })
            )
            .unwrap());

        let record = store.entity("u1").unwrap();
        assert_eq!(record["n"], 20);
        assert_eq!(record["keep"], true);
    }

    #[test]
    fn test_upsert_with_sees_current() {
        let store = MemoryStore::new();
        store
            .upsert_with(
                "u1",
                Box::new(|current: Option<&Entity>| {
                    assert!(current.is_none());
                    entity(json!({"id": "u1", "n": 1}))
                }),
            )
            .unwrap();
        store
            .upsert_with(
                "u1",
                Box::new(|current: Option<&Entity>| {
                    let n = current.and_then(|c| c["n"].as_i64()).unwrap_or(0);
                    entity(json!({"id": "u1", "n": n + 1}))
                }),
            )
            .unwrap();
        assert_eq!(store.entity("u1").unwrap()["n"], 2);
    }

    #[test]
    fn test_update_missing_is_noop() {
        let store = MemoryStore::new();
        assert!(!store.update("ghost", Patch::Merge(entity(json!({"n": 1})))).unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_remove_idempotent() {
        let store = MemoryStore::new();
        store.upsert("u1", Entity::new()).unwrap();
        assert!(store.remove("u1").unwrap());
        assert!(!store.remove("u1").unwrap());
        assert!(!store.contains("u1"));
    }
}
