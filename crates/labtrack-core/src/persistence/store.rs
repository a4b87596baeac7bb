//! Canonical record store
//!
//! Generic CRUD over the four collections. The store does not interpret
//! record fields beyond `id`, `createdAt` and `updatedAt`; status derivation
//! happens in the client before a write.

use std::path::PathBuf;

use chrono::Utc;
use serde_json::{Map, Value};
use uuid::Uuid;

use super::snapshot::{Backend, Snapshot};
use crate::config::StorageConfig;
use crate::error::{Result, StoreError};
use crate::kind::RecordKind;
use crate::timestamp;

/// A stored record: a JSON object carrying at least `id`, `createdAt`, `updatedAt`
pub type Record = Map<String, Value>;

const ID: &str = "id";
const CREATED_AT: &str = "createdAt";
const UPDATED_AT: &str = "updatedAt";

fn record_id(record: &Record) -> Option<&str> {
    record.get(ID).and_then(Value::as_str)
}

fn into_object(payload: Value) -> Result<Record> {
    match payload {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(StoreError::InvalidPayload(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

/// Record store over an in-memory snapshot and a storage backend
#[derive(Debug)]
pub struct RecordStore {
    snapshot: Snapshot,
    backend: Backend,
}

impl RecordStore {
    /// Create an in-memory store (for testing and ephemeral deployments)
    pub fn in_memory() -> Self {
        Self {
            snapshot: Snapshot::default(),
            backend: Backend::Memory,
        }
    }

    /// Open a file-backed store, loading the document if it exists
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let backend = Backend::File(path.into());
        let snapshot = backend.load()?;
        Ok(Self { snapshot, backend })
    }

    /// Create a store from configuration
    pub fn from_config(config: &StorageConfig) -> Result<Self> {
        match config {
            StorageConfig::Memory => Ok(Self::in_memory()),
            StorageConfig::File { path } => Self::open(path),
        }
    }

    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// All records of a collection, in insertion order
    pub fn list(&self, kind: RecordKind) -> &[Record] {
        self.snapshot.collection(kind)
    }

    /// Get a record by id
    pub fn get(&self, kind: RecordKind, id: &str) -> Option<&Record> {
        self.list(kind).iter().find(|r| record_id(r) == Some(id))
    }

    /// Number of records per collection
    pub fn counts(&self) -> Vec<(RecordKind, usize)> {
        RecordKind::ALL
            .iter()
            .map(|k| (*k, self.list(*k).len()))
            .collect()
    }

    /// Store a new record with a fresh id and creation timestamps
    ///
    /// Client-supplied `id`, `createdAt` and `updatedAt` are discarded.
    pub fn create(&mut self, kind: RecordKind, payload: Value) -> Result<Record> {
        let mut record = into_object(payload)?;
        record.remove(ID);
        record.remove(CREATED_AT);
        record.remove(UPDATED_AT);

        let id = self.fresh_id(kind);
        let now = timestamp::format(Utc::now());
        record.insert(ID.to_string(), Value::String(id));
        record.insert(CREATED_AT.to_string(), Value::String(now.clone()));
        record.insert(UPDATED_AT.to_string(), Value::String(now));

        let mut next = self.list(kind).to_vec();
        next.push(record.clone());
        self.commit(kind, next)?;
        Ok(record)
    }

    /// Shallow-merge `payload` over an existing record
    ///
    /// `id` and `createdAt` are never overwritten; `updatedAt` always moves
    /// forward.
    pub fn update(&mut self, kind: RecordKind, id: Option<&str>, payload: Value) -> Result<Record> {
        let id = id.ok_or(StoreError::MissingId)?;
        let patch = into_object(payload)?;
        let index = self.position(kind, id)?;

        let mut next = self.list(kind).to_vec();
        let merged = &mut next[index];
        let previous = merged
            .get(UPDATED_AT)
            .and_then(Value::as_str)
            .and_then(timestamp::parse);
        for (key, value) in patch {
            if key == ID || key == CREATED_AT {
                continue;
            }
            merged.insert(key, value);
        }
        let updated_at = timestamp::after(previous, Utc::now());
        merged.insert(
            UPDATED_AT.to_string(),
            Value::String(timestamp::format(updated_at)),
        );
        let merged = merged.clone();

        self.commit(kind, next)?;
        Ok(merged)
    }

    /// Remove a record
    pub fn delete(&mut self, kind: RecordKind, id: Option<&str>) -> Result<()> {
        let id = id.ok_or(StoreError::MissingId)?;
        let index = self.position(kind, id)?;

        let mut next = self.list(kind).to_vec();
        next.remove(index);
        self.commit(kind, next)
    }

    fn position(&self, kind: RecordKind, id: &str) -> Result<usize> {
        self.list(kind)
            .iter()
            .position(|r| record_id(r) == Some(id))
            .ok_or_else(|| StoreError::NotFound {
                kind,
                id: id.to_string(),
            })
    }

    /// Time-ordered UUIDv7, re-rolled on the off chance it already exists
    fn fresh_id(&self, kind: RecordKind) -> String {
        loop {
            let id = Uuid::now_v7().simple().to_string();
            if self.get(kind, &id).is_none() {
                return id;
            }
        }
    }

    /// Persist the new collection, then make it visible in memory
    fn commit(&mut self, kind: RecordKind, next: Vec<Record>) -> Result<()> {
        self.backend.save_pending(&self.snapshot, kind, &next)?;
        *self.snapshot.collection_mut(kind) = next;
        Ok(())
    }
}

impl Default for RecordStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    use serde_json::json;

    #[test]
    fn test_list_empty_for_every_kind() {
        let store = RecordStore::in_memory();
        for kind in RecordKind::ALL {
            assert!(store.list(kind).is_empty());
        }
    }

    #[test]
    fn test_create_assigns_id_and_matching_timestamps() {
        let mut store = RecordStore::in_memory();
        let record = store
            .create(RecordKind::Tasks, json!({ "title": "A", "status": "overdue" }))
            .unwrap();

        assert!(record_id(&record).is_some());
        assert_eq!(record[CREATED_AT], record[UPDATED_AT]);
        assert_eq!(record["status"], "overdue");
        assert_eq!(store.list(RecordKind::Tasks).len(), 1);
        assert!(store.list(RecordKind::MetalTracking).is_empty());
    }

    #[test]
    fn test_create_ignores_client_ids() {
        let mut store = RecordStore::in_memory();
        let record = store
            .create(
                RecordKind::DocumentTracking,
                json!({ "id": "mine", "createdAt": "1999-01-01T00:00:00Z" }),
            )
            .unwrap();
        assert_ne!(record_id(&record), Some("mine"));
        assert_ne!(record[CREATED_AT], "1999-01-01T00:00:00Z");
    }

    #[test]
    fn test_ids_are_unique() {
        let mut store = RecordStore::in_memory();
        let ids: HashSet<String> = (0..200)
            .map(|_| {
                let record = store.create(RecordKind::Tasks, json!({})).unwrap();
                record_id(&record).unwrap().to_string()
            })
            .collect();
        assert_eq!(ids.len(), 200);
    }

    #[test]
    fn test_create_rejects_non_objects() {
        let mut store = RecordStore::in_memory();
        let err = store.create(RecordKind::Tasks, json!([1, 2])).unwrap_err();
        assert!(matches!(err, StoreError::InvalidPayload(_)));
        assert!(store.list(RecordKind::Tasks).is_empty());
    }

    #[test]
    fn test_update_merges_and_advances_updated_at() {
        let mut store = RecordStore::in_memory();
        let original = store
            .create(RecordKind::Tasks, json!({ "title": "A", "priority": "low" }))
            .unwrap();
        let id = record_id(&original).unwrap().to_string();

        let updated = store
            .update(
                RecordKind::Tasks,
                Some(&id),
                json!({ "priority": "high", "id": "hijack", "createdAt": "x" }),
            )
            .unwrap();

        assert_eq!(updated["priority"], "high");
        assert_eq!(updated["title"], "A");
        assert_eq!(updated[ID], original[ID]);
        assert_eq!(updated[CREATED_AT], original[CREATED_AT]);

        let before = timestamp::parse(original[UPDATED_AT].as_str().unwrap()).unwrap();
        let after = timestamp::parse(updated[UPDATED_AT].as_str().unwrap()).unwrap();
        assert!(after > before);

        assert_eq!(store.get(RecordKind::Tasks, &id), Some(&updated));
    }

    #[test]
    fn test_update_and_delete_missing_id() {
        let mut store = RecordStore::in_memory();
        assert!(matches!(
            store.update(RecordKind::Tasks, None, json!({})),
            Err(StoreError::MissingId)
        ));
        assert!(matches!(
            store.delete(RecordKind::Tasks, None),
            Err(StoreError::MissingId)
        ));
    }

    #[test]
    fn test_not_found_leaves_collection_unchanged() {
        let mut store = RecordStore::in_memory();
        store
            .create(RecordKind::WorkClosures, json!({ "factory": "East" }))
            .unwrap();
        let before = store.list(RecordKind::WorkClosures).to_vec();

        assert!(matches!(
            store.update(RecordKind::WorkClosures, Some("nope"), json!({ "factory": "West" })),
            Err(StoreError::NotFound { .. })
        ));
        assert!(matches!(
            store.delete(RecordKind::WorkClosures, Some("nope")),
            Err(StoreError::NotFound { .. })
        ));
        assert_eq!(store.list(RecordKind::WorkClosures), before.as_slice());
    }

    #[test]
    fn test_delete_removes_only_target() {
        let mut store = RecordStore::in_memory();
        let a = store.create(RecordKind::MetalTracking, json!({ "melt": "a" })).unwrap();
        let b = store.create(RecordKind::MetalTracking, json!({ "melt": "b" })).unwrap();

        store
            .delete(RecordKind::MetalTracking, record_id(&a))
            .unwrap();

        assert_eq!(store.list(RecordKind::MetalTracking), &[b]);
    }

    #[test]
    fn test_file_store_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        let id = {
            let mut store = RecordStore::open(&path).unwrap();
            let record = store.create(RecordKind::Tasks, json!({ "title": "keep" })).unwrap();
            store.create(RecordKind::Tasks, json!({ "title": "drop" })).unwrap();
            let drop_id = record_id(&store.list(RecordKind::Tasks)[1])
                .unwrap()
                .to_string();
            store.delete(RecordKind::Tasks, Some(&drop_id)).unwrap();
            record_id(&record).unwrap().to_string()
        };

        let reopened = RecordStore::open(&path).unwrap();
        assert_eq!(reopened.list(RecordKind::Tasks).len(), 1);
        assert!(reopened.get(RecordKind::Tasks, &id).is_some());
        assert_eq!(reopened.backend().name(), "file");
    }

    #[cfg(unix)]
    #[test]
    fn test_failed_write_does_not_change_memory() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be makes the rename fail
        let path = dir.path().join("data.json");
        let mut store = RecordStore::open(&path).unwrap();
        store.create(RecordKind::Tasks, json!({ "title": "A" })).unwrap();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();

        let err = store
            .create(RecordKind::Tasks, json!({ "title": "B" }))
            .unwrap_err();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert_eq!(store.list(RecordKind::Tasks).len(), 1);
    }
}
