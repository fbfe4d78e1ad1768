//! The live record store the application reads and edits.
//!
//! It mirrors the replicated document's live records. Local edits go
//! through the bridge, which writes here first and replicates later; remote
//! changes arrive as [`RecordChange`]s.

use std::collections::BTreeMap;

use parking_lot::RwLock;
use serde_json::Value;

use crate::document::RecordChange;

/// In-memory records of one open document.
#[derive(Debug, Default)]
pub struct LiveStore {
    records: RwLock<BTreeMap<String, Value>>,
}

impl LiveStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `id`, if present.
    pub fn get(&self, id: &str) -> Option<Value> {
        self.records.read().get(id).cloned()
    }

    /// Write record `id`.
    pub fn put(&self, id: &str, value: Value) {
        self.records.write().insert(id.to_string(), value);
    }

    /// Remove record `id`. Returns whether it existed.
    pub fn remove(&self, id: &str) -> bool {
        self.records.write().remove(id).is_some()
    }

    /// Copy of every record.
    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        self.records.read().clone()
    }

    /// Replace every record with `records`.
    pub fn load_snapshot(&self, records: BTreeMap<String, Value>) {
        *self.records.write() = records;
    }

    /// Apply merged remote changes.
    pub fn apply(&self, changes: &[RecordChange]) {
        let mut records = self.records.write();
        for change in changes {
            match change {
                RecordChange::Upserted { id, value } => {
                    records.insert(id.clone(), value.clone());
                }
                RecordChange::Removed { id } => {
                    records.remove(id);
                }
            }
        }
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}
