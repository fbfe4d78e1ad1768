//! Durable replicas in the `documents` collection.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notesync_core::{tagged, Clock, Collection, Entity, SyncResult};
use notesync_storage::{LocalStore, Table};
use serde::{Deserialize, Serialize};

use crate::crdt::ReplicaId;
use crate::document::ReplicatedDocument;

/// An encoded replica, keyed by document name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredDocument {
    /// Document name.
    pub id: String,
    /// Encoded [`DocumentState`](crate::document::DocumentState).
    #[serde(with = "tagged::bytes")]
    pub state: Vec<u8>,
    /// Last flush.
    #[serde(with = "tagged::date")]
    pub updated_at: DateTime<Utc>,
}

impl Entity for StoredDocument {
    const COLLECTION: Collection = Collection::Documents;

    fn id(&self) -> &str {
        &self.id
    }
}

/// Loads and saves replicas.
#[derive(Clone)]
pub struct DocumentStore {
    table: Table<StoredDocument>,
    clock: Arc<dyn Clock>,
}

impl DocumentStore {
    /// Replicas kept in `store`.
    pub fn new(store: &Arc<LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            table: store.table::<StoredDocument>(),
            clock,
        }
    }

    /// The persisted replica of `name`, resumed as `replica`.
    pub fn load(&self, name: &str, replica: ReplicaId) -> SyncResult<Option<ReplicatedDocument>> {
        self.table
            .get(name)?
            .map(|stored| ReplicatedDocument::decode(replica, &stored.state))
            .transpose()
    }

    /// Persist `doc` under `name` in one store transaction.
    pub fn save(&self, name: &str, doc: &ReplicatedDocument) -> SyncResult<()> {
        self.table.put(&StoredDocument {
            id: name.to_string(),
            state: doc.encode_state()?,
            updated_at: self.clock.now(),
        })
    }

    /// Forget the replica of `name`.
    pub fn delete(&self, name: &str) -> SyncResult<()> {
        self.table.delete(name)
    }
}

impl std::fmt::Debug for DocumentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DocumentStore")
            .field("documents", &self.table.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::SystemClock;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn replica_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let mut doc = ReplicatedDocument::new(ReplicaId::new());
        doc.put("s1", json!({"kind": "box"}));
        {
            let store = LocalStore::open(dir.path()).unwrap();
            DocumentStore::new(&store, Arc::new(SystemClock))
                .save("board", &doc)
                .unwrap();
        }
        let store = LocalStore::open(dir.path()).unwrap();
        let docs = DocumentStore::new(&store, Arc::new(SystemClock));
        let loaded = docs.load("board", ReplicaId::new()).unwrap().unwrap();
        assert_eq!(loaded.records(), doc.records());
        assert!(docs.load("other", ReplicaId::new()).unwrap().is_none());
    }
}
