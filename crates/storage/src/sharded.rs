//! Per-collection shards
//!
//! Each collection lives in its own [`Shard`]: an FxHashMap of rows keyed by
//! primary key plus one ordered map per declared secondary index.
//! [`ShardedTables`] holds one shard per collection in a DashMap, so
//! different collections never contend and a writer holding one shard's
//! guard is the only writer of that collection.
//!
//! # Design
//!
//! - DashMap keyed by Collection: a commit locks only its own collection
//! - FxHashMap: O(1) primary-key lookups
//! - BTreeMap<key, BTreeSet<id>> per index: ordered, duplicate-free postings

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::one::{Ref, RefMut};
use dashmap::DashMap;
use notesync_core::{Collection, IndexDef, Row, SyncError, SyncResult};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

/// A single mutation inside a committed transaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum WriteOp {
    /// Insert or replace a row by id.
    Put(Row),
    /// Remove a row by id.
    Delete(String),
    /// Remove every row of the collection.
    Clear,
}

type Postings = BTreeMap<String, BTreeSet<String>>;

/// One collection's rows and indices.
#[derive(Debug)]
pub struct Shard {
    collection: Collection,
    pub(crate) rows: FxHashMap<String, Row>,
    indices: FxHashMap<&'static str, Postings>,
}

impl Shard {
    /// Create an empty shard with the collection's declared indices.
    pub fn new(collection: Collection) -> Self {
        let indices = collection
            .indices()
            .iter()
            .map(|idx| (idx.name, Postings::new()))
            .collect();
        Self {
            collection,
            rows: FxHashMap::default(),
            indices,
        }
    }

    /// Collection this shard stores.
    pub fn collection(&self) -> Collection {
        self.collection
    }

    /// Number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the shard is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row by primary key.
    pub fn get(&self, id: &str) -> Option<&Row> {
        self.rows.get(id)
    }

    /// All rows, ordered by primary key.
    pub fn rows_sorted(&self) -> Vec<&Row> {
        let mut rows: Vec<&Row> = self.rows.values().collect();
        rows.sort_by(|a, b| a.id().cmp(b.id()));
        rows
    }

    /// Resolve an index by name.
    pub fn index_def(&self, index: &str) -> SyncResult<&'static IndexDef> {
        self.collection
            .index(index)
            .ok_or_else(|| SyncError::UnknownCollection {
                name: format!("{}.{}", self.collection, index),
            })
    }

    /// Ids posted under `value` in `index`, in key order.
    pub fn index_ids(&self, index: &str, value: &str) -> SyncResult<Vec<String>> {
        let def = self.index_def(index)?;
        Ok(self
            .indices
            .get(def.name)
            .and_then(|postings| postings.get(value))
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default())
    }

    /// Check a row against the collection's indices before it is written.
    ///
    /// Absent and `null` fields are skipped; an empty string is rejected.
    pub fn validate(collection: Collection, row: &Row) -> SyncResult<()> {
        for def in collection.indices() {
            if row.index_key(def.field).as_deref() == Some("") {
                return Err(SyncError::InvalidIndexValue {
                    collection: collection.to_string(),
                    index: def.name.to_string(),
                    id: row.id().to_string(),
                });
            }
        }
        Ok(())
    }

    /// Insert or replace a row, keeping indices in step.
    pub fn insert(&mut self, row: Row) -> Option<Row> {
        let id = row.id().to_string();
        let previous = self.remove(&id);
        for def in self.collection.indices() {
            if let Some(key) = row.index_key(def.field) {
                if let Some(postings) = self.indices.get_mut(def.name) {
                    postings.entry(key).or_default().insert(id.clone());
                }
            }
        }
        self.rows.insert(id, row);
        previous
    }

    /// Remove a row by id.
    pub fn remove(&mut self, id: &str) -> Option<Row> {
        let row = self.rows.remove(id)?;
        for def in self.collection.indices() {
            if let Some(key) = row.index_key(def.field) {
                if let Some(postings) = self.indices.get_mut(def.name) {
                    if let Some(ids) = postings.get_mut(&key) {
                        ids.remove(id);
                        if ids.is_empty() {
                            postings.remove(&key);
                        }
                    }
                }
            }
        }
        Some(row)
    }

    /// Remove every row.
    pub fn clear(&mut self) {
        self.rows.clear();
        for postings in self.indices.values_mut() {
            postings.clear();
        }
    }

    /// Apply already-validated operations in order.
    pub fn apply(&mut self, ops: &[WriteOp]) {
        for op in ops {
            match op {
                WriteOp::Put(row) => {
                    self.insert(row.clone());
                }
                WriteOp::Delete(id) => {
                    self.remove(id);
                }
                WriteOp::Clear => self.clear(),
            }
        }
    }
}

/// One shard per collection plus a global commit version.
pub struct ShardedTables {
    shards: DashMap<Collection, Shard>,
    version: AtomicU64,
}

impl ShardedTables {
    /// Create tables with an empty shard for every collection.
    pub fn new() -> Self {
        let shards = DashMap::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            shards.insert(collection, Shard::new(collection));
        }
        Self {
            shards,
            version: AtomicU64::new(0),
        }
    }

    /// Read guard on a collection's shard.
    pub fn shard(&self, collection: Collection) -> Ref<'_, Collection, Shard> {
        match self.shards.get(&collection) {
            Some(shard) => shard,
            None => {
                self.shards
                    .entry(collection)
                    .or_insert_with(|| Shard::new(collection));
                self.shard(collection)
            }
        }
    }

    /// Write guard on a collection's shard; held for the whole commit.
    pub fn shard_mut(&self, collection: Collection) -> RefMut<'_, Collection, Shard> {
        self.shards
            .entry(collection)
            .or_insert_with(|| Shard::new(collection))
    }

    /// Current commit version.
    #[inline]
    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    /// Increment version and return the new value.
    #[inline]
    pub fn next_version(&self) -> u64 {
        self.version.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Set version (used during replay).
    pub fn set_version(&self, version: u64) {
        self.version.store(version, Ordering::Release);
    }

    /// Total rows across all collections.
    pub fn total_rows(&self) -> usize {
        self.shards.iter().map(|entry| entry.value().len()).sum()
    }
}

impl Default for ShardedTables {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ShardedTables {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShardedTables")
            .field("version", &self.version())
            .field("total_rows", &self.total_rows())
            .finish()
    }
}
