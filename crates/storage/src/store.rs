//! The local store.
//!
//! [`LocalStore`] is the embedded database the sync layer mirrors server data
//! into and stages offline writes in. Every write goes through a
//! [`Transaction`] on a single collection:
//!
//! 1. the caller's closure stages puts/deletes/clears (validated on put)
//! 2. the staged ops are appended to the write-ahead log as one record
//! 3. the ops are applied to the shard under its write guard
//! 4. the guard is released and subscribers are notified
//!
//! A failure in (1) or (2) leaves the collection untouched. Readers take the
//! shard's read guard, so they observe the collection either before or after
//! a commit, never in between.
//!
//! A file-backed store compacts its log once it holds more than
//! [`LocalStore::compact_after`] records, so replay time on open tracks the
//! size of the data rather than its history.
//!
//! The transaction closure must only touch the store through the
//! [`Transaction`] it is given; calling back into the store for the same
//! collection would wait on the guard the transaction holds.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use notesync_core::{Collection, Entity, Row, SyncResult};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashSet;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::sharded::{ShardedTables, WriteOp};
use crate::subscription::{ChangeEvent, Subscribers, Subscription};
use crate::table::Table;
use crate::txn::Transaction;
use crate::wal::{Wal, WalRecord};

/// Field holding the payload of a scalar row in the `keyval` collection.
const SCALAR_FIELD: &str = "value";

/// Log length that triggers compaction unless configured otherwise.
pub const DEFAULT_COMPACT_AFTER: u64 = 1000;

/// Embedded store: collections, indices, transactions, change feed, WAL.
pub struct LocalStore {
    tables: ShardedTables,
    wal: Mutex<Option<Wal>>,
    /// Commits hold this shared; compaction holds it exclusively.
    gate: RwLock<()>,
    subscribers: Arc<Subscribers>,
    dir: Option<PathBuf>,
    /// 0 disables automatic compaction.
    compact_after: AtomicU64,
}

impl LocalStore {
    /// Memory-only store. Contents are lost when the last handle is dropped.
    pub fn ephemeral() -> Arc<Self> {
        Arc::new(Self {
            tables: ShardedTables::new(),
            wal: Mutex::new(None),
            gate: RwLock::new(()),
            subscribers: Arc::new(Subscribers::default()),
            dir: None,
            compact_after: AtomicU64::new(DEFAULT_COMPACT_AFTER),
        })
    }

    /// Open (or create) a file-backed store in `dir`, replaying its log.
    pub fn open(dir: impl AsRef<Path>) -> SyncResult<Arc<Self>> {
        Self::open_with(dir, true)
    }

    /// Like [`LocalStore::open`]; `sync` controls whether every commit is
    /// fsynced before it is acknowledged.
    pub fn open_with(dir: impl AsRef<Path>, sync: bool) -> SyncResult<Arc<Self>> {
        Self::open_compacting(dir, sync, DEFAULT_COMPACT_AFTER)
    }

    /// Like [`LocalStore::open_with`], compacting whenever the log grows past
    /// `compact_after` records (0 never compacts automatically). A log that
    /// is already past the threshold is compacted before this returns.
    pub fn open_compacting(
        dir: impl AsRef<Path>,
        sync: bool,
        compact_after: u64,
    ) -> SyncResult<Arc<Self>> {
        let dir = dir.as_ref();
        let (wal, records) = Wal::open(dir, sync)?;
        let tables = ShardedTables::new();

        let replayed = records.len();
        for record in records {
            tables.shard_mut(record.collection).apply(&record.ops);
            if record.version > tables.version() {
                tables.set_version(record.version);
            }
        }

        tracing::info!(
            target: "notesync::store",
            path = %dir.display(),
            records = replayed,
            version = tables.version(),
            rows = tables.total_rows(),
            "Opened local store"
        );

        let store = Arc::new(Self {
            tables,
            wal: Mutex::new(Some(wal)),
            gate: RwLock::new(()),
            subscribers: Arc::new(Subscribers::default()),
            dir: Some(dir.to_path_buf()),
            compact_after: AtomicU64::new(compact_after),
        });
        store.compact_if_due()?;
        Ok(store)
    }

    /// Directory of a file-backed store.
    pub fn path(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Whether commits are written to disk.
    pub fn is_persistent(&self) -> bool {
        self.dir.is_some()
    }

    /// Version of the last commit.
    pub fn version(&self) -> u64 {
        self.tables.version()
    }

    // ========================================================================
    // Reads
    // ========================================================================

    /// Row by primary key.
    pub fn get(&self, collection: Collection, id: &str) -> Option<Row> {
        self.tables.shard(collection).get(id).cloned()
    }

    /// Every row of a collection, ordered by primary key.
    pub fn get_all(&self, collection: Collection) -> Vec<Row> {
        self.tables
            .shard(collection)
            .rows_sorted()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Rows whose indexed field equals `value`, ordered by primary key.
    pub fn get_all_from_index(
        &self,
        collection: Collection,
        index: &str,
        value: &str,
    ) -> SyncResult<Vec<Row>> {
        let shard = self.tables.shard(collection);
        let ids = shard.index_ids(index, value)?;
        Ok(ids.iter().filter_map(|id| shard.get(id).cloned()).collect())
    }

    /// Number of rows in a collection.
    pub fn count(&self, collection: Collection) -> usize {
        self.tables.shard(collection).len()
    }

    // ========================================================================
    // Writes
    // ========================================================================

    /// Run `f` as one atomic read-write transaction on `collection`.
    ///
    /// If `f` returns `Err`, nothing it staged is kept and the error is
    /// returned. A transaction that stages nothing commits nothing.
    pub fn transaction<R, F>(&self, collection: Collection, f: F) -> SyncResult<R>
    where
        F: FnOnce(&mut Transaction<'_>) -> SyncResult<R>,
    {
        let gate = self.gate.read();
        let mut shard = self.tables.shard_mut(collection);

        let (result, ops) = {
            let mut txn = Transaction::new(&shard);
            let result = f(&mut txn)?;
            (result, txn.into_ops())
        };
        if ops.is_empty() {
            return Ok(result);
        }

        let record = {
            let mut wal = self.wal.lock();
            let record = WalRecord {
                version: self.tables.version() + 1,
                collection,
                ops,
            };
            if let Some(wal) = wal.as_mut() {
                wal.append(&record)?;
            }
            self.tables.set_version(record.version);
            record
        };
        shard.apply(&record.ops);
        drop(shard);
        drop(gate);

        tracing::trace!(
            target: "notesync::store",
            collection = %collection,
            ops = record.ops.len(),
            version = record.version,
            "Committed transaction"
        );

        if let Err(e) = self.compact_if_due() {
            tracing::warn!(
                target: "notesync::store",
                error = %e,
                "Automatic compaction failed"
            );
        }

        self.subscribers.notify(&change_event(&record));
        Ok(result)
    }

    /// Insert or replace one row.
    pub fn put(&self, collection: Collection, row: Row) -> SyncResult<()> {
        self.transaction(collection, |txn| txn.put(row))
    }

    /// Remove one row. Removing an absent id is not an error.
    pub fn delete(&self, collection: Collection, id: &str) -> SyncResult<()> {
        self.transaction(collection, |txn| {
            txn.delete(id);
            Ok(())
        })
    }

    /// Remove every row of a collection.
    pub fn clear(&self, collection: Collection) -> SyncResult<()> {
        self.transaction(collection, |txn| {
            txn.clear();
            Ok(())
        })
    }

    // ========================================================================
    // Scalar KV area
    // ========================================================================

    /// Scalar value stored under `key` in the `keyval` collection.
    pub fn get_scalar<T: DeserializeOwned>(&self, key: &str) -> SyncResult<Option<T>> {
        match self.get(Collection::KeyVal, key) {
            Some(row) => match row.field(SCALAR_FIELD) {
                Some(value) => Ok(Some(serde_json::from_value(value.clone())?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Store a scalar value under `key`.
    pub fn put_scalar<T: Serialize>(&self, key: &str, value: &T) -> SyncResult<()> {
        let row = Row::new(serde_json::json!({
            "id": key,
            SCALAR_FIELD: serde_json::to_value(value)?,
        }))?;
        self.put(Collection::KeyVal, row)
    }

    // ========================================================================
    // Change feed
    // ========================================================================

    /// Call `callback` after every commit that touches `collection`.
    pub fn subscribe<F>(&self, collection: Collection, callback: F) -> Subscription
    where
        F: Fn(&ChangeEvent) + Send + Sync + 'static,
    {
        self.subscribers.add(collection, Arc::new(callback))
    }

    /// Number of live subscriptions on `collection`.
    pub fn subscriber_count(&self, collection: Collection) -> usize {
        self.subscribers.count(collection)
    }

    // ========================================================================
    // Typed access & maintenance
    // ========================================================================

    /// Typed view over the collection of `T`.
    pub fn table<T: Entity>(self: &Arc<Self>) -> Table<T> {
        Table::new(Arc::clone(self))
    }

    /// Rewrite the log as one snapshot record per non-empty collection.
    ///
    /// No-op for ephemeral stores.
    pub fn compact(&self) -> SyncResult<()> {
        let _gate = self.gate.write();
        let mut wal = self.wal.lock();
        let Some(wal) = wal.as_mut() else {
            return Ok(());
        };

        let version = self.tables.version();
        let mut records: Vec<WalRecord> = Collection::ALL
            .iter()
            .filter_map(|&collection| {
                let shard = self.tables.shard(collection);
                if shard.is_empty() {
                    return None;
                }
                let ops = shard
                    .rows_sorted()
                    .into_iter()
                    .map(|row| WriteOp::Put(row.clone()))
                    .collect();
                Some(WalRecord {
                    version,
                    collection,
                    ops,
                })
            })
            .collect();
        if records.is_empty() {
            // keep the version across reopen
            records.push(WalRecord {
                version,
                collection: Collection::KeyVal,
                ops: Vec::new(),
            });
        }

        let before = wal.record_count();
        wal.rewrite(&records)?;
        tracing::info!(
            target: "notesync::store",
            before,
            after = records.len(),
            version,
            "Compacted write-ahead log"
        );
        Ok(())
    }

    /// Log length that triggers automatic compaction (0: never).
    pub fn compact_after(&self) -> u64 {
        self.compact_after.load(Ordering::Relaxed)
    }

    /// Change the automatic compaction threshold.
    pub fn set_compact_after(&self, records: u64) {
        self.compact_after.store(records, Ordering::Relaxed);
    }

    fn compact_if_due(&self) -> SyncResult<()> {
        let threshold = self.compact_after();
        if threshold == 0 {
            return Ok(());
        }
        match self.wal_records() {
            Some(records) if records >= threshold => self.compact(),
            _ => Ok(()),
        }
    }

    /// Records in the log since it was last compacted.
    pub fn wal_records(&self) -> Option<u64> {
        self.wal.lock().as_ref().map(Wal::record_count)
    }
}

impl std::fmt::Debug for LocalStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalStore")
            .field("dir", &self.dir)
            .field("tables", &self.tables)
            .finish()
    }
}

fn change_event(record: &WalRecord) -> ChangeEvent {
    let mut seen = FxHashSet::default();
    let mut touched = Vec::new();
    let mut cleared = false;
    for op in &record.ops {
        let id = match op {
            WriteOp::Put(row) => row.id(),
            WriteOp::Delete(id) => id.as_str(),
            WriteOp::Clear => {
                cleared = true;
                continue;
            }
        };
        if seen.insert(id.to_string()) {
            touched.push(id.to_string());
        }
    }
    ChangeEvent {
        collection: record.collection,
        version: record.version,
        touched,
        cleared,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use notesync_core::SyncError;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    fn row(v: serde_json::Value) -> Row {
        Row::new(v).unwrap()
    }

    fn ids(rows: &[Row]) -> Vec<&str> {
        rows.iter().map(|r| r.id()).collect()
    }

    #[test]
    fn put_get_delete() {
        let store = LocalStore::ephemeral();
        store
            .put(Collection::Artifacts, row(json!({"id": "a1", "title": "One"})))
            .unwrap();
        assert_eq!(
            store.get(Collection::Artifacts, "a1").unwrap().str_field("title"),
            Some("One")
        );
        assert_eq!(store.count(Collection::Artifacts), 1);

        store.delete(Collection::Artifacts, "a1").unwrap();
        assert!(store.get(Collection::Artifacts, "a1").is_none());
        store.delete(Collection::Artifacts, "a1").unwrap();
    }

    #[test]
    fn put_replaces_whole_row() {
        let store = LocalStore::ephemeral();
        store
            .put(Collection::Jobs, row(json!({"id": "j", "type": "export", "progress": 5})))
            .unwrap();
        store
            .put(Collection::Jobs, row(json!({"id": "j", "type": "import"})))
            .unwrap();
        let j = store.get(Collection::Jobs, "j").unwrap();
        assert!(j.field("progress").is_none());
        assert!(store
            .get_all_from_index(Collection::Jobs, "type", "export")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn failed_transaction_leaves_collection_untouched() {
        let store = LocalStore::ephemeral();
        store
            .put(Collection::Jobs, row(json!({"id": "j1", "type": "export"})))
            .unwrap();
        let before = store.version();

        let err = store
            .transaction(Collection::Jobs, |txn| {
                txn.clear();
                txn.put(row(json!({"id": "j2", "type": "export"})))?;
                Err::<(), _>(SyncError::internal("boom"))
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Internal { .. }));
        assert_eq!(ids(&store.get_all(Collection::Jobs)), vec!["j1"]);
        assert_eq!(store.version(), before);
    }

    #[test]
    fn invalid_index_value_aborts_whole_transaction() {
        let store = LocalStore::ephemeral();
        let err = store
            .transaction(Collection::Edges, |txn| {
                txn.put(row(json!({"id": "e1", "artifactId": "a", "targetArtifactId": "b"})))?;
                txn.put(row(json!({"id": "e2", "artifactId": "", "targetArtifactId": "b"})))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::InvalidIndexValue { .. }));
        assert_eq!(store.count(Collection::Edges), 0);
    }

    #[test]
    fn subscribers_hear_each_commit_after_release() {
        let store = LocalStore::ephemeral();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        let reader = Arc::clone(&store);
        let _sub = store.subscribe(Collection::Edges, move |event| {
            // reading the same collection here must not deadlock
            assert_eq!(reader.count(event.collection), 1);
            h.fetch_add(1, Ordering::SeqCst);
        });

        store
            .put(
                Collection::Edges,
                row(json!({"id": "e1", "artifactId": "a", "targetArtifactId": "b"})),
            )
            .unwrap();
        store
            .put(Collection::Jobs, row(json!({"id": "j1", "type": "x"})))
            .unwrap();
        // empty transactions commit nothing
        store.transaction(Collection::Edges, |_| Ok(())).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn change_event_lists_touched_ids() {
        let store = LocalStore::ephemeral();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        let _sub = store.subscribe(Collection::Jobs, move |event| {
            s.lock().push(event.clone());
        });
        store
            .transaction(Collection::Jobs, |txn| {
                txn.clear();
                txn.put(row(json!({"id": "b", "type": "x"})))?;
                txn.put(row(json!({"id": "a", "type": "x"})))?;
                txn.put(row(json!({"id": "b", "type": "y"})))?;
                Ok(())
            })
            .unwrap();
        let events = seen.lock();
        assert_eq!(events.len(), 1);
        assert!(events[0].cleared);
        assert_eq!(events[0].touched, vec!["b", "a"]);
    }

    #[test]
    fn scalars_round_trip() {
        let store = LocalStore::ephemeral();
        assert_eq!(store.get_scalar::<String>("k").unwrap(), None);
        store.put_scalar("k", &"v".to_string()).unwrap();
        assert_eq!(store.get_scalar::<String>("k").unwrap().as_deref(), Some("v"));
        store.put_scalar("n", &42u64).unwrap();
        assert_eq!(store.get_scalar::<u64>("n").unwrap(), Some(42));
    }

    #[test]
    fn reopen_restores_rows_and_version() {
        let dir = TempDir::new().unwrap();
        let version = {
            let store = LocalStore::open(dir.path()).unwrap();
            store
                .put(
                    Collection::Edges,
                    row(json!({"id": "e1", "artifactId": "a", "targetArtifactId": "b"})),
                )
                .unwrap();
            store
                .put(Collection::Jobs, row(json!({"id": "j1", "type": "export"})))
                .unwrap();
            store.delete(Collection::Jobs, "j1").unwrap();
            store.version()
        };

        let store = LocalStore::open(dir.path()).unwrap();
        assert_eq!(store.version(), version);
        assert_eq!(store.count(Collection::Jobs), 0);
        let incoming = store
            .get_all_from_index(Collection::Edges, "targetArtifactId", "b")
            .unwrap();
        assert_eq!(ids(&incoming), vec!["e1"]);
    }

    #[test]
    fn compact_shrinks_log_and_preserves_contents() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open_with(dir.path(), false).unwrap();
            for i in 0..20 {
                store
                    .put(Collection::Artifacts, row(json!({"id": "a", "rev": i})))
                    .unwrap();
            }
            store.put_scalar("w", &1).unwrap();
            assert_eq!(store.wal_records(), Some(21));
            store.compact().unwrap();
            assert_eq!(store.wal_records(), Some(2));
            store
                .put(Collection::Artifacts, row(json!({"id": "b"})))
                .unwrap();
        }
        let store = LocalStore::open(dir.path()).unwrap();
        assert_eq!(store.count(Collection::Artifacts), 2);
        assert_eq!(
            store.get(Collection::Artifacts, "a").unwrap()["rev"],
            json!(19)
        );
        assert_eq!(store.version(), 22);
    }

    #[test]
    fn compact_is_noop_for_ephemeral() {
        let store = LocalStore::ephemeral();
        store.compact().unwrap();
        assert!(!store.is_persistent());
        assert_eq!(store.wal_records(), None);
    }

    fn refresh(store: &LocalStore, round: u64, rows: usize) {
        store
            .transaction(Collection::Artifacts, |txn| {
                txn.clear();
                for i in 0..rows {
                    txn.put(row(json!({"id": format!("a{i:03}"), "rev": round})))?;
                }
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn log_stays_bounded_across_repeated_refreshes() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open_compacting(dir.path(), false, 50).unwrap();
            for round in 0..200 {
                refresh(&store, round, 100);
                assert!(store.wal_records().unwrap() < 50);
            }
        }
        let store = LocalStore::open_compacting(dir.path(), false, 50).unwrap();
        assert_eq!(store.count(Collection::Artifacts), 100);
        assert_eq!(
            store.get(Collection::Artifacts, "a007").unwrap()["rev"],
            json!(199)
        );
        assert!(store.wal_records().unwrap() < 50);
    }

    #[test]
    fn open_compacts_a_log_past_the_threshold() {
        let dir = TempDir::new().unwrap();
        {
            let store = LocalStore::open_compacting(dir.path(), false, 0).unwrap();
            for round in 0..30 {
                refresh(&store, round, 5);
            }
            assert_eq!(store.wal_records(), Some(30));
        }
        let store = LocalStore::open_compacting(dir.path(), false, 10).unwrap();
        assert_eq!(store.wal_records(), Some(1));
        assert_eq!(store.count(Collection::Artifacts), 5);
        assert_eq!(store.version(), 30);
    }

    #[test]
    fn readers_never_see_a_partial_refresh() {
        const ROWS: usize = 50;
        let store = LocalStore::ephemeral();
        let done = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let barrier = Arc::new(std::sync::Barrier::new(2));

        let writer = {
            let store = Arc::clone(&store);
            let done = Arc::clone(&done);
            let barrier = Arc::clone(&barrier);
            std::thread::spawn(move || {
                barrier.wait();
                for round in 0..300 {
                    refresh(&store, round, ROWS);
                }
                done.store(true, Ordering::SeqCst);
            })
        };

        barrier.wait();
        let mut seen_full = false;
        let mut polls = 0usize;
        while !done.load(Ordering::SeqCst) || polls == 0 {
            let count = store.count(Collection::Artifacts);
            let rows = store.get_all(Collection::Artifacts);
            for n in [count, rows.len()] {
                assert!(n == 0 || n == ROWS, "observed {n} rows mid-commit");
                if n == ROWS {
                    seen_full = true;
                } else {
                    assert!(!seen_full, "collection emptied after a full commit");
                }
            }
            if rows.len() == ROWS {
                let rev = &rows[0]["rev"];
                assert!(rows.iter().all(|r| &r["rev"] == rev), "rows from two commits");
            }
            polls += 1;
        }
        writer.join().unwrap();
        assert_eq!(store.count(Collection::Artifacts), ROWS);
    }

    mod index_model {
        use super::*;
        use proptest::prelude::*;
        use std::collections::BTreeMap;

        #[derive(Debug, Clone)]
        enum Op {
            Put(u8, u8),
            Delete(u8),
        }

        fn op() -> impl Strategy<Value = Op> {
            prop_oneof![
                (0u8..8, 0u8..3).prop_map(|(id, owner)| Op::Put(id, owner)),
                (0u8..8).prop_map(Op::Delete),
            ]
        }

        proptest! {
            #[test]
            fn index_lookup_matches_a_filtered_scan(ops in prop::collection::vec(op(), 1..40)) {
                let store = LocalStore::ephemeral();
                let mut model: BTreeMap<String, String> = BTreeMap::new();
                for op in ops {
                    match op {
                        Op::Put(id, owner) => {
                            let (id, owner) = (format!("v{id}"), format!("a{owner}"));
                            store
                                .put(
                                    Collection::ArtifactVersions,
                                    row(json!({"id": id, "artifactId": owner})),
                                )
                                .unwrap();
                            model.insert(id, owner);
                        }
                        Op::Delete(id) => {
                            let id = format!("v{id}");
                            store.delete(Collection::ArtifactVersions, &id).unwrap();
                            model.remove(&id);
                        }
                    }
                }
                for owner in ["a0", "a1", "a2"] {
                    let rows = store
                        .get_all_from_index(Collection::ArtifactVersions, "artifactId", owner)
                        .unwrap();
                    let expected: Vec<&str> = model
                        .iter()
                        .filter(|(_, o)| o.as_str() == owner)
                        .map(|(id, _)| id.as_str())
                        .collect();
                    prop_assert_eq!(ids(&rows), expected);
                }
            }
        }
    }
}
