//! Change batching for the sync bridge.
//!
//! Local edits land in two accumulators. The presence set only remembers
//! which records moved and is drained at the fast cadence; the dirty map
//! keeps the latest change per record and is drained at the durable cadence,
//! so everything edited within one window is written together.

use std::collections::{BTreeMap, BTreeSet};

use parking_lot::Mutex;
use serde_json::Value;

/// Latest local change to one record.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingChange {
    /// Record written.
    Put(Value),
    /// Record deleted.
    Delete,
}

/// Changes drained for one durable flush.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FlushBatch {
    /// Latest change per record id.
    pub changes: BTreeMap<String, PendingChange>,
}

impl FlushBatch {
    /// Check if the batch is empty.
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of records touched.
    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Dirty-set accumulator drained by the bridge's two timers.
#[derive(Debug, Default)]
pub struct FlushScheduler {
    dirty: Mutex<BTreeMap<String, PendingChange>>,
    recent: Mutex<BTreeSet<String>>,
}

impl FlushScheduler {
    /// Empty scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Note a write to `id`.
    pub fn mark_put(&self, id: &str, value: Value) {
        self.mark(id, PendingChange::Put(value));
    }

    /// Note a delete of `id`.
    pub fn mark_delete(&self, id: &str) {
        self.mark(id, PendingChange::Delete);
    }

    fn mark(&self, id: &str, change: PendingChange) {
        self.dirty.lock().insert(id.to_string(), change);
        self.recent.lock().insert(id.to_string());
    }

    /// Drain ids changed since the last presence broadcast.
    pub fn take_recent(&self) -> Vec<String> {
        std::mem::take(&mut *self.recent.lock()).into_iter().collect()
    }

    /// Drain the durable batch.
    pub fn take_batch(&self) -> FlushBatch {
        FlushBatch {
            changes: std::mem::take(&mut *self.dirty.lock()),
        }
    }

    /// Put a batch back after a failed flush. Newer changes to the same ids
    /// are kept.
    pub fn restore(&self, batch: FlushBatch) {
        let mut dirty = self.dirty.lock();
        for (id, change) in batch.changes {
            dirty.entry(id).or_insert(change);
        }
    }

    /// Whether a durable flush has work.
    pub fn is_dirty(&self) -> bool {
        !self.dirty.lock().is_empty()
    }

    /// Whether `id` has a change waiting for the durable flush.
    pub fn is_pending(&self, id: &str) -> bool {
        self.dirty.lock().contains_key(id)
    }

    /// Records waiting for the durable flush.
    pub fn pending(&self) -> usize {
        self.dirty.lock().len()
    }
}
