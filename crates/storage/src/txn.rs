//! Read-write transactions over one collection.
//!
//! A [`Transaction`] stages writes on top of the shard it was opened on.
//! Reads inside the transaction see the staged writes; nothing reaches the
//! shard until the closure returns `Ok` and the store commits the staged ops
//! under the collection's write guard. Returning `Err` discards them.

use notesync_core::{Collection, Row, SyncResult};
use rustc_hash::FxHashMap;

use crate::sharded::{Shard, WriteOp};

/// Staged writes against one collection.
pub struct Transaction<'a> {
    base: &'a Shard,
    overlay: FxHashMap<String, Option<Row>>,
    cleared: bool,
    ops: Vec<WriteOp>,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a Shard) -> Self {
        Self {
            base,
            overlay: FxHashMap::default(),
            cleared: false,
            ops: Vec::new(),
        }
    }

    /// Collection this transaction writes to.
    pub fn collection(&self) -> Collection {
        self.base.collection()
    }

    /// Row by id, as it would read after commit.
    pub fn get(&self, id: &str) -> Option<Row> {
        match self.overlay.get(id) {
            Some(staged) => staged.clone(),
            None if self.cleared => None,
            None => self.base.get(id).cloned(),
        }
    }

    /// All rows as they would read after commit, ordered by id.
    pub fn get_all(&self) -> Vec<Row> {
        let mut merged: FxHashMap<&str, &Row> = FxHashMap::default();
        if !self.cleared {
            for row in self.base.rows.values() {
                merged.insert(row.id(), row);
            }
        }
        for (id, staged) in &self.overlay {
            match staged {
                Some(row) => {
                    merged.insert(id.as_str(), row);
                }
                None => {
                    merged.remove(id.as_str());
                }
            }
        }
        let mut rows: Vec<Row> = merged.into_values().cloned().collect();
        rows.sort_by(|a, b| a.id().cmp(b.id()));
        rows
    }

    /// Rows whose `index` field equals `value`, as they would read after commit.
    pub fn get_all_from_index(&self, index: &str, value: &str) -> SyncResult<Vec<Row>> {
        let def = self.base.index_def(index)?;
        let mut ids: Vec<String> = if self.cleared {
            Vec::new()
        } else {
            self.base
                .index_ids(index, value)?
                .into_iter()
                .filter(|id| !self.overlay.contains_key(id))
                .collect()
        };
        for (id, staged) in &self.overlay {
            if let Some(row) = staged {
                if row.index_key(def.field).as_deref() == Some(value) {
                    ids.push(id.clone());
                }
            }
        }
        ids.sort();
        Ok(ids.iter().filter_map(|id| self.get(id)).collect())
    }

    /// Stage an insert-or-replace. Index constraints are checked immediately.
    pub fn put(&mut self, row: Row) -> SyncResult<()> {
        Shard::validate(self.collection(), &row)?;
        self.overlay.insert(row.id().to_string(), Some(row.clone()));
        self.ops.push(WriteOp::Put(row));
        Ok(())
    }

    /// Stage a delete.
    pub fn delete(&mut self, id: &str) {
        self.overlay.insert(id.to_string(), None);
        self.ops.push(WriteOp::Delete(id.to_string()));
    }

    /// Stage removal of every row.
    pub fn clear(&mut self) {
        self.overlay.clear();
        self.cleared = true;
        self.ops.push(WriteOp::Clear);
    }

    /// Number of staged operations.
    pub fn staged(&self) -> usize {
        self.ops.len()
    }

    pub(crate) fn into_ops(self) -> Vec<WriteOp> {
        self.ops
    }
}
