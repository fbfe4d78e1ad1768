//! Typed access to one collection.

use std::marker::PhantomData;
use std::sync::Arc;

use notesync_core::{Entity, Row, SyncResult};

use crate::store::LocalStore;

/// A [`LocalStore`] collection viewed as entities of type `T`.
///
/// Rows are converted through serde on every call; the store itself stays
/// untyped.
pub struct Table<T> {
    store: Arc<LocalStore>,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> Table<T> {
    pub(crate) fn new(store: Arc<LocalStore>) -> Self {
        Self {
            store,
            _entity: PhantomData,
        }
    }

    /// Entity by id.
    pub fn get(&self, id: &str) -> SyncResult<Option<T>> {
        self.store
            .get(T::COLLECTION, id)
            .map(Row::into_entity)
            .transpose()
    }

    /// Every entity, ordered by id.
    pub fn get_all(&self) -> SyncResult<Vec<T>> {
        self.store
            .get_all(T::COLLECTION)
            .into_iter()
            .map(Row::into_entity)
            .collect()
    }

    /// Entities whose indexed field equals `value`.
    pub fn get_all_from_index(&self, index: &str, value: &str) -> SyncResult<Vec<T>> {
        self.store
            .get_all_from_index(T::COLLECTION, index, value)?
            .into_iter()
            .map(Row::into_entity)
            .collect()
    }

    /// Insert or replace one entity.
    pub fn put(&self, entity: &T) -> SyncResult<()> {
        self.store.put(T::COLLECTION, Row::from_entity(entity)?)
    }

    /// Replace the whole collection with `entities` in one transaction.
    pub fn replace_all(&self, entities: &[T]) -> SyncResult<()> {
        let rows = entities
            .iter()
            .map(Row::from_entity)
            .collect::<SyncResult<Vec<_>>>()?;
        self.store.transaction(T::COLLECTION, |txn| {
            txn.clear();
            for row in rows {
                txn.put(row)?;
            }
            Ok(())
        })
    }

    /// Remove one entity.
    pub fn delete(&self, id: &str) -> SyncResult<()> {
        self.store.delete(T::COLLECTION, id)
    }

    /// Number of stored entities.
    pub fn count(&self) -> usize {
        self.store.count(T::COLLECTION)
    }
}

impl<T> Clone for Table<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            _entity: PhantomData,
        }
    }
}
