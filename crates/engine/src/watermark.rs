//! Sync watermarks.
//!
//! `lastSyncedAt` per collection, kept in the store's scalar area. A list
//! refresh stamps its collection; offline reads of time-sensitive
//! collections check the stamp against a validity window.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use notesync_core::{Clock, Collection, SyncError, SyncResult};
use notesync_storage::LocalStore;

const KEY_PREFIX: &str = "lastSyncedAt:";

/// Scalar key of a collection's watermark.
pub fn watermark_key(collection: Collection) -> String {
    format!("{KEY_PREFIX}{collection}")
}

/// Reads and writes per-collection watermarks.
#[derive(Clone)]
pub struct Watermarks {
    store: Arc<LocalStore>,
    clock: Arc<dyn Clock>,
}

impl Watermarks {
    /// Watermarks stored in `store`, stamped with `clock`.
    pub fn new(store: Arc<LocalStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Record that `collection` was refreshed now.
    pub fn mark(&self, collection: Collection) -> SyncResult<DateTime<Utc>> {
        let now = self.clock.now();
        self.store.put_scalar(&watermark_key(collection), &now)?;
        Ok(now)
    }

    /// When `collection` was last refreshed, if ever.
    pub fn last_synced_at(&self, collection: Collection) -> SyncResult<Option<DateTime<Utc>>> {
        self.store.get_scalar(&watermark_key(collection))
    }

    /// Fail with `StaleCache` unless `collection` was refreshed within `window`.
    pub fn ensure_fresh(&self, collection: Collection, window: Duration) -> SyncResult<()> {
        let now = self.clock.now();
        match self.last_synced_at(collection)? {
            Some(at) if now.signed_duration_since(at) <= window => Ok(()),
            Some(at) => Err(SyncError::StaleCache {
                collection: collection.to_string(),
                age_days: now.signed_duration_since(at).num_days(),
            }),
            None => Err(SyncError::StaleCache {
                collection: collection.to_string(),
                age_days: -1,
            }),
        }
    }

    /// Forget `collection`'s watermark.
    pub fn reset(&self, collection: Collection) -> SyncResult<()> {
        self.store
            .delete(Collection::KeyVal, &watermark_key(collection))
    }

    /// Current time of the injected clock.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use notesync_core::ManualClock;

    fn setup() -> (Watermarks, Arc<ManualClock>) {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = Arc::new(ManualClock::new(start));
        let marks = Watermarks::new(LocalStore::ephemeral(), clock.clone());
        (marks, clock)
    }

    #[test]
    fn never_synced_is_stale() {
        let (marks, _) = setup();
        let err = marks
            .ensure_fresh(Collection::ArtifactSnapshots, Duration::days(30))
            .unwrap_err();
        assert!(err.is_cache_miss());
    }

    #[test]
    fn freshness_follows_window() {
        let (marks, clock) = setup();
        marks.mark(Collection::ArtifactSnapshots).unwrap();

        clock.advance(Duration::days(29));
        marks
            .ensure_fresh(Collection::ArtifactSnapshots, Duration::days(30))
            .unwrap();

        clock.advance(Duration::days(2));
        let err = marks
            .ensure_fresh(Collection::ArtifactSnapshots, Duration::days(30))
            .unwrap_err();
        assert!(matches!(err, SyncError::StaleCache { age_days: 31, .. }));
    }

    #[test]
    fn reset_forgets() {
        let (marks, _) = setup();
        marks.mark(Collection::Jobs).unwrap();
        assert!(marks.last_synced_at(Collection::Jobs).unwrap().is_some());
        marks.reset(Collection::Jobs).unwrap();
        assert!(marks.last_synced_at(Collection::Jobs).unwrap().is_none());
    }
}
