//! `user.getKnownUsers`.

use std::sync::Arc;

use notesync_core::{KnownUser, Row, SyncResult};
use notesync_storage::LocalStore;
use serde_json::Value;

use super::{entity_rows, payload};

/// Every cached user.
pub fn offline(store: &Arc<LocalStore>) -> SyncResult<Value> {
    payload(&store.table::<KnownUser>().get_all()?)
}

/// Rows of a live payload.
pub fn decode(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<KnownUser>(data, |u| u)
}
