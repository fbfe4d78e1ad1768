//! `artifact.getArtifacts` and `artifact.getArtifactById`.

use std::sync::Arc;

use notesync_core::{ArtifactSummary, Collection, Row, SyncError, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::transformer;
use serde_json::Value;

use super::{entity_rows, payload};

/// Every cached artifact, most recently updated first.
pub fn offline_list(store: &Arc<LocalStore>) -> SyncResult<Value> {
    let mut artifacts = store.table::<ArtifactSummary>().get_all()?;
    sort_recent_first(&mut artifacts);
    payload(&artifacts)
}

/// One cached artifact by id.
pub fn offline_single(store: &Arc<LocalStore>, id: &str) -> SyncResult<Value> {
    store
        .get(Collection::Artifacts, id)
        .map(Row::into_value)
        .ok_or_else(|| SyncError::not_found(Collection::Artifacts.as_str(), id))
}

/// Rows of a live `getArtifacts` payload.
pub fn decode_list(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<ArtifactSummary>(data, |a| a)
}

/// Row of a live `getArtifactById` payload.
pub fn decode_single(data: Value) -> SyncResult<Row> {
    let artifact: ArtifactSummary = transformer::deserialize(data)?;
    Row::from_entity(&artifact)
}

pub(crate) fn sort_recent_first(artifacts: &mut [ArtifactSummary]) {
    artifacts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
}
