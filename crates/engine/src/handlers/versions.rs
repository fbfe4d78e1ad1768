//! `artifact.getArtifactVersions`: versions of one artifact.

use std::sync::Arc;

use notesync_core::{ArtifactVersion, Row, SyncResult};
use notesync_storage::LocalStore;
use serde_json::Value;

use super::{entity_rows, payload};

/// Index the versions collection is scoped by.
pub const SCOPE_INDEX: &str = "artifactId";

/// Cached versions of `artifact_id`, newest first.
pub fn offline(store: &Arc<LocalStore>, artifact_id: &str) -> SyncResult<Value> {
    let mut versions = store
        .table::<ArtifactVersion>()
        .get_all_from_index(SCOPE_INDEX, artifact_id)?;
    versions.sort_by(|a, b| {
        b.version
            .cmp(&a.version)
            .then_with(|| b.updated_at.cmp(&a.updated_at))
    });
    payload(&versions)
}

/// Rows of a live payload.
pub fn decode(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<ArtifactVersion>(data, |v| v)
}
