//! Per-resource handlers.
//!
//! Each resource module knows two things about its procedures: how to decode
//! a live payload into rows for the reconciler, and how to answer from the
//! local store when the network is unavailable. [`offline`] and
//! [`decode_list`] dispatch on the [`Procedure`].

pub mod artifacts;
pub mod edges;
pub mod files;
pub mod jobs;
pub mod search;
pub mod snapshots;
pub mod users;
pub mod versions;

use std::sync::Arc;

use notesync_core::{Entity, Row, SyncConfig, SyncError, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::{transformer, Procedure, ProcedureInput};
use serde_json::Value;

use crate::edge_index::EdgeIndex;
use crate::watermark::Watermarks;

/// What a handler may read while answering offline.
pub struct HandlerContext<'a> {
    /// The local store.
    pub store: &'a Arc<LocalStore>,
    /// Edge cache.
    pub edges: &'a EdgeIndex,
    /// Sync watermarks.
    pub watermarks: &'a Watermarks,
    /// Tunables (page size, staleness window).
    pub config: &'a SyncConfig,
}

/// Answer `procedure` from the local store.
///
/// Returns the payload that goes inside the success envelope. Cache misses
/// come back as `NotFound` / `StaleCache`.
pub fn offline(
    ctx: &HandlerContext<'_>,
    procedure: Procedure,
    input: &ProcedureInput,
) -> SyncResult<Value> {
    match (procedure, input) {
        (Procedure::GetArtifacts, _) => artifacts::offline_list(ctx.store),
        (Procedure::GetArtifactById, ProcedureInput::ById(by_id)) => {
            artifacts::offline_single(ctx.store, &by_id.id)
        }
        (Procedure::GetArtifactVersions, ProcedureInput::ById(by_id)) => {
            versions::offline(ctx.store, &by_id.id)
        }
        (Procedure::GetArtifactSnapshots, _) => snapshots::offline(ctx),
        (Procedure::GetEdgesForArtifactId, ProcedureInput::ById(by_id)) => {
            edges::offline(ctx.edges, &by_id.id)
        }
        (Procedure::GetJobs, ProcedureInput::Jobs(query)) => {
            jobs::offline(ctx.store, query, ctx.config.default_page_size)
        }
        (Procedure::GetKnownUsers, _) => users::offline(ctx.store),
        (Procedure::SearchArtifacts, ProcedureInput::Search(query)) => {
            search::offline(ctx.store, query)
        }
        (procedure, _) => Err(SyncError::internal(format!(
            "{procedure} has no offline reader for this input"
        ))),
    }
}

/// Decode a live list payload into rows for `procedure`'s collection.
pub fn decode_list(procedure: Procedure, data: Value) -> SyncResult<Vec<Row>> {
    match procedure {
        Procedure::GetArtifacts => artifacts::decode_list(data),
        Procedure::GetArtifactVersions => versions::decode(data),
        Procedure::GetArtifactSnapshots => snapshots::decode(data),
        Procedure::GetEdgesForArtifactId => edges::decode(data),
        Procedure::GetJobs => jobs::decode(data),
        Procedure::GetKnownUsers => users::decode(data),
        other => Err(SyncError::internal(format!("{other} is not a list procedure"))),
    }
}

/// Decode a live single-entity payload.
pub fn decode_single(procedure: Procedure, data: Value) -> SyncResult<Row> {
    match procedure {
        Procedure::GetArtifactById => artifacts::decode_single(data),
        other => Err(SyncError::internal(format!(
            "{other} is not a single-entity procedure"
        ))),
    }
}

/// Decode a JSON array into typed entities and back into rows.
///
/// Going through the entity type validates the payload and normalizes the
/// stored shape.
pub(crate) fn entity_rows<T: Entity>(
    data: Value,
    normalize: impl Fn(T) -> T,
) -> SyncResult<Vec<Row>> {
    let items: Vec<T> = transformer::deserialize(data)?;
    items
        .into_iter()
        .map(|item| Row::from_entity(&normalize(item)))
        .collect()
}

/// Serialize typed entities into a response payload.
pub(crate) fn payload<T: serde::Serialize>(items: &[T]) -> SyncResult<Value> {
    transformer::serialize(items)
}
