//! Reconciler: writes live responses into the local store.
//!
//! A list response replaces what the store holds for that list in one
//! transaction, so a concurrent offline reader sees the old list or the new
//! one, never a partial clear. Refreshing twice with the same payload leaves
//! the store in the same state.
//!
//! List failures are returned to the caller. Single-entity failures are
//! logged and swallowed: the live response is still good, and the next fetch
//! will try again.

use std::sync::Arc;

use notesync_core::{Collection, Row, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::{envelope, Procedure, ProcedureInput};

use crate::edge_index::EdgeIndex;
use crate::handlers::{self, edges, versions};
use crate::watermark::Watermarks;

/// Which rows a list response replaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListScope {
    /// The whole collection.
    Full,
    /// Rows whose `index` equals `value`.
    Index {
        /// Index name.
        index: &'static str,
        /// Indexed value.
        value: String,
    },
    /// Edges leaving or entering one artifact.
    Edges {
        /// The artifact.
        artifact_id: String,
    },
}

impl ListScope {
    /// Scope of `procedure`'s list for this input.
    pub fn of(procedure: Procedure, input: &ProcedureInput) -> Self {
        match (procedure, input) {
            (Procedure::GetArtifactVersions, ProcedureInput::ById(by_id)) => ListScope::Index {
                index: versions::SCOPE_INDEX,
                value: by_id.id.clone(),
            },
            (Procedure::GetEdgesForArtifactId, ProcedureInput::ById(by_id)) => ListScope::Edges {
                artifact_id: by_id.id.clone(),
            },
            _ => ListScope::Full,
        }
    }
}

/// Applies live payloads to the store.
#[derive(Clone)]
pub struct Reconciler {
    store: Arc<LocalStore>,
    edges: Arc<EdgeIndex>,
    watermarks: Watermarks,
}

impl Reconciler {
    /// Reconciler over `store`, keeping `edges` and `watermarks` in step.
    pub fn new(store: Arc<LocalStore>, edges: Arc<EdgeIndex>, watermarks: Watermarks) -> Self {
        Self {
            store,
            edges,
            watermarks,
        }
    }

    /// Replace the list `procedure` returned with the rows in `body`.
    ///
    /// Returns the number of rows written.
    pub fn apply_list(
        &self,
        procedure: Procedure,
        input: &ProcedureInput,
        body: &[u8],
    ) -> SyncResult<usize> {
        let data = envelope::unwrap_body(body)?;
        let rows = handlers::decode_list(procedure, data)?;
        let count = rows.len();
        let collection = procedure.collection();
        let scope = ListScope::of(procedure, input);

        let edge_set = match &scope {
            ListScope::Edges { artifact_id } => Some((artifact_id.clone(), edges::split(artifact_id, &rows)?)),
            _ => None,
        };

        self.replace(collection, &scope, rows)?;
        self.watermarks.mark(collection)?;

        if let Some((artifact_id, set)) = edge_set {
            self.edges
                .provide_static_edges_for_artifact_id(&artifact_id, set.outgoing, set.incoming);
        }

        tracing::debug!(
            target: "notesync::reconciler",
            procedure = %procedure,
            collection = %collection,
            rows = count,
            "Refreshed cached list"
        );
        Ok(count)
    }

    /// Upsert the entity in `body`. Failures are logged, never returned.
    pub fn apply_single(&self, procedure: Procedure, body: &[u8]) {
        let result = envelope::unwrap_body(body)
            .and_then(|data| handlers::decode_single(procedure, data))
            .and_then(|row| self.store.put(procedure.collection(), row));
        if let Err(e) = result {
            tracing::warn!(
                target: "notesync::reconciler",
                procedure = %procedure,
                error = %e,
                "Failed to cache entity"
            );
        }
    }

    /// Replace `scope` of `collection` with `rows` in one transaction.
    pub fn replace(&self, collection: Collection, scope: &ListScope, rows: Vec<Row>) -> SyncResult<()> {
        self.store.transaction(collection, |txn| {
            match scope {
                ListScope::Full => txn.clear(),
                ListScope::Index { index, value } => {
                    for row in txn.get_all_from_index(index, value)? {
                        txn.delete(row.id());
                    }
                }
                ListScope::Edges { artifact_id } => {
                    let mut stale = txn.get_all_from_index("artifactId", artifact_id)?;
                    stale.extend(txn.get_all_from_index("targetArtifactId", artifact_id)?);
                    for row in stale {
                        txn.delete(row.id());
                    }
                }
            }
            for row in rows {
                txn.put(row)?;
            }
            Ok(())
        })
    }
}
