//! `search.searchArtifacts`.
//!
//! Search runs against an external index the sync core does not own; it is
//! reached through [`SearchProvider`]. Offline, a case-insensitive title
//! match over cached artifacts stands in.

use std::sync::Arc;

use async_trait::async_trait;
use notesync_core::{ArtifactSummary, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::SearchInput;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payload;

/// Hits returned when the caller gives no limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 20;

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchHit {
    /// Artifact id.
    pub id: String,
    /// Artifact title.
    pub title: String,
    /// Relevance, higher is better.
    pub score: f64,
}

/// Full-text search capability.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `limit` artifacts matching `query`, best first.
    async fn search(&self, query: &str, limit: usize) -> SyncResult<Vec<SearchHit>>;
}

/// Title substring matches over cached artifacts.
pub fn offline(store: &Arc<LocalStore>, input: &SearchInput) -> SyncResult<Value> {
    let needle = input.query.trim().to_lowercase();
    let limit = input.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    let mut artifacts = store.table::<ArtifactSummary>().get_all()?;
    super::artifacts::sort_recent_first(&mut artifacts);

    let hits: Vec<SearchHit> = artifacts
        .into_iter()
        .filter(|a| !needle.is_empty() && a.title.to_lowercase().contains(&needle))
        .take(limit)
        .map(|a| SearchHit {
            id: a.id,
            title: a.title,
            score: 1.0,
        })
        .collect();
    payload(&hits)
}
