//! Snapshots are only served offline while their last refresh is recent.

use chrono::Duration;
use notesync::{Collection, HttpRequest, SyncError};
use serde_json::json;

use crate::test_utils::*;

const SNAPSHOTS: &str = "/api/artifact.getArtifactSnapshots";

#[tokio::test]
async fn never_synced_snapshots_are_not_served() {
    let h = Harness::new();
    // Rows present, but never confirmed by a refresh.
    h.client
        .store()
        .put(
            Collection::ArtifactSnapshots,
            notesync::Row::new(snapshot("a1")).unwrap(),
        )
        .unwrap();
    h.offline();
    let err = h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.unwrap_err();
    assert!(matches!(err, SyncError::Network { .. }));
}

#[tokio::test]
async fn fresh_snapshots_are_served_until_the_window_closes() {
    let h = Harness::new();
    h.transport
        .respond("artifact.getArtifactSnapshots", json!([snapshot("a1")]));
    h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.unwrap();
    h.offline();

    h.clock.advance(Duration::days(30) - Duration::minutes(1));
    let served = h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.unwrap();
    assert_eq!(ids(&data(&served)), vec!["a1"]);

    h.clock.advance(Duration::minutes(2));
    assert!(h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.is_err());
}

#[tokio::test]
async fn refresh_reopens_the_window() {
    let h = Harness::new();
    h.transport
        .respond("artifact.getArtifactSnapshots", json!([snapshot("a1")]));
    h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.unwrap();

    h.clock.advance(Duration::days(45));
    h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.unwrap();

    h.offline();
    assert!(h.client.fetch(HttpRequest::get(SNAPSHOTS)).await.is_ok());
}

#[tokio::test]
async fn other_collections_are_not_gated() {
    let h = Harness::new();
    h.transport
        .respond("artifact.getArtifacts", json!([artifact("a1", "Plans", 1)]));
    h.client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();
    h.offline();
    h.clock.advance(Duration::days(365));
    let served = h
        .client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();
    assert_eq!(ids(&data(&served)), vec!["a1"]);
}
