//! A cached answer carries the same payload as the live answer it came from.

use notesync::input::with_query_input;
use notesync::{envelope, HttpRequest, Outcome, SyncError};
use serde_json::json;

use crate::test_utils::*;

async fn live_then_cached(h: &Harness, url: &str) -> (serde_json::Value, serde_json::Value) {
    h.online();
    let live = h.client.route(HttpRequest::get(url)).await.unwrap();
    assert!(live.is_network());
    h.offline();
    let cached = h.client.route(HttpRequest::get(url)).await.unwrap();
    assert!(matches!(cached, Outcome::Cached(_)));
    assert!(envelope::is_cached(cached.response()));
    (data(live.response()), data(cached.response()))
}

#[tokio::test]
async fn artifact_list_matches() {
    let h = Harness::new();
    h.transport.respond(
        "artifact.getArtifacts",
        json!([
            artifact("a3", "Newest", 30),
            artifact("a2", "Middle", 20),
            artifact("a1", "Oldest", 10),
        ]),
    );
    let (live, cached) = live_then_cached(&h, "/api/artifact.getArtifacts").await;
    assert_eq!(live, cached);
}

#[tokio::test]
async fn single_artifact_matches() {
    let h = Harness::new();
    h.transport
        .respond("artifact.getArtifactById", artifact("a1", "Plans", 1));
    let url = with_query_input("/api/artifact.getArtifactById", &json!({"id": "a1"})).unwrap();
    let (live, cached) = live_then_cached(&h, &url).await;
    assert_eq!(live, cached);
}

#[tokio::test]
async fn versions_match_within_their_artifact() {
    let h = Harness::new();
    h.transport.respond(
        "artifact.getArtifactVersions",
        json!([version("v2", "a1", 2), version("v1", "a1", 1)]),
    );
    let url = with_query_input("/api/artifact.getArtifactVersions", &json!({"id": "a1"})).unwrap();
    let (live, cached) = live_then_cached(&h, &url).await;
    assert_eq!(live, cached);

    let other = with_query_input("/api/artifact.getArtifactVersions", &json!({"id": "a2"})).unwrap();
    let empty = h.client.fetch(HttpRequest::get(other)).await.unwrap();
    assert_eq!(data(&empty), json!([]));
}

#[tokio::test]
async fn absolute_api_urls_are_intercepted_too() {
    let h = Harness::new();
    let base = h.client.config().api_base_url.clone();
    h.transport.respond(
        "artifact.getArtifacts",
        json!([artifact("a1", "Plans", 1)]),
    );
    let url = format!("{base}/artifact.getArtifacts");
    let (live, cached) = live_then_cached(&h, &url).await;
    assert_eq!(live, cached);
}

#[tokio::test]
async fn cache_miss_surfaces_the_network_error() {
    let h = Harness::new();
    h.offline();
    let url = with_query_input("/api/artifact.getArtifactById", &json!({"id": "nope"})).unwrap();
    let err = h.client.fetch(HttpRequest::get(url)).await.unwrap_err();
    assert!(matches!(err, SyncError::Network { .. }));
}

#[tokio::test]
async fn missing_id_fails_without_touching_the_network() {
    let h = Harness::new();
    let err = h
        .client
        .fetch(HttpRequest::get("/api/artifact.getArtifactById"))
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::MissingInput { .. }));
    assert!(h.transport.requests().is_empty());
}
