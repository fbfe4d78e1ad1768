//! Mutations captured offline are replayed once each, in capture order.

use std::sync::Arc;

use chrono::Duration;
use notesync::{HttpRequest, LocalStore, MockTransport, Outcome, QUEUED_STATUS};
use serde_json::json;
use tempfile::TempDir;

use crate::test_utils::*;

fn post(procedure: &str, body: serde_json::Value) -> HttpRequest {
    HttpRequest::post_json(format!("/api/{procedure}"), &body).unwrap()
}

fn sent_ids(transport: &MockTransport) -> Vec<String> {
    transport
        .requests()
        .iter()
        .map(|r| r.json_body().unwrap().unwrap()["id"].as_str().unwrap().to_string())
        .collect()
}

#[tokio::test]
async fn offline_mutation_answers_queued() {
    let h = Harness::new();
    h.offline();
    let outcome = h
        .client
        .route(post("artifact.updateArtifact", json!({"id": "a1", "title": "x"})))
        .await
        .unwrap();
    let Outcome::Queued { write, response } = outcome else {
        panic!("expected a queued outcome");
    };
    assert_eq!(response.status, QUEUED_STATUS);
    assert_eq!(write.entity_id.as_deref(), Some("a1"));
    let body = data(&response);
    assert_eq!(body["queued"], true);
    assert_eq!(body["sequence"], write.sequence);
}

#[tokio::test]
async fn mixed_mutations_replay_in_capture_order_after_restart() {
    let dir = TempDir::new().unwrap();
    let transport = Arc::new(MockTransport::new());
    let clock = clock();
    transport.set_online(false);
    {
        let h = Harness::with_store(
            LocalStore::open(dir.path()).unwrap(),
            transport.clone(),
            clock.clone(),
        );
        h.client
            .fetch(post("artifact.createArtifact", json!({"id": "a1"})))
            .await
            .unwrap();
        h.client
            .fetch(post("artifact.updateArtifact", json!({"id": "a2"})))
            .await
            .unwrap();
        h.client
            .fetch(post("artifact.deleteArtifact", json!({"id": "a3"})))
            .await
            .unwrap();
    }

    let h = Harness::with_store(LocalStore::open(dir.path()).unwrap(), transport, clock);
    h.online();
    for p in [
        "artifact.createArtifact",
        "artifact.updateArtifact",
        "artifact.deleteArtifact",
    ] {
        h.transport.respond(p, json!({"ok": true}));
    }
    let report = h.client.replay_pending().await.unwrap();
    assert_eq!(report.replayed, 3);
    assert_eq!(sent_ids(&h.transport), vec!["a1", "a2", "a3"]);

    h.client.replay_pending().await.unwrap();
    assert_eq!(h.transport.requests().len(), 3);
}

#[tokio::test]
async fn replay_pauses_while_still_offline() {
    let h = Harness::new();
    h.offline();
    h.client
        .fetch(post("artifact.createArtifact", json!({"id": "a1"})))
        .await
        .unwrap();
    let report = h.client.replay_pending().await.unwrap();
    assert_eq!(report.replayed, 0);
    assert_eq!(report.failed, 0);
    assert_eq!(report.remaining, 1);
    assert_eq!(h.client.queue().pending().unwrap()[0].attempts, 0);
}

#[tokio::test]
async fn failing_head_blocks_the_queue_until_its_backoff_elapses() {
    let h = Harness::new();
    h.offline();
    h.client
        .fetch(post("artifact.updateArtifact", json!({"id": "a1"})))
        .await
        .unwrap();
    h.client
        .fetch(post("artifact.createArtifact", json!({"id": "a2"})))
        .await
        .unwrap();

    h.online();
    h.transport.respond_status("artifact.updateArtifact", 500);
    h.transport.respond("artifact.createArtifact", json!({"ok": true}));

    let first = h.client.replay_pending().await.unwrap();
    assert_eq!(first.failed, 1);
    assert_eq!(first.remaining, 2);
    assert_eq!(h.transport.sent_to("artifact.createArtifact"), 0);

    // Still inside the backoff window: nothing is sent.
    let held = h.client.replay_pending().await.unwrap();
    assert_eq!(held, notesync::ReplayReport { remaining: 2, ..Default::default() });
    assert_eq!(h.transport.sent_to("artifact.updateArtifact"), 1);

    h.transport.respond("artifact.updateArtifact", json!({"ok": true}));
    h.clock.advance(Duration::seconds(1));
    let done = h.client.replay_pending().await.unwrap();
    assert_eq!(done.replayed, 2);
    assert_eq!(sent_ids(&h.transport), vec!["a1", "a1", "a2"]);
}

#[tokio::test]
async fn permanently_failing_item_is_dropped_after_max_attempts() {
    let h = Harness::new();
    let max = h.client.config().queue.max_attempts;
    h.offline();
    h.client
        .fetch(post("artifact.deleteArtifact", json!({"id": "gone"})))
        .await
        .unwrap();
    h.client
        .fetch(post("artifact.createArtifact", json!({"id": "a2"})))
        .await
        .unwrap();

    h.online();
    h.transport.respond_status("artifact.deleteArtifact", 422);
    h.transport.respond("artifact.createArtifact", json!({"ok": true}));

    let mut dropped = 0;
    for _ in 0..max {
        let report = h.client.replay_pending().await.unwrap();
        dropped += report.dropped;
        h.clock.advance(Duration::hours(1));
    }
    assert_eq!(dropped, 1);
    assert_eq!(h.transport.sent_to("artifact.deleteArtifact"), max as usize);
    assert_eq!(h.transport.sent_to("artifact.createArtifact"), 1);
    assert!(h.client.queue().is_empty());
}
