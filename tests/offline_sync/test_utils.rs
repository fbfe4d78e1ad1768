//! Shared fixtures for the offline sync suite.

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use notesync::{LocalStore, ManualClock, MockTransport, OfflineClient, SyncConfig};
use serde_json::{json, Value};

/// A client over an in-memory or on-disk store, a mock transport and a
/// pinned clock.
pub struct Harness {
    pub client: OfflineClient,
    pub transport: Arc<MockTransport>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(LocalStore::ephemeral(), Arc::new(MockTransport::new()), clock())
    }

    pub fn with_store(
        store: Arc<LocalStore>,
        transport: Arc<MockTransport>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let client = OfflineClient::with_store(
            SyncConfig::default(),
            store,
            transport.clone(),
            clock.clone(),
        )
        .unwrap();
        Self {
            client,
            transport,
            clock,
        }
    }

    pub fn offline(&self) {
        self.transport.set_online(false);
    }

    pub fn online(&self) {
        self.transport.set_online(true);
    }
}

pub fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(epoch()))
}

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
}

pub fn date(at: DateTime<Utc>) -> Value {
    notesync::transformer::date_value(&at)
}

pub fn job(i: i64, job_type: &str) -> Value {
    let at = epoch() + Duration::hours(i);
    json!({
        "id": format!("job-{i:02}"),
        "type": job_type,
        "status": "done",
        "progress": 100,
        "createdAt": date(at),
        "updatedAt": date(at),
    })
}

pub fn artifact(id: &str, title: &str, hours: i64) -> Value {
    let at = epoch() + Duration::hours(hours);
    json!({
        "id": id,
        "userId": "u1",
        "title": title,
        "type": "tiptap",
        "pinned": false,
        "createdAt": date(epoch()),
        "updatedAt": date(at),
    })
}

pub fn version(id: &str, artifact_id: &str, n: u32) -> Value {
    json!({
        "id": id,
        "artifactId": artifact_id,
        "version": n,
        "title": format!("v{n}"),
        "createdAt": date(epoch() + Duration::hours(n as i64)),
        "updatedAt": date(epoch() + Duration::hours(n as i64)),
    })
}

pub fn snapshot(id: &str) -> Value {
    json!({
        "id": id,
        "title": id,
        "type": "tiptap",
        "body": notesync::transformer::bytes_value(b"doc"),
        "updatedAt": date(epoch()),
    })
}

/// Payload inside a response's success envelope.
pub fn data(response: &notesync::HttpResponse) -> Value {
    notesync::envelope::unwrap_body(&response.body).unwrap()
}

/// `id` of every element of a JSON array.
pub fn ids(data: &Value) -> Vec<String> {
    data.as_array()
        .unwrap()
        .iter()
        .map(|v| v["id"].as_str().unwrap().to_string())
        .collect()
}
