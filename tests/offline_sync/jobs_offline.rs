//! `job.getJobs` served from the cache while offline.

use notesync::input::with_query_input;
use notesync::{Collection, HttpRequest, Outcome};
use serde_json::{json, Value};

use crate::test_utils::*;

fn jobs_url(input: Value) -> String {
    with_query_input("/api/job.getJobs", &input).unwrap()
}

fn seeded() -> Harness {
    let h = Harness::new();
    let jobs: Vec<Value> = (0..20)
        .map(|i| job(i, if i % 3 == 0 { "import" } else { "export" }))
        .collect();
    h.transport.respond("job.getJobs", Value::Array(jobs));
    h
}

#[tokio::test]
async fn export_jobs_newest_first_with_default_limit() {
    let h = seeded();
    h.client.fetch(HttpRequest::get("/api/job.getJobs")).await.unwrap();
    assert_eq!(h.client.store().count(Collection::Jobs), 20);

    h.offline();
    let outcome = h
        .client
        .route(HttpRequest::get(jobs_url(json!({"type": "export"}))))
        .await
        .unwrap();
    assert!(matches!(outcome, Outcome::Cached(_)));
    assert_eq!(
        ids(&data(outcome.response())),
        vec![
            "job-19", "job-17", "job-16", "job-14", "job-13", "job-11", "job-10", "job-08",
            "job-07", "job-05"
        ]
    );
}

#[tokio::test]
async fn offset_and_limit_slice_the_filtered_list() {
    let h = seeded();
    h.client.fetch(HttpRequest::get("/api/job.getJobs")).await.unwrap();
    h.offline();

    let rest = h
        .client
        .fetch(HttpRequest::get(jobs_url(json!({"type": "export", "offset": 10}))))
        .await
        .unwrap();
    assert_eq!(ids(&data(&rest)), vec!["job-04", "job-02", "job-01"]);

    let two = h
        .client
        .fetch(HttpRequest::get(jobs_url(json!({"type": "import", "limit": 2}))))
        .await
        .unwrap();
    assert_eq!(ids(&data(&two)), vec!["job-18", "job-15"]);
}

#[tokio::test]
async fn no_filter_lists_every_type() {
    let h = seeded();
    h.client.fetch(HttpRequest::get("/api/job.getJobs")).await.unwrap();
    h.offline();

    let all = h
        .client
        .fetch(HttpRequest::get(jobs_url(json!({"limit": 3}))))
        .await
        .unwrap();
    assert_eq!(ids(&data(&all)), vec!["job-19", "job-18", "job-17"]);
}

#[tokio::test]
async fn empty_cache_offline_lists_nothing() {
    let h = Harness::new();
    h.offline();
    let response = h
        .client
        .fetch(HttpRequest::get(jobs_url(json!({"type": "export"}))))
        .await
        .unwrap();
    assert_eq!(data(&response), json!([]));
}
