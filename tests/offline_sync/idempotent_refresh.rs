//! Refreshing with the same payload leaves the store as it was, and edge ids
//! depend only on the identifying tuple.

use notesync::input::with_query_input;
use notesync::{Collection, Edge, EdgeInit, HttpRequest, Row};
use proptest::prelude::*;
use serde_json::json;

use crate::test_utils::*;

fn sorted(mut rows: Vec<Row>) -> Vec<Row> {
    rows.sort_by(|a, b| a.id().cmp(b.id()));
    rows
}

#[tokio::test]
async fn repeated_list_refresh_is_a_fixed_point() {
    let h = Harness::new();
    h.transport.respond(
        "artifact.getArtifacts",
        json!([artifact("a1", "One", 1), artifact("a2", "Two", 2)]),
    );
    h.client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();
    let first = sorted(h.client.store().get_all(Collection::Artifacts));

    h.client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();
    let second = sorted(h.client.store().get_all(Collection::Artifacts));
    assert_eq!(first, second);
    assert_eq!(first.len(), 2);
}

#[tokio::test]
async fn list_refresh_drops_rows_the_server_no_longer_returns() {
    let h = Harness::new();
    h.transport.respond(
        "artifact.getArtifacts",
        json!([artifact("a1", "One", 1), artifact("a2", "Two", 2)]),
    );
    h.client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();

    h.transport
        .respond("artifact.getArtifacts", json!([artifact("a2", "Two", 3)]));
    h.client
        .fetch(HttpRequest::get("/api/artifact.getArtifacts"))
        .await
        .unwrap();

    assert!(h.client.store().get(Collection::Artifacts, "a1").is_none());
    assert_eq!(h.client.store().count(Collection::Artifacts), 1);
}

#[tokio::test]
async fn scoped_refresh_only_replaces_its_scope() {
    let h = Harness::new();
    let url = |id: &str| {
        with_query_input("/api/artifact.getArtifactVersions", &json!({"id": id})).unwrap()
    };
    h.transport.respond(
        "artifact.getArtifactVersions",
        json!([version("v1", "a1", 1)]),
    );
    h.client.fetch(HttpRequest::get(url("a1"))).await.unwrap();
    h.transport.respond(
        "artifact.getArtifactVersions",
        json!([version("w1", "a2", 1)]),
    );
    h.client.fetch(HttpRequest::get(url("a2"))).await.unwrap();

    assert_eq!(h.client.store().count(Collection::ArtifactVersions), 2);
}

#[tokio::test]
async fn edges_from_either_side_collapse_onto_one_row() {
    let h = Harness::new();
    let edge = json!({
        "id": "", "artifactId": "a1", "artifactBlockId": "",
        "targetArtifactId": "a2", "targetArtifactTitle": "Two"
    });
    h.transport
        .respond("artifact.getEdgesForArtifactId", json!([edge.clone()]));
    for id in ["a1", "a2"] {
        let url =
            with_query_input("/api/artifact.getEdgesForArtifactId", &json!({"id": id})).unwrap();
        h.client.fetch(HttpRequest::get(url)).await.unwrap();
    }
    assert_eq!(h.client.store().count(Collection::Edges), 1);
}

fn part() -> impl Strategy<Value = String> {
    "[a-z0-9:~%-]{0,6}"
}

proptest! {
    #[test]
    fn edge_id_depends_only_on_the_identifying_tuple(
        source in "[a-z0-9]{1,6}",
        source_block in part(),
        target in "[a-z0-9]{1,6}",
        target_block in part(),
        title_a in "[A-Za-z ]{0,8}",
        title_b in "[A-Za-z ]{0,8}",
    ) {
        let init = |title: String| EdgeInit {
            artifact_id: source.clone(),
            artifact_block_id: Some(source_block.clone()),
            target_artifact_id: target.clone(),
            target_artifact_block_id: Some(target_block.clone()),
            target_artifact_date: None,
            artifact_title: title.clone(),
            target_artifact_title: Some(title),
        };
        let a = Edge::new(init(title_a));
        let b = Edge::new(init(title_b));
        prop_assert_eq!(&a.id, &b.id);
        prop_assert_eq!(a.clone().normalized().id, a.id);
    }

    #[test]
    fn distinct_tuples_get_distinct_ids(
        a in prop::collection::vec(part(), 3),
        b in prop::collection::vec(part(), 3),
    ) {
        let edge = |p: &[String]| Edge::new(EdgeInit {
            artifact_id: format!("s{}", p[0]),
            artifact_block_id: Some(p[1].clone()),
            target_artifact_id: format!("t{}", p[2]),
            ..Default::default()
        });
        let (ea, eb) = (edge(&a), edge(&b));
        let same_tuple = ea.artifact_id == eb.artifact_id
            && ea.artifact_block_id == eb.artifact_block_id
            && ea.target_artifact_id == eb.target_artifact_id;
        prop_assert_eq!(ea.id == eb.id, same_tuple);
    }
}
