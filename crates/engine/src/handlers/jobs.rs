//! `job.getJobs`: filtered, sorted, paginated job listing.

use std::sync::Arc;

use notesync_core::{JobSummary, Row, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::JobsQuery;
use serde_json::Value;

use super::{entity_rows, payload};

/// Cached jobs matching `query`: filtered by `type`, newest `createdAt` first,
/// sliced to `[offset, offset + limit)`. `limit` falls back to `default_limit`.
pub fn offline(
    store: &Arc<LocalStore>,
    query: &JobsQuery,
    default_limit: usize,
) -> SyncResult<Value> {
    let table = store.table::<JobSummary>();
    let mut jobs = match query.job_type.as_deref() {
        Some(job_type) if !job_type.is_empty() => table.get_all_from_index("type", job_type)?,
        _ => table.get_all()?,
    };
    jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

    let offset = query.offset.unwrap_or(0);
    let limit = query.limit.unwrap_or(default_limit);
    let page: Vec<JobSummary> = jobs.into_iter().skip(offset).take(limit).collect();
    payload(&page)
}

/// Rows of a live payload.
pub fn decode(data: Value) -> SyncResult<Vec<Row>> {
    entity_rows::<JobSummary>(data, |j| j)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};

    fn seed(store: &Arc<LocalStore>) {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let table = store.table::<JobSummary>();
        for i in 0..15 {
            let at = base + Duration::hours(i);
            table
                .put(&JobSummary {
                    id: format!("job-{i:02}"),
                    job_type: if i % 3 == 0 { "import" } else { "export" }.into(),
                    status: "done".into(),
                    progress: 100,
                    created_at: at,
                    updated_at: at,
                })
                .unwrap();
        }
    }

    fn ids(data: &Value) -> Vec<String> {
        data.as_array()
            .unwrap()
            .iter()
            .map(|j| j["id"].as_str().unwrap().to_string())
            .collect()
    }

    #[test]
    fn filters_sorts_and_pages() {
        let store = LocalStore::ephemeral();
        seed(&store);
        let query = JobsQuery {
            job_type: Some("export".into()),
            offset: Some(2),
            limit: Some(3),
        };
        let data = offline(&store, &query, 10).unwrap();
        // exports newest first: 14, 13, 11, 10, 8, ...
        assert_eq!(ids(&data), vec!["job-11", "job-10", "job-08"]);
    }

    #[test]
    fn default_limit_applies() {
        let store = LocalStore::ephemeral();
        seed(&store);
        let data = offline(&store, &JobsQuery::default(), 10).unwrap();
        let got = ids(&data);
        assert_eq!(got.len(), 10);
        assert_eq!(got[0], "job-14");
    }

    #[test]
    fn offset_past_end_is_empty() {
        let store = LocalStore::ephemeral();
        seed(&store);
        let query = JobsQuery {
            offset: Some(100),
            ..JobsQuery::default()
        };
        assert!(ids(&offline(&store, &query, 10).unwrap()).is_empty());
    }
}
