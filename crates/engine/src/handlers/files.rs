//! `file.uploadFile`: optimistic file rows.
//!
//! An upload made while offline is visible locally at once as a
//! `PendingFile` with status `staged`. When the server confirms the upload
//! (live or on replay) the row flips to `confirmed`.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use notesync_core::{FileStatus, PendingFile, SyncResult};
use notesync_storage::LocalStore;
use notesync_wire::UploadFileInput;

/// Write (or overwrite) the file row for `input` with `status`.
pub fn record(
    store: &Arc<LocalStore>,
    input: &UploadFileInput,
    status: FileStatus,
    at: DateTime<Utc>,
) -> SyncResult<PendingFile> {
    let file = PendingFile {
        id: input.id.clone(),
        artifact_id: input.artifact_id.clone(),
        name: input.name.clone(),
        mime_type: input.mime_type.clone(),
        size: input.size,
        status,
        created_at: at,
    };
    store.table::<PendingFile>().put(&file)?;
    Ok(file)
}

/// Mark a staged file confirmed. Unknown ids are ignored.
pub fn confirm(store: &Arc<LocalStore>, id: &str) -> SyncResult<bool> {
    let table = store.table::<PendingFile>();
    match table.get(id)? {
        Some(mut file) if file.status != FileStatus::Confirmed => {
            file.status = FileStatus::Confirmed;
            table.put(&file)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Files still waiting for the server.
pub fn staged(store: &Arc<LocalStore>) -> SyncResult<Vec<PendingFile>> {
    store
        .table::<PendingFile>()
        .get_all_from_index("status", "staged")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(id: &str) -> UploadFileInput {
        UploadFileInput {
            id: id.into(),
            artifact_id: "a1".into(),
            name: "photo.png".into(),
            mime_type: "image/png".into(),
            size: 1024,
        }
    }

    #[test]
    fn staged_then_confirmed() {
        let store = LocalStore::ephemeral();
        record(&store, &input("f1"), FileStatus::Staged, Utc::now()).unwrap();
        record(&store, &input("f2"), FileStatus::Staged, Utc::now()).unwrap();
        assert_eq!(staged(&store).unwrap().len(), 2);

        assert!(confirm(&store, "f1").unwrap());
        assert!(!confirm(&store, "f1").unwrap());
        assert!(!confirm(&store, "missing").unwrap());

        let left: Vec<String> = staged(&store).unwrap().into_iter().map(|f| f.id).collect();
        assert_eq!(left, vec!["f2"]);
    }
}
