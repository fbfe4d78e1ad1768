//! Procedure registry.
//!
//! Every intercepted call is one [`Procedure`]. The enum is the routing
//! table: it knows each procedure's wire name, HTTP method, caching
//! [`Strategy`], backing collection and the shape of its input.

use std::fmt;
use std::str::FromStr;

use notesync_core::{Collection, SyncConfig, SyncError, SyncResult};
use serde_json::Value;

use crate::http::{HttpRequest, Method};
use crate::input::{self, ByIdInput, JobsQuery, SearchInput, UploadFileInput};

/// How a procedure interacts with the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Network first; a 2xx replaces a collection (or scope); offline reads
    /// every matching row.
    List,
    /// Network first; a 2xx upserts one row; offline reads it back by id.
    Single,
    /// Sent when online, queued for replay when not.
    Mutation,
    /// Answered by an injected provider with a store-backed fallback.
    Passthrough,
}

/// An intercepted procedure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Procedure {
    /// `artifact.getArtifacts`
    GetArtifacts,
    /// `artifact.getArtifactById`
    GetArtifactById,
    /// `artifact.getArtifactVersions`
    GetArtifactVersions,
    /// `artifact.getArtifactSnapshots`
    GetArtifactSnapshots,
    /// `artifact.getEdgesForArtifactId`
    GetEdgesForArtifactId,
    /// `job.getJobs`
    GetJobs,
    /// `user.getKnownUsers`
    GetKnownUsers,
    /// `search.searchArtifacts`
    SearchArtifacts,
    /// `file.uploadFile`
    UploadFile,
    /// `artifact.createArtifact`
    CreateArtifact,
    /// `artifact.updateArtifact`
    UpdateArtifact,
    /// `artifact.deleteArtifact`
    DeleteArtifact,
}

impl Procedure {
    /// Every procedure.
    pub const ALL: [Procedure; 12] = [
        Procedure::GetArtifacts,
        Procedure::GetArtifactById,
        Procedure::GetArtifactVersions,
        Procedure::GetArtifactSnapshots,
        Procedure::GetEdgesForArtifactId,
        Procedure::GetJobs,
        Procedure::GetKnownUsers,
        Procedure::SearchArtifacts,
        Procedure::UploadFile,
        Procedure::CreateArtifact,
        Procedure::UpdateArtifact,
        Procedure::DeleteArtifact,
    ];

    /// Dotted wire name.
    pub fn name(&self) -> &'static str {
        match self {
            Procedure::GetArtifacts => "artifact.getArtifacts",
            Procedure::GetArtifactById => "artifact.getArtifactById",
            Procedure::GetArtifactVersions => "artifact.getArtifactVersions",
            Procedure::GetArtifactSnapshots => "artifact.getArtifactSnapshots",
            Procedure::GetEdgesForArtifactId => "artifact.getEdgesForArtifactId",
            Procedure::GetJobs => "job.getJobs",
            Procedure::GetKnownUsers => "user.getKnownUsers",
            Procedure::SearchArtifacts => "search.searchArtifacts",
            Procedure::UploadFile => "file.uploadFile",
            Procedure::CreateArtifact => "artifact.createArtifact",
            Procedure::UpdateArtifact => "artifact.updateArtifact",
            Procedure::DeleteArtifact => "artifact.deleteArtifact",
        }
    }

    /// Caching strategy.
    pub fn strategy(&self) -> Strategy {
        match self {
            Procedure::GetArtifactById => Strategy::Single,
            Procedure::GetArtifacts
            | Procedure::GetArtifactVersions
            | Procedure::GetArtifactSnapshots
            | Procedure::GetEdgesForArtifactId
            | Procedure::GetJobs
            | Procedure::GetKnownUsers => Strategy::List,
            Procedure::SearchArtifacts => Strategy::Passthrough,
            Procedure::UploadFile
            | Procedure::CreateArtifact
            | Procedure::UpdateArtifact
            | Procedure::DeleteArtifact => Strategy::Mutation,
        }
    }

    /// Collection the procedure reads or optimistically writes.
    pub fn collection(&self) -> Collection {
        match self {
            Procedure::GetArtifacts
            | Procedure::GetArtifactById
            | Procedure::SearchArtifacts
            | Procedure::CreateArtifact
            | Procedure::UpdateArtifact
            | Procedure::DeleteArtifact => Collection::Artifacts,
            Procedure::GetArtifactVersions => Collection::ArtifactVersions,
            Procedure::GetArtifactSnapshots => Collection::ArtifactSnapshots,
            Procedure::GetEdgesForArtifactId => Collection::Edges,
            Procedure::GetJobs => Collection::Jobs,
            Procedure::GetKnownUsers => Collection::KnownUsers,
            Procedure::UploadFile => Collection::PendingFiles,
        }
    }

    /// HTTP method the procedure is called with.
    pub fn method(&self) -> Method {
        match self.strategy() {
            Strategy::Mutation => Method::Post,
            _ => Method::Get,
        }
    }

    /// Whether a list response replaces only the rows of one artifact.
    pub fn is_scoped(&self) -> bool {
        matches!(
            self,
            Procedure::GetArtifactVersions | Procedure::GetEdgesForArtifactId
        )
    }

    /// Match a request against the registry.
    ///
    /// The URL must sit under the configured API base or the same-origin API
    /// prefix, followed by a known dotted name, and use that procedure's
    /// method. Anything else is not intercepted.
    pub fn match_request(request: &HttpRequest, config: &SyncConfig) -> Option<Procedure> {
        let name = procedure_name(&request.url, config)?;
        let procedure = name.parse::<Procedure>().ok()?;
        (procedure.method() == request.method).then_some(procedure)
    }

    /// Decode this procedure's input from a request.
    pub fn parse_input(&self, request: &HttpRequest) -> SyncResult<ProcedureInput> {
        let raw = input::raw_input(request)?;
        self.input_from(raw)
    }

    /// Decode this procedure's input from an already extracted value.
    pub fn input_from(&self, raw: Option<Value>) -> SyncResult<ProcedureInput> {
        let name = self.name();
        match self {
            Procedure::GetArtifacts
            | Procedure::GetArtifactSnapshots
            | Procedure::GetKnownUsers => Ok(ProcedureInput::None),
            Procedure::GetArtifactById
            | Procedure::GetArtifactVersions
            | Procedure::GetEdgesForArtifactId => {
                let id = input::require_str(name, raw.as_ref(), "id")?;
                Ok(ProcedureInput::ById(ByIdInput { id: id.to_string() }))
            }
            Procedure::GetJobs => match raw {
                Some(Value::Null) | None => Ok(ProcedureInput::Jobs(JobsQuery::default())),
                Some(value) => serde_json::from_value(value)
                    .map(ProcedureInput::Jobs)
                    .map_err(|e| SyncError::invalid_input(format!("{name}: {e}"))),
            },
            Procedure::SearchArtifacts => {
                input::require_str(name, raw.as_ref(), "query")?;
                serde_json::from_value(raw.unwrap_or(Value::Null))
                    .map(ProcedureInput::Search)
                    .map_err(|e| SyncError::invalid_input(format!("{name}: {e}")))
            }
            Procedure::UploadFile => {
                input::require_str(name, raw.as_ref(), "id")?;
                input::require_str(name, raw.as_ref(), "artifactId")?;
                serde_json::from_value(raw.unwrap_or(Value::Null))
                    .map(ProcedureInput::UploadFile)
                    .map_err(|e| SyncError::invalid_input(format!("{name}: {e}")))
            }
            Procedure::CreateArtifact | Procedure::UpdateArtifact | Procedure::DeleteArtifact => {
                input::require_str(name, raw.as_ref(), "id")?;
                Ok(ProcedureInput::Mutation(raw.unwrap_or(Value::Null)))
            }
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Procedure {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Procedure::ALL
            .iter()
            .copied()
            .find(|p| p.name() == s)
            .ok_or_else(|| SyncError::invalid_input(format!("unknown procedure {s:?}")))
    }
}

/// Typed input of a matched procedure.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcedureInput {
    /// No input.
    None,
    /// One artifact id.
    ById(ByIdInput),
    /// Job listing filter and page.
    Jobs(JobsQuery),
    /// Search query.
    Search(SearchInput),
    /// File upload metadata.
    UploadFile(UploadFileInput),
    /// Opaque mutation input carrying at least an `id`.
    Mutation(Value),
}

impl ProcedureInput {
    /// Entity id the input addresses, if any.
    pub fn entity_id(&self) -> Option<&str> {
        match self {
            ProcedureInput::ById(input) => Some(&input.id),
            ProcedureInput::UploadFile(input) => Some(&input.id),
            ProcedureInput::Mutation(value) => value.get("id").and_then(Value::as_str),
            ProcedureInput::None | ProcedureInput::Jobs(_) | ProcedureInput::Search(_) => None,
        }
    }
}

/// Dotted procedure name of a URL under the API base or prefix.
pub fn procedure_name(url: &str, config: &SyncConfig) -> Option<String> {
    let parsed = input::parse_url(url).ok()?;
    let path = parsed.path();

    let rest = if url.starts_with('/') {
        path.strip_prefix(config.api_prefix.trim_end_matches('/'))?
    } else {
        let base = input::parse_url(&config.api_base_url).ok()?;
        if parsed.origin() != base.origin() {
            return None;
        }
        path.strip_prefix(base.path().trim_end_matches('/'))?
    };
    let name = rest.strip_prefix('/')?;
    let mut parts = name.split('.');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(resource), Some(action), None) if !resource.is_empty() && !action.is_empty() => {
            Some(name.to_string())
        }
        _ => None,
    }
}
