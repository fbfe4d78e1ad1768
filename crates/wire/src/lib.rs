//! Wire encoding for notesync
//!
//! Everything the sync core needs to understand intercepted traffic:
//! - http: request/response values (cloneable, persistable)
//! - transformer: JSON with `$date` / `$bytes` wrappers
//! - envelope: the `{"result":{"data":...}}` success envelope and cache marker
//! - procedure: the registry of intercepted procedures and their strategies
//! - input: decoding of the `input` query parameter and mutation bodies

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod envelope;
pub mod http;
pub mod input;
pub mod procedure;
pub mod transformer;

pub use envelope::{CACHE_HEADER, CACHE_HIT};
pub use http::{Headers, HttpRequest, HttpResponse, Method};
pub use input::{ByIdInput, JobsQuery, SearchInput, UploadFileInput};
pub use procedure::{Procedure, ProcedureInput, Strategy};
