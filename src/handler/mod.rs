//! Protocol handlers
//!
//! One handler per protocol step: create (POST), head (offset/metadata
//! query), patch (chunked append). Handlers are stateless; each holds the
//! storage contract, the mount path, and the optional hooks, and every
//! response they emit goes through the [`ResponseWriter`].

use crate::protocol::is_valid_upload_id;
use crate::storage::StoreError;
use bytes::Bytes;
use futures::future::BoxFuture;
use http_body_util::Full;
use hyper::{Response, StatusCode};
use std::sync::Arc;
use tracing::error;

pub mod create;
pub mod head;
pub mod patch;
pub mod response;

pub use create::CreateHandler;
pub use head::HeadHandler;
pub use patch::PatchHandler;
pub use response::ResponseWriter;

/// Called after a successful create or append, before the response is
/// written. Receives the upload id and the backend's base location. An
/// error here is routed through the ordinary failure path.
pub type SuccessHook =
    Arc<dyn Fn(String, String) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Called for non-numeric failures with the error and the status the
/// handler would otherwise answer with; whatever it returns becomes the
/// response.
pub type ErrorHook =
    Arc<dyn Fn(&anyhow::Error, StatusCode) -> Response<Full<Bytes>> + Send + Sync>;

/// Optional per-deployment callbacks shared by the handlers.
#[derive(Clone, Default)]
pub struct Hooks {
    pub on_success: Option<SuccessHook>,
    pub on_error: Option<ErrorHook>,
}

/// A handler failure: either a bare status that propagates straight through
/// to the response, or a structured error that the error hook may intercept
/// before the 500 fallback.
#[derive(Debug)]
pub enum Failure {
    Status(StatusCode),
    Error(anyhow::Error),
}

impl From<StoreError> for Failure {
    fn from(err: StoreError) -> Self {
        match err.status() {
            Some(status) => Failure::Status(status),
            None => Failure::Error(err.into()),
        }
    }
}

/// Turn a failure into the response, giving the error hook first refusal
/// on structured errors.
pub(crate) fn resolve_failure(hooks: &Hooks, failure: Failure) -> Response<Full<Bytes>> {
    match failure {
        Failure::Status(status) => ResponseWriter::empty(status),
        Failure::Error(err) => {
            crate::metrics::record_error("handler");
            match &hooks.on_error {
                Some(hook) => hook(&err, StatusCode::INTERNAL_SERVER_ERROR),
                None => {
                    error!(error = %err, "Request failed");
                    ResponseWriter::empty(StatusCode::INTERNAL_SERVER_ERROR)
                }
            }
        }
    }
}

/// Await the success hook, if configured. Hook errors flow through the
/// same failure path as everything else instead of crashing the request.
pub(crate) async fn run_success_hook(
    hooks: &Hooks,
    id: &str,
    base_location: String,
) -> Result<(), Failure> {
    if let Some(hook) = &hooks.on_success {
        hook(id.to_string(), base_location)
            .await
            .map_err(Failure::Error)?;
    }
    Ok(())
}

/// Extract the upload id from the path component after the mount path.
///
/// Accepts an optional trailing slash; the segment must match the upload-id
/// alphabet and nothing may follow it.
pub(crate) fn extract_upload_id(path: &str, mount_path: &str) -> Option<String> {
    let rest = path.strip_prefix(mount_path)?.strip_prefix('/')?;
    let id = rest.strip_suffix('/').unwrap_or(rest);
    if is_valid_upload_id(id) {
        Some(id.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_upload_id() {
        assert_eq!(
            extract_upload_id("/files/abc-123", "/files").as_deref(),
            Some("abc-123")
        );
        assert_eq!(
            extract_upload_id("/files/abc/", "/files").as_deref(),
            Some("abc")
        );
    }

    #[test]
    fn test_extract_upload_id_rejects_bad_paths() {
        assert!(extract_upload_id("/files", "/files").is_none());
        assert!(extract_upload_id("/files/", "/files").is_none());
        assert!(extract_upload_id("/other/abc", "/files").is_none());
        assert!(extract_upload_id("/files/a/b", "/files").is_none());
        assert!(extract_upload_id("/files/..%2Fescape", "/files").is_none());
    }

    #[test]
    fn test_store_errors_with_numeric_mapping_propagate() {
        match Failure::from(StoreError::Conflict) {
            Failure::Status(status) => assert_eq!(status, StatusCode::CONFLICT),
            Failure::Error(_) => panic!("expected bare status"),
        }
        match Failure::from(StoreError::Backend("boom".into())) {
            Failure::Error(_) => {}
            Failure::Status(_) => panic!("expected structured error"),
        }
    }
}
