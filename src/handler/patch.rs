//! Patch handler (chunked append)
//!
//! The correctness-critical protocol step: a chunk is accepted only when
//! the client's claimed offset equals the backend's current offset, and
//! nothing is written on a mismatch.

use super::{extract_upload_id, resolve_failure, run_success_hook, Failure, Hooks, ResponseWriter};
use crate::protocol::{HEADER_UPLOAD_OFFSET, OFFSET_OCTET_STREAM};
use crate::storage::DataStore;
use bytes::Bytes;
use futures::TryStreamExt;
use http_body_util::{BodyDataStream, Full};
use hyper::body::Body;
use hyper::{header, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::warn;

/// Handles `PATCH <mount>/<id>`: append a chunk at the claimed offset.
#[derive(Clone)]
pub struct PatchHandler {
    store: Arc<dyn DataStore>,
    mount_path: String,
    hooks: Hooks,
}

impl PatchHandler {
    pub fn new(store: Arc<dyn DataStore>, mount_path: impl Into<String>, hooks: Hooks) -> Self {
        Self {
            store,
            mount_path: mount_path.into(),
            hooks,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let id = match extract_upload_id(req.uri().path(), &self.mount_path) {
            Some(id) => id,
            None => return ResponseWriter::empty(StatusCode::NOT_FOUND),
        };

        let content_type = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        if content_type != OFFSET_OCTET_STREAM {
            warn!(id = %id, content_type = %content_type, "Incorrect Content-Type");
            return ResponseWriter::empty(StatusCode::FORBIDDEN);
        }

        let claimed_offset = match req
            .headers()
            .get(HEADER_UPLOAD_OFFSET)
            .and_then(|v| v.to_str().ok())
            .and_then(|raw| raw.trim().parse::<u64>().ok())
        {
            Some(offset) => offset,
            None => {
                warn!(id = %id, "Missing or non-numeric Upload-Offset");
                return ResponseWriter::empty(StatusCode::FORBIDDEN);
            }
        };

        match self.append_chunk(req, &id, claimed_offset).await {
            Ok(new_offset) => {
                crate::metrics::record_chunk_success(new_offset - claimed_offset);
                ResponseWriter::send(
                    StatusCode::NO_CONTENT,
                    &[(HEADER_UPLOAD_OFFSET, new_offset.to_string())],
                    "",
                )
            }
            Err(failure) => {
                crate::metrics::record_chunk_failure();
                resolve_failure(&self.hooks, failure)
            }
        }
    }

    async fn append_chunk<B>(
        &self,
        req: Request<B>,
        id: &str,
        claimed_offset: u64,
    ) -> Result<u64, Failure>
    where
        B: Body<Data = Bytes> + Send + 'static,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let current_offset = self.store.current_offset(id).await?;

        // A mismatch means the client lost track of its own progress, or a
        // duplicate/out-of-order request. Reject without touching storage.
        if current_offset != claimed_offset {
            warn!(
                id = %id,
                claimed = claimed_offset,
                current = current_offset,
                "Offset mismatch, append refused"
            );
            return Err(Failure::Status(StatusCode::CONFLICT));
        }

        let body = BodyDataStream::new(req.into_body())
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.into()));
        let new_offset = self
            .store
            .append(Box::pin(body), id, claimed_offset)
            .await?;

        run_success_hook(&self.hooks, id, self.store.base_location()).await?;
        Ok(new_offset)
    }
}
