//! Create handler (POST)
//!
//! Realizes upload creation: validates the declared length headers, decodes
//! client metadata, resolves the resource id, and creates the empty
//! resource through the storage contract.

use super::{resolve_failure, run_success_hook, Failure, Hooks, ResponseWriter};
use crate::protocol::metadata::{self, MetadataMap};
use crate::protocol::{
    is_valid_upload_id, HEADER_UPLOAD_DEFER_LENGTH, HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_METADATA,
};
use crate::storage::DataStore;
use crate::upload::Upload;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{header, Request, Response, StatusCode};
use std::sync::Arc;
use tracing::info;

/// Handles `POST <mount>`: create a new upload resource.
#[derive(Clone)]
pub struct CreateHandler {
    store: Arc<dyn DataStore>,
    mount_path: String,
    /// Server-chosen id override. Takes precedence over the client
    /// metadata's `filename`.
    filename: Option<String>,
    hooks: Hooks,
}

impl CreateHandler {
    pub fn new(
        store: Arc<dyn DataStore>,
        mount_path: impl Into<String>,
        filename: Option<String>,
        hooks: Hooks,
    ) -> Self {
        Self {
            store,
            mount_path: mount_path.into(),
            filename,
            hooks,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let headers = req.headers();
        let length_header = headers
            .get(HEADER_UPLOAD_LENGTH)
            .and_then(|v| v.to_str().ok());
        let defer_header = headers
            .get(HEADER_UPLOAD_DEFER_LENGTH)
            .and_then(|v| v.to_str().ok());

        // The request must carry exactly one of the two length headers.
        match (length_header, defer_header) {
            (None, None) => {
                return ResponseWriter::text(
                    StatusCode::BAD_REQUEST,
                    "Upload-Length or Upload-Defer-Length required",
                )
            }
            (Some(_), Some(_)) => {
                return ResponseWriter::text(
                    StatusCode::BAD_REQUEST,
                    "Upload-Length and Upload-Defer-Length are mutually exclusive",
                )
            }
            _ => {}
        }

        let length = match length_header {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(n) => Some(n),
                Err(_) => {
                    return ResponseWriter::text(
                        StatusCode::BAD_REQUEST,
                        "Upload-Length must be non-negative",
                    )
                }
            },
            None => None,
        };

        if let Some(defer) = defer_header {
            if defer != "1" {
                return ResponseWriter::text(
                    StatusCode::BAD_REQUEST,
                    "Upload-Defer-Length must be 1",
                );
            }
        }

        let metadata = match headers
            .get(HEADER_UPLOAD_METADATA)
            .and_then(|v| v.to_str().ok())
        {
            Some(raw) => match metadata::decode(raw) {
                Ok(decoded) => decoded,
                Err(e) => {
                    return ResponseWriter::text(
                        StatusCode::BAD_REQUEST,
                        &format!("Invalid Upload-Metadata: {}", e),
                    )
                }
            },
            None => MetadataMap::new(),
        };

        let mut upload = Upload::new(length);
        if let Some(name) = &self.filename {
            upload.id = name.clone();
        } else if let Some(name) = metadata.get("filename") {
            // The client should have provided the filename through
            // metadata per the protocol; it only wins when the server has
            // not chosen one itself.
            upload.id = name.clone();
        }

        // Overrides come from outside; anything beyond the id alphabet
        // would also escape the storage directory.
        if !is_valid_upload_id(&upload.id) {
            return ResponseWriter::text(StatusCode::BAD_REQUEST, "Invalid upload id");
        }

        let host = headers
            .get(header::HOST)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        match self.create_upload(&upload, &metadata).await {
            Ok(()) => {
                crate::metrics::record_upload_created();
                info!(id = %upload.id, length = ?upload.length, "Upload created");

                let location = match host {
                    Some(host) => {
                        format!("http://{}{}/{}", host, self.mount_path, upload.id)
                    }
                    None => format!("{}/{}", self.mount_path, upload.id),
                };
                ResponseWriter::send(
                    StatusCode::CREATED,
                    &[("Location", location)],
                    "",
                )
            }
            Err(failure) => resolve_failure(&self.hooks, failure),
        }
    }

    /// Create first so a conflicting id leaves nothing behind, then persist
    /// the decoded mapping, then let the success hook run.
    async fn create_upload(
        &self,
        upload: &Upload,
        metadata: &MetadataMap,
    ) -> Result<(), Failure> {
        self.store.create(upload).await?;

        if !metadata.is_empty() {
            self.store.save_metadata(&upload.id, metadata).await?;
        }

        run_success_hook(&self.hooks, &upload.id, self.store.base_location()).await?;
        Ok(())
    }
}
