//! Head handler (offset/metadata query)
//!
//! Realizes resumption discovery: reports how many bytes are durably
//! stored, plus the declared length and client metadata when known.

use super::{extract_upload_id, resolve_failure, Hooks, ResponseWriter};
use crate::protocol::metadata;
use crate::protocol::{HEADER_UPLOAD_LENGTH, HEADER_UPLOAD_METADATA, HEADER_UPLOAD_OFFSET};
use crate::storage::DataStore;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Request, Response, StatusCode};
use std::sync::Arc;

/// Handles `HEAD <mount>/<id>`: report the current offset and metadata.
#[derive(Clone)]
pub struct HeadHandler {
    store: Arc<dyn DataStore>,
    mount_path: String,
    hooks: Hooks,
}

impl HeadHandler {
    pub fn new(store: Arc<dyn DataStore>, mount_path: impl Into<String>, hooks: Hooks) -> Self {
        Self {
            store,
            mount_path: mount_path.into(),
            hooks,
        }
    }

    pub async fn handle<B>(&self, req: Request<B>) -> Response<Full<Bytes>> {
        let id = match extract_upload_id(req.uri().path(), &self.mount_path) {
            Some(id) => id,
            None => return ResponseWriter::empty(StatusCode::NOT_FOUND),
        };

        let (offset, info) = match tokio::join!(
            self.store.current_offset(&id),
            self.store.get_metadata(&id)
        ) {
            (Ok(offset), Ok(info)) => (offset, info),
            (Err(e), _) | (_, Err(e)) => return resolve_failure(&self.hooks, e.into()),
        };

        // Clients and proxies must never cache the resumption cursor.
        let mut headers: Vec<(&str, String)> = vec![
            ("Cache-Control", "no-store".to_string()),
            (HEADER_UPLOAD_OFFSET, offset.to_string()),
        ];

        if let Some(info) = info {
            if let Some(length) = info.length {
                headers.push((HEADER_UPLOAD_LENGTH, length.to_string()));
            }
            if !info.metadata.is_empty() {
                headers.push((HEADER_UPLOAD_METADATA, metadata::encode(&info.metadata)));
            }
        }

        ResponseWriter::send(StatusCode::OK, &headers, "")
    }
}
