//! Common test infrastructure
//!
//! An in-memory `DataStore` so handler tests can drive every status-code
//! branch without a filesystem or network, plus request-building helpers.

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http_body_util::Full;
use hyper::Request;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tsuzuki_uploadr::protocol::metadata::MetadataMap;
use tsuzuki_uploadr::storage::{BodyStream, DataStore, StoreError, UploadInfo};
use tsuzuki_uploadr::upload::Upload;

#[derive(Clone)]
struct StoredUpload {
    data: Vec<u8>,
    info: UploadInfo,
}

/// In-memory storage backend for handler tests.
#[derive(Default)]
pub struct InMemoryStore {
    uploads: Mutex<HashMap<String, StoredUpload>>,
    fail_appends: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent append fail with a backend error.
    pub fn fail_appends(&self) {
        self.fail_appends.store(true, Ordering::SeqCst);
    }

    /// Raw stored bytes for assertions.
    pub fn data(&self, id: &str) -> Option<Vec<u8>> {
        self.uploads
            .lock()
            .unwrap()
            .get(id)
            .map(|u| u.data.clone())
    }
}

#[async_trait]
impl DataStore for InMemoryStore {
    async fn create(&self, upload: &Upload) -> Result<(), StoreError> {
        let mut uploads = self.uploads.lock().unwrap();
        if uploads.contains_key(&upload.id) {
            return Err(StoreError::Conflict);
        }
        uploads.insert(
            upload.id.clone(),
            StoredUpload {
                data: Vec::new(),
                info: UploadInfo::from(upload),
            },
        );
        Ok(())
    }

    async fn append(&self, mut body: BodyStream, id: &str, offset: u64) -> Result<u64, StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("injected append failure".into()));
        }

        // Drain the stream before taking the lock.
        let mut incoming = Vec::new();
        while let Some(chunk) = body.next().await {
            incoming.extend_from_slice(&chunk?);
        }

        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads.get_mut(id).ok_or(StoreError::NotFound)?;
        upload.data.truncate(offset as usize);
        upload.data.extend_from_slice(&incoming);
        Ok(upload.data.len() as u64)
    }

    async fn current_offset(&self, id: &str) -> Result<u64, StoreError> {
        let uploads = self.uploads.lock().unwrap();
        uploads
            .get(id)
            .map(|u| u.data.len() as u64)
            .ok_or(StoreError::NotFound)
    }

    async fn save_metadata(&self, id: &str, metadata: &MetadataMap) -> Result<(), StoreError> {
        let mut uploads = self.uploads.lock().unwrap();
        let upload = uploads.get_mut(id).ok_or(StoreError::NotFound)?;
        upload.info.metadata = metadata.clone();
        Ok(())
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<UploadInfo>, StoreError> {
        let uploads = self.uploads.lock().unwrap();
        Ok(uploads.get(id).map(|u| u.info.clone()))
    }

    fn base_location(&self) -> String {
        "memory://uploads".to_string()
    }
}

/// Build a request with no body.
pub fn request(method: &str, uri: &str) -> Request<Full<Bytes>> {
    Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(Bytes::new()))
        .unwrap()
}

/// Build a request builder for adding headers and a body.
pub fn request_builder(method: &str, uri: &str) -> hyper::http::request::Builder {
    Request::builder().method(method).uri(uri)
}

/// Collect a response body into a string.
pub async fn body_text(response: hyper::Response<Full<Bytes>>) -> String {
    use http_body_util::BodyExt;
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}
