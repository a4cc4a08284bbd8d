//! Storage backends
//!
//! The `DataStore` trait is the capability contract every backend must
//! satisfy: atomic creation, offset-addressed append, offset query, and
//! sidecar metadata persistence. Handlers depend only on this contract; the
//! backend is selected at configuration time.

use crate::protocol::metadata::MetadataMap;
use crate::upload::Upload;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::Stream;
use hyper::StatusCode;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use thiserror::Error;

pub mod file;
pub mod s3;

pub use file::FileStore;
pub use s3::S3Store;

/// Incoming request body, consumed incrementally. Never buffered whole, so
/// upload size is not bounded by memory.
pub type BodyStream = Pin<Box<dyn Stream<Item = std::io::Result<Bytes>> + Send>>;

/// Storage operation errors
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Upload already exists")]
    Conflict,

    #[error("Upload not found")]
    NotFound,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl StoreError {
    /// The HTTP status this failure carries on its own, if any.
    ///
    /// `Conflict` and `NotFound` map 1:1 and propagate straight through to
    /// the response; `Io`/`Backend` are structured failures that handlers
    /// route through the error hook before falling back to 500.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            StoreError::Conflict => Some(StatusCode::CONFLICT),
            StoreError::NotFound => Some(StatusCode::NOT_FOUND),
            StoreError::Io(_) | StoreError::Backend(_) => None,
        }
    }
}

/// The sidecar record persisted alongside each upload.
///
/// Declared length and creation time live here, on the resource record
/// itself; the free-form client metadata is the nested map and is the only
/// part ever re-emitted through `Upload-Metadata`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInfo {
    pub length: Option<u64>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub metadata: MetadataMap,
}

impl From<&Upload> for UploadInfo {
    fn from(upload: &Upload) -> Self {
        Self {
            length: upload.length,
            created_at: upload.created_at,
            metadata: MetadataMap::new(),
        }
    }
}

/// Capability contract for upload storage.
///
/// All operations are async and touch only the named resource. Backends are
/// not required to provide mutual exclusion between concurrent appends to
/// the same id; callers serialize appends per id, and the offset-match check
/// in the append handler is the only guard.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Allocate durable storage for a new, empty resource.
    ///
    /// Fails with [`StoreError::Conflict`] if storage already exists for
    /// this id, without overwriting anything. Also persists the initial
    /// sidecar record (empty metadata) so the declared length is durably
    /// attached to the resource.
    async fn create(&self, upload: &Upload) -> Result<(), StoreError>;

    /// Consume a byte stream and durably append it starting at `offset`.
    ///
    /// Returns the resulting total offset. The caller has already confirmed
    /// `offset` equals the current offset; a backend may re-validate. On
    /// failure, previously stored bytes are left intact.
    async fn append(&self, body: BodyStream, id: &str, offset: u64) -> Result<u64, StoreError>;

    /// Size in bytes of the data stored for `id`.
    async fn current_offset(&self, id: &str) -> Result<u64, StoreError>;

    /// Persist the metadata mapping for `id`, replacing any prior value.
    async fn save_metadata(&self, id: &str, metadata: &MetadataMap) -> Result<(), StoreError>;

    /// The previously persisted sidecar record for `id`, if any.
    async fn get_metadata(&self, id: &str) -> Result<Option<UploadInfo>, StoreError>;

    /// Where this backend stores data: a directory path or a bucket URL.
    /// Passed to success hooks so callers can locate finished uploads.
    fn base_location(&self) -> String;
}
