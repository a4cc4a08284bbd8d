//! S3 storage backend
//!
//! Same contract as [`FileStore`](super::FileStore), backed by an
//! S3-compatible bucket (custom endpoint and static credentials supported,
//! so MinIO-style deployments work unchanged).
//!
//! S3 has no positional append, so offset-addressed chunks are realized as
//! **multipart-upload composition**: `create` initiates a multipart upload,
//! each accepted chunk is staged to a local temp file and uploaded as the
//! next part, and the upload is completed once the declared length is
//! reached. A `<id>.json` sidecar object carries the [`UploadInfo`] record
//! plus the multipart state (upload id, part list, current offset); the
//! sidecar's offset is authoritative because uncompleted parts are not
//! visible through object metadata.
//!
//! Constraint of this strategy: every non-final chunk must meet the S3
//! minimum part size (5 MiB). Deferred-length uploads accumulate parts but
//! can never complete, since no supported operation declares the length
//! after creation; aborting them is an external lifecycle concern.

use super::{BodyStream, DataStore, StoreError, UploadInfo};
use crate::protocol::metadata::MetadataMap;
use crate::upload::Upload;
use async_trait::async_trait;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::Region;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{CompletedMultipartUpload, CompletedPart};
use aws_sdk_s3::Client;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// S3 minimum size for any part other than the last.
const MIN_PART_SIZE: u64 = 5 * 1024 * 1024;

/// S3 store configuration
#[derive(Debug, Clone)]
pub struct S3StoreConfig {
    pub bucket: String,
    pub region: String,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
}

/// Store using an S3-compatible bucket.
pub struct S3Store {
    client: Client,
    bucket: String,
    region: String,
    endpoint: Option<String>,
}

/// Multipart bookkeeping persisted in the `<id>.json` sidecar object.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct S3UploadState {
    info: UploadInfo,
    multipart_id: Option<String>,
    parts: Vec<PartRecord>,
    offset: u64,
    completed: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PartRecord {
    number: i32,
    etag: String,
    size: u64,
}

impl S3UploadState {
    fn new(info: UploadInfo, multipart_id: Option<String>) -> Self {
        Self {
            info,
            multipart_id,
            parts: Vec::new(),
            offset: 0,
            completed: false,
        }
    }

    fn next_part_number(&self) -> i32 {
        self.parts.len() as i32 + 1
    }

    fn record_part(&mut self, etag: String, size: u64) {
        self.parts.push(PartRecord {
            number: self.next_part_number(),
            etag,
            size,
        });
        self.offset += size;
    }

    /// Whether the declared length has been reached. Deferred-length
    /// uploads never report complete.
    fn is_complete(&self) -> bool {
        self.info.length == Some(self.offset)
    }
}

impl S3Store {
    /// Build a store from configuration. Explicit credentials take
    /// precedence; otherwise the ambient AWS credential chain applies.
    pub async fn new(config: S3StoreConfig) -> Result<Self, StoreError> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "tsuzuki-config",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &config.endpoint {
            // Path-style addressing for S3-compatible endpoints (MinIO etc.)
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
            bucket: config.bucket,
            region: config.region,
            endpoint: config.endpoint,
        })
    }

    fn info_key(id: &str) -> String {
        format!("{}.json", id)
    }

    /// True if no object exists under `key`.
    async fn key_is_free(&self, key: &str) -> Result<bool, StoreError> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(_) => Ok(false),
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_not_found() {
                    Ok(true)
                } else {
                    Err(StoreError::Backend(format!(
                        "head_object {}: {}",
                        key, service_err
                    )))
                }
            }
        }
    }

    async fn load_state(&self, id: &str) -> Result<Option<S3UploadState>, StoreError> {
        let output = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(Self::info_key(id))
            .send()
            .await
        {
            Ok(output) => output,
            Err(e) => {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    return Ok(None);
                }
                return Err(StoreError::Backend(format!(
                    "get_object {}: {}",
                    Self::info_key(id),
                    service_err
                )));
            }
        };

        let raw = output
            .body
            .collect()
            .await
            .map_err(|e| StoreError::Backend(format!("read sidecar for {}: {}", id, e)))?
            .into_bytes();

        let state = serde_json::from_slice(&raw)
            .map_err(|e| StoreError::Backend(format!("Corrupt sidecar for {}: {}", id, e)))?;
        Ok(Some(state))
    }

    async fn save_state(&self, id: &str, state: &S3UploadState) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(state)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize sidecar: {}", e)))?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(Self::info_key(id))
            .content_type("application/json")
            .body(ByteStream::from(raw))
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("put_object {}: {}", Self::info_key(id), e)))?;
        Ok(())
    }

    /// Drain the body into a temp file so the part has a known length and
    /// memory stays bounded by the write buffer, not the chunk.
    async fn stage_chunk(mut body: BodyStream) -> Result<(NamedTempFile, u64), StoreError> {
        let temp = NamedTempFile::new()?;
        let mut file = tokio::fs::File::from_std(temp.reopen()?);

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok((temp, written))
    }

    async fn complete_multipart(
        &self,
        id: &str,
        multipart_id: &str,
        parts: &[PartRecord],
    ) -> Result<(), StoreError> {
        let completed_parts: Vec<CompletedPart> = parts
            .iter()
            .map(|p| {
                CompletedPart::builder()
                    .part_number(p.number)
                    .e_tag(&p.etag)
                    .build()
            })
            .collect();

        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(id)
            .upload_id(multipart_id)
            .multipart_upload(
                CompletedMultipartUpload::builder()
                    .set_parts(Some(completed_parts))
                    .build(),
            )
            .send()
            .await
            .map_err(|e| {
                StoreError::Backend(format!("complete_multipart_upload {}: {}", id, e))
            })?;

        info!(id = %id, parts = parts.len(), "Completed multipart upload");
        Ok(())
    }
}

#[async_trait]
impl DataStore for S3Store {
    async fn create(&self, upload: &Upload) -> Result<(), StoreError> {
        if !self.key_is_free(&Self::info_key(&upload.id)).await?
            || !self.key_is_free(&upload.id).await?
        {
            warn!(id = %upload.id, "Create refused, upload already exists");
            return Err(StoreError::Conflict);
        }

        let info = UploadInfo::from(upload);

        // A declared length of zero needs no parts; materialize the empty
        // object immediately so it is queryable right away.
        let state = if upload.length == Some(0) {
            self.client
                .put_object()
                .bucket(&self.bucket)
                .key(&upload.id)
                .body(ByteStream::from_static(b""))
                .send()
                .await
                .map_err(|e| StoreError::Backend(format!("put_object {}: {}", upload.id, e)))?;
            let mut state = S3UploadState::new(info, None);
            state.completed = true;
            state
        } else {
            let output = self
                .client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(&upload.id)
                .send()
                .await
                .map_err(|e| {
                    StoreError::Backend(format!("create_multipart_upload {}: {}", upload.id, e))
                })?;

            let multipart_id = output
                .upload_id()
                .ok_or_else(|| {
                    StoreError::Backend("create_multipart_upload returned no upload id".into())
                })?
                .to_string();
            S3UploadState::new(info, Some(multipart_id))
        };

        self.save_state(&upload.id, &state).await?;

        info!(id = %upload.id, bucket = %self.bucket, "Created upload");
        Ok(())
    }

    async fn append(&self, body: BodyStream, id: &str, offset: u64) -> Result<u64, StoreError> {
        let mut state = self.load_state(id).await?.ok_or(StoreError::NotFound)?;

        // Cheap re-validation against the persisted state; the handler has
        // already checked, but a stale caller must not grow the part list.
        if state.offset != offset {
            return Err(StoreError::Conflict);
        }
        let multipart_id = state
            .multipart_id
            .clone()
            .ok_or_else(|| StoreError::Backend(format!("Upload {} is already complete", id)))?;

        let (temp, written) = Self::stage_chunk(body).await?;

        let will_complete = state.info.length == Some(offset + written);
        if !will_complete && written < MIN_PART_SIZE {
            warn!(
                id = %id,
                bytes = written,
                "Non-final chunk below the S3 minimum part size; completion will fail"
            );
        }

        let part_body = ByteStream::from_path(temp.path())
            .await
            .map_err(|e| StoreError::Backend(format!("stage read {}: {}", id, e)))?;

        let part_number = state.next_part_number();
        let output = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(id)
            .upload_id(&multipart_id)
            .part_number(part_number)
            .body(part_body)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("upload_part {}: {}", id, e)))?;

        let etag = output.e_tag().unwrap_or_default().to_string();
        state.record_part(etag, written);

        if state.is_complete() {
            self.complete_multipart(id, &multipart_id, &state.parts)
                .await?;
            state.completed = true;
            state.multipart_id = None;
        }

        self.save_state(id, &state).await?;

        info!(
            id = %id,
            bytes = written,
            offset = state.offset,
            part = part_number,
            "Appended chunk to upload"
        );
        Ok(state.offset)
    }

    async fn current_offset(&self, id: &str) -> Result<u64, StoreError> {
        let state = self.load_state(id).await?.ok_or(StoreError::NotFound)?;
        Ok(state.offset)
    }

    async fn save_metadata(&self, id: &str, metadata: &MetadataMap) -> Result<(), StoreError> {
        let mut state = self.load_state(id).await?.ok_or(StoreError::NotFound)?;
        state.info.metadata = metadata.clone();
        self.save_state(id, &state).await
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<UploadInfo>, StoreError> {
        Ok(self.load_state(id).await?.map(|state| state.info))
    }

    fn base_location(&self) -> String {
        match &self.endpoint {
            Some(endpoint) => format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket),
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}
