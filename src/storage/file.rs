//! Filesystem storage backend
//!
//! One data file per upload plus a `<id>.json` sidecar holding the
//! [`UploadInfo`] record. The data file's size is the authoritative offset.

use super::{BodyStream, DataStore, StoreError, UploadInfo};
use crate::protocol::metadata::MetadataMap;
use crate::upload::Upload;
use async_trait::async_trait;
use futures::StreamExt;
use std::io::ErrorKind;
use std::path::PathBuf;
use tokio::fs::{self, OpenOptions};
use tokio::io::{AsyncSeekExt, AsyncWriteExt, SeekFrom};
use tracing::{info, warn};

/// Store using the local filesystem.
pub struct FileStore {
    directory: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `directory`, creating it if missing.
    /// A directory that already exists is not an error.
    pub async fn new(directory: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let directory = directory.into();
        fs::create_dir_all(&directory).await?;
        Ok(Self { directory })
    }

    fn data_path(&self, id: &str) -> PathBuf {
        self.directory.join(id)
    }

    fn info_path(&self, id: &str) -> PathBuf {
        self.directory.join(format!("{}.json", id))
    }

    async fn read_info(&self, id: &str) -> Result<Option<UploadInfo>, StoreError> {
        match fs::read(self.info_path(id)).await {
            Ok(raw) => {
                let info = serde_json::from_slice(&raw)
                    .map_err(|e| StoreError::Backend(format!("Corrupt sidecar for {}: {}", id, e)))?;
                Ok(Some(info))
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_info(&self, id: &str, info: &UploadInfo) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(info)
            .map_err(|e| StoreError::Backend(format!("Failed to serialize sidecar: {}", e)))?;
        fs::write(self.info_path(id), raw).await?;
        Ok(())
    }
}

#[async_trait]
impl DataStore for FileStore {
    async fn create(&self, upload: &Upload) -> Result<(), StoreError> {
        // create_new materializes the zero-byte file atomically; an id that
        // is already taken surfaces as AlreadyExists before anything is
        // overwritten.
        let path = self.data_path(&upload.id);
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(id = %upload.id, "Create refused, upload already exists");
                return Err(StoreError::Conflict);
            }
            Err(e) => return Err(e.into()),
        }

        self.write_info(&upload.id, &UploadInfo::from(upload)).await?;

        info!(id = %upload.id, path = %path.display(), "Created empty upload");
        Ok(())
    }

    async fn append(&self, mut body: BodyStream, id: &str, offset: u64) -> Result<u64, StoreError> {
        let path = self.data_path(id);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .await
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => StoreError::NotFound,
                _ => StoreError::Io(e),
            })?;

        file.seek(SeekFrom::Start(offset)).await?;

        let mut written: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        let new_offset = offset + written;
        info!(
            id = %id,
            bytes = written,
            offset = new_offset,
            "Appended chunk to upload"
        );
        Ok(new_offset)
    }

    async fn current_offset(&self, id: &str) -> Result<u64, StoreError> {
        match fs::metadata(self.data_path(id)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(id = %id, "No upload found");
                Err(StoreError::NotFound)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save_metadata(&self, id: &str, metadata: &MetadataMap) -> Result<(), StoreError> {
        let mut info = self.read_info(id).await?.ok_or(StoreError::NotFound)?;
        info.metadata = metadata.clone();
        self.write_info(id, &info).await
    }

    async fn get_metadata(&self, id: &str) -> Result<Option<UploadInfo>, StoreError> {
        self.read_info(id).await
    }

    fn base_location(&self) -> String {
        self.directory.display().to_string()
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("directory", &self.directory)
            .finish()
    }
}
