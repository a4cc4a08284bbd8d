//! Configuration module
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation.

use crate::protocol::is_valid_upload_id;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mount = &self.upload.path;
        if !mount.starts_with('/') || mount.len() < 2 {
            return Err(ConfigError::ValidationError(format!(
                "Upload path '{}' must be absolute and non-root",
                mount
            )));
        }
        if mount.ends_with('/') {
            return Err(ConfigError::ValidationError(format!(
                "Upload path '{}' must not end with a slash",
                mount
            )));
        }

        if let Some(filename) = &self.upload.filename {
            if !is_valid_upload_id(filename) {
                return Err(ConfigError::ValidationError(format!(
                    "Configured filename '{}' is not a valid upload id",
                    filename
                )));
            }
        }

        match self.storage.backend {
            StorageBackend::File => {
                if self.storage.file.is_none() {
                    return Err(ConfigError::ValidationError(
                        "Backend 'file' selected but storage.file is missing".into(),
                    ));
                }
            }
            StorageBackend::S3 => {
                let s3 = self.storage.s3.as_ref().ok_or_else(|| {
                    ConfigError::ValidationError(
                        "Backend 's3' selected but storage.s3 is missing".into(),
                    )
                })?;
                if s3.access_key.is_some() != s3.secret_key.is_some() {
                    return Err(ConfigError::ValidationError(
                        "storage.s3 needs both access_key and secret_key, or neither".into(),
                    ));
                }
            }
        }

        Ok(())
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
}

/// Upload route configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Mount path all upload routes hang off of.
    #[serde(default = "default_upload_path")]
    pub path: String,
    /// Server-chosen upload id. When set, it overrides both the generated
    /// id and any client-supplied metadata filename.
    #[serde(default)]
    pub filename: Option<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            filename: None,
        }
    }
}

fn default_upload_path() -> String {
    "/files".to_string()
}

/// Storage backend selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    S3,
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    #[serde(default)]
    pub file: Option<FileStorageConfig>,
    #[serde(default)]
    pub s3: Option<S3StorageConfig>,
}

/// Filesystem backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileStorageConfig {
    pub directory: String,
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3StorageConfig {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file_config() -> Config {
        Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
            },
            upload: UploadConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::File,
                file: Some(FileStorageConfig {
                    directory: "./data".into(),
                }),
                s3: None,
            },
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_valid_config() {
        assert!(file_config().validate().is_ok());
    }

    #[test]
    fn test_mount_path_must_be_absolute() {
        let mut config = file_config();
        config.upload.path = "files".into();
        assert!(config.validate().is_err());

        config.upload.path = "/files/".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_selected_backend_needs_its_section() {
        let mut config = file_config();
        config.storage.backend = StorageBackend::S3;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_s3_credentials_come_in_pairs() {
        let mut config = file_config();
        config.storage.backend = StorageBackend::S3;
        config.storage.s3 = Some(S3StorageConfig {
            bucket: "uploads".into(),
            region: "us-east-1".into(),
            endpoint: None,
            access_key: Some("key".into()),
            secret_key: None,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filename_override_must_be_routable() {
        let mut config = file_config();
        config.upload.filename = Some("../escape".into());
        assert!(config.validate().is_err());

        config.upload.filename = Some("fixed-name".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_minimal_yaml() {
        let yaml = r#"
server:
  address: "0.0.0.0:1080"
storage:
  backend: file
  file:
    directory: "./data"
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.upload.path, "/files");
        assert!(config.metrics.enabled);
        assert_eq!(config.storage.backend, StorageBackend::File);
    }
}
