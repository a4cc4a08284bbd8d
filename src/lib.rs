//! Tsuzuki Uploadr Library
//!
//! Resumable upload server implementing the tus protocol: clients create an
//! upload resource, push bytes in offset-addressed chunks, and query the
//! current offset to resume after a failure.
//!
//! # Features
//!
//! - **Resumable**: offset-addressed chunked uploads with conflict detection
//! - **Pluggable Storage**: local filesystem or S3-compatible buckets behind
//!   one contract
//! - **Streaming**: request bodies are never buffered whole
//! - **Hooks**: optional success/error callbacks for deployments
//!
//! # Example
//!
//! ```no_run
//! use tsuzuki_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod handler;
pub mod metrics;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
