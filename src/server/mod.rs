//! HTTP server module
//!
//! Binds the configured address, builds the configured storage backend, and
//! dispatches incoming requests to the protocol handlers. Built on `hyper`
//! and `tokio`: async I/O, HTTP/1.1, one task per connection.
//!
//! # Routes
//!
//! * `POST <mount>` - create an upload
//! * `HEAD <mount>/<id>` - query offset and metadata
//! * `PATCH <mount>/<id>` - append a chunk
//! * `GET /health` - health check
//! * `GET /metrics` - Prometheus exposition (when enabled)
//!
//! Everything else is a 404, emitted through the response writer so even
//! unmatched routes carry the protocol's exposed-header list.

use crate::config::{Config, StorageBackend};
use crate::handler::{CreateHandler, HeadHandler, Hooks, PatchHandler, ResponseWriter};
use crate::storage::s3::{S3Store, S3StoreConfig};
use crate::storage::{DataStore, FileStore, StoreError};
use bytes::Bytes;
use http_body_util::Full;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{body::Incoming, Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Storage error: {0}")]
    StorageError(#[from] StoreError),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// Everything a request needs, shared across connections.
struct AppState {
    create: CreateHandler,
    head: HeadHandler,
    patch: PatchHandler,
    mount_path: String,
    metrics_enabled: bool,
}

/// HTTP Server
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    state: Arc<AppState>,
}

impl Server {
    /// Create a new server instance without hooks.
    ///
    /// Binds immediately; with port 0 the OS assigns a port, queryable via
    /// [`local_addr`](Self::local_addr).
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        Self::with_hooks(config, Hooks::default()).await
    }

    /// Create a new server instance with deployment hooks.
    pub async fn with_hooks(config: Config, hooks: Hooks) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        let store = build_store(&config).await?;
        let mount_path = config.upload.path.clone();

        let state = Arc::new(AppState {
            create: CreateHandler::new(
                Arc::clone(&store),
                mount_path.clone(),
                config.upload.filename.clone(),
                hooks.clone(),
            ),
            head: HeadHandler::new(Arc::clone(&store), mount_path.clone(), hooks.clone()),
            patch: PatchHandler::new(Arc::clone(&store), mount_path.clone(), hooks),
            mount_path,
            metrics_enabled: config.metrics.enabled,
        });

        info!("Server bound to {}", local_addr);

        Ok(Self {
            listener,
            local_addr,
            state,
        })
    }

    /// The address the server is bound to. Useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Accept connections forever, one tokio task per connection.
    /// Connection errors are logged and do not stop the server.
    pub async fn run(self) -> Result<(), ServerError> {
        info!("Starting server on {}", self.local_addr);

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                    continue;
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

/// Build the configured storage backend.
async fn build_store(config: &Config) -> Result<Arc<dyn DataStore>, ServerError> {
    match config.storage.backend {
        StorageBackend::File => {
            let file_config = config.storage.file.as_ref().ok_or_else(|| {
                ServerError::RuntimeError("storage.file missing for file backend".into())
            })?;
            let store = FileStore::new(&file_config.directory).await?;
            info!(directory = %file_config.directory, "Using filesystem backend");
            Ok(Arc::new(store))
        }
        StorageBackend::S3 => {
            let s3_config = config.storage.s3.as_ref().ok_or_else(|| {
                ServerError::RuntimeError("storage.s3 missing for s3 backend".into())
            })?;
            let store = S3Store::new(S3StoreConfig {
                bucket: s3_config.bucket.clone(),
                region: s3_config.region.clone(),
                endpoint: s3_config.endpoint.clone(),
                access_key: s3_config.access_key.clone(),
                secret_key: s3_config.secret_key.clone(),
            })
            .await?;
            info!(bucket = %s3_config.bucket, "Using S3 backend");
            Ok(Arc::new(store))
        }
    }
}

/// Route a request to the matching handler.
async fn handle_request(
    req: Request<Incoming>,
    state: Arc<AppState>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    let start = Instant::now();
    let path = req.uri().path().to_string();
    let method = req.method().clone();

    info!("Handling {} {}", method, path);

    let mount = state.mount_path.as_str();
    let is_mount_root = path == mount || path == format!("{}/", mount);
    let is_upload_path = path.starts_with(mount);

    let (label, response) = if method == Method::GET && path == "/health" {
        ("health", ResponseWriter::text(StatusCode::OK, "ok"))
    } else if method == Method::GET && path == "/metrics" && state.metrics_enabled {
        (
            "metrics",
            ResponseWriter::text(StatusCode::OK, &crate::metrics::gather()),
        )
    } else if method == Method::POST && is_mount_root {
        ("create", state.create.handle(req).await)
    } else if method == Method::HEAD && is_upload_path {
        ("head", state.head.handle(req).await)
    } else if method == Method::PATCH && is_upload_path {
        ("patch", state.patch.handle(req).await)
    } else {
        ("other", ResponseWriter::empty(StatusCode::NOT_FOUND))
    };

    crate::metrics::record_request_duration(label, start.elapsed().as_secs_f64());
    Ok(response)
}
