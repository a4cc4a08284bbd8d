//! End-to-end upload flow tests
//!
//! Boots the real server on an ephemeral port with a filesystem backend in
//! a temp directory and drives the protocol with a plain HTTP client:
//! create, chunked append, resume discovery, and the failure statuses.

use std::net::SocketAddr;
use std::time::Duration;
use tsuzuki_uploadr::config::{
    Config, FileStorageConfig, MetricsConfig, ServerConfig, StorageBackend, StorageConfig,
    UploadConfig,
};
use tsuzuki_uploadr::server::Server;

const OFFSET_STREAM: &str = "application/offset+octet-stream";

/// Test environment: a running server plus the client and store directory.
struct TestEnv {
    server_addr: SocketAddr,
    client: reqwest::Client,
    store_dir: tempfile::TempDir,
    _server_handle: tokio::task::JoinHandle<()>,
}

impl TestEnv {
    async fn new() -> Self {
        let store_dir = tempfile::tempdir().unwrap();
        let config = Config {
            server: ServerConfig {
                address: "127.0.0.1:0".into(),
            },
            upload: UploadConfig::default(),
            storage: StorageConfig {
                backend: StorageBackend::File,
                file: Some(FileStorageConfig {
                    directory: store_dir.path().display().to_string(),
                }),
                s3: None,
            },
            metrics: MetricsConfig::default(),
        };

        let server = Server::new(config).await.unwrap();
        let server_addr = server.local_addr();

        let server_handle = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap();

        Self {
            server_addr,
            client,
            store_dir,
            _server_handle: server_handle,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.server_addr, path)
    }

    /// POST a new upload and return the id from the Location header.
    async fn create_upload(&self, length: u64) -> String {
        let response = self
            .client
            .post(self.url("/files"))
            .header("Upload-Length", length.to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 201);

        let location = response
            .headers()
            .get("Location")
            .unwrap()
            .to_str()
            .unwrap();
        location.rsplit('/').next().unwrap().to_string()
    }
}

#[tokio::test]
async fn test_full_upload_flow() {
    let env = TestEnv::new().await;

    // Create: 201 with a Location whose id is immediately queryable.
    let response = env
        .client
        .post(env.url("/files"))
        .header("Upload-Length", "10")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);
    let location = response
        .headers()
        .get("Location")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(location.contains("/files/"));
    let id = location.rsplit('/').next().unwrap().to_string();

    let response = env.client.head(env.url(&format!("/files/{}", id))).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "0");

    // Append all ten bytes in one chunk.
    let response = env
        .client
        .patch(env.url(&format!("/files/{}", id)))
        .header("Content-Type", OFFSET_STREAM)
        .header("Upload-Offset", "0")
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "10");

    // Resume discovery reflects the stored bytes.
    let response = env.client.head(env.url(&format!("/files/{}", id))).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "10");
    assert_eq!(response.headers().get("Upload-Length").unwrap(), "10");
    assert_eq!(response.headers().get("Cache-Control").unwrap(), "no-store");

    // The bytes are durably on disk.
    let content = std::fs::read(env.store_dir.path().join(&id)).unwrap();
    assert_eq!(content, b"0123456789");
}

#[tokio::test]
async fn test_chunked_upload_resumes_across_requests() {
    let env = TestEnv::new().await;
    let id = env.create_upload(11).await;

    let response = env
        .client
        .patch(env.url(&format!("/files/{}", id)))
        .header("Content-Type", OFFSET_STREAM)
        .header("Upload-Offset", "0")
        .body("hello ")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "6");

    let response = env
        .client
        .patch(env.url(&format!("/files/{}", id)))
        .header("Content-Type", OFFSET_STREAM)
        .header("Upload-Offset", "6")
        .body("world")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "11");

    let content = std::fs::read(env.store_dir.path().join(&id)).unwrap();
    assert_eq!(content, b"hello world");
}

#[tokio::test]
async fn test_offset_mismatch_conflicts_without_writing() {
    let env = TestEnv::new().await;
    let id = env.create_upload(10).await;

    let response = env
        .client
        .patch(env.url(&format!("/files/{}", id)))
        .header("Content-Type", OFFSET_STREAM)
        .header("Upload-Offset", "5")
        .body("XXXXX")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    let content = std::fs::read(env.store_dir.path().join(&id)).unwrap();
    assert!(content.is_empty());
}

#[tokio::test]
async fn test_wrong_content_type_is_403_regardless_of_headers() {
    let env = TestEnv::new().await;
    let id = env.create_upload(10).await;

    let response = env
        .client
        .patch(env.url(&format!("/files/{}", id)))
        .header("Content-Type", "text/plain")
        .header("Upload-Offset", "0")
        .body("0123456789")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_head_unknown_id_is_404() {
    let env = TestEnv::new().await;

    let response = env
        .client
        .head(env.url("/files/unknown-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_create_validation_statuses() {
    let env = TestEnv::new().await;

    // Neither length header.
    let response = env.client.post(env.url("/files")).send().await.unwrap();
    assert_eq!(response.status(), 400);

    // Deferred length must be literally "1".
    let response = env
        .client
        .post(env.url("/files"))
        .header("Upload-Defer-Length", "0")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Zero is a valid declared length and immediately queryable.
    let id = env.create_upload(0).await;
    let response = env.client.head(env.url(&format!("/files/{}", id))).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.headers().get("Upload-Offset").unwrap(), "0");
    assert_eq!(response.headers().get("Upload-Length").unwrap(), "0");
}

#[tokio::test]
async fn test_metadata_round_trips_through_head() {
    let env = TestEnv::new().await;

    // filename "notes-txt", author "julian"
    let wire = "filename bm90ZXMtdHh0,author anVsaWFu";
    let response = env
        .client
        .post(env.url("/files"))
        .header("Upload-Length", "5")
        .header("Upload-Metadata", wire)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 201);

    let response = env
        .client
        .head(env.url("/files/notes-txt"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let returned = response
        .headers()
        .get("Upload-Metadata")
        .unwrap()
        .to_str()
        .unwrap();
    let decoded = tsuzuki_uploadr::protocol::metadata::decode(returned).unwrap();
    assert_eq!(decoded.get("filename").map(String::as_str), Some("notes-txt"));
    assert_eq!(decoded.get("author").map(String::as_str), Some("julian"));
}

#[tokio::test]
async fn test_duplicate_create_conflicts() {
    let env = TestEnv::new().await;

    let wire = "filename ZHVwbGljYXRl"; // "duplicate"
    for expected in [201, 409] {
        let response = env
            .client
            .post(env.url("/files"))
            .header("Upload-Length", "5")
            .header("Upload-Metadata", wire)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), expected);
    }
}

#[tokio::test]
async fn test_every_response_exposes_protocol_headers() {
    let env = TestEnv::new().await;

    // Even an unmatched route answers through the response writer.
    let response = env
        .client
        .get(env.url("/files/some-id"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);

    let exposed = response
        .headers()
        .get("Access-Control-Expose-Headers")
        .unwrap()
        .to_str()
        .unwrap();
    for header in ["Upload-Offset", "Location", "Upload-Length", "Upload-Metadata"] {
        assert!(exposed.contains(header));
    }
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let env = TestEnv::new().await;

    let response = env.client.get(env.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");

    let _ = env.create_upload(5).await;
    let response = env.client.get(env.url("/metrics")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response
        .text()
        .await
        .unwrap()
        .contains("tsuzuki_uploads_created_total"));
}
