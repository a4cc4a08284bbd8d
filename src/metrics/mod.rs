//! Metrics module
//!
//! Prometheus metrics for the upload protocol, exposed on `GET /metrics`.

use lazy_static::lazy_static;
use prometheus::{
    register_counter, register_counter_vec, register_histogram_vec, Counter, CounterVec,
    HistogramVec, TextEncoder,
};

lazy_static! {
    // Upload metrics
    pub static ref UPLOADS_CREATED_TOTAL: Counter = register_counter!(
        "tsuzuki_uploads_created_total",
        "Total number of uploads created"
    ).unwrap();

    pub static ref CHUNKS_TOTAL: CounterVec = register_counter_vec!(
        "tsuzuki_chunks_total",
        "Total number of appended chunks",
        &["status"]
    ).unwrap();

    pub static ref UPLOAD_BYTES_TOTAL: Counter = register_counter!(
        "tsuzuki_upload_bytes_total",
        "Total bytes appended across all uploads"
    ).unwrap();

    // Request metrics
    pub static ref REQUEST_DURATION: HistogramVec = register_histogram_vec!(
        "tsuzuki_request_duration_seconds",
        "Request duration in seconds",
        &["handler"],
        vec![0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 10.0]
    ).unwrap();

    // Error metrics
    pub static ref ERRORS_TOTAL: CounterVec = register_counter_vec!(
        "tsuzuki_errors_total",
        "Total errors",
        &["type"]
    ).unwrap();
}

/// Record a created upload
pub fn record_upload_created() {
    UPLOADS_CREATED_TOTAL.inc();
}

/// Record a successfully appended chunk
pub fn record_chunk_success(bytes: u64) {
    CHUNKS_TOTAL.with_label_values(&["success"]).inc();
    UPLOAD_BYTES_TOTAL.inc_by(bytes as f64);
}

/// Record a refused or failed chunk
pub fn record_chunk_failure() {
    CHUNKS_TOTAL.with_label_values(&["failure"]).inc();
}

/// Record request duration
pub fn record_request_duration(handler: &str, duration_secs: f64) {
    REQUEST_DURATION
        .with_label_values(&[handler])
        .observe(duration_secs);
}

/// Record an error by type
pub fn record_error(error_type: &str) {
    ERRORS_TOTAL.with_label_values(&[error_type]).inc();
}

/// Render the default registry in the Prometheus text exposition format.
pub fn gather() -> String {
    TextEncoder::new()
        .encode_to_string(&prometheus::gather())
        .unwrap_or_default()
}
