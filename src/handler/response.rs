//! Response writer
//!
//! The single path by which any handler writes a response. Every response
//! carries `Content-Length` and the protocol's exposed-header list, so
//! browser clients can read the protocol headers cross-origin and no
//! handler can silently drop them.

use crate::protocol::EXPOSED_HEADERS;
use bytes::Bytes;
use http_body_util::Full;
use hyper::header;
use hyper::{Response, StatusCode};

pub struct ResponseWriter;

impl ResponseWriter {
    /// Emit a response with extra headers and a body.
    pub fn send(
        status: StatusCode,
        headers: &[(&str, String)],
        body: &str,
    ) -> Response<Full<Bytes>> {
        let body = Bytes::copy_from_slice(body.as_bytes());

        let mut builder = Response::builder()
            .status(status)
            .header(header::CONTENT_LENGTH, body.len())
            .header(header::ACCESS_CONTROL_EXPOSE_HEADERS, EXPOSED_HEADERS);

        for (name, value) in headers {
            builder = builder.header(*name, value.as_str());
        }

        builder
            .body(Full::new(body))
            .expect("Failed to build response")
    }

    /// A bodyless response.
    pub fn empty(status: StatusCode) -> Response<Full<Bytes>> {
        Self::send(status, &[], "")
    }

    /// A plain-text response, used for validation explanations.
    pub fn text(status: StatusCode, message: &str) -> Response<Full<Bytes>> {
        Self::send(
            status,
            &[("Content-Type", "text/plain".to_string())],
            message,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_response_exposes_protocol_headers() {
        let response = ResponseWriter::empty(StatusCode::NOT_FOUND);

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            response
                .headers()
                .get(header::ACCESS_CONTROL_EXPOSE_HEADERS)
                .unwrap(),
            EXPOSED_HEADERS
        );
        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "0");
    }

    #[test]
    fn test_body_sets_content_length() {
        let response = ResponseWriter::text(StatusCode::BAD_REQUEST, "Upload-Defer-Length must be 1");

        assert_eq!(response.headers().get(header::CONTENT_LENGTH).unwrap(), "29");
        assert_eq!(response.headers().get("Content-Type").unwrap(), "text/plain");
    }
}
