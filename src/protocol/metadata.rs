//! `Upload-Metadata` wire codec.
//!
//! The header is a comma-separated list of `key base64(value)` pairs. Keys
//! are opaque to the server except for `filename`, which may influence the
//! resource id at creation time. A key without a value decodes to the empty
//! string.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use std::collections::BTreeMap;
use thiserror::Error;

/// Decoded client metadata. Ordered so re-encoding is deterministic;
/// insertion order on the wire is irrelevant.
pub type MetadataMap = BTreeMap<String, String>;

/// Metadata decoding errors
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("Malformed metadata pair: {0:?}")]
    MalformedPair(String),

    #[error("Invalid base64 value for key {0:?}")]
    InvalidValue(String),
}

/// Decode an `Upload-Metadata` header into a key/value mapping.
pub fn decode(header: &str) -> Result<MetadataMap, MetadataError> {
    // Clients are inconsistent about whitespace around the separating commas.
    let normalized = header.replace(", ", ",").replace(" ,", ",");

    let mut metadata = MetadataMap::new();
    for pair in normalized.split(',') {
        if pair.is_empty() {
            continue;
        }

        let mut parts = pair.splitn(2, ' ');
        let key = match parts.next() {
            Some(k) if !k.is_empty() => k,
            _ => return Err(MetadataError::MalformedPair(pair.to_string())),
        };

        let value = match parts.next() {
            Some(encoded) if !encoded.is_empty() => {
                let raw = BASE64
                    .decode(encoded)
                    .map_err(|_| MetadataError::InvalidValue(key.to_string()))?;
                String::from_utf8(raw).map_err(|_| MetadataError::InvalidValue(key.to_string()))?
            }
            _ => String::new(),
        };

        metadata.insert(key.to_string(), value);
    }

    Ok(metadata)
}

/// Re-encode a mapping into the `Upload-Metadata` wire form.
pub fn encode(metadata: &MetadataMap) -> String {
    metadata
        .iter()
        .map(|(key, value)| {
            if value.is_empty() {
                key.clone()
            } else {
                format!("{} {}", key, BASE64.encode(value))
            }
        })
        .collect::<Vec<_>>()
        .join(",")
}
