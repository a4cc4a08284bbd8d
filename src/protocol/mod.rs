//! Wire-level pieces of the tus resumable upload protocol.
//!
//! Header names, the append content type, the CORS-exposed header list,
//! and the upload-id alphabet shared by the head and patch routes.

pub mod metadata;

/// Content type every append (PATCH) request must carry.
pub const OFFSET_OCTET_STREAM: &str = "application/offset+octet-stream";

/// Response headers browser clients must be able to read cross-origin.
pub const EXPOSED_HEADERS: &str = "Upload-Offset, Location, Upload-Length, Tus-Version, Tus-Resumable, Tus-Max-Size, Tus-Extension, Upload-Metadata";

pub const HEADER_UPLOAD_OFFSET: &str = "Upload-Offset";
pub const HEADER_UPLOAD_LENGTH: &str = "Upload-Length";
pub const HEADER_UPLOAD_DEFER_LENGTH: &str = "Upload-Defer-Length";
pub const HEADER_UPLOAD_METADATA: &str = "Upload-Metadata";

/// Check an upload id against the path-segment alphabet.
///
/// One alphabet for every route that carries an id, and for filename
/// overrides at creation time. Rejecting everything outside it also keeps
/// ids from escaping the storage directory.
pub fn is_valid_upload_id(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}
