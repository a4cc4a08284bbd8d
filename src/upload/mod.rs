//! Upload resource model
//!
//! The in-memory representation of an upload being created. All durable
//! state lives in the storage backend; this entity only carries what the
//! create handler resolves before persisting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An upload resource.
///
/// `id` is immutable once the resource has been created in a backend; the
/// create handler may rewrite it (server-configured filename, client
/// metadata `filename`) before that point only. `length` is `None` when the
/// client deferred declaring the total size.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Upload {
    pub id: String,
    pub length: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl Upload {
    /// Create a new upload resource with a freshly generated id.
    pub fn new(length: Option<u64>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().simple().to_string(),
            length,
            created_at: Utc::now(),
        }
    }
}
