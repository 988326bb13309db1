//! Represents an object (file) stored in a bucket.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Metadata row for a single object within a bucket.
///
/// The payload bytes live on disk; this struct only carries what SQLite knows.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Object {
    /// Internal UUID for DB indexing.
    pub id: Uuid,

    /// Foreign key linking to the parent bucket.
    pub bucket_id: Uuid,

    /// Object key (path-like identifier within the bucket).
    pub key: String,

    /// Content type (MIME type).
    pub content_type: Option<String>,

    /// Size in bytes.
    pub size_bytes: i64,

    /// MD5 checksum of the payload.
    pub etag: Option<String>,

    /// When the key was first written.
    pub created_at: DateTime<Utc>,

    /// When the key was last overwritten.
    pub updated_at: DateTime<Utc>,
}
