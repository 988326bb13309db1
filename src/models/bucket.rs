//! Represents a logical bucket, a top-level namespace for stored files.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// A storage bucket.
///
/// Buckets are untyped: nothing about their contents is enforced beyond the
/// file naming convention used by whoever uploads into them.
#[derive(Serialize, Deserialize, Clone, FromRow, Debug)]
pub struct Bucket {
    /// Unique identifier for this bucket (UUID for internal DB use).
    pub id: Uuid,

    /// Bucket name (must conform to DNS-style naming rules).
    pub name: String,

    /// Whether objects in this bucket are reachable through public URLs.
    pub public: bool,

    /// When this bucket was created.
    pub created_at: DateTime<Utc>,
}
