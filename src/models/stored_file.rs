//! Backend-neutral view of a stored file.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One entry returned by an object store listing.
///
/// `name` is relative to the prefix that was listed.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ListedObject {
    pub name: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// A file inside a bucket, addressed by its full path.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct StoredFile {
    /// Full path within the bucket, possibly including a `folder/` prefix.
    pub path: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredFile {
    /// Build a `StoredFile` from a listing entry taken under `prefix`.
    pub fn from_listing(prefix: &str, entry: ListedObject) -> Self {
        let prefix = prefix.trim_matches('/');
        let path = if prefix.is_empty() {
            entry.name
        } else {
            format!("{}/{}", prefix, entry.name)
        };
        Self {
            path,
            created_at: entry.created_at,
            updated_at: entry.updated_at,
        }
    }

    /// Last path segment.
    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    /// `updated_at`, falling back to `created_at`, falling back to the epoch.
    ///
    /// Files with no timestamps sort as the oldest possible entry.
    pub fn recency_timestamp(&self) -> DateTime<Utc> {
        self.updated_at
            .or(self.created_at)
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}
