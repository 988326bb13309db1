//! The object storage contract consumed by the resolver and the migrator.
//!
//! Anything that can list a bucket folder (paginated, with an optional
//! server-side substring search), read, write, and delete objects by path,
//! and derive a public URL can back the core. `LocalObjectStore` is the
//! bundled implementation; tests use an in-memory one.

use crate::models::stored_file::ListedObject;
use async_trait::async_trait;
use bytes::Bytes;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("bucket `{0}` not found")]
    BucketNotFound(String),
    #[error("bucket `{0}` already exists")]
    BucketAlreadyExists(String),
    #[error("bucket `{name}` invalid: {reason}")]
    InvalidBucketName { name: String, reason: String },
    #[error("object `{key}` not found in bucket `{bucket}`")]
    ObjectNotFound { bucket: String, key: String },
    #[error("object `{key}` already exists in bucket `{bucket}`")]
    ObjectAlreadyExists { bucket: String, key: String },
    #[error("invalid object key")]
    InvalidObjectKey,
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Paging and filtering for a folder listing.
#[derive(Clone, Debug, Default)]
pub struct ListOptions {
    pub limit: usize,
    pub offset: usize,
    /// Case-insensitive substring filter applied to entry names.
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct UploadOptions {
    /// Overwrite an existing object instead of failing.
    pub upsert: bool,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List the direct children of `prefix` (`""` is the bucket root),
    /// ordered by name.
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> StorageResult<Vec<ListedObject>>;

    async fn download(&self, bucket: &str, path: &str) -> StorageResult<Bytes>;

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<()>;

    /// Delete the given paths, returning the ones that existed.
    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<Vec<String>>;

    /// Public URL for `path`, or `None` if the bucket does not serve one.
    async fn public_url(&self, bucket: &str, path: &str) -> StorageResult<Option<String>>;
}
