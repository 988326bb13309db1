//! src/services/storage_service.rs
//!
//! LocalObjectStore: the bundled `ObjectStore` backend. Metadata lives in
//! SQLite; payloads live on disk sharded beneath
//! `base_path/{bucket}/{shard}/{shard}/{key}`. Listings follow folder
//! semantics: only the direct children of a prefix are returned.

use crate::{
    models::{bucket::Bucket, object::Object, stored_file::ListedObject},
    services::object_store::{
        ListOptions, ObjectStore, StorageError, StorageResult, UploadOptions,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{Stream, StreamExt, pin_mut, stream};
use md5::Context;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use sqlx::{QueryBuilder, SqlitePool, sqlite::Sqlite};
use std::{
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::debug;
use uuid::Uuid;

/// Characters left untouched when encoding one key segment into a URL.
const KEY_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

const MAX_OBJECT_KEY_LEN: usize = 1024;
const BUCKET_NAME_MIN_LEN: usize = 3;
const BUCKET_NAME_MAX_LEN: usize = 63;
const MAX_LIST_LIMIT: usize = 1000;

const OBJECT_COLUMNS: &str =
    "id, bucket_id, key, content_type, size_bytes, etag, created_at, updated_at";

#[derive(Clone)]
pub struct LocalObjectStore {
    /// Shared SQLite connection pool used for metadata operations.
    pub db: Arc<SqlitePool>,

    /// Base directory on disk where object payloads are stored.
    pub base_path: PathBuf,

    /// Externally reachable origin of this service, without trailing slash.
    pub public_base_url: String,
}

impl LocalObjectStore {
    pub fn new(
        db: Arc<SqlitePool>,
        base_path: impl Into<PathBuf>,
        public_base_url: impl Into<String>,
    ) -> Self {
        Self {
            db,
            base_path: base_path.into(),
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Rejects empty or oversized keys, absolute keys, `..` and control bytes.
    fn ensure_key_safe(&self, key: &str) -> StorageResult<()> {
        if key.is_empty() || key.len() > MAX_OBJECT_KEY_LEN {
            return Err(StorageError::InvalidObjectKey);
        }
        if key.starts_with('/') || key.ends_with('/') || key.contains("..") {
            return Err(StorageError::InvalidObjectKey);
        }
        if key
            .bytes()
            .any(|b| b.is_ascii_control() || b == b'\\' || b == b'\0')
        {
            return Err(StorageError::InvalidObjectKey);
        }
        Ok(())
    }

    /// Validate bucket name format.
    ///
    /// - 3–63 characters
    /// - lowercase letters, digits, dots, hyphens only
    /// - cannot start/end with dot or hyphen
    /// - cannot contain consecutive dots or dot-hyphen patterns
    /// - cannot look like an IPv4 address
    pub fn ensure_bucket_name_safe(&self, name: &str) -> StorageResult<()> {
        let invalid = |reason: &str| StorageError::InvalidBucketName {
            name: name.to_string(),
            reason: reason.into(),
        };

        if name.trim() != name {
            return Err(invalid("cannot begin or end with whitespace"));
        }
        if !(BUCKET_NAME_MIN_LEN..=BUCKET_NAME_MAX_LEN).contains(&name.len()) {
            return Err(invalid("must be between 3 and 63 characters"));
        }
        if !name
            .chars()
            .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '.' | '-'))
        {
            return Err(invalid(
                "allowed characters are lowercase letters, digits, dots, and hyphens",
            ));
        }
        if name.starts_with(['.', '-']) || name.ends_with(['.', '-']) {
            return Err(invalid("must start and end with a lowercase letter or digit"));
        }
        if name.contains("..") || name.contains("-.") || name.contains(".-") {
            return Err(invalid(
                "cannot contain consecutive dots or dot-hyphen combinations",
            ));
        }
        if is_ipv4_like(name) {
            return Err(invalid("must not be formatted like an IP address"));
        }
        Ok(())
    }

    fn bucket_root(&self, bucket_name: &str) -> PathBuf {
        self.base_path.join(bucket_name)
    }

    /// First two bytes of MD5(bucket/key) as hex, used as directory shards.
    fn object_shards(bucket_name: &str, key: &str) -> (String, String) {
        let digest = md5::compute(format!("{}/{}", bucket_name, key));
        (format!("{:02x}", digest[0]), format!("{:02x}", digest[1]))
    }

    fn object_path(&self, bucket_name: &str, key: &str) -> PathBuf {
        let (shard_a, shard_b) = Self::object_shards(bucket_name, key);
        let mut path = self.bucket_root(bucket_name);
        path.push(shard_a);
        path.push(shard_b);
        path.push(key);
        path
    }

    /// Public URL for `key` in `bucket`, regardless of the bucket's flag.
    pub fn public_url_for(&self, bucket: &str, key: &str) -> String {
        format!(
            "{}/storage/public/{}/{}",
            self.public_base_url,
            bucket,
            encode_object_path(key)
        )
    }

    async fn fetch_bucket(&self, bucket: &str) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(bucket)?;
        sqlx::query_as::<Sqlite, Bucket>(
            "SELECT id, name, public, created_at FROM buckets WHERE name = ?",
        )
        .bind(bucket)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::BucketNotFound(bucket.to_string()),
            other => StorageError::Sqlx(other),
        })
    }

    async fn fetch_object(&self, bucket: &Bucket, key: &str) -> StorageResult<Object> {
        sqlx::query_as::<_, Object>(&format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE key = ? AND bucket_id = ?"
        ))
        .bind(key)
        .bind(bucket.id)
        .fetch_one(&*self.db)
        .await
        .map_err(|err| match err {
            sqlx::Error::RowNotFound => StorageError::ObjectNotFound {
                bucket: bucket.name.clone(),
                key: key.to_string(),
            },
            other => StorageError::Sqlx(other),
        })
    }

    /// Stream an object to disk and record its metadata.
    ///
    /// The payload goes to a temp file first (fsynced), then is renamed into
    /// place. With `upsert` the metadata row is overwritten and `created_at`
    /// kept; without it an existing key is rejected before any bytes land.
    pub async fn upload_object_stream<S>(
        &self,
        bucket: &str,
        key: &str,
        options: UploadOptions,
        stream: S,
    ) -> StorageResult<Object>
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;

        if !options.upsert {
            match self.fetch_object(&bucket_rec, key).await {
                Ok(_) => {
                    return Err(StorageError::ObjectAlreadyExists {
                        bucket: bucket.to_string(),
                        key: key.to_string(),
                    });
                }
                Err(StorageError::ObjectNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        let parent = file_path.parent().map(Path::to_path_buf).ok_or_else(|| {
            StorageError::Io(io::Error::new(
                ErrorKind::Other,
                "object path missing parent directory",
            ))
        })?;
        fs::create_dir_all(&parent).await?;
        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let mut file = File::create(&tmp_path).await?;

        let mut size_bytes: i64 = 0;
        let mut digest = Context::new();
        pin_mut!(stream);
        while let Some(chunk_res) = stream.next().await {
            let chunk = match chunk_res {
                Ok(chunk) => chunk,
                Err(err) => {
                    let _ = fs::remove_file(&tmp_path).await;
                    return Err(StorageError::Io(err));
                }
            };
            size_bytes += chunk.len() as i64;
            digest.consume(&chunk);
            if let Err(err) = file.write_all(&chunk).await {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }
        if let Err(err) = file.flush().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        if let Err(err) = file.sync_all().await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(StorageError::Io(err));
        }
        drop(file);

        if let Err(err) = fs::rename(&tmp_path, &file_path).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(&file_path).await?;
                fs::rename(&tmp_path, &file_path).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(StorageError::Io(err));
            }
        }

        let now = Utc::now();
        let etag = format!("{:x}", digest.compute());

        let insert_result = sqlx::query_as::<_, Object>(&format!(
            r#"
            INSERT INTO objects (
                id, bucket_id, key, content_type, size_bytes, etag, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(bucket_id, key) DO UPDATE SET
                content_type = excluded.content_type,
                size_bytes = excluded.size_bytes,
                etag = excluded.etag,
                updated_at = excluded.updated_at
            RETURNING {OBJECT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(bucket_rec.id)
        .bind(key)
        .bind(options.content_type)
        .bind(size_bytes)
        .bind(&etag)
        .bind(now)
        .bind(now)
        .fetch_one(&*self.db)
        .await;

        match insert_result {
            Ok(obj) => {
                debug!(bucket, key, size_bytes, "stored object");
                Ok(obj)
            }
            Err(err) => {
                let _ = fs::remove_file(&file_path).await;
                Err(StorageError::Sqlx(err))
            }
        }
    }

    /// Metadata plus an open file handle ready for streaming out.
    pub async fn get_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.open_object(&bucket_rec, key).await
    }

    /// Like `get_object_reader`, but private buckets look empty.
    pub async fn get_public_object_reader(
        &self,
        bucket: &str,
        key: &str,
    ) -> StorageResult<(Object, File)> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        if !bucket_rec.public {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }
        self.open_object(&bucket_rec, key).await
    }

    async fn open_object(&self, bucket: &Bucket, key: &str) -> StorageResult<(Object, File)> {
        let object = self.fetch_object(bucket, key).await?;
        let file_path = self.object_path(&bucket.name, key);
        let file = File::open(&file_path).await.map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                StorageError::ObjectNotFound {
                    bucket: bucket.name.clone(),
                    key: key.to_string(),
                }
            } else {
                StorageError::Io(err)
            }
        })?;
        Ok((object, file))
    }

    /// Objects directly inside the `prefix` folder, ordered by key.
    pub async fn list_folder(
        &self,
        bucket: &str,
        prefix: &str,
        options: &ListOptions,
    ) -> StorageResult<Vec<Object>> {
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let folder = normalize_folder(prefix);
        let limit = options.limit.clamp(1, MAX_LIST_LIMIT);

        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {OBJECT_COLUMNS} FROM objects WHERE bucket_id = "
        ));
        builder.push_bind(bucket_rec.id);

        // Literal prefix comparison; LIKE would treat `_` in keys as a wildcard.
        builder.push(" AND substr(key, 1, length(");
        builder.push_bind(folder.clone());
        builder.push(")) = ");
        builder.push_bind(folder.clone());
        builder.push(" AND instr(substr(key, length(");
        builder.push_bind(folder.clone());
        builder.push(") + 1), '/') = 0");

        if let Some(search) = options.search.as_deref().filter(|s| !s.is_empty()) {
            builder.push(" AND instr(lower(substr(key, length(");
            builder.push_bind(folder.clone());
            builder.push(") + 1)), lower(");
            builder.push_bind(search.to_string());
            builder.push(")) > 0");
        }

        builder.push(" ORDER BY key ASC LIMIT ");
        builder.push_bind(limit as i64);
        builder.push(" OFFSET ");
        builder.push_bind(options.offset as i64);

        let rows: Vec<Object> = builder.build_query_as().fetch_all(&*self.db).await?;
        Ok(rows)
    }

    /// Delete an object's metadata row and its payload.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<Object> {
        self.ensure_key_safe(key)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        let object = self.fetch_object(&bucket_rec, key).await?;

        let result = sqlx::query("DELETE FROM objects WHERE key = ? AND bucket_id = ?")
            .bind(key)
            .bind(bucket_rec.id)
            .execute(&*self.db)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            });
        }

        let file_path = self.object_path(&bucket_rec.name, key);
        match fs::remove_file(&file_path).await {
            Ok(_) => debug!("removed physical file {}", file_path.display()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                debug!("file {} already missing", file_path.display());
            }
            Err(err) => return Err(StorageError::Io(err)),
        }

        if let Some(parent) = file_path.parent() {
            let bucket_root = self.bucket_root(&bucket_rec.name);
            self.prune_empty_dirs(parent, &bucket_root).await;
        }

        Ok(object)
    }

    /// Create a bucket and its directory. Fails on a name conflict.
    pub async fn create_bucket(&self, name: &str, public: bool) -> StorageResult<Bucket> {
        self.ensure_bucket_name_safe(name)?;
        fs::create_dir_all(self.bucket_root(name)).await?;

        let bucket = Bucket {
            id: Uuid::new_v4(),
            name: name.to_string(),
            public,
            created_at: Utc::now(),
        };

        match sqlx::query("INSERT INTO buckets (id, name, public, created_at) VALUES (?, ?, ?, ?)")
            .bind(bucket.id)
            .bind(&bucket.name)
            .bind(bucket.public)
            .bind(bucket.created_at)
            .execute(&*self.db)
            .await
        {
            Ok(_) => Ok(bucket),
            Err(err) if is_unique_violation(&err) => {
                Err(StorageError::BucketAlreadyExists(name.to_string()))
            }
            Err(err) => Err(StorageError::Sqlx(err)),
        }
    }

    /// Create the bucket unless it already exists.
    pub async fn ensure_bucket(&self, name: &str, public: bool) -> StorageResult<Bucket> {
        match self.create_bucket(name, public).await {
            Ok(bucket) => Ok(bucket),
            Err(StorageError::BucketAlreadyExists(_)) => self.fetch_bucket(name).await,
            Err(err) => Err(err),
        }
    }

    /// Walk upward removing empty directories until `stop` or a non-empty one.
    async fn prune_empty_dirs(&self, start: &Path, stop: &Path) {
        let mut current = start.to_path_buf();
        while current.starts_with(stop) && current != stop {
            match fs::remove_dir(&current).await {
                Ok(_) => {
                    if let Some(parent) = current.parent() {
                        current = parent.to_path_buf();
                    } else {
                        break;
                    }
                }
                Err(err) if err.kind() == ErrorKind::NotFound => break,
                Err(err) if err.kind() == ErrorKind::DirectoryNotEmpty => break,
                Err(err) => {
                    debug!("failed to prune directory {}: {}", current.display(), err);
                    break;
                }
            }
        }
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> StorageResult<Vec<ListedObject>> {
        let folder = normalize_folder(prefix);
        let rows = self.list_folder(bucket, prefix, &options).await?;
        Ok(rows
            .into_iter()
            .map(|obj| ListedObject {
                name: obj.key[folder.len()..].to_string(),
                created_at: Some(obj.created_at),
                updated_at: Some(obj.updated_at),
            })
            .collect())
    }

    async fn download(&self, bucket: &str, path: &str) -> StorageResult<Bytes> {
        self.ensure_key_safe(path)?;
        let bucket_rec = self.fetch_bucket(bucket).await?;
        self.fetch_object(&bucket_rec, path).await?;
        let bytes = fs::read(self.object_path(&bucket_rec.name, path))
            .await
            .map_err(|err| match err.kind() {
                ErrorKind::NotFound => StorageError::ObjectNotFound {
                    bucket: bucket.to_string(),
                    key: path.to_string(),
                },
                _ => StorageError::Io(err),
            })?;
        Ok(Bytes::from(bytes))
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<()> {
        let body = stream::once(async move { Ok::<_, io::Error>(data) });
        self.upload_object_stream(bucket, path, options, body).await?;
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<Vec<String>> {
        let mut removed = Vec::with_capacity(paths.len());
        for path in paths {
            match self.delete_object(bucket, path).await {
                Ok(_) => removed.push(path.clone()),
                Err(StorageError::ObjectNotFound { .. }) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(removed)
    }

    async fn public_url(&self, bucket: &str, path: &str) -> StorageResult<Option<String>> {
        match self.fetch_bucket(bucket).await {
            Ok(b) if b.public => Ok(Some(self.public_url_for(bucket, path))),
            Ok(_) | Err(StorageError::BucketNotFound(_)) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

/// Percent-encode each `/`-separated segment of an object key.
pub fn encode_object_path(key: &str) -> String {
    key.split('/')
        .map(|segment| utf8_percent_encode(segment, KEY_SEGMENT).to_string())
        .collect::<Vec<_>>()
        .join("/")
}

/// `""` stays the root; anything else becomes `folder/`.
fn normalize_folder(prefix: &str) -> String {
    let trimmed = prefix.trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db_err) if db_err.message().to_ascii_lowercase().contains("unique")
    )
}

/// Names formatted like `1.2.3.4`.
fn is_ipv4_like(name: &str) -> bool {
    let parts: Vec<&str> = name.split('.').collect();
    parts.len() == 4
        && parts.iter().all(|segment| {
            !segment.is_empty()
                && segment.len() <= 3
                && segment.chars().all(|c| c.is_ascii_digit())
                && segment.parse::<u8>().is_ok()
        })
}
