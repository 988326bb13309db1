#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use proof_reconciler::{
    models::{registration::UrlField, stored_file::ListedObject},
    services::{
        object_store::{ListOptions, ObjectStore, StorageError, StorageResult, UploadOptions},
        registrations::{RegistrationRepository, RepositoryError, RepositoryResult},
    },
};
use std::{
    collections::{BTreeMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

pub const CDN: &str = "https://cdn.test";

#[derive(Clone)]
struct Entry {
    data: Bytes,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

/// In-memory object store with knobs for simulating backend failures.
#[derive(Default)]
pub struct InMemoryStore {
    buckets: Mutex<BTreeMap<String, BTreeMap<String, Entry>>>,
    private: Mutex<HashSet<String>>,
    pub fail_everything: AtomicBool,
    pub fail_search: AtomicBool,
    fail_download: Mutex<HashSet<String>>,
    pub search_calls: AtomicUsize,
    pub page_calls: AtomicUsize,
}

pub fn ts(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).unwrap()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, bucket: &str, path: &str, updated: Option<i64>) {
        self.put_with(bucket, path, None, updated.map(ts), Bytes::from(path.to_string()));
    }

    pub fn put_with(
        &self,
        bucket: &str,
        path: &str,
        created_at: Option<DateTime<Utc>>,
        updated_at: Option<DateTime<Utc>>,
        data: Bytes,
    ) {
        self.buckets
            .lock()
            .unwrap()
            .entry(bucket.to_string())
            .or_default()
            .insert(
                path.to_string(),
                Entry {
                    data,
                    created_at,
                    updated_at,
                },
            );
    }

    pub fn make_private(&self, bucket: &str) {
        self.private.lock().unwrap().insert(bucket.to_string());
    }

    pub fn fail_download_of(&self, path: &str) {
        self.fail_download.lock().unwrap().insert(path.to_string());
    }

    pub fn paths(&self, bucket: &str) -> Vec<String> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .map(|b| b.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn bytes(&self, bucket: &str, path: &str) -> Option<Bytes> {
        self.buckets
            .lock()
            .unwrap()
            .get(bucket)
            .and_then(|b| b.get(path))
            .map(|e| e.data.clone())
    }

    fn check_up(&self) -> StorageResult<()> {
        if self.fail_everything.load(Ordering::SeqCst) {
            Err(StorageError::Unavailable("simulated outage".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn list(
        &self,
        bucket: &str,
        prefix: &str,
        options: ListOptions,
    ) -> StorageResult<Vec<ListedObject>> {
        if options.search.is_some() {
            self.search_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_search.load(Ordering::SeqCst) {
                return Err(StorageError::Unavailable("search index down".into()));
            }
        } else {
            self.page_calls.fetch_add(1, Ordering::SeqCst);
        }
        self.check_up()?;

        let folder = match prefix.trim_matches('/') {
            "" => String::new(),
            p => format!("{}/", p),
        };
        let search = options.search.map(|s| s.to_lowercase());
        let buckets = self.buckets.lock().unwrap();
        let Some(files) = buckets.get(bucket) else {
            return Err(StorageError::BucketNotFound(bucket.to_string()));
        };

        Ok(files
            .iter()
            .filter_map(|(path, entry)| {
                let name = path.strip_prefix(&folder)?;
                if name.contains('/') {
                    return None;
                }
                if let Some(term) = &search {
                    if !name.to_lowercase().contains(term) {
                        return None;
                    }
                }
                Some(ListedObject {
                    name: name.to_string(),
                    created_at: entry.created_at,
                    updated_at: entry.updated_at,
                })
            })
            .skip(options.offset)
            .take(options.limit)
            .collect())
    }

    async fn download(&self, bucket: &str, path: &str) -> StorageResult<Bytes> {
        self.check_up()?;
        if self.fail_download.lock().unwrap().contains(path) {
            return Err(StorageError::Unavailable(format!("cannot read {}", path)));
        }
        self.bytes(bucket, path).ok_or_else(|| StorageError::ObjectNotFound {
            bucket: bucket.to_string(),
            key: path.to_string(),
        })
    }

    async fn upload(
        &self,
        bucket: &str,
        path: &str,
        data: Bytes,
        options: UploadOptions,
    ) -> StorageResult<()> {
        self.check_up()?;
        let mut buckets = self.buckets.lock().unwrap();
        let files = buckets.entry(bucket.to_string()).or_default();
        if !options.upsert && files.contains_key(path) {
            return Err(StorageError::ObjectAlreadyExists {
                bucket: bucket.to_string(),
                key: path.to_string(),
            });
        }
        let now = Utc::now();
        let created_at = files.get(path).and_then(|e| e.created_at).or(Some(now));
        files.insert(
            path.to_string(),
            Entry {
                data,
                created_at,
                updated_at: Some(now),
            },
        );
        Ok(())
    }

    async fn remove(&self, bucket: &str, paths: &[String]) -> StorageResult<Vec<String>> {
        self.check_up()?;
        let mut buckets = self.buckets.lock().unwrap();
        let Some(files) = buckets.get_mut(bucket) else {
            return Ok(Vec::new());
        };
        Ok(paths
            .iter()
            .filter(|p| files.remove(p.as_str()).is_some())
            .cloned()
            .collect())
    }

    async fn public_url(&self, bucket: &str, path: &str) -> StorageResult<Option<String>> {
        self.check_up()?;
        if self.private.lock().unwrap().contains(bucket) {
            return Ok(None);
        }
        Ok(Some(format!("{}/{}/{}", CDN, bucket, path)))
    }
}

/// Registration table stand-in holding `(application_id, receipt_url)` rows.
#[derive(Default)]
pub struct InMemoryRegistrations {
    pub rows: Mutex<Vec<(String, Option<String>)>>,
    pub fail: AtomicBool,
}

impl InMemoryRegistrations {
    pub fn with_rows(rows: &[(&str, &str)]) -> Self {
        Self {
            rows: Mutex::new(
                rows.iter()
                    .map(|(id, url)| (id.to_string(), Some(url.to_string())))
                    .collect(),
            ),
            fail: AtomicBool::new(false),
        }
    }

    pub fn url_of(&self, application_id: &str) -> Option<String> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == application_id)
            .and_then(|(_, url)| url.clone())
    }
}

#[async_trait]
impl RegistrationRepository for InMemoryRegistrations {
    async fn repair_url(
        &self,
        field: UrlField,
        old_path: &str,
        new_url: &str,
    ) -> RepositoryResult<u64> {
        assert_eq!(field, UrlField::PaymentReceipt);
        if self.fail.load(Ordering::SeqCst) {
            return Err(RepositoryError::Sqlx(sqlx::Error::PoolClosed));
        }
        let mut updated = 0;
        for (_, url) in self.rows.lock().unwrap().iter_mut() {
            if url.as_deref().is_some_and(|u| u.contains(old_path)) {
                *url = Some(new_url.to_string());
                updated += 1;
            }
        }
        Ok(updated)
    }
}
