//! ProofResolver: find the newest proof/receipt file for an application.
//!
//! Database rows may point at stale locations, so the resolver goes to
//! storage directly. Per target bucket it runs an ordered list of
//! strategies: two server-side searches (the id, then `combined-{id}`), and,
//! only if nothing matched anywhere, a bounded full scan of the bucket root.
//! Matches from every stage are merged before a single selection step picks
//! the most recent file.
//!
//! Storage errors never escape: a failing stage counts as an empty one and
//! the pipeline moves on. A caller cannot tell "not found" from "backend
//! down".

use crate::{
    models::stored_file::StoredFile,
    services::{
        naming::{COMBINED_PREFIX, ProofKind},
        object_store::{ListOptions, ObjectStore, StorageResult},
    },
};
use futures::future::join_all;
use serde::Deserialize;
use std::{cmp::Ordering, collections::BTreeMap, sync::Arc};
use tracing::{debug, warn};

/// Result cap for one server-side search request.
pub const SEARCH_LIMIT: usize = 100;

pub const DEFAULT_PAGE_SIZE: usize = 200;
pub const MIN_PAGE_SIZE: usize = 50;
pub const MAX_PAGE_SIZE: usize = 1000;

pub const DEFAULT_MAX_PAGES: usize = 10;
pub const MAX_MAX_PAGES: usize = 50;

/// Per-call overrides. Out-of-range values are clamped, not rejected.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveOptions {
    /// Search only this bucket instead of the configured ones.
    pub bucket: Option<String>,
    pub page_size: Option<usize>,
    pub max_pages: Option<usize>,
}

impl ResolveOptions {
    pub fn page_size(&self) -> usize {
        self.page_size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(MIN_PAGE_SIZE, MAX_PAGE_SIZE)
    }

    pub fn max_pages(&self) -> usize {
        self.max_pages
            .unwrap_or(DEFAULT_MAX_PAGES)
            .clamp(1, MAX_MAX_PAGES)
    }
}

/// One way of producing candidate files from a bucket.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Strategy {
    /// Server-side substring search for `term`.
    IndexedSearch { term: String },
    /// Page through the bucket root. Runs only when every other strategy
    /// came back empty.
    FullScan,
}

impl Strategy {
    /// The ordered strategy list for one application id.
    pub fn plan(application_id: &str) -> Vec<Strategy> {
        vec![
            Strategy::IndexedSearch {
                term: application_id.to_string(),
            },
            Strategy::IndexedSearch {
                term: format!("{}{}", COMBINED_PREFIX, application_id),
            },
            Strategy::FullScan,
        ]
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Strategy::FullScan)
    }

    fn label(&self) -> &'static str {
        match self {
            Strategy::IndexedSearch { .. } => "indexed_search",
            Strategy::FullScan => "full_scan",
        }
    }
}

/// A matching file and where it was found.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Candidate {
    pub bucket: String,
    /// Position of the bucket in the target list; 0 is the canonical bucket.
    pub bucket_rank: usize,
    pub file: StoredFile,
}

/// Outcome of a bounded sequential scan.
#[derive(Clone, Debug, Default)]
pub struct ScanOutcome {
    pub files: Vec<StoredFile>,
    pub pages_requested: usize,
    /// The page ceiling was hit before the end of the folder.
    pub truncated: bool,
}

/// List `prefix` page by page until a short page or `max_pages` requests.
///
/// Pages are requested strictly one after another. A bucket of N entries
/// costs at most `min(ceil(N / page_size) + 1, max_pages)` requests.
pub async fn scan_bucket(
    store: &dyn ObjectStore,
    bucket: &str,
    prefix: &str,
    page_size: usize,
    max_pages: usize,
) -> StorageResult<ScanOutcome> {
    let page_size = page_size.max(1);
    let mut outcome = ScanOutcome::default();

    while outcome.pages_requested < max_pages {
        let options = ListOptions {
            limit: page_size,
            offset: outcome.pages_requested * page_size,
            search: None,
        };
        let page = store.list(bucket, prefix, options).await?;
        outcome.pages_requested += 1;

        let page_len = page.len();
        outcome.files.extend(
            page.into_iter()
                .map(|entry| StoredFile::from_listing(prefix, entry)),
        );

        if page_len < page_size {
            return Ok(outcome);
        }
    }

    outcome.truncated = true;
    Ok(outcome)
}

/// Most recent candidate; ties go to the canonical bucket, then to the
/// greatest path.
pub fn select_latest(candidates: &[Candidate]) -> Option<&Candidate> {
    candidates.iter().max_by(|a, b| compare_candidates(a, b))
}

fn compare_candidates(a: &Candidate, b: &Candidate) -> Ordering {
    a.file
        .recency_timestamp()
        .cmp(&b.file.recency_timestamp())
        .then_with(|| b.bucket_rank.cmp(&a.bucket_rank))
        .then_with(|| a.file.path.cmp(&b.file.path))
}

pub struct ProofResolver {
    store: Arc<dyn ObjectStore>,
    canonical_bucket: String,
    fallback_buckets: Vec<String>,
}

impl ProofResolver {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        canonical_bucket: impl Into<String>,
        fallback_buckets: Vec<String>,
    ) -> Self {
        Self {
            store,
            canonical_bucket: canonical_bucket.into(),
            fallback_buckets,
        }
    }

    /// Public URL of the newest file matching `application_id`, if any.
    pub async fn resolve(
        &self,
        application_id: &str,
        kind: ProofKind,
        options: &ResolveOptions,
    ) -> Option<String> {
        let winner = self.find_latest(application_id, kind, options).await?;
        match self.store.public_url(&winner.bucket, &winner.file.path).await {
            Ok(Some(url)) => Some(url),
            Ok(None) => {
                debug!(
                    application_id,
                    bucket = %winner.bucket,
                    path = %winner.file.path,
                    "matched file has no public url"
                );
                None
            }
            Err(err) => {
                warn!(
                    application_id,
                    bucket = %winner.bucket,
                    error = %err,
                    "public url derivation failed"
                );
                None
            }
        }
    }

    /// The winning candidate, without URL derivation.
    pub async fn find_latest(
        &self,
        application_id: &str,
        kind: ProofKind,
        options: &ResolveOptions,
    ) -> Option<Candidate> {
        let candidates = self.collect_candidates(application_id, kind, options).await;
        debug!(
            application_id,
            candidates = candidates.len(),
            "proof candidates collected"
        );
        select_latest(&candidates).cloned()
    }

    /// Every matching file across the target buckets, deduplicated by
    /// bucket and path.
    pub async fn collect_candidates(
        &self,
        application_id: &str,
        kind: ProofKind,
        options: &ResolveOptions,
    ) -> Vec<Candidate> {
        let application_id = application_id.trim();
        if application_id.is_empty() {
            return Vec::new();
        }

        let buckets = self.target_buckets(options);
        let (primary, fallback): (Vec<Strategy>, Vec<Strategy>) = Strategy::plan(application_id)
            .into_iter()
            .partition(|s| !s.is_fallback());

        let mut merged: BTreeMap<(usize, String), Candidate> = BTreeMap::new();

        // Searches are independent of each other; run them together and
        // merge once they have all finished.
        let primary = &primary;
        let searches = buckets.iter().enumerate().flat_map(move |(rank, bucket)| {
            primary.iter().map(move |strategy| async move {
                let files = self
                    .run_strategy(strategy, bucket, application_id, kind, options)
                    .await;
                (rank, bucket, files)
            })
        });
        for (rank, bucket, files) in join_all(searches).await {
            merge_into(&mut merged, rank, bucket, files);
        }

        if merged.is_empty() {
            for (rank, bucket) in buckets.iter().enumerate() {
                for strategy in &fallback {
                    let files = self
                        .run_strategy(strategy, bucket, application_id, kind, options)
                        .await;
                    merge_into(&mut merged, rank, bucket, files);
                }
            }
        }

        merged.into_values().collect()
    }

    fn target_buckets(&self, options: &ResolveOptions) -> Vec<String> {
        if let Some(bucket) = options.bucket.as_deref().filter(|b| !b.is_empty()) {
            return vec![bucket.to_string()];
        }
        let mut buckets = vec![self.canonical_bucket.clone()];
        for bucket in &self.fallback_buckets {
            if !buckets.contains(bucket) {
                buckets.push(bucket.clone());
            }
        }
        buckets
    }

    /// Run one strategy against one bucket and keep only matching files.
    async fn run_strategy(
        &self,
        strategy: &Strategy,
        bucket: &str,
        application_id: &str,
        kind: ProofKind,
        options: &ResolveOptions,
    ) -> Vec<StoredFile> {
        let listed = match strategy {
            Strategy::IndexedSearch { term } => {
                let request = ListOptions {
                    limit: SEARCH_LIMIT,
                    offset: 0,
                    search: Some(term.clone()),
                };
                self.store.list(bucket, "", request).await.map(|entries| {
                    entries
                        .into_iter()
                        .map(|entry| StoredFile::from_listing("", entry))
                        .collect::<Vec<_>>()
                })
            }
            Strategy::FullScan => scan_bucket(
                self.store.as_ref(),
                bucket,
                "",
                options.page_size(),
                options.max_pages(),
            )
            .await
            .map(|outcome| {
                if outcome.truncated {
                    debug!(
                        application_id,
                        bucket,
                        pages = outcome.pages_requested,
                        "full scan stopped at page ceiling"
                    );
                }
                outcome.files
            }),
        };

        match listed {
            Ok(files) => {
                let matches: Vec<StoredFile> = files
                    .into_iter()
                    .filter(|f| kind.matches(application_id, f.file_name()))
                    .collect();
                debug!(
                    application_id,
                    bucket,
                    strategy = strategy.label(),
                    matches = matches.len(),
                    "strategy finished"
                );
                matches
            }
            Err(err) => {
                warn!(
                    application_id,
                    bucket,
                    strategy = strategy.label(),
                    error = %err,
                    "strategy failed, treating as no matches"
                );
                Vec::new()
            }
        }
    }
}

fn merge_into(
    merged: &mut BTreeMap<(usize, String), Candidate>,
    rank: usize,
    bucket: &str,
    files: Vec<StoredFile>,
) {
    for file in files {
        merged
            .entry((rank, file.path.clone()))
            .or_insert_with(|| Candidate {
                bucket: bucket.to_string(),
                bucket_rank: rank,
                file,
            });
    }
}
