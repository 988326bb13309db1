//! BucketMigrator: move receipts out of a legacy bucket and repair the
//! registration rows that still point at them.
//!
//! Each file is moved as download, upsert-upload, then delete, and the
//! database repair runs last. Storage is the source of truth: a failed
//! database update is reported but never rolls the move back, and a
//! re-run converges because both the upload and the repair overwrite.

use crate::{
    models::{
        migration::{
            FileState, MigrationFailure, MigrationReport, MigrationStage, MoveStep, MovedFile,
        },
        registration::UrlField,
        stored_file::StoredFile,
    },
    services::{
        naming::{application_id_from_receipt, content_type_for, looks_like_receipt},
        object_store::{ObjectStore, StorageError, StorageResult, UploadOptions},
        proof_resolver::scan_bucket,
        registrations::RegistrationRepository,
    },
};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const LIST_PAGE_SIZE: usize = 100;
pub const MAX_PAGES_PER_PREFIX: usize = 50;
pub const SAMPLE_NAME_LIMIT: usize = 50;

/// Proof that the caller was authorized upstream to run a migration.
///
/// The migrator never inspects credentials; it only demands one of these.
#[derive(Debug)]
pub struct Superadmin {
    _private: (),
}

impl Superadmin {
    /// Only the authorization boundary should call this.
    pub fn vouched() -> Self {
        Self { _private: () }
    }
}

pub struct BucketMigrator {
    store: Arc<dyn ObjectStore>,
    registrations: Arc<dyn RegistrationRepository>,
    /// Folders scanned in the legacy bucket besides its root.
    legacy_subfolders: Vec<String>,
}

struct FileFailure {
    stage: MigrationStage,
    step: Option<MoveStep>,
    message: String,
}

impl FileFailure {
    fn at(stage: MigrationStage, step: Option<MoveStep>, err: impl ToString) -> Self {
        Self {
            stage,
            step,
            message: err.to_string(),
        }
    }
}

impl BucketMigrator {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        registrations: Arc<dyn RegistrationRepository>,
        legacy_subfolders: Vec<String>,
    ) -> Self {
        Self {
            store,
            registrations,
            legacy_subfolders,
        }
    }

    fn candidate_prefixes(&self) -> Vec<String> {
        let mut prefixes = vec![String::new()];
        for folder in &self.legacy_subfolders {
            let folder = folder.trim_matches('/');
            if !folder.is_empty() && !prefixes.iter().any(|p| p == folder) {
                prefixes.push(folder.to_string());
            }
        }
        prefixes
    }

    /// Move every receipt-looking file from `legacy_bucket` into
    /// `canonical_bucket`.
    ///
    /// Enumeration happens before any mutation; if the legacy bucket cannot
    /// be listed the whole run fails and nothing is touched. Per-file
    /// failures land in the report instead.
    ///
    /// Both buckets must differ, otherwise a root-level file would be
    /// deleted right after being written onto itself.
    pub async fn migrate(
        &self,
        _caller: &Superadmin,
        legacy_bucket: &str,
        canonical_bucket: &str,
    ) -> StorageResult<MigrationReport> {
        if legacy_bucket == canonical_bucket {
            return Err(StorageError::InvalidBucketName {
                name: canonical_bucket.to_string(),
                reason: "legacy and canonical buckets must differ".into(),
            });
        }

        let mut report = MigrationReport {
            legacy_bucket: legacy_bucket.to_string(),
            canonical_bucket: canonical_bucket.to_string(),
            ..MigrationReport::default()
        };

        let mut discovered: Vec<StoredFile> = Vec::new();
        for prefix in self.candidate_prefixes() {
            let outcome = scan_bucket(
                self.store.as_ref(),
                legacy_bucket,
                &prefix,
                LIST_PAGE_SIZE,
                MAX_PAGES_PER_PREFIX,
            )
            .await?;
            if outcome.truncated {
                warn!(
                    bucket = legacy_bucket,
                    prefix = %prefix,
                    pages = outcome.pages_requested,
                    "legacy listing hit the page ceiling; re-run to continue"
                );
            }
            discovered.extend(outcome.files);
        }

        report.scanned = discovered.len();
        report.sample_names = discovered
            .iter()
            .take(SAMPLE_NAME_LIMIT)
            .map(|f| f.path.clone())
            .collect();

        report.matched = discovered
            .iter()
            .filter(|f| looks_like_receipt(f.file_name()))
            .count();

        info!(
            legacy_bucket,
            canonical_bucket,
            scanned = report.scanned,
            matched = report.matched,
            "starting receipt migration"
        );

        for file in &discovered {
            let mut state = FileState::Discovered;
            if !looks_like_receipt(file.file_name()) {
                debug!(file = %file.path, state = ?state, "not a receipt, left in place");
                continue;
            }
            state = FileState::Matched;
            let result = self
                .migrate_file(file, legacy_bucket, canonical_bucket, &mut state, &mut report)
                .await;
            if let Err(failure) = result {
                warn!(
                    file = %file.path,
                    stage = %failure.stage,
                    step = ?failure.step,
                    error = %failure.message,
                    "receipt migration failed"
                );
                report.errors.push(MigrationFailure {
                    file: file.path.clone(),
                    stage: failure.stage,
                    step: failure.step,
                    message: failure.message,
                });
            }
            debug!(file = %file.path, state = ?state, "receipt processed");
        }

        info!(
            copied = report.copied,
            deleted = report.deleted,
            records_updated = report.records_updated,
            errors = report.errors.len(),
            "receipt migration finished"
        );
        Ok(report)
    }

    async fn migrate_file(
        &self,
        file: &StoredFile,
        legacy_bucket: &str,
        canonical_bucket: &str,
        state: &mut FileState,
        report: &mut MigrationReport,
    ) -> Result<(), FileFailure> {
        let file_name = file.file_name().to_string();

        let bytes = self
            .store
            .download(legacy_bucket, &file.path)
            .await
            .map_err(|err| fail_move(state, MoveStep::Download, err))?;

        let options = UploadOptions {
            upsert: true,
            content_type: Some(content_type_for(&file_name).to_string()),
        };
        self.store
            .upload(canonical_bucket, &file_name, bytes, options)
            .await
            .map_err(|err| fail_move(state, MoveStep::Upload, err))?;
        report.copied += 1;
        *state = FileState::Copied;

        let removed = self
            .store
            .remove(legacy_bucket, std::slice::from_ref(&file.path))
            .await
            .map_err(|err| fail_move(state, MoveStep::Remove, err))?;
        report.deleted += removed.len();
        *state = FileState::DeletedFromLegacy;

        let application_id = application_id_from_receipt(&file_name).unwrap_or_default();
        let url = self
            .store
            .public_url(canonical_bucket, &file_name)
            .await
            .map_err(|err| fail(state, MigrationStage::PublicUrl, err))?
            .ok_or_else(|| {
                fail(
                    state,
                    MigrationStage::PublicUrl,
                    format!(
                        "bucket {} has no public URL; registration rows still point at {}",
                        canonical_bucket, file.path
                    ),
                )
            })?;

        let records_updated = self
            .registrations
            .repair_url(UrlField::PaymentReceipt, &file.path, &url)
            .await
            .map_err(|err| fail(state, MigrationStage::DbUpdate, err))?;
        report.records_updated += records_updated;
        *state = FileState::DbRepaired;

        report.moved.push(MovedFile {
            from: file.path.clone(),
            to: file_name,
            application_id,
            url: Some(url),
            records_updated,
        });
        Ok(())
    }
}

fn fail(state: &mut FileState, stage: MigrationStage, err: impl ToString) -> FileFailure {
    *state = FileState::Failed(stage);
    FileFailure::at(stage, None, err)
}

fn fail_move(state: &mut FileState, step: MoveStep, err: impl ToString) -> FileFailure {
    *state = FileState::Failed(MigrationStage::Move);
    FileFailure::at(MigrationStage::Move, Some(step), err)
}
