//! Report types produced by a receipt migration run.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Per-file progress through a migration.
///
/// `Failed` is absorbing: a file that fails at some stage is not retried in
/// the same run, and later files are processed regardless.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileState {
    Discovered,
    Matched,
    Copied,
    DeletedFromLegacy,
    DbRepaired,
    Failed(MigrationStage),
}

/// Stage tag attached to a per-file failure.
///
/// The three storage steps of a move share one tag; `MoveStep` says which
/// of them broke.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStage {
    #[serde(rename = "download/upload/remove")]
    Move,
    PublicUrl,
    DbUpdate,
}

impl fmt::Display for MigrationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationStage::Move => "download/upload/remove",
            MigrationStage::PublicUrl => "public_url",
            MigrationStage::DbUpdate => "db_update",
        };
        f.write_str(s)
    }
}

/// Storage step inside `MigrationStage::Move`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MoveStep {
    Download,
    Upload,
    Remove,
}

impl fmt::Display for MoveStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MoveStep::Download => "download",
            MoveStep::Upload => "upload",
            MoveStep::Remove => "remove",
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationFailure {
    /// Path of the file in the legacy bucket.
    pub file: String,
    pub stage: MigrationStage,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<MoveStep>,
    pub message: String,
}

/// One file that made it into the canonical bucket.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovedFile {
    pub from: String,
    pub to: String,
    pub application_id: String,
    pub url: Option<String>,
    pub records_updated: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub legacy_bucket: String,
    pub canonical_bucket: String,
    /// Files enumerated in the legacy bucket across all candidate prefixes.
    pub scanned: usize,
    /// Files that passed the receipt heuristic.
    pub matched: usize,
    pub copied: usize,
    pub deleted: usize,
    pub records_updated: u64,
    pub sample_names: Vec<String>,
    pub errors: Vec<MigrationFailure>,
    pub moved: Vec<MovedFile>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn move_failures_share_one_stage_tag() {
        let failure = MigrationFailure {
            file: "receipt-B-1.pdf".into(),
            stage: MigrationStage::Move,
            step: Some(MoveStep::Download),
            message: "unreachable".into(),
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["stage"], json!("download/upload/remove"));
        assert_eq!(value["step"], json!("download"));
        assert_eq!(MigrationStage::Move.to_string(), "download/upload/remove");
    }

    #[test]
    fn step_is_omitted_outside_the_move() {
        let failure = MigrationFailure {
            file: "receipt-A-1.pdf".into(),
            stage: MigrationStage::DbUpdate,
            step: None,
            message: "pool closed".into(),
        };
        let value = serde_json::to_value(&failure).unwrap();
        assert_eq!(value["stage"], json!("db_update"));
        assert!(value.get("step").is_none());
    }
}
