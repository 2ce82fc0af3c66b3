//! Per-run staged artifacts.
//!
//! Discovery writes the complete result set of a run to `<root>/<num>/`
//! before anything is created on the target. Execution later reads it back.
//! `summary.json` is written last, so its presence marks a complete set.

use super::io::{read_json, write_json};
use crate::core::{
    DuplicateKeyGroup, MigrationCandidate, Result, SourceScan, SyncError, TargetScan,
    UnmatchedAccount,
};
use chrono::{DateTime, Local, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub const LEDGER_FILE: &str = "runs.json";
pub const DONATIONS_FILE: &str = "donations.json";
pub const ERRORS_FILE: &str = "errors.json";
pub const DUPLICATES_FILE: &str = "duplicate_crmkeys.json";
pub const UNMATCHED_FILE: &str = "unmatched_accounts.json";
pub const SOURCE_SCAN_FILE: &str = "scan_source.json";
pub const TARGET_SCAN_FILE: &str = "scan_target.json";
pub const SUMMARY_FILE: &str = "summary.json";
pub const EXECUTION_FILE: &str = "execution.json";

/// Result collections of one discovery run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StagedArtifacts {
    pub candidates: Vec<MigrationCandidate>,
    pub errors: Vec<String>,
    pub duplicate_keys: Vec<DuplicateKeyGroup>,
    pub unmatched_accounts: Vec<UnmatchedAccount>,
    pub source_scan: Vec<SourceScan>,
    pub target_scan: Vec<TargetScan>,
}

impl StagedArtifacts {
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    /// Local time the artifacts were staged, `%Y-%m-%d %H:%M:%S`.
    pub date: String,
    pub label: String,
    pub imported_donations: usize,
    pub unmatched_accounts: usize,
    pub duplicate_crm_key_donors: usize,
    pub errors: usize,
}

impl RunSummary {
    fn of(label: &str, artifacts: &StagedArtifacts) -> Self {
        Self {
            date: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            label: label.to_string(),
            imported_donations: artifacts.candidates.len(),
            unmatched_accounts: artifacts.unmatched_accounts.len(),
            duplicate_crm_key_donors: artifacts.duplicate_keys.len(),
            errors: artifacts.errors.len(),
        }
    }
}

/// Written when execution of a run's candidates begins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMarker {
    pub started_at: DateTime<Utc>,
    /// Run under which the candidates are being created.
    pub executing_run: u64,
}

/// Output directory holding the run ledger and per-run artifact sets.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.root.join(LEDGER_FILE)
    }

    pub fn run_dir(&self, run: u64) -> PathBuf {
        self.root.join(run.to_string())
    }

    pub async fn write(
        &self,
        run: u64,
        label: &str,
        artifacts: &StagedArtifacts,
    ) -> Result<RunSummary> {
        let dir = self.run_dir(run);
        info!(run, dir = %dir.display(), "Writing staged artifacts");

        write_json(&dir.join(DONATIONS_FILE), &artifacts.candidates).await?;
        write_json(&dir.join(ERRORS_FILE), &artifacts.errors).await?;
        write_json(&dir.join(DUPLICATES_FILE), &artifacts.duplicate_keys).await?;
        write_json(&dir.join(UNMATCHED_FILE), &artifacts.unmatched_accounts).await?;
        write_json(&dir.join(SOURCE_SCAN_FILE), &artifacts.source_scan).await?;
        write_json(&dir.join(TARGET_SCAN_FILE), &artifacts.target_scan).await?;

        let summary = RunSummary::of(label, artifacts);
        write_json(&dir.join(SUMMARY_FILE), &summary).await?;
        Ok(summary)
    }

    /// Loads a complete artifact set. Any missing or unreadable file is fatal for the run.
    pub async fn load(&self, run: u64) -> Result<(RunSummary, StagedArtifacts)> {
        let dir = self.run_dir(run);
        let summary: RunSummary = required(&dir, SUMMARY_FILE).await?;
        let artifacts = StagedArtifacts {
            candidates: required(&dir, DONATIONS_FILE).await?,
            errors: required(&dir, ERRORS_FILE).await?,
            duplicate_keys: required(&dir, DUPLICATES_FILE).await?,
            unmatched_accounts: required(&dir, UNMATCHED_FILE).await?,
            source_scan: required(&dir, SOURCE_SCAN_FILE).await?,
            target_scan: required(&dir, TARGET_SCAN_FILE).await?,
        };

        if artifacts.candidates.len() != summary.imported_donations {
            return Err(SyncError::Artifact(format!(
                "run #{} summary lists {} donations but {} holds {}",
                run,
                summary.imported_donations,
                DONATIONS_FILE,
                artifacts.candidates.len()
            )));
        }
        Ok((summary, artifacts))
    }

    pub async fn mark_execution(&self, run: u64, executing_run: u64) -> Result<ExecutionMarker> {
        let marker = ExecutionMarker {
            started_at: Utc::now(),
            executing_run,
        };
        write_json(&self.run_dir(run).join(EXECUTION_FILE), &marker).await?;
        Ok(marker)
    }

    pub async fn execution_marker(&self, run: u64) -> Result<Option<ExecutionMarker>> {
        read_json(&self.run_dir(run).join(EXECUTION_FILE))
            .await
            .map_err(|e| SyncError::Artifact(format!("run #{}: {}", run, e)))
    }
}

async fn required<T: DeserializeOwned>(dir: &Path, file: &str) -> Result<T> {
    let path = dir.join(file);
    match read_json(&path).await {
        Ok(Some(value)) => Ok(value),
        Ok(None) => Err(SyncError::Artifact(format!(
            "missing staged artifact '{}'",
            path.display()
        ))),
        Err(err) => Err(SyncError::Artifact(err.to_string())),
    }
}
