//! Append-only ledger of migration runs.
//!
//! The ledger is the single writer of run status. A run starts as
//! `started` and only ever moves to `finished` or `failed`. Loading the
//! ledger marks every run left `started` by an earlier process as
//! `failed`; partial runs are never resumed.

use crate::core::{Result, SyncError};
use crate::storage::io::{read_json, write_json};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Started,
    Finished,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Started => "started",
            Self::Finished => "finished",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunRecord {
    pub label: String,
    pub num: u64,
    pub status: RunStatus,
    /// Earlier run whose staged artifacts this run executes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_run: Option<u64>,
}

pub struct RunLedger {
    path: PathBuf,
    runs: Vec<RunRecord>,
    /// Run whose discovery is in flight.
    discovering: Option<u64>,
}

impl RunLedger {
    /// Loads `path` (empty when absent) and fails every unfinished run.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut runs: Vec<RunRecord> = read_json(&path)
            .await
            .map_err(|e| SyncError::Ledger(e.to_string()))?
            .unwrap_or_default();

        for run in runs.iter_mut().filter(|r| r.status == RunStatus::Started) {
            warn!(run = run.num, label = %run.label, "Run never finished, marking failed");
            run.status = RunStatus::Failed;
        }

        if runs.is_empty() {
            info!("No runs found");
        }

        let ledger = Self {
            path,
            runs,
            discovering: None,
        };
        ledger.save().await?;
        Ok(ledger)
    }

    pub fn runs(&self) -> &[RunRecord] {
        &self.runs
    }

    pub fn get(&self, num: u64) -> Option<&RunRecord> {
        self.runs.iter().find(|r| r.num == num)
    }

    pub fn last(&self) -> Option<&RunRecord> {
        self.runs.last()
    }

    /// Run whose artifacts are still being collected, if any.
    pub fn discovering(&self) -> Option<u64> {
        self.discovering
    }

    pub fn next_run_number(&self) -> u64 {
        self.last().map_or(0, |run| run.num + 1)
    }

    /// Appends a new `started` run and returns its number.
    pub async fn start(&mut self, label: &str, source_run: Option<u64>) -> Result<u64> {
        if let Some(active) = self.discovering {
            return Err(SyncError::RunInProgress(active));
        }

        let num = self.next_run_number();
        info!(run = num, label, "Starting run");
        self.runs.push(RunRecord {
            label: label.to_string(),
            num,
            status: RunStatus::Started,
            source_run,
        });
        self.save().await?;
        self.discovering = Some(num);
        Ok(num)
    }

    /// Ends the discovery phase of `num` once its artifacts are staged.
    /// The run itself stays `started` until executed.
    pub fn mark_discovered(&mut self, num: u64) -> Result<()> {
        if self.discovering != Some(num) {
            return Err(SyncError::Ledger(format!("run #{} is not discovering", num)));
        }
        self.discovering = None;
        info!(run = num, "Run discovered");
        Ok(())
    }

    pub async fn finish(&mut self, num: u64) -> Result<()> {
        self.transition(num, RunStatus::Finished).await?;
        info!(run = num, "Run finished");
        Ok(())
    }

    pub async fn fail(&mut self, num: u64) -> Result<()> {
        self.transition(num, RunStatus::Failed).await?;
        warn!(run = num, "Run failed");
        Ok(())
    }

    /// Whether the candidates staged by `num` were created on the target,
    /// either by `num` itself or by a finished replay of it.
    pub fn was_executed(&self, num: u64) -> bool {
        self.runs.iter().any(|r| {
            r.status == RunStatus::Finished && (r.num == num || r.source_run == Some(num))
        })
    }

    async fn transition(&mut self, num: u64, to: RunStatus) -> Result<()> {
        let run = self
            .runs
            .iter_mut()
            .find(|r| r.num == num)
            .ok_or_else(|| SyncError::Ledger(format!("run #{} not found", num)))?;

        if run.status != RunStatus::Started {
            return Err(SyncError::Ledger(format!(
                "cannot move run #{} from {} to {}",
                num, run.status, to
            )));
        }
        run.status = to;
        if self.discovering == Some(num) {
            self.discovering = None;
        }
        self.save().await
    }

    async fn save(&self) -> Result<()> {
        write_json(&self.path, &self.runs).await
    }
}
