//! Execution of staged migration candidates.
//!
//! Execution is decoupled from discovery: it only ever reads the artifact
//! set a discovery run staged, and creates each candidate on the target
//! once, sequentially.

use crate::core::{Result, SyncError};
use crate::ledger::{RunLedger, RunStatus};
use crate::storage::{ArtifactStore, StagedArtifacts};
use crate::target::TargetSystem;
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedDonation {
    pub source_donation_id: u64,
    /// Reference the target assigned to the new record.
    pub target_ref: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionReport {
    /// Run the candidates were executed under.
    pub run: u64,
    /// Run that staged the candidates, when different from `run`.
    pub source_run: Option<u64>,
    pub created: Vec<CreatedDonation>,
}

pub struct MigrationExecutor<'a, T: TargetSystem> {
    target: &'a T,
    store: &'a ArtifactStore,
}

impl<'a, T: TargetSystem> MigrationExecutor<'a, T> {
    pub fn new(target: &'a T, store: &'a ArtifactStore) -> Self {
        Self { target, store }
    }

    /// Creates every candidate staged by `run` on the target.
    ///
    /// A run discovered in this process is executed in place. A run left
    /// `failed` by an earlier process is executed under a new run that
    /// records it as its source, unless its candidates were already
    /// executed or their execution had begun.
    pub async fn execute(&self, ledger: &mut RunLedger, run: u64) -> Result<ExecutionReport> {
        let record = ledger
            .get(run)
            .cloned()
            .ok_or_else(|| SyncError::Ledger(format!("run #{} not found", run)))?;

        match record.status {
            RunStatus::Finished => Err(SyncError::AlreadyExecuted(run)),
            RunStatus::Started => {
                if ledger.discovering() == Some(run) {
                    return Err(SyncError::RunInProgress(run));
                }
                let artifacts = match self.store.load(run).await {
                    Ok((_, artifacts)) => artifacts,
                    Err(err) => return Err(abandon(ledger, run, err).await),
                };
                self.create_all(ledger, run, run, artifacts).await
            }
            RunStatus::Failed => {
                if ledger.was_executed(run) || self.store.execution_marker(run).await?.is_some() {
                    return Err(SyncError::AlreadyExecuted(run));
                }
                let (_, artifacts) = self.store.load(run).await?;

                let replay = ledger.start(&record.label, Some(run)).await?;
                ledger.mark_discovered(replay)?;
                info!(run = replay, source_run = run, "Replaying staged candidates");
                self.create_all(ledger, run, replay, artifacts).await
            }
        }
    }

    async fn create_all(
        &self,
        ledger: &mut RunLedger,
        staged_run: u64,
        run: u64,
        artifacts: StagedArtifacts,
    ) -> Result<ExecutionReport> {
        if let Err(err) = self.store.mark_execution(staged_run, run).await {
            return Err(abandon(ledger, run, err).await);
        }

        let total = artifacts.candidates.len();
        info!(run, candidates = total, "Executing staged candidates");

        let mut created = Vec::with_capacity(total);
        for (i, candidate) in artifacts.candidates.iter().enumerate() {
            match self.target.create_donation(&candidate.donation).await {
                Ok(target_ref) => {
                    info!(
                        run,
                        progress = %format!("{}/{}", i + 1, total),
                        donation_id = candidate.source_donation_id,
                        target_ref = %target_ref,
                        "Created donation"
                    );
                    created.push(CreatedDonation {
                        source_donation_id: candidate.source_donation_id,
                        target_ref,
                    });
                }
                Err(err) => return Err(abandon(ledger, run, err).await),
            }
        }

        ledger.finish(run).await?;
        Ok(ExecutionReport {
            run,
            source_run: (staged_run != run).then_some(staged_run),
            created,
        })
    }
}

/// Marks `run` failed and hands back the error that stopped it.
async fn abandon(ledger: &mut RunLedger, run: u64, err: SyncError) -> SyncError {
    error!(run, error = %err, "Execution aborted");
    if let Err(ledger_err) = ledger.fail(run).await {
        error!(run, error = %ledger_err, "Could not record failed run");
    }
    err
}
