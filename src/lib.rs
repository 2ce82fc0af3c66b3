// ============================================================================
// donorsync Library
// ============================================================================

pub mod config;
pub mod core;
pub mod engine;
pub mod ledger;
pub mod migrate;
pub mod note;
pub mod report;
pub mod source;
pub mod storage;
pub mod target;

// Re-export main types for convenience
pub use config::{Environment, OrganizationCredentials, SyncConfig, TargetConfig, TargetCredentials};
pub use core::{MigrationCandidate, Result, SyncError};
pub use engine::{Discovery, GiftBuilder, ReconciliationEngine, load_account_numbers};
pub use ledger::{RunLedger, RunRecord, RunStatus};
pub use migrate::{ExecutionReport, MigrationExecutor};
pub use source::{DonationQuery, SourceSystem, SourceSystemClient};
pub use storage::{ArtifactStore, RunSummary, StagedArtifacts};
pub use target::{AccountLookup, HttpRpcTransport, LookupStrategy, TargetSystem, TargetSystemClient};
