//! Reconciliation of source donations against target journal histories.
//!
//! A discovery run never writes to the target. It collects migration
//! candidates and the error, duplicate-key and unmatched-account collections,
//! then stages them through the [`ArtifactStore`] before the run is handed
//! to execution.

pub mod gift;
pub mod input;

pub use gift::{CHANNEL_TAG, GiftBuilder, Skip};
pub use input::{ACCOUNT_NUMBER_COLUMN, load_account_numbers};

use crate::config::SyncConfig;
use crate::core::convert::{cents_to_amount, window_bounds};
use crate::core::{
    DuplicateKeyGroup, MigrationCandidate, Result, SourceDonation, SourceDonor, SourceScan,
    SyncError, TargetAccount, TargetDonation, TargetScan, UnmatchedAccount, UnmatchedDonation,
};
use crate::ledger::RunLedger;
use crate::note;
use crate::source::{DonationQuery, SourceSystem};
use crate::storage::{ArtifactStore, RunSummary, StagedArtifacts};
use crate::target::{LookupStrategy, TargetSystem};
use chrono::NaiveDate;
use std::collections::{HashMap, HashSet};
use tracing::{error, info, warn};

/// A run whose artifacts are staged and ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub struct Discovery {
    pub run: u64,
    pub summary: RunSummary,
}

pub struct ReconciliationEngine<'a, S: SourceSystem, T: TargetSystem> {
    label: String,
    source: &'a S,
    target: &'a T,
    store: &'a ArtifactStore,
    lookup: LookupStrategy,
    gifts: GiftBuilder,
    window_days: u32,

    working: StagedArtifacts,
    /// Journal histories fetched this run, keyed by account ref.
    histories: HashMap<String, Vec<TargetDonation>>,
    /// Source donation ids already staged this run.
    staged: HashSet<u64>,
}

impl<'a, S: SourceSystem, T: TargetSystem> ReconciliationEngine<'a, S, T> {
    pub fn new(
        label: impl Into<String>,
        source: &'a S,
        target: &'a T,
        store: &'a ArtifactStore,
        config: &SyncConfig,
    ) -> Self {
        Self {
            label: label.into(),
            source,
            target,
            store,
            lookup: config.lookup_strategy(),
            gifts: GiftBuilder::local(),
            window_days: config.window_days,
            working: StagedArtifacts::default(),
            histories: HashMap::new(),
            staged: HashSet::new(),
        }
    }

    pub fn with_gift_builder(mut self, gifts: GiftBuilder) -> Self {
        self.gifts = gifts;
        self
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Collections of the current or most recent run.
    pub fn working_set(&self) -> &StagedArtifacts {
        &self.working
    }

    /// Bulk mode: reconciles every donor named by `account_numbers`.
    pub async fn reconcile_accounts(
        &mut self,
        ledger: &mut RunLedger,
        account_numbers: &[String],
    ) -> Result<Discovery> {
        let run = self.begin(ledger).await?;
        info!(run, label = %self.label, rows = account_numbers.len(), "Reconciling listed accounts");

        let outcome = self.discover_accounts(account_numbers).await;
        self.conclude(ledger, run, outcome).await
    }

    /// Incremental mode: reconciles approved donations created in the
    /// trailing window ending on `today`.
    pub async fn reconcile_window(
        &mut self,
        ledger: &mut RunLedger,
        today: NaiveDate,
    ) -> Result<Discovery> {
        let run = self.begin(ledger).await?;
        info!(run, label = %self.label, days = self.window_days, "Reconciling recent donations");

        let outcome = self.discover_window(today).await;
        self.conclude(ledger, run, outcome).await
    }

    async fn begin(&mut self, ledger: &mut RunLedger) -> Result<u64> {
        let run = ledger.start(&self.label, None).await?;
        self.working.clear();
        self.histories.clear();
        self.staged.clear();
        Ok(run)
    }

    async fn conclude(
        &mut self,
        ledger: &mut RunLedger,
        run: u64,
        outcome: Result<()>,
    ) -> Result<Discovery> {
        let staged = match outcome {
            Ok(()) => self.store.write(run, &self.label, &self.working).await,
            Err(err) => Err(err),
        };

        let summary = match staged {
            Ok(summary) => summary,
            Err(err) => {
                error!(run, error = %err, "Discovery aborted");
                if let Err(ledger_err) = ledger.fail(run).await {
                    error!(run, error = %ledger_err, "Could not record failed run");
                }
                return Err(err);
            }
        };

        ledger.mark_discovered(run)?;
        info!(
            run,
            candidates = summary.imported_donations,
            unmatched = summary.unmatched_accounts,
            duplicates = summary.duplicate_crm_key_donors,
            errors = summary.errors,
            "Discovery complete"
        );
        Ok(Discovery { run, summary })
    }

    async fn discover_accounts(&mut self, account_numbers: &[String]) -> Result<()> {
        for (row, account_number) in account_numbers.iter().enumerate() {
            info!(row, account_number = %account_number, "Checking account");
            self.reconcile_account(account_number).await?;
        }
        Ok(())
    }

    /// Returns an error only when the whole batch must stop.
    async fn reconcile_account(&mut self, account_number: &str) -> Result<()> {
        let donor = match self.source.fetch_donor(account_number).await {
            Ok(donor) => donor,
            Err(err) => return self.record_row_error(err),
        };

        let donations = match self
            .source
            .fetch_donations(&DonationQuery::for_donor(donor.id))
            .await
        {
            Ok(donations) => donations,
            Err(err) => return self.record_row_error(err),
        };

        if !self.working.source_scan.iter().any(|s| s.donor.id == donor.id) {
            self.working.source_scan.push(SourceScan {
                label: self.label.clone(),
                donor: donor.clone(),
                donations: donations.clone(),
            });
        }

        let key = donor
            .crm_second_key
            .clone()
            .unwrap_or_else(|| account_number.to_string());
        let Some(account) = self.resolve(&key).await? else {
            return Ok(());
        };
        self.load_history(&account).await?;

        for donation in &donations {
            self.consider(&donor, &account, donation);
        }
        Ok(())
    }

    fn record_row_error(&mut self, err: SyncError) -> Result<()> {
        match err {
            SyncError::MultipleDonors { key, donors, .. } => {
                warn!(crm_key = %key, donors = donors.len(), "Secondary key shared by several donors");
                self.working.duplicate_keys.push(DuplicateKeyGroup {
                    label: self.label.clone(),
                    crm_key: key,
                    donors,
                });
                Ok(())
            }
            err if !err.is_fatal() => {
                warn!(error = %err, "Skipping row");
                self.working.errors.push(format!("Source: {}", err));
                Ok(())
            }
            err => Err(err),
        }
    }

    async fn discover_window(&mut self, today: NaiveDate) -> Result<()> {
        let (after, before) = window_bounds(today, self.window_days);
        let donations = self
            .source
            .fetch_donations(&DonationQuery::window(after, before).approved_only(true))
            .await?;
        info!(count = donations.len(), "Fetched recent donations");

        for donation in &donations {
            self.reconcile_donation(donation).await?;
        }
        Ok(())
    }

    async fn reconcile_donation(&mut self, donation: &SourceDonation) -> Result<()> {
        let Some(donor) = donation.donor.as_ref() else {
            warn!(donation_id = donation.id, "Donation carries no donor");
            self.working
                .errors
                .push(format!("Donation ID {} has no donor record", donation.id));
            return Ok(());
        };
        self.scan_source_donation(donor, donation);

        let Some(key) = donor.crm_second_key.as_deref() else {
            self.record_unmatched(donor, donation);
            return Ok(());
        };
        let Some(account) = self.resolve(key).await? else {
            return Ok(());
        };
        self.load_history(&account).await?;
        self.consider(donor, &account, donation);
        Ok(())
    }

    fn scan_source_donation(&mut self, donor: &SourceDonor, donation: &SourceDonation) {
        let mut snapshot = donation.clone();
        snapshot.donor = None;
        match self
            .working
            .source_scan
            .iter_mut()
            .find(|s| s.donor.id == donor.id)
        {
            Some(scan) => scan.donations.push(snapshot),
            None => self.working.source_scan.push(SourceScan {
                label: self.label.clone(),
                donor: donor.clone(),
                donations: vec![snapshot],
            }),
        }
    }

    fn record_unmatched(&mut self, donor: &SourceDonor, donation: &SourceDonation) {
        let entry = UnmatchedDonation {
            source_donation_id: donation.id,
            amount: cents_to_amount(donation.amount_in_cents),
            notes: note::encode(
                donation.id,
                donation.last4.as_deref(),
                donation.comment.as_deref(),
            ),
        };

        match self
            .working
            .unmatched_accounts
            .iter_mut()
            .find(|u| u.donor.id == donor.id)
        {
            Some(unmatched) => unmatched.donations.push(entry),
            None => {
                info!(donor_id = donor.id, "Found unmatched account");
                self.working.unmatched_accounts.push(UnmatchedAccount {
                    donor: donor.clone(),
                    donations: vec![entry],
                });
            }
        }
    }

    async fn resolve(&mut self, key: &str) -> Result<Option<TargetAccount>> {
        let account = self.target.resolve_account(&self.lookup.lookup(key)).await?;
        if account.is_none() {
            warn!(crm_key = %key, "No target account for secondary key");
            self.working
                .errors
                .push(format!("Could not get target account (secondary key): {}", key));
        }
        Ok(account)
    }

    /// Fetches the account's journal once per run and snapshots it.
    async fn load_history(&mut self, account: &TargetAccount) -> Result<()> {
        if self.histories.contains_key(&account.account_ref) {
            return Ok(());
        }
        let history = self
            .target
            .fetch_account_donations(&account.account_ref)
            .await?;
        self.working.target_scan.push(TargetScan {
            label: self.label.clone(),
            donor: account.clone(),
            donations: history.clone(),
        });
        self.histories.insert(account.account_ref.clone(), history);
        Ok(())
    }

    fn already_on_target(&self, account_ref: &str, source_donation_id: u64) -> bool {
        self.histories.get(account_ref).is_some_and(|history| {
            history.iter().any(|entry| {
                entry
                    .note
                    .as_deref()
                    .is_some_and(|text| note::exists(text, source_donation_id))
            })
        })
    }

    fn consider(&mut self, donor: &SourceDonor, account: &TargetAccount, donation: &SourceDonation) {
        if self.already_on_target(&account.account_ref, donation.id)
            || self.staged.contains(&donation.id)
        {
            info!(donation_id = donation.id, "Donation already exists on target, skipping");
            return;
        }

        let record = match self.gifts.build(donation, &account.account_ref) {
            Ok(record) => record,
            Err(skip @ Skip::UnsupportedTender { .. }) => {
                warn!(reason = %skip, "Skipping donation");
                return;
            }
            Err(skip) => {
                warn!(reason = %skip, "Skipping donation");
                self.working.errors.push(skip.to_string());
                return;
            }
        };

        info!(donation_id = donation.id, account_ref = %account.account_ref, "Donation missing on target");
        self.staged.insert(donation.id);
        self.working.candidates.push(MigrationCandidate {
            label: self.label.clone(),
            target_donor_id: account.account_number(),
            target_donor_name: account.display_name(),
            source_donor_id: donor.id,
            source_donation_id: donation.id,
            source_donation_status: Some(donation.status.clone()),
            donation: record,
        });
    }
}
