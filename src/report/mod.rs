//! CSV reports over a run's staged artifacts, for operator follow-up.

use crate::core::{MigrationCandidate, Result, SyncError, UnmatchedAccount};
use crate::note;
use crate::storage::ArtifactStore;
use crate::storage::io::atomic_write;
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::path::{Path, PathBuf};
use tracing::info;

pub const DONATIONS_REPORT: &str = "donations.csv";
pub const UNMATCHED_REPORT: &str = "unmatched_donors.csv";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DonationRow {
    pub donor_name: String,
    pub target_id: Option<i64>,
    pub source_id: u64,
    pub donation_amount: String,
    pub card_last4: Option<String>,
    pub status: Option<String>,
}

impl From<&MigrationCandidate> for DonationRow {
    fn from(candidate: &MigrationCandidate) -> Self {
        Self {
            donor_name: candidate.target_donor_name.clone(),
            target_id: candidate.target_donor_id,
            source_id: candidate.source_donor_id,
            donation_amount: candidate.donation.amount.clone(),
            card_last4: note::decode_card_last4(&candidate.donation.note),
            status: candidate
                .source_donation_status
                .as_ref()
                .and_then(|s| s.name.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedRow {
    pub donor_name: String,
    pub source_id: u64,
    pub address: Option<String>,
    pub donation_amount: String,
}

impl From<&UnmatchedAccount> for UnmatchedRow {
    fn from(unmatched: &UnmatchedAccount) -> Self {
        let total: f64 = unmatched
            .donations
            .iter()
            .filter_map(|d| d.amount.parse::<f64>().ok())
            .sum();
        Self {
            donor_name: unmatched.donor.display_name(),
            source_id: unmatched.donor.id,
            address: first_address(unmatched.donor.extra.get("addresses")),
            donation_amount: format!("{:.2}", total),
        }
    }
}

/// `address1, city, state zip` of the first listed address.
fn first_address(addresses: Option<&JsonValue>) -> Option<String> {
    let address = addresses?.as_array()?.first()?;
    let field = |name: &str| address.get(name).and_then(JsonValue::as_str);
    Some(format!(
        "{}, {}, {} {}",
        field("address1")?,
        field("city")?,
        field("state")?,
        field("zip")?
    ))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub donations: PathBuf,
    pub unmatched: PathBuf,
}

/// Writes both reports for `run` into `out_dir` (the run's directory by default).
pub async fn write_reports(
    store: &ArtifactStore,
    run: u64,
    out_dir: Option<&Path>,
) -> Result<ReportPaths> {
    let (summary, artifacts) = store.load(run).await?;
    let dir = out_dir.map_or_else(|| store.run_dir(run), Path::to_path_buf);

    let donations: Vec<DonationRow> = artifacts.candidates.iter().map(DonationRow::from).collect();
    let unmatched: Vec<UnmatchedRow> = artifacts
        .unmatched_accounts
        .iter()
        .map(UnmatchedRow::from)
        .collect();

    let paths = ReportPaths {
        donations: dir.join(DONATIONS_REPORT),
        unmatched: dir.join(UNMATCHED_REPORT),
    };
    atomic_write(&paths.donations, &to_csv(&donations)?).await?;
    atomic_write(&paths.unmatched, &to_csv(&unmatched)?).await?;

    info!(
        run,
        label = %summary.label,
        donations = donations.len(),
        unmatched = unmatched.len(),
        dir = %dir.display(),
        "Reports written"
    );
    Ok(paths)
}

fn to_csv<R: Serialize>(rows: &[R]) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    for row in rows {
        writer
            .serialize(row)
            .map_err(|e| SyncError::Serialization(format!("csv row: {}", e)))?;
    }
    writer
        .into_inner()
        .map_err(|e| SyncError::Serialization(format!("csv flush: {}", e)))
}
