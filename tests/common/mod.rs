#![allow(dead_code)]

use async_trait::async_trait;
use chrono::FixedOffset;
use donorsync::core::{
    SourceDonation, SourceDonor, TargetAccount, TargetDonation, TargetDonationRecord,
};
use donorsync::{
    AccountLookup, DonationQuery, GiftBuilder, Result, SourceSystem, SyncError, TargetSystem,
};
use serde_json::{Value as JsonValue, json};
use std::collections::HashMap;
use std::sync::Mutex;

/// Source platform held in memory.
#[derive(Default)]
pub struct FakeSource {
    /// Raw donor records by secondary key.
    pub donors: HashMap<String, Vec<JsonValue>>,
    /// Donation history by donor id.
    pub histories: HashMap<u64, Vec<SourceDonation>>,
    /// Donations returned for window queries.
    pub recent: Vec<SourceDonation>,
    /// Secondary keys whose lookup fails in transit.
    pub broken_keys: Vec<String>,
}

impl FakeSource {
    pub fn with_donor(mut self, key: &str, donor: JsonValue) -> Self {
        self.donors.entry(key.to_string()).or_default().push(donor);
        self
    }

    pub fn with_history(mut self, donor_id: u64, donations: Vec<SourceDonation>) -> Self {
        self.histories.insert(donor_id, donations);
        self
    }
}

#[async_trait]
impl SourceSystem for FakeSource {
    async fn fetch_donor(&self, secondary_key: &str) -> Result<SourceDonor> {
        if self.broken_keys.iter().any(|k| k == secondary_key) {
            return Err(SyncError::Transport("connection reset".to_string()));
        }
        let donors = self.donors.get(secondary_key).cloned().unwrap_or_default();
        let body = JsonValue::Array(donors.clone()).to_string();
        match donors.len() {
            0 => Err(SyncError::DonorNotFound {
                key: secondary_key.to_string(),
                body,
            }),
            1 => Ok(serde_json::from_value(donors[0].clone()).unwrap()),
            _ => Err(SyncError::MultipleDonors {
                key: secondary_key.to_string(),
                donors,
                body,
            }),
        }
    }

    async fn fetch_donations(&self, query: &DonationQuery) -> Result<Vec<SourceDonation>> {
        let all = match query.donor_id {
            Some(id) => self.histories.get(&id).cloned().unwrap_or_default(),
            None => self.recent.clone(),
        };
        Ok(all
            .into_iter()
            .filter(|d| !query.approved_only || d.is_approved())
            .collect())
    }
}

/// Target platform held in memory; created records join the journal.
#[derive(Default)]
pub struct FakeTarget {
    pub accounts: Vec<TargetAccount>,
    pub journals: Mutex<HashMap<String, Vec<TargetDonation>>>,
    pub created: Mutex<Vec<TargetDonationRecord>>,
    pub history_fetches: Mutex<usize>,
    /// Number of creates that succeed before the session faults.
    pub fault_after: Option<usize>,
    pub fault_on_lookup: bool,
}

impl FakeTarget {
    pub fn with_account(mut self, account: TargetAccount) -> Self {
        self.accounts.push(account);
        self
    }

    pub fn with_notes(self, account_ref: &str, notes: &[String]) -> Self {
        let entries = notes
            .iter()
            .map(|n| TargetDonation {
                note: Some(n.clone()),
                ..TargetDonation::default()
            })
            .collect();
        self.journals
            .lock()
            .unwrap()
            .insert(account_ref.to_string(), entries);
        self
    }

    pub fn created(&self) -> Vec<TargetDonationRecord> {
        self.created.lock().unwrap().clone()
    }

    pub fn history_fetches(&self) -> usize {
        *self.history_fetches.lock().unwrap()
    }
}

#[async_trait]
impl TargetSystem for FakeTarget {
    async fn resolve_account(&self, lookup: &AccountLookup) -> Result<Option<TargetAccount>> {
        if self.fault_on_lookup {
            return Err(SyncError::SessionFault {
                code: "SOAP-ENV:Server".to_string(),
                message: "session expired".to_string(),
            });
        }
        let found = self.accounts.iter().find(|a| match lookup {
            AccountLookup::ById(id) => a.account_number().map(|i| i.to_string()).as_ref() == Some(id),
            AccountLookup::ByUniqueField { name, value } => a.defined_value(name).as_ref() == Some(value),
        });
        Ok(found.cloned())
    }

    async fn fetch_account_donations(&self, account_ref: &str) -> Result<Vec<TargetDonation>> {
        *self.history_fetches.lock().unwrap() += 1;
        Ok(self
            .journals
            .lock()
            .unwrap()
            .get(account_ref)
            .cloned()
            .unwrap_or_default())
    }

    async fn create_donation(&self, record: &TargetDonationRecord) -> Result<String> {
        let mut created = self.created.lock().unwrap();
        if self.fault_after.is_some_and(|limit| created.len() >= limit) {
            return Err(SyncError::SessionFault {
                code: "SOAP-ENV:Server".to_string(),
                message: "addGift failed".to_string(),
            });
        }
        created.push(record.clone());
        self.journals
            .lock()
            .unwrap()
            .entry(record.account_ref.clone())
            .or_default()
            .push(TargetDonation {
                note: Some(record.note.clone()),
                ..TargetDonation::default()
            });
        Ok(format!("gift.{}", created.len()))
    }
}

pub fn donor_json(id: u64, key: Option<&str>, first: &str, last: &str) -> JsonValue {
    json!({
        "id": id,
        "crmSecondKey": key,
        "firstName": first,
        "lastName": last,
        "addresses": [{"address1": "1 Main St", "city": "Springfield", "state": "IL", "zip": "62701"}]
    })
}

pub fn donor(id: u64, key: Option<&str>) -> SourceDonor {
    serde_json::from_value(donor_json(id, key, "Ada", "Lovelace")).unwrap()
}

pub fn card_donation(id: u64, cents: i64) -> SourceDonation {
    serde_json::from_value(json!({
        "id": id,
        "amountInCents": cents,
        "dateCreated": "2024-03-05T18:45:00",
        "paymentTenderType": {"id": 1, "name": "Credit Card"},
        "last4": "4242",
        "comment": null,
        "allocations": [{"fund": {"name": "General Fund (Restricted)"}}],
        "status": {"id": 1, "name": "Approved"}
    }))
    .unwrap()
}

pub fn donation_by(id: u64, cents: i64, donor: &SourceDonor) -> SourceDonation {
    let mut donation = card_donation(id, cents);
    donation.donor = Some(donor.clone());
    donation
}

pub fn account(account_ref: &str, id: i64) -> TargetAccount {
    serde_json::from_value(json!({
        "ref": account_ref,
        "id": id,
        "firstName": "Ada",
        "lastName": "Lovelace",
        "accountDefinedValues": [
            {"fieldName": "Live eTap Account Number", "value": id.to_string()}
        ]
    }))
    .unwrap()
}

pub fn utc_gifts() -> GiftBuilder {
    GiftBuilder::new(FixedOffset::east_opt(0).unwrap())
}
