pub mod session;
pub mod transport;

pub use session::TargetSystemClient;
pub use transport::{HttpRpcTransport, RpcFault, RpcTransport};

use crate::core::{Result, TargetAccount, TargetDonation, TargetDonationRecord};
use async_trait::async_trait;

/// One account lookup against the target platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountLookup {
    ById(String),
    ByUniqueField { name: String, value: String },
}

/// How secondary keys are turned into account lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupStrategy {
    ById,
    UniqueField(String),
}

impl LookupStrategy {
    pub fn lookup(&self, secondary_key: &str) -> AccountLookup {
        match self {
            Self::ById => AccountLookup::ById(secondary_key.to_string()),
            Self::UniqueField(name) => AccountLookup::ByUniqueField {
                name: name.clone(),
                value: secondary_key.to_string(),
            },
        }
    }
}

/// Access to the platform receiving migrated donations.
///
/// Every error returned here is a session fault; callers treat it as fatal.
#[async_trait]
pub trait TargetSystem: Send + Sync {
    async fn resolve_account(&self, lookup: &AccountLookup) -> Result<Option<TargetAccount>>;

    /// The account's complete donation history, across all pages.
    async fn fetch_account_donations(&self, account_ref: &str) -> Result<Vec<TargetDonation>>;

    /// Creates the record and returns the target's reference for it.
    async fn create_donation(&self, record: &TargetDonationRecord) -> Result<String>;
}
