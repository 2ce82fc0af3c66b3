pub mod client;
pub mod rate_limit;

pub use client::SourceSystemClient;
pub use rate_limit::{Pause, RateLimitReply, TokioPause, parse_rate_limit};

use crate::core::{Result, SourceDonation, SourceDonor};
use async_trait::async_trait;

/// Filters for listing source donations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationQuery {
    pub donor_id: Option<u64>,
    /// `MM/DD/YYYY HH:MM:SS`, inclusive as the source applies it.
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    /// Keep only donations with the approved status code.
    pub approved_only: bool,
}

impl DonationQuery {
    pub fn for_donor(donor_id: u64) -> Self {
        Self {
            donor_id: Some(donor_id),
            ..Self::default()
        }
    }

    pub fn window(created_after: impl Into<String>, created_before: impl Into<String>) -> Self {
        Self {
            created_after: Some(created_after.into()),
            created_before: Some(created_before.into()),
            ..Self::default()
        }
    }

    pub fn approved_only(mut self, approved_only: bool) -> Self {
        self.approved_only = approved_only;
        self
    }
}

impl Default for DonationQuery {
    fn default() -> Self {
        Self {
            donor_id: None,
            created_after: None,
            created_before: None,
            approved_only: true,
        }
    }
}

/// Read access to the platform donations originate from.
#[async_trait]
pub trait SourceSystem: Send + Sync {
    /// The single donor carrying `secondary_key`.
    ///
    /// Fails with `DonorNotFound` for zero matches and `MultipleDonors`
    /// when the key is shared; ambiguity is never resolved here.
    async fn fetch_donor(&self, secondary_key: &str) -> Result<SourceDonor>;

    /// Every donation matching `query`, across all pages, in page order.
    async fn fetch_donations(&self, query: &DonationQuery) -> Result<Vec<SourceDonation>>;
}
