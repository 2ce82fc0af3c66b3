use crate::core::convert::{cents_to_amount, fund_label, parse_source_date, target_date_text};
use crate::core::types::CARD_TENDER;
use crate::core::{SourceDonation, TargetDonationRecord, Valuable};
use crate::note;
use chrono::{FixedOffset, Local};
use std::fmt;

/// Acquisition channel recorded on every migrated donation.
pub const CHANNEL_TAG: &str = "Website";

/// Why a source donation produced no target record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// Only card payments can be described in the note format.
    UnsupportedTender { donation_id: u64, tender: u32 },
    InvalidDate { donation_id: u64, date: String },
}

impl fmt::Display for Skip {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedTender { donation_id, tender } => write!(
                f,
                "Unknown tender type {} for donation ID: {}",
                tender, donation_id
            ),
            Self::InvalidDate { donation_id, date } => write!(
                f,
                "Unreadable creation date '{}' for donation ID: {}",
                date, donation_id
            ),
        }
    }
}

/// Zone whose midnight dates the target records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateZone {
    /// Machine time zone, resolved separately for every date.
    Local,
    Fixed(FixedOffset),
}

/// Builds target donation records from source donations.
///
/// Every record is a cash-type journal entry dated at midnight of the
/// source creation date.
#[derive(Debug, Clone, Copy)]
pub struct GiftBuilder {
    zone: DateZone,
}

impl GiftBuilder {
    /// Dates every record with the same fixed offset.
    pub fn new(offset: FixedOffset) -> Self {
        Self {
            zone: DateZone::Fixed(offset),
        }
    }

    /// Dates each record with the local offset in effect on its own date.
    pub fn local() -> Self {
        Self {
            zone: DateZone::Local,
        }
    }

    pub fn build(
        &self,
        donation: &SourceDonation,
        account_ref: &str,
    ) -> Result<TargetDonationRecord, Skip> {
        if donation.payment_tender_type.id != CARD_TENDER {
            return Err(Skip::UnsupportedTender {
                donation_id: donation.id,
                tender: donation.payment_tender_type.id,
            });
        }

        let date = parse_source_date(&donation.date_created).map_err(|_| Skip::InvalidDate {
            donation_id: donation.id,
            date: donation.date_created.clone(),
        })?;

        Ok(TargetDonationRecord {
            account_ref: account_ref.to_string(),
            date: match self.zone {
                DateZone::Local => target_date_text(date, &Local),
                DateZone::Fixed(offset) => target_date_text(date, &offset),
            },
            amount: cents_to_amount(donation.amount_in_cents),
            fund: donation.fund_name().map(fund_label).unwrap_or_default(),
            approach: CHANNEL_TAG.to_string(),
            note: note::encode(
                donation.id,
                donation.last4.as_deref(),
                donation.comment.as_deref(),
            ),
            valuable: Valuable::cash(),
        })
    }
}

impl Default for GiftBuilder {
    fn default() -> Self {
        Self::local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn donation(tender: u32) -> SourceDonation {
        serde_json::from_value(json!({
            "id": 219252,
            "amountInCents": 12345,
            "dateCreated": "2024-03-05T18:45:00",
            "paymentTenderType": {"id": tender, "name": "Credit Card"},
            "last4": "1922",
            "comment": "Monthly gift",
            "allocations": [{"fund": {"name": "General Fund (Restricted)"}}],
            "status": {"id": 1, "name": "Approved"}
        }))
        .unwrap()
    }

    fn utc() -> GiftBuilder {
        GiftBuilder::new(FixedOffset::east_opt(0).unwrap())
    }

    #[test]
    fn test_card_donation_record() {
        let record = utc().build(&donation(1), "1234.0.5678").unwrap();
        assert_eq!(record.account_ref, "1234.0.5678");
        assert_eq!(record.date, "2024-03-05T00:00:00+00:00");
        assert_eq!(record.amount, "123.45");
        assert_eq!(record.fund, "General Fund");
        assert_eq!(record.approach, CHANNEL_TAG);
        assert_eq!(record.valuable, Valuable::cash());
        assert_eq!(note::decode(&record.note), Some(219252));
        assert!(record.note.contains("x1922"));
        assert!(record.note.ends_with("Comment: Monthly gift"));
    }

    #[test]
    fn test_check_donation_skipped() {
        let skip = utc().build(&donation(2), "1.0.1").unwrap_err();
        assert_eq!(
            skip,
            Skip::UnsupportedTender {
                donation_id: 219252,
                tender: 2
            }
        );
    }

    #[test]
    fn test_invalid_date_skipped() {
        let mut d = donation(1);
        d.date_created = "not a date".to_string();
        assert!(matches!(utc().build(&d, "1.0.1"), Err(Skip::InvalidDate { .. })));
    }

    #[test]
    fn test_missing_allocation_gives_empty_fund() {
        let mut d = donation(1);
        d.allocations.clear();
        assert_eq!(utc().build(&d, "1.0.1").unwrap().fund, "");
    }

    #[test]
    fn test_local_dates_stay_local_midnight_all_year() {
        use chrono::{DateTime, Local, NaiveDate, Timelike};

        for created in ["2024-01-05T09:00:00", "2024-07-05T09:00:00"] {
            let mut d = donation(1);
            d.date_created = created.to_string();
            let record = GiftBuilder::local().build(&d, "1.0.1").unwrap();

            let stamped = DateTime::parse_from_rfc3339(&record.date).unwrap();
            let wall = stamped.with_timezone(&Local);
            let expected = NaiveDate::parse_from_str(&created[..10], "%Y-%m-%d").unwrap();
            assert_eq!(wall.date_naive(), expected, "{}", record.date);
            assert_eq!(wall.hour(), 0, "{}", record.date);
        }
    }
}
