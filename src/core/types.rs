use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as JsonValue};

/// Status code the source platform uses for approved donations.
pub const APPROVED_STATUS: u32 = 1;

/// Tender type the source platform uses for credit card payments.
pub const CARD_TENDER: u32 = 1;

// ============================================================================
// Source platform records
// ============================================================================

/// Donor snapshot as returned by the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDonor {
    pub id: u64,
    /// Secondary key linking the donor to a target account.
    #[serde(default, deserialize_with = "optional_key")]
    pub crm_second_key: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SourceDonor {
    pub fn display_name(&self) -> String {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeName {
    pub id: u32,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fund {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub fund: Fund,
}

/// Donation as returned by the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceDonation {
    pub id: u64,
    /// Amount in minor currency units.
    pub amount_in_cents: i64,
    pub date_created: String,
    pub payment_tender_type: CodeName,
    #[serde(default)]
    pub last4: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub allocations: Vec<Allocation>,
    pub status: CodeName,
    #[serde(default)]
    pub donor: Option<SourceDonor>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl SourceDonation {
    pub fn is_approved(&self) -> bool {
        self.status.id == APPROVED_STATUS
    }

    pub fn fund_name(&self) -> Option<&str> {
        self.allocations.first().map(|a| a.fund.name.as_str())
    }
}

// ============================================================================
// Target platform records
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefinedValue {
    pub field_name: String,
    #[serde(default)]
    pub value: Option<JsonValue>,
}

/// Account record held by the target platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetAccount {
    /// Opaque handle used for every later target operation.
    #[serde(rename = "ref")]
    pub account_ref: String,
    /// Account number, sent as a number or a numeric string.
    #[serde(default)]
    pub id: Option<JsonValue>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub first_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub last_name: Option<String>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub account_defined_values: Vec<DefinedValue>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

impl TargetAccount {
    pub fn display_name(&self) -> String {
        join_name(self.first_name.as_deref(), self.last_name.as_deref())
    }

    pub fn account_number(&self) -> Option<i64> {
        match self.id.as_ref()? {
            JsonValue::Number(n) => n.as_i64(),
            JsonValue::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Text of a defined value; numbers are rendered as written.
    pub fn defined_value(&self, field_name: &str) -> Option<String> {
        self.account_defined_values
            .iter()
            .find(|dv| dv.field_name == field_name)
            .and_then(|dv| match dv.value.as_ref()? {
                JsonValue::String(s) => Some(s.clone()),
                JsonValue::Number(n) => Some(n.to_string()),
                _ => None,
            })
    }
}

/// Journal entry already stored on the target platform.
///
/// Entries of every kind share one listing, so only the note is read;
/// everything else is kept as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct TargetDonation {
    #[serde(default, deserialize_with = "lenient_text")]
    pub note: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CashValuable {
    pub note: String,
}

/// Payment classification block of a target donation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Valuable {
    #[serde(rename = "type")]
    pub kind: u32,
    pub cash: CashValuable,
}

impl Valuable {
    pub fn cash() -> Self {
        Self {
            kind: 1,
            cash: CashValuable::default(),
        }
    }
}

/// Donation record submitted to the target platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetDonationRecord {
    pub account_ref: String,
    pub date: String,
    pub amount: String,
    pub fund: String,
    pub approach: String,
    pub note: String,
    pub valuable: Valuable,
}

// ============================================================================
// Reconciliation results
// ============================================================================

/// A source donation missing on the target, paired with its target account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCandidate {
    pub label: String,
    #[serde(default)]
    pub target_donor_id: Option<i64>,
    pub target_donor_name: String,
    pub source_donor_id: u64,
    pub source_donation_id: u64,
    #[serde(default)]
    pub source_donation_status: Option<CodeName>,
    pub donation: TargetDonationRecord,
}

/// Donors sharing one secondary key on the source platform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateKeyGroup {
    pub label: String,
    pub crm_key: String,
    pub donors: Vec<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnmatchedDonation {
    pub source_donation_id: u64,
    pub amount: String,
    pub notes: String,
}

/// Source donor without a secondary key, with the donations it made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedAccount {
    #[serde(flatten)]
    pub donor: SourceDonor,
    pub donations: Vec<UnmatchedDonation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceScan {
    pub label: String,
    pub donor: SourceDonor,
    pub donations: Vec<SourceDonation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetScan {
    pub label: String,
    pub donor: TargetAccount,
    pub donations: Vec<TargetDonation>,
}

fn join_name(first: Option<&str>, last: Option<&str>) -> String {
    format!("{} {}", first.unwrap_or_default(), last.unwrap_or_default())
        .trim()
        .to_string()
}

/// Text fields that are not strings are treated as absent.
fn lenient_text<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::String(s)) => Some(s),
        _ => None,
    })
}

/// A missing, null or malformed list reads as empty.
fn lenient_list<'de, D>(deserializer: D) -> std::result::Result<Vec<DefinedValue>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<JsonValue>::deserialize(deserializer)? {
        Some(JsonValue::Array(items)) => items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect(),
        _ => Vec::new(),
    })
}

/// Secondary keys arrive as strings, numbers, empty strings or null.
fn optional_key<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<JsonValue>::deserialize(deserializer)?;
    Ok(match raw {
        Some(JsonValue::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Some(JsonValue::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}
