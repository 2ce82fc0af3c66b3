//! Source donation ids embedded in target note text.
//!
//! The target platform has no field for a foreign key, so every migrated
//! donation carries `Donation ID: <id>` inside its free-text note. Historical
//! records were written both with and without the space after the colon.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref DONATION_ID: Regex = Regex::new(r"Donation ID: ?([0-9]+)").unwrap();
    static ref CARD_LAST4: Regex = Regex::new(r"card ending in x([0-9]+)").unwrap();
}

/// Canonical note for a card donation migrated from the source platform.
pub fn encode(source_donation_id: u64, last4: Option<&str>, comment: Option<&str>) -> String {
    let mut note = format!(
        "Processed by RaiseDonors using credit card ending in x{} RaiseDonor Donation ID: {}.",
        last4.unwrap_or_default(),
        source_donation_id
    );
    if let Some(comment) = comment.map(str::trim).filter(|c| !c.is_empty()) {
        note.push_str(" Comment: ");
        note.push_str(comment);
    }
    note
}

/// Source donation id carried by a note, if any.
pub fn decode(text: &str) -> Option<u64> {
    DONATION_ID
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse().ok())
}

pub fn decode_card_last4(text: &str) -> Option<String> {
    CARD_LAST4
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when `note` references `source_donation_id`. Unparseable notes never match.
pub fn exists(note: &str, source_donation_id: u64) -> bool {
    decode(note) == Some(source_donation_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEGACY: &str = "Processed by RaiseDonors using credit card ending in x1922. \
        RaiseDonor Donation ID:219252. Comment: Donation for General";

    #[test]
    fn test_decode_without_space() {
        assert_eq!(decode(LEGACY), Some(219252));
    }

    #[test]
    fn test_decode_with_space() {
        assert_eq!(decode("RaiseDonor Donation ID: 77."), Some(77));
    }

    #[test]
    fn test_decode_absent_marker() {
        assert_eq!(decode(""), None);
        assert_eq!(decode("Cash gift at gala"), None);
        assert_eq!(decode("Donation ID: pending"), None);
    }

    #[test]
    fn test_decode_overflowing_id_is_absent() {
        assert_eq!(decode("Donation ID: 99999999999999999999999"), None);
    }

    #[test]
    fn test_encode_round_trips() {
        let note = encode(4815, Some("4242"), Some("In memory of Grandma"));
        assert_eq!(
            note,
            "Processed by RaiseDonors using credit card ending in x4242 RaiseDonor Donation ID: 4815. Comment: In memory of Grandma"
        );
        assert_eq!(decode(&note), Some(4815));
        assert_eq!(decode_card_last4(&note).as_deref(), Some("4242"));
    }

    #[test]
    fn test_encode_skips_blank_comment() {
        let note = encode(1, Some("0001"), Some("   "));
        assert!(note.ends_with("Donation ID: 1."));
    }

    #[test]
    fn test_exists() {
        assert!(exists(LEGACY, 219252));
        assert!(!exists(LEGACY, 219253));
        assert!(!exists("no marker here", 219252));
    }
}
