//! Value conversions between the source and target record formats.

use super::error::{Result, SyncError};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Offset, TimeZone};

/// Text format the source platform expects for `createdAfter`/`createdBefore`.
const WINDOW_FORMAT: &str = "%m/%d/%Y %H:%M:%S";

/// Minor units to a 2-decimal major-unit string: `12345` -> `"123.45"`.
pub fn cents_to_amount(cents: i64) -> String {
    let sign = if cents < 0 { "-" } else { "" };
    let abs = cents.unsigned_abs();
    format!("{}{}.{:02}", sign, abs / 100, abs % 100)
}

/// Fund label used on the target: the source name up to the first `" ("`.
pub fn fund_label(source_fund: &str) -> String {
    match source_fund.find(" (") {
        Some(idx) => source_fund[..idx].trim().to_string(),
        None => source_fund.trim().to_string(),
    }
}

/// Calendar date of a source timestamp, as written by the source.
pub fn parse_source_date(text: &str) -> Result<NaiveDate> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Ok(dt.date_naive());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(dt.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Ok(date);
    }
    NaiveDate::parse_from_str(text, "%m/%d/%Y")
        .map_err(|_| SyncError::Serialization(format!("Unrecognized source date '{}'", text)))
}

/// Midnight of `date` in `zone`, e.g. `2024-03-05T00:00:00-05:00`.
///
/// The offset is the one in effect at that midnight, so dates on either
/// side of a daylight-saving change keep their own offset. An ambiguous
/// midnight takes the earlier instant; a skipped one takes the offset
/// the zone reports for that wall-clock time read as UTC.
pub fn target_date_text<Tz: TimeZone>(date: NaiveDate, zone: &Tz) -> String {
    let midnight = date.and_time(NaiveTime::MIN);
    let offset = match zone.from_local_datetime(&midnight).earliest() {
        Some(dt) => dt.offset().fix(),
        None => zone.offset_from_utc_datetime(&midnight).fix(),
    };
    match offset.from_local_datetime(&midnight).single() {
        Some(dt) => dt.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
        None => midnight.format("%Y-%m-%dT%H:%M:%S").to_string(),
    }
}

/// Day-aligned `(createdAfter, createdBefore)` bounds of the trailing window ending today.
pub fn window_bounds(today: NaiveDate, days: u32) -> (String, String) {
    let start = today - Duration::days(i64::from(days));
    let format = |date: NaiveDate| {
        date.and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .format(WINDOW_FORMAT)
            .to_string()
    };
    (format(start), format(today))
}
