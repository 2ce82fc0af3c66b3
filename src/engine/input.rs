use crate::core::{Result, SyncError};
use std::path::Path;

/// Column holding the cross-system secondary key in bulk input files.
pub const ACCOUNT_NUMBER_COLUMN: &str = "Account Number";

/// Removes control and non-ASCII characters exported spreadsheets tend to carry.
fn clean(field: &str) -> String {
    field
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Secondary keys listed in the `Account Number` column, in file order.
pub fn load_account_numbers(path: &Path) -> Result<Vec<String>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .map_err(|e| SyncError::Io(format!("Failed to open '{}': {}", path.display(), e)))?;

    let headers = reader
        .headers()
        .map_err(|e| SyncError::Io(format!("Failed to read headers of '{}': {}", path.display(), e)))?;
    let column = headers
        .iter()
        .position(|h| clean(h) == ACCOUNT_NUMBER_COLUMN)
        .ok_or_else(|| {
            SyncError::Config(format!(
                "'{}' has no '{}' column",
                path.display(),
                ACCOUNT_NUMBER_COLUMN
            ))
        })?;

    let mut numbers = Vec::new();
    for record in reader.records() {
        let record = record
            .map_err(|e| SyncError::Io(format!("Failed to read '{}': {}", path.display(), e)))?;
        if let Some(value) = record.get(column).map(clean).filter(|v| !v.is_empty()) {
            numbers.push(value);
        }
    }
    Ok(numbers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_reads_account_numbers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.csv");
        std::fs::write(
            &path,
            "\u{feff}Name,Account Number\nAda,1001\nGrace, 1002 \nNo Key,\nShort\n",
        )
        .unwrap();

        assert_eq!(load_account_numbers(&path).unwrap(), vec!["1001", "1002"]);
    }

    #[test]
    fn test_missing_column() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("accounts.csv");
        std::fs::write(&path, "Name,Id\nAda,1\n").unwrap();
        assert!(matches!(load_account_numbers(&path), Err(SyncError::Config(_))));
    }
}
