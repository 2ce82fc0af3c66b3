use serde_json::Value as JsonValue;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Donor with secondary key '{key}' not found. Response: {body}")]
    DonorNotFound { key: String, body: String },

    #[error("Multiple donors ({}) share secondary key '{key}'. Response: {body}", .donors.len())]
    MultipleDonors {
        key: String,
        donors: Vec<JsonValue>,
        body: String,
    },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected HTTP status {status}: {body}")]
    UnexpectedStatus { status: u16, body: String },

    #[error("Target session fault [{code}]: {message}")]
    SessionFault { code: String, message: String },

    #[error("Staged artifact error: {0}")]
    Artifact(String),

    #[error("Run ledger error: {0}")]
    Ledger(String),

    #[error("Run #{0} is still discovering; finish it before starting another")]
    RunInProgress(u64),

    #[error("Candidates of run #{0} were already executed")]
    AlreadyExecuted(u64),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, SyncError>;

impl SyncError {
    /// Whether the error must abort the whole batch instead of a single row.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::DonorNotFound { .. }
            | Self::MultipleDonors { .. }
            | Self::Transport(_)
            | Self::UnexpectedStatus { .. } => false,
            Self::SessionFault { .. }
            | Self::Artifact(_)
            | Self::Ledger(_)
            | Self::RunInProgress(_)
            | Self::AlreadyExecuted(_)
            | Self::Config(_)
            | Self::Io(_)
            | Self::Serialization(_) => true,
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_row_errors_are_not_fatal() {
        let not_found = SyncError::DonorNotFound {
            key: "42".to_string(),
            body: "[]".to_string(),
        };
        assert!(!not_found.is_fatal());
        assert!(!SyncError::Transport("reset".to_string()).is_fatal());
    }

    #[test]
    fn session_and_artifact_errors_are_fatal() {
        let fault = SyncError::SessionFault {
            code: "SOAP-ENV:Server".to_string(),
            message: "session expired".to_string(),
        };
        assert!(fault.is_fatal());
        assert!(SyncError::Artifact("missing summary".to_string()).is_fatal());
    }

    #[test]
    fn multiple_donors_message_counts_records() {
        let err = SyncError::MultipleDonors {
            key: "7".to_string(),
            donors: vec![serde_json::json!({"id": 1}), serde_json::json!({"id": 2})],
            body: "[..]".to_string(),
        };
        assert!(err.to_string().contains("Multiple donors (2)"));
    }
}
