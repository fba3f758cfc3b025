//! Ledger failures

use thiserror::Error;

/// Ledger result
pub type Result<T> = std::result::Result<T, Error>;

/// Everything the ledger can fail with
#[derive(Error, Debug)]
pub enum Error {
    /// Proof-of-work sealing could not run (digest unavailable, mining task aborted)
    #[error("Sealing failure: {0}")]
    Sealing(String),

    /// Canonical JSON encoding failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Chain verification failed at a specific block
    #[error("Integrity violation at block {index}: {reason}")]
    Integrity {
        /// Index of the first offending block
        index: u64,
        /// What did not match
        reason: String,
    },

    /// The writer task is gone or dropped a reply
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Rejected configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Collector could not be registered
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    /// Export or inspection I/O
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn integrity(index: u64, reason: impl Into<String>) -> Self {
        Error::Integrity {
            index,
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            Error::integrity(3, "prev_hash mismatch").to_string(),
            "Integrity violation at block 3: prev_hash mismatch"
        );
        assert_eq!(
            Error::Config("difficulty 9 exceeds 6".to_string()).to_string(),
            "Configuration error: difficulty 9 exceeds 6"
        );
    }
}
