//! Error types for the offline data subsystem
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Offline Error Enum ==
/// Unified error type for cache, queue and storage operations.
///
/// Read paths never surface these to callers (they degrade to a cache miss or an
/// error string on the result); write paths propagate them.
#[derive(Error, Debug)]
pub enum OfflineError {
    /// Underlying key-value store failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Underlying key-value store is out of space
    #[error("Storage full: {0}")]
    StorageFull(String),

    /// Value could not be encoded or decoded
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem failure in a disk-backed store
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Remote call failed or returned an unsuccessful status
    #[error("HTTP error: {0}")]
    Http(String),

    /// Key rejected before reaching storage
    #[error("Invalid key: {0}")]
    InvalidKey(String),
}

impl From<reqwest::Error> for OfflineError {
    fn from(err: reqwest::Error) -> Self {
        OfflineError::Http(err.to_string())
    }
}

// == Result Type Alias ==
/// Convenience Result type for the offline subsystem.
pub type Result<T> = std::result::Result<T, OfflineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OfflineError::StorageFull("quota of 10 bytes exceeded".to_string());
        assert_eq!(err.to_string(), "Storage full: quota of 10 bytes exceeded");

        let err = OfflineError::Http("500 Internal Server Error".to_string());
        assert!(err.to_string().starts_with("HTTP error"));
    }

    #[test]
    fn test_serde_error_converts() {
        let parse: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: OfflineError = parse.unwrap_err().into();
        assert!(matches!(err, OfflineError::Serialization(_)));
    }
}
