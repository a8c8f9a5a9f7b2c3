//! Error types for fetching and caching market tables

use std::time::Duration;

use thiserror::Error;

use crate::data::MarketKey;

/// Errors produced while resolving a market table
///
/// Errors are `Clone` so a single fetch outcome can be handed to every caller
/// waiting on the same in-flight fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CacheError {
    /// A fetch attempt exceeded its time budget and was aborted
    #[error("Request to {url} timed out after {timeout:?}")]
    NetworkTimeout { url: String, timeout: Duration },

    /// Transport error or non-success response
    #[error("Network request failed: {0}")]
    NetworkFailure(String),

    /// Payload did not match the expected tabular schema
    #[error("Failed to parse table: {0}")]
    ParseFailure(String),

    /// Persistent storage rejected a write for lack of space
    #[error("Persistent storage is full")]
    StorageCapacityExceeded,

    /// A persisted entry could not be decoded
    #[error("Corrupt cache entry '{0}'")]
    StorageReadCorrupt(String),

    /// Persistent storage failed for another reason
    #[error("Storage error: {0}")]
    StorageFailure(String),

    /// The key is not part of the market catalog
    #[error("Unknown market: {0}")]
    UnknownMarket(MarketKey),
}

impl CacheError {
    /// Whether the error came from the network side of a fetch
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            CacheError::NetworkTimeout { .. } | CacheError::NetworkFailure(_)
        )
    }
}

impl From<reqwest::Error> for CacheError {
    fn from(err: reqwest::Error) -> Self {
        CacheError::NetworkFailure(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_network_classification() {
        let timeout = CacheError::NetworkTimeout {
            url: "http://x".to_string(),
            timeout: Duration::from_secs(1),
        };
        assert!(timeout.is_network());
        assert!(CacheError::NetworkFailure("502".into()).is_network());
        assert!(!CacheError::ParseFailure("bad".into()).is_network());
        assert!(!CacheError::StorageCapacityExceeded.is_network());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            CacheError::UnknownMarket(MarketKey::new("xx")).to_string(),
            "Unknown market: xx"
        );
        assert_eq!(
            CacheError::StorageCapacityExceeded.to_string(),
            "Persistent storage is full"
        );
    }
}
