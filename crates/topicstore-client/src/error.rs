//! Client error types

use thiserror::Error;
use topicstore_bridge::BridgeError;

/// Result type for client operations
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

/// Errors from storage clients
#[derive(Error, Debug)]
pub enum ClientError {
    /// Storage configuration names an unknown backend
    #[error("unsupported storage type: {0}")]
    UnsupportedStorage(String),

    /// Storage configuration is not usable
    #[error("invalid storage config: {0}")]
    InvalidConfig(String),

    /// Bridge round trip failed
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// REST endpoint failed
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Stored document is not the expected JSON
    #[error("document error: {0}")]
    Document(#[from] serde_json::Error),
}

impl ClientError {
    /// Check if error is retryable
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Bridge(e) => e.is_retryable(),
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn bridge_timeouts_are_retryable() {
        let err = ClientError::from(BridgeError::Timeout {
            waited: Duration::from_secs(1),
        });
        assert!(err.is_retryable());
        assert!(!ClientError::UnsupportedStorage("ftp".into()).is_retryable());
    }
}
