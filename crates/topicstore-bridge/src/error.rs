//! Error types for the cross-window bridge

use crate::message::ErrorKind;
use std::time::Duration;

/// Bridge error type
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Client window is not embedded in a host page
    #[error("window has no parent to talk to")]
    NoParent,

    /// No response before the client's deadline
    #[error("no response after {}ms", .waited.as_millis())]
    Timeout {
        /// How long we waited
        waited: Duration,
    },

    /// Host answered with an error
    #[error("host rejected request ({kind:?}): {message}")]
    Rejected {
        /// Error class reported by the host
        kind: ErrorKind,
        /// Detail reported by the host
        message: String,
    },

    /// Message could not be encoded or decoded
    #[error("malformed message: {0}")]
    Malformed(String),

    /// Host answered with the wrong message type
    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),

    /// Client listener is gone
    #[error("bridge closed")]
    Closed,
}

impl BridgeError {
    /// Check if the request may succeed when repeated
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Rejected { kind, .. } => {
                matches!(kind, ErrorKind::Transport | ErrorKind::Timeout)
            }
            _ => false,
        }
    }
}
