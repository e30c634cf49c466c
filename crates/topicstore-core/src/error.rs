//! Error types for topicstore core
//!
//! Covers the failure modes of the revision log:
//! - Transport failures while reading or submitting
//! - Empty topics (no revision yet)
//! - Writes that never became visible
//! - Requests against topics the caller never opened

use crate::revision::TopicId;
use crate::state::StoreStatus;
use std::time::Duration;

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Network or API failure while talking to the forum
    #[error("transport error: {0}")]
    Transport(String),

    /// Topic exists but has no posts yet
    #[error("topic {0} has no revisions")]
    NotFound(TopicId),

    /// No new revision became visible before the deadline
    #[error("no new revision for topic {topic} after {}ms", .waited.as_millis())]
    Timeout {
        /// Topic being watched
        topic: TopicId,
        /// How long we waited
        waited: Duration,
    },

    /// Operation against a topic that was never loaded
    #[error("unknown topic: {0}")]
    UnknownTopic(TopicId),

    /// Forum answered with something we cannot read
    #[error("malformed forum response: {0}")]
    Decode(String),

    /// The reply surface could not be driven
    #[error("reply submission failed: {0}")]
    Submit(#[from] SubmitError),

    /// Illegal store state change
    #[error("invalid transition {from:?} -> {to:?}")]
    InvalidTransition {
        /// Current status
        from: StoreStatus,
        /// Requested status
        to: StoreStatus,
    },
}

impl StoreError {
    /// Check if the error may go away on retry
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Timeout { .. })
    }

    /// Check if this is the "topic is empty" case
    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Failures of the reply surface
#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    /// Reply page could not be fetched
    #[error("reply page unavailable: {0}")]
    PageUnavailable(String),

    /// Reply page markup no longer matches what we expect
    #[error("reply form not found: {0}")]
    FormNotFound(String),

    /// Invalid base URL or form action
    #[error("invalid url: {0}")]
    InvalidUrl(String),
}

/// Result alias for store operations
pub type Result<T, E = StoreError> = std::result::Result<T, E>;
