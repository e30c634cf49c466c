//! Per-topic store state machine
//!
//! ```text
//! Uninitialized -> Loaded -> Saving -> Loaded   (new revision observed)
//!                                   -> Stale    (save unconfirmed)
//! ```
//!
//! `Saving -> Saving` covers overlapping saves on the same topic; they are
//! not serialized.

use crate::error::StoreError;
use serde::{Deserialize, Serialize};

/// Status of a shared topic store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreStatus {
    /// Nothing fetched yet
    Uninitialized,
    /// Cache matches the last observed revision
    Loaded,
    /// A write is in flight
    Saving,
    /// Last save was not confirmed; cache may lag the topic
    Stale,
}

impl StoreStatus {
    /// Whether the store holds a revision worth reading
    #[inline]
    #[must_use]
    pub fn has_data(self) -> bool {
        !matches!(self, Self::Uninitialized)
    }
}

/// Validates a status transition
///
/// # Errors
/// `StoreError::InvalidTransition` if `to` is not reachable from `from`.
pub fn validate_transition(from: StoreStatus, to: StoreStatus) -> Result<(), StoreError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StoreError::InvalidTransition { from, to })
    }
}

/// All statuses reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: StoreStatus) -> &'static [StoreStatus] {
    use StoreStatus::{Loaded, Saving, Stale, Uninitialized};
    match from {
        Uninitialized | Loaded | Stale => &[Loaded, Saving],
        Saving => &[Saving, Loaded, Stale, Uninitialized],
    }
}
