//! Revision model
//!
//! A topic is an append-only sequence of posts. Each post is one
//! [`Revision`] of the stored document; the one with the greatest
//! `post_number` is the current value.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Forum topic identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(pub u64);

impl fmt::Display for TopicId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TopicId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Forum post identifier
///
/// Only compared for equality; ordering of revisions comes from
/// [`Revision::post_number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(pub u64);

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One immutable version of the stored document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revision {
    /// Post carrying this revision
    #[serde(rename = "id")]
    pub post_id: PostId,
    /// Position of the post in its topic
    #[serde(rename = "number")]
    pub post_number: u64,
    /// Serialized document
    pub message: String,
}

impl Revision {
    /// Create new revision
    #[inline]
    #[must_use]
    pub fn new(post_id: u64, post_number: u64, message: impl Into<String>) -> Self {
        Self {
            post_id: PostId(post_id),
            post_number,
            message: message.into(),
        }
    }
}

/// Cached view handed out by `get_data`
///
/// Ids are `None` until the first successful load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevisionSnapshot {
    /// Post id of the cached revision
    pub post_id: Option<PostId>,
    /// Post number of the cached revision
    pub post_number: Option<u64>,
    /// Serialized document
    pub data: String,
}

impl From<&Revision> for RevisionSnapshot {
    fn from(rev: &Revision) -> Self {
        Self {
            post_id: Some(rev.post_id),
            post_number: Some(rev.post_number),
            data: rev.message.clone(),
        }
    }
}
