//! Storage backend selection

use crate::error::{ClientError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use topicstore_core::TopicId;

/// Where a widget keeps its document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Forum topic shared through the hosting page
    TopicShared {
        /// Topic holding the document
        topic_id: TopicId,
    },
    /// Plain REST endpoint
    Rest {
        /// Endpoint serving and accepting the document
        url: String,
    },
}

impl StorageConfig {
    /// Shared topic storage
    #[inline]
    #[must_use]
    pub fn topic_shared(topic_id: TopicId) -> Self {
        Self::TopicShared { topic_id }
    }

    /// REST storage
    #[inline]
    #[must_use]
    pub fn rest(url: impl Into<String>) -> Self {
        Self::Rest { url: url.into() }
    }

    /// Parse widget settings
    ///
    /// # Errors
    /// `UnsupportedStorage` for an unknown `type`, `InvalidConfig` when the
    /// fields do not fit the named type.
    pub fn from_value(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| ClientError::InvalidConfig("missing storage type".to_string()))?;
        if !matches!(kind, "topic_shared" | "rest") {
            return Err(ClientError::UnsupportedStorage(kind.to_string()));
        }
        serde_json::from_value(value).map_err(|e| ClientError::InvalidConfig(e.to_string()))
    }
}
