//! Storage clients used by embedded widgets
//!
//! Widgets only see an opaque JSON string: load it, read it, replace it.
//! Whether it lives in a forum topic behind the hosting page or on a REST
//! endpoint is decided by [`StorageConfig`].

use crate::config::StorageConfig;
use crate::error::{ClientError, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use reqwest::header::CONTENT_TYPE;
use serde::{Deserialize, Serialize};
use topicstore_bridge::{BridgeClient, BridgeError, ClientConfig, Window};
use topicstore_core::{PostId, RevisionSnapshot, TopicId};

/// Document held before the first load
pub const EMPTY_DOCUMENT: &str = "{}";

/// How a save ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveStatus {
    /// Backend acknowledged the new document
    Confirmed,
    /// Save was sent but not observed; it may still land
    Unconfirmed,
}

impl SaveStatus {
    /// Whether the save was observed
    #[inline]
    #[must_use]
    pub fn is_confirmed(self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

/// A loadable, replaceable JSON document
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Fetch the current document into the local copy
    async fn load_data(&self) -> Result<()>;

    /// Replace the stored document with `data`
    async fn save_data(&self, data: &str) -> Result<SaveStatus>;

    /// Local copy of the document
    fn get_data(&self) -> String;
}

/// Document stored in a forum topic, reached through the hosting page
#[derive(Debug)]
pub struct BridgeStorageClient {
    bridge: BridgeClient,
    data: RwLock<RevisionSnapshot>,
}

impl BridgeStorageClient {
    /// Connect `frame` to its parent for `topic`
    ///
    /// # Errors
    /// `ClientError::Bridge` if `frame` has no parent.
    pub fn connect(frame: Window, topic: TopicId, config: ClientConfig) -> Result<Self> {
        Ok(Self::new(BridgeClient::connect(frame, topic, config)?))
    }

    /// Wrap an existing bridge client
    #[must_use]
    pub fn new(bridge: BridgeClient) -> Self {
        Self {
            bridge,
            data: RwLock::new(RevisionSnapshot {
                data: EMPTY_DOCUMENT.to_string(),
                ..RevisionSnapshot::default()
            }),
        }
    }

    /// Topic backing the document
    #[inline]
    #[must_use]
    pub fn topic(&self) -> TopicId {
        self.bridge.topic()
    }

    /// Post the local copy came from, if known
    #[must_use]
    pub fn revision(&self) -> Option<PostId> {
        self.data.read().post_id
    }
}

#[async_trait]
impl StorageClient for BridgeStorageClient {
    async fn load_data(&self) -> Result<()> {
        let snapshot = self.bridge.load().await?;
        tracing::debug!(topic = %self.topic(), post = ?snapshot.post_id, "document loaded");
        *self.data.write() = snapshot;
        Ok(())
    }

    async fn save_data(&self, data: &str) -> Result<SaveStatus> {
        // Optimistic: the widget keeps working with what it wrote, unless
        // the host refuses the save outright.
        let previous = std::mem::replace(&mut self.data.write().data, data.to_string());

        let reply = match self.bridge.save(data).await {
            Ok(reply) => reply,
            Err(e) => {
                self.data.write().data = previous;
                return Err(e.into());
            }
        };
        if !reply.confirmed {
            return Ok(SaveStatus::Unconfirmed);
        }
        if let Some(snapshot) = reply.snapshot {
            *self.data.write() = snapshot;
        }
        Ok(SaveStatus::Confirmed)
    }

    fn get_data(&self) -> String {
        self.data.read().data.clone()
    }
}

/// Document stored at a REST endpoint; last write wins
#[derive(Debug)]
pub struct RestStorageClient {
    client: reqwest::Client,
    url: String,
    data: RwLock<String>,
}

impl RestStorageClient {
    /// Create client for `url`
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Create client reusing `client`
    #[must_use]
    pub fn with_client(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            data: RwLock::new(EMPTY_DOCUMENT.to_string()),
        }
    }

    /// Endpoint URL
    #[inline]
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl StorageClient for RestStorageClient {
    async fn load_data(&self) -> Result<()> {
        let body = self
            .client
            .get(&self.url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        *self.data.write() = body;
        Ok(())
    }

    async fn save_data(&self, data: &str) -> Result<SaveStatus> {
        self.client
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .body(data.to_string())
            .send()
            .await?
            .error_for_status()?;
        *self.data.write() = data.to_string();
        Ok(SaveStatus::Confirmed)
    }

    fn get_data(&self) -> String {
        self.data.read().clone()
    }
}

/// Client chosen from a [`StorageConfig`]
#[derive(Debug)]
pub enum ClientStorage {
    /// Shared forum topic
    Bridge(BridgeStorageClient),
    /// REST endpoint
    Rest(RestStorageClient),
}

impl ClientStorage {
    /// Build the client `config` asks for
    ///
    /// `frame` is the widget's own window and is only needed for
    /// topic-backed storage.
    ///
    /// # Errors
    /// `ClientError::Bridge` if topic-backed storage has no usable frame.
    pub fn from_config(
        config: &StorageConfig,
        frame: Option<Window>,
        bridge_config: ClientConfig,
    ) -> Result<Self> {
        match config {
            StorageConfig::TopicShared { topic_id } => {
                let frame = frame.ok_or(ClientError::Bridge(BridgeError::NoParent))?;
                let client = BridgeStorageClient::connect(frame, *topic_id, bridge_config)?;
                Ok(Self::Bridge(client))
            }
            StorageConfig::Rest { url } => Ok(Self::Rest(RestStorageClient::new(url.as_str()))),
        }
    }

    fn inner(&self) -> &dyn StorageClient {
        match self {
            Self::Bridge(client) => client,
            Self::Rest(client) => client,
        }
    }
}

#[async_trait]
impl StorageClient for ClientStorage {
    async fn load_data(&self) -> Result<()> {
        self.inner().load_data().await
    }

    async fn save_data(&self, data: &str) -> Result<SaveStatus> {
        self.inner().save_data(data).await
    }

    fn get_data(&self) -> String {
        self.inner().get_data()
    }
}
