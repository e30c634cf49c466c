//! Embedded side of the bridge
//!
//! A frame cannot reach the forum itself, so it asks its parent window.
//! Each request gets a fresh [`RequestId`]; a listener task matches
//! responses to waiting callers by that id. The client enforces its own
//! deadline because a lost message (wrong origin, host navigated away)
//! never produces a response.

use crate::error::BridgeError;
use crate::message::{BridgeMessage, RequestId};
use crate::window::{Inbox, Window, WindowId, WindowPort, ANY_ORIGIN};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use topicstore_core::{RevisionSnapshot, TopicId};

type Pending = Arc<DashMap<RequestId, oneshot::Sender<BridgeMessage>>>;

/// Client configuration
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Deadline for one round trip
    pub request_timeout: Duration,
    /// Origin the parent window must have; `*` for any
    pub target_origin: String,
}

impl ClientConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// With target origin
    #[inline]
    #[must_use]
    pub fn with_target_origin(mut self, origin: impl Into<String>) -> Self {
        self.target_origin = origin.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            target_origin: ANY_ORIGIN.to_string(),
        }
    }
}

/// Host's answer to a save
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReply {
    /// Whether the host saw the new revision
    pub confirmed: bool,
    /// Host's cached revision after the save; `None` if no answer arrived
    pub snapshot: Option<RevisionSnapshot>,
}

/// Talks to a host-resident store for one topic
#[derive(Debug)]
pub struct BridgeClient {
    port: WindowPort,
    parent: WindowId,
    topic: TopicId,
    pending: Pending,
    listener: JoinHandle<()>,
    config: ClientConfig,
}

impl BridgeClient {
    /// Attach to the parent of `window`
    ///
    /// # Errors
    /// `BridgeError::NoParent` if `window` is not a frame.
    pub fn connect(window: Window, topic: TopicId, config: ClientConfig) -> Result<Self, BridgeError> {
        let (port, inbox) = window.into_parts();
        let parent = port.parent().ok_or(BridgeError::NoParent)?;
        let pending: Pending = Arc::new(DashMap::new());
        let listener = tokio::spawn(listen(inbox, parent, Arc::clone(&pending)));

        Ok(Self {
            port,
            parent,
            topic,
            pending,
            listener,
            config,
        })
    }

    /// Topic this client reads and writes
    #[inline]
    #[must_use]
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Requests still waiting for an answer
    #[must_use]
    pub fn pending_requests(&self) -> usize {
        self.pending.len()
    }

    /// Ask the host to load the topic
    ///
    /// # Errors
    /// `Timeout` without an answer, `Rejected` if the host failed.
    pub async fn load(&self) -> Result<RevisionSnapshot, BridgeError> {
        let response = self
            .request(|request_id| BridgeMessage::LoadSharedStorage {
                request_id: Some(request_id),
                topic_id: self.topic,
            })
            .await?;

        match response {
            BridgeMessage::LoadSharedStorageResponse { payload, .. } => Ok(payload),
            other => Err(unexpected(other)),
        }
    }

    /// Ask the host to save `payload`
    ///
    /// A missing answer is logged and reported as unconfirmed, since the
    /// host may still be writing.
    ///
    /// # Errors
    /// `Rejected` if the host refused or failed the save.
    pub async fn save(&self, payload: &str) -> Result<SaveReply, BridgeError> {
        let result = self
            .request(|request_id| BridgeMessage::SaveSharedStorage {
                request_id: Some(request_id),
                topic_id: self.topic,
                payload: payload.to_string(),
            })
            .await;

        match result {
            Ok(BridgeMessage::SaveSharedStorageResponse {
                confirmed, payload, ..
            }) => Ok(SaveReply {
                confirmed,
                snapshot: Some(payload),
            }),
            Ok(other) => Err(unexpected(other)),
            Err(BridgeError::Timeout { waited }) => {
                tracing::warn!(
                    topic = %self.topic,
                    waited_ms = waited.as_millis(),
                    "no save response from host; save unconfirmed"
                );
                Ok(SaveReply {
                    confirmed: false,
                    snapshot: None,
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn request<F>(&self, build: F) -> Result<BridgeMessage, BridgeError>
    where
        F: FnOnce(RequestId) -> BridgeMessage,
    {
        let request_id = RequestId::new();
        let data = build(request_id).to_value()?;
        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id, tx);
        let _entry = PendingEntry {
            pending: &self.pending,
            request_id,
        };

        if !self
            .port
            .post_message(self.parent, data, &self.config.target_origin)
        {
            // Browsers report nothing here; the deadline below still applies.
            tracing::debug!(%request_id, "request not delivered to parent");
        }

        let waited = self.config.request_timeout;
        let response = match tokio::time::timeout(waited, rx).await {
            Ok(Ok(response)) => response,
            Ok(Err(_)) => return Err(BridgeError::Closed),
            Err(_) => return Err(BridgeError::Timeout { waited }),
        };

        match response {
            BridgeMessage::SharedStorageError { kind, message, .. } => {
                Err(BridgeError::Rejected { kind, message })
            }
            other => Ok(other),
        }
    }
}

/// Drops a request's pending slot on every exit, including cancellation
struct PendingEntry<'a> {
    pending: &'a Pending,
    request_id: RequestId,
}

impl Drop for PendingEntry<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}

impl Drop for BridgeClient {
    fn drop(&mut self) {
        self.listener.abort();
    }
}

fn unexpected(message: BridgeMessage) -> BridgeError {
    BridgeError::UnexpectedResponse(format!("{message:?}"))
}

/// Route responses from the parent to their waiting requests
async fn listen(mut inbox: Inbox, parent: WindowId, pending: Pending) {
    while let Some(event) = inbox.recv().await {
        if event.source != parent {
            continue;
        }
        let Ok(message) = BridgeMessage::from_value(event.data) else {
            continue;
        };
        if message.is_request() {
            continue;
        }
        let Some(request_id) = message.request_id() else {
            tracing::debug!("uncorrelated response ignored");
            continue;
        };
        match pending.remove(&request_id) {
            Some((_, waiter)) => {
                let _ = waiter.send(message);
            }
            None => tracing::debug!(%request_id, "late or unknown response ignored"),
        }
    }
}
