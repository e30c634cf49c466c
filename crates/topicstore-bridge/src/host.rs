//! Hosting side of the bridge
//!
//! The host page owns the [`TopicRegistry`] and is the only code that
//! touches it. Embedded frames send requests; the host serves each one in
//! its own task and replies to the exact window that asked.

use crate::message::{BridgeMessage, ErrorKind, Naming};
use crate::window::{MessageEvent, Window, WindowPort};
use std::sync::Arc;
use tokio::task::JoinHandle;
use topicstore_core::{StoreError, TopicRegistry};

/// Which origins may use the host's stores
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum OriginPolicy {
    /// Accept requests from any origin
    #[default]
    Any,
    /// Accept requests only from these origins
    AllowList(Vec<String>),
}

impl OriginPolicy {
    /// Whether `origin` may send requests
    #[must_use]
    pub fn allows(&self, origin: &str) -> bool {
        match self {
            Self::Any => true,
            Self::AllowList(origins) => origins.iter().any(|o| o == origin),
        }
    }
}

/// Host configuration
#[derive(Debug, Clone, Default)]
pub struct HostConfig {
    /// Origin filter for incoming requests
    pub origins: OriginPolicy,
}

impl HostConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With origin allow-list
    #[must_use]
    pub fn with_allowed_origins<I, S>(mut self, origins: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.origins = OriginPolicy::AllowList(origins.into_iter().map(Into::into).collect());
        self
    }
}

/// Serves shared topic stores to embedded frames
#[derive(Debug)]
pub struct BridgeHost {
    window: Window,
    registry: Arc<TopicRegistry>,
    config: HostConfig,
}

impl BridgeHost {
    /// Create a host listening on `window`
    #[must_use]
    pub fn new(window: Window, registry: Arc<TopicRegistry>, config: HostConfig) -> Self {
        Self {
            window,
            registry,
            config,
        }
    }

    /// Stores served by this host
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &Arc<TopicRegistry> {
        &self.registry
    }

    /// Run the host loop on a background task
    #[must_use]
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Serve requests until the task is aborted or the inbox closes
    pub async fn run(self) {
        let Self {
            window,
            registry,
            config,
        } = self;
        let (port, mut inbox) = window.into_parts();
        tracing::info!(window = %port.id(), "bridge host listening");

        while let Some(event) = inbox.recv().await {
            if !config.origins.allows(&event.origin) {
                tracing::warn!(origin = %event.origin, "request from disallowed origin ignored");
                continue;
            }
            let naming = Naming::of(&event.data);
            let message = match BridgeMessage::from_value(event.data.clone()) {
                Ok(message) if message.is_request() => message,
                Ok(_) => continue,
                Err(e) => {
                    tracing::debug!(source = %event.source, error = %e, "ignoring foreign message");
                    continue;
                }
            };

            let port = port.clone();
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                let response = serve(&registry, &message).await;
                reply(&port, &event, &response, naming);
            });
        }

        tracing::info!(window = %port.id(), "bridge host stopped");
    }
}

/// Handle one request against the registry
async fn serve(registry: &TopicRegistry, request: &BridgeMessage) -> BridgeMessage {
    match request {
        BridgeMessage::LoadSharedStorage {
            request_id,
            topic_id,
        } => {
            match registry.load(*topic_id).await {
                Ok((_, payload)) => BridgeMessage::LoadSharedStorageResponse {
                    request_id: *request_id,
                    topic_id: *topic_id,
                    payload,
                },
                Err(e) => store_error(request, &e),
            }
        }
        BridgeMessage::SaveSharedStorage {
            request_id,
            topic_id,
            payload,
        } => {
            let Some(store) = registry.get(*topic_id) else {
                tracing::warn!(topic = %topic_id, "save requested for unknown topic");
                return store_error(request, &StoreError::UnknownTopic(*topic_id));
            };
            match store.save_data(payload).await {
                Ok(outcome) => BridgeMessage::SaveSharedStorageResponse {
                    request_id: *request_id,
                    topic_id: *topic_id,
                    confirmed: outcome.is_confirmed(),
                    payload: store.get_data(),
                },
                Err(e) => store_error(request, &e),
            }
        }
        other => BridgeMessage::error_for(other, ErrorKind::Internal, "not a request"),
    }
}

fn store_error(request: &BridgeMessage, err: &StoreError) -> BridgeMessage {
    BridgeMessage::error_for(request, ErrorKind::from(err), err.to_string())
}

/// Answer only the window that asked, only at its origin, in its naming
fn reply(port: &WindowPort, event: &MessageEvent, response: &BridgeMessage, naming: Naming) {
    let data = match response.to_value_as(naming) {
        Ok(data) => data,
        Err(e) => {
            tracing::error!(error = %e, "failed to encode bridge response");
            return;
        }
    };
    if !port.post_message(event.source, data, &event.origin) {
        tracing::debug!(window = %event.source, "requesting window gone before reply");
    }
}
