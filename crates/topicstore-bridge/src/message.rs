//! Bridge message envelope
//!
//! Requests and responses travel as JSON objects tagged by `type`. Each
//! request carries a fresh `requestId` that the host echoes back, so any
//! number of requests may be in flight for the same topic.
//!
//! Older deployments name the messages `shared_storage_load` /
//! `shared_storage_save` (plus `_response`), send `topic_id` instead of
//! `topicId`, or nest the topic id inside `payload`; all of these are
//! accepted on input, and responses are named in the family the request
//! used (see [`Naming`]).

use crate::error::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use topicstore_core::{RevisionSnapshot, StoreError, TopicId};
use uuid::Uuid;

/// Per-request correlation id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    /// Generate new request ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error classes reported back to clients
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Forum unreachable or failing
    Transport,
    /// Topic has no revision yet
    NotFound,
    /// No revision appeared in time
    Timeout,
    /// Save for a topic the host never loaded
    UnknownTopic,
    /// Forum response could not be read
    Decode,
    /// Reply could not be submitted
    Submit,
    /// Anything else
    Internal,
}

impl From<&StoreError> for ErrorKind {
    fn from(err: &StoreError) -> Self {
        match err {
            StoreError::Transport(_) => Self::Transport,
            StoreError::NotFound(_) => Self::NotFound,
            StoreError::Timeout { .. } => Self::Timeout,
            StoreError::UnknownTopic(_) => Self::UnknownTopic,
            StoreError::Decode(_) => Self::Decode,
            StoreError::Submit(_) => Self::Submit,
            StoreError::InvalidTransition { .. } => Self::Internal,
        }
    }
}

/// Message-type naming family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Naming {
    /// `load_shared_storage`, `save_shared_storage_response`, ...
    #[default]
    Standard,
    /// `shared_storage_load`, `shared_storage_save_response`, ...
    Legacy,
}

impl Naming {
    /// Family of a posted message's `type`
    #[must_use]
    pub fn of(data: &Value) -> Self {
        match data.get("type").and_then(Value::as_str) {
            Some(tag) if RENAMES.iter().any(|(_, legacy)| *legacy == tag) => Self::Legacy,
            _ => Self::Standard,
        }
    }
}

const RENAMES: &[(&str, &str)] = &[
    ("load_shared_storage", "shared_storage_load"),
    ("load_shared_storage_response", "shared_storage_load_response"),
    ("save_shared_storage", "shared_storage_save"),
    ("save_shared_storage_response", "shared_storage_save_response"),
];

fn to_legacy(tag: &str) -> Option<&'static str> {
    RENAMES
        .iter()
        .find(|(standard, _)| *standard == tag)
        .map(|(_, legacy)| *legacy)
}

/// Every message the bridge understands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BridgeMessage {
    /// Client asks for the current revision
    #[serde(alias = "shared_storage_load")]
    LoadSharedStorage {
        /// Correlation id; absent from legacy clients
        #[serde(
            rename = "requestId",
            alias = "request_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<RequestId>,
        /// Topic to load
        #[serde(rename = "topicId", alias = "topic_id")]
        topic_id: TopicId,
    },

    /// Host answers a load
    #[serde(alias = "shared_storage_load_response")]
    LoadSharedStorageResponse {
        /// Echoed correlation id
        #[serde(
            rename = "requestId",
            alias = "request_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<RequestId>,
        /// Topic loaded
        #[serde(rename = "topicId", alias = "topic_id")]
        topic_id: TopicId,
        /// Cached revision after the load
        payload: RevisionSnapshot,
    },

    /// Client asks to store a new document
    #[serde(alias = "shared_storage_save")]
    SaveSharedStorage {
        /// Correlation id; absent from legacy clients
        #[serde(
            rename = "requestId",
            alias = "request_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<RequestId>,
        /// Topic to write
        #[serde(rename = "topicId", alias = "topic_id")]
        topic_id: TopicId,
        /// Serialized document
        payload: String,
    },

    /// Host answers a save
    #[serde(alias = "shared_storage_save_response")]
    SaveSharedStorageResponse {
        /// Echoed correlation id
        #[serde(
            rename = "requestId",
            alias = "request_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<RequestId>,
        /// Topic written
        #[serde(rename = "topicId", alias = "topic_id")]
        topic_id: TopicId,
        /// Whether the new revision was observed
        confirmed: bool,
        /// Cached revision after the save
        payload: RevisionSnapshot,
    },

    /// Host could not serve a request
    SharedStorageError {
        /// Echoed correlation id
        #[serde(
            rename = "requestId",
            alias = "request_id",
            default,
            skip_serializing_if = "Option::is_none"
        )]
        request_id: Option<RequestId>,
        /// Topic of the failed request
        #[serde(rename = "topicId", alias = "topic_id")]
        topic_id: TopicId,
        /// Error class
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
}

impl BridgeMessage {
    /// Decode a posted message
    ///
    /// # Errors
    /// `BridgeError::Malformed` if `data` is not a bridge message.
    pub fn from_value(mut data: Value) -> Result<Self, BridgeError> {
        lift_nested_topic(&mut data);
        serde_json::from_value(data).map_err(|e| BridgeError::Malformed(e.to_string()))
    }

    /// Encode for posting
    ///
    /// # Errors
    /// `BridgeError::Malformed` if serialization fails.
    pub fn to_value(&self) -> Result<Value, BridgeError> {
        serde_json::to_value(self).map_err(|e| BridgeError::Malformed(e.to_string()))
    }

    /// Encode for posting, naming the type in `naming`'s family
    ///
    /// `shared_storage_error` has a single name and is left as is.
    ///
    /// # Errors
    /// `BridgeError::Malformed` if serialization fails.
    pub fn to_value_as(&self, naming: Naming) -> Result<Value, BridgeError> {
        let mut value = self.to_value()?;
        if naming == Naming::Legacy {
            if let Some(obj) = value.as_object_mut() {
                let legacy = obj.get("type").and_then(Value::as_str).and_then(to_legacy);
                if let Some(legacy) = legacy {
                    obj.insert("type".to_string(), Value::from(legacy));
                }
            }
        }
        Ok(value)
    }

    /// Correlation id, if any
    #[must_use]
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::LoadSharedStorage { request_id, .. }
            | Self::LoadSharedStorageResponse { request_id, .. }
            | Self::SaveSharedStorage { request_id, .. }
            | Self::SaveSharedStorageResponse { request_id, .. }
            | Self::SharedStorageError { request_id, .. } => *request_id,
        }
    }

    /// Topic the message is about
    #[must_use]
    pub fn topic_id(&self) -> TopicId {
        match self {
            Self::LoadSharedStorage { topic_id, .. }
            | Self::LoadSharedStorageResponse { topic_id, .. }
            | Self::SaveSharedStorage { topic_id, .. }
            | Self::SaveSharedStorageResponse { topic_id, .. }
            | Self::SharedStorageError { topic_id, .. } => *topic_id,
        }
    }

    /// Whether this is a client request
    #[must_use]
    pub fn is_request(&self) -> bool {
        matches!(
            self,
            Self::LoadSharedStorage { .. } | Self::SaveSharedStorage { .. }
        )
    }

    /// Error response for `request`
    #[must_use]
    pub fn error_for(request: &Self, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self::SharedStorageError {
            request_id: request.request_id(),
            topic_id: request.topic_id(),
            kind,
            message: message.into(),
        }
    }
}

/// Move `payload.topicId` up to the envelope and unwrap `payload.data`
fn lift_nested_topic(data: &mut Value) {
    let Some(obj) = data.as_object_mut() else {
        return;
    };
    if obj.contains_key("topicId") || obj.contains_key("topic_id") {
        return;
    }
    let Some(Value::Object(nested)) = obj.get("payload").cloned() else {
        return;
    };
    let Some(topic) = nested.get("topicId").or_else(|| nested.get("topic_id")) else {
        return;
    };
    obj.insert("topicId".to_string(), topic.clone());
    match nested.get("data") {
        Some(doc) => {
            obj.insert("payload".to_string(), doc.clone());
        }
        None => {
            obj.remove("payload");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_round_trips_through_json() {
        let msg = BridgeMessage::SaveSharedStorage {
            request_id: Some(RequestId::new()),
            topic_id: TopicId(1),
            payload: r#"{"a":[1]}"#.to_string(),
        };
        let value = msg.to_value().unwrap();
        assert_eq!(value["type"], "save_shared_storage");
        assert_eq!(value["topicId"], 1);
        assert_eq!(BridgeMessage::from_value(value).unwrap(), msg);
    }

    #[test]
    fn legacy_names_are_accepted() {
        let msg = BridgeMessage::from_value(json!({
            "type": "shared_storage_load",
            "topic_id": 4
        }))
        .unwrap();
        assert_eq!(
            msg,
            BridgeMessage::LoadSharedStorage {
                request_id: None,
                topic_id: TopicId(4)
            }
        );

        let msg = BridgeMessage::from_value(json!({
            "type": "shared_storage_save",
            "topic_id": 4,
            "payload": "{}"
        }))
        .unwrap();
        assert!(matches!(msg, BridgeMessage::SaveSharedStorage { ref payload, .. } if payload == "{}"));
    }

    #[test]
    fn topic_inside_payload_is_lifted() {
        let msg = BridgeMessage::from_value(json!({
            "type": "load_shared_storage",
            "payload": {"topicId": 8}
        }))
        .unwrap();
        assert_eq!(msg.topic_id(), TopicId(8));

        let msg = BridgeMessage::from_value(json!({
            "type": "save_shared_storage",
            "payload": {"topicId": 8, "data": "{\"x\":1}"}
        }))
        .unwrap();
        assert!(matches!(msg, BridgeMessage::SaveSharedStorage { ref payload, .. } if payload == "{\"x\":1}"));
    }

    #[test]
    fn responses_follow_request_naming() {
        let request = json!({"type": "shared_storage_save", "topic_id": 2, "payload": "{}"});
        assert_eq!(Naming::of(&request), Naming::Legacy);
        assert_eq!(
            Naming::of(&json!({"type": "save_shared_storage"})),
            Naming::Standard
        );
        assert_eq!(Naming::of(&json!({"type": "shared_storage_error"})), Naming::Standard);

        let response = BridgeMessage::SaveSharedStorageResponse {
            request_id: None,
            topic_id: TopicId(2),
            confirmed: true,
            payload: RevisionSnapshot::default(),
        };
        let legacy = response.to_value_as(Naming::Legacy).unwrap();
        assert_eq!(legacy["type"], "shared_storage_save_response");
        assert_eq!(BridgeMessage::from_value(legacy).unwrap(), response);
        assert_eq!(
            response.to_value_as(Naming::Standard).unwrap()["type"],
            "save_shared_storage_response"
        );

        let error = BridgeMessage::error_for(&response, ErrorKind::Internal, "x");
        assert_eq!(
            error.to_value_as(Naming::Legacy).unwrap()["type"],
            "shared_storage_error"
        );
    }

    #[test]
    fn foreign_messages_are_malformed() {
        assert!(BridgeMessage::from_value(json!({"type": "resize", "height": 300})).is_err());
        assert!(BridgeMessage::from_value(json!("hello")).is_err());
    }

    #[test]
    fn error_kind_from_store_error() {
        assert_eq!(
            ErrorKind::from(&StoreError::NotFound(TopicId(1))),
            ErrorKind::NotFound
        );
        assert_eq!(
            ErrorKind::from(&StoreError::UnknownTopic(TopicId(1))),
            ErrorKind::UnknownTopic
        );
    }
}
