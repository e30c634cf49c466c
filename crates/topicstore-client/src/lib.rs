//! Topicstore Client - storage facade for embedded widgets
//!
//! A widget picks its backend from settings and then only deals with one
//! JSON document:
//!
//! ```rust,ignore
//! use topicstore_client::{load_document, save_document, ClientStorage, EntryTree, StorageConfig};
//!
//! # async fn example(frame: topicstore_bridge::Window) -> topicstore_client::Result<()> {
//! let config = StorageConfig::from_value(serde_json::json!({"type": "topic_shared", "topic_id": 7}))?;
//! let storage = ClientStorage::from_config(&config, Some(frame), Default::default())?;
//!
//! let mut tree: EntryTree = load_document(&storage).await?;
//! tree.entry("season-1".into()).or_default().push(serde_json::json!({"topic_id": 40}));
//! save_document(&storage, &tree).await?;
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod document;
pub mod error;
pub mod facade;

pub use config::StorageConfig;
pub use document::{load_document, save_document, EntryTree};
pub use error::{ClientError, Result};
pub use facade::{
    BridgeStorageClient, ClientStorage, RestStorageClient, SaveStatus, StorageClient,
    EMPTY_DOCUMENT,
};
