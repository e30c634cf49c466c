//! Topicstore Bridge - shared topic stores across window boundaries
//!
//! Sandboxed frames cannot call the forum, so the hosting page owns the
//! stores and frames reach them through window messaging:
//! - [`WindowHub`] models windows, origins and inboxes
//! - [`BridgeHost`] serves load/save requests from a [`TopicRegistry`]
//! - [`BridgeClient`] issues requests and waits for correlated answers
//!
//! # Example
//!
//! ```rust,ignore
//! use topicstore_bridge::{BridgeClient, BridgeHost, ClientConfig, HostConfig, WindowHub};
//!
//! # async fn example(registry: std::sync::Arc<topicstore_core::TopicRegistry>) {
//! let hub = WindowHub::new();
//! let host_window = hub.open("https://forum.example.org");
//! let frame = hub.open_frame(&host_window, "https://widgets.example.org");
//! let _host = BridgeHost::new(host_window, registry, HostConfig::new()).spawn();
//!
//! let client = BridgeClient::connect(frame, 1.into(), ClientConfig::new()).unwrap();
//! let snapshot = client.load().await.unwrap();
//! # }
//! ```
//!
//! [`TopicRegistry`]: topicstore_core::TopicRegistry

#![warn(unreachable_pub)]

pub mod client;
pub mod error;
pub mod host;
pub mod message;
pub mod window;

pub use client::{BridgeClient, ClientConfig, SaveReply};
pub use error::BridgeError;
pub use host::{BridgeHost, HostConfig, OriginPolicy};
pub use message::{BridgeMessage, ErrorKind, Naming, RequestId};
pub use window::{Inbox, MessageEvent, Window, WindowHub, WindowId, WindowPort, ANY_ORIGIN};
