//! Topicstore Core - forum topics as revisioned document storage
//!
//! A forum topic is used as an append-only log:
//! - every post is a full snapshot (revision) of a JSON document
//! - the newest post is the current value
//! - writing means posting a reply through the human reply form
//! - a write is confirmed by polling until a new post shows up
//!
//! # Example
//!
//! ```rust,ignore
//! use topicstore_core::{ForumConfig, SharedTopicStore, StoreBackend, StoreConfig, TopicId};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = StoreConfig::forum_page();
//! let backend = StoreBackend::http(&ForumConfig::new("https://forum.example.org"), &config)?;
//! let store = SharedTopicStore::new(TopicId(1), backend, config);
//!
//! store.load_data().await?;
//! let outcome = store.save_data(r#"{"Now":[]}"#).await?;
//! println!("confirmed: {}", outcome.is_confirmed());
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod config;
pub mod error;
pub mod log;
pub mod poller;
pub mod registry;
pub mod revision;
pub mod state;
pub mod store;
pub mod submit;

pub use config::{ForumConfig, StoreConfig};
pub use error::{Result, StoreError, SubmitError};
pub use log::{parse_latest, HttpRevisionLog, RevisionLog};
pub use poller::{ChangeWatcher, IntervalPoller, DEFAULT_POLL_INTERVAL};
pub use registry::TopicRegistry;
pub use revision::{PostId, Revision, RevisionSnapshot, TopicId};
pub use state::{allowed_transitions, validate_transition, StoreStatus};
pub use store::{SaveOutcome, SharedTopicStore, StoreBackend};
pub use submit::{parse_reply_form, ReplyForm, ReplyFormSubmitter, ReplySubmitter, Submission};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
