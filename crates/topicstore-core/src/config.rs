//! Configuration for stores and forum adapters

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Store timing configuration
///
/// The save timeout depends on how quickly the forum makes a reply visible
/// in a given deployment, so it is always an input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Delay between two reads while waiting for a write
    pub poll_interval_ms: u64,
    /// How long a save waits for its revision to become visible
    pub save_timeout_ms: u64,
}

impl StoreConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Timings used behind the cross-window bridge (5 s)
    #[inline]
    #[must_use]
    pub fn bridge() -> Self {
        Self {
            poll_interval_ms: 500,
            save_timeout_ms: 5_000,
        }
    }

    /// Timings used when running on the forum page itself (50 s)
    #[inline]
    #[must_use]
    pub fn forum_page() -> Self {
        Self {
            poll_interval_ms: 500,
            save_timeout_ms: 50_000,
        }
    }

    /// With save timeout
    #[inline]
    #[must_use]
    pub fn with_save_timeout(mut self, timeout: Duration) -> Self {
        self.save_timeout_ms = duration_ms(timeout);
        self
    }

    /// With poll interval
    #[inline]
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = duration_ms(interval);
        self
    }

    /// Poll interval as a duration
    #[inline]
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Save timeout as a duration
    #[inline]
    #[must_use]
    pub fn save_timeout(&self) -> Duration {
        Duration::from_millis(self.save_timeout_ms)
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::bridge()
    }
}

/// Where the forum lives and what its reply page looks like
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForumConfig {
    /// Scheme and host, e.g. `https://forum.example.org`
    pub base_url: String,
    /// Post query endpoint
    pub read_path: String,
    /// Human topic page carrying the reply form
    pub view_path: String,
    /// `id` of the reply form
    pub form_id: String,
    /// `id` of the reply textarea
    pub textarea_id: String,
    /// Field name used when the textarea has no `name`
    pub textarea_name: String,
    /// `name` of the submit control
    pub submit_name: String,
    /// Per-request HTTP timeout
    pub request_timeout_ms: u64,
}

impl ForumConfig {
    /// Create configuration for a forum at `base_url`
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// URL of the post query endpoint
    #[must_use]
    pub fn read_url(&self) -> String {
        join_url(&self.base_url, &self.read_path)
    }

    /// URL of the human topic page
    #[must_use]
    pub fn view_url(&self) -> String {
        join_url(&self.base_url, &self.view_path)
    }

    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for ForumConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost".to_string(),
            read_path: "/api.php".to_string(),
            view_path: "/viewtopic.php".to_string(),
            form_id: "post".to_string(),
            textarea_id: "main-reply".to_string(),
            textarea_name: "req_message".to_string(),
            submit_name: "submit".to_string(),
            request_timeout_ms: 10_000,
        }
    }
}

fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
