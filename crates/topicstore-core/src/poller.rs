//! Convergence poller
//!
//! Waits for a write to become visible by re-reading the log at a fixed
//! interval until the latest post id moves away from a baseline.
//!
//! Any new post satisfies the check, including one written by somebody
//! else. Posts carry no per-write token, so the poller cannot tell whose
//! reply it saw.

use crate::error::{Result, StoreError};
use crate::log::RevisionLog;
use crate::revision::{PostId, Revision, TopicId};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between two reads
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Detects when a topic gains a revision past a baseline
#[async_trait]
pub trait ChangeWatcher: Send + Sync {
    /// Wait for a revision whose post id differs from `baseline`
    ///
    /// A `None` baseline is satisfied by any revision.
    ///
    /// # Errors
    /// `StoreError::Timeout` if nothing new shows up within `timeout`.
    async fn await_change(
        &self,
        topic: TopicId,
        baseline: Option<PostId>,
        timeout: Duration,
    ) -> Result<Revision>;
}

/// [`ChangeWatcher`] that polls a [`RevisionLog`]
#[derive(Clone)]
pub struct IntervalPoller {
    log: Arc<dyn RevisionLog>,
    interval: Duration,
}

impl IntervalPoller {
    /// Create poller with the default interval
    #[must_use]
    pub fn new(log: Arc<dyn RevisionLog>) -> Self {
        Self::with_interval(log, DEFAULT_POLL_INTERVAL)
    }

    /// Create poller with a custom interval
    #[must_use]
    pub fn with_interval(log: Arc<dyn RevisionLog>, interval: Duration) -> Self {
        Self { log, interval }
    }

    /// Poll interval
    #[inline]
    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl std::fmt::Debug for IntervalPoller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntervalPoller")
            .field("interval", &self.interval)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl ChangeWatcher for IntervalPoller {
    async fn await_change(
        &self,
        topic: TopicId,
        baseline: Option<PostId>,
        timeout: Duration,
    ) -> Result<Revision> {
        let start = Instant::now();
        let mut polls = 0u32;

        while start.elapsed() < timeout {
            tokio::time::sleep(self.interval).await;
            polls += 1;

            match self.log.fetch_latest(topic).await {
                Ok(rev) if Some(rev.post_id) != baseline => {
                    tracing::debug!(%topic, post_id = %rev.post_id, polls, "new revision visible");
                    return Ok(rev);
                }
                Ok(_) => {}
                // Still empty, or a transient read failure: keep waiting.
                Err(e) => tracing::debug!(%topic, error = %e, "poll read failed"),
            }
        }

        Err(StoreError::Timeout {
            topic,
            waited: start.elapsed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MockRevisionLog;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn log_with_post_after(polls: u32) -> MockRevisionLog {
        let calls = Arc::new(AtomicU32::new(0));
        let mut log = MockRevisionLog::new();
        log.expect_fetch_latest().returning(move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= polls {
                Ok(Revision::new(2, 2, "new"))
            } else {
                Ok(Revision::new(1, 1, "old"))
            }
        });
        log
    }

    #[tokio::test(start_paused = true)]
    async fn returns_once_post_id_moves() {
        let poller = IntervalPoller::new(Arc::new(log_with_post_after(3)));
        let start = Instant::now();

        let rev = poller
            .await_change(TopicId(1), Some(PostId(1)), Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(rev.post_id, PostId(2));
        assert_eq!(start.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_nothing_changes() {
        let mut log = MockRevisionLog::new();
        log.expect_fetch_latest()
            .returning(|_| Ok(Revision::new(1, 1, "old")));
        let poller = IntervalPoller::new(Arc::new(log));

        let err = poller
            .await_change(TopicId(1), Some(PostId(1)), Duration::from_secs(2))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Timeout { topic: TopicId(1), .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn keeps_polling_through_read_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let mut log = MockRevisionLog::new();
        log.expect_fetch_latest().returning(move |topic| {
            match calls.fetch_add(1, Ordering::SeqCst) {
                0 => Err(StoreError::Transport("reset".to_string())),
                1 => Err(StoreError::NotFound(topic)),
                _ => Ok(Revision::new(4, 1, "first")),
            }
        });
        let poller = IntervalPoller::new(Arc::new(log));

        let rev = poller
            .await_change(TopicId(9), None, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(rev.post_id, PostId(4));
    }
}
