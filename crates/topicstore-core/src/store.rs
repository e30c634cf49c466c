//! Shared topic store
//!
//! Combines the revision log, the reply submitter and the change watcher
//! into the `load_data` / `save_data` / `get_data` facade.
//!
//! # Consistency
//!
//! Right after a successful load or confirmed save the cache equals the
//! topic's current revision. In between it may lag. Overlapping saves on
//! the same topic are not serialized: the forum keeps whichever post lands
//! last, with no merge.
//!
//! A save whose revision never shows up is reported as
//! [`SaveOutcome::Unconfirmed`] and leaves the cache untouched. If that
//! write lands later, the cache only catches up on the next `load_data`.

use crate::config::{ForumConfig, StoreConfig};
use crate::error::{Result, StoreError};
use crate::log::{HttpRevisionLog, RevisionLog};
use crate::poller::{ChangeWatcher, IntervalPoller};
use crate::revision::{PostId, Revision, RevisionSnapshot, TopicId};
use crate::state::{validate_transition, StoreStatus};
use crate::submit::{ReplyFormSubmitter, ReplySubmitter};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a save
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SaveOutcome {
    /// A new revision became visible and is now cached
    Confirmed(Revision),
    /// Nothing new became visible in time; the write may still land
    Unconfirmed {
        /// Post id still cached after the attempt
        last_known: Option<PostId>,
    },
}

impl SaveOutcome {
    /// Whether the new revision was observed
    #[inline]
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed(_))
    }

    /// Post id of the revision cached after the save
    #[must_use]
    pub fn post_id(&self) -> Option<PostId> {
        match self {
            Self::Confirmed(rev) => Some(rev.post_id),
            Self::Unconfirmed { last_known } => *last_known,
        }
    }
}

/// Collaborators a store talks to
#[derive(Clone)]
pub struct StoreBackend {
    /// Reads the latest revision
    pub log: Arc<dyn RevisionLog>,
    /// Writes a new revision
    pub submitter: Arc<dyn ReplySubmitter>,
    /// Detects when a write became visible
    pub watcher: Arc<dyn ChangeWatcher>,
}

impl StoreBackend {
    /// Assemble a backend from its parts
    #[must_use]
    pub fn new(
        log: Arc<dyn RevisionLog>,
        submitter: Arc<dyn ReplySubmitter>,
        watcher: Arc<dyn ChangeWatcher>,
    ) -> Self {
        Self {
            log,
            submitter,
            watcher,
        }
    }

    /// Backend whose watcher polls `log` at the configured interval
    #[must_use]
    pub fn polling(
        log: Arc<dyn RevisionLog>,
        submitter: Arc<dyn ReplySubmitter>,
        config: &StoreConfig,
    ) -> Self {
        let watcher = Arc::new(IntervalPoller::with_interval(
            Arc::clone(&log),
            config.poll_interval(),
        ));
        Self::new(log, submitter, watcher)
    }

    /// Backend talking to a real forum over HTTP
    ///
    /// Reader and submitter share one cookie store, so the reply is posted
    /// with the same session the reads use.
    ///
    /// # Errors
    /// `StoreError::Transport` if the HTTP client cannot be built.
    pub fn http(forum: &ForumConfig, config: &StoreConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(forum.request_timeout())
            .cookie_store(true)
            .build()?;
        let log = Arc::new(HttpRevisionLog::with_client(client.clone(), forum));
        let submitter = Arc::new(ReplyFormSubmitter::with_client(client, forum.clone()));
        Ok(Self::polling(log, submitter, config))
    }
}

impl std::fmt::Debug for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreBackend").finish_non_exhaustive()
    }
}

/// How a save ended, for state bookkeeping
enum SaveEnd {
    Confirmed(Revision),
    Unconfirmed,
    Aborted,
}

#[derive(Debug)]
struct StoreState {
    current: Option<Revision>,
    status: StoreStatus,
    /// Status to settle in once the last in-flight save ends
    resume: StoreStatus,
    saves_in_flight: usize,
}

impl StoreState {
    fn adopt(&mut self, topic: TopicId, rev: Revision) {
        match &self.current {
            Some(cur) if rev.post_number < cur.post_number => {
                tracing::debug!(
                    %topic,
                    cached = cur.post_number,
                    fetched = rev.post_number,
                    "ignoring older revision"
                );
            }
            _ => self.current = Some(rev),
        }
    }

    fn transition(&mut self, to: StoreStatus) -> Result<()> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }
}

/// One topic used as a revisioned document store
#[derive(Debug)]
pub struct SharedTopicStore {
    topic: TopicId,
    backend: StoreBackend,
    config: StoreConfig,
    state: RwLock<StoreState>,
}

impl SharedTopicStore {
    /// Create an uninitialized store for `topic`
    #[must_use]
    pub fn new(topic: TopicId, backend: StoreBackend, config: StoreConfig) -> Self {
        Self {
            topic,
            backend,
            config,
            state: RwLock::new(StoreState {
                current: None,
                status: StoreStatus::Uninitialized,
                resume: StoreStatus::Uninitialized,
                saves_in_flight: 0,
            }),
        }
    }

    /// Topic backing this store
    #[inline]
    #[must_use]
    pub fn topic(&self) -> TopicId {
        self.topic
    }

    /// Store configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Current status
    #[must_use]
    pub fn status(&self) -> StoreStatus {
        self.state.read().status
    }

    /// Cached revision, if any
    #[must_use]
    pub fn current(&self) -> Option<Revision> {
        self.state.read().current.clone()
    }

    /// Cached payload and its ids; never performs I/O
    #[must_use]
    pub fn get_data(&self) -> RevisionSnapshot {
        self.state
            .read()
            .current
            .as_ref()
            .map(RevisionSnapshot::from)
            .unwrap_or_default()
    }

    /// Fetch the latest revision and cache it
    ///
    /// On failure the previous cache is kept.
    ///
    /// # Errors
    /// Propagates `Transport`, `NotFound` and `Decode` from the log.
    pub async fn load_data(&self) -> Result<RevisionSnapshot> {
        let rev = self.backend.log.fetch_latest(self.topic).await?;
        tracing::debug!(topic = %self.topic, post_id = %rev.post_id, "loaded revision");

        let mut state = self.state.write();
        state.adopt(self.topic, rev);
        if state.status == StoreStatus::Saving {
            state.resume = StoreStatus::Loaded;
        } else {
            state.transition(StoreStatus::Loaded)?;
        }
        Ok(state
            .current
            .as_ref()
            .map(RevisionSnapshot::from)
            .unwrap_or_default())
    }

    /// Write `payload` as a new revision and wait for it to show up
    ///
    /// An unconfirmed write is not an error: it is logged and reported as
    /// [`SaveOutcome::Unconfirmed`], and the cache keeps its last observed
    /// revision. Callers wanting certainty should `load_data` again.
    ///
    /// # Errors
    /// `StoreError::Submit` if the write could not be started.
    pub async fn save_data(&self, payload: &str) -> Result<SaveOutcome> {
        let baseline = self.begin_save()?;
        tracing::info!(
            topic = %self.topic,
            baseline = ?baseline,
            bytes = payload.len(),
            "saving revision"
        );

        let submission = match self.backend.submitter.submit(self.topic, payload).await {
            Ok(submission) => submission,
            Err(e) => {
                self.end_save(SaveEnd::Aborted)?;
                return Err(e);
            }
        };

        let observed = self
            .backend
            .watcher
            .await_change(self.topic, baseline, self.config.save_timeout())
            .await;
        submission.close();

        match observed {
            Ok(rev) => {
                tracing::info!(topic = %self.topic, post_id = %rev.post_id, "save confirmed");
                self.end_save(SaveEnd::Confirmed(rev.clone()))?;
                Ok(SaveOutcome::Confirmed(rev))
            }
            Err(e) => {
                tracing::warn!(
                    topic = %self.topic,
                    error = %e,
                    "post may not have been updated in time"
                );
                self.end_save(SaveEnd::Unconfirmed)?;
                Ok(SaveOutcome::Unconfirmed {
                    last_known: self.state.read().current.as_ref().map(|r| r.post_id),
                })
            }
        }
    }

    fn begin_save(&self) -> Result<Option<PostId>> {
        let mut state = self.state.write();
        if state.status != StoreStatus::Saving {
            state.resume = state.status;
        }
        state.transition(StoreStatus::Saving)?;
        state.saves_in_flight += 1;
        Ok(state.current.as_ref().map(|r| r.post_id))
    }

    fn end_save(&self, end: SaveEnd) -> Result<()> {
        let mut state = self.state.write();
        state.saves_in_flight = state.saves_in_flight.saturating_sub(1);
        match end {
            SaveEnd::Confirmed(rev) => {
                state.adopt(self.topic, rev);
                state.resume = StoreStatus::Loaded;
            }
            SaveEnd::Unconfirmed => state.resume = StoreStatus::Stale,
            SaveEnd::Aborted => {}
        }
        if state.saves_in_flight == 0 {
            let resume = state.resume;
            state.transition(resume)?;
        }
        Ok(())
    }
}
