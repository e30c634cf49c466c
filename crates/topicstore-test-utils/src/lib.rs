//! Testing utilities for the topicstore workspace
//!
//! An in-memory forum standing in for both the post query API and the reply
//! form, with knobs for slow, lost and failing traffic.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use topicstore_core::{
    ReplySubmitter, Result, Revision, RevisionLog, SharedTopicStore, StoreBackend, StoreConfig,
    StoreError, Submission, TopicId,
};

#[derive(Debug)]
struct ForumState {
    topics: HashMap<TopicId, Vec<Revision>>,
    next_post_id: u64,
    reply_delay: Duration,
    drop_replies: bool,
    failing_reads: u32,
    reads: u64,
    replies: u64,
}

impl Default for ForumState {
    fn default() -> Self {
        Self {
            topics: HashMap::new(),
            next_post_id: 1,
            reply_delay: Duration::from_millis(200),
            drop_replies: false,
            failing_reads: 0,
            reads: 0,
            replies: 0,
        }
    }
}

/// Shared in-memory forum; clones see the same posts
#[derive(Debug, Clone, Default)]
pub struct MemoryForum {
    inner: Arc<Mutex<ForumState>>,
}

impl MemoryForum {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed `topic` with one post per message
    #[must_use]
    pub fn with_topic(self, topic: TopicId, messages: &[&str]) -> Self {
        for message in messages {
            self.append(topic, message);
        }
        self
    }

    /// Post directly, as another forum user would
    pub fn append(&self, topic: TopicId, message: &str) -> Revision {
        let mut state = self.inner.lock();
        let post_id = state.next_post_id;
        state.next_post_id += 1;
        let posts = state.topics.entry(topic).or_default();
        let rev = Revision::new(post_id, posts.len() as u64 + 1, message);
        posts.push(rev.clone());
        rev
    }

    #[must_use]
    pub fn revisions(&self, topic: TopicId) -> Vec<Revision> {
        self.inner.lock().topics.get(&topic).cloned().unwrap_or_default()
    }

    #[must_use]
    pub fn latest(&self, topic: TopicId) -> Option<Revision> {
        self.inner
            .lock()
            .topics
            .get(&topic)
            .and_then(|posts| posts.iter().max_by_key(|r| r.post_number).cloned())
    }

    /// Time between a reply being submitted and it becoming visible
    pub fn set_reply_delay(&self, delay: Duration) {
        self.inner.lock().reply_delay = delay;
    }

    /// Accept replies but never publish them
    pub fn drop_replies(&self, drop: bool) {
        self.inner.lock().drop_replies = drop;
    }

    /// Fail the next `n` reads with a transport error
    pub fn fail_next_reads(&self, n: u32) {
        self.inner.lock().failing_reads = n;
    }

    #[must_use]
    pub fn read_count(&self) -> u64 {
        self.inner.lock().reads
    }

    #[must_use]
    pub fn reply_count(&self) -> u64 {
        self.inner.lock().replies
    }
}

#[async_trait]
impl RevisionLog for MemoryForum {
    async fn fetch_latest(&self, topic: TopicId) -> Result<Revision> {
        {
            let mut state = self.inner.lock();
            state.reads += 1;
            if state.failing_reads > 0 {
                state.failing_reads -= 1;
                return Err(StoreError::Transport("connection reset".to_string()));
            }
        }
        self.latest(topic).ok_or(StoreError::NotFound(topic))
    }
}

#[async_trait]
impl ReplySubmitter for MemoryForum {
    async fn submit(&self, topic: TopicId, payload: &str) -> Result<Submission> {
        let (delay, dropped) = {
            let mut state = self.inner.lock();
            state.replies += 1;
            (state.reply_delay, state.drop_replies)
        };
        if dropped {
            return Ok(Submission::completed(topic));
        }

        let forum = self.clone();
        let payload = payload.to_string();
        Ok(Submission::spawn(topic, async move {
            tokio::time::sleep(delay).await;
            forum.append(topic, &payload);
        }))
    }
}

/// Forum with topic 1 holding `{"a":[]}` as post 1
#[must_use]
pub fn seeded_forum() -> MemoryForum {
    MemoryForum::new().with_topic(TopicId(1), &[r#"{"a":[]}"#])
}

#[must_use]
pub fn memory_backend(forum: &MemoryForum, config: &StoreConfig) -> StoreBackend {
    StoreBackend::polling(Arc::new(forum.clone()), Arc::new(forum.clone()), config)
}

#[must_use]
pub fn memory_store(forum: &MemoryForum, topic: TopicId, config: StoreConfig) -> SharedTopicStore {
    SharedTopicStore::new(topic, memory_backend(forum, &config), config)
}
