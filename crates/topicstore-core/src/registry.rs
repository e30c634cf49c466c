//! Per-page registry of shared topic stores
//!
//! One [`SharedTopicStore`] per topic id, created lazily on first use and
//! kept for the lifetime of the registry. Nothing is persisted: a fresh
//! registry starts empty and stores rehydrate through `load_data`.

use crate::config::StoreConfig;
use crate::error::Result;
use crate::revision::{RevisionSnapshot, TopicId};
use crate::store::{SharedTopicStore, StoreBackend};
use dashmap::DashMap;
use std::sync::Arc;

/// Topic id to store mapping
#[derive(Debug)]
pub struct TopicRegistry {
    backend: StoreBackend,
    config: StoreConfig,
    stores: DashMap<TopicId, Arc<SharedTopicStore>>,
}

impl TopicRegistry {
    /// Create an empty registry whose stores share `backend`
    #[must_use]
    pub fn new(backend: StoreBackend, config: StoreConfig) -> Self {
        Self {
            backend,
            config,
            stores: DashMap::new(),
        }
    }

    /// Existing store for `topic`
    #[must_use]
    pub fn get(&self, topic: TopicId) -> Option<Arc<SharedTopicStore>> {
        self.stores.get(&topic).map(|entry| Arc::clone(entry.value()))
    }

    /// Store for `topic`, created if missing
    #[must_use]
    pub fn get_or_create(&self, topic: TopicId) -> Arc<SharedTopicStore> {
        let entry = self.stores.entry(topic).or_insert_with(|| {
            tracing::debug!(%topic, "creating shared topic store");
            Arc::new(SharedTopicStore::new(
                topic,
                self.backend.clone(),
                self.config,
            ))
        });
        Arc::clone(entry.value())
    }

    /// Load `topic`, registering its store only once a revision was read
    ///
    /// A failed first load leaves the registry untouched, so the topic
    /// still counts as unknown to later saves.
    ///
    /// # Errors
    /// Propagates the store's load error.
    pub async fn load(
        &self,
        topic: TopicId,
    ) -> Result<(Arc<SharedTopicStore>, RevisionSnapshot)> {
        if let Some(store) = self.get(topic) {
            let snapshot = store.load_data().await?;
            return Ok((store, snapshot));
        }

        let fresh = Arc::new(SharedTopicStore::new(
            topic,
            self.backend.clone(),
            self.config,
        ));
        let snapshot = fresh.load_data().await?;
        let entry = self.stores.entry(topic).or_insert_with(|| {
            tracing::debug!(%topic, "registering shared topic store");
            fresh
        });
        Ok((Arc::clone(entry.value()), snapshot))
    }

    /// Whether a store exists for `topic`
    #[inline]
    #[must_use]
    pub fn contains(&self, topic: TopicId) -> bool {
        self.stores.contains_key(&topic)
    }

    /// Number of stores
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stores.len()
    }

    /// Whether no store has been created yet
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stores.is_empty()
    }

    /// Topics with a store, in ascending order
    #[must_use]
    pub fn topics(&self) -> Vec<TopicId> {
        let mut topics: Vec<_> = self.stores.iter().map(|e| *e.key()).collect();
        topics.sort_unstable();
        topics
    }
}
