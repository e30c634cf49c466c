//! Revision log accessor
//!
//! Reads the newest post of a topic through the forum's query API. No
//! caching: every call is a fresh read.

use crate::config::ForumConfig;
use crate::error::{Result, StoreError};
use crate::revision::{Revision, TopicId};
use async_trait::async_trait;
use serde::Deserialize;

/// Source of the latest revision of a topic
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RevisionLog: Send + Sync {
    /// Fetch the most recent revision
    ///
    /// # Errors
    /// - `StoreError::Transport` on network or API failure
    /// - `StoreError::NotFound` if the topic has no posts
    async fn fetch_latest(&self, topic: TopicId) -> Result<Revision>;
}

/// Wire shape of the post query endpoint
#[derive(Debug, Deserialize)]
struct PostCollection {
    response: Vec<Revision>,
}

/// Decode a post query response body
///
/// # Errors
/// `StoreError::Decode` on malformed JSON, `StoreError::NotFound` on an
/// empty collection.
pub fn parse_latest(topic: TopicId, body: &str) -> Result<Revision> {
    let collection: PostCollection =
        serde_json::from_str(body).map_err(|e| StoreError::Decode(e.to_string()))?;
    collection
        .response
        .into_iter()
        .next()
        .ok_or(StoreError::NotFound(topic))
}

/// [`RevisionLog`] backed by the forum's HTTP query API
#[derive(Debug, Clone)]
pub struct HttpRevisionLog {
    client: reqwest::Client,
    read_url: String,
}

impl HttpRevisionLog {
    /// Create a log reader with its own HTTP client
    ///
    /// # Errors
    /// `StoreError::Transport` if the HTTP client cannot be built.
    pub fn new(config: &ForumConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .cookie_store(true)
            .build()?;
        Ok(Self::with_client(client, config))
    }

    /// Create a log reader sharing an existing HTTP client
    #[must_use]
    pub fn with_client(client: reqwest::Client, config: &ForumConfig) -> Self {
        Self {
            client,
            read_url: config.read_url(),
        }
    }
}

#[async_trait]
impl RevisionLog for HttpRevisionLog {
    async fn fetch_latest(&self, topic: TopicId) -> Result<Revision> {
        let topic_param = topic.to_string();
        tracing::debug!(%topic, url = %self.read_url, "fetching latest revision");

        let response = self
            .client
            .get(&self.read_url)
            .query(&[
                ("topic_id", topic_param.as_str()),
                ("sort_by", "id"),
                ("sort_dir", "desc"),
                ("limit", "1"),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StoreError::Transport(format!(
                "HTTP {status} from {}",
                self.read_url
            )));
        }

        let body = response.text().await?;
        parse_latest(topic, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use warp::Filter;

    #[test]
    fn parse_takes_first_post() {
        let body = r#"{"response":[{"id":9,"number":4,"message":"{}"}]}"#;
        let rev = parse_latest(TopicId(1), body).unwrap();
        assert_eq!(rev, Revision::new(9, 4, "{}"));
    }

    #[test]
    fn parse_empty_collection_is_not_found() {
        let err = parse_latest(TopicId(3), r#"{"response":[]}"#).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(TopicId(3))));
    }

    #[test]
    fn parse_garbage_is_decode_error() {
        let err = parse_latest(TopicId(3), "<html>").unwrap_err();
        assert!(matches!(err, StoreError::Decode(_)));
    }

    #[tokio::test]
    async fn http_log_requests_newest_single_post() {
        let route = warp::path("api.php")
            .and(warp::query::<HashMap<String, String>>())
            .map(|q: HashMap<String, String>| {
                assert_eq!(q.get("topic_id").map(String::as_str), Some("5"));
                assert_eq!(q.get("sort_dir").map(String::as_str), Some("desc"));
                assert_eq!(q.get("limit").map(String::as_str), Some("1"));
                warp::reply::json(&serde_json::json!({
                    "response": [{"id": 12, "number": 3, "message": "{\"a\":[1]}"}]
                }))
            });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let log = HttpRevisionLog::new(&ForumConfig::new(format!("http://{addr}"))).unwrap();
        let rev = log.fetch_latest(TopicId(5)).await.unwrap();
        assert_eq!(rev, Revision::new(12, 3, r#"{"a":[1]}"#));
    }

    #[tokio::test]
    async fn http_log_maps_server_error_to_transport() {
        let route = warp::path("api.php").map(|| {
            warp::reply::with_status("boom", warp::http::StatusCode::INTERNAL_SERVER_ERROR)
        });
        let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
        tokio::spawn(server);

        let log = HttpRevisionLog::new(&ForumConfig::new(format!("http://{addr}"))).unwrap();
        let err = log.fetch_latest(TopicId(5)).await.unwrap_err();
        assert!(matches!(err, StoreError::Transport(_)));
    }
}
