use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use topicstore_bridge::{
    BridgeClient, BridgeError, BridgeHost, BridgeMessage, ClientConfig, ErrorKind, HostConfig,
    Window, WindowHub, ANY_ORIGIN,
};
use topicstore_core::{PostId, RevisionSnapshot, StoreConfig, TopicId, TopicRegistry};
use topicstore_test_utils::{memory_backend, seeded_forum, MemoryForum};

const HOST_ORIGIN: &str = "https://forum.example.org";
const WIDGET_ORIGIN: &str = "https://widgets.example.org";

struct Page {
    hub: WindowHub,
    host_window: Window,
    registry: Arc<TopicRegistry>,
}

fn page(forum: &MemoryForum) -> Page {
    let config = StoreConfig::bridge();
    let hub = WindowHub::new();
    let host_window = hub.open(HOST_ORIGIN);
    let registry = Arc::new(TopicRegistry::new(memory_backend(forum, &config), config));
    Page {
        hub,
        host_window,
        registry,
    }
}

impl Page {
    fn frame(&self) -> Window {
        self.hub.open_frame(&self.host_window, WIDGET_ORIGIN)
    }

    fn start(self, config: HostConfig) -> (WindowHub, Window, Window, Arc<TopicRegistry>) {
        let frame_a = self.frame();
        let frame_b = self.frame();
        let registry = Arc::clone(&self.registry);
        let _host = BridgeHost::new(self.host_window, Arc::clone(&registry), config).spawn();
        (self.hub, frame_a, frame_b, registry)
    }
}

fn snapshot(post_id: u64, post_number: u64, data: &str) -> RevisionSnapshot {
    RevisionSnapshot {
        post_id: Some(PostId(post_id)),
        post_number: Some(post_number),
        data: data.to_string(),
    }
}

#[tokio::test]
async fn load_is_answered_only_to_requesting_frame() {
    let (_hub, frame_a, mut frame_b, _registry) = page(&seeded_forum()).start(HostConfig::new());

    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();
    let snap = client.load().await.unwrap();

    assert_eq!(snap, snapshot(1, 1, r#"{"a":[]}"#));
    assert_eq!(client.pending_requests(), 0);
    assert!(frame_b.try_recv().is_none());
}

#[tokio::test(start_paused = true)]
async fn save_after_load_is_confirmed() {
    let forum = seeded_forum();
    let (_hub, frame_a, _frame_b, registry) = page(&forum).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();

    client.load().await.unwrap();
    let reply = client.save(r#"{"a":[1]}"#).await.unwrap();

    assert!(reply.confirmed);
    assert_eq!(reply.snapshot, Some(snapshot(2, 2, r#"{"a":[1]}"#)));
    let store = registry.get(TopicId(1)).unwrap();
    assert_eq!(store.get_data().post_id, Some(PostId(2)));
}

#[tokio::test]
async fn save_for_unloaded_topic_is_rejected() {
    let (_hub, frame_a, _frame_b, registry) = page(&seeded_forum()).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();

    let err = client.save(r#"{"a":[1]}"#).await.unwrap_err();

    assert!(matches!(
        err,
        BridgeError::Rejected {
            kind: ErrorKind::UnknownTopic,
            ..
        }
    ));
    assert!(registry.is_empty());
}

#[tokio::test(start_paused = true)]
async fn unconfirmed_host_save_reports_old_revision() {
    let forum = seeded_forum();
    forum.drop_replies(true);
    let (_hub, frame_a, _frame_b, _registry) = page(&forum).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();

    client.load().await.unwrap();
    let reply = client.save(r#"{"a":[1]}"#).await.unwrap();

    assert!(!reply.confirmed);
    assert_eq!(reply.snapshot, Some(snapshot(1, 1, r#"{"a":[]}"#)));
}

#[tokio::test]
async fn load_of_empty_topic_is_rejected_as_not_found() {
    let (_hub, frame_a, _frame_b, _registry) = page(&MemoryForum::new()).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(5), ClientConfig::new()).unwrap();

    let err = client.load().await.unwrap_err();
    assert!(matches!(
        err,
        BridgeError::Rejected {
            kind: ErrorKind::NotFound,
            ..
        }
    ));
}

#[tokio::test]
async fn concurrent_loads_are_correlated() {
    let (_hub, frame_a, _frame_b, _registry) = page(&seeded_forum()).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();

    let (a, b, c) = tokio::join!(client.load(), client.load(), client.load());

    for snap in [a, b, c] {
        assert_eq!(snap.unwrap().post_id, Some(PostId(1)));
    }
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_host_times_out_on_load() {
    let forum = seeded_forum();
    let page = page(&forum);
    let frame = page.frame();
    // Nobody reads the host window.
    let client = BridgeClient::connect(
        frame,
        TopicId(1),
        ClientConfig::new().with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let err = client.load().await.unwrap_err();

    assert!(matches!(err, BridgeError::Timeout { .. }));
    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test(start_paused = true)]
async fn missing_host_leaves_save_unconfirmed() {
    let forum = seeded_forum();
    let page = page(&forum);
    let frame = page.frame();
    let client = BridgeClient::connect(
        frame,
        TopicId(1),
        ClientConfig::new().with_timeout(Duration::from_secs(2)),
    )
    .unwrap();

    let reply = client.save("{}").await.unwrap();

    assert!(!reply.confirmed);
    assert_eq!(reply.snapshot, None);
}

#[tokio::test(start_paused = true)]
async fn wrong_target_origin_never_arrives() {
    let (_hub, frame_a, _frame_b, _registry) = page(&seeded_forum()).start(HostConfig::new());
    let client = BridgeClient::connect(
        frame_a,
        TopicId(1),
        ClientConfig::new()
            .with_timeout(Duration::from_secs(1))
            .with_target_origin("https://other.example.org"),
    )
    .unwrap();

    assert!(matches!(
        client.load().await,
        Err(BridgeError::Timeout { .. })
    ));
}

#[tokio::test(start_paused = true)]
async fn host_ignores_disallowed_origins() {
    let config = HostConfig::new().with_allowed_origins(["https://trusted.example.org"]);
    let (_hub, frame_a, _frame_b, registry) = page(&seeded_forum()).start(config);
    let client = BridgeClient::connect(
        frame_a,
        TopicId(1),
        ClientConfig::new().with_timeout(Duration::from_secs(1)),
    )
    .unwrap();

    assert!(client.load().await.is_err());
    assert!(registry.is_empty());
}

#[tokio::test]
async fn legacy_request_without_id_is_served() {
    let (_hub, frame_a, _frame_b, _registry) = page(&seeded_forum()).start(HostConfig::new());
    let mut frame = frame_a;
    let parent = frame.port().parent().unwrap();

    assert!(frame.post_message(
        parent,
        json!({"type": "shared_storage_load", "topic_id": 1}),
        ANY_ORIGIN
    ));
    let event = tokio::time::timeout(Duration::from_secs(5), frame.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.source, parent);
    assert_eq!(event.data["type"], "shared_storage_load_response");
    assert!(event.data.get("requestId").is_none());
    let message = BridgeMessage::from_value(event.data).unwrap();
    assert_eq!(
        message,
        BridgeMessage::LoadSharedStorageResponse {
            request_id: None,
            topic_id: TopicId(1),
            payload: snapshot(1, 1, r#"{"a":[]}"#),
        }
    );
}

#[tokio::test]
async fn standard_request_gets_standard_response() {
    let (_hub, frame_a, _frame_b, _registry) = page(&seeded_forum()).start(HostConfig::new());
    let mut frame = frame_a;
    let parent = frame.port().parent().unwrap();

    assert!(frame.post_message(
        parent,
        json!({"type": "load_shared_storage", "topicId": 1}),
        ANY_ORIGIN
    ));
    let event = tokio::time::timeout(Duration::from_secs(5), frame.recv())
        .await
        .unwrap()
        .unwrap();

    assert_eq!(event.data["type"], "load_shared_storage_response");
}

#[tokio::test(start_paused = true)]
async fn save_after_failed_load_is_still_rejected() {
    let forum = seeded_forum();
    forum.fail_next_reads(1);
    forum.drop_replies(true);
    let (_hub, frame_a, _frame_b, registry) = page(&forum).start(HostConfig::new());
    let client = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();

    let load = client.load().await.unwrap_err();
    assert!(matches!(
        load,
        BridgeError::Rejected {
            kind: ErrorKind::Transport,
            ..
        }
    ));
    assert!(registry.is_empty());

    let save = client.save(r#"{"a":[1]}"#).await.unwrap_err();
    assert!(matches!(
        save,
        BridgeError::Rejected {
            kind: ErrorKind::UnknownTopic,
            ..
        }
    ));
    assert_eq!(forum.revisions(TopicId(1)).len(), 1);
    assert_eq!(forum.reply_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn abandoned_requests_release_their_slots() {
    let forum = seeded_forum();
    let page = page(&forum);
    let frame = page.frame();
    // Nobody reads the host window.
    let client = BridgeClient::connect(frame, TopicId(1), ClientConfig::new()).unwrap();

    for _ in 0..5 {
        let outer = tokio::time::timeout(Duration::from_millis(10), client.load()).await;
        assert!(outer.is_err());
    }

    assert_eq!(client.pending_requests(), 0);
}

#[tokio::test]
async fn stores_are_shared_between_frames() {
    let forum = seeded_forum();
    let (_hub, frame_a, frame_b, registry) = page(&forum).start(HostConfig::new());
    let a = BridgeClient::connect(frame_a, TopicId(1), ClientConfig::new()).unwrap();
    let b = BridgeClient::connect(frame_b, TopicId(1), ClientConfig::new()).unwrap();

    a.load().await.unwrap();
    forum.append(TopicId(1), r#"{"a":[9]}"#);
    let snap = b.load().await.unwrap();

    assert_eq!(snap.data, r#"{"a":[9]}"#);
    assert_eq!(registry.len(), 1);
    assert_eq!(
        registry.get(TopicId(1)).unwrap().get_data().post_id,
        Some(PostId(2))
    );
}
