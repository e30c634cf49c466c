//! In-process window messaging
//!
//! Models the browser's window-to-window channel: every window has an id,
//! an origin, an optional parent and an inbox. Posting is fire-and-forget;
//! messages to a closed window, or with a target origin the receiver does
//! not have, vanish without an error reaching the receiver.

use dashmap::DashMap;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Target origin accepting any receiver
pub const ANY_ORIGIN: &str = "*";

/// Window identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowId(Uuid);

impl WindowId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for WindowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A delivered message
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Window that posted the message
    pub source: WindowId,
    /// Origin of the posting window
    pub origin: String,
    /// Message body
    pub data: Value,
}

/// Receiving half of a window
pub type Inbox = mpsc::UnboundedReceiver<MessageEvent>;

#[derive(Debug)]
struct WindowSlot {
    origin: String,
    sender: mpsc::UnboundedSender<MessageEvent>,
}

type Slots = Arc<DashMap<WindowId, WindowSlot>>;

/// All windows of one simulated page tree
#[derive(Debug, Clone, Default)]
pub struct WindowHub {
    slots: Slots,
}

impl WindowHub {
    /// Create an empty hub
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a top-level window
    #[must_use]
    pub fn open(&self, origin: impl Into<String>) -> Window {
        self.open_window(origin.into(), None)
    }

    /// Open a frame embedded in `parent`
    #[must_use]
    pub fn open_frame(&self, parent: &Window, origin: impl Into<String>) -> Window {
        self.open_window(origin.into(), Some(parent.id()))
    }

    /// Whether `id` still refers to an open window
    #[must_use]
    pub fn is_open(&self, id: WindowId) -> bool {
        self.slots.contains_key(&id)
    }

    fn open_window(&self, origin: String, parent: Option<WindowId>) -> Window {
        let id = WindowId::new();
        let (sender, inbox) = mpsc::unbounded_channel();
        self.slots.insert(
            id,
            WindowSlot {
                origin: origin.clone(),
                sender,
            },
        );
        Window {
            port: WindowPort {
                id,
                origin,
                parent,
                hub: self.clone(),
                _guard: Arc::new(SlotGuard {
                    id,
                    slots: Arc::clone(&self.slots),
                }),
            },
            inbox,
        }
    }

    fn deliver(&self, event: MessageEvent, target: WindowId, target_origin: &str) -> bool {
        let Some(slot) = self.slots.get(&target) else {
            tracing::debug!(window = %target, "message to closed window dropped");
            return false;
        };
        if target_origin != ANY_ORIGIN && target_origin != slot.origin {
            tracing::debug!(
                window = %target,
                expected = target_origin,
                actual = %slot.origin,
                "message dropped on origin mismatch"
            );
            return false;
        }
        slot.sender.send(event).is_ok()
    }
}

/// Removes the window from its hub once the last port is gone
#[derive(Debug)]
struct SlotGuard {
    id: WindowId,
    slots: Slots,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.slots.remove(&self.id);
    }
}

/// Sending half of a window; cheap to clone
#[derive(Debug, Clone)]
pub struct WindowPort {
    id: WindowId,
    origin: String,
    parent: Option<WindowId>,
    hub: WindowHub,
    _guard: Arc<SlotGuard>,
}

impl WindowPort {
    /// This window's id
    #[inline]
    #[must_use]
    pub fn id(&self) -> WindowId {
        self.id
    }

    /// This window's origin
    #[inline]
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// Embedding window, if this is a frame
    #[inline]
    #[must_use]
    pub fn parent(&self) -> Option<WindowId> {
        self.parent
    }

    /// Post `data` to `target`
    ///
    /// Returns whether the message reached the target's inbox. Browsers give
    /// the sender no such signal; callers relying on a reply must still
    /// time out on their own.
    pub fn post_message(&self, target: WindowId, data: Value, target_origin: &str) -> bool {
        let event = MessageEvent {
            source: self.id,
            origin: self.origin.clone(),
            data,
        };
        self.hub.deliver(event, target, target_origin)
    }
}

/// A window with its inbox
#[derive(Debug)]
pub struct Window {
    port: WindowPort,
    inbox: Inbox,
}

impl Window {
    /// This window's id
    #[inline]
    #[must_use]
    pub fn id(&self) -> WindowId {
        self.port.id
    }

    /// Sending half
    #[inline]
    #[must_use]
    pub fn port(&self) -> &WindowPort {
        &self.port
    }

    /// Post `data` to `target`; see [`WindowPort::post_message`]
    pub fn post_message(&self, target: WindowId, data: Value, target_origin: &str) -> bool {
        self.port.post_message(target, data, target_origin)
    }

    /// Next delivered message, `None` once the window is closed
    pub async fn recv(&mut self) -> Option<MessageEvent> {
        self.inbox.recv().await
    }

    /// Already delivered message, if any
    pub fn try_recv(&mut self) -> Option<MessageEvent> {
        self.inbox.try_recv().ok()
    }

    /// Split into sending and receiving halves
    #[must_use]
    pub fn into_parts(self) -> (WindowPort, Inbox) {
        (self.port, self.inbox)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn frame_reaches_parent_with_source() {
        let hub = WindowHub::new();
        let mut host = hub.open("https://forum.example.org");
        let frame = hub.open_frame(&host, "https://widgets.example.org");

        let parent = frame.port().parent().unwrap();
        assert!(frame.post_message(parent, json!({"type": "ping"}), ANY_ORIGIN));

        let event = host.recv().await.unwrap();
        assert_eq!(event.source, frame.id());
        assert_eq!(event.origin, "https://widgets.example.org");
        assert_eq!(event.data["type"], "ping");
    }

    #[test]
    fn origin_mismatch_is_dropped() {
        let hub = WindowHub::new();
        let mut host = hub.open("https://forum.example.org");
        let frame = hub.open_frame(&host, "https://widgets.example.org");

        assert!(!frame.post_message(host.id(), json!({}), "https://evil.example.org"));
        assert!(frame.post_message(host.id(), json!({}), "https://forum.example.org"));
        assert!(host.try_recv().is_some());
        assert!(host.try_recv().is_none());
    }

    #[test]
    fn closing_a_window_unregisters_it() {
        let hub = WindowHub::new();
        let host = hub.open("https://forum.example.org");
        let frame = hub.open_frame(&host, "https://widgets.example.org");
        let host_id = host.id();

        drop(host);
        assert!(!hub.is_open(host_id));
        assert!(!frame.post_message(host_id, json!({}), ANY_ORIGIN));
    }
}
