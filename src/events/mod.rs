// Outbound event interface. Engines publish mutation events to an explicit
// sink instead of an ambient broadcast, keeping the core decoupled from any
// transport (websockets, queues) bolted on upstream.

use serde::Serialize;
use std::sync::Mutex;

use crate::core::{CommentId, PostId, UserId};

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedEvent {
    PostCreated {
        post_id: PostId,
        author_id: UserId,
    },
    PostLiked {
        post_id: PostId,
        user_id: UserId,
        now_liked: bool,
        likes_count: u32,
    },
    FollowToggled {
        follower: UserId,
        target: UserId,
        now_following: bool,
    },
    CommentAdded {
        post_id: PostId,
        comment_id: CommentId,
        author_id: UserId,
    },
    PostViewed {
        post_id: PostId,
    },
}

/// Publication must be non-blocking; sinks that need I/O should enqueue.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: &FeedEvent);
}

/// Default sink: structured log line per event.
pub struct TracingSink;

impl EventSink for TracingSink {
    fn publish(&self, event: &FeedEvent) {
        tracing::info!(event = ?event, "feed event");
    }
}

/// Collects events in memory; used by tests to assert on published events.
#[derive(Default)]
pub struct CaptureSink {
    events: Mutex<Vec<FeedEvent>>,
}

impl CaptureSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<FeedEvent> {
        std::mem::take(&mut self.events.lock().expect("capture sink poisoned"))
    }
}

impl EventSink for CaptureSink {
    fn publish(&self, event: &FeedEvent) {
        self.events
            .lock()
            .expect("capture sink poisoned")
            .push(event.clone());
    }
}
