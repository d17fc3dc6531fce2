//! Change-feed contracts for canonical content.
//!
//! Events are emitted after a content mutation commits to the store. The
//! sink decides what they mean; the store never calls the dispatcher
//! directly. Delivery is at-least-once, so consumers must tolerate replays.
//! Import writes emit nothing.

use chrono::{DateTime, Utc};

use crate::types::ContentId;

/// A content mutation observed on the change feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentEvent {
    /// A new content item was inserted.
    ContentCreated {
        content_id: ContentId,
        updated_at: DateTime<Utc>,
    },
    /// A content item's body or embeds changed.
    ContentUpdated {
        content_id: ContentId,
        updated_at: DateTime<Utc>,
    },
    /// A content item was soft-deleted.
    ContentDeleted {
        content_id: ContentId,
        updated_at: DateTime<Utc>,
    },
}

impl ContentEvent {
    /// The content item this event concerns.
    pub fn content_id(&self) -> &ContentId {
        match self {
            Self::ContentCreated { content_id, .. }
            | Self::ContentUpdated { content_id, .. }
            | Self::ContentDeleted { content_id, .. } => content_id,
        }
    }

    /// Content modification time carried by the event, used by consumers to
    /// detect replayed deliveries.
    pub fn updated_at(&self) -> DateTime<Utc> {
        match self {
            Self::ContentCreated { updated_at, .. }
            | Self::ContentUpdated { updated_at, .. }
            | Self::ContentDeleted { updated_at, .. } => *updated_at,
        }
    }
}

/// A sink that receives content change events from the store.
pub trait ContentEventSink: Send + Sync {
    /// Called after the corresponding mutation has committed.
    fn emit(&self, event: ContentEvent);
}

/// A no-op sink that discards all events.
///
/// Used for import writes and in tests where the feed is irrelevant.
#[derive(Debug, Default)]
pub struct NullSink;

impl ContentEventSink for NullSink {
    fn emit(&self, _event: ContentEvent) {
        // Intentionally empty - discard all events
    }
}

/// A sink that records all events for testing.
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: std::sync::Mutex<Vec<ContentEvent>>,
}

impl RecordingSink {
    /// Creates a new empty recording sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a cloned vector of all recorded events, in emission order.
    pub fn events(&self) -> Vec<ContentEvent> {
        self.events.lock().expect("lock poisoned").clone()
    }

    /// Removes all recorded events.
    pub fn clear(&self) {
        self.events.lock().expect("lock poisoned").clear()
    }

    /// Returns the count of recorded events.
    pub fn len(&self) -> usize {
        self.events.lock().expect("lock poisoned").len()
    }

    /// Checks if no events have been recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ContentEventSink for RecordingSink {
    fn emit(&self, event: ContentEvent) {
        self.events.lock().expect("lock poisoned").push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_records_events_in_order() {
        let sink = RecordingSink::new();
        assert!(sink.is_empty());

        let now = Utc::now();
        sink.emit(ContentEvent::ContentCreated {
            content_id: ContentId::from_string("content-1"),
            updated_at: now,
        });
        sink.emit(ContentEvent::ContentDeleted {
            content_id: ContentId::from_string("content-1"),
            updated_at: now,
        });

        assert_eq!(sink.len(), 2);
        let events = sink.events();
        assert!(matches!(events[0], ContentEvent::ContentCreated { .. }));
        assert!(matches!(events[1], ContentEvent::ContentDeleted { .. }));
    }

    #[test]
    fn recording_sink_clear() {
        let sink = RecordingSink::new();
        sink.emit(ContentEvent::ContentCreated {
            content_id: ContentId::from_string("content-1"),
            updated_at: Utc::now(),
        });
        assert!(!sink.is_empty());

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn null_sink_discards_events() {
        let sink = NullSink;
        sink.emit(ContentEvent::ContentUpdated {
            content_id: ContentId::from_string("content-1"),
            updated_at: Utc::now(),
        });
    }

    #[test]
    fn event_accessors() {
        let now = Utc::now();
        let event = ContentEvent::ContentUpdated {
            content_id: ContentId::from_string("content-9"),
            updated_at: now,
        };
        assert_eq!(event.content_id().as_str(), "content-9");
        assert_eq!(event.updated_at(), now);
    }
}
