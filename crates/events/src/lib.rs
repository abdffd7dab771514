//! Shared event contracts for the perception adapters.
//!
//! This crate defines the `AdapterEvent` value every adapter emits, the
//! named kind/priority vocabularies, and the `EventSink` trait adapters
//! use to hand events to the aggregation layer. Using shared types keeps
//! adapters and the manager decoupled without runtime schema drift.

mod sink;

pub use sink::{EventSink, EventSinkRef, InMemoryEventSink, NullEventSink};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Open key/value payload carried by an event. Schema is owned by the
/// emitting adapter.
pub type Payload = serde_json::Map<String, serde_json::Value>;

/// One state observation reported by an adapter.
///
/// Immutable after construction; the aggregation layer consumes each event
/// exactly once when merging it into the shared snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEvent {
    /// Unique event id, used only for trace correlation.
    pub id: Uuid,
    /// Identity of the emitting adapter (e.g. "screen").
    pub source: String,
    /// Observation category, adapter-defined (see [`kinds`]).
    pub kind: String,
    /// Adapter-owned payload.
    pub payload: Payload,
    /// When the adapter observed the change.
    pub observed_at: DateTime<Utc>,
    /// Interrupt entitlement, 1..=10. Higher values may preempt an
    /// in-flight decision call.
    pub priority: u8,
}

impl AdapterEvent {
    /// Create an event at the default priority.
    pub fn new(source: impl Into<String>, kind: impl Into<String>, payload: Payload) -> Self {
        Self {
            id: Uuid::new_v4(),
            source: source.into(),
            kind: kind.into(),
            payload,
            observed_at: Utc::now(),
            priority: priority::DEFAULT,
        }
    }

    /// Set the interrupt priority, clamped to the valid 1..=10 range.
    pub fn with_priority(mut self, priority: u8) -> Self {
        self.priority = priority.clamp(priority::MIN, priority::MAX);
        self
    }
}

/// Event kinds emitted by the first-party adapters, as constants to
/// prevent typos.
pub mod kinds {
    /// Active window or owning process changed.
    pub const WINDOW_CHANGED: &str = "window_changed";
    /// Screen content recognition result (OCR text or screenshot hand-off).
    pub const SCREEN_CONTENT: &str = "screen_content";
    /// Aggregate typing-rate sample.
    pub const TYPING_BURST: &str = "typing_burst";
    /// Recognized user speech.
    pub const SPEECH: &str = "speech";
}

/// Interrupt priority scale.
pub mod priority {
    pub const MIN: u8 = 1;
    pub const MAX: u8 = 10;
    /// Background observations (window changes and similar).
    pub const DEFAULT: u8 = 5;
    /// Low-priority periodic samples (typing rate).
    pub const LOW: u8 = 3;
    /// Content recognition results.
    pub const ELEVATED: u8 = 7;
    /// Recognized speech, the primary interrupt trigger.
    pub const SPEECH: u8 = 9;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().expect("object payload")
    }

    #[test]
    fn test_new_event_defaults() {
        let event = AdapterEvent::new("screen", kinds::WINDOW_CHANGED, Payload::new());
        assert_eq!(event.source, "screen");
        assert_eq!(event.kind, "window_changed");
        assert_eq!(event.priority, priority::DEFAULT);
    }

    #[test]
    fn test_priority_clamped() {
        let event = AdapterEvent::new("voice", kinds::SPEECH, Payload::new()).with_priority(42);
        assert_eq!(event.priority, priority::MAX);

        let event = AdapterEvent::new("voice", kinds::SPEECH, Payload::new()).with_priority(0);
        assert_eq!(event.priority, priority::MIN);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = AdapterEvent::new(
            "keyboard",
            kinds::TYPING_BURST,
            payload(json!({"typing_rate": 45, "active": true})),
        )
        .with_priority(priority::LOW);

        let json = serde_json::to_string(&event).unwrap();
        let back: AdapterEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source, "keyboard");
        assert_eq!(back.priority, priority::LOW);
        assert_eq!(back.payload["typing_rate"], json!(45));
    }
}
