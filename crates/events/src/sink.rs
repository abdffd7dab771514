//! Event sink abstraction for decoupled event emission.
//!
//! Adapters hold an [`EventSinkRef`] instead of calling into the manager
//! directly, so the ingress point can be mocked in tests and replaced by
//! headless harnesses.

use std::sync::{Arc, Mutex};

use crate::AdapterEvent;

/// Trait for delivering adapter events to the aggregation layer.
pub trait EventSink: Send + Sync {
    /// Hand one event to the sink. Must be cheap and non-blocking; sinks
    /// that buffer internally may drop under sustained overload.
    fn emit(&self, event: AdapterEvent);
}

/// Shared sink handle held by adapter tasks.
pub type EventSinkRef = Arc<dyn EventSink>;

/// In-memory sink for tests. Captures all emitted events for inspection.
#[derive(Default)]
pub struct InMemoryEventSink {
    events: Mutex<Vec<AdapterEvent>>,
}

impl InMemoryEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All captured events, in emission order.
    pub fn events(&self) -> Vec<AdapterEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Captured events from a specific adapter.
    pub fn events_from(&self, source: &str) -> Vec<AdapterEvent> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.source == source)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.events.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().unwrap().is_empty()
    }
}

impl EventSink for InMemoryEventSink {
    fn emit(&self, event: AdapterEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// No-op sink that discards all events.
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn emit(&self, _event: AdapterEvent) {
        // Intentionally empty
    }
}
