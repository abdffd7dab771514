//! The keyboard adapter: periodic typing-rate samples.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use familiar_adapter::{
    Adapter, AdapterDescriptor, AdapterError, AdapterEvent, EventSinkRef, StateMap,
};
use familiar_events::{kinds, priority};

use crate::counter::{KeystrokeCounter, SystemCounter};

/// Adapter identity for typing observations.
pub const SOURCE: &str = "keyboard";

#[derive(Debug, Clone)]
pub struct KeyboardAdapterConfig {
    /// Sampling interval for typing-rate bursts.
    pub interval: Duration,
}

impl Default for KeyboardAdapterConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Emits periodic `typing_burst` events carrying only a rate metric and
/// an idle/active flag.
pub struct KeyboardAdapter {
    config: KeyboardAdapterConfig,
    counter: Arc<dyn KeystrokeCounter>,
    state: Mutex<StateMap>,
}

impl KeyboardAdapter {
    pub fn new(config: KeyboardAdapterConfig) -> Self {
        Self::with_counter(config, Arc::new(SystemCounter::new()))
    }

    /// Use a custom counter source (tests, alternative platforms).
    pub fn with_counter(
        config: KeyboardAdapterConfig,
        counter: Arc<dyn KeystrokeCounter>,
    ) -> Self {
        Self {
            config,
            counter,
            state: Mutex::new(StateMap::new()),
        }
    }
}

#[async_trait]
impl Adapter for KeyboardAdapter {
    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(SOURCE, priority::LOW)
    }

    fn is_available(&self) -> bool {
        self.counter.is_available()
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        self.counter
            .key_event_count()
            .map_err(|e| AdapterError::InitFailed(e.to_string()))?;
        Ok(())
    }

    async fn run(
        &self,
        events: EventSinkRef,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        let mut previous = self
            .counter
            .key_event_count()
            .map_err(|e| AdapterError::Runtime(e.to_string()))?;

        let start = tokio::time::Instant::now() + self.config.interval;
        let mut ticker = tokio::time::interval_at(start, self.config.interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            let current = self
                .counter
                .key_event_count()
                .map_err(|e| AdapterError::Runtime(e.to_string()))?;
            let delta = current.saturating_sub(previous);
            previous = current;

            let rate = typing_rate(delta, self.config.interval);
            let payload = serde_json::json!({
                "typing_rate": rate,
                "active": delta > 0,
            });
            let payload = payload.as_object().unwrap().clone();

            *self.state.lock().unwrap() = payload.clone();
            events.emit(
                AdapterEvent::new(SOURCE, kinds::TYPING_BURST, payload)
                    .with_priority(priority::LOW),
            );
        }
    }

    async fn current_state(&self) -> StateMap {
        self.state.lock().unwrap().clone()
    }
}

/// Keys per minute over the sampling interval.
fn typing_rate(delta: u64, interval: Duration) -> u64 {
    let seconds = interval.as_secs().max(1);
    delta * 60 / seconds
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::counter::SharedCounter;
    use familiar_events::InMemoryEventSink;

    #[test]
    fn test_typing_rate() {
        assert_eq!(typing_rate(0, Duration::from_secs(5)), 0);
        assert_eq!(typing_rate(5, Duration::from_secs(5)), 60);
        assert_eq!(typing_rate(15, Duration::from_secs(60)), 15);
    }

    #[test]
    fn test_descriptor_low_priority() {
        let adapter = KeyboardAdapter::new(KeyboardAdapterConfig::default());
        let descriptor = adapter.descriptor();
        assert_eq!(descriptor.id, "keyboard");
        assert_eq!(descriptor.default_priority, priority::LOW);
    }

    #[tokio::test]
    async fn test_burst_payload_is_rate_and_flag_only() {
        let counter = SharedCounter::new();
        let adapter = Arc::new(KeyboardAdapter::with_counter(
            KeyboardAdapterConfig {
                interval: Duration::from_millis(30),
            },
            Arc::new(counter.clone()),
        ));
        let sink = Arc::new(InMemoryEventSink::new());
        let shutdown = CancellationToken::new();

        adapter.initialize().await.unwrap();
        let sink_ref: EventSinkRef = sink.clone();
        let stop = shutdown.clone();
        let runner = Arc::clone(&adapter);
        let task = tokio::spawn(async move { runner.run(sink_ref, stop).await });

        counter.record(10);
        tokio::time::sleep(Duration::from_millis(100)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let bursts = sink.events_from(SOURCE);
        assert!(!bursts.is_empty());
        for burst in &bursts {
            assert_eq!(burst.kind, kinds::TYPING_BURST);
            assert_eq!(burst.priority, priority::LOW);
            // The privacy invariant: nothing beyond rate + flag.
            let mut keys: Vec<_> = burst.payload.keys().collect();
            keys.sort();
            assert_eq!(keys, vec!["active", "typing_rate"]);
        }
        // At least one burst saw the recorded activity.
        assert!(bursts
            .iter()
            .any(|b| b.payload["active"].as_bool() == Some(true)));

        // current_state reflects the last emitted payload.
        let state = adapter.current_state().await;
        let last = bursts.last().unwrap();
        assert_eq!(state["typing_rate"], last.payload["typing_rate"]);
        assert_eq!(state["active"], last.payload["active"]);
    }

    #[tokio::test]
    async fn test_idle_interval_reports_inactive() {
        let counter = SharedCounter::new();
        let adapter = KeyboardAdapter::with_counter(
            KeyboardAdapterConfig {
                interval: Duration::from_millis(20),
            },
            Arc::new(counter),
        );
        let sink = Arc::new(InMemoryEventSink::new());
        let shutdown = CancellationToken::new();

        let sink_ref: EventSinkRef = sink.clone();
        let stop = shutdown.clone();
        let task = tokio::spawn(async move { adapter.run(sink_ref, stop).await });

        tokio::time::sleep(Duration::from_millis(70)).await;
        shutdown.cancel();
        task.await.unwrap().unwrap();

        let bursts = sink.events_from(SOURCE);
        assert!(!bursts.is_empty());
        assert!(bursts
            .iter()
            .all(|b| b.payload["active"].as_bool() == Some(false)));
        assert!(bursts
            .iter()
            .all(|b| b.payload["typing_rate"].as_u64() == Some(0)));
    }
}
