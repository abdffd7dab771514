//! The screen adapter: window watching plus paced content recognition.

use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use familiar_adapter::{
    Adapter, AdapterDescriptor, AdapterError, AdapterEvent, EventSinkRef, StateMap,
};
use familiar_events::{kinds, priority};

use crate::recognize::{ContentRecognizer, ContentSettings, TextRecognizer};
use crate::window::{self, WindowInfo};

/// Adapter identity for all screen observations.
pub const SOURCE: &str = "screen";

/// Consecutive window-lookup failures tolerated before the loop reports a
/// runtime fault (and the manager's restart policy takes over).
const MAX_LOOKUP_FAILURES: u32 = 5;

#[derive(Debug, Clone)]
pub struct ScreenAdapterConfig {
    /// Window-watch pacing.
    pub poll_interval: Duration,
    /// Content-recognition pacing (only when recognition is enabled).
    pub content_interval: Duration,
}

impl Default for ScreenAdapterConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            content_interval: Duration::from_secs(15),
        }
    }
}

/// Watches the active window and, when enabled, recognizes screen
/// content. Both loops share the "screen" identity; the content loop runs
/// as a child task so a slow recognition pass never delays window polls.
pub struct ScreenAdapter {
    config: ScreenAdapterConfig,
    settings: Arc<RwLock<ContentSettings>>,
    recognizer: ContentRecognizer,
    state: Arc<Mutex<StateMap>>,
}

impl ScreenAdapter {
    pub fn new(
        config: ScreenAdapterConfig,
        settings: ContentSettings,
        text_recognizer: Option<Arc<dyn TextRecognizer>>,
    ) -> Self {
        Self {
            config,
            settings: Arc::new(RwLock::new(settings)),
            recognizer: ContentRecognizer::new(text_recognizer),
            state: Arc::new(Mutex::new(StateMap::new())),
        }
    }

    /// Shared settings handle. Writes take effect on the next capture
    /// cycle without restarting the window-watch loop.
    pub fn content_settings(&self) -> Arc<RwLock<ContentSettings>> {
        Arc::clone(&self.settings)
    }
}

#[async_trait]
impl Adapter for ScreenAdapter {
    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(SOURCE, priority::DEFAULT)
    }

    fn is_available(&self) -> bool {
        window::supported()
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        // Nothing to acquire: captures and lookups are per-cycle.
        Ok(())
    }

    async fn run(
        &self,
        events: EventSinkRef,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        // Child token: the content loop must also end when the window
        // loop bails out on a fault, not only on shutdown.
        let content_token = shutdown.child_token();
        let content_task = tokio::spawn(content_loop(
            self.recognizer.clone(),
            Arc::clone(&self.settings),
            Arc::clone(&self.state),
            events.clone(),
            self.config.content_interval,
            content_token.clone(),
        ));

        let result = self.window_loop(events, shutdown).await;
        content_token.cancel();
        let _ = content_task.await;
        result
    }

    async fn current_state(&self) -> StateMap {
        self.state.lock().unwrap().clone()
    }
}

impl ScreenAdapter {
    async fn window_loop(
        &self,
        events: EventSinkRef,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        let mut last_window: Option<WindowInfo> = None;
        let mut failures = 0u32;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return Ok(()),
                _ = ticker.tick() => {}
            }

            match window::active_window().await {
                Ok(info) => {
                    failures = 0;
                    if last_window.as_ref() != Some(&info) {
                        let payload = serde_json::json!({
                            "active_window": info.title,
                            "process": info.process,
                        });
                        self.state
                            .lock()
                            .unwrap()
                            .extend(payload.as_object().unwrap().clone());
                        events.emit(AdapterEvent::new(
                            SOURCE,
                            kinds::WINDOW_CHANGED,
                            payload.as_object().unwrap().clone(),
                        ));
                        last_window = Some(info);
                    }
                }
                Err(error) => {
                    failures += 1;
                    tracing::warn!(%error, failures, "window lookup failed");
                    if failures >= MAX_LOOKUP_FAILURES {
                        return Err(AdapterError::Runtime(error.to_string()));
                    }
                }
            }
        }
    }
}

async fn content_loop(
    recognizer: ContentRecognizer,
    settings: Arc<RwLock<ContentSettings>>,
    state: Arc<Mutex<StateMap>>,
    events: EventSinkRef,
    interval: Duration,
    shutdown: CancellationToken,
) {
    // No immediate first capture: the first pass lands one interval in.
    let start = tokio::time::Instant::now() + interval;
    let mut ticker = tokio::time::interval_at(start, interval);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = ticker.tick() => {}
        }

        // Re-read settings every cycle so runtime mode/region switches
        // apply to the next capture.
        let current = *settings.read().unwrap();
        if !current.enabled {
            continue;
        }

        match recognizer.capture_and_analyze(current).await {
            Ok(Some(result)) => {
                let payload = serde_json::json!({"content": result.to_value()});
                state
                    .lock()
                    .unwrap()
                    .extend(payload.as_object().unwrap().clone());
                events.emit(
                    AdapterEvent::new(
                        SOURCE,
                        kinds::SCREEN_CONTENT,
                        payload.as_object().unwrap().clone(),
                    )
                    .with_priority(priority::ELEVATED),
                );
            }
            Ok(None) => {}
            Err(error) => {
                tracing::warn!(%error, "content recognition failed");
            }
        }
    }
}
