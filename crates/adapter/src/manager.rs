//! Adapter lifecycle ownership, event ingress, and the busy gate.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use chrono::Utc;
use futures::future::BoxFuture;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use familiar_events::{kinds, AdapterEvent, EventSink, EventSinkRef};

use crate::contract::{Adapter, AdapterDescriptor, AdapterError};
use crate::snapshot::{Snapshot, SnapshotEntry};

/// Configuration for the adapter manager.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Events with priority strictly above this cancel an in-flight
    /// decision call.
    pub interrupt_threshold: u8,
    /// Capacity of the event ingress channel.
    pub event_capacity: usize,
    /// Per-adapter grace period during `stop_all`.
    pub stop_grace: Duration,
    /// How many times a crashed observation loop is restarted before the
    /// adapter is disabled for the run.
    pub max_restarts: u32,
    /// Pause between restarts of a crashed loop.
    pub restart_backoff: Duration,
    /// How long a stale entry keeps appearing in snapshots after its
    /// adapter stopped or failed. `None` keeps it forever.
    pub stale_retention: Option<Duration>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            interrupt_threshold: 7,
            event_capacity: 256,
            stop_grace: Duration::from_secs(2),
            max_restarts: 3,
            restart_backoff: Duration::from_millis(500),
            stale_retention: Some(Duration::from_secs(120)),
        }
    }
}

/// Lifecycle state of a registered adapter, observable for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterStatus {
    /// Registered, not yet started.
    Registered,
    /// Skipped: unavailable on this platform, disabled by configuration,
    /// or failed to initialize.
    Disabled,
    /// Observation loop running under its supervised task.
    Running,
    /// Loop crashed past the restart budget.
    Failed,
    /// Stopped cleanly (or shut down).
    Stopped,
}

/// One speech turn handed to the decision callback.
pub struct DecisionRequest {
    /// Recognized user text that triggered the call.
    pub text: String,
    /// Cancelled when a higher-priority event preempts this call. The
    /// callback is expected to unwind promptly once cancelled.
    pub cancel: CancellationToken,
}

/// Callback invoked for each speech turn, one at a time.
pub type DecisionCallback =
    Arc<dyn Fn(DecisionRequest) -> BoxFuture<'static, ()> + Send + Sync + 'static>;

struct Registration {
    adapter: Arc<dyn Adapter>,
    descriptor: AdapterDescriptor,
    enabled: bool,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

/// State shared with the ingress task, the decision worker, and the
/// per-adapter supervisors.
struct Shared {
    snapshot: RwLock<HashMap<String, SnapshotEntry>>,
    statuses: RwLock<HashMap<String, AdapterStatus>>,
    stopping: AtomicBool,
    busy: BusyGate,
    decision_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    interrupt_threshold: u8,
}

impl Shared {
    fn set_status(&self, id: &str, status: AdapterStatus) {
        self.statuses
            .write()
            .unwrap()
            .insert(id.to_string(), status);
    }

    /// Mark Stopped unless the supervisor already recorded a failure.
    fn set_stopped(&self, id: &str) {
        let mut statuses = self.statuses.write().unwrap();
        match statuses.get(id) {
            Some(AdapterStatus::Failed) => {}
            _ => {
                statuses.insert(id.to_string(), AdapterStatus::Stopped);
            }
        }
    }

    fn mark_stale(&self, id: &str) {
        if let Some(entry) = self.snapshot.write().unwrap().get_mut(id) {
            entry.stale = true;
        }
    }

    /// Single ingress point: merge, interrupt check, decision routing.
    fn handle_event(&self, event: AdapterEvent) {
        if self.stopping.load(Ordering::SeqCst) {
            tracing::debug!(source = %event.source, kind = %event.kind, "late event dropped");
            return;
        }

        {
            let mut snapshot = self.snapshot.write().unwrap();
            let entry = snapshot
                .entry(event.source.clone())
                .or_insert_with(|| SnapshotEntry::empty(event.observed_at));
            entry.merge(&event.payload, event.observed_at);
        }

        if event.priority > self.interrupt_threshold && self.busy.interrupt() {
            tracing::info!(
                source = %event.source,
                kind = %event.kind,
                priority = event.priority,
                "high-priority event, interrupting in-flight decision call"
            );
        }

        if event.kind == kinds::SPEECH {
            let text = event
                .payload
                .get("recognized_text")
                .and_then(|v| v.as_str())
                .unwrap_or_default();
            if !text.is_empty() {
                if let Some(tx) = self.decision_tx.lock().unwrap().as_ref() {
                    let _ = tx.send(text.to_string());
                }
            }
        }
    }
}

/// Mutual exclusion around decision-loop invocation. While a call is
/// outstanding the gate is busy; `interrupt` cancels the outstanding
/// call's token (cooperative, most recent interrupter wins).
struct BusyGate {
    in_flight: AtomicBool,
    current: Mutex<Option<CancellationToken>>,
}

impl BusyGate {
    fn new() -> Self {
        Self {
            in_flight: AtomicBool::new(false),
            current: Mutex::new(None),
        }
    }

    fn begin(&self, token: CancellationToken) {
        *self.current.lock().unwrap() = Some(token);
        self.in_flight.store(true, Ordering::SeqCst);
    }

    fn end(&self) {
        self.in_flight.store(false, Ordering::SeqCst);
        *self.current.lock().unwrap() = None;
    }

    fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn interrupt(&self) -> bool {
        if !self.in_flight.load(Ordering::SeqCst) {
            return false;
        }
        if let Some(token) = self.current.lock().unwrap().as_ref() {
            token.cancel();
            return true;
        }
        false
    }
}

/// Event sink handed to adapter tasks: a bounded channel into the
/// manager's ingress task. Dropping under overload is preferred to
/// blocking the emitting adapter.
struct IngressSink {
    tx: mpsc::Sender<AdapterEvent>,
    shared: Arc<Shared>,
    dropped: Arc<AtomicU64>,
}

impl EventSink for IngressSink {
    fn emit(&self, event: AdapterEvent) {
        if self.shared.stopping.load(Ordering::SeqCst) {
            tracing::debug!(source = %event.source, "event after stop, dropped");
            return;
        }
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                // Rate-limit logging: only log every 10th drop to avoid spam
                if dropped % 10 == 1 {
                    tracing::warn!(dropped, source = %event.source, "event ingress full, dropping");
                }
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("event ingress closed");
            }
        }
    }
}

/// Cheap cloneable read handle over the merged snapshot. Lets the
/// decision callback read context without holding the manager itself.
#[derive(Clone)]
pub struct SnapshotReader {
    shared: Arc<Shared>,
    stale_retention: Option<Duration>,
}

impl SnapshotReader {
    /// Consistent point-in-time copy; stale entries past the retention
    /// bound are omitted.
    pub fn snapshot(&self) -> Snapshot {
        let taken_at = Utc::now();
        let snapshot = self.shared.snapshot.read().unwrap();
        let entries = snapshot
            .iter()
            .filter(|(_, entry)| {
                if !entry.stale {
                    return true;
                }
                match self.stale_retention {
                    None => true,
                    Some(bound) => {
                        let age = taken_at
                            .signed_duration_since(entry.observed_at)
                            .to_std()
                            .unwrap_or(Duration::ZERO);
                        age <= bound
                    }
                }
            })
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect();
        Snapshot { entries, taken_at }
    }
}

/// Owns the set of registered adapters and their supervised tasks.
pub struct AdapterManager {
    config: ManagerConfig,
    shared: Arc<Shared>,
    registrations: Mutex<Vec<Registration>>,
    ingress_tx: mpsc::Sender<AdapterEvent>,
    ingress_rx: Mutex<Option<mpsc::Receiver<AdapterEvent>>>,
    ingress_handle: Mutex<Option<JoinHandle<()>>>,
    decision_handle: Mutex<Option<JoinHandle<()>>>,
    callback: Mutex<Option<DecisionCallback>>,
    started: AtomicBool,
    dropped_events: Arc<AtomicU64>,
}

impl AdapterManager {
    pub fn new(config: ManagerConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.event_capacity.max(8));
        Self {
            shared: Arc::new(Shared {
                snapshot: RwLock::new(HashMap::new()),
                statuses: RwLock::new(HashMap::new()),
                stopping: AtomicBool::new(false),
                busy: BusyGate::new(),
                decision_tx: Mutex::new(None),
                interrupt_threshold: config.interrupt_threshold,
            }),
            config,
            registrations: Mutex::new(Vec::new()),
            ingress_tx: tx,
            ingress_rx: Mutex::new(Some(rx)),
            ingress_handle: Mutex::new(None),
            decision_handle: Mutex::new(None),
            callback: Mutex::new(None),
            started: AtomicBool::new(false),
            dropped_events: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Sink handle for adapter tasks (and for tests driving the ingress).
    pub fn sink(&self) -> EventSinkRef {
        Arc::new(IngressSink {
            tx: self.ingress_tx.clone(),
            shared: Arc::clone(&self.shared),
            dropped: Arc::clone(&self.dropped_events),
        })
    }

    /// Record an adapter. Does not start it; must be called before
    /// [`start_all`](Self::start_all).
    pub fn register(
        &self,
        adapter: Arc<dyn Adapter>,
        enabled: bool,
    ) -> Result<(), AdapterError> {
        if self.started.load(Ordering::SeqCst) {
            return Err(AdapterError::AlreadyStarted);
        }
        let descriptor = adapter.descriptor();
        self.shared.set_status(
            &descriptor.id,
            if enabled {
                AdapterStatus::Registered
            } else {
                AdapterStatus::Disabled
            },
        );
        self.registrations.lock().unwrap().push(Registration {
            adapter,
            descriptor,
            enabled,
            cancel: CancellationToken::new(),
            handle: None,
        });
        Ok(())
    }

    /// Register the callback invoked for each recognized speech turn.
    /// Only one invocation proceeds at a time; further turns queue behind
    /// the busy gate. Must be called before `start_all`.
    pub fn set_decision_callback(&self, callback: DecisionCallback) {
        if self.started.load(Ordering::SeqCst) {
            tracing::warn!("decision callback set after start_all, ignored");
            return;
        }
        *self.callback.lock().unwrap() = Some(callback);
    }

    /// Initialize and start every enabled, available adapter. Partial
    /// failure is not fatal: adapters that are unavailable or fail to
    /// initialize are disabled for the run and the rest continue.
    pub async fn start_all(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            tracing::warn!("start_all called twice");
            return;
        }

        self.spawn_ingress();
        self.spawn_decision_worker();

        let mut registrations = std::mem::take(&mut *self.registrations.lock().unwrap());

        for registration in registrations.iter_mut() {
            let id = registration.descriptor.id.clone();

            if !registration.enabled {
                tracing::debug!(adapter = %id, "disabled by configuration, skipping");
                continue;
            }
            if !registration.adapter.is_available() {
                tracing::info!(adapter = %id, "not available on this platform, skipping");
                self.shared.set_status(&id, AdapterStatus::Disabled);
                continue;
            }
            if let Err(error) = registration.adapter.initialize().await {
                tracing::warn!(adapter = %id, %error, "failed to initialize, disabled for this run");
                self.shared.set_status(&id, AdapterStatus::Disabled);
                continue;
            }

            self.shared
                .snapshot
                .write()
                .unwrap()
                .insert(id.clone(), SnapshotEntry::empty(Utc::now()));
            self.shared.set_status(&id, AdapterStatus::Running);

            registration.handle = Some(self.spawn_supervisor(
                Arc::clone(&registration.adapter),
                id,
                registration.cancel.clone(),
            ));
        }

        *self.registrations.lock().unwrap() = registrations;
        tracing::info!("adapter manager started");
    }

    /// Signal every running adapter to stop, then await completion with a
    /// bounded per-adapter grace period. A wedged adapter is abandoned
    /// (logged), never waited on indefinitely.
    pub async fn stop_all(&self) {
        self.shared.stopping.store(true, Ordering::SeqCst);

        let registrations = std::mem::take(&mut *self.registrations.lock().unwrap());

        // Signal-all before join-all for a deterministic shutdown order.
        for registration in &registrations {
            registration.cancel.cancel();
        }

        let grace = self.config.stop_grace;
        let shutdowns = registrations.into_iter().map(|mut registration| {
            let shared = Arc::clone(&self.shared);
            async move {
                let id = registration.descriptor.id.clone();

                if tokio::time::timeout(grace, registration.adapter.stop())
                    .await
                    .is_err()
                {
                    tracing::warn!(adapter = %id, "stop() exceeded grace period");
                }
                if let Some(handle) = registration.handle.take() {
                    if tokio::time::timeout(grace, handle).await.is_err() {
                        tracing::warn!(
                            adapter = %id,
                            "task did not exit within grace period, abandoning (possible resource leak)"
                        );
                    }
                }

                shared.mark_stale(&id);
                shared.set_stopped(&id);
            }
        });
        futures::future::join_all(shutdowns).await;

        self.shared.decision_tx.lock().unwrap().take();
        if let Some(handle) = self.decision_handle.lock().unwrap().take() {
            handle.abort();
        }
        if let Some(handle) = self.ingress_handle.lock().unwrap().take() {
            handle.abort();
        }

        tracing::info!("adapter manager stopped");
    }

    /// Direct event ingress. Adapter tasks go through [`sink`](Self::sink);
    /// this is the same merge path, callable synchronously.
    pub fn on_event(&self, event: AdapterEvent) {
        self.shared.handle_event(event);
    }

    /// Consistent point-in-time copy of the merged snapshot. Stale entries
    /// past the configured retention bound are omitted.
    pub fn context_snapshot(&self) -> Snapshot {
        self.snapshot_reader().snapshot()
    }

    /// Read handle for collaborators that outlive borrowing the manager.
    pub fn snapshot_reader(&self) -> SnapshotReader {
        SnapshotReader {
            shared: Arc::clone(&self.shared),
            stale_retention: self.config.stale_retention,
        }
    }

    /// Whether a decision-loop call is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.shared.busy.is_busy()
    }

    pub fn status(&self, id: &str) -> Option<AdapterStatus> {
        self.shared.statuses.read().unwrap().get(id).copied()
    }

    pub fn statuses(&self) -> HashMap<String, AdapterStatus> {
        self.shared.statuses.read().unwrap().clone()
    }

    /// Events dropped at the ingress due to overload.
    pub fn dropped_events(&self) -> u64 {
        self.dropped_events.load(Ordering::Relaxed)
    }

    fn spawn_ingress(&self) {
        let Some(mut rx) = self.ingress_rx.lock().unwrap().take() else {
            return;
        };
        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                shared.handle_event(event);
            }
        });
        *self.ingress_handle.lock().unwrap() = Some(handle);
    }

    fn spawn_decision_worker(&self) {
        let Some(callback) = self.callback.lock().unwrap().clone() else {
            return;
        };
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        *self.shared.decision_tx.lock().unwrap() = Some(tx);

        let shared = Arc::clone(&self.shared);
        let handle = tokio::spawn(async move {
            while let Some(text) = rx.recv().await {
                if shared.stopping.load(Ordering::SeqCst) {
                    break;
                }
                let cancel = CancellationToken::new();
                shared.busy.begin(cancel.clone());
                callback(DecisionRequest { text, cancel }).await;
                shared.busy.end();
            }
        });
        *self.decision_handle.lock().unwrap() = Some(handle);
    }

    fn spawn_supervisor(
        &self,
        adapter: Arc<dyn Adapter>,
        id: String,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let sink = self.sink();
        let max_restarts = self.config.max_restarts;
        let backoff = self.config.restart_backoff;

        tokio::spawn(async move {
            let mut restarts = 0u32;
            loop {
                let result = adapter.run(sink.clone(), cancel.clone()).await;
                if cancel.is_cancelled() {
                    break;
                }
                match result {
                    Ok(()) => {
                        tracing::debug!(adapter = %id, "observation loop ended");
                        break;
                    }
                    Err(error) if restarts < max_restarts => {
                        restarts += 1;
                        shared.mark_stale(&id);
                        tracing::warn!(
                            adapter = %id,
                            %error,
                            restarts,
                            "observation loop failed, restarting"
                        );
                        tokio::select! {
                            _ = cancel.cancelled() => break,
                            _ = tokio::time::sleep(backoff) => {}
                        }
                    }
                    Err(error) => {
                        shared.mark_stale(&id);
                        shared.set_status(&id, AdapterStatus::Failed);
                        tracing::error!(
                            adapter = %id,
                            %error,
                            "observation loop failed past restart budget, disabling"
                        );
                        return;
                    }
                }
            }
            shared.mark_stale(&id);
            shared.set_stopped(&id);
        })
    }
}

impl Default for AdapterManager {
    fn default() -> Self {
        Self::new(ManagerConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::StateMap;
    use async_trait::async_trait;
    use familiar_events::{priority, Payload};
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    fn payload(value: serde_json::Value) -> Payload {
        value.as_object().cloned().expect("object payload")
    }

    fn speech_event(text: &str, prio: u8) -> AdapterEvent {
        AdapterEvent::new("voice", kinds::SPEECH, payload(json!({"recognized_text": text})))
            .with_priority(prio)
    }

    /// Scriptable adapter for manager tests.
    struct MockAdapter {
        id: String,
        available: bool,
        fail_init: bool,
        ignore_shutdown: bool,
        run_error: Mutex<Option<String>>,
        state: Mutex<StateMap>,
    }

    impl MockAdapter {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                available: true,
                fail_init: false,
                ignore_shutdown: false,
                run_error: Mutex::new(None),
                state: Mutex::new(StateMap::new()),
            }
        }

        fn unavailable(mut self) -> Self {
            self.available = false;
            self
        }

        fn failing_init(mut self) -> Self {
            self.fail_init = true;
            self
        }

        fn wedged(mut self) -> Self {
            self.ignore_shutdown = true;
            self
        }
    }

    #[async_trait]
    impl Adapter for MockAdapter {
        fn descriptor(&self) -> AdapterDescriptor {
            AdapterDescriptor::new(self.id.clone(), priority::DEFAULT)
        }

        fn is_available(&self) -> bool {
            self.available
        }

        async fn initialize(&self) -> Result<(), AdapterError> {
            if self.fail_init {
                return Err(AdapterError::InitFailed("mock".into()));
            }
            Ok(())
        }

        async fn run(
            &self,
            _events: EventSinkRef,
            shutdown: CancellationToken,
        ) -> Result<(), AdapterError> {
            if let Some(message) = self.run_error.lock().unwrap().take() {
                return Err(AdapterError::Runtime(message));
            }
            if self.ignore_shutdown {
                // Never observes the cancellation token.
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
            shutdown.cancelled().await;
            Ok(())
        }

        async fn stop(&self) {
            if self.ignore_shutdown {
                loop {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                }
            }
        }

        async fn current_state(&self) -> StateMap {
            self.state.lock().unwrap().clone()
        }
    }

    fn test_config() -> ManagerConfig {
        ManagerConfig {
            stop_grace: Duration::from_millis(100),
            restart_backoff: Duration::from_millis(10),
            ..ManagerConfig::default()
        }
    }

    #[tokio::test]
    async fn test_snapshot_has_one_entry_per_started_adapter() {
        let manager = AdapterManager::new(test_config());
        manager
            .register(Arc::new(MockAdapter::new("screen")), true)
            .unwrap();
        manager
            .register(Arc::new(MockAdapter::new("voice").unavailable()), true)
            .unwrap();
        manager
            .register(Arc::new(MockAdapter::new("keyboard").failing_init()), true)
            .unwrap();

        manager.start_all().await;

        let snapshot = manager.context_snapshot();
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.contains("screen"));
        assert_eq!(manager.status("voice"), Some(AdapterStatus::Disabled));
        assert_eq!(manager.status("keyboard"), Some(AdapterStatus::Disabled));
        assert_eq!(manager.status("screen"), Some(AdapterStatus::Running));

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_disabled_adapter_absent_from_snapshot() {
        let manager = AdapterManager::new(test_config());
        manager
            .register(Arc::new(MockAdapter::new("screen")), false)
            .unwrap();
        manager.start_all().await;

        assert!(manager.context_snapshot().is_empty());
        assert_eq!(manager.status("screen"), Some(AdapterStatus::Disabled));

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_register_after_start_rejected() {
        let manager = AdapterManager::new(test_config());
        manager.start_all().await;

        let result = manager.register(Arc::new(MockAdapter::new("late")), true);
        assert!(matches!(result, Err(AdapterError::AlreadyStarted)));

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_merge_accumulates_and_orders_per_source() {
        let manager = AdapterManager::new(test_config());

        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            payload(json!({"active_window": "VS Code", "process": "Code"})),
        ));
        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::SCREEN_CONTENT,
            payload(json!({"content": {"type": "ocr", "content": "fn main"}})),
        ));
        // Later window change overwrites only its own keys.
        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            payload(json!({"active_window": "Terminal", "process": "iTerm2"})),
        ));

        let snapshot = manager.context_snapshot();
        let entry = snapshot.get("screen").unwrap();
        assert_eq!(entry.data["active_window"], json!("Terminal"));
        assert_eq!(entry.data["content"]["type"], json!("ocr"));
    }

    #[tokio::test]
    async fn test_events_through_sink_reach_snapshot() {
        let manager = AdapterManager::new(test_config());
        manager.start_all().await;

        let sink = manager.sink();
        for n in 0..5 {
            sink.emit(AdapterEvent::new(
                "keyboard",
                kinds::TYPING_BURST,
                payload(json!({"typing_rate": n * 10, "active": true})),
            ));
        }

        // Let the ingress task drain.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let snapshot = manager.context_snapshot();
        let entry = snapshot.get("keyboard").unwrap();
        // Per-adapter FIFO: the last emitted value wins.
        assert_eq!(entry.data["typing_rate"], json!(40));

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_busy_gate_serializes_decision_calls() {
        let manager = AdapterManager::new(test_config());
        let calls = Arc::new(AtomicUsize::new(0));
        let concurrent = Arc::new(AtomicUsize::new(0));
        let max_concurrent = Arc::new(AtomicUsize::new(0));

        let (calls_c, conc_c, max_c) =
            (calls.clone(), concurrent.clone(), max_concurrent.clone());
        manager.set_decision_callback(Arc::new(move |_request: DecisionRequest| {
            let calls = calls_c.clone();
            let concurrent = conc_c.clone();
            let max_concurrent = max_c.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(80)).await;
                concurrent.fetch_sub(1, Ordering::SeqCst);
            }
            .boxed()
        }));
        manager.start_all().await;

        // Two speech turns at default priority: the second queues behind
        // the busy gate, it is neither dropped nor run concurrently.
        manager.on_event(speech_event("first", priority::DEFAULT));
        manager.on_event(speech_event("second", priority::DEFAULT));

        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(max_concurrent.load(Ordering::SeqCst), 1);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_high_priority_event_interrupts_in_flight_call() {
        let manager = AdapterManager::new(test_config());
        let cancelled = Arc::new(AtomicUsize::new(0));
        let served = Arc::new(Mutex::new(Vec::<String>::new()));

        let (cancelled_c, served_c) = (cancelled.clone(), served.clone());
        manager.set_decision_callback(Arc::new(move |request: DecisionRequest| {
            let cancelled = cancelled_c.clone();
            let served = served_c.clone();
            async move {
                served.lock().unwrap().push(request.text.clone());
                tokio::select! {
                    _ = request.cancel.cancelled() => {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = tokio::time::sleep(Duration::from_secs(5)) => {}
                }
            }
            .boxed()
        }));
        manager.start_all().await;

        manager.on_event(speech_event("slow question", priority::DEFAULT));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(manager.is_busy());

        // Above the default threshold of 7: cancels the outstanding call
        // and a fresh call starts with the newer text.
        manager.on_event(speech_event("urgent question", priority::SPEECH));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(cancelled.load(Ordering::SeqCst), 1);
        let served = served.lock().unwrap().clone();
        assert_eq!(served, vec!["slow question", "urgent question"]);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_default_priority_does_not_interrupt() {
        let manager = AdapterManager::new(test_config());
        let cancelled = Arc::new(AtomicUsize::new(0));

        let cancelled_c = cancelled.clone();
        manager.set_decision_callback(Arc::new(move |request: DecisionRequest| {
            let cancelled = cancelled_c.clone();
            async move {
                tokio::select! {
                    _ = request.cancel.cancelled() => {
                        cancelled.fetch_add(1, Ordering::SeqCst);
                    }
                    _ = tokio::time::sleep(Duration::from_millis(100)) => {}
                }
            }
            .boxed()
        }));
        manager.start_all().await;

        manager.on_event(speech_event("question", priority::DEFAULT));
        tokio::time::sleep(Duration::from_millis(30)).await;
        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            Payload::new(),
        ));
        tokio::time::sleep(Duration::from_millis(120)).await;

        assert_eq!(cancelled.load(Ordering::SeqCst), 0);

        manager.stop_all().await;
    }

    #[tokio::test]
    async fn test_stop_all_bounded_by_grace_period() {
        let manager = AdapterManager::new(test_config());
        manager
            .register(Arc::new(MockAdapter::new("wedged").wedged()), true)
            .unwrap();
        manager
            .register(Arc::new(MockAdapter::new("screen")), true)
            .unwrap();
        manager.start_all().await;

        let started = Instant::now();
        manager.stop_all().await;
        let elapsed = started.elapsed();

        // Two bounded waits (stop + join) for the wedged adapter, joined
        // concurrently across adapters.
        assert!(
            elapsed < Duration::from_millis(600),
            "stop_all took {elapsed:?}"
        );
        assert_eq!(manager.status("screen"), Some(AdapterStatus::Stopped));
    }

    #[tokio::test]
    async fn test_late_events_dropped_after_stop() {
        let manager = AdapterManager::new(test_config());
        manager
            .register(Arc::new(MockAdapter::new("screen")), true)
            .unwrap();
        manager.start_all().await;
        manager.stop_all().await;

        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            payload(json!({"active_window": "Ghost"})),
        ));

        let snapshot = manager.context_snapshot();
        let entry = snapshot.get("screen");
        assert!(entry.map(|e| !e.data.contains_key("active_window")).unwrap_or(true));
    }

    #[tokio::test]
    async fn test_stale_entry_kept_with_unbounded_retention() {
        let manager = AdapterManager::new(ManagerConfig {
            stale_retention: None,
            ..test_config()
        });
        manager
            .register(Arc::new(MockAdapter::new("screen")), true)
            .unwrap();
        manager.start_all().await;
        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            payload(json!({"active_window": "VS Code"})),
        ));
        manager.stop_all().await;

        // Still-used policy: a pending decision call sees last-known
        // context rather than a hole.
        let snapshot = manager.context_snapshot();
        let entry = snapshot.get("screen").expect("entry retained");
        assert!(entry.stale);
        assert_eq!(entry.data["active_window"], json!("VS Code"));
    }

    #[tokio::test]
    async fn test_stale_entry_omitted_past_retention() {
        let manager = AdapterManager::new(ManagerConfig {
            stale_retention: Some(Duration::from_millis(50)),
            ..test_config()
        });
        manager
            .register(Arc::new(MockAdapter::new("screen")), true)
            .unwrap();
        manager.start_all().await;
        manager.on_event(AdapterEvent::new(
            "screen",
            kinds::WINDOW_CHANGED,
            payload(json!({"active_window": "VS Code"})),
        ));
        manager.stop_all().await;

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(!manager.context_snapshot().contains("screen"));
    }

    #[tokio::test]
    async fn test_crashed_loop_marked_failed_after_retries() {
        let adapter = Arc::new(MockAdapter::new("flaky"));
        // Fail on first run, then restarts find no scripted error and the
        // loop waits for shutdown.
        *adapter.run_error.lock().unwrap() = Some("device gone".into());

        let manager = AdapterManager::new(ManagerConfig {
            max_restarts: 0,
            ..test_config()
        });
        manager.register(adapter, true).unwrap();
        manager.start_all().await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(manager.status("flaky"), Some(AdapterStatus::Failed));

        manager.stop_all().await;
        // Failure is preserved through shutdown, not masked by Stopped.
        assert_eq!(manager.status("flaky"), Some(AdapterStatus::Failed));
    }

    #[tokio::test]
    async fn test_crashed_loop_restarts_within_budget() {
        let adapter = Arc::new(MockAdapter::new("flaky"));
        *adapter.run_error.lock().unwrap() = Some("transient".into());

        let manager = AdapterManager::new(test_config());
        manager.register(adapter, true).unwrap();
        manager.start_all().await;

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(manager.status("flaky"), Some(AdapterStatus::Running));

        manager.stop_all().await;
    }

    #[test]
    fn test_busy_gate() {
        let gate = BusyGate::new();
        assert!(!gate.is_busy());
        assert!(!gate.interrupt());

        let token = CancellationToken::new();
        gate.begin(token.clone());
        assert!(gate.is_busy());
        assert!(gate.interrupt());
        assert!(token.is_cancelled());

        gate.end();
        assert!(!gate.is_busy());
    }
}
