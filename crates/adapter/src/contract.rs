//! The capability set every sensor source implements.

use async_trait::async_trait;
use familiar_events::{EventSinkRef, Payload};
use tokio_util::sync::CancellationToken;

/// Key/value map describing an adapter's best current state.
pub type StateMap = Payload;

/// Immutable identity an adapter declares at registration time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterDescriptor {
    /// Fixed identity string, unique per registered adapter.
    pub id: String,
    /// Default interrupt priority for events from this adapter.
    pub default_priority: u8,
}

impl AdapterDescriptor {
    pub fn new(id: impl Into<String>, default_priority: u8) -> Self {
        Self {
            id: id.into(),
            default_priority,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error("adapter not available on this platform")]
    Unavailable,
    #[error("initialization failed: {0}")]
    InitFailed(String),
    #[error("observation loop failed: {0}")]
    Runtime(String),
    #[error("manager already started")]
    AlreadyStarted,
}

/// Contract for a pluggable sensor source.
///
/// The manager drives the lifecycle: `is_available` is queried before
/// anything else; unavailable adapters are skipped entirely. `initialize`
/// acquires resources and must release anything partially acquired before
/// reporting failure. The observation loop itself is `run`, spawned by the
/// manager under a dedicated supervised task; it must end promptly once
/// `shutdown` is cancelled. `stop` releases resources and is safe to call
/// at any point, including before `initialize` or after a failed one.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Identity and default priority. Immutable for the adapter's lifetime.
    fn descriptor(&self) -> AdapterDescriptor;

    /// Platform capability check, queried before `initialize`.
    fn is_available(&self) -> bool {
        true
    }

    /// Acquire resources (load a model, open a device, bind an OS hook).
    async fn initialize(&self) -> Result<(), AdapterError>;

    /// The background observation loop. Runs until `shutdown` is cancelled
    /// or an unrecoverable fault occurs; emits observations through
    /// `events`.
    async fn run(
        &self,
        events: EventSinkRef,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError>;

    /// Release resources. Idempotent; must not hang on a wedged loop (the
    /// manager bounds the wait regardless).
    async fn stop(&self) {}

    /// Best current state, served from an internal cache so it never waits
    /// on the next observation cycle.
    async fn current_state(&self) -> StateMap;
}
