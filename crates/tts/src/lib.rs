//! Speech synthesis for familiar.
//!
//! Two providers behind one trait: local on-device synthesis and a
//! remote HTTP service. Selection is fail-fast-then-degrade: the local
//! path is tried once at startup; once it has failed it is never retried
//! for the rest of the run. With neither provider ready the system keeps
//! running in text-only mode.

mod local;
mod remote;
mod select;

pub use local::{LocalTts, LocalTtsConfig};
pub use remote::{RemoteTts, RemoteTtsConfig};
pub use select::{select_synthesizer, TtsConfig};

use async_trait::async_trait;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum TtsError {
    #[error("synthesizer not available on this platform")]
    Unavailable,
    #[error("synthesizer not ready")]
    NotReady,
    #[error("synthesis failed: {0}")]
    Synthesis(String),
    #[error("playback failed: {0}")]
    Playback(String),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TtsError>;

/// A speech synthesis provider.
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether the provider can serve `speak` right now.
    fn is_ready(&self) -> bool;

    /// Synthesize and play. Returns once playback finishes or is stopped.
    async fn speak(&self, text: &str) -> Result<()>;

    /// Cut any ongoing playback short.
    async fn stop(&self);
}

/// Shared synthesizer handle.
pub type SynthesizerRef = Arc<dyn SpeechSynthesizer>;
