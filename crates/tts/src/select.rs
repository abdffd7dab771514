//! Provider selection: local first, fail fast, then degrade.

use std::sync::Arc;

use serde::Deserialize;

use crate::local::{LocalTts, LocalTtsConfig};
use crate::remote::{RemoteTts, RemoteTtsConfig};
use crate::SpeechSynthesizer;
use crate::SynthesizerRef;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct TtsConfig {
    pub local: LocalTtsConfig,
    pub remote: RemoteTtsConfig,
}

/// Pick the synthesizer for this run. The local path is attempted once;
/// after a failure it is not retried per-utterance; the remote provider
/// serves the remainder of the run. With neither available the caller
/// continues without speech.
pub async fn select_synthesizer(config: &TtsConfig) -> Option<SynthesizerRef> {
    let local = LocalTts::new(config.local.clone());
    match local.initialize().await {
        Ok(()) => {
            tracing::info!("using local speech synthesis");
            return Some(Arc::new(local));
        }
        Err(error) => {
            tracing::warn!(%error, "local synthesis unavailable, trying remote");
        }
    }

    let remote = RemoteTts::new(config.remote.clone());
    if remote.is_ready() {
        tracing::info!("using remote speech synthesis");
        return Some(Arc::new(remote));
    }

    tracing::warn!("no speech synthesizer available; running in text-only mode");
    None
}
