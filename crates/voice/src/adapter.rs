//! The voice adapter: capture → VAD → recognition → speech events.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use cpal::traits::HostTrait;
use tokio_util::sync::CancellationToken;

use familiar_adapter::{
    Adapter, AdapterDescriptor, AdapterError, AdapterEvent, EventSinkRef, StateMap,
};
use familiar_events::{kinds, priority};
use familiar_models::{whisper_model, ModelSpec};

use crate::capture::{MicCapture, SAMPLE_RATE};
use crate::recognizer::{SpeechRecognizer, WhisperRecognizer};
use crate::vad::{SegmenterConfig, SpeechSegmenter};

/// Adapter identity for all voice observations.
pub const SOURCE: &str = "voice";

#[derive(Debug, Clone)]
pub struct VoiceAdapterConfig {
    /// Whisper model size, e.g. "base" or "small".
    pub model: String,
    /// Recognition language code.
    pub language: String,
}

impl Default for VoiceAdapterConfig {
    fn default() -> Self {
        Self {
            model: "base".to_string(),
            language: "en".to_string(),
        }
    }
}

/// Listens to the microphone, segments speech with VAD, and emits
/// recognized text at elevated priority.
pub struct VoiceAdapter {
    config: VoiceAdapterConfig,
    recognizer: Mutex<Option<Arc<dyn SpeechRecognizer>>>,
    last_speech: Mutex<Option<DateTime<Utc>>>,
}

impl VoiceAdapter {
    pub fn new(config: VoiceAdapterConfig) -> Self {
        Self {
            config,
            recognizer: Mutex::new(None),
            last_speech: Mutex::new(None),
        }
    }

    fn model_spec(&self) -> ModelSpec {
        whisper_model(&self.config.model)
    }
}

#[async_trait]
impl Adapter for VoiceAdapter {
    fn descriptor(&self) -> AdapterDescriptor {
        AdapterDescriptor::new(SOURCE, priority::SPEECH)
    }

    fn is_available(&self) -> bool {
        cpal::default_host().default_input_device().is_some()
    }

    async fn initialize(&self) -> Result<(), AdapterError> {
        let spec = self.model_spec();
        let model_dir = familiar_models::ensure_model(&spec, |_, _| {})
            .await
            .map_err(|e| AdapterError::InitFailed(e.to_string()))?;

        let model_path = model_dir.join("model.bin");
        let language = self.config.language.clone();
        let recognizer = tokio::task::spawn_blocking(move || {
            WhisperRecognizer::load(&model_path, &language)
        })
        .await
        .map_err(|e| AdapterError::InitFailed(e.to_string()))?
        .map_err(|e| AdapterError::InitFailed(e.to_string()))?;

        *self.recognizer.lock().unwrap() = Some(Arc::new(recognizer));
        Ok(())
    }

    async fn run(
        &self,
        events: EventSinkRef,
        shutdown: CancellationToken,
    ) -> Result<(), AdapterError> {
        let recognizer = self
            .recognizer
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| AdapterError::Runtime("recognizer not initialized".into()))?;

        let mut segmenter = SpeechSegmenter::new(SAMPLE_RATE, SegmenterConfig::default())
            .map_err(|e| AdapterError::Runtime(e.to_string()))?;
        let (capture, mut frames) =
            MicCapture::start().map_err(|e| AdapterError::Runtime(e.to_string()))?;

        let result = loop {
            let chunk = tokio::select! {
                _ = shutdown.cancelled() => break Ok(()),
                chunk = frames.recv() => chunk,
            };
            let Some(chunk) = chunk else {
                break Err(AdapterError::Runtime("audio stream ended".into()));
            };

            let segments = match segmenter.push(&chunk) {
                Ok(segments) => segments,
                Err(error) => {
                    tracing::warn!(%error, "vad processing error");
                    continue;
                }
            };

            for segment in segments {
                tracing::debug!(
                    start_ms = segment.start_ms,
                    end_ms = segment.end_ms,
                    "speech ended, recognizing"
                );
                let recognizer = Arc::clone(&recognizer);
                let transcription = tokio::task::spawn_blocking(move || {
                    recognizer.transcribe(&segment.samples)
                })
                .await;

                match transcription {
                    Ok(Ok(text)) if !text.trim().is_empty() => {
                        let text = text.trim().to_string();
                        *self.last_speech.lock().unwrap() = Some(Utc::now());
                        events.emit(
                            AdapterEvent::new(SOURCE, kinds::SPEECH, speech_payload(&text))
                                .with_priority(priority::SPEECH),
                        );
                    }
                    Ok(Ok(_)) => {
                        tracing::debug!("empty transcription, skipped");
                    }
                    Ok(Err(error)) => {
                        tracing::warn!(%error, "transcription failed");
                    }
                    Err(error) => {
                        tracing::warn!(%error, "transcription task failed");
                    }
                }
            }
        };

        capture.stop();
        result
    }

    async fn stop(&self) {
        // Release the loaded model; capture is owned by the loop itself.
        self.recognizer.lock().unwrap().take();
    }

    async fn current_state(&self) -> StateMap {
        let last_speech = *self.last_speech.lock().unwrap();
        let ago = last_speech
            .map(|at| Utc::now().signed_duration_since(at).num_seconds().max(0));
        let mut state = StateMap::new();
        state.insert(
            "last_speech_ago_seconds".to_string(),
            match ago {
                Some(seconds) => serde_json::json!(seconds),
                None => serde_json::Value::Null,
            },
        );
        state
    }
}

fn speech_payload(text: &str) -> familiar_events::Payload {
    let mut payload = familiar_events::Payload::new();
    payload.insert(
        "recognized_text".to_string(),
        serde_json::Value::String(text.to_string()),
    );
    payload
}
