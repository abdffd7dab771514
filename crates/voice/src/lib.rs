//! Voice perception for familiar.
//!
//! Continuously evaluates microphone audio for activity; when a speech
//! segment ends, runs recognition and emits a "speech" event at elevated
//! priority. Voice input is the system's primary interrupt trigger.

mod adapter;
mod capture;
mod recognizer;
mod vad;

pub use adapter::{VoiceAdapter, VoiceAdapterConfig, SOURCE};
pub use capture::{MicCapture, SAMPLE_RATE};
pub use recognizer::{SpeechRecognizer, WhisperRecognizer};
pub use vad::{SegmenterConfig, SpeechSegment, SpeechSegmenter};

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("no input device available")]
    NoInputDevice,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("vad session failed: {0}")]
    Vad(String),
    #[error("speech model not loaded")]
    ModelNotLoaded,
    #[error("transcription failed: {0}")]
    Transcription(String),
    #[error(transparent)]
    Model(#[from] familiar_models::ModelError),
}

pub type Result<T> = std::result::Result<T, VoiceError>;
