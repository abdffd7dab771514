//! Speech recognition behind an object-safe seam.

use std::path::Path;

use whisper_rs::{FullParams, SamplingStrategy, WhisperContext, WhisperContextParameters};

use crate::{Result, VoiceError};

/// Recognizer over a finished speech segment (16 kHz mono f32).
pub trait SpeechRecognizer: Send + Sync {
    fn transcribe(&self, samples: &[f32]) -> Result<String>;

    fn model_name(&self) -> &str;
}

/// whisper.cpp-backed recognizer.
pub struct WhisperRecognizer {
    context: WhisperContext,
    language: String,
    model_name: String,
}

impl WhisperRecognizer {
    /// Load a ggml whisper model from disk.
    pub fn load(model_path: &Path, language: &str) -> Result<Self> {
        let path = model_path
            .to_str()
            .ok_or_else(|| VoiceError::Transcription("non-utf8 model path".into()))?;
        let context =
            WhisperContext::new_with_params(path, WhisperContextParameters::default())
                .map_err(|_| VoiceError::ModelNotLoaded)?;
        let model_name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "whisper".to_string());
        Ok(Self {
            context,
            language: language.to_string(),
            model_name,
        })
    }
}

impl SpeechRecognizer for WhisperRecognizer {
    fn transcribe(&self, samples: &[f32]) -> Result<String> {
        let mut state = self
            .context
            .create_state()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;

        let mut params = FullParams::new(SamplingStrategy::Greedy { best_of: 1 });
        params.set_language(Some(&self.language));
        params.set_print_special(false);
        params.set_print_progress(false);
        params.set_print_realtime(false);
        params.set_print_timestamps(false);

        state
            .full(params, samples)
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;

        let segments = state
            .full_n_segments()
            .map_err(|e| VoiceError::Transcription(e.to_string()))?;

        let mut text = String::new();
        for i in 0..segments {
            let segment = state
                .full_get_segment_text(i)
                .map_err(|e| VoiceError::Transcription(e.to_string()))?;
            if !text.is_empty() {
                text.push(' ');
            }
            text.push_str(segment.trim());
        }
        Ok(text.trim().to_string())
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecognizer(&'static str);

    impl SpeechRecognizer for FixedRecognizer {
        fn transcribe(&self, _samples: &[f32]) -> Result<String> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    #[test]
    fn test_seam_is_object_safe() {
        let recognizer: Box<dyn SpeechRecognizer> = Box::new(FixedRecognizer("hello"));
        assert_eq!(recognizer.transcribe(&[0.0; 160]).unwrap(), "hello");
        assert_eq!(recognizer.model_name(), "fixed");
    }
}
