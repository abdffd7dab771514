//! Speech segmentation over the raw microphone stream.

use std::time::Duration;

use silero::{VadConfig, VadSession, VadTransition};

use crate::{Result, VoiceError};

/// One finished speech segment, padded and ready for recognition.
#[derive(Debug, Clone)]
pub struct SpeechSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub samples: Vec<f32>,
}

impl SpeechSegment {
    pub fn duration_ms(&self) -> u64 {
        self.end_ms.saturating_sub(self.start_ms)
    }
}

/// Tunables for speech segmentation.
#[derive(Debug, Clone, Copy)]
pub struct SegmenterConfig {
    /// Silence length that ends a segment.
    pub redemption_ms: u64,
    /// Padding kept before and after the detected speech.
    pub pad_ms: u64,
    /// Segments shorter than this are discarded as noise.
    pub min_speech_ms: u64,
}

impl Default for SegmenterConfig {
    fn default() -> Self {
        Self {
            redemption_ms: 500,
            pad_ms: 200,
            min_speech_ms: 100,
        }
    }
}

/// Silero-backed segmenter: feed it audio, get finished segments back.
pub struct SpeechSegmenter {
    session: VadSession,
    min_speech_ms: u64,
    in_speech: bool,
}

impl SpeechSegmenter {
    pub fn new(sample_rate: u32, config: SegmenterConfig) -> Result<Self> {
        let vad_config = VadConfig {
            sample_rate: sample_rate as usize,
            redemption_time: Duration::from_millis(config.redemption_ms),
            pre_speech_pad: Duration::from_millis(config.pad_ms),
            post_speech_pad: Duration::from_millis(config.pad_ms),
            min_speech_time: Duration::from_millis(config.min_speech_ms),
            ..Default::default()
        };

        let session = VadSession::new(vad_config).map_err(|e| VoiceError::Vad(e.to_string()))?;
        Ok(Self {
            session,
            min_speech_ms: config.min_speech_ms,
            in_speech: false,
        })
    }

    /// Feed captured audio. Returns every segment that finished inside
    /// this chunk, already filtered for minimum length.
    pub fn push(&mut self, samples: &[f32]) -> Result<Vec<SpeechSegment>> {
        let transitions = self
            .session
            .process(samples)
            .map_err(|e| VoiceError::Vad(e.to_string()))?;

        let mut segments = Vec::new();
        for transition in transitions {
            match transition {
                VadTransition::SpeechStart { timestamp_ms } => {
                    self.in_speech = true;
                    tracing::debug!(timestamp_ms, "speech started");
                }
                VadTransition::SpeechEnd {
                    start_timestamp_ms,
                    end_timestamp_ms,
                    samples,
                } => {
                    self.in_speech = false;
                    let segment = SpeechSegment {
                        start_ms: start_timestamp_ms as u64,
                        end_ms: end_timestamp_ms as u64,
                        samples,
                    };
                    if segment.duration_ms() < self.min_speech_ms {
                        tracing::debug!(
                            duration_ms = segment.duration_ms(),
                            "segment below minimum length, discarded"
                        );
                        continue;
                    }
                    segments.push(segment);
                }
            }
        }
        Ok(segments)
    }

    /// Whether the stream is currently inside a speech segment.
    pub fn in_speech(&self) -> bool {
        self.in_speech
    }

    pub fn reset(&mut self) {
        self.session.reset();
        self.in_speech = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_duration() {
        let segment = SpeechSegment {
            start_ms: 1200,
            end_ms: 2000,
            samples: vec![0.0; 12800],
        };
        assert_eq!(segment.duration_ms(), 800);
    }

    #[test]
    fn test_config_defaults() {
        let config = SegmenterConfig::default();
        assert_eq!(config.redemption_ms, 500);
        assert_eq!(config.min_speech_ms, 100);
    }
}
