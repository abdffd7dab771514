//! Content recognition over screen captures.
//!
//! Two mutually exclusive modes: local text extraction (nothing leaves
//! the device) and compressed-screenshot hand-off for remote visual
//! understanding. The hand-off path is unreachable unless configuration
//! enables it explicitly.

use std::path::Path;
use std::sync::Arc;

use base64::Engine;
use serde::{Deserialize, Serialize};

use crate::capture::{self, CaptureRegion};
use crate::{Result, ScreenError};

/// Upper bound on extracted text placed into an event payload.
pub const MAX_OCR_CHARS: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionMode {
    #[default]
    Ocr,
    Vlm,
}

/// Content-recognition settings, switchable at runtime through the
/// adapter's shared handle. Changes take effect on the next capture
/// cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentSettings {
    pub enabled: bool,
    pub mode: RecognitionMode,
    pub region: CaptureRegion,
}

impl Default for ContentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            mode: RecognitionMode::Ocr,
            region: CaptureRegion::ActiveWindow,
        }
    }
}

/// Local text extraction over a captured image. The inference itself is
/// an external collaborator; implementations typically shell out to an
/// on-device engine.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &Path) -> Result<String>;
}

/// One recognition outcome, shaped for the event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentResult {
    Text(String),
    ScreenshotB64(String),
}

impl ContentResult {
    /// Payload value: `{"type": ..., "content": ...}`.
    pub fn to_value(&self) -> serde_json::Value {
        match self {
            ContentResult::Text(text) => {
                serde_json::json!({"type": "ocr", "content": text})
            }
            ContentResult::ScreenshotB64(b64) => {
                serde_json::json!({"type": "screenshot_b64", "content": b64})
            }
        }
    }
}

/// Captures the configured region and runs the configured recognition
/// mode over it.
#[derive(Clone)]
pub struct ContentRecognizer {
    text_recognizer: Option<Arc<dyn TextRecognizer>>,
}

impl ContentRecognizer {
    pub fn new(text_recognizer: Option<Arc<dyn TextRecognizer>>) -> Self {
        Self { text_recognizer }
    }

    /// Capture and analyze once. Returns `None` when recognition is
    /// disabled or no usable result was produced.
    pub async fn capture_and_analyze(
        &self,
        settings: ContentSettings,
    ) -> Result<Option<ContentResult>> {
        if !settings.enabled {
            return Ok(None);
        }

        let image = capture::capture_jpeg(settings.region).await?;
        let result = match settings.mode {
            RecognitionMode::Ocr => self.extract_text(&image),
            RecognitionMode::Vlm => encode_screenshot(&image).await,
        };
        let _ = tokio::fs::remove_file(&image).await;
        result
    }

    fn extract_text(&self, image: &Path) -> Result<Option<ContentResult>> {
        let Some(recognizer) = &self.text_recognizer else {
            tracing::debug!("ocr mode enabled but no text recognizer wired");
            return Ok(None);
        };
        let text = recognizer.recognize(image)?;
        if text.is_empty() {
            return Ok(None);
        }
        Ok(Some(ContentResult::Text(truncate_chars(
            &text,
            MAX_OCR_CHARS,
        ))))
    }
}

async fn encode_screenshot(image: &Path) -> Result<Option<ContentResult>> {
    let bytes = tokio::fs::read(image)
        .await
        .map_err(|e| ScreenError::Capture(e.to_string()))?;
    let b64 = base64::engine::general_purpose::STANDARD.encode(bytes);
    Ok(Some(ContentResult::ScreenshotB64(b64)))
}

/// Char-boundary-safe truncation.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => text[..index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRecognizer(String);

    impl TextRecognizer for FixedRecognizer {
        fn recognize(&self, _image: &Path) -> Result<String> {
            Ok(self.0.clone())
        }
    }

    #[tokio::test]
    async fn test_disabled_never_captures() {
        let recognizer = ContentRecognizer::new(None);
        let settings = ContentSettings::default();
        assert!(!settings.enabled);

        let result = recognizer.capture_and_analyze(settings).await.unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_truncate_chars_respects_boundaries() {
        let text = "日本語テキスト".repeat(200);
        let truncated = truncate_chars(&text, MAX_OCR_CHARS);
        assert_eq!(truncated.chars().count(), MAX_OCR_CHARS);
    }

    #[test]
    fn test_truncate_short_text_untouched() {
        assert_eq!(truncate_chars("short", MAX_OCR_CHARS), "short");
    }

    #[test]
    fn test_ocr_result_shape() {
        let value = ContentResult::Text("hello".into()).to_value();
        assert_eq!(value["type"], "ocr");
        assert_eq!(value["content"], "hello");
    }

    #[test]
    fn test_screenshot_result_shape() {
        let value = ContentResult::ScreenshotB64("aGk=".into()).to_value();
        assert_eq!(value["type"], "screenshot_b64");
        assert_eq!(value["content"], "aGk=");
    }

    #[test]
    fn test_extract_text_truncates() {
        let recognizer = ContentRecognizer::new(Some(Arc::new(FixedRecognizer("x".repeat(800)))));
        let result = recognizer
            .extract_text(Path::new("/nonexistent.jpg"))
            .unwrap()
            .unwrap();
        match result {
            ContentResult::Text(text) => assert_eq!(text.len(), MAX_OCR_CHARS),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_mode_serde() {
        let mode: RecognitionMode = serde_json::from_str("\"vlm\"").unwrap();
        assert_eq!(mode, RecognitionMode::Vlm);
    }
}
