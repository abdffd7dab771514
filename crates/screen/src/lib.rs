//! Screen perception for familiar.
//!
//! One adapter identity ("screen"), two independently-paced loops: a fast
//! poll of the active window (title + owning process) and a slower,
//! opt-in content-recognition pass that either extracts text locally or
//! hands a compressed screenshot off for remote visual understanding.
//!
//! Window identity goes through a single cross-platform accessor that
//! dispatches on the host OS and fails with an explicit unsupported-
//! platform error everywhere else; there is no silent fallback.

mod adapter;
mod capture;
mod recognize;
mod window;

pub mod platform;

pub use adapter::{ScreenAdapter, ScreenAdapterConfig, SOURCE};
pub use recognize::{
    ContentRecognizer, ContentResult, ContentSettings, RecognitionMode, TextRecognizer,
    MAX_OCR_CHARS,
};
pub use capture::CaptureRegion;
pub use window::{active_window, supported, WindowInfo};

#[derive(Debug, thiserror::Error)]
pub enum ScreenError {
    #[error("platform {0} not supported for window lookup")]
    UnsupportedPlatform(&'static str),
    #[error("window lookup failed: {0}")]
    WindowLookup(String),
    #[error("screenshot capture failed: {0}")]
    Capture(String),
    #[error("content recognition failed: {0}")]
    Recognition(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScreenError>;
