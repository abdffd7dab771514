//! Screenshot capture, clipped and compressed for downstream hand-off.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
#[cfg(target_os = "macos")]
use tokio::process::Command;
#[cfg(target_os = "macos")]
use uuid::Uuid;

use crate::{Result, ScreenError};

/// Longest edge of a captured image after downscaling. Bounds the encoded
/// payload handed to the decision loop.
#[cfg(target_os = "macos")]
const MAX_EDGE_PX: u32 = 1280;

/// JPEG quality used when recompressing the capture.
#[cfg(target_os = "macos")]
const JPEG_QUALITY: u32 = 80;

/// What part of the screen a content capture covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CaptureRegion {
    Fullscreen,
    #[default]
    ActiveWindow,
}

/// Capture the configured region to a temporary JPEG, downscaled to at
/// most [`MAX_EDGE_PX`] on the long edge. The caller owns the file and
/// must remove it.
pub async fn capture_jpeg(region: CaptureRegion) -> Result<PathBuf> {
    #[cfg(target_os = "macos")]
    {
        capture_jpeg_macos(region).await
    }
    #[cfg(not(target_os = "macos"))]
    {
        let _ = region;
        Err(ScreenError::UnsupportedPlatform(std::env::consts::OS))
    }
}

#[cfg(target_os = "macos")]
async fn capture_jpeg_macos(region: CaptureRegion) -> Result<PathBuf> {
    let path = std::env::temp_dir().join(format!("familiar-capture-{}.jpg", Uuid::new_v4()));

    let mut command = Command::new("screencapture");
    command.arg("-x").args(["-t", "jpg"]);

    if region == CaptureRegion::ActiveWindow {
        match crate::platform::macos::front_window_bounds().await {
            Some(bounds) => {
                command.arg(format!("-R{bounds}"));
            }
            None => {
                tracing::debug!("no window bounds, falling back to fullscreen capture");
            }
        }
    }

    let status = command
        .arg(&path)
        .status()
        .await
        .map_err(|e| ScreenError::Capture(e.to_string()))?;
    if !status.success() {
        return Err(ScreenError::Capture(format!(
            "screencapture exited with {status}"
        )));
    }

    // Downscale and recompress in place.
    let output = Command::new("sips")
        .args(["-Z", &MAX_EDGE_PX.to_string()])
        .args(["-s", "format", "jpeg"])
        .args(["-s", "formatOptions", &JPEG_QUALITY.to_string()])
        .arg(&path)
        .arg("--out")
        .arg(&path)
        .output()
        .await
        .map_err(|e| ScreenError::Capture(e.to_string()))?;
    if !output.status.success() {
        let _ = tokio::fs::remove_file(&path).await;
        return Err(ScreenError::Capture(format!(
            "sips failed: {}",
            String::from_utf8_lossy(&output.stderr)
        )));
    }

    Ok(path)
}
