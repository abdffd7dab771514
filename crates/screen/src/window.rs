//! Cross-platform active-window accessor.

use serde::{Deserialize, Serialize};

use crate::Result;

/// The active window: its title and the owning process name. Either field
/// may be empty when the platform withholds it (e.g. a window-less app).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowInfo {
    pub title: String,
    pub process: String,
}

/// Whether active-window lookup is supported on this host.
pub fn supported() -> bool {
    cfg!(target_os = "macos")
}

/// Look up the currently active window.
///
/// Dispatches on the host OS; unsupported platforms get an explicit error
/// rather than an empty result.
pub async fn active_window() -> Result<WindowInfo> {
    #[cfg(target_os = "macos")]
    {
        crate::platform::macos::active_window().await
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(crate::ScreenError::UnsupportedPlatform(std::env::consts::OS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScreenError;

    #[tokio::test]
    async fn test_unsupported_platform_is_explicit() {
        if supported() {
            return;
        }
        let result = active_window().await;
        assert!(matches!(result, Err(ScreenError::UnsupportedPlatform(_))));
    }
}
