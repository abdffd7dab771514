//! Settings for the companion run.
//!
//! One explicit value threaded into the orchestrator at startup; the
//! framework itself never reads global state. Sources: an optional TOML
//! file plus a `FAMILIAR_*` environment overlay (e.g.
//! `FAMILIAR_BRAIN__API_KEY`).

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use familiar_adapter::ManagerConfig;
use familiar_brain::BrainConfig;
use familiar_keyboard::KeyboardAdapterConfig;
use familiar_screen::{CaptureRegion, ContentSettings, RecognitionMode, ScreenAdapterConfig};
use familiar_tts::TtsConfig;
use familiar_voice::VoiceAdapterConfig;

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub screen: ScreenSettings,
    pub voice: VoiceSettings,
    pub keyboard: KeyboardSettings,
    pub manager: ManagerSettings,
    pub brain: BrainConfig,
    pub tts: TtsConfig,
    pub avatar: AvatarSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ScreenSettings {
    pub enabled: bool,
    pub poll_interval_seconds: u64,
    pub content_interval_seconds: u64,
    pub content_recognition_enabled: bool,
    pub content_recognition_mode: RecognitionMode,
    pub capture_region: CaptureRegion,
}

impl Default for ScreenSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_seconds: 5,
            content_interval_seconds: 15,
            content_recognition_enabled: false,
            content_recognition_mode: RecognitionMode::Ocr,
            capture_region: CaptureRegion::ActiveWindow,
        }
    }
}

impl ScreenSettings {
    pub fn adapter_config(&self) -> ScreenAdapterConfig {
        ScreenAdapterConfig {
            poll_interval: Duration::from_secs(self.poll_interval_seconds.max(1)),
            content_interval: Duration::from_secs(self.content_interval_seconds.max(1)),
        }
    }

    pub fn content_settings(&self) -> ContentSettings {
        ContentSettings {
            enabled: self.content_recognition_enabled,
            mode: self.content_recognition_mode,
            region: self.capture_region,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct VoiceSettings {
    pub enabled: bool,
    pub model: String,
    pub language: String,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "base".to_string(),
            language: "en".to_string(),
        }
    }
}

impl VoiceSettings {
    pub fn adapter_config(&self) -> VoiceAdapterConfig {
        VoiceAdapterConfig {
            model: self.model.clone(),
            language: self.language.clone(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct KeyboardSettings {
    pub enabled: bool,
    pub interval_seconds: u64,
}

impl Default for KeyboardSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_seconds: 5,
        }
    }
}

impl KeyboardSettings {
    pub fn adapter_config(&self) -> KeyboardAdapterConfig {
        KeyboardAdapterConfig {
            interval: Duration::from_secs(self.interval_seconds.max(1)),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerSettings {
    pub interrupt_threshold: u8,
    pub stop_grace_seconds: u64,
    /// 0 keeps stale entries forever.
    pub stale_retention_seconds: u64,
}

impl Default for ManagerSettings {
    fn default() -> Self {
        Self {
            interrupt_threshold: 7,
            stop_grace_seconds: 2,
            stale_retention_seconds: 120,
        }
    }
}

impl ManagerSettings {
    pub fn manager_config(&self) -> ManagerConfig {
        ManagerConfig {
            interrupt_threshold: self.interrupt_threshold,
            stop_grace: Duration::from_secs(self.stop_grace_seconds.max(1)),
            stale_retention: match self.stale_retention_seconds {
                0 => None,
                seconds => Some(Duration::from_secs(seconds)),
            },
            ..ManagerConfig::default()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AvatarSettings {
    pub base_url: String,
}

impl Default for AvatarSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:12393".to_string(),
        }
    }
}

/// Load settings from an explicit file, or from `familiar.toml` in the
/// working directory when present, with the environment layered on top.
pub fn load(path: Option<&Path>) -> anyhow::Result<Settings> {
    let mut builder = config::Config::builder();
    builder = match path {
        Some(path) => builder.add_source(config::File::from(path)),
        None => builder.add_source(config::File::with_name("familiar").required(false)),
    };
    builder = builder.add_source(
        config::Environment::with_prefix("FAMILIAR")
            .separator("__")
            .try_parsing(true),
    );

    let settings = builder.build()?.try_deserialize()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.screen.enabled);
        assert!(!settings.screen.content_recognition_enabled);
        assert_eq!(settings.manager.interrupt_threshold, 7);
        assert_eq!(settings.brain.timeout_seconds, 10);
    }

    #[test]
    fn test_zero_retention_means_keep_forever() {
        let settings = ManagerSettings {
            stale_retention_seconds: 0,
            ..ManagerSettings::default()
        };
        assert!(settings.manager_config().stale_retention.is_none());
    }

    #[test]
    fn test_intervals_never_zero() {
        let settings = ScreenSettings {
            poll_interval_seconds: 0,
            ..ScreenSettings::default()
        };
        assert_eq!(
            settings.adapter_config().poll_interval,
            Duration::from_secs(1)
        );
    }
}
