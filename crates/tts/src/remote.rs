//! Remote HTTP synthesis with temp-file playback.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{Result, SpeechSynthesizer, TtsError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemoteTtsConfig {
    /// Synthesis endpoint returning audio bytes for a JSON request.
    pub endpoint: String,
    pub api_key: String,
    pub voice: String,
    /// Request timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for RemoteTtsConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            api_key: String::new(),
            voice: "default".to_string(),
            timeout_seconds: 15,
        }
    }
}

/// Cloud synthesis fallback. Ready once an endpoint and API key are
/// configured.
pub struct RemoteTts {
    config: RemoteTtsConfig,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
}

impl RemoteTts {
    pub fn new(config: RemoteTtsConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()
            .unwrap_or_default();
        Self {
            config,
            http,
            child: Mutex::new(None),
        }
    }

    async fn synthesize_to_file(&self, text: &str) -> Result<PathBuf> {
        let response = self
            .http
            .post(&self.config.endpoint)
            .bearer_auth(&self.config.api_key)
            .json(&serde_json::json!({
                "text": text,
                "voice": self.config.voice,
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TtsError::Synthesis(format!(
                "synthesis endpoint returned HTTP {status}"
            )));
        }

        let audio = response.bytes().await?;
        if audio.is_empty() {
            return Err(TtsError::Synthesis("response carried no audio".into()));
        }

        let path = std::env::temp_dir().join(format!("familiar-tts-{}.wav", Uuid::new_v4()));
        tokio::fs::write(&path, &audio).await?;
        Ok(path)
    }

    async fn play_file(&self, path: &Path) -> Result<()> {
        let child = Command::new("afplay")
            .arg(path)
            .spawn()
            .map_err(|e| TtsError::Playback(e.to_string()))?;
        *self.child.lock().await = Some(child);

        loop {
            {
                let mut guard = self.child.lock().await;
                match guard.as_mut() {
                    None => break,
                    Some(child) => match child.try_wait() {
                        Ok(Some(_)) => {
                            *guard = None;
                            break;
                        }
                        Ok(None) => {}
                        Err(error) => {
                            *guard = None;
                            return Err(TtsError::Playback(error.to_string()));
                        }
                    },
                }
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for RemoteTts {
    fn name(&self) -> &'static str {
        "remote"
    }

    fn is_ready(&self) -> bool {
        !self.config.api_key.is_empty() && !self.config.endpoint.is_empty()
    }

    async fn speak(&self, text: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(TtsError::NotReady);
        }

        let path = self.synthesize_to_file(text).await?;
        let played = self.play_file(&path).await;

        if let Err(error) = tokio::fs::remove_file(&path).await {
            tracing::warn!(%error, path = %path.display(), "failed to remove temp audio file");
        }
        played
    }

    async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_requires_endpoint_and_key() {
        let tts = RemoteTts::new(RemoteTtsConfig::default());
        assert!(!tts.is_ready());

        let tts = RemoteTts::new(RemoteTtsConfig {
            api_key: "sk-test".into(),
            ..RemoteTtsConfig::default()
        });
        assert!(!tts.is_ready());

        let tts = RemoteTts::new(RemoteTtsConfig {
            endpoint: "https://tts.example.com/synthesize".into(),
            api_key: "sk-test".into(),
            ..RemoteTtsConfig::default()
        });
        assert!(tts.is_ready());
    }

    #[tokio::test]
    async fn test_speak_without_key_fails() {
        let tts = RemoteTts::new(RemoteTtsConfig::default());
        assert!(matches!(tts.speak("hi").await, Err(TtsError::NotReady)));
    }
}
