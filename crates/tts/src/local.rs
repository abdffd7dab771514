//! Local on-device synthesis via the macOS speech engine.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::{Result, SpeechSynthesizer, TtsError};

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct LocalTtsConfig {
    /// System voice name; the OS default when unset.
    pub voice: Option<String>,
    /// Speaking rate in words per minute.
    pub rate_wpm: Option<u32>,
}

/// On-device synthesis through `say`. Nothing leaves the machine.
pub struct LocalTts {
    config: LocalTtsConfig,
    ready: AtomicBool,
    child: Mutex<Option<Child>>,
}

impl LocalTts {
    pub fn new(config: LocalTtsConfig) -> Self {
        Self {
            config,
            ready: AtomicBool::new(false),
            child: Mutex::new(None),
        }
    }

    /// Probe the engine once. A failure here disables the local path for
    /// the rest of the run.
    pub async fn initialize(&self) -> Result<()> {
        if !cfg!(target_os = "macos") {
            return Err(TtsError::Unavailable);
        }

        let status = Command::new("say")
            .arg("")
            .status()
            .await
            .map_err(|_| TtsError::Unavailable)?;
        if !status.success() {
            return Err(TtsError::Synthesis(format!(
                "speech engine probe exited with {status}"
            )));
        }

        self.ready.store(true, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl SpeechSynthesizer for LocalTts {
    fn name(&self) -> &'static str {
        "local"
    }

    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }

    async fn speak(&self, text: &str) -> Result<()> {
        if !self.is_ready() {
            return Err(TtsError::NotReady);
        }

        let mut command = Command::new("say");
        if let Some(voice) = &self.config.voice {
            command.args(["-v", voice]);
        }
        if let Some(rate) = self.config.rate_wpm {
            command.args(["-r", &rate.to_string()]);
        }
        let child = command
            .arg(text)
            .spawn()
            .map_err(|e| TtsError::Playback(e.to_string()))?;
        *self.child.lock().await = Some(child);

        // Poll so `stop` can take the child out from under us.
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

    async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            let _ = child.kill().await;
        }
    }
}
