//! Boundary to the avatar renderer.
//!
//! Rendering and window compositing live in an external driver process;
//! this crate only forwards directives to it. Send failures are
//! recoverable; the companion keeps running without the avatar.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use familiar_brain::Directive;

#[derive(Debug, thiserror::Error)]
pub enum AvatarError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("renderer returned HTTP {0}")]
    Status(u16),
}

pub type Result<T> = std::result::Result<T, AvatarError>;

/// Sink for completed directives.
#[async_trait]
pub trait AvatarRenderer: Send + Sync {
    /// Present one directive. The directive is forwarded untouched; any
    /// emotion-to-expression mapping happens on the renderer's side.
    async fn present(&self, directive: &Directive) -> Result<()>;
}

/// HTTP client to the external driver process.
pub struct HttpAvatarClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpAvatarClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            http,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl AvatarRenderer for HttpAvatarClient {
    async fn present(&self, directive: &Directive) -> Result<()> {
        let url = format!("{}/action", self.base_url.trim_end_matches('/'));
        let response = self
            .http
            .post(&url)
            .json(&serde_json::json!({
                "text": directive.text,
                "emotion": directive.emotion.as_str(),
                "motion": directive.motion.as_str(),
            }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AvatarError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// Renderer that records directives instead of displaying them. Used in
/// tests and headless runs.
#[derive(Default)]
pub struct NullRenderer {
    presented: Mutex<Vec<Directive>>,
}

impl NullRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn presented(&self) -> Vec<Directive> {
        self.presented.lock().unwrap().clone()
    }
}

#[async_trait]
impl AvatarRenderer for NullRenderer {
    async fn present(&self, directive: &Directive) -> Result<()> {
        self.presented.lock().unwrap().push(directive.clone());
        Ok(())
    }
}
