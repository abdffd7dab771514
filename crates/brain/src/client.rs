//! HTTP client for the reasoning gateway.

use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::directive::{parse_directive, Directive};
use crate::{BrainError, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BrainConfig {
    /// OpenAI-compatible gateway base, e.g. "http://127.0.0.1:18789/v1".
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    /// Decision-loop timeout in seconds.
    pub timeout_seconds: u64,
}

impl Default for BrainConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:18789/v1".to_string(),
            api_key: String::new(),
            model: "default".to_string(),
            system_prompt: "You are a desktop companion. Answer with a JSON object \
                            {\"text\", \"emotion\", \"motion\"}."
                .to_string(),
            timeout_seconds: 10,
        }
    }
}

/// Client for the decision loop. One `think` call may be in flight at a
/// time; the caller's busy gate enforces that, not this client.
pub struct ReasoningClient {
    http: reqwest::Client,
    config: BrainConfig,
}

impl ReasoningClient {
    pub fn new(config: BrainConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.max(1)))
            .build()?;
        Ok(Self { http, config })
    }

    /// One decision-loop call: context + user text in, directive out.
    pub async fn think(&self, context: &str, user_text: &str) -> Result<Directive> {
        let body = json!({
            "model": self.config.model,
            "messages": [
                {"role": "system", "content": self.config.system_prompt},
                {
                    "role": "user",
                    "content": format!("[desktop state]\n{context}\n\n[user said]\n{user_text}"),
                },
            ],
            "response_format": {"type": "json_object"},
        });

        let url = format!(
            "{}/chat/completions",
            self.config.base_url.trim_end_matches('/')
        );
        let mut request = self.http.post(&url).json(&body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(BrainError::Status(status.as_u16()));
        }

        let value: serde_json::Value = response.json().await?;
        let content = value["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| BrainError::Malformed("response missing message content".into()))?;
        let directive_json: serde_json::Value = serde_json::from_str(content)
            .map_err(|e| BrainError::Malformed(e.to_string()))?;

        parse_directive(&directive_json)
    }
}

/// Check the gateway accepts TCP connections, bounded to two seconds.
/// Used at startup so a missing gateway is reported before anything else
/// spins up.
pub async fn check_gateway(base_url: &str) -> bool {
    let Some((host, port)) = host_port(base_url) else {
        tracing::error!(%base_url, "cannot parse gateway URL");
        return false;
    };

    match tokio::time::timeout(
        Duration::from_secs(2),
        tokio::net::TcpStream::connect((host.as_str(), port)),
    )
    .await
    {
        Ok(Ok(_)) => true,
        _ => {
            tracing::error!(%host, port, "reasoning gateway not reachable");
            false
        }
    }
}

fn host_port(base_url: &str) -> Option<(String, u16)> {
    let (scheme, rest) = match base_url.split_once("://") {
        Some((scheme, rest)) => (scheme, rest),
        None => ("http", base_url),
    };
    let authority = rest.split('/').next()?;
    if authority.is_empty() {
        return None;
    }

    match authority.rsplit_once(':') {
        Some((host, port)) => Some((host.to_string(), port.parse().ok()?)),
        None => {
            let port = if scheme == "https" { 443 } else { 80 };
            Some((authority.to_string(), port))
        }
    }
}
