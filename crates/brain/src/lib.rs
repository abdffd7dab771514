//! Decision loop client for familiar.
//!
//! Sends the fused desktop context plus the user's words to the remote
//! reasoning service and parses its JSON directive. Failures here are
//! always recoverable: the orchestrator logs, releases the busy gate,
//! and waits for the next trigger.

mod client;
mod directive;

pub use client::{check_gateway, BrainConfig, ReasoningClient};
pub use directive::{parse_directive, Directive, Emotion, Motion};

#[derive(Debug, thiserror::Error)]
pub enum BrainError {
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("reasoning service returned HTTP {0}")]
    Status(u16),
    #[error("malformed directive: {0}")]
    Malformed(String),
    #[error("directive missing text")]
    MissingText,
}

pub type Result<T> = std::result::Result<T, BrainError>;
