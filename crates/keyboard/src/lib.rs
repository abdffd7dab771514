//! Keyboard perception for familiar.
//!
//! Tracks only the aggregate typing rate. The underlying source is a
//! cumulative key-down counter, so keystroke content is never observed.
//! That is a hard privacy invariant, enforced by construction.

mod adapter;
mod counter;

pub use adapter::{KeyboardAdapter, KeyboardAdapterConfig, SOURCE};
pub use counter::{KeystrokeCounter, SharedCounter, SystemCounter};

#[derive(Debug, thiserror::Error)]
pub enum KeyboardError {
    #[error("key event counter not available on this platform")]
    Unavailable,
}

pub type Result<T> = std::result::Result<T, KeyboardError>;
