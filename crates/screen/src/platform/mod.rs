//! Platform-specific implementations.

#[cfg(target_os = "macos")]
pub mod macos;
