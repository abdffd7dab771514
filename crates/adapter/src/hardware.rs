//! Extension point for arbitrary hardware sensor sources.
//!
//! A hardware source only needs to satisfy [`Adapter`] to participate in
//! aggregation; this trait adds the connection lifecycle hooks physical
//! devices tend to need. No first-party implementation ships.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::contract::{Adapter, AdapterError};

/// Device metadata, fixed at registration time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub name: String,
    pub vendor: String,
    /// Device category, e.g. "heart_rate", "ambient_light".
    pub kind: String,
    pub firmware: Option<String>,
}

/// Adapter over a physical device with an explicit connection lifecycle.
#[async_trait]
pub trait HardwareAdapter: Adapter {
    /// Device metadata. A plain value, not a live poll.
    fn device_info(&self) -> DeviceInfo;

    /// Establish the device connection. Called from `initialize`.
    async fn connect(&self) -> Result<(), AdapterError>;

    /// Tear the connection down. Called from `stop`.
    async fn disconnect(&self);
}
