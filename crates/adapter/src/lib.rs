//! Perception adapter framework for familiar.
//!
//! Every sensor source (screen, voice, keyboard, arbitrary hardware)
//! implements the [`Adapter`] contract and is registered with the
//! [`AdapterManager`], which owns adapter lifecycles, runs each observation
//! loop under its own supervised task, merges emitted events into a shared
//! snapshot, and decides when an event is important enough to interrupt an
//! in-flight decision call.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     Contract Layer                        │
//! │  contract.rs - Adapter trait, descriptor, errors (pure)  │
//! │  hardware.rs - hardware extension point                  │
//! │  snapshot.rs - merged snapshot value types               │
//! └──────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │                   Aggregation Layer                       │
//! │  manager.rs - registration, supervision, event ingress,  │
//! │               busy gate, interrupt + decision routing    │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Adapters never share mutable state with each other: all cross-adapter
//! communication flows through the manager's event ingress, which
//! serializes snapshot mutation.

mod contract;
mod hardware;
mod manager;
mod snapshot;

pub use contract::{Adapter, AdapterDescriptor, AdapterError, StateMap};
pub use hardware::{DeviceInfo, HardwareAdapter};
pub use manager::{
    AdapterManager, AdapterStatus, DecisionCallback, DecisionRequest, ManagerConfig,
    SnapshotReader,
};
pub use snapshot::{Snapshot, SnapshotEntry};

// Re-export the event contracts adapters are written against.
pub use familiar_events::{kinds, priority, AdapterEvent, EventSink, EventSinkRef, Payload};
