//! Cumulative key-down counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::{KeyboardError, Result};

/// Source of a monotonically increasing key-down count. The count is the
/// only thing exposed; which keys were pressed is not observable through
/// this interface.
pub trait KeystrokeCounter: Send + Sync {
    fn is_available(&self) -> bool;

    /// Total key-down events since an arbitrary epoch. Callers must work
    /// with deltas only.
    fn key_event_count(&self) -> Result<u64>;
}

/// OS-level counter.
///
/// On macOS this reads the HID system state's event counter: a single
/// integer maintained by the window server, requiring no event tap and
/// carrying no key identity.
#[derive(Debug, Default)]
pub struct SystemCounter;

impl SystemCounter {
    pub fn new() -> Self {
        Self
    }
}

impl KeystrokeCounter for SystemCounter {
    fn is_available(&self) -> bool {
        cfg!(target_os = "macos")
    }

    fn key_event_count(&self) -> Result<u64> {
        #[cfg(target_os = "macos")]
        {
            Ok(macos::key_down_count() as u64)
        }
        #[cfg(not(target_os = "macos"))]
        {
            Err(KeyboardError::Unavailable)
        }
    }
}

#[cfg(target_os = "macos")]
mod macos {
    // kCGEventSourceStateHIDSystemState
    const HID_SYSTEM_STATE: i32 = 1;
    // kCGEventKeyDown
    const KEY_DOWN: u32 = 10;

    #[link(name = "CoreGraphics", kind = "framework")]
    extern "C" {
        fn CGEventSourceCounterForEventType(state_id: i32, event_type: u32) -> u32;
    }

    pub fn key_down_count() -> u32 {
        unsafe { CGEventSourceCounterForEventType(HID_SYSTEM_STATE, KEY_DOWN) }
    }
}

/// In-memory counter for tests and headless harnesses.
#[derive(Debug, Clone, Default)]
pub struct SharedCounter {
    count: Arc<AtomicU64>,
}

impl SharedCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `n` synthetic key-down events.
    pub fn record(&self, n: u64) {
        self.count.fetch_add(n, Ordering::SeqCst);
    }
}

impl KeystrokeCounter for SharedCounter {
    fn is_available(&self) -> bool {
        true
    }

    fn key_event_count(&self) -> Result<u64> {
        Ok(self.count.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_counter_accumulates() {
        let counter = SharedCounter::new();
        assert_eq!(counter.key_event_count().unwrap(), 0);

        counter.record(12);
        counter.record(3);
        assert_eq!(counter.key_event_count().unwrap(), 15);
    }

    #[test]
    fn test_system_counter_availability() {
        let counter = SystemCounter::new();
        assert_eq!(counter.is_available(), cfg!(target_os = "macos"));
    }
}
