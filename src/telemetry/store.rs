//! # Sample Store
//!
//! Single-slot holder for the latest [`Reading`].
//!
//! The slot is replaced as a whole under a write lock; readers copy the
//! reading out under a read lock, so a torn value is never observable. No I/O
//! ever happens while the lock is held.

use std::sync::{Arc, PoisonError, RwLock};

use super::reading::Reading;

#[derive(Debug, Default)]
struct Slot {
    reading: Option<Reading>,
    version: u64,
}

/// Thread-safe store for the most recent telemetry reading.
///
/// Cloning a `SampleStore` yields another handle to the same slot.
///
/// # Examples
///
/// ```
/// use chrono::Utc;
/// use fpv_power_monitor::telemetry::{Reading, SampleStore};
///
/// let store = SampleStore::new();
/// assert!(store.get().is_none());
///
/// store.set(Reading::new(11.9, 2.0, 28.0, Utc::now()));
/// assert_eq!(store.get().map(|r| r.voltage()), Some(11.9));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SampleStore {
    slot: Arc<RwLock<Slot>>,
}

impl SampleStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the stored reading.
    pub fn set(&self, reading: Reading) {
        // A poisoned slot still holds a whole reading
        let mut slot = self.slot.write().unwrap_or_else(PoisonError::into_inner);
        slot.reading = Some(reading);
        slot.version += 1;
    }

    /// Latest reading, or `None` if nothing has been published yet.
    pub fn get(&self) -> Option<Reading> {
        self.slot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .reading
    }

    /// Latest reading together with its publication counter.
    ///
    /// The counter increases by one on every [`set`](Self::set), which lets a
    /// consumer tell a fresh reading from one it has already seen.
    pub fn get_versioned(&self) -> Option<(u64, Reading)> {
        let slot = self.slot.read().unwrap_or_else(PoisonError::into_inner);
        slot.reading.map(|r| (slot.version, r))
    }
}
