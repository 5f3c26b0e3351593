//! Per-key async mutual exclusion.
//!
//! Concurrent uploads of identical bytes must produce exactly one record and
//! one completion call. The orchestrator locks the content hash from the
//! duplicate check until the record is committed; uploads with different
//! hashes never wait on each other.
//!
//! Entries are removed when the last holder goes away. A waiter cancelled
//! after the holder left can strand its entry; stranded entries are swept on
//! the next [`KeyedLocks::lock`] and never counted by [`KeyedLocks::active`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// A set of named async locks.
#[derive(Debug, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<String, Slot>>>,
}

/// Held lock on one key. Released on drop.
#[derive(Debug)]
pub struct KeyedGuard {
    key: String,
    slots: Arc<Mutex<HashMap<String, Slot>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until `key` is free and take it.
    pub async fn lock(&self, key: &str) -> KeyedGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            // Slots are only cloned under this mutex, so a count of one means
            // nobody holds or awaits the key.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.to_string()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        KeyedGuard {
            key: key.to_string(),
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        }
    }

    /// Number of keys currently held or awaited.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .filter(|slot| Arc::strong_count(slot) > 1)
            .count()
    }
}

impl Drop for KeyedGuard {
    fn drop(&mut self) {
        // The owned guard keeps one reference to the slot alive.
        drop(self.guard.take());
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(slot) = slots.get(&self.key) {
            if Arc::strong_count(slot) == 1 {
                slots.remove(&self.key);
            }
        }
    }
}
