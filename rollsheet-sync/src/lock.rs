//! Per-binding mutual exclusion.
//!
//! Two operations on the same mirror must not interleave: each computes row
//! numbers from its own read of the identity column, so a concurrent insert
//! would shift the rows the other is about to touch. [`BindingLocks`] hands out
//! one FIFO-fair async mutex per `(list, mirror)` key; operations on different
//! keys never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use rollsheet_core::BindingKey;

type Slot = Arc<AsyncMutex<()>>;

#[derive(Debug, Default)]
pub struct BindingLocks {
    slots: Mutex<HashMap<BindingKey, Slot>>,
}

/// Held for the duration of one binding operation.
#[derive(Debug)]
pub struct BindingGuard {
    key: BindingKey,
    _guard: OwnedMutexGuard<()>,
}

impl BindingGuard {
    pub fn key(&self) -> &BindingKey {
        &self.key
    }
}

impl BindingLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `key`. Waiters are served in arrival order.
    pub async fn acquire(&self, key: BindingKey) -> BindingGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|p| p.into_inner());
            // A slot only referenced by the map has no holder and no waiter.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
            slots.entry(key.clone()).or_default().clone()
        };
        let guard = slot.lock_owned().await;
        BindingGuard { key, _guard: guard }
    }

    /// Number of keys currently held or waited on (plus idle ones not yet pruned).
    pub fn tracked(&self) -> usize {
        self.slots.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}
