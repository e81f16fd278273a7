//! Per-key in-flight request deduplication.
//!
//! Two concurrent requests for the same uncached URL would otherwise both
//! clone and index the repository. `KeyedLocks` hands out one owned async
//! lock per cache key: the first request computes while later ones wait,
//! then find the freshly written cache entry on their second lookup.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::{AppError, Result};

#[derive(Default)]
pub struct KeyedLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl KeyedLocks {
    /// Wait for exclusive access to `key`. The returned guard holds the key
    /// until dropped.
    pub async fn acquire(self: &Arc<Self>, key: &str) -> Result<KeyGuard> {
        let slot = {
            let mut locks = self
                .locks
                .lock()
                .map_err(|_| AppError::Internal("Lock poisoned".to_string()))?;
            locks
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };

        let guard = slot.lock_owned().await;

        Ok(KeyGuard {
            registry: Arc::clone(self),
            key: key.to_string(),
            _guard: guard,
        })
    }
}

/// Held for the duration of one computation; dropping it unparks the next
/// waiter and removes the registry entry once nobody else wants the key.
pub struct KeyGuard {
    registry: Arc<KeyedLocks>,
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for KeyGuard {
    fn drop(&mut self) {
        if let Ok(mut locks) = self.registry.locks.lock() {
            if let Some(slot) = locks.get(&self.key) {
                // two refs left means the registry and this guard: no waiters
                if Arc::strong_count(slot) <= 2 {
                    locks.remove(&self.key);
                }
            }
        }
    }
}
