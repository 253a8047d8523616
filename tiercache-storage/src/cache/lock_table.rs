//! Per-key lock table.
//!
//! One async mutex per cache key guards the whole lookup, compute and store
//! sequence, so at most one computation per key runs in the process. The
//! table only holds weak handles: a key's mutex lives as long as someone
//! holds or waits on it, and dead handles are pruned once the table grows
//! past a threshold. After each prune the next one waits until the table has
//! doubled, so pruning stays amortized constant per insert even when most
//! keys are live. Memory is bounded by twice the number of live keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use once_cell::sync::Lazy;
use tiercache_core::{TierError, TieredResult};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Handle count above which dead entries are pruned on insert.
pub const DEFAULT_PRUNE_THRESHOLD: usize = 1024;

static GLOBAL: Lazy<Arc<KeyLockTable>> = Lazy::new(|| Arc::new(KeyLockTable::new()));

/// Held while a key is locked. Dropping it releases the key.
pub type KeyGuard = OwnedMutexGuard<()>;

#[derive(Debug)]
pub struct KeyLockTable {
    locks: Mutex<Handles>,
    prune_threshold: usize,
}

#[derive(Debug)]
struct Handles {
    by_key: HashMap<String, Weak<AsyncMutex<()>>>,
    next_prune: usize,
}

impl Default for KeyLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyLockTable {
    pub fn new() -> Self {
        Self::with_prune_threshold(DEFAULT_PRUNE_THRESHOLD)
    }

    pub fn with_prune_threshold(prune_threshold: usize) -> Self {
        Self {
            locks: Mutex::new(Handles {
                by_key: HashMap::new(),
                next_prune: prune_threshold,
            }),
            prune_threshold,
        }
    }

    /// The process-wide table.
    pub fn global() -> Arc<KeyLockTable> {
        Arc::clone(&GLOBAL)
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock(&self, key: &str) -> TieredResult<KeyGuard> {
        let handle = self.handle(key)?;
        Ok(handle.lock_owned().await)
    }

    fn handle(&self, key: &str) -> TieredResult<Arc<AsyncMutex<()>>> {
        let mut locks = self.locks.lock().map_err(|_| TierError::LockPoisoned)?;

        if let Some(strong) = locks.by_key.get(key).and_then(Weak::upgrade) {
            return Ok(strong);
        }

        if locks.by_key.len() >= locks.next_prune {
            locks.by_key.retain(|_, weak| weak.strong_count() > 0);
            locks.next_prune = self.prune_threshold.max(2 * locks.by_key.len());
        }

        let handle = Arc::new(AsyncMutex::new(()));
        locks.by_key.insert(key.to_string(), Arc::downgrade(&handle));
        Ok(handle)
    }

    /// Handles currently in the table, live or not yet pruned.
    pub fn len(&self) -> usize {
        self.locks.lock().map(|l| l.by_key.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys with at least one holder or waiter.
    pub fn live_count(&self) -> usize {
        self.locks
            .lock()
            .map(|l| l.by_key.values().filter(|w| w.strong_count() > 0).count())
            .unwrap_or(0)
    }

    /// Table size at which the next insert prunes dead handles.
    pub fn prune_point(&self) -> usize {
        self.locks
            .lock()
            .map(|l| l.next_prune)
            .unwrap_or(self.prune_threshold)
    }
}
