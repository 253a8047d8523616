//! Request tier and the unit-of-work context.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use tiercache_core::{new_unit_id, TierError, TieredResult, Value};
use uuid::Uuid;

use super::entry::CachedFailure;
use super::lock_table::KeyGuard;

/// An entry in the request tier.
#[derive(Debug, Clone)]
pub enum LocalEntry {
    /// A value computed or fetched during this unit of work.
    Success(Value),
    /// The wrapped function's own error, kept only for this unit of work.
    Failure(Arc<dyn Any + Send + Sync>),
    /// A failure entry read from a shared tier. Never served as a hit.
    SharedFailure(CachedFailure),
}

/// Process-local cache for one unit of work. Clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct RequestCache {
    entries: Arc<RwLock<HashMap<String, LocalEntry>>>,
}

impl RequestCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> TieredResult<Option<LocalEntry>> {
        let entries = self.entries.read().map_err(|_| TierError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    pub fn insert(&self, key: &str, entry: LocalEntry) -> TieredResult<()> {
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn remove(&self, key: &str) -> TieredResult<bool> {
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries
            .read()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) -> TieredResult<()> {
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        entries.clear();
        Ok(())
    }
}

/// One logical unit of work (typically one request).
///
/// Owns the request tier and the write barrier. While the barrier is raised
/// the coordinator keeps new values out of the shared tiers; they are still
/// visible to the rest of the unit of work through the request tier.
///
/// The context also records which key locks the unit of work holds, so a
/// computation can update or invalidate its own entry without waiting on
/// itself. Clones and transactional contexts share that record.
#[derive(Debug, Clone)]
pub struct CallContext {
    id: Uuid,
    request: RequestCache,
    held: Arc<Mutex<HashSet<String>>>,
    write_barrier: bool,
}

/// A key lock owned by a unit of work. Dropping it releases the key and
/// removes it from the context's held set.
#[derive(Debug)]
pub struct KeyHold {
    held: Arc<Mutex<HashSet<String>>>,
    key: String,
    _guard: KeyGuard,
}

impl Drop for KeyHold {
    fn drop(&mut self) {
        if let Ok(mut held) = self.held.lock() {
            held.remove(&self.key);
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new()
    }
}

impl CallContext {
    pub fn new() -> Self {
        Self {
            id: new_unit_id(),
            request: RequestCache::new(),
            held: Arc::default(),
            write_barrier: false,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Context for work inside a transaction. Shares this unit's request tier.
    pub fn transactional(&self) -> Self {
        Self {
            id: self.id,
            request: self.request.clone(),
            held: Arc::clone(&self.held),
            write_barrier: true,
        }
    }

    pub fn is_transactional(&self) -> bool {
        self.write_barrier
    }

    pub fn request(&self) -> &RequestCache {
        &self.request
    }

    /// Whether this unit of work currently holds the lock for `key`.
    pub fn holds(&self, key: &str) -> bool {
        self.held
            .lock()
            .map(|held| held.contains(key))
            .unwrap_or(false)
    }

    /// Record `guard` as held by this unit of work until the hold drops.
    pub(crate) fn hold(&self, key: &str, guard: KeyGuard) -> TieredResult<KeyHold> {
        let mut held = self.held.lock().map_err(|_| TierError::LockPoisoned)?;
        held.insert(key.to_string());
        Ok(KeyHold {
            held: Arc::clone(&self.held),
            key: key.to_string(),
            _guard: guard,
        })
    }

    /// End the unit of work: drop everything in the request tier.
    pub fn clear(&self) -> TieredResult<()> {
        self.request.clear()
    }
}
