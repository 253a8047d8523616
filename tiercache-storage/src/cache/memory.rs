//! In-memory tier stores for development and tests.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tiercache_core::{TierError, TieredResult};

use super::traits::{DistributedStore, DurableRecord, DurableStore};

#[derive(Debug, Clone)]
struct Expiring {
    value: Vec<u8>,
    ttl: Duration,
    expires_at: Option<Instant>,
}

impl Expiring {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

/// Distributed tier held in process memory. Expiry is checked on read.
#[derive(Debug, Default)]
pub struct InMemoryDistributedStore {
    entries: RwLock<HashMap<String, Expiring>>,
}

impl InMemoryDistributedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .read()
            .map(|entries| entries.values().filter(|e| e.is_live(now)).count())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Time to live the entry was stored with, if it is live.
    pub fn ttl_of(&self, key: &str) -> Option<Duration> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.ttl)
    }

    /// Raw bytes of a live entry, without going through the trait.
    pub fn peek(&self, key: &str) -> Option<Vec<u8>> {
        let now = Instant::now();
        let entries = self.entries.read().ok()?;
        entries
            .get(key)
            .filter(|e| e.is_live(now))
            .map(|e| e.value.clone())
    }
}

#[async_trait]
impl DistributedStore for InMemoryDistributedStore {
    async fn get(&self, key: &str) -> TieredResult<Option<Vec<u8>>> {
        let now = Instant::now();
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        match entries.get(key) {
            Some(entry) if entry.is_live(now) => Ok(Some(entry.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> TieredResult<()> {
        let expires_at = if ttl.is_zero() {
            None
        } else {
            Instant::now().checked_add(ttl)
        };
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        entries.insert(
            key.to_string(),
            Expiring {
                value,
                ttl,
                expires_at,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> TieredResult<bool> {
        let mut entries = self.entries.write().map_err(|_| TierError::LockPoisoned)?;
        entries.remove(key);
        Ok(true)
    }
}

/// Durable tier held in process memory.
#[derive(Debug, Default)]
pub struct InMemoryDurableStore {
    records: RwLock<HashMap<String, DurableRecord>>,
}

impl InMemoryDurableStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.records
            .read()
            .map(|r| r.contains_key(key))
            .unwrap_or(false)
    }
}

#[async_trait]
impl DurableStore for InMemoryDurableStore {
    async fn get(&self, key: &str) -> TieredResult<Option<DurableRecord>> {
        let records = self.records.read().map_err(|_| TierError::LockPoisoned)?;
        Ok(records.get(key).cloned())
    }

    async fn put(&self, key: &str, record: DurableRecord) -> TieredResult<()> {
        let mut records = self.records.write().map_err(|_| TierError::LockPoisoned)?;
        records.insert(key.to_string(), record);
        Ok(())
    }

    async fn delete(&self, key: &str) -> TieredResult<()> {
        let mut records = self.records.write().map_err(|_| TierError::LockPoisoned)?;
        records.remove(key);
        Ok(())
    }
}
