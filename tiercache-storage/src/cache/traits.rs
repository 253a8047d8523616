//! Tier store traits and cache statistics.
//!
//! The distributed and durable tiers are external key/value services. The
//! coordinator only needs the small get/set/delete contracts below; any
//! backend (LMDB, a memcached client, a document store) can sit behind them.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use tiercache_core::{TieredResult, Timestamp};

/// One of the three cache layers, fastest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Tier {
    /// Process-local, scoped to one unit of work.
    Request,
    /// Shared, time-to-live bounded.
    Distributed,
    /// Shared, kept until explicitly invalidated.
    Durable,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Request => "request",
            Tier::Distributed => "distributed",
            Tier::Durable => "durable",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A durable-tier record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DurableRecord {
    /// Encoded cache entry.
    pub value: Vec<u8>,
    /// Human-readable description of what is cached.
    pub description: String,
    /// When the entry was written.
    pub created_at: Timestamp,
}

/// Durable tier, keyed by the hashed and versioned cache key.
///
/// Operations never take part in a caller's transaction.
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Fetch a record, or `None` when absent.
    async fn get(&self, key: &str) -> TieredResult<Option<DurableRecord>>;

    /// Insert or replace a record.
    async fn put(&self, key: &str, record: DurableRecord) -> TieredResult<()>;

    /// Remove a record. Removing an absent record succeeds.
    async fn delete(&self, key: &str) -> TieredResult<()>;
}

/// Distributed tier, keyed by the full cache key.
#[async_trait]
pub trait DistributedStore: Send + Sync {
    /// Fetch the stored bytes, or `None` when absent or expired.
    async fn get(&self, key: &str) -> TieredResult<Option<Vec<u8>>>;

    /// Store bytes for `ttl`. A zero `ttl` never expires.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> TieredResult<()>;

    /// Remove a key.
    ///
    /// Returns `false` on a transient failure that is worth retrying.
    /// Removing an absent key returns `true`.
    async fn delete(&self, key: &str) -> TieredResult<bool>;
}

/// Per-function cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Hits served from the request tier.
    pub request_hits: u64,
    /// Hits served from the distributed tier.
    pub distributed_hits: u64,
    /// Hits served from the durable tier.
    pub durable_hits: u64,
    /// Lookups that found nothing usable in any tier.
    pub misses: u64,
    /// Executions of the wrapped function that succeeded.
    pub computations: u64,
    /// Executions that failed, plus negative hits in the request tier.
    pub failures: u64,
}

impl CacheStats {
    /// Hits across all tiers.
    pub fn hits(&self) -> u64 {
        self.request_hits + self.distributed_hits + self.durable_hits
    }

    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits() + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits() as f64 / total as f64
        }
    }
}
