//! Cache tiers and the multi-tier coordinator.
//!
//! # Tiers
//!
//! | Tier | Scope | Keyed by | Lifetime |
//! |------|-------|----------|----------|
//! | request | one [`CallContext`] | full cache key | until [`CallContext::clear`] |
//! | distributed | shared | full cache key | policy lifetime |
//! | durable | shared | `"{version}-{sha256 hex}"` | until invalidated |
//!
//! Shared tiers sit behind the [`DistributedStore`] and [`DurableStore`]
//! traits. [`CachedFunction`] orchestrates lookup, promotion, computation,
//! persistence and invalidation across them.

pub mod coordinator;
pub mod entry;
pub mod lmdb_backend;
pub mod lock_table;
pub mod memory;
pub mod request;
pub mod traits;

pub use coordinator::{CallError, CachedFunction, CachedFunctionBuilder, Produced};
pub use entry::{CacheEntry, CachedFailure, EntryCodec};
pub use lmdb_backend::{LmdbDurableStore, LmdbStoreError};
pub use lock_table::{KeyGuard, KeyLockTable};
pub use memory::{InMemoryDistributedStore, InMemoryDurableStore};
pub use request::{CallContext, KeyHold, LocalEntry, RequestCache};
pub use traits::{CacheStats, DistributedStore, DurableRecord, DurableStore, Tier};
