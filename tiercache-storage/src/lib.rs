//! tiercache storage
//!
//! Cache tier backends and the multi-tier cache coordinator. Codecs, typed
//! objects and key derivation live in `tiercache-core`.

pub mod cache;

pub use cache::{
    CacheEntry, CacheStats, CachedFailure, CachedFunction, CachedFunctionBuilder, CallContext,
    CallError, DistributedStore, DurableRecord, DurableStore, EntryCodec, InMemoryDistributedStore,
    InMemoryDurableStore, KeyGuard, KeyHold, KeyLockTable, LmdbDurableStore, LmdbStoreError,
    LocalEntry, Produced, RequestCache, Tier,
};
