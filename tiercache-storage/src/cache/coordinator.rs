//! Multi-tier cache coordinator.
//!
//! A [`CachedFunction`] wraps an async computation and serves its results
//! from three tiers, fastest first:
//!
//! 1. the request tier of the caller's [`CallContext`]
//! 2. the distributed tier, keyed by the full cache key
//! 3. the durable tier, keyed by the hashed and versioned cache key
//!
//! Every call for a key runs under that key's lock from the
//! [`KeyLockTable`], so concurrent callers with the same arguments see one
//! computation. Hits are promoted to the faster tiers. New values go to the
//! shared tiers only when the context's write barrier is down; the request
//! tier is always written.
//!
//! # Example
//!
//! ```ignore
//! let rates = CachedFunction::builder(metadata, CachePolicy::new(1), marshaller)
//!     .distributed(Arc::new(InMemoryDistributedStore::new()))
//!     .compute(|args| async move { fetch_rates(args).await })
//!     .build()?;
//!
//! let ctx = CallContext::new();
//! let value = rates.call(&ctx, Arguments::new().arg("EUR")).await?;
//! ctx.clear()?;
//! ```

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use futures_util::future::{BoxFuture, FutureExt};
use thiserror::Error;
use tiercache_core::{
    Arguments, CacheKey, CachePolicy, CacheSettings, ConfigError, EffectiveArguments,
    FunctionMetadata, KeyDeriver, KeyStrategy, Marshaller, TierError, TieredError, TieredResult,
    Value,
};
use tracing::{debug, error, warn};

use super::entry::{CacheEntry, EntryCodec};
use super::lock_table::KeyLockTable;
use super::request::{CallContext, KeyHold, LocalEntry};
use super::traits::{CacheStats, DistributedStore, DurableRecord, DurableStore, Tier};

// =============================================================================
// RESULT TYPES
// =============================================================================

/// Error returned by [`CachedFunction::call`].
#[derive(Debug, Error)]
pub enum CallError<E> {
    /// The wrapped function failed. Propagated unchanged.
    #[error("{0}")]
    Function(E),

    /// The cache itself failed.
    #[error(transparent)]
    Cache(#[from] TieredError),
}

impl<E> CallError<E> {
    pub fn function_error(&self) -> Option<&E> {
        match self {
            CallError::Function(e) => Some(e),
            CallError::Cache(_) => None,
        }
    }

    pub fn cache_error(&self) -> Option<&TieredError> {
        match self {
            CallError::Function(_) => None,
            CallError::Cache(e) => Some(e),
        }
    }
}

/// What a wrapped function produces.
pub enum Produced {
    Value(Value),
    /// A lazily produced sequence. Collected before caching, so every hit
    /// replays the same items.
    Sequence(Box<dyn Iterator<Item = Value> + Send>),
}

impl Produced {
    pub fn sequence<I>(items: I) -> Self
    where
        I: IntoIterator<Item = Value>,
        I::IntoIter: Send + 'static,
    {
        Produced::Sequence(Box::new(items.into_iter()))
    }

    pub fn materialize(self) -> Value {
        match self {
            Produced::Value(value) => value,
            Produced::Sequence(items) => Value::List(items.collect()),
        }
    }
}

impl fmt::Debug for Produced {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Produced::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Produced::Sequence(_) => write!(f, "Sequence(..)"),
        }
    }
}

impl From<Value> for Produced {
    fn from(value: Value) -> Self {
        Produced::Value(value)
    }
}

impl From<Vec<Value>> for Produced {
    fn from(items: Vec<Value>) -> Self {
        Produced::Value(Value::List(items))
    }
}

type ComputeFn<E> =
    Arc<dyn Fn(EffectiveArguments) -> BoxFuture<'static, Result<Produced, E>> + Send + Sync>;

// =============================================================================
// STATISTICS
// =============================================================================

#[derive(Debug, Default)]
struct StatsCounters {
    request_hits: AtomicU64,
    distributed_hits: AtomicU64,
    durable_hits: AtomicU64,
    misses: AtomicU64,
    computations: AtomicU64,
    failures: AtomicU64,
}

impl StatsCounters {
    fn record_hit(&self, tier: Tier) {
        let counter = match tier {
            Tier::Request => &self.request_hits,
            Tier::Distributed => &self.distributed_hits,
            Tier::Durable => &self.durable_hits,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> CacheStats {
        CacheStats {
            request_hits: self.request_hits.load(Ordering::Relaxed),
            distributed_hits: self.distributed_hits.load(Ordering::Relaxed),
            durable_hits: self.durable_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computations: self.computations.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for [`CachedFunction`].
pub struct CachedFunctionBuilder<E> {
    metadata: FunctionMetadata,
    policy: CachePolicy,
    marshaller: Marshaller,
    settings: CacheSettings,
    strategy: KeyStrategy,
    distributed: Option<Arc<dyn DistributedStore>>,
    durable: Option<Arc<dyn DurableStore>>,
    locks: Option<Arc<KeyLockTable>>,
    compute: Option<ComputeFn<E>>,
}

impl<E> CachedFunctionBuilder<E>
where
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn distributed(mut self, store: Arc<dyn DistributedStore>) -> Self {
        self.distributed = Some(store);
        self
    }

    pub fn durable(mut self, store: Arc<dyn DurableStore>) -> Self {
        self.durable = Some(store);
        self
    }

    /// Use a private lock table instead of the process-wide one.
    pub fn lock_table(mut self, locks: Arc<KeyLockTable>) -> Self {
        self.locks = Some(locks);
        self
    }

    /// The computation to cache.
    pub fn compute<F, Fut, P>(mut self, f: F) -> Self
    where
        F: Fn(EffectiveArguments) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<P, E>> + Send + 'static,
        P: Into<Produced> + 'static,
    {
        self.compute = Some(Arc::new(move |args| {
            f(args)
                .map(|result| result.map(Into::<Produced>::into))
                .boxed()
        }));
        self
    }

    pub fn build(self) -> TieredResult<CachedFunction<E>> {
        let name = self.metadata.name().to_string();
        self.policy.validate(&name)?;
        self.settings.validate()?;

        let missing_store = |tier: Tier| ConfigError::MissingStore {
            tier: tier.to_string(),
            function: name.clone(),
        };
        let distributed = match (self.policy.distributed, self.distributed) {
            (true, None) => return Err(missing_store(Tier::Distributed).into()),
            (true, store) => store,
            (false, _) => None,
        };
        let durable = match (self.policy.durable.as_ref(), self.durable) {
            (Some(_), None) => return Err(missing_store(Tier::Durable).into()),
            (Some(_), store) => store,
            (None, _) => None,
        };
        let compute = self.compute.ok_or_else(|| ConfigError::InvalidValue {
            field: "compute".to_string(),
            value: name.clone(),
            reason: "no computation supplied".to_string(),
        })?;

        let metadata = Arc::new(self.metadata);
        let deriver = KeyDeriver::new(
            Arc::clone(&metadata),
            self.policy.version,
            self.strategy,
            self.marshaller.clone(),
        );
        let codec = EntryCodec::new(self.marshaller, metadata.return_type().clone());

        Ok(CachedFunction {
            metadata,
            policy: self.policy,
            settings: self.settings,
            deriver,
            codec,
            distributed,
            durable,
            locks: self.locks.unwrap_or_else(KeyLockTable::global),
            compute,
            stats: StatsCounters::default(),
        })
    }
}

// =============================================================================
// CACHED FUNCTION
// =============================================================================

/// A function whose results are cached across the request, distributed and
/// durable tiers.
pub struct CachedFunction<E> {
    metadata: Arc<FunctionMetadata>,
    policy: CachePolicy,
    settings: CacheSettings,
    deriver: KeyDeriver,
    codec: EntryCodec,
    distributed: Option<Arc<dyn DistributedStore>>,
    durable: Option<Arc<dyn DurableStore>>,
    locks: Arc<KeyLockTable>,
    compute: ComputeFn<E>,
    stats: StatsCounters,
}

impl<E> fmt::Debug for CachedFunction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachedFunction")
            .field("function", &self.metadata.name())
            .field("policy", &self.policy)
            .finish()
    }
}

impl<E> CachedFunction<E>
where
    E: std::error::Error + Clone + Send + Sync + 'static,
{
    pub fn builder(
        metadata: FunctionMetadata,
        policy: CachePolicy,
        marshaller: Marshaller,
    ) -> CachedFunctionBuilder<E> {
        CachedFunctionBuilder {
            metadata,
            policy,
            marshaller,
            settings: CacheSettings::default(),
            strategy: KeyStrategy::Canonical,
            distributed: None,
            durable: None,
            locks: None,
            compute: None,
        }
    }

    pub fn metadata(&self) -> &FunctionMetadata {
        &self.metadata
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    /// Serializer and deserializer for this function's cache entries.
    pub fn entry_codec(&self) -> &EntryCodec {
        &self.codec
    }

    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot()
    }

    /// Key that a call with `args` would use.
    pub fn cache_key(&self, args: Arguments) -> TieredResult<CacheKey> {
        self.deriver.derive_for(args)
    }

    fn log_key(&self, key: &CacheKey) -> String {
        key.truncated(self.settings.log_key_limit)
    }

    /// Lock `key` for the unit of work behind `ctx`. Returns `None` when the
    /// unit of work already holds it, e.g. a computation updating its own
    /// entry.
    async fn acquire(&self, ctx: &CallContext, key: &CacheKey) -> TieredResult<Option<KeyHold>> {
        if ctx.holds(key.as_str()) {
            return Ok(None);
        }
        let guard = self.locks.lock(key.as_str()).await?;
        ctx.hold(key.as_str(), guard).map(Some)
    }

    /// Call the function through the cache.
    ///
    /// Key locks are reentrant per unit of work. The computation may update
    /// or invalidate its own key through a clone of `ctx` without waiting on
    /// itself. Tasks sharing one context count as one unit of work; other
    /// contexts wait for the lock.
    pub async fn call(&self, ctx: &CallContext, args: Arguments) -> Result<Value, CallError<E>> {
        let effective = self.metadata.bind(args)?;
        let key = self.deriver.derive(&effective)?;
        let _hold = self.acquire(ctx, &key).await?;
        let function = self.metadata.name();

        if self.policy.request {
            match ctx.request().get(key.as_str())? {
                Some(LocalEntry::Success(value)) => {
                    self.stats.record_hit(Tier::Request);
                    debug!(function, "Hit(request)");
                    return Ok(value);
                }
                Some(LocalEntry::Failure(failure)) => {
                    if let Some(e) = failure.downcast_ref::<E>() {
                        self.stats.failures.fetch_add(1, Ordering::Relaxed);
                        debug!(function, "Hit(request, failure)");
                        return Err(CallError::Function(e.clone()));
                    }
                }
                Some(LocalEntry::SharedFailure(_)) | None => {}
            }
        }

        if let Some(store) = &self.distributed {
            let read = store.get(key.as_str()).await;
            if let Some(bytes) = self.miss_on_decode(&key, Tier::Distributed, read)? {
                if let Some(value) = self.accept(ctx, &key, &bytes, Tier::Distributed)? {
                    self.stats.record_hit(Tier::Distributed);
                    debug!(function, "Hit(distributed)");
                    return Ok(value);
                }
            }
        }

        if let Some(store) = &self.durable {
            let read = store.get(&key.durable_key()).await;
            if let Some(record) = self.miss_on_decode(&key, Tier::Durable, read)? {
                if let Some(value) = self.accept(ctx, &key, &record.value, Tier::Durable)? {
                    if let Some(distributed) = &self.distributed {
                        distributed
                            .set(key.as_str(), record.value, self.policy.lifetime)
                            .await?;
                    }
                    self.stats.record_hit(Tier::Durable);
                    debug!(function, "Hit(durable)");
                    return Ok(value);
                }
            }
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        let produced = (self.compute)(effective).await;
        match produced {
            Ok(produced) => {
                let value = produced.materialize();
                self.metadata.check_return(&value)?;
                self.stats.computations.fetch_add(1, Ordering::Relaxed);
                self.store(ctx, &key, &value).await?;
                Ok(value)
            }
            Err(e) => {
                self.stats.failures.fetch_add(1, Ordering::Relaxed);
                if self.policy.request {
                    ctx.request()
                        .insert(key.as_str(), LocalEntry::Failure(Arc::new(e.clone())))?;
                }
                Err(CallError::Function(e))
            }
        }
    }

    /// A tier read whose record cannot be decoded is a miss for that tier.
    /// I/O failures still propagate.
    fn miss_on_decode<T>(
        &self,
        key: &CacheKey,
        tier: Tier,
        read: TieredResult<Option<T>>,
    ) -> TieredResult<Option<T>> {
        match read {
            Err(e) if e.is_decode() => {
                warn!(
                    function = self.metadata.name(),
                    %tier,
                    key = %self.log_key(key),
                    error = %e,
                    "Unreadable cache record, treating as miss"
                );
                Ok(None)
            }
            other => other,
        }
    }

    /// Decode an entry fetched from a shared tier and record it in the
    /// request tier. Returns the value only for a success entry.
    ///
    /// Malformed entries are a miss for that tier.
    fn accept(
        &self,
        ctx: &CallContext,
        key: &CacheKey,
        bytes: &[u8],
        tier: Tier,
    ) -> TieredResult<Option<Value>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        let entry = match self.codec.decode(bytes) {
            Ok(Some(entry)) => entry,
            Ok(None) => return Ok(None),
            Err(e) if e.is_decode() => {
                warn!(
                    function = self.metadata.name(),
                    %tier,
                    key = %self.log_key(key),
                    error = %e,
                    "Malformed cache entry, treating as miss"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };
        match entry {
            CacheEntry::Success(value) => {
                if self.policy.request {
                    ctx.request()
                        .insert(key.as_str(), LocalEntry::Success(value.clone()))?;
                }
                Ok(Some(value))
            }
            CacheEntry::Failure(failure) => {
                if self.policy.request {
                    ctx.request()
                        .insert(key.as_str(), LocalEntry::SharedFailure(failure))?;
                }
                Ok(None)
            }
        }
    }

    /// Persist a freshly computed value.
    async fn store(&self, ctx: &CallContext, key: &CacheKey, value: &Value) -> TieredResult<()> {
        let function = self.metadata.name();
        let shared = self.durable.is_some() || self.distributed.is_some();

        if !ctx.is_transactional() && shared {
            let bytes = self.codec.encode(&CacheEntry::Success(value.clone()))?;

            if let (Some(store), Some(description)) = (&self.durable, &self.policy.durable) {
                debug!(function, key = %self.log_key(key), "Saving(durable)");
                store
                    .put(
                        &key.durable_key(),
                        DurableRecord {
                            value: bytes.clone(),
                            description: description.clone(),
                            created_at: Utc::now(),
                        },
                    )
                    .await?;
            }
            if let Some(store) = &self.distributed {
                debug!(function, key = %self.log_key(key), "Saving(distributed)");
                store.set(key.as_str(), bytes, self.policy.lifetime).await?;
            }
        }

        if self.policy.request {
            debug!(function, key = %self.log_key(key), "Saving(request)");
            ctx.request()
                .insert(key.as_str(), LocalEntry::Success(value.clone()))?;
        }
        Ok(())
    }

    /// Remove the entry for `args` from every enabled tier.
    ///
    /// Runs under the key's lock. Distributed deletes are retried with linear
    /// backoff; running out of attempts is logged at error level and returned
    /// as [`TierError::InvalidationFailed`].
    pub async fn invalidate(&self, ctx: &CallContext, args: Arguments) -> TieredResult<()> {
        let key = self.deriver.derive_for(args)?;
        let _hold = self.acquire(ctx, &key).await?;
        let function = self.metadata.name();

        if let Some(store) = &self.durable {
            store.delete(&key.durable_key()).await?;
        }

        if let Some(store) = &self.distributed {
            let attempts = self.settings.invalidate_attempts;
            let mut attempt = 1;
            while !store.delete(key.as_str()).await? {
                if attempt >= attempts {
                    error!(
                        function,
                        key = %self.log_key(&key),
                        attempts,
                        "Could not invalidate distributed cache entry"
                    );
                    return Err(TierError::InvalidationFailed {
                        key: self.log_key(&key),
                        attempts,
                    }
                    .into());
                }
                warn!(function, attempt, "Distributed delete failed, retrying");
                tokio::time::sleep(self.settings.invalidate_backoff * attempt).await;
                attempt += 1;
            }
        }

        if self.policy.request {
            ctx.request().remove(key.as_str())?;
        }
        debug!(function, key = %self.log_key(&key), "Invalidated");
        Ok(())
    }

    /// Seed the request tier with `value` for `args`, skipping computation.
    ///
    /// Shared tiers are not touched. A no-op when the request tier is
    /// disabled.
    pub async fn update(&self, ctx: &CallContext, args: Arguments, value: Value) -> TieredResult<()> {
        if !self.policy.request {
            return Ok(());
        }
        let key = self.deriver.derive_for(args)?;
        self.metadata.check_return(&value)?;
        let _hold = self.acquire(ctx, &key).await?;
        ctx.request()
            .insert(key.as_str(), LocalEntry::Success(value))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::memory::{InMemoryDistributedStore, InMemoryDurableStore};
    use tiercache_core::{FunctionSignature, SemanticType};

    #[derive(Debug, Clone, PartialEq, Error)]
    #[error("lookup failed: {0}")]
    struct LookupError(String);

    fn metadata() -> FunctionMetadata {
        FunctionMetadata::capture(
            FunctionSignature::new("square", "tests.math").param("n"),
            [("n", SemanticType::Integer)],
            SemanticType::Integer,
        )
        .unwrap()
    }

    fn builder(policy: CachePolicy) -> CachedFunctionBuilder<LookupError> {
        CachedFunction::builder(metadata(), policy, Marshaller::primitives_only())
            .lock_table(Arc::new(KeyLockTable::new()))
            .compute(|args: EffectiveArguments| async move {
                let n = args.get("n").and_then(Value::as_i64).unwrap_or_default();
                Ok::<_, LookupError>(Value::Integer(n * n))
            })
    }

    #[test]
    fn test_build_requires_enabled_stores() {
        let err = builder(CachePolicy::new(1)).build().unwrap_err();
        assert!(matches!(
            err,
            TieredError::Config(ConfigError::MissingStore { .. })
        ));

        let err = builder(CachePolicy::durable(1, "squares"))
            .distributed(Arc::new(InMemoryDistributedStore::new()))
            .build()
            .unwrap_err();
        assert!(matches!(
            err,
            TieredError::Config(ConfigError::MissingStore { .. })
        ));

        assert!(builder(CachePolicy::durable(1, "squares"))
            .distributed(Arc::new(InMemoryDistributedStore::new()))
            .durable(Arc::new(InMemoryDurableStore::new()))
            .build()
            .is_ok());
    }

    #[test]
    fn test_build_rejects_invalid_policy() {
        let policy = CachePolicy::new(1).with_request(false).with_distributed(false);
        assert!(matches!(
            builder(policy).build().unwrap_err(),
            TieredError::Config(ConfigError::NoTierEnabled { .. })
        ));
    }

    #[test]
    fn test_build_requires_compute() {
        let err = CachedFunction::<LookupError>::builder(
            metadata(),
            CachePolicy::new(1).with_distributed(false),
            Marshaller::primitives_only(),
        )
        .build()
        .unwrap_err();
        assert!(matches!(
            err,
            TieredError::Config(ConfigError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_produced_sequence_materializes() {
        let produced = Produced::sequence((1..=3).map(Value::Integer));
        assert_eq!(
            produced.materialize(),
            Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)])
        );
        assert_eq!(
            Produced::from(Value::Boolean(true)).materialize(),
            Value::Boolean(true)
        );
    }

    #[tokio::test]
    async fn test_request_only_call_and_update() {
        let square = builder(CachePolicy::new(1).with_distributed(false))
            .build()
            .unwrap();
        let ctx = CallContext::new();

        let value = square.call(&ctx, Arguments::new().arg(4i64)).await.unwrap();
        assert_eq!(value, Value::Integer(16));
        assert_eq!(square.stats().computations, 1);

        square
            .update(&ctx, Arguments::new().arg(5i64), Value::Integer(-1))
            .await
            .unwrap();
        let seeded = square.call(&ctx, Arguments::new().arg(5i64)).await.unwrap();
        assert_eq!(seeded, Value::Integer(-1));
        assert_eq!(square.stats().computations, 1);
        assert_eq!(square.stats().request_hits, 1);
    }

    #[tokio::test]
    async fn test_update_rejects_wrong_return_type() {
        let square = builder(CachePolicy::new(1).with_distributed(false))
            .build()
            .unwrap();
        let err = square
            .update(&CallContext::new(), Arguments::new().arg(2i64), Value::from("four"))
            .await
            .unwrap_err();
        assert!(matches!(err, TieredError::Validation(_)));
    }

    #[tokio::test]
    async fn test_argument_errors_are_cache_errors() {
        let square = builder(CachePolicy::new(1).with_distributed(false))
            .build()
            .unwrap();
        let err = square
            .call(&CallContext::new(), Arguments::new().arg("four"))
            .await
            .unwrap_err();
        assert!(err.function_error().is_none());
        assert!(matches!(err.cache_error(), Some(TieredError::Validation(_))));
    }
}
