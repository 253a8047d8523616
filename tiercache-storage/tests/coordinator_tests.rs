//! Integration tests for the multi-tier cache coordinator.
//!
//! Exercises lookup order, promotion between tiers, the write barrier,
//! request-scoped failure caching, invalidation and concurrent callers,
//! against instrumented in-memory tiers and the LMDB durable store.

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::OnceCell;
use serde_json::json;
use tempfile::TempDir;
use thiserror::Error;
use tiercache_storage::{
    CacheEntry, CachedFailure, CachedFunction, CallContext, DurableRecord, DurableStore,
    DistributedStore, KeyLockTable, LmdbDurableStore, Produced,
};
use tiercache_test_utils::assertions::assert_invalidation_failed;
use tiercache_test_utils::fixtures;
use tiercache_test_utils::{
    Arguments, CachePolicy, CallCounter, FunctionMetadata, FunctionSignature,
    InstrumentedDistributedStore, InstrumentedDurableStore, SemanticType, TierError, TieredError,
    Value,
};

#[derive(Debug, Clone, PartialEq, Error)]
enum ProfileError {
    #[error("no profile for user {0}")]
    NotFound(i64),
}

// ============================================================================
// HELPERS
// ============================================================================

struct Harness {
    function: CachedFunction<ProfileError>,
    distributed: Arc<InstrumentedDistributedStore>,
    durable: Arc<InstrumentedDurableStore>,
    computed: CallCounter,
}

/// `get_profile` over instrumented tiers. Negative ids fail.
fn profile_harness(policy: CachePolicy) -> Harness {
    let distributed = InstrumentedDistributedStore::new();
    let durable = InstrumentedDurableStore::new();
    let computed = CallCounter::new();

    let counter = computed.clone();
    let function = CachedFunction::builder(
        fixtures::lookup_metadata(),
        policy,
        fixtures::zoo_marshaller(),
    )
    .settings(fixtures::fast_settings())
    .lock_table(Arc::new(KeyLockTable::new()))
    .distributed(distributed.clone())
    .durable(durable.clone())
    .compute(move |args| {
        let counter = counter.clone();
        async move {
            counter.bump();
            let user_id = args.get("user_id").and_then(Value::as_i64).unwrap_or_default();
            if user_id < 0 {
                return Err(ProfileError::NotFound(user_id));
            }
            Ok(Value::Mapping(json!({ "user_id": user_id, "plan": "pro" })))
        }
    })
    .build()
    .unwrap();

    Harness {
        function,
        distributed,
        durable,
        computed,
    }
}

/// Route coordinator logs to the test output, filtered by `RUST_LOG`.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn user(id: i64) -> Arguments {
    Arguments::new().arg(id)
}

fn profile(id: i64) -> Value {
    Value::Mapping(json!({ "user_id": id, "plan": "pro" }))
}

// ============================================================================
// LOOKUP AND PROMOTION
// ============================================================================

#[tokio::test]
async fn test_miss_writes_every_enabled_tier() {
    let h = profile_harness(CachePolicy::durable(1, "user profiles"));
    let ctx = CallContext::new();

    let value = h.function.call(&ctx, user(7)).await.unwrap();
    assert_eq!(value, profile(7));
    assert_eq!(h.computed.count(), 1);

    let key = h.function.cache_key(user(7)).unwrap();
    assert!(ctx.request().contains(key.as_str()));
    assert!(h.durable.inner().contains(&key.durable_key()));

    let sets = h.distributed.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].key, key.as_str());
    assert_eq!(sets[0].ttl, Duration::ZERO);

    let record = h.durable.get(&key.durable_key()).await.unwrap().unwrap();
    assert_eq!(record.description, "user profiles");
    // both shared tiers hold the same entry bytes
    assert_eq!(record.value, sets[0].value);
}

#[tokio::test]
async fn test_request_tier_serves_repeat_calls() {
    let h = profile_harness(CachePolicy::new(1));
    let ctx = CallContext::new();

    h.function.call(&ctx, user(1)).await.unwrap();
    h.function.call(&ctx, user(1)).await.unwrap();
    h.function
        .call(&ctx, Arguments::new().kwarg("user_id", 1i64))
        .await
        .unwrap();

    assert_eq!(h.computed.count(), 1);
    assert_eq!(h.distributed.get_count(), 1);
    let stats = h.function.stats();
    assert_eq!(stats.request_hits, 2);
    assert_eq!(stats.misses, 1);
}

#[tokio::test]
async fn test_distributed_hit_fills_request_tier() {
    let h = profile_harness(CachePolicy::new(1));
    h.function.call(&CallContext::new(), user(2)).await.unwrap();

    let ctx = CallContext::new();
    let value = h.function.call(&ctx, user(2)).await.unwrap();
    assert_eq!(value, profile(2));
    assert_eq!(h.computed.count(), 1);
    assert_eq!(h.function.stats().distributed_hits, 1);

    let key = h.function.cache_key(user(2)).unwrap();
    assert!(ctx.request().contains(key.as_str()));
}

#[tokio::test]
async fn test_durable_hit_promotes_same_bytes() {
    let h = profile_harness(CachePolicy::durable(3, "user profiles"));
    let key = h.function.cache_key(user(9)).unwrap();
    let bytes = h
        .function
        .entry_codec()
        .encode(&CacheEntry::Success(profile(9)))
        .unwrap();
    h.durable
        .put(
            &key.durable_key(),
            DurableRecord {
                value: bytes.clone(),
                description: "seeded".to_string(),
                created_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let ctx = CallContext::new();
    let value = h.function.call(&ctx, user(9)).await.unwrap();
    assert_eq!(value, profile(9));
    assert_eq!(h.computed.count(), 0);
    assert_eq!(h.function.stats().durable_hits, 1);

    let sets = h.distributed.sets();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].value, bytes);
    assert_eq!(sets[0].ttl, Duration::ZERO);
    assert!(ctx.request().contains(key.as_str()));

    // the next context finds it one tier up
    h.function.call(&CallContext::new(), user(9)).await.unwrap();
    assert_eq!(h.function.stats().distributed_hits, 1);
    assert_eq!(h.durable.get_count(), 1);
}

#[tokio::test]
async fn test_defaults_share_a_key_with_explicit_values() {
    let h = profile_harness(CachePolicy::new(1));
    let implicit = h.function.cache_key(user(4)).unwrap();
    let explicit = h
        .function
        .cache_key(
            Arguments::new()
                .arg(4i64)
                .kwarg("include_history", false)
                .kwarg("tags", Value::List(vec![])),
        )
        .unwrap();
    assert_eq!(implicit, explicit);
    assert!(implicit.as_str().starts_with("v1."));
}

#[tokio::test]
async fn test_version_bump_changes_keys() {
    let v1 = profile_harness(CachePolicy::new(1));
    let v2 = profile_harness(CachePolicy::new(2));
    let a = v1.function.cache_key(user(5)).unwrap();
    let b = v2.function.cache_key(user(5)).unwrap();
    assert_ne!(a, b);
    assert_ne!(a.durable_key(), b.durable_key());
    assert!(b.durable_key().starts_with("2-"));
}

// ============================================================================
// MALFORMED AND FAILURE ENTRIES
// ============================================================================

#[tokio::test]
async fn test_malformed_distributed_entry_is_a_miss() {
    init_tracing();
    let h = profile_harness(CachePolicy::new(1));
    let key = h.function.cache_key(user(3)).unwrap();
    h.distributed
        .inner()
        .set(key.as_str(), b"1\x07garbage".to_vec(), Duration::from_secs(60))
        .await
        .unwrap();

    let value = h.function.call(&CallContext::new(), user(3)).await.unwrap();
    assert_eq!(value, profile(3));
    assert_eq!(h.computed.count(), 1);

    // recomputed value replaced the garbage
    let stored = h.distributed.inner().peek(key.as_str()).unwrap();
    assert_eq!(
        h.function.entry_codec().decode(&stored).unwrap(),
        Some(CacheEntry::Success(profile(3)))
    );
}

#[tokio::test]
async fn test_empty_distributed_entry_is_a_miss() {
    let h = profile_harness(CachePolicy::new(1));
    let key = h.function.cache_key(user(8)).unwrap();
    h.distributed
        .inner()
        .set(key.as_str(), Vec::new(), Duration::from_secs(60))
        .await
        .unwrap();

    h.function.call(&CallContext::new(), user(8)).await.unwrap();
    assert_eq!(h.computed.count(), 1);
}

#[tokio::test]
async fn test_malformed_durable_entry_is_a_miss() {
    init_tracing();
    let h = profile_harness(CachePolicy::durable(3, "user profiles"));
    let key = h.function.cache_key(user(12)).unwrap();
    h.durable
        .inner()
        .put(
            &key.durable_key(),
            DurableRecord {
                value: b"1\x07garbage".to_vec(),
                description: "seeded".to_string(),
                created_at: chrono::Utc::now(),
            },
        )
        .await
        .unwrap();

    let value = h.function.call(&CallContext::new(), user(12)).await.unwrap();
    assert_eq!(value, profile(12));
    assert_eq!(h.computed.count(), 1);
    assert_eq!(h.function.stats().durable_hits, 0);

    // recomputed value replaced the garbage
    assert_eq!(h.durable.put_count(), 1);
    let record = h.durable.inner().get(&key.durable_key()).await.unwrap().unwrap();
    assert_eq!(
        h.function.entry_codec().decode(&record.value).unwrap(),
        Some(CacheEntry::Success(profile(12)))
    );
}

#[tokio::test]
async fn test_unreadable_durable_record_is_a_miss() {
    let h = profile_harness(CachePolicy::durable(3, "user profiles"));
    h.durable.fail_get_decode(true);

    let value = h.function.call(&CallContext::new(), user(13)).await.unwrap();
    assert_eq!(value, profile(13));
    assert_eq!(h.computed.count(), 1);
    assert_eq!(h.durable.get_count(), 1);
    assert_eq!(h.durable.put_count(), 1);
}

#[tokio::test]
async fn test_shared_failure_entry_falls_through() {
    let h = profile_harness(CachePolicy::new(1));
    let key = h.function.cache_key(user(6)).unwrap();
    let failure = h
        .function
        .entry_codec()
        .encode(&CacheEntry::Failure(CachedFailure::new(
            "NotFound",
            "written by another process",
        )))
        .unwrap();
    h.distributed
        .inner()
        .set(key.as_str(), failure, Duration::from_secs(60))
        .await
        .unwrap();

    let ctx = CallContext::new();
    let value = h.function.call(&ctx, user(6)).await.unwrap();
    assert_eq!(value, profile(6));
    assert_eq!(h.computed.count(), 1);

    // served from the request tier now
    h.function.call(&ctx, user(6)).await.unwrap();
    assert_eq!(h.computed.count(), 1);
    assert_eq!(h.function.stats().request_hits, 1);
}

#[tokio::test]
async fn test_distributed_outage_is_a_cache_error() {
    let h = profile_harness(CachePolicy::new(1));
    h.distributed.fail_gets(true);

    let err = h.function.call(&CallContext::new(), user(1)).await.unwrap_err();
    assert!(matches!(
        err.cache_error(),
        Some(TieredError::Tier(TierError::Unavailable { .. }))
    ));
    assert_eq!(h.computed.count(), 0);
}

// ============================================================================
// FAILURE CACHING
// ============================================================================

#[tokio::test]
async fn test_failures_are_cached_for_the_unit_of_work_only() {
    let h = profile_harness(CachePolicy::durable(1, "user profiles"));
    let ctx = CallContext::new();

    let first = h.function.call(&ctx, user(-1)).await.unwrap_err();
    assert_eq!(first.function_error(), Some(&ProfileError::NotFound(-1)));
    let second = h.function.call(&ctx, user(-1)).await.unwrap_err();
    assert_eq!(second.function_error(), Some(&ProfileError::NotFound(-1)));
    assert_eq!(h.computed.count(), 1);

    // never written to a shared tier
    assert!(h.distributed.sets().is_empty());
    assert_eq!(h.durable.put_count(), 0);

    // a fresh unit of work computes again
    h.function.call(&CallContext::new(), user(-1)).await.unwrap_err();
    assert_eq!(h.computed.count(), 2);

    ctx.clear().unwrap();
    h.function.call(&ctx, user(-1)).await.unwrap_err();
    assert_eq!(h.computed.count(), 3);
    assert_eq!(h.function.stats().failures, 4);
}

// ============================================================================
// WRITE BARRIER
// ============================================================================

#[tokio::test]
async fn test_transactional_context_keeps_shared_tiers_clean() {
    let h = profile_harness(CachePolicy::durable(1, "user profiles"));
    let ctx = CallContext::new();
    let tx = ctx.transactional();

    h.function.call(&tx, user(11)).await.unwrap();
    assert!(h.distributed.sets().is_empty());
    assert_eq!(h.durable.put_count(), 0);

    // visible to the rest of the unit of work
    h.function.call(&ctx, user(11)).await.unwrap();
    assert_eq!(h.computed.count(), 1);

    // but not to anyone else
    h.function.call(&CallContext::new(), user(11)).await.unwrap();
    assert_eq!(h.computed.count(), 2);
    assert_eq!(h.distributed.sets().len(), 1);
}

// ============================================================================
// INVALIDATION AND UPDATE
// ============================================================================

#[tokio::test]
async fn test_invalidate_clears_every_tier() {
    let h = profile_harness(CachePolicy::durable(1, "user profiles"));
    let ctx = CallContext::new();
    h.function.call(&ctx, user(12)).await.unwrap();
    let key = h.function.cache_key(user(12)).unwrap();

    h.function.invalidate(&ctx, user(12)).await.unwrap();
    assert!(!ctx.request().contains(key.as_str()));
    assert!(h.distributed.inner().peek(key.as_str()).is_none());
    assert!(!h.durable.inner().contains(&key.durable_key()));

    h.function.call(&ctx, user(12)).await.unwrap();
    assert_eq!(h.computed.count(), 2);
}

#[tokio::test]
async fn test_invalidate_of_absent_key_succeeds() {
    let h = profile_harness(CachePolicy::new(1));
    h.function
        .invalidate(&CallContext::new(), user(404))
        .await
        .unwrap();
    assert_eq!(h.distributed.delete_count(), 1);
}

#[tokio::test]
async fn test_invalidate_retries_transient_failures() {
    init_tracing();
    let h = profile_harness(CachePolicy::new(1));
    let ctx = CallContext::new();
    h.function.call(&ctx, user(13)).await.unwrap();

    h.distributed.fail_deletes(2);
    h.function.invalidate(&ctx, user(13)).await.unwrap();
    assert_eq!(h.distributed.delete_count(), 3);
    assert!(h.distributed.inner().is_empty());
}

#[tokio::test]
async fn test_invalidate_gives_up_after_configured_attempts() {
    init_tracing();
    let h = profile_harness(CachePolicy::new(1));
    let ctx = CallContext::new();
    h.function.call(&ctx, user(14)).await.unwrap();

    h.distributed.fail_deletes(10);
    let result = h.function.invalidate(&ctx, user(14)).await;
    assert_invalidation_failed(&result, 3);
    assert_eq!(h.distributed.delete_count(), 3);

    // the request tier still holds the value
    let key = h.function.cache_key(user(14)).unwrap();
    assert!(ctx.request().contains(key.as_str()));
}

#[tokio::test]
async fn test_update_touches_request_tier_only() {
    let h = profile_harness(CachePolicy::new(1));
    let ctx = CallContext::new();
    let seeded = Value::Mapping(json!({ "user_id": 15, "plan": "free" }));

    h.function
        .update(&ctx, user(15), seeded.clone())
        .await
        .unwrap();
    assert_eq!(h.function.call(&ctx, user(15)).await.unwrap(), seeded);
    assert_eq!(h.computed.count(), 0);
    assert!(h.distributed.sets().is_empty());
}

#[tokio::test]
async fn test_update_without_request_tier_is_noop() {
    let h = profile_harness(CachePolicy::new(1).with_request(false));
    let ctx = CallContext::new();
    h.function
        .update(&ctx, user(16), profile(16))
        .await
        .unwrap();
    assert!(ctx.request().is_empty());
}

// ============================================================================
// CONCURRENCY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_callers_compute_once() {
    let h = profile_harness(CachePolicy::new(1));
    let function = Arc::new(h.function);

    let mut tasks = Vec::new();
    for _ in 0..16 {
        let function = Arc::clone(&function);
        tasks.push(tokio::spawn(async move {
            let ctx = CallContext::new();
            function.call(&ctx, user(21)).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), profile(21));
    }

    assert_eq!(h.computed.count(), 1);
    assert_eq!(function.stats().distributed_hits, 15);
}

/// `get_profile` whose computation invalidates and re-seeds its own key
/// through the caller's unit of work.
fn self_refreshing(ctx: &CallContext) -> Arc<CachedFunction<ProfileError>> {
    let cell: Arc<OnceCell<Arc<CachedFunction<ProfileError>>>> = Arc::new(OnceCell::new());
    let inner = Arc::clone(&cell);
    let unit = ctx.clone();

    let function = CachedFunction::builder(
        fixtures::lookup_metadata(),
        CachePolicy::new(1),
        fixtures::zoo_marshaller(),
    )
    .settings(fixtures::fast_settings())
    .lock_table(Arc::new(KeyLockTable::new()))
    .distributed(InstrumentedDistributedStore::new())
    .compute(move |args| {
        let cell = Arc::clone(&inner);
        let unit = unit.clone();
        async move {
            let user_id = args.get("user_id").and_then(Value::as_i64).unwrap_or_default();
            if let Some(this) = cell.get() {
                this.invalidate(&unit, user(user_id)).await.unwrap();
                this.update(&unit, user(user_id), profile(user_id)).await.unwrap();
            }
            Ok::<_, ProfileError>(profile(user_id))
        }
    })
    .build()
    .unwrap();

    let function = Arc::new(function);
    let _ = cell.set(Arc::clone(&function));
    function
}

#[tokio::test]
async fn test_computation_may_touch_its_own_key() {
    let ctx = CallContext::new();
    let function = self_refreshing(&ctx);

    let value = tokio::time::timeout(Duration::from_secs(1), function.call(&ctx, user(30)))
        .await
        .expect("call waited on its own key lock")
        .unwrap();
    assert_eq!(value, profile(30));

    let key = function.cache_key(user(30)).unwrap();
    assert!(!ctx.holds(key.as_str()));
    assert!(ctx.request().contains(key.as_str()));
}

#[tokio::test]
async fn test_other_units_of_work_still_wait() {
    let locks = Arc::new(KeyLockTable::new());
    let function = CachedFunction::builder(
        fixtures::lookup_metadata(),
        CachePolicy::new(1),
        fixtures::zoo_marshaller(),
    )
    .lock_table(Arc::clone(&locks))
    .compute(|_| async { Ok::<_, ProfileError>(profile(31)) })
    .build()
    .unwrap();

    let key = function.cache_key(user(31)).unwrap();
    let _held = locks.lock(key.as_str()).await.unwrap();
    let blocked = tokio::time::timeout(
        Duration::from_millis(50),
        function.invalidate(&CallContext::new(), user(31)),
    )
    .await;
    assert!(blocked.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_keys_compute_independently() {
    let h = profile_harness(CachePolicy::new(1));
    let function = Arc::new(h.function);

    let mut tasks = Vec::new();
    for id in 0..8i64 {
        let function = Arc::clone(&function);
        tasks.push(tokio::spawn(async move {
            function.call(&CallContext::new(), user(id)).await
        }));
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }
    assert_eq!(h.computed.count(), 8);
}

// ============================================================================
// RESULT SHAPES
// ============================================================================

#[tokio::test]
async fn test_sequence_results_are_materialized() {
    let metadata = FunctionMetadata::capture(
        FunctionSignature::new("countdown", "tests.sequences").param("n"),
        [("n", SemanticType::Integer)],
        SemanticType::list(SemanticType::Integer),
    )
    .unwrap();
    let distributed = InstrumentedDistributedStore::new();
    let countdown = CachedFunction::builder(metadata, CachePolicy::new(1), fixtures::zoo_marshaller())
        .lock_table(Arc::new(KeyLockTable::new()))
        .distributed(distributed.clone())
        .compute(|args| async move {
            let n = args.get("n").and_then(Value::as_i64).unwrap_or_default();
            Ok::<_, ProfileError>(Produced::sequence((1..=n).rev().map(Value::Integer)))
        })
        .build()
        .unwrap();

    let expected = Value::List(vec![Value::Integer(3), Value::Integer(2), Value::Integer(1)]);
    let first = countdown
        .call(&CallContext::new(), Arguments::new().arg(3i64))
        .await
        .unwrap();
    assert_eq!(first, expected);

    // replayed from the distributed tier
    let second = countdown
        .call(&CallContext::new(), Arguments::new().arg(3i64))
        .await
        .unwrap();
    assert_eq!(second, expected);
    assert_eq!(countdown.stats().computations, 1);
}

#[tokio::test]
async fn test_polymorphic_result_keeps_subtype() {
    let marshaller = fixtures::zoo_marshaller();
    let shelter = marshaller.clone();
    let adopt = CachedFunction::builder(
        fixtures::adopt_metadata(),
        CachePolicy::new(1),
        marshaller.clone(),
    )
    .lock_table(Arc::new(KeyLockTable::new()))
    .distributed(InstrumentedDistributedStore::new())
    .compute(move |args| {
        let shelter = shelter.clone();
        async move {
            let owner = args.get("owner").and_then(Value::as_str).unwrap_or_default();
            let pet = fixtures::cat(&shelter, "Tom", 7);
            Ok::<_, ProfileError>(Value::Object(fixtures::person(&shelter, owner, Some(pet))))
        }
    })
    .build()
    .unwrap();

    adopt
        .call(&CallContext::new(), Arguments::new().arg("ada"))
        .await
        .unwrap();
    let cached = adopt
        .call(&CallContext::new(), Arguments::new().arg("ada"))
        .await
        .unwrap();
    assert_eq!(adopt.stats().distributed_hits, 1);

    let person = cached.as_object().unwrap();
    let pet = person.peek("pet").and_then(Value::as_object).unwrap();
    assert_eq!(pet.type_name(), "Cat");
    assert_eq!(pet.peek("lives"), Some(&Value::Integer(7)));
    assert_eq!(
        cached,
        Value::Object(fixtures::person(
            &marshaller,
            "ada",
            Some(fixtures::cat(&marshaller, "Tom", 7))
        ))
    );
}

#[tokio::test]
async fn test_wrong_return_type_is_rejected() {
    let bad = CachedFunction::builder(
        fixtures::lookup_metadata(),
        CachePolicy::new(1),
        fixtures::zoo_marshaller(),
    )
    .lock_table(Arc::new(KeyLockTable::new()))
    .distributed(InstrumentedDistributedStore::new())
    .compute(|_| async { Ok::<_, ProfileError>(Value::Integer(1)) })
    .build()
    .unwrap();

    let err = bad.call(&CallContext::new(), user(1)).await.unwrap_err();
    assert!(matches!(err.cache_error(), Some(TieredError::Validation(_))));
}

// ============================================================================
// LMDB DURABLE TIER
// ============================================================================

#[tokio::test]
async fn test_lmdb_durable_tier_survives_distributed_loss() {
    let dir = TempDir::new().unwrap();
    let durable: Arc<LmdbDurableStore> = Arc::new(LmdbDurableStore::new(dir.path(), 16).unwrap());
    let computed = CallCounter::new();

    let build = |distributed: Arc<InstrumentedDistributedStore>| {
        let counter = computed.clone();
        CachedFunction::builder(
            fixtures::lookup_metadata(),
            CachePolicy::durable(1, "user profiles"),
            fixtures::zoo_marshaller(),
        )
        .lock_table(Arc::new(KeyLockTable::new()))
        .distributed(distributed)
        .durable(durable.clone())
        .compute(move |args| {
            let counter = counter.clone();
            async move {
                counter.bump();
                let user_id = args.get("user_id").and_then(Value::as_i64).unwrap_or_default();
                Ok::<_, ProfileError>(profile(user_id))
            }
        })
        .build()
        .unwrap()
    };

    let first = build(InstrumentedDistributedStore::new());
    first.call(&CallContext::new(), user(30)).await.unwrap();
    assert_eq!(durable.len().unwrap(), 1);

    // a cold distributed tier is refilled from LMDB
    let cold = InstrumentedDistributedStore::new();
    let second = build(cold.clone());
    assert_eq!(
        second.call(&CallContext::new(), user(30)).await.unwrap(),
        profile(30)
    );
    assert_eq!(computed.count(), 1);
    assert_eq!(second.stats().durable_hits, 1);
    assert_eq!(cold.sets().len(), 1);
}
