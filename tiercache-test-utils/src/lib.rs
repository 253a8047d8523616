//! tiercache Test Utilities
//!
//! Centralized test infrastructure for the tiercache workspace:
//! - Instrumented and faulty tier stores
//! - Proptest generators for values and arguments
//! - Schema fixtures (a small zoo with a polymorphic group)
//! - Custom assertions for tiercache errors

pub use tiercache_core::{
    Arguments, CachePolicy, CacheSettings, CodecRegistry, ConfigError, DecodeError,
    FunctionMetadata, FunctionSignature, Marshaller, ObjectSchema, OneOfGroup, PropertyDef,
    SchemaRegistry, SemanticType, TierError, TieredError, TieredResult, Timestamp, TypedObject,
    ValidationError, Value,
};
pub use tiercache_storage::{
    CallContext, DistributedStore, DurableRecord, DurableStore, InMemoryDistributedStore,
    InMemoryDurableStore,
};

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

// ============================================================================
// INSTRUMENTED STORES
// ============================================================================

/// A `set` observed by [`InstrumentedDistributedStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSet {
    pub key: String,
    pub value: Vec<u8>,
    pub ttl: Duration,
}

/// Distributed store that records every call and can inject failures.
///
/// Deletes report a transient failure (`Ok(false)`) while the failure budget
/// set with [`fail_deletes`](Self::fail_deletes) lasts. Gets fail with
/// [`TierError::Unavailable`] while [`fail_gets`](Self::fail_gets) is on.
#[derive(Debug, Default)]
pub struct InstrumentedDistributedStore {
    inner: InMemoryDistributedStore,
    sets: Mutex<Vec<RecordedSet>>,
    gets: AtomicUsize,
    deletes: AtomicUsize,
    failing_deletes: AtomicU32,
    failing_gets: Mutex<bool>,
}

impl InstrumentedDistributedStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The next `n` deletes report a transient failure.
    pub fn fail_deletes(&self, n: u32) {
        self.failing_deletes.store(n, Ordering::SeqCst);
    }

    pub fn fail_gets(&self, failing: bool) {
        if let Ok(mut flag) = self.failing_gets.lock() {
            *flag = failing;
        }
    }

    pub fn sets(&self) -> Vec<RecordedSet> {
        self.sets.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    /// The in-memory store behind the instrumentation.
    pub fn inner(&self) -> &InMemoryDistributedStore {
        &self.inner
    }
}

#[async_trait]
impl DistributedStore for InstrumentedDistributedStore {
    async fn get(&self, key: &str) -> TieredResult<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.failing_gets.lock().map(|f| *f).unwrap_or(false) {
            return Err(TierError::Unavailable {
                tier: "distributed".to_string(),
                reason: "injected failure".to_string(),
            }
            .into());
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Duration) -> TieredResult<()> {
        if let Ok(mut sets) = self.sets.lock() {
            sets.push(RecordedSet {
                key: key.to_string(),
                value: value.clone(),
                ttl,
            });
        }
        self.inner.set(key, value, ttl).await
    }

    async fn delete(&self, key: &str) -> TieredResult<bool> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        let budget = self.failing_deletes.load(Ordering::SeqCst);
        if budget > 0 {
            self.failing_deletes.store(budget - 1, Ordering::SeqCst);
            return Ok(false);
        }
        self.inner.delete(key).await
    }
}

/// Durable store that counts calls.
///
/// With [`fail_get_decode`](Self::fail_get_decode) set, reads fail the way a
/// backend does when a stored record cannot be deserialized.
#[derive(Debug, Default)]
pub struct InstrumentedDurableStore {
    inner: InMemoryDurableStore,
    gets: AtomicUsize,
    puts: AtomicUsize,
    deletes: AtomicUsize,
    undecodable: AtomicBool,
}

impl InstrumentedDurableStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub fn delete_count(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    pub fn fail_get_decode(&self, failing: bool) {
        self.undecodable.store(failing, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &InMemoryDurableStore {
        &self.inner
    }
}

#[async_trait]
impl DurableStore for InstrumentedDurableStore {
    async fn get(&self, key: &str) -> TieredResult<Option<DurableRecord>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.undecodable.load(Ordering::SeqCst) {
            return Err(DecodeError::UnexpectedEof {
                needed: 8,
                remaining: 3,
            }
            .into());
        }
        self.inner.get(key).await
    }

    async fn put(&self, key: &str, record: DurableRecord) -> TieredResult<()> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        self.inner.put(key, record).await
    }

    async fn delete(&self, key: &str) -> TieredResult<()> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.inner.delete(key).await
    }
}

/// Counts executions of a wrapped computation.
#[derive(Debug, Clone, Default)]
pub struct CallCounter(Arc<AtomicUsize>);

impl CallCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one execution and return the new count.
    pub fn bump(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for values, types and arguments.

    use super::*;
    use proptest::prelude::*;

    /// Generate a Timestamp with sub-second precision.
    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        // 1970-2100
        (0i64..4_102_444_800i64, 0u32..1_000_000_000u32).prop_map(|(secs, nanos)| {
            chrono::DateTime::from_timestamp(secs, nanos).unwrap_or_default()
        })
    }

    /// Generate a JSON document for mapping values.
    pub fn arb_mapping() -> impl Strategy<Value = serde_json::Value> {
        prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..5).prop_map(|entries| {
            serde_json::Value::Object(
                entries
                    .into_iter()
                    .map(|(k, v)| (k, serde_json::Value::from(v)))
                    .collect(),
            )
        })
    }

    /// Generate a primitive type together with a conforming value.
    pub fn arb_primitive() -> impl Strategy<Value = (SemanticType, Value)> {
        prop_oneof![
            any::<i64>().prop_map(|i| (SemanticType::Integer, Value::Integer(i))),
            any::<f64>()
                .prop_filter("NaN never equals itself", |f| !f.is_nan())
                .prop_map(|f| (SemanticType::Float, Value::Float(f))),
            any::<bool>().prop_map(|b| (SemanticType::Boolean, Value::Boolean(b))),
            ".{0,32}".prop_map(|s| (SemanticType::Text, Value::Text(s))),
            prop::collection::vec(any::<u8>(), 0..64)
                .prop_map(|b| (SemanticType::Bytes, Value::Bytes(b))),
            arb_mapping().prop_map(|m| (SemanticType::Mapping, Value::Mapping(m))),
            arb_timestamp().prop_map(|t| (SemanticType::Timestamp, Value::Timestamp(t))),
            "[a-zA-Z0-9-]{1,24}".prop_map(|h| (SemanticType::Handle, Value::Handle(h))),
        ]
    }

    /// Generate a primitive or list-of-primitive type with a conforming value.
    pub fn arb_typed_value() -> impl Strategy<Value = (SemanticType, Value)> {
        prop_oneof![
            3 => arb_primitive(),
            1 => prop::collection::vec(any::<i64>(), 0..8).prop_map(|items| {
                (
                    SemanticType::list(SemanticType::Integer),
                    Value::List(items.into_iter().map(Value::Integer).collect()),
                )
            }),
            1 => prop::collection::vec(".{0,8}", 0..8).prop_map(|items| {
                (
                    SemanticType::list(SemanticType::Text),
                    Value::List(items.into_iter().map(Value::Text).collect()),
                )
            }),
        ]
    }

    /// Generate arguments for [`fixtures::lookup_metadata`].
    pub fn arb_lookup_args() -> impl Strategy<Value = (i64, bool, Vec<String>)> {
        (
            any::<i64>(),
            any::<bool>(),
            prop::collection::vec("[a-z]{1,6}", 0..4),
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built schemas, metadata and values for common scenarios.

    use super::*;

    /// Animal, Dog and Cat with the `animal` one-of group on `kind`, and a
    /// Person that may own a pet.
    pub fn zoo_schemas() -> SchemaRegistry {
        let mut registry = SchemaRegistry::new();
        registry
            .define_object(
                ObjectSchema::builder("Animal")
                    .property(PropertyDef::new("kind", SemanticType::Text))
                    .property(PropertyDef::new("name", SemanticType::Text)),
            )
            .expect("define Animal");
        registry
            .define_object(
                ObjectSchema::builder("Dog")
                    .extends("Animal")
                    .property(PropertyDef::new("good", SemanticType::Boolean).with_default(true)),
            )
            .expect("define Dog");
        registry
            .define_object(
                ObjectSchema::builder("Cat")
                    .extends("Animal")
                    .property(PropertyDef::new("lives", SemanticType::Integer).with_default(9i64)),
            )
            .expect("define Cat");
        let animal = registry
            .define_group(
                OneOfGroup::new("animal", "kind")
                    .variant("dog", "Dog")
                    .variant("cat", "Cat"),
            )
            .expect("define animal group");
        registry
            .define_object(
                ObjectSchema::builder("Person")
                    .property(PropertyDef::new("name", SemanticType::Text))
                    .property(PropertyDef::new("age", SemanticType::Integer).with_required(false))
                    .property(PropertyDef::new(
                        "nicknames",
                        SemanticType::list(SemanticType::Text),
                    ))
                    .property(
                        PropertyDef::new("pet", SemanticType::OneOf(animal)).with_default(Value::Null),
                    ),
            )
            .expect("define Person");
        registry
    }

    /// Marshaller over [`zoo_schemas`] and the built-in codecs.
    pub fn zoo_marshaller() -> Marshaller {
        Marshaller::new(
            Arc::new(zoo_schemas()),
            Arc::new(CodecRegistry::with_builtins()),
        )
    }

    pub fn dog(marshaller: &Marshaller, name: &str) -> TypedObject {
        marshaller
            .schemas()
            .instantiate("Dog")
            .and_then(|d| d.with("kind", "dog"))
            .and_then(|d| d.with("name", name))
            .expect("build Dog")
    }

    pub fn cat(marshaller: &Marshaller, name: &str, lives: i64) -> TypedObject {
        marshaller
            .schemas()
            .instantiate("Cat")
            .and_then(|c| c.with("kind", "cat"))
            .and_then(|c| c.with("name", name))
            .and_then(|c| c.with("lives", lives))
            .expect("build Cat")
    }

    pub fn person(marshaller: &Marshaller, name: &str, pet: Option<TypedObject>) -> TypedObject {
        let mut person = marshaller
            .schemas()
            .instantiate("Person")
            .and_then(|p| p.with("name", name))
            .expect("build Person");
        if let Some(pet) = pet {
            person.set("pet", pet).expect("set pet");
        }
        person
    }

    /// `get_profile(user_id, include_history=False, tags=[]) -> Mapping`
    pub fn lookup_metadata() -> FunctionMetadata {
        FunctionMetadata::capture(
            FunctionSignature::new("get_profile", "accounts.profiles")
                .param("user_id")
                .param_default("include_history", false)
                .param_default("tags", Value::List(vec![])),
            [
                ("user_id", SemanticType::Integer),
                ("include_history", SemanticType::Boolean),
                ("tags", SemanticType::list(SemanticType::Text)),
            ],
            SemanticType::Mapping,
        )
        .expect("capture get_profile")
    }

    /// `adopt(owner) -> Person`, returning an object graph.
    pub fn adopt_metadata() -> FunctionMetadata {
        FunctionMetadata::capture(
            FunctionSignature::new("adopt", "zoo.shelter").param("owner"),
            [("owner", SemanticType::Text)],
            SemanticType::object("Person"),
        )
        .expect("capture adopt")
    }

    /// Settings with millisecond backoff so retry tests stay fast.
    pub fn fast_settings() -> CacheSettings {
        CacheSettings::default().with_invalidate_backoff(Duration::from_millis(1))
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for tiercache error categories.

    use super::*;

    /// Assert that a TieredResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &TieredResult<T>) {
        match result {
            Err(TieredError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that a TieredResult is a Validation error.
    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TieredResult<T>) {
        match result {
            Err(TieredError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert that a TieredResult is a Decode error.
    #[track_caller]
    pub fn assert_decode_error<T: std::fmt::Debug>(result: &TieredResult<T>) {
        match result {
            Err(TieredError::Decode(_)) => {}
            other => panic!("Expected Decode error, got: {:?}", other),
        }
    }

    /// Assert that a TieredResult failed invalidation after `attempts`.
    #[track_caller]
    pub fn assert_invalidation_failed<T: std::fmt::Debug>(result: &TieredResult<T>, attempts: u32) {
        match result {
            Err(TieredError::Tier(TierError::InvalidationFailed { attempts: a, .. })) => {
                assert_eq!(*a, attempts, "Wrong attempt count");
            }
            other => panic!("Expected InvalidationFailed, got: {:?}", other),
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
