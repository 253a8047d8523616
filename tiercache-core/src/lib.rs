//! tiercache core
//!
//! Codecs, typed objects, marshalling, function metadata and cache keys.
//! Pure data and algorithms with no I/O; tier backends and the cache
//! coordinator live in `tiercache-storage`.

pub mod codec;
pub mod config;
pub mod error;
pub mod function;
pub mod identity;
pub mod marshal;
pub mod object;
pub mod schema;
pub mod types;
pub mod value;

pub use codec::{ByteReader, ByteWriter, Codec, CodecRegistry, DecodeFn, EncodeFn};
pub use config::{CachePolicy, CacheSettings};
pub use error::{ConfigError, DecodeError, TierError, TieredError, TieredResult, ValidationError};
pub use function::{
    Arguments, CacheKey, EffectiveArguments, FunctionMetadata, FunctionSignature, KeyDeriver,
    KeyFn, KeyStrategy,
};
pub use identity::{compute_content_hash, durable_key, new_unit_id};
pub use marshal::Marshaller;
pub use object::TypedObject;
pub use schema::{
    Discriminated, ObjectSchema, ObjectSchemaBuilder, OneOfGroup, Polymorphism, PropertyDef,
    PropertyDescriptor, SchemaRegistry,
};
pub use types::SemanticType;
pub use value::Value;

/// Timestamp type used for durable-entry creation times.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
