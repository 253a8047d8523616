//! Error types for tiercache operations

use thiserror::Error;

/// Configuration errors, raised when a type, property, function or cache
/// policy is declared. Never retried.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No cache tier enabled for {function}: enable request, distributed or durable caching")]
    NoTierEnabled { function: String },

    #[error("Incompatible options: {option_a} and {option_b}")]
    IncompatibleOptions { option_a: String, option_b: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Invalid property {type_name}.{property}: {reason}")]
    InvalidProperty {
        type_name: String,
        property: String,
        reason: String,
    },

    #[error("{kind} '{name}' is already defined")]
    DuplicateDefinition { kind: String, name: String },

    #[error("Unknown type: {name}")]
    UnknownType { name: String },

    #[error("No codec registered for {ty}")]
    UnregisteredCodec { ty: String },

    #[error("{function}: signature declares {expected:?} but types were supplied for {actual:?}")]
    ArgumentTypeMismatch {
        function: String,
        expected: Vec<String>,
        actual: Vec<String>,
    },

    #[error("{function}: no type information supplied for {names:?}")]
    MissingArgumentType { function: String, names: Vec<String> },

    #[error("Invalid signature for {function}: {reason}")]
    InvalidSignature { function: String, reason: String },

    #[error("Missing store for the {tier} tier of {function}")]
    MissingStore { tier: String, function: String },
}

/// Validation errors: a value does not match its declared type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Expected {expected} for '{field}' and got {got}")]
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },

    #[error("Not all items of '{field}' are {expected}: item at index {index} is {got}")]
    ListItemMismatch {
        field: String,
        expected: String,
        index: usize,
        got: String,
    },

    #[error("Property '{field}' is required and cannot be None")]
    RequiredProperty { field: String },

    #[error("{type_name} has no property '{property}'")]
    UnknownProperty { type_name: String, property: String },

    #[error("{name} is a required argument in function {function}")]
    MissingArgument { name: String, function: String },

    #[error("Unknown argument(s) {names:?} supplied to {function}")]
    UnknownArgument { function: String, names: Vec<String> },

    #[error("{function}() got multiple values for argument '{name}'")]
    DuplicateArgument { function: String, name: String },

    #[error("{function}() takes {expected} arguments ({given} given)")]
    TooManyArguments {
        function: String,
        expected: usize,
        given: usize,
    },

    #[error("{type_name} instance has no or empty attribute '{attribute}'")]
    MissingDiscriminator { type_name: String, attribute: String },

    #[error("'{value}' not found in {group}, known values: {known:?}")]
    UnknownDiscriminator {
        group: String,
        value: String,
        known: Vec<String>,
    },
}

/// Decode errors: malformed or truncated byte streams.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Unexpected end of stream: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    #[error("Declared length {declared} exceeds the {remaining} remaining bytes")]
    LengthOverflow { declared: usize, remaining: usize },

    #[error("Invalid marker byte 0x{marker:02x}")]
    InvalidMarker { marker: u8 },

    #[error("Invalid UTF-8 in text payload")]
    InvalidUtf8,

    #[error("Invalid JSON payload: {reason}")]
    InvalidJson { reason: String },

    #[error("Invalid timestamp {secs}s + {nanos}ns")]
    InvalidTimestamp { secs: i64, nanos: u32 },

    #[error("Encoded type {name} is not registered")]
    UnknownType { name: String },

    #[error("Encoded {got} is not an instance of {expected}")]
    UnexpectedType { expected: String, got: String },

    #[error("Union alternative {index} out of range for {ty}")]
    InvalidAlternative { index: u8, ty: String },

    #[error("Nesting deeper than {limit} levels")]
    DepthExceeded { limit: usize },

    #[error("Encoded {type_name}.{field} is invalid: {reason}")]
    InvalidField {
        type_name: String,
        field: String,
        reason: String,
    },
}

/// Tier I/O errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TierError {
    #[error("{tier} tier unavailable: {reason}")]
    Unavailable { tier: String, reason: String },

    #[error("{tier} tier operation failed: {reason}")]
    Backend { tier: String, reason: String },

    #[error("Could not invalidate {key} in the distributed tier after {attempts} attempts")]
    InvalidationFailed { key: String, attempts: u32 },

    #[error("Cache lock poisoned")]
    LockPoisoned,
}

/// Master error type for all tiercache errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TieredError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Tier error: {0}")]
    Tier(#[from] TierError),
}

impl TieredError {
    /// True for malformed-stream failures, which the coordinator treats as a
    /// miss for the tier that produced them.
    pub fn is_decode(&self) -> bool {
        matches!(self, TieredError::Decode(_))
    }
}

/// Result type alias for tiercache operations.
pub type TieredResult<T> = Result<T, TieredError>;

// =============================================================================
// TESTS
// =============================================================================
