//! Function metadata, argument binding and cache key derivation.
//!
//! Metadata is captured once, when a cacheable operation is registered, and
//! is immutable afterwards. The canonical key of a call is
//!
//! ```text
//! "v{version}." + base64(identity ++ encode(arg_1) ++ ... ++ encode(arg_n))
//! ```
//!
//! with arguments in parameter-name order and defaults filled in, so calls
//! with the same effective arguments always derive the same key.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::codec::ByteWriter;
use crate::error::{ConfigError, TieredResult, ValidationError};
use crate::identity;
use crate::marshal::Marshaller;
use crate::types::SemanticType;
use crate::value::Value;

static PARAMETER_NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("Invalid parameter regex"));

// =============================================================================
// SIGNATURE
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
struct Parameter {
    name: String,
    default: Option<Value>,
}

/// Declaration of a cacheable callable, supplied at registration time.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    name: String,
    module: String,
    params: Vec<Parameter>,
    identity: Option<String>,
}

impl FunctionSignature {
    pub fn new(name: impl Into<String>, module: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            module: module.into(),
            params: Vec::new(),
            identity: None,
        }
    }

    /// Parameter without a default.
    pub fn param(mut self, name: impl Into<String>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: None,
        });
        self
    }

    /// Parameter with a default value.
    pub fn param_default(mut self, name: impl Into<String>, default: impl Into<Value>) -> Self {
        self.params.push(Parameter {
            name: name.into(),
            default: Some(default.into()),
        });
        self
    }

    /// Override the base identity used in cache keys.
    pub fn identity(mut self, identity: impl Into<String>) -> Self {
        self.identity = Some(identity.into());
        self
    }

    /// `"{name}.{module}"` unless overridden.
    pub fn base_identity(&self) -> String {
        self.identity
            .clone()
            .unwrap_or_else(|| format!("{}.{}", self.name, self.module))
    }
}

// =============================================================================
// METADATA
// =============================================================================

/// Immutable metadata of a cacheable function.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionMetadata {
    name: String,
    base_identity: String,
    parameters: Vec<String>,
    types: BTreeMap<String, SemanticType>,
    defaults: BTreeMap<String, Value>,
    return_type: SemanticType,
}

impl FunctionMetadata {
    /// Capture metadata from a signature and the declared argument and return
    /// types. Fails when the declarations do not line up.
    pub fn capture<N>(
        signature: FunctionSignature,
        argument_types: impl IntoIterator<Item = (N, SemanticType)>,
        return_type: SemanticType,
    ) -> TieredResult<Self>
    where
        N: Into<String>,
    {
        let name = signature.name.clone();
        let invalid = |reason: String| ConfigError::InvalidSignature {
            function: name.clone(),
            reason,
        };

        let mut seen = BTreeSet::new();
        let mut seen_default = false;
        for param in &signature.params {
            if !PARAMETER_NAME.is_match(&param.name) {
                return Err(invalid(format!("'{}' is not a valid parameter name", param.name)).into());
            }
            if !seen.insert(param.name.as_str()) {
                return Err(invalid(format!("duplicate parameter '{}'", param.name)).into());
            }
            match (&param.default, seen_default) {
                (Some(_), _) => seen_default = true,
                (None, true) => {
                    return Err(invalid(format!(
                        "parameter '{}' without default follows a parameter with default",
                        param.name
                    ))
                    .into())
                }
                (None, false) => {}
            }
        }

        let mut types = BTreeMap::new();
        let mut declared = Vec::new();
        for (param, ty) in argument_types {
            let param = param.into();
            declared.push(param.clone());
            if types.insert(param.clone(), ty).is_some() {
                return Err(invalid(format!("type declared twice for '{}'", param)).into());
            }
        }

        let parameters: Vec<String> = signature.params.iter().map(|p| p.name.clone()).collect();
        if declared.len() != parameters.len() {
            return Err(ConfigError::ArgumentTypeMismatch {
                function: name.clone(),
                expected: parameters,
                actual: declared,
            }
            .into());
        }
        let untyped: Vec<String> = parameters
            .iter()
            .filter(|p| !types.contains_key(*p))
            .cloned()
            .collect();
        if !untyped.is_empty() {
            return Err(ConfigError::MissingArgumentType {
                function: name.clone(),
                names: untyped,
            }
            .into());
        }

        let mut defaults = BTreeMap::new();
        for param in &signature.params {
            if let Some(default) = &param.default {
                let ty = &types[&param.name];
                if !ty.conforms(default) {
                    return Err(invalid(format!(
                        "default for '{}' is {}, expected {}",
                        param.name,
                        default.type_label(),
                        ty
                    ))
                    .into());
                }
                defaults.insert(param.name.clone(), default.clone());
            }
        }

        Ok(Self {
            base_identity: signature.base_identity(),
            name,
            parameters,
            types,
            defaults,
            return_type,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn base_identity(&self) -> &str {
        &self.base_identity
    }

    /// Parameter names in declaration order.
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn parameter_type(&self, name: &str) -> Option<&SemanticType> {
        self.types.get(name)
    }

    pub fn defaults(&self) -> &BTreeMap<String, Value> {
        &self.defaults
    }

    pub fn return_type(&self) -> &SemanticType {
        &self.return_type
    }

    /// Bind call arguments to parameters, fill defaults and type-check every
    /// effective value.
    pub fn bind(&self, args: Arguments) -> TieredResult<EffectiveArguments> {
        if args.positional.len() > self.parameters.len() {
            return Err(ValidationError::TooManyArguments {
                function: self.name.clone(),
                expected: self.parameters.len(),
                given: args.positional.len(),
            }
            .into());
        }

        let mut supplied: BTreeMap<String, Value> = self
            .parameters
            .iter()
            .cloned()
            .zip(args.positional)
            .collect();

        let mut unknown = Vec::new();
        for (name, value) in args.named {
            if !self.types.contains_key(&name) {
                unknown.push(name);
                continue;
            }
            if supplied.contains_key(&name) {
                return Err(ValidationError::DuplicateArgument {
                    function: self.name.clone(),
                    name,
                }
                .into());
            }
            supplied.insert(name, value);
        }
        if !unknown.is_empty() {
            return Err(ValidationError::UnknownArgument {
                function: self.name.clone(),
                names: unknown,
            }
            .into());
        }

        let mut effective = BTreeMap::new();
        for (name, ty) in &self.types {
            let value = match supplied.remove(name) {
                Some(value) if !value.is_missing() => value,
                _ => match self.defaults.get(name) {
                    Some(default) => default.clone(),
                    None => {
                        return Err(ValidationError::MissingArgument {
                            name: name.clone(),
                            function: self.name.clone(),
                        }
                        .into())
                    }
                },
            };
            check_value(name, ty, &value)?;
            effective.insert(name.clone(), value);
        }
        Ok(EffectiveArguments(effective))
    }

    /// Check a produced value against the declared return type.
    pub fn check_return(&self, value: &Value) -> TieredResult<()> {
        check_value(&format!("Result of {}", self.name), &self.return_type, value)
    }
}

fn check_value(field: &str, ty: &SemanticType, value: &Value) -> TieredResult<()> {
    if let (SemanticType::List(element), Value::List(items)) = (ty, value) {
        if let Some((index, item)) = items.iter().enumerate().find(|(_, v)| !element.conforms(v)) {
            return Err(ValidationError::ListItemMismatch {
                field: field.to_string(),
                expected: element.to_string(),
                index,
                got: item.type_label(),
            }
            .into());
        }
        return Ok(());
    }
    if ty.conforms(value) {
        Ok(())
    } else {
        Err(ValidationError::TypeMismatch {
            field: field.to_string(),
            expected: ty.to_string(),
            got: value.type_label(),
        }
        .into())
    }
}

// =============================================================================
// ARGUMENTS
// =============================================================================

/// Arguments of one call, positional and named.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Arguments {
    positional: Vec<Value>,
    named: Vec<(String, Value)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.positional.push(value.into());
        self
    }

    pub fn kwarg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.named.push((name.into(), value.into()));
        self
    }
}

/// Effective value of every parameter, in name order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EffectiveArguments(BTreeMap<String, Value>);

impl EffectiveArguments {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

// =============================================================================
// KEYS
// =============================================================================

/// Function from effective arguments to the bytes that stand in for the
/// canonical argument encoding.
pub type KeyFn = Arc<dyn Fn(&EffectiveArguments) -> TieredResult<Vec<u8>> + Send + Sync>;

#[derive(Clone, Default)]
pub enum KeyStrategy {
    #[default]
    Canonical,
    Custom(KeyFn),
}

impl fmt::Debug for KeyStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyStrategy::Canonical => write!(f, "Canonical"),
            KeyStrategy::Custom(_) => write!(f, "Custom"),
        }
    }
}

impl KeyStrategy {
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&EffectiveArguments) -> TieredResult<Vec<u8>> + Send + Sync + 'static,
    {
        KeyStrategy::Custom(Arc::new(f))
    }
}

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    key: String,
    version: u32,
}

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.key
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Key in the durable tier.
    pub fn durable_key(&self) -> String {
        identity::durable_key(self.version, &self.key)
    }

    /// Key shortened for log lines.
    pub fn truncated(&self, limit: usize) -> String {
        match self.key.get(..limit) {
            Some(prefix) if self.key.len() > limit => {
                format!("{}...(length={})", prefix, self.key.len())
            }
            _ => self.key.clone(),
        }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key)
    }
}

/// Derives versioned cache keys for one function.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    metadata: Arc<FunctionMetadata>,
    version: u32,
    strategy: KeyStrategy,
    marshaller: Marshaller,
}

impl KeyDeriver {
    pub fn new(
        metadata: Arc<FunctionMetadata>,
        version: u32,
        strategy: KeyStrategy,
        marshaller: Marshaller,
    ) -> Self {
        Self {
            metadata,
            version,
            strategy,
            marshaller,
        }
    }

    pub fn metadata(&self) -> &Arc<FunctionMetadata> {
        &self.metadata
    }

    /// Identity followed by each argument's encoding, in parameter-name order.
    pub fn canonical_bytes(&self, args: &EffectiveArguments) -> TieredResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        w.write_raw(self.metadata.base_identity().as_bytes());
        for (name, value) in args.iter() {
            let ty = self.metadata.parameter_type(name).ok_or_else(|| {
                ValidationError::UnknownArgument {
                    function: self.metadata.name().to_string(),
                    names: vec![name.to_string()],
                }
            })?;
            self.marshaller.encode(&mut w, ty, value)?;
        }
        Ok(w.into_inner())
    }

    pub fn derive(&self, args: &EffectiveArguments) -> TieredResult<CacheKey> {
        let bytes = match &self.strategy {
            KeyStrategy::Canonical => self.canonical_bytes(args)?,
            KeyStrategy::Custom(f) => f(args)?,
        };
        Ok(CacheKey {
            key: format!("v{}.{}", self.version, STANDARD.encode(bytes)),
            version: self.version,
        })
    }

    /// Bind and derive in one step.
    pub fn derive_for(&self, args: Arguments) -> TieredResult<CacheKey> {
        let effective = self.metadata.bind(args)?;
        self.derive(&effective)
    }
}

// =============================================================================
// TESTS
// =============================================================================
