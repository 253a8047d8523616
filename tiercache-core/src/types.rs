//! Semantic types: the declared shape of a parameter, property or return value.

use std::fmt;
use std::sync::Arc;

use crate::schema::OneOfGroup;
use crate::value::Value;

/// Identifier for a value's shape.
///
/// Primitive variants have built-in codecs. `Object` names a type registered
/// in a [`SchemaRegistry`](crate::SchemaRegistry); `OneOf` carries the
/// polymorphic group it dispatches through.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SemanticType {
    Integer,
    Float,
    Boolean,
    Text,
    Bytes,
    /// JSON document.
    Mapping,
    Timestamp,
    /// Opaque reference into an external system, carried as text.
    Handle,
    Object(String),
    OneOf(Arc<OneOfGroup>),
    List(Box<SemanticType>),
    /// Any of the alternatives; checked in declaration order.
    Union(Vec<SemanticType>),
}

impl SemanticType {
    /// `List` of the given element type.
    pub fn list(element: SemanticType) -> Self {
        SemanticType::List(Box::new(element))
    }

    /// `Object` referencing a registered type by name.
    pub fn object(name: impl Into<String>) -> Self {
        SemanticType::Object(name.into())
    }

    /// Primitive types, all of which have built-in codecs.
    pub const PRIMITIVES: [SemanticType; 8] = [
        SemanticType::Integer,
        SemanticType::Float,
        SemanticType::Boolean,
        SemanticType::Text,
        SemanticType::Bytes,
        SemanticType::Mapping,
        SemanticType::Timestamp,
        SemanticType::Handle,
    ];

    pub fn is_primitive(&self) -> bool {
        !matches!(
            self,
            SemanticType::Object(_)
                | SemanticType::OneOf(_)
                | SemanticType::List(_)
                | SemanticType::Union(_)
        )
    }

    pub fn is_list(&self) -> bool {
        matches!(self, SemanticType::List(_))
    }

    /// Value types reject `None`.
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            SemanticType::Integer | SemanticType::Float | SemanticType::Boolean
        )
    }

    /// True when encoding this type needs the schema registry rather than a
    /// plain codec.
    pub fn is_composite(&self) -> bool {
        match self {
            SemanticType::Object(_) | SemanticType::OneOf(_) => true,
            SemanticType::List(inner) => inner.is_composite(),
            SemanticType::Union(alternatives) => alternatives.iter().any(Self::is_composite),
            _ => false,
        }
    }

    /// Whether `value` conforms to this type. `Missing` never conforms.
    pub fn conforms(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Missing) => false,
            (SemanticType::Union(alternatives), _) => {
                alternatives.iter().any(|alt| alt.conforms(value))
            }
            (ty, Value::Null) => !ty.is_value_type(),
            (SemanticType::Integer, Value::Integer(_)) => true,
            (SemanticType::Float, Value::Float(_)) => true,
            (SemanticType::Boolean, Value::Boolean(_)) => true,
            (SemanticType::Text, Value::Text(_)) => true,
            (SemanticType::Bytes, Value::Bytes(_)) => true,
            (SemanticType::Mapping, Value::Mapping(_)) => true,
            (SemanticType::Timestamp, Value::Timestamp(_)) => true,
            (SemanticType::Handle, Value::Handle(_)) => true,
            (SemanticType::Object(name), Value::Object(obj)) => obj.is_a(name),
            (SemanticType::OneOf(group), Value::Object(obj)) => group
                .resolve(obj)
                .map(|concrete| obj.is_a(concrete))
                .unwrap_or(false),
            (SemanticType::List(element), Value::List(items)) => {
                items.iter().all(|item| element.conforms(item))
            }
            _ => false,
        }
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemanticType::Integer => write!(f, "Integer"),
            SemanticType::Float => write!(f, "Float"),
            SemanticType::Boolean => write!(f, "Boolean"),
            SemanticType::Text => write!(f, "Text"),
            SemanticType::Bytes => write!(f, "Bytes"),
            SemanticType::Mapping => write!(f, "Mapping"),
            SemanticType::Timestamp => write!(f, "Timestamp"),
            SemanticType::Handle => write!(f, "Handle"),
            SemanticType::Object(name) => write!(f, "{}", name),
            SemanticType::OneOf(group) => write!(f, "OneOf<{}>", group.name()),
            SemanticType::List(element) => write!(f, "List<{}>", element),
            SemanticType::Union(alternatives) => {
                let names: Vec<String> = alternatives.iter().map(|a| a.to_string()).collect();
                write!(f, "{}", names.join(" | "))
            }
        }
    }
}
