//! Typed object instances.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{TieredResult, ValidationError};
use crate::schema::{ObjectSchema, PropertyDescriptor};
use crate::value::Value;

/// An instance of a registered object type.
///
/// Every write is validated against the property's descriptor before it is
/// stored. Equality compares the type name and the stored fields.
#[derive(Debug, Clone)]
pub struct TypedObject {
    schema: Arc<ObjectSchema>,
    fields: BTreeMap<String, Value>,
}

impl PartialEq for TypedObject {
    fn eq(&self, other: &Self) -> bool {
        self.schema.name() == other.schema.name() && self.fields == other.fields
    }
}

impl TypedObject {
    pub fn new(schema: Arc<ObjectSchema>) -> Self {
        Self {
            schema,
            fields: BTreeMap::new(),
        }
    }

    pub fn schema(&self) -> &Arc<ObjectSchema> {
        &self.schema
    }

    pub fn type_name(&self) -> &str {
        self.schema.name()
    }

    pub fn is_a(&self, type_name: &str) -> bool {
        self.schema.is_a(type_name)
    }

    /// Read a property.
    ///
    /// An unset list property is initialised to an empty list as a side
    /// effect. Other unset properties return their default, or `Missing`.
    pub fn get(&mut self, name: &str) -> TieredResult<Value> {
        let schema = Arc::clone(&self.schema);
        let descriptor = descriptor(&schema, name)?;
        if let Some(value) = self.fields.get(name) {
            return Ok(value.clone());
        }
        if descriptor.is_list() {
            self.fields.insert(name.to_string(), Value::List(Vec::new()));
            return Ok(Value::List(Vec::new()));
        }
        Ok(descriptor.default().cloned().unwrap_or(Value::Missing))
    }

    /// Stored value only, without defaults or side effects.
    pub fn peek(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// What [`get`](Self::get) would return, without initialising lists.
    pub fn value_or_default(&self, name: &str) -> Value {
        if let Some(value) = self.fields.get(name) {
            return value.clone();
        }
        match self.schema.property(name) {
            Some(d) if d.is_list() => Value::List(Vec::new()),
            Some(d) => d.default().cloned().unwrap_or(Value::Missing),
            None => Value::Missing,
        }
    }

    /// Validate and store a property. `Missing` unsets it.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> TieredResult<()> {
        let value = value.into();
        let schema = Arc::clone(&self.schema);
        let descriptor = descriptor(&schema, name)?;
        if value.is_missing() {
            self.fields.remove(name);
            return Ok(());
        }
        self.check(descriptor, &value)?;
        self.fields.insert(name.to_string(), value);
        Ok(())
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> TieredResult<Self> {
        self.set(name, value)?;
        Ok(self)
    }

    /// Stored fields in name order.
    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v))
    }

    fn check(&self, descriptor: &PropertyDescriptor, value: &Value) -> TieredResult<()> {
        let field = descriptor.name();
        if value.is_null() {
            if descriptor.is_required() || descriptor.is_list() {
                return Err(ValidationError::RequiredProperty {
                    field: field.to_string(),
                }
                .into());
            }
            if descriptor.ty().is_value_type() {
                return Err(mismatch(field, &descriptor.ty().to_string(), value));
            }
            return Ok(());
        }

        if descriptor.is_list() {
            let items = match value {
                Value::List(items) => items,
                other => {
                    return Err(mismatch(
                        field,
                        &descriptor.effective_type().to_string(),
                        other,
                    ))
                }
            };
            if let Some((index, item)) = items
                .iter()
                .enumerate()
                .find(|(_, item)| !descriptor.ty().conforms(item))
            {
                return Err(ValidationError::ListItemMismatch {
                    field: field.to_string(),
                    expected: descriptor.ty().to_string(),
                    index,
                    got: item.type_label(),
                }
                .into());
            }
            return Ok(());
        }

        if !descriptor.ty().conforms(value) {
            return Err(mismatch(field, &descriptor.ty().to_string(), value));
        }

        if let (Some(poly), Value::Object(obj)) = (descriptor.polymorphism(), value) {
            let concrete = poly.resolve(self)?;
            if !obj.is_a(concrete) {
                return Err(mismatch(field, concrete, value));
            }
        }
        Ok(())
    }
}

fn descriptor<'s>(schema: &'s ObjectSchema, name: &str) -> TieredResult<&'s PropertyDescriptor> {
    schema.property(name).ok_or_else(|| {
        ValidationError::UnknownProperty {
            type_name: schema.name().to_string(),
            property: name.to_string(),
        }
        .into()
    })
}

fn mismatch(field: &str, expected: &str, value: &Value) -> crate::TieredError {
    ValidationError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: value.type_label(),
    }
    .into()
}
