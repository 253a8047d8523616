//! Value marshaller: walks typed object graphs in both directions.
//!
//! Two forms are supported:
//! - the document form (`serde_json::Value`), used at API boundaries;
//! - the binary form, used for cache payloads. Objects are written as
//!
//! ```text
//! [presence][name len: u32 LE][concrete type name]([state: 0|1][property])*
//! ```
//!
//! with properties in name order, so the runtime subtype survives a round
//! trip. Primitive types delegate to the [`CodecRegistry`].

use std::collections::HashMap;
use std::sync::Arc;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Map, Value as Json};

use crate::codec::{write_presence, ByteReader, ByteWriter, CodecRegistry};
use crate::error::{DecodeError, TieredError, TieredResult, ValidationError};
use crate::object::TypedObject;
use crate::schema::{ObjectSchema, SchemaRegistry};
use crate::types::SemanticType;
use crate::value::Value;

const FIELD_UNSET: u8 = 0;
const FIELD_SET: u8 = 1;

/// Deepest object, list or union nesting the binary decoder accepts.
pub const MAX_DECODE_DEPTH: usize = 128;

/// Recursive encoder/decoder for typed values.
#[derive(Debug, Clone)]
pub struct Marshaller {
    schemas: Arc<SchemaRegistry>,
    codecs: Arc<CodecRegistry>,
}

impl Marshaller {
    pub fn new(schemas: Arc<SchemaRegistry>, codecs: Arc<CodecRegistry>) -> Self {
        Self { schemas, codecs }
    }

    /// Marshaller over an empty schema registry and the built-in codecs.
    pub fn primitives_only() -> Self {
        Self::new(
            Arc::new(SchemaRegistry::new()),
            Arc::new(CodecRegistry::with_builtins()),
        )
    }

    pub fn schemas(&self) -> &Arc<SchemaRegistry> {
        &self.schemas
    }

    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    // =========================================================================
    // DOCUMENT FORM
    // =========================================================================

    /// Convert a raw document into a typed value.
    ///
    /// Absent properties take their default when one is declared, otherwise
    /// `Missing`. Every assignment is validated.
    pub fn parse(&self, ty: &SemanticType, raw: &Json, is_list: bool) -> TieredResult<Value> {
        if is_list {
            self.parse_value("value", &SemanticType::list(ty.clone()), raw)
        } else {
            self.parse_value("value", ty, raw)
        }
    }

    /// Parse a document into an instance of a registered type.
    pub fn parse_object(&self, type_name: &str, raw: &Json) -> TieredResult<TypedObject> {
        let schema = self.schemas.object(type_name)?;
        self.parse_into(schema, raw)
    }

    /// Parse a list of documents into instances of a registered type.
    pub fn parse_list(&self, type_name: &str, raw: &Json) -> TieredResult<Vec<TypedObject>> {
        let items = raw
            .as_array()
            .ok_or_else(|| json_mismatch(type_name, &format!("List<{}>", type_name), raw))?;
        items
            .iter()
            .map(|item| self.parse_object(type_name, item))
            .collect()
    }

    fn parse_value(&self, field: &str, ty: &SemanticType, raw: &Json) -> TieredResult<Value> {
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let expected = || json_mismatch(field, &ty.to_string(), raw);
        match ty {
            SemanticType::Integer => raw.as_i64().map(Value::Integer).ok_or_else(expected),
            SemanticType::Float => raw.as_f64().map(Value::Float).ok_or_else(expected),
            SemanticType::Boolean => raw.as_bool().map(Value::Boolean).ok_or_else(expected),
            SemanticType::Text => raw
                .as_str()
                .map(|s| Value::Text(s.to_string()))
                .ok_or_else(expected),
            SemanticType::Handle => raw
                .as_str()
                .map(|s| Value::Handle(s.to_string()))
                .ok_or_else(expected),
            SemanticType::Bytes => raw
                .as_str()
                .and_then(|s| STANDARD.decode(s).ok())
                .map(Value::Bytes)
                .ok_or_else(expected),
            SemanticType::Mapping => Ok(Value::Mapping(raw.clone())),
            SemanticType::Timestamp => parse_timestamp(raw).ok_or_else(expected),
            SemanticType::Object(name) => {
                let schema = self.schemas.object(name)?;
                Ok(Value::Object(self.parse_into(schema, raw)?))
            }
            SemanticType::OneOf(group) => {
                let schema = self.schemas.resolve_subtype(group, raw)?;
                Ok(Value::Object(self.parse_into(schema, raw)?))
            }
            SemanticType::List(element) => {
                let items = raw.as_array().ok_or_else(expected)?;
                items
                    .iter()
                    .map(|item| self.parse_value(field, element, item))
                    .collect::<TieredResult<Vec<_>>>()
                    .map(Value::List)
            }
            SemanticType::Union(alternatives) => alternatives
                .iter()
                .find_map(|alt| self.parse_value(field, alt, raw).ok())
                .ok_or_else(expected),
        }
    }

    fn parse_into(&self, schema: Arc<ObjectSchema>, raw: &Json) -> TieredResult<TypedObject> {
        let doc = raw
            .as_object()
            .ok_or_else(|| json_mismatch(schema.name(), schema.name(), raw))?;
        let mut instance = TypedObject::new(Arc::clone(&schema));

        // selectors are scalar, so they are set before any polymorphic property
        for name in schema.scalar_members() {
            let value = self.member_value(&schema, &instance, name, doc)?;
            instance.set(name, value)?;
        }
        for name in schema.composite_members() {
            let value = self.member_value(&schema, &instance, name, doc)?;
            instance.set(name, value)?;
        }
        Ok(instance)
    }

    fn member_value(
        &self,
        schema: &ObjectSchema,
        instance: &TypedObject,
        name: &str,
        doc: &Map<String, Json>,
    ) -> TieredResult<Value> {
        let Some(descriptor) = schema.property(name) else {
            return Ok(Value::Missing);
        };
        let Some(raw) = doc.get(name) else {
            return Ok(descriptor.default().cloned().unwrap_or(Value::Missing));
        };
        let ty = match descriptor.polymorphism() {
            Some(poly) if !raw.is_null() => SemanticType::object(poly.resolve(instance)?),
            _ => descriptor.effective_type(),
        };
        self.parse_value(name, &ty, raw)
    }

    /// Convert a typed value into a document. With `skip_missing`, unset
    /// properties are omitted instead of emitted as `null`.
    pub fn serialize(
        &self,
        value: &Value,
        ty: &SemanticType,
        is_list: bool,
        skip_missing: bool,
    ) -> TieredResult<Json> {
        if is_list {
            self.serialize_value(value, &SemanticType::list(ty.clone()), skip_missing)
        } else {
            self.serialize_value(value, ty, skip_missing)
        }
    }

    fn serialize_value(&self, value: &Value, ty: &SemanticType, skip_missing: bool) -> TieredResult<Json> {
        Ok(match value {
            Value::Missing | Value::Null => Json::Null,
            Value::Integer(i) => Json::from(*i),
            Value::Float(f) => Json::from(*f),
            Value::Boolean(b) => Json::Bool(*b),
            Value::Text(s) | Value::Handle(s) => Json::String(s.clone()),
            Value::Bytes(b) => Json::String(STANDARD.encode(b)),
            Value::Mapping(doc) => doc.clone(),
            Value::Timestamp(ts) => Json::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            Value::Object(obj) => Json::Object(self.serialize_object(obj, ty, skip_missing)?),
            Value::List(items) => {
                let element = list_element(ty).ok_or_else(|| value_mismatch(ty, value))?;
                Json::Array(
                    items
                        .iter()
                        .map(|item| self.serialize_value(item, element, skip_missing))
                        .collect::<TieredResult<Vec<_>>>()?,
                )
            }
        })
    }

    fn serialize_object(
        &self,
        obj: &TypedObject,
        declared: &SemanticType,
        skip_missing: bool,
    ) -> TieredResult<Map<String, Json>> {
        // a one-of declaration resolves through its group; anything else uses
        // the instance's own runtime type
        let schema = match declared {
            SemanticType::OneOf(group) => self.schemas.resolve_subtype(group, obj)?,
            _ => Arc::clone(obj.schema()),
        };
        let mut out = Map::new();
        for descriptor in schema.properties() {
            let value = obj.value_or_default(descriptor.name());
            if skip_missing && value.is_missing() {
                continue;
            }
            out.insert(
                descriptor.name().to_string(),
                self.serialize_value(&value, &descriptor.effective_type(), skip_missing)?,
            );
        }
        Ok(out)
    }

    /// Compact document of an object, restricted to `include` when it is
    /// non-empty, otherwise without the keys in `exclude`.
    pub fn project(
        &self,
        obj: &TypedObject,
        include: &[&str],
        exclude: &[&str],
    ) -> TieredResult<Map<String, Json>> {
        let mut doc = self.serialize_object(obj, &SemanticType::object(obj.type_name()), true)?;
        if !include.is_empty() {
            doc.retain(|key, _| include.contains(&key.as_str()));
        } else if !exclude.is_empty() {
            doc.retain(|key, _| !exclude.contains(&key.as_str()));
        }
        Ok(doc)
    }

    // =========================================================================
    // BINARY FORM
    // =========================================================================

    fn uses_codec(&self, ty: &SemanticType) -> bool {
        !needs_schemas(ty) || self.codecs.contains(ty)
    }

    pub fn encode(&self, w: &mut ByteWriter, ty: &SemanticType, value: &Value) -> TieredResult<()> {
        if self.uses_codec(ty) {
            return self.codecs.encode(w, ty, value);
        }
        if value.is_absent() {
            write_presence(w, false);
            return Ok(());
        }
        write_presence(w, true);

        match ty {
            SemanticType::Object(_) | SemanticType::OneOf(_) => {
                let obj = match value {
                    Value::Object(obj) if ty.conforms(value) => obj,
                    other => return Err(value_mismatch(ty, other)),
                };
                w.write_blob(obj.type_name().as_bytes())?;
                for descriptor in obj.schema().properties() {
                    match obj.peek(descriptor.name()) {
                        Some(field) => {
                            w.write_u8(FIELD_SET);
                            self.encode(w, &descriptor.effective_type(), field)?;
                        }
                        None => w.write_u8(FIELD_UNSET),
                    }
                }
                Ok(())
            }
            SemanticType::List(element) => {
                let items = value.as_list().ok_or_else(|| value_mismatch(ty, value))?;
                w.write_len(items.len())?;
                for item in items {
                    self.encode(w, element, item)?;
                }
                Ok(())
            }
            SemanticType::Union(alternatives) => {
                let (index, alt) = alternatives
                    .iter()
                    .enumerate()
                    .find(|(_, alt)| alt.conforms(value))
                    .ok_or_else(|| value_mismatch(ty, value))?;
                let index = u8::try_from(index).map_err(|_| value_mismatch(ty, value))?;
                w.write_u8(index);
                self.encode(w, alt, value)
            }
            _ => Err(value_mismatch(ty, value)),
        }
    }

    /// Decode one value of type `ty`.
    ///
    /// Decoded objects are rebuilt through [`TypedObject::set`], so a stream
    /// that would produce an invalid instance fails with
    /// [`DecodeError::InvalidField`]. Nesting is capped at
    /// [`MAX_DECODE_DEPTH`] levels.
    pub fn decode(&self, r: &mut ByteReader<'_>, ty: &SemanticType) -> TieredResult<Value> {
        self.decode_at(r, ty, 0)
    }

    fn decode_at(
        &self,
        r: &mut ByteReader<'_>,
        ty: &SemanticType,
        depth: usize,
    ) -> TieredResult<Value> {
        if self.uses_codec(ty) {
            return self.codecs.decode(r, ty);
        }
        if depth >= MAX_DECODE_DEPTH {
            return Err(DecodeError::DepthExceeded {
                limit: MAX_DECODE_DEPTH,
            }
            .into());
        }
        if !r.read_presence()? {
            return Ok(Value::Null);
        }

        match ty {
            SemanticType::Object(_) | SemanticType::OneOf(_) => {
                let type_name = r.read_text()?;
                let schema = self
                    .schemas
                    .object(&type_name)
                    .map_err(|_| DecodeError::UnknownType { name: type_name.clone() })?;
                let admitted = match ty {
                    SemanticType::Object(name) => schema.is_a(name),
                    SemanticType::OneOf(group) => {
                        group.variants().values().any(|variant| schema.is_a(variant))
                    }
                    _ => false,
                };
                if !admitted {
                    return Err(DecodeError::UnexpectedType {
                        expected: ty.to_string(),
                        got: type_name,
                    }
                    .into());
                }

                let mut decoded = HashMap::new();
                for descriptor in schema.properties() {
                    match r.read_u8()? {
                        FIELD_UNSET => {}
                        FIELD_SET => {
                            let field =
                                self.decode_at(r, &descriptor.effective_type(), depth + 1)?;
                            decoded.insert(descriptor.name(), field);
                        }
                        marker => return Err(DecodeError::InvalidMarker { marker }.into()),
                    }
                }

                // same order as parsing: selectors land before polymorphic properties
                let mut obj = TypedObject::new(Arc::clone(&schema));
                let members = schema.scalar_members().iter().chain(schema.composite_members());
                for name in members {
                    let Some(field) = decoded.remove(name.as_str()) else {
                        continue;
                    };
                    obj.set(name, field).map_err(|e| invalid_field(&schema, name, e))?;
                }
                Ok(Value::Object(obj))
            }
            SemanticType::List(element) => {
                let count = r.read_len(1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(self.decode_at(r, element, depth + 1)?);
                }
                Ok(Value::List(items))
            }
            SemanticType::Union(alternatives) => {
                let index = r.read_u8()?;
                let alt = alternatives.get(usize::from(index)).ok_or_else(|| {
                    DecodeError::InvalidAlternative {
                        index,
                        ty: ty.to_string(),
                    }
                })?;
                self.decode_at(r, alt, depth + 1)
            }
            _ => Err(DecodeError::UnexpectedType {
                expected: ty.to_string(),
                got: "unsupported".to_string(),
            }
            .into()),
        }
    }

    /// Encode a whole value into a fresh buffer.
    pub fn to_bytes(&self, ty: &SemanticType, value: &Value) -> TieredResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        self.encode(&mut w, ty, value)?;
        Ok(w.into_inner())
    }

    /// Decode a whole value from `bytes`.
    pub fn from_bytes(&self, ty: &SemanticType, bytes: &[u8]) -> TieredResult<Value> {
        self.decode(&mut ByteReader::new(bytes), ty)
    }
}

/// Validation failures while rebuilding a decoded object are stream faults.
fn invalid_field(schema: &ObjectSchema, field: &str, err: TieredError) -> TieredError {
    match err {
        TieredError::Validation(reason) => DecodeError::InvalidField {
            type_name: schema.name().to_string(),
            field: field.to_string(),
            reason: reason.to_string(),
        }
        .into(),
        other => other,
    }
}

/// Element type of a list type, or of the first list alternative of a union.
fn list_element(ty: &SemanticType) -> Option<&SemanticType> {
    match ty {
        SemanticType::List(element) => Some(element.as_ref()),
        SemanticType::Union(alternatives) => alternatives.iter().find_map(list_element),
        _ => None,
    }
}

fn needs_schemas(ty: &SemanticType) -> bool {
    match ty {
        SemanticType::Object(_) | SemanticType::OneOf(_) | SemanticType::Union(_) => true,
        SemanticType::List(element) => needs_schemas(element),
        _ => false,
    }
}

fn parse_timestamp(raw: &Json) -> Option<Value> {
    let ts = match raw {
        Json::String(s) => DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc),
        Json::Number(n) => DateTime::<Utc>::from_timestamp(n.as_i64()?, 0)?,
        _ => return None,
    };
    Some(Value::Timestamp(ts))
}

fn json_label(raw: &Json) -> &'static str {
    match raw {
        Json::Null => "null",
        Json::Bool(_) => "boolean",
        Json::Number(_) => "number",
        Json::String(_) => "string",
        Json::Array(_) => "array",
        Json::Object(_) => "object",
    }
}

fn json_mismatch(field: &str, expected: &str, raw: &Json) -> TieredError {
    ValidationError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        got: json_label(raw).to_string(),
    }
    .into()
}

fn value_mismatch(ty: &SemanticType, value: &Value) -> TieredError {
    ValidationError::TypeMismatch {
        field: "value".to_string(),
        expected: ty.to_string(),
        got: value.type_label(),
    }
    .into()
}

// =============================================================================
// TESTS
// =============================================================================
