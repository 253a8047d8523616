//! Binary codec registry.
//!
//! Maps a [`SemanticType`] to a paired encode/decode function over a byte
//! stream. Every encoding is framed by a one-byte presence marker:
//!
//! ```text
//! absent:  ['0']
//! present: ['1'][body]
//! ```
//!
//! Bodies are fixed-width little-endian for numbers, `[len: u32 LE][bytes]`
//! for text and blobs, and `[count: u32 LE][element]*` for lists, where each
//! element carries its own presence marker.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use crate::error::{ConfigError, DecodeError, TierError, TieredResult, ValidationError};
use crate::types::SemanticType;
use crate::value::Value;

/// Presence marker for an encoded value.
pub const PRESENT: u8 = b'1';
/// Presence marker for an absent (`Null` or `Missing`) value.
pub const ABSENT: u8 = b'0';

const TRUE_BYTE: u8 = b'1';
const FALSE_BYTE: u8 = b'0';

// =============================================================================
// BYTE STREAMS
// =============================================================================

/// Append-only output stream.
#[derive(Debug, Default, Clone)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn write_u8(&mut self, byte: u8) {
        self.buf.push(byte);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_i64(&mut self, v: i64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_f64(&mut self, v: f64) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.buf.extend_from_slice(&v.to_le_bytes());
    }

    /// Write a length or count prefix.
    pub fn write_len(&mut self, len: usize) -> TieredResult<()> {
        let len = u32::try_from(len).map_err(|_| ConfigError::InvalidValue {
            field: "length".to_string(),
            value: len.to_string(),
            reason: "does not fit the 4-byte length prefix".to_string(),
        })?;
        self.write_u32(len);
        Ok(())
    }

    /// Write `[len: u32 LE][bytes]`.
    pub fn write_blob(&mut self, bytes: &[u8]) -> TieredResult<()> {
        self.write_len(bytes.len())?;
        self.write_raw(bytes);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over an input stream. Every read is bounds-checked.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn read_exact(&mut self, n: usize) -> TieredResult<&'a [u8]> {
        if n > self.remaining() {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining: self.remaining(),
            }
            .into());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> TieredResult<u8> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_array<const N: usize>(&mut self) -> TieredResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    pub fn read_i64(&mut self) -> TieredResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64(&mut self) -> TieredResult<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> TieredResult<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Read a length prefix and check it against the remaining bytes,
    /// assuming each unit occupies at least `min_unit` bytes.
    pub fn read_len(&mut self, min_unit: usize) -> TieredResult<usize> {
        let declared = self.read_u32()? as usize;
        if declared.saturating_mul(min_unit) > self.remaining() {
            return Err(DecodeError::LengthOverflow {
                declared,
                remaining: self.remaining(),
            }
            .into());
        }
        Ok(declared)
    }

    /// Read `[len: u32 LE][bytes]`.
    pub fn read_blob(&mut self) -> TieredResult<&'a [u8]> {
        let len = self.read_len(1)?;
        self.read_exact(len)
    }

    pub fn read_text(&mut self) -> TieredResult<String> {
        let bytes = self.read_blob()?;
        String::from_utf8(bytes.to_vec()).map_err(|_| DecodeError::InvalidUtf8.into())
    }

    /// Read a presence marker. Returns `true` when a body follows.
    pub fn read_presence(&mut self) -> TieredResult<bool> {
        match self.read_u8()? {
            PRESENT => Ok(true),
            ABSENT => Ok(false),
            marker => Err(DecodeError::InvalidMarker { marker }.into()),
        }
    }
}

/// Write a presence marker.
pub fn write_presence(w: &mut ByteWriter, present: bool) {
    w.write_u8(if present { PRESENT } else { ABSENT });
}

// =============================================================================
// CODECS
// =============================================================================

/// Body encoder: receives a present value.
pub type EncodeFn = Arc<dyn Fn(&mut ByteWriter, &Value) -> TieredResult<()> + Send + Sync>;
/// Body decoder: called after a present marker has been consumed.
pub type DecodeFn = Arc<dyn for<'a> Fn(&mut ByteReader<'a>) -> TieredResult<Value> + Send + Sync>;

pub fn encoder<F>(f: F) -> EncodeFn
where
    F: Fn(&mut ByteWriter, &Value) -> TieredResult<()> + Send + Sync + 'static,
{
    Arc::new(f)
}

pub fn decoder<F>(f: F) -> DecodeFn
where
    F: for<'a> Fn(&mut ByteReader<'a>) -> TieredResult<Value> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// A registered encode/decode pair. Presence framing is applied here, so the
/// body functions never see absent values.
#[derive(Clone)]
pub struct Codec {
    ty: SemanticType,
    encode_body: EncodeFn,
    decode_body: DecodeFn,
}

impl fmt::Debug for Codec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Codec").field("ty", &self.ty).finish()
    }
}

impl Codec {
    pub fn new(ty: SemanticType, encode_body: EncodeFn, decode_body: DecodeFn) -> Self {
        Self {
            ty,
            encode_body,
            decode_body,
        }
    }

    pub fn semantic_type(&self) -> &SemanticType {
        &self.ty
    }

    pub fn encode(&self, w: &mut ByteWriter, value: &Value) -> TieredResult<()> {
        if value.is_absent() {
            write_presence(w, false);
            return Ok(());
        }
        write_presence(w, true);
        (self.encode_body)(w, value)
    }

    pub fn decode(&self, r: &mut ByteReader<'_>) -> TieredResult<Value> {
        if !r.read_presence()? {
            return Ok(Value::Null);
        }
        (self.decode_body)(r)
    }

    /// `List<T>` codec built from this element codec.
    fn list_of(&self) -> Codec {
        let element = self.clone();
        let decode_element = self.clone();
        let list_ty = SemanticType::list(self.ty.clone());
        let label = list_ty.clone();
        Codec::new(
            list_ty,
            encoder(move |w, value| match value {
                Value::List(items) => {
                    w.write_len(items.len())?;
                    for item in items {
                        element.encode(w, item)?;
                    }
                    Ok(())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(move |r| {
                // each element is at least its presence byte
                let count = r.read_len(1)?;
                let mut items = Vec::with_capacity(count);
                for _ in 0..count {
                    items.push(decode_element.decode(r)?);
                }
                Ok(Value::List(items))
            }),
        )
    }
}

/// Whether `key` is a (possibly nested) list whose elements reach `ty`.
fn wraps(key: &SemanticType, ty: &SemanticType) -> bool {
    let mut current = key;
    while let SemanticType::List(inner) = current {
        if **inner == *ty {
            return true;
        }
        current = inner;
    }
    false
}

fn mismatch(ty: &SemanticType, value: &Value) -> crate::TieredError {
    ValidationError::TypeMismatch {
        field: "value".to_string(),
        expected: ty.to_string(),
        got: value.type_label(),
    }
    .into()
}

fn builtin(ty: SemanticType) -> Option<Codec> {
    let label = ty.clone();
    let codec = match ty {
        SemanticType::Integer => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Integer(i) => {
                    w.write_i64(*i);
                    Ok(())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| Ok(Value::Integer(r.read_i64()?))),
        ),
        SemanticType::Float => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Float(f) => {
                    w.write_f64(*f);
                    Ok(())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| Ok(Value::Float(r.read_f64()?))),
        ),
        SemanticType::Boolean => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Boolean(b) => {
                    w.write_u8(if *b { TRUE_BYTE } else { FALSE_BYTE });
                    Ok(())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| match r.read_u8()? {
                TRUE_BYTE => Ok(Value::Boolean(true)),
                FALSE_BYTE => Ok(Value::Boolean(false)),
                marker => Err(DecodeError::InvalidMarker { marker }.into()),
            }),
        ),
        SemanticType::Text => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Text(s) => w.write_blob(s.as_bytes()),
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| Ok(Value::Text(r.read_text()?))),
        ),
        SemanticType::Handle => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Handle(s) => w.write_blob(s.as_bytes()),
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| Ok(Value::Handle(r.read_text()?))),
        ),
        SemanticType::Bytes => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Bytes(b) => w.write_blob(b),
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| Ok(Value::Bytes(r.read_blob()?.to_vec()))),
        ),
        SemanticType::Mapping => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Mapping(doc) => {
                    let text = serde_json::to_string(doc).map_err(|e| {
                        ConfigError::InvalidValue {
                            field: "mapping".to_string(),
                            value: doc.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    w.write_blob(text.as_bytes())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| {
                let text = r.read_text()?;
                serde_json::from_str(&text)
                    .map(Value::Mapping)
                    .map_err(|e| DecodeError::InvalidJson { reason: e.to_string() }.into())
            }),
        ),
        SemanticType::Timestamp => Codec::new(
            ty,
            encoder(move |w, v| match v {
                Value::Timestamp(ts) => {
                    w.write_i64(ts.timestamp());
                    w.write_u32(ts.timestamp_subsec_nanos());
                    Ok(())
                }
                other => Err(mismatch(&label, other)),
            }),
            decoder(|r| {
                let secs = r.read_i64()?;
                let nanos = r.read_u32()?;
                DateTime::<Utc>::from_timestamp(secs, nanos)
                    .map(Value::Timestamp)
                    .ok_or_else(|| DecodeError::InvalidTimestamp { secs, nanos }.into())
            }),
        ),
        _ => return None,
    };
    Some(codec)
}

// =============================================================================
// REGISTRY
// =============================================================================

/// Registry of codecs keyed by semantic type.
///
/// `List<T>` codecs are composed from `T` on first request and cached.
pub struct CodecRegistry {
    codecs: RwLock<HashMap<SemanticType, Codec>>,
}

impl fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.codecs.read().map(|c| c.len()).unwrap_or_default();
        f.debug_struct("CodecRegistry")
            .field("codecs", &count)
            .finish()
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl CodecRegistry {
    /// Empty registry with no codecs at all.
    pub fn empty() -> Self {
        Self {
            codecs: RwLock::new(HashMap::new()),
        }
    }

    /// Registry holding every primitive codec and the list codec of each
    /// primitive.
    pub fn with_builtins() -> Self {
        let mut codecs = HashMap::new();
        for ty in SemanticType::PRIMITIVES.iter() {
            if let Some(codec) = builtin(ty.clone()) {
                let list = codec.list_of();
                codecs.insert(list.ty.clone(), list);
                codecs.insert(ty.clone(), codec);
            }
        }
        Self {
            codecs: RwLock::new(codecs),
        }
    }

    /// Install an encode/decode pair, replacing any existing one.
    pub fn register<E, D>(&self, ty: SemanticType, encode: E, decode: D) -> TieredResult<()>
    where
        E: Fn(&mut ByteWriter, &Value) -> TieredResult<()> + Send + Sync + 'static,
        D: for<'a> Fn(&mut ByteReader<'a>) -> TieredResult<Value> + Send + Sync + 'static,
    {
        let codec = Codec::new(ty.clone(), Arc::new(encode), Arc::new(decode));
        let mut codecs = self.codecs.write().map_err(|_| TierError::LockPoisoned)?;
        // composed lists of the old element codec are stale, at any depth
        codecs.retain(|key, _| !wraps(key, &ty));
        codecs.insert(ty, codec);
        Ok(())
    }

    pub fn contains(&self, ty: &SemanticType) -> bool {
        self.get(ty).is_ok()
    }

    /// Look up the codec for `ty`, composing list codecs on demand.
    pub fn get(&self, ty: &SemanticType) -> TieredResult<Codec> {
        {
            let codecs = self.codecs.read().map_err(|_| TierError::LockPoisoned)?;
            if let Some(codec) = codecs.get(ty) {
                return Ok(codec.clone());
            }
        }

        match ty {
            SemanticType::List(element) => {
                let composed = self.get(element)?.list_of();
                let mut codecs = self.codecs.write().map_err(|_| TierError::LockPoisoned)?;
                Ok(codecs.entry(ty.clone()).or_insert(composed).clone())
            }
            _ => Err(ConfigError::UnregisteredCodec { ty: ty.to_string() }.into()),
        }
    }

    pub fn encode(&self, w: &mut ByteWriter, ty: &SemanticType, value: &Value) -> TieredResult<()> {
        self.get(ty)?.encode(w, value)
    }

    pub fn decode(&self, r: &mut ByteReader<'_>, ty: &SemanticType) -> TieredResult<Value> {
        self.get(ty)?.decode(r)
    }

    /// Encode a lazily produced sequence as `List<element>`. The sequence is
    /// collected first so the count prefix is exact.
    pub fn encode_sequence<I>(
        &self,
        w: &mut ByteWriter,
        element: &SemanticType,
        items: I,
    ) -> TieredResult<()>
    where
        I: IntoIterator<Item = Value>,
    {
        let items: Vec<Value> = items.into_iter().collect();
        self.encode(w, &SemanticType::list(element.clone()), &Value::List(items))
    }

    /// Encode a single value into a fresh buffer.
    pub fn to_bytes(&self, ty: &SemanticType, value: &Value) -> TieredResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        self.encode(&mut w, ty, value)?;
        Ok(w.into_inner())
    }

    /// Decode a single value from `bytes`.
    pub fn from_bytes(&self, ty: &SemanticType, bytes: &[u8]) -> TieredResult<Value> {
        self.decode(&mut ByteReader::new(bytes), ty)
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TieredError;

    fn roundtrip(ty: SemanticType, value: Value) -> Value {
        let registry = CodecRegistry::with_builtins();
        let bytes = registry.to_bytes(&ty, &value).unwrap();
        registry.from_bytes(&ty, &bytes).unwrap()
    }

    #[test]
    fn test_integer_layout() {
        let registry = CodecRegistry::with_builtins();
        let bytes = registry.to_bytes(&SemanticType::Integer, &Value::Integer(1)).unwrap();
        assert_eq!(bytes, vec![b'1', 1, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_absent_short_circuits() {
        let registry = CodecRegistry::with_builtins();
        let null = registry.to_bytes(&SemanticType::Text, &Value::Null).unwrap();
        let missing = registry.to_bytes(&SemanticType::Text, &Value::Missing).unwrap();
        assert_eq!(null, vec![b'0']);
        assert_eq!(missing, vec![b'0']);
        assert_eq!(
            registry.from_bytes(&SemanticType::Text, &null).unwrap(),
            Value::Null
        );
    }

    #[test]
    fn test_extreme_integers() {
        for v in [i64::MIN, -1, 0, 1, i64::MAX] {
            assert_eq!(roundtrip(SemanticType::Integer, Value::Integer(v)), Value::Integer(v));
        }
    }

    #[test]
    fn test_empty_text_and_list() {
        assert_eq!(roundtrip(SemanticType::Text, Value::from("")), Value::from(""));
        let empty = SemanticType::list(SemanticType::Integer);
        assert_eq!(roundtrip(empty, Value::List(vec![])), Value::List(vec![]));
    }

    #[test]
    fn test_timestamp_keeps_nanoseconds() {
        let ts = DateTime::<Utc>::from_timestamp(1_700_000_000, 123_456_789).unwrap();
        assert_eq!(
            roundtrip(SemanticType::Timestamp, Value::Timestamp(ts)),
            Value::Timestamp(ts)
        );
    }

    #[test]
    fn test_mapping_roundtrip() {
        let doc = serde_json::json!({"a": [1, 2, {"b": null}], "c": "d"});
        assert_eq!(
            roundtrip(SemanticType::Mapping, Value::Mapping(doc.clone())),
            Value::Mapping(doc)
        );
    }

    #[test]
    fn test_list_elements_carry_presence() {
        let ty = SemanticType::list(SemanticType::Text);
        let value = Value::List(vec![Value::from("a"), Value::Null]);
        assert_eq!(roundtrip(ty, value.clone()), value);
    }

    #[test]
    fn test_nested_list_composed_and_cached() {
        let registry = CodecRegistry::with_builtins();
        let nested = SemanticType::list(SemanticType::list(SemanticType::Integer));
        assert!(registry.codecs.read().unwrap().get(&nested).is_none());

        let value = Value::List(vec![
            Value::List(vec![Value::Integer(1), Value::Integer(2)]),
            Value::List(vec![]),
        ]);
        let bytes = registry.to_bytes(&nested, &value).unwrap();
        assert_eq!(registry.from_bytes(&nested, &bytes).unwrap(), value);
        assert!(registry.codecs.read().unwrap().get(&nested).is_some());
    }

    #[test]
    fn test_encode_sequence_materializes() {
        let registry = CodecRegistry::with_builtins();
        let mut w = ByteWriter::new();
        registry
            .encode_sequence(&mut w, &SemanticType::Integer, (0..4).map(Value::Integer))
            .unwrap();
        let decoded = registry
            .from_bytes(&SemanticType::list(SemanticType::Integer), w.as_slice())
            .unwrap();
        assert_eq!(decoded.as_list().map(|items| items.len()), Some(4));
    }

    #[test]
    fn test_truncated_stream_is_error() {
        let registry = CodecRegistry::with_builtins();
        let bytes = registry.to_bytes(&SemanticType::Integer, &Value::Integer(7)).unwrap();
        let err = registry
            .from_bytes(&SemanticType::Integer, &bytes[..5])
            .unwrap_err();
        assert!(matches!(
            err,
            TieredError::Decode(DecodeError::UnexpectedEof { needed: 8, remaining: 4 })
        ));
    }

    #[test]
    fn test_oversized_length_is_error() {
        let registry = CodecRegistry::with_builtins();
        let mut bytes = vec![PRESENT];
        bytes.extend_from_slice(&1000u32.to_le_bytes());
        bytes.extend_from_slice(b"abc");
        let err = registry.from_bytes(&SemanticType::Text, &bytes).unwrap_err();
        assert!(matches!(
            err,
            TieredError::Decode(DecodeError::LengthOverflow { declared: 1000, remaining: 3 })
        ));
    }

    #[test]
    fn test_oversized_count_is_error() {
        let registry = CodecRegistry::with_builtins();
        let mut bytes = vec![PRESENT];
        bytes.extend_from_slice(&u32::MAX.to_le_bytes());
        let err = registry
            .from_bytes(&SemanticType::list(SemanticType::Integer), &bytes)
            .unwrap_err();
        assert!(err.is_decode());
    }

    #[test]
    fn test_invalid_marker_is_error() {
        let registry = CodecRegistry::with_builtins();
        let err = registry.from_bytes(&SemanticType::Integer, &[0x7f]).unwrap_err();
        assert_eq!(
            err,
            TieredError::Decode(DecodeError::InvalidMarker { marker: 0x7f })
        );
    }

    #[test]
    fn test_wrong_shape_is_validation_error() {
        let registry = CodecRegistry::with_builtins();
        let err = registry
            .to_bytes(&SemanticType::Integer, &Value::from("seven"))
            .unwrap_err();
        assert!(matches!(err, TieredError::Validation(_)));
    }

    #[test]
    fn test_unregistered_type_is_config_error() {
        let registry = CodecRegistry::with_builtins();
        let err = registry.get(&SemanticType::object("Person")).unwrap_err();
        assert!(matches!(err, TieredError::Config(ConfigError::UnregisteredCodec { .. })));
    }

    #[test]
    fn test_register_custom_codec_and_list() {
        let registry = CodecRegistry::with_builtins();
        let ty = SemanticType::object("Celsius");
        registry
            .register(
                ty.clone(),
                |w, v| match v {
                    Value::Float(f) => {
                        w.write_i64((*f * 100.0).round() as i64);
                        Ok(())
                    }
                    other => Err(mismatch(&SemanticType::object("Celsius"), other)),
                },
                |r| Ok(Value::Float(r.read_i64()? as f64 / 100.0)),
            )
            .unwrap();

        let list_ty = SemanticType::list(ty);
        let value = Value::List(vec![Value::Float(21.5), Value::Float(-3.25)]);
        let bytes = registry.to_bytes(&list_ty, &value).unwrap();
        assert_eq!(registry.from_bytes(&list_ty, &bytes).unwrap(), value);
    }

    #[test]
    fn test_register_replaces_nested_list_codecs() {
        let registry = CodecRegistry::with_builtins();
        let nested = SemanticType::list(SemanticType::list(SemanticType::Integer));
        let value = Value::List(vec![Value::List(vec![Value::Integer(7)])]);
        let before = registry.to_bytes(&nested, &value).unwrap();

        registry
            .register(
                SemanticType::Integer,
                |w, v| match v {
                    Value::Integer(i) => {
                        w.write_i64(i + 1000);
                        Ok(())
                    }
                    other => Err(mismatch(&SemanticType::Integer, other)),
                },
                |r| Ok(Value::Integer(r.read_i64()? - 1000)),
            )
            .unwrap();

        let after = registry.to_bytes(&nested, &value).unwrap();
        assert_ne!(after, before);
        assert_eq!(registry.from_bytes(&nested, &after).unwrap(), value);
        assert_eq!(
            CodecRegistry::with_builtins().from_bytes(&nested, &after).unwrap(),
            Value::List(vec![Value::List(vec![Value::Integer(1007)])])
        );
    }
}
