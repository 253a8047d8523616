//! Cache entry wire format.
//!
//! ```text
//! [presence: '1'|'0'][success: '1'|'0'][payload]
//! ```
//!
//! A success payload is the return value encoded with the function's
//! declared return type. A failure payload is a length-prefixed JSON
//! document (`{"kind": .., "message": ..}`), readable without any schema.

use serde::{Deserialize, Serialize};
use tiercache_core::codec::{write_presence, ABSENT, PRESENT};
use tiercache_core::{
    ByteReader, ByteWriter, DecodeError, Marshaller, SemanticType, TieredResult, Value,
};

/// A failure recorded in a cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedFailure {
    /// Error type or category.
    pub kind: String,
    /// Human-readable message.
    pub message: String,
}

impl CachedFailure {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Logical content of a cache entry.
#[derive(Debug, Clone, PartialEq)]
pub enum CacheEntry {
    Success(Value),
    Failure(CachedFailure),
}

impl CacheEntry {
    pub fn is_success(&self) -> bool {
        matches!(self, CacheEntry::Success(_))
    }
}

/// Serializer and deserializer pair for one function's cache entries.
#[derive(Debug, Clone)]
pub struct EntryCodec {
    marshaller: Marshaller,
    return_type: SemanticType,
}

impl EntryCodec {
    pub fn new(marshaller: Marshaller, return_type: SemanticType) -> Self {
        Self {
            marshaller,
            return_type,
        }
    }

    pub fn return_type(&self) -> &SemanticType {
        &self.return_type
    }

    pub fn encode(&self, entry: &CacheEntry) -> TieredResult<Vec<u8>> {
        let mut w = ByteWriter::new();
        write_presence(&mut w, true);
        match entry {
            CacheEntry::Success(value) => {
                w.write_u8(PRESENT);
                self.marshaller.encode(&mut w, &self.return_type, value)?;
            }
            CacheEntry::Failure(failure) => {
                w.write_u8(ABSENT);
                let json = serde_json::to_vec(failure).map_err(|e| DecodeError::InvalidJson {
                    reason: e.to_string(),
                })?;
                w.write_blob(&json)?;
            }
        }
        Ok(w.into_inner())
    }

    /// Decode an entry. An absent entry decodes to `None`.
    pub fn decode(&self, bytes: &[u8]) -> TieredResult<Option<CacheEntry>> {
        let mut r = ByteReader::new(bytes);
        if !r.read_presence()? {
            return Ok(None);
        }
        let entry = match r.read_u8()? {
            PRESENT => CacheEntry::Success(self.marshaller.decode(&mut r, &self.return_type)?),
            ABSENT => {
                let failure = serde_json::from_slice(r.read_blob()?).map_err(|e| {
                    DecodeError::InvalidJson {
                        reason: e.to_string(),
                    }
                })?;
                CacheEntry::Failure(failure)
            }
            marker => return Err(DecodeError::InvalidMarker { marker }.into()),
        };
        Ok(Some(entry))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec(ty: SemanticType) -> EntryCodec {
        EntryCodec::new(Marshaller::primitives_only(), ty)
    }

    #[test]
    fn test_success_layout() {
        let bytes = codec(SemanticType::Integer)
            .encode(&CacheEntry::Success(Value::Integer(5)))
            .unwrap();
        assert_eq!(bytes, vec![b'1', b'1', b'1', 5, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn test_success_null_value() {
        let c = codec(SemanticType::Text);
        let bytes = c.encode(&CacheEntry::Success(Value::Null)).unwrap();
        assert_eq!(bytes, vec![b'1', b'1', b'0']);
        assert_eq!(
            c.decode(&bytes).unwrap(),
            Some(CacheEntry::Success(Value::Null))
        );
    }

    #[test]
    fn test_failure_is_self_describing() {
        let c = codec(SemanticType::list(SemanticType::Integer));
        let entry = CacheEntry::Failure(CachedFailure::new("NotFound", "no such account"));
        let bytes = c.encode(&entry).unwrap();
        assert_eq!(&bytes[..2], b"10");

        // any codec can read a failure, whatever its return type
        let other = codec(SemanticType::Mapping);
        assert_eq!(other.decode(&bytes).unwrap(), Some(entry));
    }

    #[test]
    fn test_absent_entry() {
        assert_eq!(codec(SemanticType::Integer).decode(b"0").unwrap(), None);
    }

    #[test]
    fn test_malformed_entries() {
        let c = codec(SemanticType::Integer);
        assert!(c.decode(b"").unwrap_err().is_decode());
        assert!(c.decode(b"1x").unwrap_err().is_decode());
        assert!(c.decode(&[b'1', b'1', b'1', 5, 0]).unwrap_err().is_decode());
        assert!(c
            .decode(&[b'1', b'0', 3, 0, 0, 0, b'{', b'}', b'x'])
            .unwrap_err()
            .is_decode());
    }
}
