//! Hashing and identifier helpers.

use sha2::{Digest, Sha256};
use uuid::Uuid;

/// SHA-256 of `data`.
pub fn compute_content_hash(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// Key under which an entry is stored in the durable tier:
/// `"{version}-{hex(sha256(cache_key))}"`.
pub fn durable_key(version: u32, cache_key: &str) -> String {
    format!(
        "{}-{}",
        version,
        hex::encode(compute_content_hash(cache_key.as_bytes()))
    )
}

/// Identifier for a unit of work. UUIDv7, so ids sort by creation time.
pub fn new_unit_id() -> Uuid {
    Uuid::now_v7()
}
