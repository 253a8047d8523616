//! LMDB-backed durable tier.
//!
//! Uses the heed crate (Rust bindings for LMDB) as a memory-mapped
//! key-value store for durable cache records.
//!
//! # Record Layout
//!
//! ```text
//! [created_at millis: i64 LE][description len: u32 LE][description][payload]
//! ```
//!
//! Keys are the hashed durable keys produced by
//! [`CacheKey::durable_key`](tiercache_core::CacheKey::durable_key).

use std::path::Path;

use async_trait::async_trait;
use chrono::DateTime;
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use tiercache_core::{ByteReader, ByteWriter, DecodeError, TierError, TieredError, TieredResult};

use super::traits::{DurableRecord, DurableStore, Tier};

/// Error type for LMDB store operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbStoreError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<LmdbStoreError> for TieredError {
    fn from(e: LmdbStoreError) -> Self {
        TierError::Backend {
            tier: Tier::Durable.to_string(),
            reason: e.to_string(),
        }
        .into()
    }
}

/// LMDB-backed durable store.
///
/// # Example
///
/// ```ignore
/// use tiercache_storage::cache::LmdbDurableStore;
///
/// let store = Arc::new(LmdbDurableStore::new("/var/lib/app/cache", 256)?);
/// let lookup = CachedFunction::builder(metadata, policy, marshaller)
///     .durable(store)
///     .compute(fetch_rates)
///     .build()?;
/// ```
pub struct LmdbDurableStore {
    env: Env,
    db: Database<Bytes, Bytes>,
}

impl LmdbDurableStore {
    /// Open or create a store.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbStoreError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbStoreError::EnvOpen(e.to_string()))?;

        let mut wtxn = env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbStoreError::DbOpen(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(Self { env, db })
    }

    /// Number of stored records.
    pub fn len(&self) -> Result<u64, LmdbStoreError> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;
        self.db
            .len(&rtxn)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))
    }
}

fn encode_record(record: &DurableRecord) -> TieredResult<Vec<u8>> {
    let mut w = ByteWriter::new();
    w.write_i64(record.created_at.timestamp_millis());
    w.write_blob(record.description.as_bytes())?;
    w.write_raw(&record.value);
    Ok(w.into_inner())
}

fn decode_record(bytes: &[u8]) -> TieredResult<DurableRecord> {
    let mut r = ByteReader::new(bytes);
    let millis = r.read_i64()?;
    let created_at = DateTime::from_timestamp_millis(millis).ok_or(DecodeError::InvalidTimestamp {
        secs: millis.div_euclid(1000),
        nanos: 0,
    })?;
    let description = r.read_text()?;
    let value = r.read_exact(r.remaining())?.to_vec();
    Ok(DurableRecord {
        value,
        description,
        created_at,
    })
}

#[async_trait]
impl DurableStore for LmdbDurableStore {
    async fn get(&self, key: &str) -> TieredResult<Option<DurableRecord>> {
        let rtxn = self
            .env
            .read_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        match self.db.get(&rtxn, key.as_bytes()) {
            Ok(Some(bytes)) => decode_record(bytes).map(Some),
            Ok(None) => Ok(None),
            Err(e) => Err(LmdbStoreError::Transaction(e.to_string()).into()),
        }
    }

    async fn put(&self, key: &str, record: DurableRecord) -> TieredResult<()> {
        let bytes = encode_record(&record)?;

        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .put(&mut wtxn, key.as_bytes(), &bytes)
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> TieredResult<()> {
        let mut wtxn = self
            .env
            .write_txn()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        self.db
            .delete(&mut wtxn, key.as_bytes())
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        wtxn.commit()
            .map_err(|e| LmdbStoreError::Transaction(e.to_string()))?;

        Ok(())
    }
}
