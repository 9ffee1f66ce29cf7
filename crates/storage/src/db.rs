//! sled database wrapper with serialization and key helpers.

use fedreg_core::Hash;
use sled::Db;
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

/// Storage errors.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] sled::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Malformed key: {0:?}")]
    MalformedKey(Vec<u8>),
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Key prefixes of the persisted tables.
pub const TRANSACTION_PREFIX: &[u8] = b"tx:pos:";
pub const TRANSACTION_HASH_PREFIX: &[u8] = b"tx:hash:";
pub const STREAM_PREFIX: &[u8] = b"stream:";
pub const BLOCK_RANGE_PREFIX: &[u8] = b"block:range:";
pub const BLOCK_HASH_PREFIX: &[u8] = b"block:hash:";

/// Wrapper around sled database with serialization helpers.
pub struct Storage {
    db: Db,
}

impl Storage {
    /// Open a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path)?;
        Ok(Self { db })
    }

    /// Open an in-memory database (for testing).
    pub fn open_temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    /// Store a serializable value.
    pub fn put<K, V>(&self, key: K, value: &V) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        let encoded = bincode::serialize(value)?;
        self.db.insert(key, encoded)?;
        Ok(())
    }

    /// Retrieve and deserialize a value.
    pub fn get<K, V>(&self, key: K) -> Result<Option<V>>
    where
        K: AsRef<[u8]>,
        V: serde::de::DeserializeOwned,
    {
        match self.db.get(key)? {
            Some(bytes) => Ok(Some(bincode::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    /// Check if a key exists.
    pub fn contains<K: AsRef<[u8]>>(&self, key: K) -> Result<bool> {
        Ok(self.db.contains_key(key)?)
    }

    /// Deserialize every value with a key in `[start, end]`, in key order.
    pub fn range_values<V>(&self, start: &[u8], end: &[u8]) -> Result<Vec<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        self.db
            .range(start..=end)
            .map(|entry| {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    /// Deserialize up to `take` values under `prefix`, skipping the first `skip`.
    pub fn prefix_values<V>(&self, prefix: &[u8], skip: usize, take: usize) -> Result<Vec<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        self.db
            .scan_prefix(prefix)
            .skip(skip)
            .take(take)
            .map(|entry| {
                let (_, bytes) = entry?;
                Ok(bincode::deserialize(&bytes)?)
            })
            .collect()
    }

    /// Key of the last entry under `prefix`.
    pub fn last_key(&self, prefix: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.db.scan_prefix(prefix).next_back() {
            Some(entry) => Ok(Some(entry?.0.to_vec())),
            None => Ok(None),
        }
    }

    /// Value of the last entry under `prefix`.
    pub fn last_value<V>(&self, prefix: &[u8]) -> Result<Option<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        match self.db.scan_prefix(prefix).next_back() {
            Some(entry) => Ok(Some(bincode::deserialize(&entry?.1)?)),
            None => Ok(None),
        }
    }

    /// Value of the first entry at or after `start` that still lies under `prefix`.
    pub fn first_value_from<V>(&self, prefix: &[u8], start: &[u8]) -> Result<Option<V>>
    where
        V: serde::de::DeserializeOwned,
    {
        match self.db.range(start..).next() {
            Some(entry) => {
                let (key, bytes) = entry?;
                if key.starts_with(prefix) {
                    Ok(Some(bincode::deserialize(&bytes)?))
                } else {
                    Ok(None)
                }
            }
            None => Ok(None),
        }
    }

    /// Apply multiple operations atomically.
    ///
    /// Note: Atomicity is provided by sled's `apply_batch`. The batch collects
    /// operations in memory, then `apply_batch` writes them through sled's
    /// write-ahead log in one step.
    pub fn batch(&self, operations: Vec<BatchOp>) -> Result<()> {
        let mut batch = sled::Batch::default();
        for op in operations {
            batch.insert(op.key, op.value);
        }
        self.db.apply_batch(batch)?;
        Ok(())
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }

    // =========================================================================
    // Key Construction Helpers
    // =========================================================================

    /// Transaction by global append position.
    /// Format: "tx:pos:" + position (big endian)
    pub fn transaction_key(position: u64) -> Vec<u8> {
        prefixed(TRANSACTION_PREFIX, &position.to_be_bytes())
    }

    /// Global position by transaction hash.
    /// Format: "tx:hash:" + hash_bytes
    pub fn transaction_hash_key(hash: &Hash) -> Vec<u8> {
        prefixed(TRANSACTION_HASH_PREFIX, hash.as_ref())
    }

    /// All entries of one stream.
    /// Format: "stream:" + uuid_bytes
    pub fn stream_prefix(stream_id: &Uuid) -> Vec<u8> {
        prefixed(STREAM_PREFIX, stream_id.as_bytes())
    }

    /// Global position by (stream, index).
    /// Format: "stream:" + uuid_bytes + index (big endian)
    pub fn stream_key(stream_id: &Uuid, stream_index: u64) -> Vec<u8> {
        let mut key = Self::stream_prefix(stream_id);
        key.extend_from_slice(&stream_index.to_be_bytes());
        key
    }

    /// Block by the last global position it covers.
    /// Format: "block:range:" + to_transaction (big endian)
    pub fn block_range_key(to_transaction: u64) -> Vec<u8> {
        prefixed(BLOCK_RANGE_PREFIX, &to_transaction.to_be_bytes())
    }

    /// Range end by block hash.
    /// Format: "block:hash:" + hash_bytes
    pub fn block_hash_key(hash: &Hash) -> Vec<u8> {
        prefixed(BLOCK_HASH_PREFIX, hash.as_ref())
    }

    /// Decode the big-endian `u64` that ends a key.
    pub fn decode_u64_suffix(key: &[u8]) -> Result<u64> {
        key.len()
            .checked_sub(8)
            .and_then(|start| key[start..].try_into().ok())
            .map(u64::from_be_bytes)
            .ok_or_else(|| StorageError::MalformedKey(key.to_vec()))
    }
}

fn prefixed(prefix: &[u8], suffix: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(prefix.len() + suffix.len());
    key.extend_from_slice(prefix);
    key.extend_from_slice(suffix);
    key
}

/// A single insert of an atomic batch.
pub struct BatchOp {
    key: Vec<u8>,
    value: Vec<u8>,
}

impl BatchOp {
    /// Serialize `value` for insertion under `key`.
    pub fn insert<K, V>(key: K, value: &V) -> Result<Self>
    where
        K: AsRef<[u8]>,
        V: serde::Serialize,
    {
        Ok(Self {
            key: key.as_ref().to_vec(),
            value: bincode::serialize(value)?,
        })
    }
}
