//! Key-value store behind the transaction status cache.
//!
//! A store offers exactly three primitives, each atomic on its own. A shared
//! cache server backend implements them with `GET`, `SET NX EX` and a
//! conditional `SET`.

use async_trait::async_trait;
use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that can occur talking to a status store.
#[derive(Debug, Error)]
pub enum StatusStoreError {
    #[error("status store unavailable: {0}")]
    Unavailable(String),
}

pub type Result<T> = std::result::Result<T, StatusStoreError>;

#[async_trait]
pub trait StatusStore: Send + Sync {
    /// Current value, if present and not expired.
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Write `value` only if `key` is absent. Returns whether it was written.
    async fn set_if_absent(&self, key: &[u8], value: Vec<u8>, ttl: Duration) -> Result<bool>;

    /// Write `value` only if the current value equals `expected`
    /// (`None` meaning absent). Returns whether it was written.
    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool>;
}

struct Entry {
    value: Vec<u8>,
    expires_at: Instant,
}

impl Entry {
    fn new(value: Vec<u8>, ttl: Duration) -> Self {
        Self {
            value,
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

/// Bounded in-process status store.
///
/// Least recently used entries are evicted at capacity; expired entries read
/// as absent.
pub struct MemoryStatusStore {
    entries: Mutex<LruCache<Vec<u8>, Entry>>,
}

impl MemoryStatusStore {
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Number of entries held, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn live_value(entries: &mut LruCache<Vec<u8>, Entry>, key: &[u8]) -> Option<Vec<u8>> {
        let now = Instant::now();
        let live = entries
            .get(key)
            .map(|entry| entry.is_live(now).then(|| entry.value.clone()));
        match live {
            Some(Some(value)) => Some(value),
            Some(None) => {
                entries.pop(key);
                None
            }
            None => None,
        }
    }
}

#[async_trait]
impl StatusStore for MemoryStatusStore {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let mut entries = self.entries.lock();
        Ok(Self::live_value(&mut entries, key))
    }

    async fn set_if_absent(&self, key: &[u8], value: Vec<u8>, ttl: Duration) -> Result<bool> {
        let mut entries = self.entries.lock();
        if Self::live_value(&mut entries, key).is_some() {
            return Ok(false);
        }
        entries.put(key.to_vec(), Entry::new(value, ttl));
        Ok(true)
    }

    async fn compare_and_set(
        &self,
        key: &[u8],
        expected: Option<&[u8]>,
        value: Vec<u8>,
        ttl: Duration,
    ) -> Result<bool> {
        let mut entries = self.entries.lock();
        let current = Self::live_value(&mut entries, key);
        if current.as_deref() != expected {
            return Ok(false);
        }
        entries.put(key.to_vec(), Entry::new(value, ttl));
        Ok(true)
    }
}
