//! Transaction status cache.
//!
//! Statuses live in a [`StatusStore`] keyed by transaction hash and only ever
//! move forward (`Unknown < Pending < Failed < Committed < Finalized`). On a
//! miss the repository is the source of truth and its answer seeds the cache.

use crate::status_store::{StatusStore, StatusStoreError};
use async_trait::async_trait;
use fedreg_core::{TransactionHash, TransactionStatus, TransactionStatusRecord};
use fedreg_storage::TransactionRepository;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace, warn};

/// Outcome of a status write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    Written,
    /// The new status is lower than the cached one; nothing was written.
    DowngradeRejected,
    /// Another writer changed the entry between read and write; nothing was
    /// written.
    RaceAbandoned,
}

#[async_trait]
pub trait TransactionStatusService: Send + Sync {
    /// Current status of a transaction. Never fails: an unreachable store
    /// falls back to the repository, and a failing repository reads as
    /// `Unknown`.
    async fn get_transaction_status(&self, transaction_hash: &TransactionHash) -> TransactionStatusRecord;

    /// Move a transaction to `record`, unless that would lower its status.
    async fn set_transaction_status(
        &self,
        transaction_hash: &TransactionHash,
        record: TransactionStatusRecord,
    ) -> Result<StatusUpdate, StatusStoreError>;
}

/// Status cache configuration.
#[derive(Debug, Clone)]
pub struct StatusCacheConfig {
    /// Lifetime of a cache entry; refreshed on every write.
    pub ttl: Duration,
    /// Maximum entries held by an in-process store.
    pub capacity: NonZeroUsize,
}

impl Default for StatusCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(60 * 60),
            capacity: NonZeroUsize::new(100_000).unwrap_or(NonZeroUsize::MIN),
        }
    }
}

/// Status service over a [`StatusStore`] with repository fallback.
pub struct CachedStatusService<S> {
    store: S,
    repository: Arc<dyn TransactionRepository>,
    ttl: Duration,
}

impl<S: StatusStore> CachedStatusService<S> {
    pub fn new(store: S, repository: Arc<dyn TransactionRepository>, ttl: Duration) -> Self {
        Self {
            store,
            repository,
            ttl,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    async fn cached(&self, key: &[u8]) -> Option<TransactionStatusRecord> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => match TransactionStatusRecord::decode(&bytes) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(key = %hex::encode(key), error = %e, "Undecodable status entry");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Status store read failed");
                None
            }
        }
    }

    fn repository_status(&self, transaction_hash: &TransactionHash) -> TransactionStatusRecord {
        match self.repository.get_transaction_status(transaction_hash) {
            Ok(status) => TransactionStatusRecord::new(status),
            Err(e) => {
                error!(%transaction_hash, error = %e, "Repository status lookup failed");
                TransactionStatusRecord::new(TransactionStatus::Unknown)
            }
        }
    }
}

#[async_trait]
impl<S: StatusStore> TransactionStatusService for CachedStatusService<S> {
    async fn get_transaction_status(&self, transaction_hash: &TransactionHash) -> TransactionStatusRecord {
        let key: &[u8] = transaction_hash.as_ref();

        if let Some(record) = self.cached(key).await {
            return record;
        }

        let record = self.repository_status(transaction_hash);
        match self.store.set_if_absent(key, record.encode(), self.ttl).await {
            Ok(true) => record,
            Ok(false) => {
                // A concurrent writer seeded first; keep the fresher answer.
                match self.cached(key).await {
                    Some(existing) if existing.status >= record.status => existing,
                    _ => record,
                }
            }
            Err(e) => {
                warn!(%transaction_hash, error = %e, "Could not seed status cache");
                record
            }
        }
    }

    async fn set_transaction_status(
        &self,
        transaction_hash: &TransactionHash,
        record: TransactionStatusRecord,
    ) -> Result<StatusUpdate, StatusStoreError> {
        let key: &[u8] = transaction_hash.as_ref();
        trace!(%transaction_hash, status = %record.status, "Setting transaction status");

        let current_bytes = self.store.get(key).await?;
        let current = current_bytes
            .as_deref()
            .and_then(|bytes| TransactionStatusRecord::decode(bytes).ok());

        if let Some(current) = &current {
            if record.status < current.status {
                warn!(
                    %transaction_hash,
                    current = %current.status,
                    requested = %record.status,
                    "Status downgrade prevented"
                );
                return Ok(StatusUpdate::DowngradeRejected);
            }
        }

        let written = self
            .store
            .compare_and_set(key, current_bytes.as_deref(), record.encode(), self.ttl)
            .await?;
        if written {
            debug!(%transaction_hash, status = %record.status, "Transaction status updated");
            return Ok(StatusUpdate::Written);
        }

        match self.cached(key).await {
            Some(latest) if current.is_none() && latest.status == TransactionStatus::Unknown => {
                warn!(%transaction_hash, "Concurrent modification of unknown status, update abandoned");
            }
            Some(latest) => {
                error!(
                    %transaction_hash,
                    status = %latest.status,
                    "Concurrent modification detected, update abandoned"
                );
            }
            None => {
                error!(%transaction_hash, "Concurrent modification detected, update abandoned");
            }
        }
        Ok(StatusUpdate::RaceAbandoned)
    }
}
