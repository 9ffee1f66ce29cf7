//! Ingestion step: store verified transactions and track their status.

use crate::status::TransactionStatusService;
use fedreg_core::{StreamTransaction, TransactionHash, TransactionStatus, TransactionStatusRecord};
use fedreg_storage::{RepositoryError, TransactionRepository};
use std::sync::Arc;
use tracing::{info, warn};

pub struct TransactionProcessor {
    repository: Arc<dyn TransactionRepository>,
    status: Arc<dyn TransactionStatusService>,
}

impl TransactionProcessor {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        status: Arc<dyn TransactionStatusService>,
    ) -> Self {
        Self { repository, status }
    }

    /// Record that a transaction has been accepted for processing.
    pub async fn mark_pending(&self, transaction_hash: &TransactionHash) {
        self.set_status(transaction_hash, TransactionStatus::Pending.into())
            .await;
    }

    /// Store a transaction. Its status becomes `Committed`, or `Failed` with
    /// the rejection reason.
    pub async fn process(&self, transaction: StreamTransaction) -> Result<(), RepositoryError> {
        let transaction_hash = transaction.transaction_hash;

        match self.repository.store(transaction) {
            Ok(()) => {
                self.set_status(&transaction_hash, TransactionStatus::Committed.into())
                    .await;
                Ok(())
            }
            Err(e) => {
                // A stored hash is a redelivery; its status is already tracked.
                if self.is_stored(&transaction_hash) {
                    info!(%transaction_hash, error = %e, "Redelivered transaction rejected");
                    return Err(e);
                }
                info!(%transaction_hash, error = %e, "Transaction rejected");
                self.set_status(
                    &transaction_hash,
                    TransactionStatusRecord::with_message(TransactionStatus::Failed, e.to_string()),
                )
                .await;
                Err(e)
            }
        }
    }

    fn is_stored(&self, transaction_hash: &TransactionHash) -> bool {
        match self.repository.get_transaction_status(transaction_hash) {
            Ok(status) => status != TransactionStatus::Unknown,
            Err(e) => {
                warn!(%transaction_hash, error = %e, "Repository status lookup failed");
                false
            }
        }
    }

    async fn set_status(&self, transaction_hash: &TransactionHash, record: TransactionStatusRecord) {
        if let Err(e) = self
            .status
            .set_transaction_status(transaction_hash, record)
            .await
        {
            warn!(%transaction_hash, error = %e, "Could not update transaction status");
        }
    }
}
