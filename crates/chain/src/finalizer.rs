//! Periodic block finalization.
//!
//! Each tick takes the next block from the repository, publishes its header
//! to the immutable log, records the publication and marks the block's
//! transactions `Finalized` in the status cache.
//!
//! A tick that fails part-way leaves the block unfinalized; the repository
//! re-offers the same block on the next tick, so publishing is retried
//! without ever forking the chain.

use crate::publisher::{BlockPublisher, PublishError};
use crate::status::TransactionStatusService;
use fedreg_core::TransactionStatus;
use fedreg_storage::{RepositoryError, TransactionRepository};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Errors that can occur during a finalization tick.
#[derive(Debug, Error)]
pub enum FinalizerError {
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    #[error("publish error: {0}")]
    Publish(#[from] PublishError),
}

pub type Result<T> = std::result::Result<T, FinalizerError>;

/// Shortest accepted tick interval.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Finalizer configuration.
#[derive(Debug, Clone)]
pub struct FinalizerConfig {
    /// Time between ticks.
    pub interval: Duration,
}

impl Default for FinalizerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
        }
    }
}

/// Summary of a tick that finalized a block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedBlock {
    pub block_hash: fedreg_core::BlockHash,
    pub transaction_count: usize,
}

pub struct BlockFinalizer {
    repository: Arc<dyn TransactionRepository>,
    publisher: Arc<dyn BlockPublisher>,
    status: Arc<dyn TransactionStatusService>,
}

impl BlockFinalizer {
    pub fn new(
        repository: Arc<dyn TransactionRepository>,
        publisher: Arc<dyn BlockPublisher>,
        status: Arc<dyn TransactionStatusService>,
    ) -> Self {
        Self {
            repository,
            publisher,
            status,
        }
    }

    /// Run one finalization step. Returns `None` when nothing was waiting.
    pub async fn execute(&self) -> Result<Option<FinalizedBlock>> {
        let started = Instant::now();

        let Some(block) = self.repository.create_next_block()? else {
            debug!("No new transactions to finalize");
            return Ok(None);
        };
        let block_hash = block.hash();

        let publication = self.publisher.publish_block(&block.header).await?;
        self.repository.finalize_block(&block_hash, publication)?;

        for transaction_hash in &block.transaction_hashes {
            if let Err(e) = self
                .status
                .set_transaction_status(transaction_hash, TransactionStatus::Finalized.into())
                .await
            {
                warn!(%transaction_hash, error = %e, "Could not mark transaction finalized");
            }
        }

        let transaction_count = block.transaction_hashes.len();
        let elapsed = started.elapsed();
        metrics::counter!("block_finalizer_blocks_processed", 1);
        metrics::counter!(
            "block_finalizer_transactions_processed",
            transaction_count as u64
        );
        metrics::histogram!(
            "block_finalizer_milliseconds_per_block",
            elapsed.as_secs_f64() * 1000.0
        );

        info!(
            %block_hash,
            transactions = transaction_count,
            elapsed_ms = elapsed.as_millis() as u64,
            "Finalized block"
        );
        Ok(Some(FinalizedBlock {
            block_hash,
            transaction_count,
        }))
    }
}

/// Drives a [`BlockFinalizer`] on a fixed interval.
pub struct BlockFinalizerService {
    finalizer: BlockFinalizer,
    config: FinalizerConfig,
}

impl BlockFinalizerService {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(finalizer: BlockFinalizer, mut config: FinalizerConfig) -> Self {
        if config.interval < MIN_INTERVAL {
            warn!(
                interval_ms = config.interval.as_millis() as u64,
                "Finalizer interval too short, using minimum"
            );
            config.interval = MIN_INTERVAL;
        }
        Self { finalizer, config }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    /// Tick until `shutdown` flips to `true` or its sender is dropped.
    ///
    /// The first tick fires one interval after start. Ticks never overlap;
    /// ticks missed while one was running are skipped. Shutdown is only
    /// observed between ticks.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.interval;
        let mut ticker = time::interval_at(time::Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(interval_ms = period.as_millis() as u64, "Block finalizer started");
        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if let Err(e) = self.finalizer.execute().await {
                error!(error = %e, "Critical error in block finalizer");
            }
        }
        info!("Block finalizer stopped");
    }
}
