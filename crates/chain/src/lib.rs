//! Block finalization and transaction tracking for the federated registry.
//!
//! This crate runs on top of a [`TransactionRepository`](fedreg_storage::TransactionRepository):
//! - **Finalizer**: periodically batches stored transactions into a block and
//!   publishes its header to an immutable log
//! - **Status cache**: monotonic per-transaction status with repository fallback
//! - **Prover**: Merkle inclusion proofs for finalized transactions
//! - **Processor**: ingestion step that stores transactions and records their status
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use fedreg_chain::{
//!     BlockFinalizer, BlockFinalizerService, CachedStatusService, FinalizerConfig,
//!     LogPublisher, MemoryStatusStore, StatusCacheConfig,
//! };
//! use fedreg_storage::{InMemoryRepository, TransactionRepository};
//!
//! # async fn run() {
//! let repository: Arc<dyn TransactionRepository> = Arc::new(InMemoryRepository::new());
//! let cache = StatusCacheConfig::default();
//! let status = Arc::new(CachedStatusService::new(
//!     MemoryStatusStore::new(cache.capacity),
//!     repository.clone(),
//!     cache.ttl,
//! ));
//!
//! let finalizer = BlockFinalizer::new(repository, Arc::new(LogPublisher::new()), status);
//! let (_stop, shutdown) = tokio::sync::watch::channel(false);
//! BlockFinalizerService::new(finalizer, FinalizerConfig::default())
//!     .run(shutdown)
//!     .await;
//! # }
//! ```

pub mod finalizer;
pub mod processor;
pub mod prover;
pub mod publisher;
pub mod status;
pub mod status_store;

// Re-export commonly used types
pub use finalizer::{
    BlockFinalizer, BlockFinalizerService, FinalizedBlock, FinalizerConfig, FinalizerError,
    MIN_INTERVAL,
};
pub use processor::TransactionProcessor;
pub use prover::{EventProver, MerkleProof};
pub use publisher::{BlockPublisher, LogPublisher, PublishError};
pub use status::{CachedStatusService, StatusCacheConfig, StatusUpdate, TransactionStatusService};
pub use status_store::{MemoryStatusStore, StatusStore, StatusStoreError};
