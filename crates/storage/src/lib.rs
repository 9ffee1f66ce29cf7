//! Transaction repository for the federated registry.
//!
//! Stores stream transactions in global append order and batches them into
//! hash-chained blocks:
//! - Per-stream ordering (each stream's indices are contiguous from 0)
//! - Block creation with power-of-two lengths
//! - Block finalization with a publication receipt
//!
//! # Backends
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │           TransactionRepository              │
//! └──────────────┬─────────────────┬─────────────┘
//!                │                 │
//! ┌──────────────▼───────┐ ┌───────▼──────────────┐
//! │  InMemoryRepository  │ │    SledRepository    │
//! │  RwLock'd arena      │ │  Storage (sled)      │
//! └──────────────────────┘ └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use fedreg_core::StreamTransaction;
//! use fedreg_storage::{RepositoryConfig, SledRepository, TransactionRepository};
//! use uuid::Uuid;
//!
//! let repo = SledRepository::open("./registry_data", RepositoryConfig::default()).unwrap();
//!
//! let stream = Uuid::new_v4();
//! repo.store(StreamTransaction::new(stream, 0, b"first".to_vec())).unwrap();
//!
//! if let Some(block) = repo.create_next_block().unwrap() {
//!     println!("next block {} covers {} transactions", block.hash(), block.transaction_hashes.len());
//! }
//! ```

pub mod block_size;
pub mod db;
pub mod memory;
pub mod persistent;
pub mod repository;

pub use block_size::{calculate_block_length, DEFAULT_MAX_EXPONENT};
pub use db::{BatchOp, Storage, StorageError};
pub use memory::InMemoryRepository;
pub use persistent::SledRepository;
pub use repository::{RepositoryConfig, RepositoryError, Result, TransactionRepository};
