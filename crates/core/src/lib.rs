//! Core ledger primitives for the federated registry.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Hashing and the transaction/block identifiers
//! - Stream transactions
//! - Blocks, block headers and publications
//! - Transaction status values and their cache encoding
//! - The balanced Merkle engine used to batch and prove transactions

pub mod block;
pub mod hash;
pub mod merkle;
pub mod status;
pub mod transaction;

// Re-export commonly used types at the crate root
pub use block::{Block, BlockEntry, BlockHeader, BlockPublication, NewBlock};
pub use hash::{hash, hash_concat, BlockHash, Hash, TransactionHash};
pub use merkle::{
    calculate_merkle_root, get_required_hashes, root_from_proof, verify_proof, MerkleError,
};
pub use status::{RecordDecodeError, TransactionStatus, TransactionStatusRecord};
pub use transaction::StreamTransaction;
