//! Blocks, block headers and publications.

use crate::hash::{hash, BlockHash, Hash, TransactionHash};
use crate::transaction::StreamTransaction;
use serde::{Deserialize, Serialize};

/// Header of a block; its hash is the block's identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Hash of the previous block's header (zero for genesis).
    pub previous_header_hash: Hash,
    /// Hash of the previous block's publication (zero for genesis).
    pub previous_publication_hash: Hash,
    /// Merkle root over the payloads of the block's transactions.
    pub merkle_root_hash: Hash,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
}

impl BlockHeader {
    /// Create a header stamped with the current time.
    pub fn new(previous_header_hash: Hash, previous_publication_hash: Hash, merkle_root_hash: Hash) -> Self {
        Self {
            previous_header_hash,
            previous_publication_hash,
            merkle_root_hash,
            created_at: Self::current_timestamp(),
        }
    }

    /// Calculate the hash of this block header.
    pub fn hash(&self) -> BlockHash {
        let encoded = bincode::serialize(self).expect("serialization should not fail");
        hash(&encoded)
    }

    pub fn is_genesis(&self) -> bool {
        self.previous_header_hash == Hash::ZERO && self.previous_publication_hash == Hash::ZERO
    }

    /// Current Unix timestamp in milliseconds.
    pub fn current_timestamp() -> i64 {
        chrono::Utc::now().timestamp_millis()
    }
}

/// Receipt from the immutable log a block header was anchored in.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockPublication {
    /// Written to a local log; no tamper evidence.
    LogEntry { block_header_hash: Hash },
    /// Registered on an external chain.
    External {
        transaction_id: Vec<u8>,
        block_hash: Vec<u8>,
    },
}

impl BlockPublication {
    /// Hash chained into the next block's `previous_publication_hash`.
    pub fn hash(&self) -> Hash {
        let encoded = bincode::serialize(self).expect("serialization should not fail");
        hash(&encoded)
    }
}

/// A block record: header, optional publication and the inclusive range of
/// global transaction positions it batches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub publication: Option<BlockPublication>,
    pub from_transaction: u64,
    pub to_transaction: u64,
}

impl Block {
    /// Create an unfinalized block over `[from_transaction, to_transaction]`.
    pub fn pending(header: BlockHeader, from_transaction: u64, to_transaction: u64) -> Self {
        Self {
            header,
            publication: None,
            from_transaction,
            to_transaction,
        }
    }

    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }

    pub fn is_finalized(&self) -> bool {
        self.publication.is_some()
    }

    /// Number of transactions in the block.
    pub fn transaction_count(&self) -> u64 {
        self.to_transaction - self.from_transaction + 1
    }

    /// Whether the global position falls inside this block's range.
    pub fn contains(&self, position: u64) -> bool {
        self.from_transaction <= position && position <= self.to_transaction
    }
}

/// A block proposed for publication, as handed to the finalizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewBlock {
    pub header: BlockHeader,
    pub transaction_hashes: Vec<TransactionHash>,
}

impl NewBlock {
    pub fn hash(&self) -> BlockHash {
        self.header.hash()
    }
}

/// One row of a block listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEntry {
    /// 1-based position of the block in the chain.
    pub height: u64,
    pub block: Block,
    /// Filled only when transactions were requested.
    pub transactions: Vec<StreamTransaction>,
}
