//! Stream transactions: the unit appended to the ledger.

use crate::hash::{hash, TransactionHash};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An opaque signed transaction positioned within its stream.
///
/// The payload is never interpreted by the registry; it is only hashed,
/// batched and proven.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTransaction {
    /// Hash of the payload (wire bytes).
    pub transaction_hash: TransactionHash,
    /// Stream (aggregate) the transaction belongs to.
    pub stream_id: Uuid,
    /// Position within the stream, starting at 0.
    pub stream_index: u64,
    /// Wire bytes of the transaction.
    pub payload: Vec<u8>,
}

impl StreamTransaction {
    /// Create a transaction, deriving its hash from the payload.
    pub fn new(stream_id: Uuid, stream_index: u64, payload: Vec<u8>) -> Self {
        Self {
            transaction_hash: hash(&payload),
            stream_id,
            stream_index,
            payload,
        }
    }

    /// Check that the stored hash matches the payload.
    pub fn has_valid_hash(&self) -> bool {
        hash(&self.payload) == self.transaction_hash
    }
}
