//! Merkle inclusion proofs for finalized transactions.

use fedreg_core::{get_required_hashes, root_from_proof, Hash, TransactionHash};
use fedreg_storage::{RepositoryError, TransactionRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Proof that a transaction's payload is a leaf of its block's Merkle root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    pub transaction_hash: TransactionHash,
    pub block_hash: Hash,
    pub payload: Vec<u8>,
    /// Position of the transaction inside its block.
    pub leaf_index: usize,
    /// Sibling hashes in fold order.
    pub hashes: Vec<Hash>,
}

impl MerkleProof {
    /// Root this proof folds up to, if it is well formed.
    pub fn root(&self) -> Option<Hash> {
        root_from_proof(&self.payload, self.leaf_index, &self.hashes)
    }

    pub fn verify(&self, merkle_root: &Hash) -> bool {
        self.root().as_ref() == Some(merkle_root)
    }
}

pub struct EventProver {
    repository: Arc<dyn TransactionRepository>,
}

impl EventProver {
    pub fn new(repository: Arc<dyn TransactionRepository>) -> Self {
        Self { repository }
    }

    /// Inclusion proof for a transaction.
    ///
    /// `None` if the transaction is unknown, not yet batched, or its block is
    /// not finalized.
    pub fn get_merkle_proof(
        &self,
        transaction_hash: &TransactionHash,
    ) -> Result<Option<MerkleProof>, RepositoryError> {
        let Some(block) = self.repository.get_block(transaction_hash)? else {
            return Ok(None);
        };
        if !block.is_finalized() {
            return Ok(None);
        }

        let block_hash = block.hash();
        let transactions = self.repository.get_stream_transactions_for_block(&block_hash)?;
        let Some(leaf_index) = transactions
            .iter()
            .position(|tx| tx.transaction_hash == *transaction_hash)
        else {
            return Err(RepositoryError::Corrupted(format!(
                "block {block_hash} does not contain {transaction_hash}"
            )));
        };

        let payloads: Vec<&[u8]> = transactions.iter().map(|tx| tx.payload.as_slice()).collect();
        let hashes = get_required_hashes(&payloads, leaf_index)?;

        Ok(Some(MerkleProof {
            transaction_hash: *transaction_hash,
            block_hash,
            payload: transactions[leaf_index].payload.clone(),
            leaf_index,
            hashes,
        }))
    }
}
