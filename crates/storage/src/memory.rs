//! In-memory transaction repository.
//!
//! Transactions live in an append-only arena indexed by global position,
//! with hash and per-stream indexes beside it. Everything sits behind one
//! `RwLock`: mutations take the write half, reads share the read half.

use crate::block_size::calculate_block_length;
use crate::repository::{
    chain_header, new_block, RepositoryConfig, RepositoryError, Result, TransactionRepository,
};
use fedreg_core::{
    Block, BlockEntry, BlockHash, BlockPublication, NewBlock, StreamTransaction, TransactionHash,
    TransactionStatus,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Default)]
struct Ledger {
    /// Transactions in global append order.
    transactions: Vec<StreamTransaction>,
    /// Global position by transaction hash.
    positions: HashMap<TransactionHash, usize>,
    /// Global positions of each stream, in index order.
    streams: HashMap<Uuid, Vec<usize>>,
    /// Blocks in range order.
    blocks: Vec<Block>,
    /// Index into `blocks` by block hash.
    block_index: HashMap<BlockHash, usize>,
}

impl Ledger {
    fn block_transactions(&self, block: &Block) -> &[StreamTransaction] {
        let from = block.from_transaction as usize;
        let to = block.to_transaction as usize;
        &self.transactions[from..=to]
    }

    fn block_covering(&self, position: usize) -> Option<&Block> {
        let position = position as u64;
        let index = self.blocks.partition_point(|b| b.to_transaction < position);
        self.blocks.get(index).filter(|b| b.contains(position))
    }
}

/// Transaction repository held entirely in memory.
pub struct InMemoryRepository {
    config: RepositoryConfig,
    ledger: RwLock<Ledger>,
}

impl InMemoryRepository {
    /// Create an empty repository with default configuration.
    pub fn new() -> Self {
        Self::with_config(RepositoryConfig::default())
    }

    pub fn with_config(config: RepositoryConfig) -> Self {
        Self {
            config,
            ledger: RwLock::new(Ledger::default()),
        }
    }

    /// Number of stored transactions.
    pub fn len(&self) -> usize {
        self.ledger.read().transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl TransactionRepository for InMemoryRepository {
    fn store(&self, transaction: StreamTransaction) -> Result<()> {
        let mut guard = self.ledger.write();
        let ledger = &mut *guard;

        let expected = ledger
            .streams
            .get(&transaction.stream_id)
            .map_or(0, |positions| positions.len() as u64);
        if transaction.stream_index != expected {
            return Err(RepositoryError::OutOfOrder {
                stream_id: transaction.stream_id,
                expected,
                actual: transaction.stream_index,
            });
        }

        if ledger.positions.contains_key(&transaction.transaction_hash) {
            return Err(RepositoryError::DuplicateTransaction(
                transaction.transaction_hash,
            ));
        }

        let position = ledger.transactions.len();
        ledger.positions.insert(transaction.transaction_hash, position);
        ledger
            .streams
            .entry(transaction.stream_id)
            .or_default()
            .push(position);

        debug!(
            stream_id = %transaction.stream_id,
            stream_index = transaction.stream_index,
            position,
            "Stored transaction"
        );
        ledger.transactions.push(transaction);
        Ok(())
    }

    fn get_transaction_status(&self, transaction_hash: &TransactionHash) -> Result<TransactionStatus> {
        let ledger = self.ledger.read();

        let Some(&position) = ledger.positions.get(transaction_hash) else {
            return Ok(TransactionStatus::Unknown);
        };

        match ledger.block_covering(position) {
            Some(block) if block.is_finalized() => Ok(TransactionStatus::Finalized),
            _ => Ok(TransactionStatus::Committed),
        }
    }

    fn get_stream_transactions_for_stream(&self, stream_id: Uuid) -> Result<Vec<StreamTransaction>> {
        let ledger = self.ledger.read();

        let transactions = ledger
            .streams
            .get(&stream_id)
            .map(|positions| {
                positions
                    .iter()
                    .map(|&position| ledger.transactions[position].clone())
                    .collect()
            })
            .unwrap_or_default();
        Ok(transactions)
    }

    fn get_block(&self, transaction_hash: &TransactionHash) -> Result<Option<Block>> {
        let ledger = self.ledger.read();

        Ok(ledger
            .positions
            .get(transaction_hash)
            .and_then(|&position| ledger.block_covering(position))
            .cloned())
    }

    fn get_blocks(&self, skip: usize, take: usize, include_transactions: bool) -> Result<Vec<BlockEntry>> {
        let ledger = self.ledger.read();

        let entries = ledger
            .blocks
            .iter()
            .enumerate()
            .skip(skip)
            .take(take)
            .map(|(index, block)| BlockEntry {
                height: index as u64 + 1,
                block: block.clone(),
                transactions: if include_transactions {
                    ledger.block_transactions(block).to_vec()
                } else {
                    Vec::new()
                },
            })
            .collect();
        Ok(entries)
    }

    fn get_stream_transactions_for_block(&self, block_hash: &BlockHash) -> Result<Vec<StreamTransaction>> {
        let ledger = self.ledger.read();

        let index = ledger
            .block_index
            .get(block_hash)
            .ok_or(RepositoryError::UnknownBlock(*block_hash))?;
        Ok(ledger.block_transactions(&ledger.blocks[*index]).to_vec())
    }

    fn create_next_block(&self) -> Result<Option<NewBlock>> {
        let mut guard = self.ledger.write();
        let ledger = &mut *guard;

        let previous = ledger.blocks.last();
        if let Some(block) = previous.filter(|b| !b.is_finalized()) {
            debug!(block_hash = %block.hash(), "Re-offering unfinalized block");
            return Ok(Some(new_block(block, ledger.block_transactions(block))));
        }

        let from = previous.map_or(0, |b| b.to_transaction + 1);
        let total = ledger.transactions.len() as u64;
        if total <= from {
            return Ok(None);
        }

        let length = calculate_block_length(total - from, self.config.max_block_exponent);
        let to = from + length - 1;
        let batch = &ledger.transactions[from as usize..=to as usize];

        let header = chain_header(previous, batch)?;
        let block = Block::pending(header, from, to);
        let proposal = new_block(&block, batch);

        info!(
            block_hash = %proposal.hash(),
            from_transaction = from,
            to_transaction = to,
            "Created block"
        );
        ledger.block_index.insert(proposal.hash(), ledger.blocks.len());
        ledger.blocks.push(block);

        Ok(Some(proposal))
    }

    fn finalize_block(&self, block_hash: &BlockHash, publication: BlockPublication) -> Result<()> {
        let mut guard = self.ledger.write();
        let ledger = &mut *guard;

        let block = ledger
            .block_index
            .get(block_hash)
            .map(|&index| &mut ledger.blocks[index])
            .filter(|block| !block.is_finalized())
            .ok_or(RepositoryError::BlockState {
                block_hash: *block_hash,
            })?;

        block.publication = Some(publication);
        info!(block_hash = %block_hash, "Finalized block");
        Ok(())
    }
}
