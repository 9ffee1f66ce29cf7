//! sled-backed transaction repository.

use crate::block_size::calculate_block_length;
use crate::db::{BatchOp, Storage, BLOCK_RANGE_PREFIX};
use crate::repository::{
    chain_header, new_block, RepositoryConfig, RepositoryError, Result, TransactionRepository,
};
use fedreg_core::{
    Block, BlockEntry, BlockHash, BlockPublication, NewBlock, StreamTransaction, TransactionHash,
    TransactionStatus,
};
use parking_lot::Mutex;
use std::path::Path;
use tracing::{debug, info};
use uuid::Uuid;

/// Number of stored transactions; also the next global position.
const TRANSACTION_COUNT_KEY: &[u8] = b"meta:transaction_count";

/// Transaction repository persisted in a sled database.
///
/// Layout:
/// - `tx:pos:{position}` → transaction
/// - `tx:hash:{hash}` → position
/// - `stream:{stream_id}{index}` → position
/// - `block:range:{to_transaction}` → block
/// - `block:hash:{hash}` → `to_transaction`
pub struct SledRepository {
    storage: Storage,
    config: RepositoryConfig,
    /// Serializes mutations; sled batches alone don't guard read-then-write.
    writer: Mutex<()>,
}

impl SledRepository {
    /// Open (or create) a repository at `path`.
    pub fn open<P: AsRef<Path>>(path: P, config: RepositoryConfig) -> Result<Self> {
        Ok(Self::with_storage(Storage::open(path)?, config))
    }

    /// Open a repository backed by a temporary database.
    pub fn temporary(config: RepositoryConfig) -> Result<Self> {
        Ok(Self::with_storage(Storage::open_temporary()?, config))
    }

    pub fn with_storage(storage: Storage, config: RepositoryConfig) -> Self {
        Self {
            storage,
            config,
            writer: Mutex::new(()),
        }
    }

    /// Number of stored transactions.
    pub fn transaction_count(&self) -> Result<u64> {
        Ok(self
            .storage
            .get::<_, u64>(TRANSACTION_COUNT_KEY)?
            .unwrap_or(0))
    }

    fn next_stream_index(&self, stream_id: &Uuid) -> Result<u64> {
        match self.storage.last_key(&Storage::stream_prefix(stream_id))? {
            Some(key) => Ok(Storage::decode_u64_suffix(&key)? + 1),
            None => Ok(0),
        }
    }

    fn transaction_at(&self, position: u64) -> Result<StreamTransaction> {
        self.storage
            .get(Storage::transaction_key(position))?
            .ok_or_else(|| RepositoryError::Corrupted(format!("missing transaction at {position}")))
    }

    fn transactions_in(&self, block: &Block) -> Result<Vec<StreamTransaction>> {
        Ok(self.storage.range_values(
            &Storage::transaction_key(block.from_transaction),
            &Storage::transaction_key(block.to_transaction),
        )?)
    }

    fn block_covering(&self, position: u64) -> Result<Option<Block>> {
        let block: Option<Block> = self
            .storage
            .first_value_from(BLOCK_RANGE_PREFIX, &Storage::block_range_key(position))?;
        Ok(block.filter(|b| b.contains(position)))
    }

    fn block_by_hash(&self, block_hash: &BlockHash) -> Result<Option<Block>> {
        let Some(to_transaction) = self
            .storage
            .get::<_, u64>(Storage::block_hash_key(block_hash))?
        else {
            return Ok(None);
        };

        self.storage
            .get(Storage::block_range_key(to_transaction))?
            .map(Some)
            .ok_or_else(|| RepositoryError::Corrupted(format!("block {block_hash} has no range entry")))
    }
}

impl TransactionRepository for SledRepository {
    fn store(&self, transaction: StreamTransaction) -> Result<()> {
        let _writer = self.writer.lock();

        let expected = self.next_stream_index(&transaction.stream_id)?;
        if transaction.stream_index != expected {
            return Err(RepositoryError::OutOfOrder {
                stream_id: transaction.stream_id,
                expected,
                actual: transaction.stream_index,
            });
        }

        let hash_key = Storage::transaction_hash_key(&transaction.transaction_hash);
        if self.storage.contains(&hash_key)? {
            return Err(RepositoryError::DuplicateTransaction(
                transaction.transaction_hash,
            ));
        }

        let position = self.transaction_count()?;
        self.storage.batch(vec![
            BatchOp::insert(Storage::transaction_key(position), &transaction)?,
            BatchOp::insert(hash_key, &position)?,
            BatchOp::insert(
                Storage::stream_key(&transaction.stream_id, transaction.stream_index),
                &position,
            )?,
            BatchOp::insert(TRANSACTION_COUNT_KEY, &(position + 1))?,
        ])?;
        self.storage.flush()?;

        debug!(
            stream_id = %transaction.stream_id,
            stream_index = transaction.stream_index,
            position,
            "Stored transaction"
        );
        Ok(())
    }

    fn get_transaction_status(&self, transaction_hash: &TransactionHash) -> Result<TransactionStatus> {
        let Some(position) = self
            .storage
            .get::<_, u64>(Storage::transaction_hash_key(transaction_hash))?
        else {
            return Ok(TransactionStatus::Unknown);
        };

        match self.block_covering(position)? {
            Some(block) if block.is_finalized() => Ok(TransactionStatus::Finalized),
            _ => Ok(TransactionStatus::Committed),
        }
    }

    fn get_stream_transactions_for_stream(&self, stream_id: Uuid) -> Result<Vec<StreamTransaction>> {
        let positions: Vec<u64> =
            self.storage
                .prefix_values(&Storage::stream_prefix(&stream_id), 0, usize::MAX)?;

        positions
            .into_iter()
            .map(|position| self.transaction_at(position))
            .collect()
    }

    fn get_block(&self, transaction_hash: &TransactionHash) -> Result<Option<Block>> {
        match self
            .storage
            .get::<_, u64>(Storage::transaction_hash_key(transaction_hash))?
        {
            Some(position) => self.block_covering(position),
            None => Ok(None),
        }
    }

    fn get_blocks(&self, skip: usize, take: usize, include_transactions: bool) -> Result<Vec<BlockEntry>> {
        let blocks: Vec<Block> = self.storage.prefix_values(BLOCK_RANGE_PREFIX, skip, take)?;

        blocks
            .into_iter()
            .enumerate()
            .map(|(i, block)| {
                let transactions = if include_transactions {
                    self.transactions_in(&block)?
                } else {
                    Vec::new()
                };
                Ok(BlockEntry {
                    height: (skip + i) as u64 + 1,
                    block,
                    transactions,
                })
            })
            .collect()
    }

    fn get_stream_transactions_for_block(&self, block_hash: &BlockHash) -> Result<Vec<StreamTransaction>> {
        let block = self
            .block_by_hash(block_hash)?
            .ok_or(RepositoryError::UnknownBlock(*block_hash))?;
        self.transactions_in(&block)
    }

    fn create_next_block(&self) -> Result<Option<NewBlock>> {
        let _writer = self.writer.lock();

        let previous: Option<Block> = self.storage.last_value(BLOCK_RANGE_PREFIX)?;
        if let Some(block) = previous.as_ref().filter(|b| !b.is_finalized()) {
            debug!(block_hash = %block.hash(), "Re-offering unfinalized block");
            let transactions = self.transactions_in(block)?;
            return Ok(Some(new_block(block, &transactions)));
        }

        let from = previous.as_ref().map_or(0, |b| b.to_transaction + 1);
        let total = self.transaction_count()?;
        if total <= from {
            return Ok(None);
        }

        let length = calculate_block_length(total - from, self.config.max_block_exponent);
        let to = from + length - 1;
        let batch: Vec<StreamTransaction> = self
            .storage
            .range_values(&Storage::transaction_key(from), &Storage::transaction_key(to))?;
        if batch.len() as u64 != length {
            return Err(RepositoryError::Corrupted(format!(
                "expected {length} transactions in [{from}, {to}], found {}",
                batch.len()
            )));
        }

        let header = chain_header(previous.as_ref(), &batch)?;
        let block = Block::pending(header, from, to);
        let proposal = new_block(&block, &batch);

        self.storage.batch(vec![
            BatchOp::insert(Storage::block_range_key(to), &block)?,
            BatchOp::insert(Storage::block_hash_key(&proposal.hash()), &to)?,
        ])?;
        self.storage.flush()?;

        info!(
            block_hash = %proposal.hash(),
            from_transaction = from,
            to_transaction = to,
            "Created block"
        );
        Ok(Some(proposal))
    }

    fn finalize_block(&self, block_hash: &BlockHash, publication: BlockPublication) -> Result<()> {
        let _writer = self.writer.lock();

        let mut block = self
            .block_by_hash(block_hash)?
            .filter(|block| !block.is_finalized())
            .ok_or(RepositoryError::BlockState {
                block_hash: *block_hash,
            })?;

        block.publication = Some(publication);
        self.storage
            .put(Storage::block_range_key(block.to_transaction), &block)?;
        self.storage.flush()?;

        info!(block_hash = %block_hash, "Finalized block");
        Ok(())
    }
}
