//! The transaction repository contract shared by every backend.

use crate::block_size::DEFAULT_MAX_EXPONENT;
use crate::db::StorageError;
use fedreg_core::{
    calculate_merkle_root, Block, BlockEntry, BlockHash, BlockHeader, BlockPublication, Hash,
    MerkleError, NewBlock, StreamTransaction, TransactionHash, TransactionStatus,
};
use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("transaction on stream {stream_id} has index {actual}, expected {expected}")]
    OutOfOrder {
        stream_id: Uuid,
        expected: u64,
        actual: u64,
    },

    #[error("transaction {0} already stored")]
    DuplicateTransaction(TransactionHash),

    #[error("block {block_hash} not found or already finalized")]
    BlockState { block_hash: BlockHash },

    #[error("block not found: {0}")]
    UnknownBlock(BlockHash),

    #[error("merkle error: {0}")]
    Merkle(#[from] MerkleError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("corrupted ledger: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    /// Blocks hold at most `2^max_block_exponent` transactions.
    pub max_block_exponent: u32,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            max_block_exponent: DEFAULT_MAX_EXPONENT,
        }
    }
}

/// Authoritative store of stream transactions and blocks.
///
/// Mutations (`store`, `create_next_block`, `finalize_block`) are serialized
/// per repository instance; reads may run concurrently with them.
pub trait TransactionRepository: Send + Sync {
    /// Append a transaction at the next global position.
    ///
    /// Fails with [`RepositoryError::OutOfOrder`] unless `stream_index` is
    /// exactly the next index of its stream.
    fn store(&self, transaction: StreamTransaction) -> Result<()>;

    /// `Unknown` if not stored, `Finalized` once covered by a published block,
    /// `Committed` otherwise.
    fn get_transaction_status(&self, transaction_hash: &TransactionHash) -> Result<TransactionStatus>;

    /// All transactions of a stream, in index order.
    fn get_stream_transactions_for_stream(&self, stream_id: Uuid) -> Result<Vec<StreamTransaction>>;

    /// The block covering a transaction, if any.
    fn get_block(&self, transaction_hash: &TransactionHash) -> Result<Option<Block>>;

    /// A page of blocks in chain order.
    fn get_blocks(&self, skip: usize, take: usize, include_transactions: bool) -> Result<Vec<BlockEntry>>;

    /// Transactions in a block's range, in global append order.
    fn get_stream_transactions_for_block(&self, block_hash: &BlockHash) -> Result<Vec<StreamTransaction>>;

    /// Propose the next block.
    ///
    /// An unfinalized latest block is re-offered unchanged, so a stalled
    /// finalization round can be retried without creating a second block.
    /// Returns `None` when no transactions are waiting.
    fn create_next_block(&self) -> Result<Option<NewBlock>>;

    /// Record the publication of an unfinalized block.
    fn finalize_block(&self, block_hash: &BlockHash, publication: BlockPublication) -> Result<()>;
}

/// Build the header of a block over `batch`, chained to `previous`.
///
/// The previous block must be finalized: its publication hash is part of the
/// new header.
pub(crate) fn chain_header(previous: Option<&Block>, batch: &[StreamTransaction]) -> Result<BlockHeader> {
    let payloads: Vec<&[u8]> = batch.iter().map(|tx| tx.payload.as_slice()).collect();
    let merkle_root_hash = calculate_merkle_root(&payloads)?;

    let (previous_header_hash, previous_publication_hash) = match previous {
        None => (Hash::ZERO, Hash::ZERO),
        Some(block) => {
            let publication = block
                .publication
                .as_ref()
                .ok_or(RepositoryError::BlockState {
                    block_hash: block.hash(),
                })?;
            (block.hash(), publication.hash())
        }
    };

    Ok(BlockHeader::new(
        previous_header_hash,
        previous_publication_hash,
        merkle_root_hash,
    ))
}

/// Proposal for an existing block record.
pub(crate) fn new_block(block: &Block, transactions: &[StreamTransaction]) -> NewBlock {
    NewBlock {
        header: block.header.clone(),
        transaction_hashes: transactions.iter().map(|tx| tx.transaction_hash).collect(),
    }
}

/// Shared behavioural checks run against every backend.
#[cfg(test)]
pub(crate) mod suite {
    use super::*;

    pub fn tx(stream_id: Uuid, index: u64) -> StreamTransaction {
        StreamTransaction::new(stream_id, index, format!("{stream_id}/{index}").into_bytes())
    }

    pub fn log_publication(block: &NewBlock) -> BlockPublication {
        BlockPublication::LogEntry {
            block_header_hash: block.hash(),
        }
    }

    fn publish_next(repo: &dyn TransactionRepository) -> NewBlock {
        let block = repo.create_next_block().unwrap().unwrap();
        repo.finalize_block(&block.hash(), log_publication(&block)).unwrap();
        block
    }

    pub fn store_accepts_contiguous_indices(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        for index in 0..5 {
            repo.store(tx(stream, index)).unwrap();
        }

        let stored = repo.get_stream_transactions_for_stream(stream).unwrap();
        let indices: Vec<u64> = stored.iter().map(|t| t.stream_index).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    pub fn store_rejects_gap_and_duplicate_index(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();

        let err = repo.store(tx(stream, 1)).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::OutOfOrder { expected: 0, actual: 1, .. }
        ));

        repo.store(tx(stream, 0)).unwrap();
        let duplicate = StreamTransaction::new(stream, 0, b"different payload".to_vec());
        let err = repo.store(duplicate).unwrap_err();
        assert!(matches!(
            err,
            RepositoryError::OutOfOrder { expected: 1, actual: 0, .. }
        ));

        assert_eq!(repo.get_stream_transactions_for_stream(stream).unwrap().len(), 1);
    }

    pub fn store_rejects_duplicate_hash(repo: &dyn TransactionRepository) {
        let first = StreamTransaction::new(Uuid::new_v4(), 0, b"same".to_vec());
        let second = StreamTransaction::new(Uuid::new_v4(), 0, b"same".to_vec());

        repo.store(first).unwrap();
        let err = repo.store(second).unwrap_err();
        assert!(matches!(err, RepositoryError::DuplicateTransaction(_)));
    }

    pub fn streams_are_independent(repo: &dyn TransactionRepository) {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        repo.store(tx(a, 0)).unwrap();
        repo.store(tx(b, 0)).unwrap();
        repo.store(tx(a, 1)).unwrap();
        repo.store(tx(b, 1)).unwrap();

        let a_txs = repo.get_stream_transactions_for_stream(a).unwrap();
        assert_eq!(a_txs, vec![tx(a, 0), tx(a, 1)]);
        assert!(repo.get_stream_transactions_for_stream(Uuid::new_v4()).unwrap().is_empty());
    }

    pub fn status_progression(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        let first = tx(stream, 0);

        assert_eq!(
            repo.get_transaction_status(&first.transaction_hash).unwrap(),
            TransactionStatus::Unknown
        );

        repo.store(first.clone()).unwrap();
        assert_eq!(
            repo.get_transaction_status(&first.transaction_hash).unwrap(),
            TransactionStatus::Committed
        );

        let block = repo.create_next_block().unwrap().unwrap();
        assert_eq!(
            repo.get_transaction_status(&first.transaction_hash).unwrap(),
            TransactionStatus::Committed
        );

        repo.finalize_block(&block.hash(), log_publication(&block)).unwrap();
        assert_eq!(
            repo.get_transaction_status(&first.transaction_hash).unwrap(),
            TransactionStatus::Finalized
        );
    }

    pub fn no_block_when_empty(repo: &dyn TransactionRepository) {
        assert!(repo.create_next_block().unwrap().is_none());

        repo.store(tx(Uuid::new_v4(), 0)).unwrap();
        publish_next(repo);
        assert!(repo.create_next_block().unwrap().is_none());
    }

    pub fn four_transactions_make_one_block(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        let txs: Vec<_> = (0..4).map(|i| tx(stream, i)).collect();
        for t in &txs {
            repo.store(t.clone()).unwrap();
        }

        let block = repo.create_next_block().unwrap().unwrap();
        let expected: Vec<_> = txs.iter().map(|t| t.transaction_hash).collect();
        assert_eq!(block.transaction_hashes, expected);
        assert!(block.header.is_genesis());

        let payloads: Vec<&[u8]> = txs.iter().map(|t| t.payload.as_slice()).collect();
        assert_eq!(
            block.header.merkle_root_hash,
            calculate_merkle_root(&payloads).unwrap()
        );

        repo.finalize_block(&block.hash(), log_publication(&block)).unwrap();
        for t in &txs {
            assert_eq!(
                repo.get_transaction_status(&t.transaction_hash).unwrap(),
                TransactionStatus::Finalized
            );
        }
    }

    pub fn block_length_rounds_down(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        for i in 0..7 {
            repo.store(tx(stream, i)).unwrap();
        }

        assert_eq!(publish_next(repo).transaction_hashes.len(), 4);
        assert_eq!(publish_next(repo).transaction_hashes.len(), 2);
        assert_eq!(publish_next(repo).transaction_hashes.len(), 1);
        assert!(repo.create_next_block().unwrap().is_none());
    }

    pub fn block_length_respects_cap(repo: &dyn TransactionRepository) {
        // Expects a repository configured with max_block_exponent = 1.
        let stream = Uuid::new_v4();
        for i in 0..5 {
            repo.store(tx(stream, i)).unwrap();
        }
        assert_eq!(publish_next(repo).transaction_hashes.len(), 2);
        assert_eq!(publish_next(repo).transaction_hashes.len(), 2);
        assert_eq!(publish_next(repo).transaction_hashes.len(), 1);
    }

    pub fn create_next_block_is_idempotent(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        for i in 0..3 {
            repo.store(tx(stream, i)).unwrap();
        }

        let first = repo.create_next_block().unwrap().unwrap();
        // New arrivals must not change the re-offered block.
        repo.store(tx(stream, 3)).unwrap();
        let second = repo.create_next_block().unwrap().unwrap();

        assert_eq!(first, second);
        assert_eq!(first.transaction_hashes.len(), 2);
        assert_eq!(repo.get_blocks(0, 10, false).unwrap().len(), 1);
    }

    pub fn blocks_chain_and_ranges_are_contiguous(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        let mut next_index = 0;
        let mut published = Vec::new();

        for batch in [3u64, 1, 6, 2] {
            for _ in 0..batch {
                repo.store(tx(stream, next_index)).unwrap();
                next_index += 1;
            }
            while let Some(block) = repo.create_next_block().unwrap() {
                repo.finalize_block(&block.hash(), log_publication(&block)).unwrap();
                published.push(block);
            }
        }

        let entries = repo.get_blocks(0, 100, false).unwrap();
        assert_eq!(entries.len(), published.len());

        let mut expected_from = 0;
        let mut previous: Option<&Block> = None;
        for (i, entry) in entries.iter().enumerate() {
            let block = &entry.block;
            assert_eq!(entry.height, i as u64 + 1);
            assert_eq!(block.from_transaction, expected_from);
            assert!(block.transaction_count().is_power_of_two());
            assert!(block.is_finalized());
            assert_eq!(block.header, published[i].header);

            match previous {
                None => assert!(block.header.is_genesis()),
                Some(prev) => {
                    assert_eq!(block.header.previous_header_hash, prev.hash());
                    assert_eq!(
                        block.header.previous_publication_hash,
                        prev.publication.as_ref().unwrap().hash()
                    );
                }
            }

            expected_from = block.to_transaction + 1;
            previous = Some(block);
        }
        assert_eq!(expected_from, next_index);
    }

    pub fn finalize_rejects_unknown_and_repeated(repo: &dyn TransactionRepository) {
        let unknown = Hash([7u8; 32]);
        let err = repo
            .finalize_block(&unknown, BlockPublication::LogEntry { block_header_hash: unknown })
            .unwrap_err();
        assert!(matches!(err, RepositoryError::BlockState { .. }));

        repo.store(tx(Uuid::new_v4(), 0)).unwrap();
        let block = publish_next(repo);
        let err = repo
            .finalize_block(&block.hash(), log_publication(&block))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::BlockState { .. }));
    }

    pub fn block_lookups(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        let txs: Vec<_> = (0..3).map(|i| tx(stream, i)).collect();
        for t in &txs {
            repo.store(t.clone()).unwrap();
        }

        assert!(repo.get_block(&txs[0].transaction_hash).unwrap().is_none());

        let block = publish_next(repo);
        let found = repo.get_block(&txs[1].transaction_hash).unwrap().unwrap();
        assert_eq!(found.hash(), block.hash());
        assert!(found.is_finalized());
        assert!(repo.get_block(&txs[2].transaction_hash).unwrap().is_none());

        let in_block = repo.get_stream_transactions_for_block(&block.hash()).unwrap();
        assert_eq!(in_block, txs[..2].to_vec());

        let err = repo
            .get_stream_transactions_for_block(&Hash([9u8; 32]))
            .unwrap_err();
        assert!(matches!(err, RepositoryError::UnknownBlock(_)));
    }

    pub fn block_pages(repo: &dyn TransactionRepository) {
        let stream = Uuid::new_v4();
        for i in 0..3 {
            repo.store(tx(stream, i)).unwrap();
        }
        publish_next(repo);
        publish_next(repo);

        let page = repo.get_blocks(1, 5, true).unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].height, 2);
        assert_eq!(page[0].transactions, vec![tx(stream, 2)]);

        let without = repo.get_blocks(0, 1, false).unwrap();
        assert_eq!(without.len(), 1);
        assert!(without[0].transactions.is_empty());
    }

    /// Writers on separate threads each fill their own stream.
    pub fn concurrent_writers_keep_streams_ordered(repo: &dyn TransactionRepository) {
        let streams: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();

        std::thread::scope(|scope| {
            for &stream in &streams {
                scope.spawn(move || {
                    for index in 0..50 {
                        repo.store(tx(stream, index)).unwrap();
                    }
                });
            }
        });

        for stream in streams {
            let indices: Vec<u64> = repo
                .get_stream_transactions_for_stream(stream)
                .unwrap()
                .iter()
                .map(|t| t.stream_index)
                .collect();
            assert_eq!(indices, (0..50).collect::<Vec<_>>());
        }

        // Positions are dense: the backlog drains as 128 + 64 + 8.
        let mut sizes = Vec::new();
        while let Some(block) = repo.create_next_block().unwrap() {
            sizes.push(block.transaction_hashes.len());
            repo.finalize_block(&block.hash(), log_publication(&block)).unwrap();
        }
        assert_eq!(sizes, vec![128, 64, 8]);
    }
}

