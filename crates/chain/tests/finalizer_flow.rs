use async_trait::async_trait;
use fedreg_chain::{
    BlockFinalizer, BlockPublisher, CachedStatusService, EventProver, FinalizerError, LogPublisher,
    MemoryStatusStore, PublishError, StatusCacheConfig, TransactionProcessor,
    TransactionStatusService,
};
use fedreg_core::{BlockHeader, BlockPublication, StreamTransaction, TransactionStatus};
use fedreg_storage::{InMemoryRepository, RepositoryConfig, SledRepository, TransactionRepository};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use uuid::Uuid;

fn status_service(repository: Arc<dyn TransactionRepository>) -> Arc<dyn TransactionStatusService> {
    let config = StatusCacheConfig::default();
    Arc::new(CachedStatusService::new(
        MemoryStatusStore::new(config.capacity),
        repository,
        config.ttl,
    ))
}

fn events(count: u64) -> Vec<StreamTransaction> {
    let stream = Uuid::new_v4();
    (0..count)
        .map(|i| StreamTransaction::new(stream, i, format!("certificate-event-{i}").into_bytes()))
        .collect()
}

async fn store_finalize_prove(repository: Arc<dyn TransactionRepository>) {
    let status = status_service(repository.clone());
    let processor = TransactionProcessor::new(repository.clone(), status.clone());
    let finalizer = BlockFinalizer::new(
        repository.clone(),
        Arc::new(LogPublisher::new()),
        status.clone(),
    );

    let txs = events(4);
    for tx in &txs {
        processor.mark_pending(&tx.transaction_hash).await;
        processor.process(tx.clone()).await.unwrap();
    }
    for tx in &txs {
        assert_eq!(
            status.get_transaction_status(&tx.transaction_hash).await.status,
            TransactionStatus::Committed
        );
    }

    let finalized = finalizer.execute().await.unwrap().unwrap();
    assert_eq!(finalized.transaction_count, 4);
    for tx in &txs {
        assert_eq!(
            status.get_transaction_status(&tx.transaction_hash).await.status,
            TransactionStatus::Finalized
        );
    }

    let proof = EventProver::new(repository.clone())
        .get_merkle_proof(&txs[2].transaction_hash)
        .unwrap()
        .unwrap();
    let block = repository.get_block(&txs[2].transaction_hash).unwrap().unwrap();
    assert_eq!(proof.hashes.len(), 2);
    assert_eq!(proof.block_hash, finalized.block_hash);
    assert!(proof.verify(&block.header.merkle_root_hash));
}

#[tokio::test]
async fn test_end_to_end_in_memory() {
    store_finalize_prove(Arc::new(InMemoryRepository::new())).await;
}

#[tokio::test]
async fn test_end_to_end_sled() {
    let repository = SledRepository::temporary(RepositoryConfig::default()).unwrap();
    store_finalize_prove(Arc::new(repository)).await;
}

/// Publisher that fails its first `failures` calls.
struct FlakyPublisher {
    failures: AtomicUsize,
    published: AtomicUsize,
}

#[async_trait]
impl BlockPublisher for FlakyPublisher {
    async fn publish_block(&self, header: &BlockHeader) -> Result<BlockPublication, PublishError> {
        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(PublishError::Unavailable("log offline".into()));
        }
        self.published.fetch_add(1, Ordering::SeqCst);
        Ok(BlockPublication::LogEntry {
            block_header_hash: header.hash(),
        })
    }
}

#[tokio::test]
async fn test_failed_publish_retries_same_block() {
    let repository: Arc<dyn TransactionRepository> = Arc::new(InMemoryRepository::new());
    let status = status_service(repository.clone());
    let publisher = Arc::new(FlakyPublisher {
        failures: AtomicUsize::new(1),
        published: AtomicUsize::new(0),
    });
    let finalizer = BlockFinalizer::new(repository.clone(), publisher.clone(), status.clone());

    let txs = events(3);
    for tx in &txs {
        repository.store(tx.clone()).unwrap();
    }
    let proposed = repository.create_next_block().unwrap().unwrap();

    let err = finalizer.execute().await.unwrap_err();
    assert!(matches!(err, FinalizerError::Publish(_)));
    assert_eq!(
        status.get_transaction_status(&txs[0].transaction_hash).await.status,
        TransactionStatus::Committed
    );

    let finalized = finalizer.execute().await.unwrap().unwrap();
    assert_eq!(finalized.block_hash, proposed.hash());
    assert_eq!(publisher.published.load(Ordering::SeqCst), 1);
    assert_eq!(repository.get_blocks(0, 10, false).unwrap().len(), 1);

    // The remaining transaction goes into a second, chained block.
    let next = finalizer.execute().await.unwrap().unwrap();
    assert_eq!(next.transaction_count, 1);
    let blocks = repository.get_blocks(0, 10, false).unwrap();
    assert_eq!(blocks[1].block.header.previous_header_hash, blocks[0].block.hash());
}

#[tokio::test]
async fn test_status_never_regresses_after_finalization() {
    let repository: Arc<dyn TransactionRepository> = Arc::new(InMemoryRepository::new());
    let status = status_service(repository.clone());
    let processor = TransactionProcessor::new(repository.clone(), status.clone());
    let finalizer = BlockFinalizer::new(
        repository.clone(),
        Arc::new(LogPublisher::new()),
        status.clone(),
    );

    let tx = events(1).remove(0);
    processor.process(tx.clone()).await.unwrap();
    finalizer.execute().await.unwrap();

    // A late, stale ingestion update must not move the status back.
    processor.mark_pending(&tx.transaction_hash).await;
    assert_eq!(
        status.get_transaction_status(&tx.transaction_hash).await.status,
        TransactionStatus::Finalized
    );
}
