//! Publishing block headers to an immutable log.

use async_trait::async_trait;
use fedreg_core::{BlockHeader, BlockPublication};
use thiserror::Error;
use tracing::info;

/// Errors that can occur while publishing a block.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("immutable log unavailable: {0}")]
    Unavailable(String),

    #[error("publication rejected: {0}")]
    Rejected(String),
}

/// An immutable log block headers are anchored in.
#[async_trait]
pub trait BlockPublisher: Send + Sync {
    /// Publish a header and return the receipt.
    async fn publish_block(&self, header: &BlockHeader) -> Result<BlockPublication, PublishError>;
}

/// Publisher that only writes the header hash to the log output.
///
/// Offers no tamper evidence; meant for local runs and tests.
#[derive(Debug, Default, Clone)]
pub struct LogPublisher;

impl LogPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl BlockPublisher for LogPublisher {
    async fn publish_block(&self, header: &BlockHeader) -> Result<BlockPublication, PublishError> {
        let block_header_hash = header.hash();
        info!(
            block_hash = %block_header_hash,
            merkle_root = %header.merkle_root_hash,
            "Published block header"
        );
        Ok(BlockPublication::LogEntry { block_header_hash })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedreg_core::{hash, Hash};

    #[tokio::test]
    async fn test_log_publisher_returns_header_hash() {
        let header = BlockHeader::new(Hash::ZERO, Hash::ZERO, hash(b"root"));
        let publication = LogPublisher::new().publish_block(&header).await.unwrap();

        assert_eq!(
            publication,
            BlockPublication::LogEntry {
                block_header_hash: header.hash()
            }
        );
    }
}
