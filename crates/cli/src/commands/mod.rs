//! CLI commands module.

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use fedreg_chain::{CachedStatusService, MemoryStatusStore, StatusCacheConfig, TransactionStatusService};
use fedreg_core::Hash;
use fedreg_storage::{RepositoryConfig, SledRepository, TransactionRepository, DEFAULT_MAX_EXPONENT};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

mod block;
mod node;
mod tx;

#[derive(Subcommand)]
pub enum Commands {
    /// Run the block finalizer until interrupted
    Run(node::RunArgs),
    /// Run a single finalization step
    Finalize(node::FinalizeArgs),
    /// Store a transaction
    Submit(tx::SubmitArgs),
    /// Show the status of a transaction
    Status(tx::StatusArgs),
    /// List the transactions of a stream
    Stream(tx::StreamArgs),
    /// Print the Merkle proof of a finalized transaction
    Prove(tx::ProveArgs),
    /// List blocks
    Blocks(block::BlocksArgs),
}

pub async fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Run(args) => node::run(args).await,
        Commands::Finalize(args) => node::finalize(args).await,
        Commands::Submit(args) => tx::submit(args).await,
        Commands::Status(args) => tx::status(args).await,
        Commands::Stream(args) => tx::stream(args),
        Commands::Prove(args) => tx::prove(args),
        Commands::Blocks(args) => block::run(args),
    }
}

/// Options locating and configuring the repository.
#[derive(Args, Clone)]
pub struct StoreArgs {
    /// Directory holding registry data
    #[arg(short, long, default_value = "./data")]
    data_dir: PathBuf,

    /// Blocks hold at most 2^N transactions
    #[arg(long, default_value_t = DEFAULT_MAX_EXPONENT)]
    max_block_exponent: u32,
}

impl StoreArgs {
    fn open(&self) -> Result<Arc<dyn TransactionRepository>> {
        let config = RepositoryConfig {
            max_block_exponent: self.max_block_exponent,
        };
        let repository = SledRepository::open(&self.data_dir, config).with_context(|| {
            format!("Failed to open registry data at {}", self.data_dir.display())
        })?;
        Ok(Arc::new(repository))
    }
}

/// Status service over the repository with an in-process cache.
fn status_service(
    repository: Arc<dyn TransactionRepository>,
    ttl: Duration,
) -> Arc<dyn TransactionStatusService> {
    let config = StatusCacheConfig {
        ttl,
        ..StatusCacheConfig::default()
    };
    Arc::new(CachedStatusService::new(
        MemoryStatusStore::new(config.capacity),
        repository,
        config.ttl,
    ))
}

fn parse_hash(value: &str) -> Result<Hash> {
    Hash::from_hex(value).with_context(|| format!("Invalid hash: {}", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_hash_accepts_prefix() {
        let hash = fedreg_core::hash(b"x");
        assert_eq!(parse_hash(&hash.to_hex()).unwrap(), hash);
        assert_eq!(parse_hash(&format!("0x{}", hash.to_hex())).unwrap(), hash);
        assert!(parse_hash("zz").is_err());
    }

    #[test]
    fn test_store_args_open_repository() {
        let dir = TempDir::new().unwrap();
        let args = StoreArgs {
            data_dir: dir.path().join("registry"),
            max_block_exponent: 4,
        };

        let repository = args.open().unwrap();
        assert!(repository.create_next_block().unwrap().is_none());
    }
}
