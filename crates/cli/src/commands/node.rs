//! Finalizer commands.

use super::{status_service, StoreArgs};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use fedreg_chain::{BlockFinalizer, BlockFinalizerService, FinalizerConfig, LogPublisher};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::info;

#[derive(Args)]
pub struct RunArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Milliseconds between finalization ticks
    #[arg(long, default_value = "5000", value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,

    /// Lifetime of status cache entries in seconds
    #[arg(long, default_value = "3600")]
    cache_ttl_secs: u64,

    /// Serve Prometheus metrics on this address
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[derive(Args)]
pub struct FinalizeArgs {
    #[command(flatten)]
    store: StoreArgs,
}

pub async fn run(args: RunArgs) -> Result<()> {
    if let Some(addr) = args.metrics_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!(%addr, "Serving metrics");
    }

    let repository = args.store.open()?;
    let status = status_service(repository.clone(), Duration::from_secs(args.cache_ttl_secs));
    let finalizer = BlockFinalizer::new(repository, Arc::new(LogPublisher::new()), status);
    let config = FinalizerConfig {
        interval: Duration::from_millis(args.interval_ms),
    };

    println!("{}", "Starting block finalizer...".bold().cyan());
    println!("  Data dir: {}", args.store.data_dir.display().to_string().bright_black());
    println!("  Interval: {}", format!("{} ms", args.interval_ms).bright_cyan());
    println!();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service = tokio::spawn(BlockFinalizerService::new(finalizer, config).run(shutdown_rx));

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");
    let _ = shutdown_tx.send(true);
    service.await.context("Finalizer task panicked")?;

    println!("{}  Finalizer stopped", "✓".green().bold());
    Ok(())
}

pub async fn finalize(args: FinalizeArgs) -> Result<()> {
    let repository = args.store.open()?;
    let status = status_service(repository.clone(), Duration::from_secs(60));
    let finalizer = BlockFinalizer::new(repository, Arc::new(LogPublisher::new()), status);

    match finalizer.execute().await? {
        Some(block) => {
            println!("{}  Block finalized", "✓".green().bold());
            println!("    Hash: {}", block.block_hash.to_hex().bright_yellow());
            println!("    Txs:  {}", block.transaction_count.to_string().bright_cyan());
        }
        None => println!("{}", "No transactions waiting.".bright_black()),
    }
    Ok(())
}
