//! Transaction commands.

use super::{parse_hash, status_service, StoreArgs};
use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use fedreg_chain::{EventProver, TransactionProcessor};
use fedreg_core::{StreamTransaction, TransactionStatus};
use std::time::Duration;
use uuid::Uuid;

#[derive(Args)]
pub struct SubmitArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Stream the transaction belongs to
    #[arg(long)]
    stream: Uuid,

    /// Position of the transaction in its stream
    #[arg(long)]
    index: u64,

    /// Payload bytes (hex format)
    #[arg(long)]
    payload: String,
}

#[derive(Args)]
pub struct StatusArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Transaction hash (hex format)
    transaction: String,
}

#[derive(Args)]
pub struct StreamArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Stream id
    stream: Uuid,
}

#[derive(Args)]
pub struct ProveArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Transaction hash (hex format)
    transaction: String,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub async fn submit(args: SubmitArgs) -> Result<()> {
    let payload = hex::decode(args.payload.trim_start_matches("0x")).context("Invalid payload hex")?;
    let transaction = StreamTransaction::new(args.stream, args.index, payload);
    let transaction_hash = transaction.transaction_hash;

    let repository = args.store.open()?;
    let status = status_service(repository.clone(), Duration::from_secs(60));
    let processor = TransactionProcessor::new(repository, status);

    processor.mark_pending(&transaction_hash).await;
    processor.process(transaction).await?;

    println!("{}  Transaction stored", "✓".green().bold());
    println!("    Hash:   {}", transaction_hash.to_hex().bright_yellow());
    println!("    Stream: {}", args.stream.to_string().bright_black());
    println!("    Index:  {}", args.index.to_string().bright_cyan());
    Ok(())
}

pub async fn status(args: StatusArgs) -> Result<()> {
    let transaction_hash = parse_hash(&args.transaction)?;
    let repository = args.store.open()?;
    let record = status_service(repository, Duration::from_secs(60))
        .get_transaction_status(&transaction_hash)
        .await;

    let label = record.status.to_string();
    let label = match record.status {
        TransactionStatus::Finalized => label.green().bold(),
        TransactionStatus::Committed => label.cyan(),
        TransactionStatus::Failed => label.red(),
        TransactionStatus::Pending | TransactionStatus::Unknown => label.bright_black(),
    };
    println!("{}  {}", transaction_hash.to_hex().bright_yellow(), label);
    if let Some(message) = record.message {
        println!("    {}", message);
    }
    Ok(())
}

pub fn stream(args: StreamArgs) -> Result<()> {
    let repository = args.store.open()?;
    let transactions = repository.get_stream_transactions_for_stream(args.stream)?;

    println!();
    println!("{}", format!("Stream {}:", args.stream).bold().cyan());
    println!();
    if transactions.is_empty() {
        println!("  {}", "(empty)".bright_black());
    }
    for tx in &transactions {
        println!(
            "  {} {} {}",
            format!("#{}", tx.stream_index).bright_black(),
            tx.transaction_hash.to_hex()[..16].bright_yellow(),
            format!("({} bytes)", tx.payload.len()).bright_black()
        );
    }
    println!();
    Ok(())
}

pub fn prove(args: ProveArgs) -> Result<()> {
    let transaction_hash = parse_hash(&args.transaction)?;
    let repository = args.store.open()?;

    let proof = EventProver::new(repository)
        .get_merkle_proof(&transaction_hash)?
        .context("No proof available: transaction unknown or not finalized yet")?;

    if args.json {
        let json = serde_json::json!({
            "transaction_hash": proof.transaction_hash.to_hex(),
            "block_hash": proof.block_hash.to_hex(),
            "payload": hex::encode(&proof.payload),
            "leaf_index": proof.leaf_index,
            "hashes": proof.hashes.iter().map(|h| h.to_hex()).collect::<Vec<_>>(),
        });
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!();
    println!("{}", "Merkle Proof:".bold().cyan());
    println!();
    println!("  Transaction: {}", proof.transaction_hash.to_hex().bright_yellow());
    println!("  Block:       {}", proof.block_hash.to_hex().bright_yellow());
    println!("  Leaf index:  {}", proof.leaf_index.to_string().bright_cyan());
    if let Some(root) = proof.root() {
        println!("  Root:        {}", root.to_hex().bright_black());
    }
    println!();
    for (i, hash) in proof.hashes.iter().enumerate() {
        println!(
            "  {} {}",
            format!("{}.", i + 1).bright_black(),
            hash.to_hex().bright_black()
        );
    }
    println!();
    Ok(())
}
