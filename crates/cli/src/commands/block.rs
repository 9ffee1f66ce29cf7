//! Block listing command.

use super::StoreArgs;
use anyhow::Result;
use clap::Args;
use colored::Colorize;
use fedreg_core::{BlockEntry, BlockPublication};

#[derive(Args)]
pub struct BlocksArgs {
    #[command(flatten)]
    store: StoreArgs,

    /// Number of blocks to skip
    #[arg(long, default_value = "0")]
    skip: usize,

    /// Number of blocks to show
    #[arg(long, default_value = "10")]
    take: usize,

    /// Include each block's transactions
    #[arg(long)]
    transactions: bool,

    /// Print as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: BlocksArgs) -> Result<()> {
    let repository = args.store.open()?;
    let entries = repository.get_blocks(args.skip, args.take, args.transactions)?;

    if args.json {
        let json: Vec<_> = entries.iter().map(entry_json).collect();
        println!("{}", serde_json::to_string_pretty(&json)?);
        return Ok(());
    }

    println!();
    println!("{}", "Blocks:".bold().cyan());
    println!();
    if entries.is_empty() {
        println!("  {}", "(none)".bright_black());
    }

    for entry in &entries {
        let block = &entry.block;
        let state = if block.is_finalized() {
            "finalized".green()
        } else {
            "pending".yellow()
        };
        println!(
            "  {} {} {} {}",
            format!("#{}", entry.height).bright_black(),
            block.hash().to_hex()[..16].bright_yellow(),
            format!(
                "(txs {}..={}, {})",
                block.from_transaction,
                block.to_transaction,
                block.transaction_count()
            )
            .bright_black(),
            state
        );

        for tx in &entry.transactions {
            println!(
                "      {} {}",
                tx.transaction_hash.to_hex()[..16].bright_yellow(),
                format!("stream {} #{}", tx.stream_id, tx.stream_index).bright_black()
            );
        }
    }
    println!();
    Ok(())
}

fn entry_json(entry: &BlockEntry) -> serde_json::Value {
    let block = &entry.block;
    let publication = block.publication.as_ref().map(|publication| match publication {
        BlockPublication::LogEntry { block_header_hash } => serde_json::json!({
            "type": "log",
            "block_header_hash": block_header_hash.to_hex(),
        }),
        BlockPublication::External {
            transaction_id,
            block_hash,
        } => serde_json::json!({
            "type": "external",
            "transaction_id": hex::encode(transaction_id),
            "block_hash": hex::encode(block_hash),
        }),
    });

    serde_json::json!({
        "height": entry.height,
        "hash": block.hash().to_hex(),
        "previous_header_hash": block.header.previous_header_hash.to_hex(),
        "previous_publication_hash": block.header.previous_publication_hash.to_hex(),
        "merkle_root_hash": block.header.merkle_root_hash.to_hex(),
        "created_at": block.header.created_at,
        "from_transaction": block.from_transaction,
        "to_transaction": block.to_transaction,
        "publication": publication,
        "transactions": entry
            .transactions
            .iter()
            .map(|tx| serde_json::json!({
                "transaction_hash": tx.transaction_hash.to_hex(),
                "stream_id": tx.stream_id.to_string(),
                "stream_index": tx.stream_index,
            }))
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fedreg_core::{Block, BlockHeader, Hash, StreamTransaction};
    use uuid::Uuid;

    #[test]
    fn test_entry_json_fields() {
        let header = BlockHeader::new(Hash::ZERO, Hash::ZERO, fedreg_core::hash(b"root"));
        let mut block = Block::pending(header, 0, 0);
        block.publication = Some(BlockPublication::LogEntry {
            block_header_hash: block.hash(),
        });
        let tx = StreamTransaction::new(Uuid::new_v4(), 0, b"p".to_vec());
        let entry = BlockEntry {
            height: 1,
            block: block.clone(),
            transactions: vec![tx.clone()],
        };

        let json = entry_json(&entry);
        assert_eq!(json["height"], 1);
        assert_eq!(json["hash"], block.hash().to_hex());
        assert_eq!(json["publication"]["type"], "log");
        assert_eq!(
            json["transactions"][0]["transaction_hash"],
            tx.transaction_hash.to_hex()
        );
    }
}
