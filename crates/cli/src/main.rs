//! fedreg CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "fedreg")]
#[command(about = "Federated transaction registry", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<commands::Commands>,
}

#[tokio::main]
async fn main() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("fedreg=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd).await {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("fedreg - Federated transaction registry");
            println!("Run 'fedreg --help' for usage information.");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_submit() {
        let cli = Cli::try_parse_from([
            "fedreg",
            "submit",
            "--stream",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--index",
            "0",
            "--payload",
            "deadbeef",
        ])
        .unwrap();
        assert!(matches!(cli.command, Some(commands::Commands::Submit(_))));
    }

    #[test]
    fn test_run_rejects_zero_interval() {
        assert!(Cli::try_parse_from(["fedreg", "run", "--interval-ms", "0"]).is_err());

        let cli = Cli::try_parse_from(["fedreg", "run", "--interval-ms", "1"]).unwrap();
        assert!(matches!(cli.command, Some(commands::Commands::Run(_))));
    }
}
