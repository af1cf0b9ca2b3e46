//! blacklist - dnsmasq blacklist compiler
//!
//! Turns the router's `blacklist` configuration into dnsmasq address files.

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use blacklist::cli::{Cli, Commands};
use blacklist::commands::Inputs;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging based on verbosity
    let log_level = if cli.verbose {
        Level::DEBUG
    } else if cli.quiet {
        Level::ERROR
    } else {
        Level::INFO
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_thread_ids(false)
        .without_time()
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let inputs = Inputs {
        config: cli.config,
        settings: cli.settings,
        dir: cli.dir,
    };

    match cli.command {
        Commands::Update { dry_run, json } => {
            blacklist::commands::update::run(&inputs, dry_run, json).await
        }
        Commands::Check => blacklist::commands::check::run(&inputs).await,
        Commands::Clean => blacklist::commands::clean::run(&inputs).await,
        Commands::Version => {
            println!("blacklist {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    }
}
