//! CLI argument parsing with clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::DEFAULT_SETTINGS_PATH;

/// Default router configuration holding the `blacklist` block.
pub const DEFAULT_CONFIG_PATH: &str = "/config/config.boot";

#[derive(Parser)]
#[command(name = "blacklist")]
#[command(author, version, about = "dnsmasq blacklist compiler for EdgeOS-style routers")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file containing the `blacklist { ... }` block
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH, global = true)]
    pub config: PathBuf,

    /// Runtime settings file (YAML); defaults apply when it is missing
    #[arg(short, long, default_value = DEFAULT_SETTINGS_PATH, global = true)]
    pub settings: PathBuf,

    /// Override the dnsmasq output directory
    #[arg(short, long, global = true)]
    pub dir: Option<PathBuf>,

    /// Quiet mode (for cron)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Verbose mode (debug output)
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch sources, compile dnsmasq files and reload the DNS forwarder
    Update {
        /// Fetch and compile but don't write files or reload
        #[arg(long)]
        dry_run: bool,

        /// Print the run report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Verify the generated files against the configuration
    Check,

    /// Remove every generated file and reload
    Clean,

    /// Show version
    Version,
}
