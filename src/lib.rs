//! # blacklist - dnsmasq blacklist compiler
//!
//! Reads the `blacklist { ... }` block of an EdgeOS-style router
//! configuration, fetches the referenced blocklists and writes one dnsmasq
//! `address=/<domain>/<ip>` file per work unit.
//!
//! ## Features
//!
//! - **Heterogeneous sources** - hosts files, bind zone files and plain lists
//! - **Tree-wide exclusions** - an exclude in any area applies everywhere
//! - **Idempotent output** - unchanged files are not rewritten and trigger no reload
//! - **Stale cleanup** - files for removed sources or disabled areas are deleted
//! - **Bounded concurrency** - downloads run in a pool sized by `cores`
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blacklist                            │
//! ├─────────────────────────────────────────────────────────────┤
//! │  CLI (clap)                                                 │
//! │    └── Commands: update, check, clean, version              │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Parser -> BlacklistTree            Settings (serde_yaml)   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Orchestrator (Idle -> ... -> Done)                         │
//! │    ├── Fetcher (reqwest + rustls, files, includes)          │
//! │    ├── Extractor (hosts / zone / plain lines)               │
//! │    ├── Aggregator (dedup, exclusions, coverage)             │
//! │    ├── Compiler (render, commit, stale cleanup)             │
//! │    └── ServiceReloader (dnsmasq restart)                    │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Verifier (post-run consistency checks)                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example Usage
//!
//! ```no_run
//! use blacklist::config::Settings;
//! use blacklist::orchestrator::Orchestrator;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load_or_default("/config/user-data/blacklist.yaml")?;
//!     let config = std::fs::read_to_string("/config/config.boot")?;
//!
//!     let report = Orchestrator::new(settings).run(&config).await;
//!     for diagnostic in report.errors() {
//!         eprintln!("{}", diagnostic.message);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Modules
//!
//! - [`aggregator`] - Domain dictionary, deduplication and exclusion
//! - [`cli`] - Command-line interface definitions
//! - [`cmd_abstraction`] - Command execution abstraction
//! - [`commands`] - CLI command implementations
//! - [`compiler`] - dnsmasq file rendering, commit and stale cleanup
//! - [`config`] - Runtime settings
//! - [`diagnostics`] - Structured diagnostics and sinks
//! - [`error`] - Error taxonomy
//! - [`extractor`] - Domain extraction from blocklist formats
//! - [`fetcher`] - HTTP, file and inline source retrieval
//! - [`fs_abstraction`] - Filesystem abstraction
//! - [`lock`] - File locking for concurrent execution prevention
//! - [`orchestrator`] - Work-unit planning and the run pipeline
//! - [`parser`] - Configuration grammar parser
//! - [`reload`] - DNS forwarder reload
//! - [`signal`] - Run cancellation and signal handling
//! - [`tree`] - Typed configuration tree
//! - [`validation`] - Domain and address validation
//! - [`verify`] - Post-run consistency checks

pub mod aggregator;
pub mod cli;
pub mod cmd_abstraction;
pub mod commands;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod extractor;
pub mod fetcher;
pub mod fs_abstraction;
pub mod lock;
pub mod orchestrator;
pub mod parser;
pub mod reload;
pub mod signal;
pub mod tree;
pub mod validation;
pub mod verify;

pub use cli::{Cli, Commands};
pub use config::Settings;
pub use orchestrator::{Orchestrator, RunReport};
