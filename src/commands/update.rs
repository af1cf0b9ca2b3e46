//! Update command implementation.

use anyhow::{Context, Result};
use tracing::info;

use super::{print_summary, Inputs};
use crate::lock::LockGuard;
use crate::orchestrator::Orchestrator;
use crate::signal::ShutdownGuard;

/// Run the update command
pub async fn run(inputs: &Inputs, dry_run: bool, json: bool) -> Result<()> {
    let settings = inputs.load_settings()?;
    let config_text = inputs.read_config()?;

    let _lock = LockGuard::acquire_at(&settings.lock_file)?;

    info!(
        "Updating blacklist in {}{}",
        settings.dir.display(),
        if dry_run { " (dry run)" } else { "" }
    );

    let orchestrator = Orchestrator::new(settings).dry_run(dry_run);
    let _signals = ShutdownGuard::new(orchestrator.abort_token());

    let report = orchestrator.run(&config_text).await;

    if json {
        let out = serde_json::to_string_pretty(&report).context("Failed to serialize report")?;
        println!("{}", out);
    } else {
        print_summary(&report);
    }

    if !report.success {
        anyhow::bail!(
            "Update finished with {} error(s)",
            report.errors().count()
        );
    }
    Ok(())
}
