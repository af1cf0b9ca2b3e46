//! Clean command implementation.

use anyhow::Result;

use super::{print_summary, Inputs};
use crate::lock::LockGuard;
use crate::orchestrator::Orchestrator;
use crate::tree::BlacklistTree;

/// Remove every generated file, then reload if anything was removed
pub async fn run(inputs: &Inputs) -> Result<()> {
    let settings = inputs.load_settings()?;
    let _lock = LockGuard::acquire_at(&settings.lock_file)?;

    let report = Orchestrator::new(settings)
        .run_tree(&BlacklistTree::disabled())
        .await;
    print_summary(&report);

    if !report.success {
        anyhow::bail!("Clean finished with {} error(s)", report.errors().count());
    }
    Ok(())
}
