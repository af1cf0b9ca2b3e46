//! CLI command implementations.

pub mod check;
pub mod clean;
pub mod update;

use anyhow::{Context, Result};
use std::path::PathBuf;

use crate::config::Settings;
use crate::orchestrator::RunReport;

/// Paths every command starts from.
#[derive(Debug, Clone)]
pub struct Inputs {
    /// File holding the `blacklist { ... }` block
    pub config: PathBuf,
    /// Runtime settings (YAML)
    pub settings: PathBuf,
    /// Output directory override
    pub dir: Option<PathBuf>,
}

impl Inputs {
    /// Load settings, applying the directory override.
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load_or_default(&self.settings)?;
        if let Some(dir) = &self.dir {
            settings.dir = dir.clone();
        }
        settings.validate()?;
        Ok(settings)
    }

    pub fn read_config(&self) -> Result<String> {
        std::fs::read_to_string(&self.config)
            .with_context(|| format!("Failed to read configuration: {:?}", self.config))
    }
}

/// Print a short human summary of a run.
pub(crate) fn print_summary(report: &RunReport) {
    use crate::fetcher::format_count;

    println!();
    for unit in &report.units {
        let outcome = unit
            .outcome
            .map(|o| format!("{:?}", o).to_lowercase())
            .unwrap_or_else(|| "dry-run".to_string());
        println!(
            "  {:<24} {:>8} entries  [{}]",
            unit.name,
            format_count(unit.compiled),
            outcome
        );
    }
    for path in &report.removed {
        println!("  removed {}", path.display());
    }
    if let Some(output) = &report.reload_output {
        let text = output.combined();
        if !text.is_empty() {
            println!("  reload: {}", text);
        }
    }

    let total: usize = report.units.iter().map(|u| u.compiled).sum();
    if report.success {
        println!("[OK] {} entries compiled", format_count(total));
    } else {
        println!(
            "[FAILED] {} entries compiled, {} errors",
            format_count(total),
            report.errors().count()
        );
    }
}
