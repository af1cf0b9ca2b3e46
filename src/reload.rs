//! DNS forwarder reload.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

#[cfg(test)]
use mockall::automock;

use crate::cmd_abstraction::{CommandExecutor, CommandOutput, RealCommandExecutor};
use crate::config::Settings;

/// Restarts the DNS forwarder after generated files change.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ServiceReloader: Send + Sync {
    /// Run the reload and return its raw output.
    async fn reload(&self) -> Result<CommandOutput>;
}

/// Reloads by running a shell command, `<shell> -c <command>`.
pub struct CommandReloader<E: CommandExecutor> {
    executor: Arc<E>,
    shell: PathBuf,
    command: String,
}

impl CommandReloader<RealCommandExecutor> {
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            Arc::new(RealCommandExecutor::new()),
            settings.shell.clone(),
            settings.reload_command.clone(),
        )
    }
}

impl<E: CommandExecutor + 'static> CommandReloader<E> {
    pub fn new(executor: Arc<E>, shell: PathBuf, command: String) -> Self {
        Self {
            executor,
            shell,
            command,
        }
    }
}

#[async_trait]
impl<E: CommandExecutor + 'static> ServiceReloader for CommandReloader<E> {
    async fn reload(&self) -> Result<CommandOutput> {
        let executor = Arc::clone(&self.executor);
        let shell = self.shell.display().to_string();
        let args = vec!["-c".to_string(), self.command.clone()];

        info!("Reloading: {} -c '{}'", shell, self.command);
        let output = tokio::task::spawn_blocking(move || executor.execute(&shell, &args)).await??;

        if output.success {
            info!("Reload finished: {}", output.combined());
        } else {
            warn!(
                "Reload exited with {:?}: {}",
                output.code,
                output.combined()
            );
        }
        Ok(output)
    }
}
