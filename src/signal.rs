//! Run cancellation.
//!
//! An [`AbortToken`] is shared by every task of a run. It is raised by a
//! fatal error or, through [`ShutdownGuard`], by SIGINT/SIGTERM. Once raised,
//! no new fetch starts and nothing more is written to disk.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{info, warn};

/// A token that can be shared across tasks to check for cancellation.
#[derive(Clone, Debug, Default)]
pub struct AbortToken {
    flag: Arc<AtomicBool>,
}

impl AbortToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if the run has been aborted.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Abort the run. Idempotent.
    pub fn raise(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Listens for SIGINT and SIGTERM and raises the token it was given.
///
/// If signal handlers cannot be registered (e.g., in restricted environments),
/// the guard is still created but signal handling is disabled.
pub struct ShutdownGuard {
    task: tokio::task::JoinHandle<()>,
}

impl ShutdownGuard {
    /// Start listening. Must be called from within a tokio runtime.
    pub fn new(token: AbortToken) -> Self {
        let task = tokio::spawn(async move {
            let sigint = match signal(SignalKind::interrupt()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGINT handler: {}", e);
                    None
                }
            };

            let sigterm = match signal(SignalKind::terminate()) {
                Ok(s) => Some(s),
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    None
                }
            };

            match (sigint, sigterm) {
                (Some(mut int), Some(mut term)) => {
                    tokio::select! {
                        _ = int.recv() => info!("Received SIGINT, aborting run..."),
                        _ = term.recv() => info!("Received SIGTERM, aborting run..."),
                    }
                }
                (Some(mut int), None) => {
                    int.recv().await;
                    info!("Received SIGINT, aborting run...");
                }
                (None, Some(mut term)) => {
                    term.recv().await;
                    info!("Received SIGTERM, aborting run...");
                }
                (None, None) => {
                    warn!("No signal handlers registered - run cannot be interrupted cleanly");
                    return;
                }
            }
            token.raise();
        });

        Self { task }
    }
}

impl Drop for ShutdownGuard {
    fn drop(&mut self) {
        self.task.abort();
    }
}
