//! Structured diagnostics emitted during a run.
//!
//! Components report failures and warnings through a [`DiagnosticSink`]
//! handed to them explicitly, so tests can capture events without touching
//! the global subscriber.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Debug,
    Info,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// One reported event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Work unit or check that produced the event, if any
    pub unit: Option<String>,
    pub message: String,
}

impl Diagnostic {
    pub fn new(severity: Severity, unit: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            severity,
            unit: unit.map(str::to_string),
            message: message.into(),
        }
    }

    pub fn error(unit: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, unit, message)
    }

    pub fn warning(unit: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, unit, message)
    }

    pub fn info(unit: Option<&str>, message: impl Into<String>) -> Self {
        Self::new(Severity::Info, unit, message)
    }
}

/// Destination for diagnostics.
pub trait DiagnosticSink: Send + Sync {
    fn emit(&self, diagnostic: Diagnostic);
}

/// Forwards diagnostics to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl DiagnosticSink for TracingSink {
    fn emit(&self, d: Diagnostic) {
        let unit = d.unit.as_deref().unwrap_or("-");
        match d.severity {
            Severity::Debug => debug!(unit, "{}", d.message),
            Severity::Info => info!(unit, "{}", d.message),
            Severity::Warning => warn!(unit, "{}", d.message),
            Severity::Error => error!(unit, "{}", d.message),
        }
    }
}

/// Keeps every diagnostic in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    events: Arc<Mutex<Vec<Diagnostic>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the buffer, ignoring poisoning.
    fn buffer(&self) -> MutexGuard<'_, Vec<Diagnostic>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn events(&self) -> Vec<Diagnostic> {
        self.buffer().clone()
    }

    pub fn last(&self) -> Option<Diagnostic> {
        self.buffer().last().cloned()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.buffer()
            .iter()
            .filter(|d| d.severity == severity)
            .count()
    }
}

impl DiagnosticSink for MemorySink {
    fn emit(&self, diagnostic: Diagnostic) {
        self.buffer().push(diagnostic);
    }
}
