//! Error types for the blacklist pipeline.
//!
//! Configuration and compile errors are fatal to a run. Fetch errors and
//! extraction warnings are recovered per work unit.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning configuration text into a [`crate::tree::BlacklistTree`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("No blacklist configuration found (missing `blacklist` block)")]
    MissingRoot,

    #[error("Blacklist configuration has no `domains` or `hosts` area")]
    NoAreas,

    #[error("Invalid dns-redirect-ip '{0}': must be an IPv4 address")]
    InvalidIp(String),

    #[error("Malformed configuration at line {line}: {reason}")]
    MalformedBlock { line: usize, reason: String },
}

/// Per-unit failure to retrieve source content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Unable to form request for {target}...")]
    RequestForm { target: String, reason: String },

    #[error("Unable to get response for {target}...")]
    Transport { target: String, reason: String },

    #[error("Unable to read {target}...")]
    FileUnavailable { target: String, reason: String },
}

impl FetchError {
    /// The URL or path the fetch was aimed at.
    pub fn target(&self) -> &str {
        match self {
            Self::RequestForm { target, .. }
            | Self::Transport { target, .. }
            | Self::FileUnavailable { target, .. } => target,
        }
    }

    /// Underlying cause as reported by the transport or filesystem.
    pub fn reason(&self) -> &str {
        match self {
            Self::RequestForm { reason, .. }
            | Self::Transport { reason, .. }
            | Self::FileUnavailable { reason, .. } => reason,
        }
    }
}

/// Non-fatal extraction outcomes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionWarning {
    #[error("No data returned for {0}...")]
    EmptyBody(String),

    #[error("No recognizable entries in {0}...")]
    NoRecognizableLines(String),
}

/// Failures while writing or cleaning up generated files.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    #[error("Failed to remove {path}: {source}")]
    Remove {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Unable to scan for stale files matching {pattern}: {reason}")]
    StaleScan { pattern: String, reason: String },

    #[error("Two work units target the same file: {0}")]
    DuplicateTarget(PathBuf),
}

impl CompileError {
    /// Classify an I/O failure on `path` during a write.
    pub fn from_write(path: PathBuf, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied(path)
        } else {
            Self::Write { path, source }
        }
    }
}
