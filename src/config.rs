//! Runtime settings for the blacklist compiler.
//!
//! The blacklist itself is described by the router configuration (see
//! [`crate::parser`]). This file holds the host-specific knobs: where
//! generated files go, how sources are fetched and how dnsmasq is reloaded.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// HTTP methods accepted for source downloads
const VALID_METHODS: &[&str] = &["GET", "POST"];

/// Upper bound on `retries`; back-off doubles per attempt
pub const MAX_RETRIES: u32 = 10;

/// Default location of the settings file
pub const DEFAULT_SETTINGS_PATH: &str = "/config/user-data/blacklist.yaml";

/// Main settings structure
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Directory dnsmasq reads its configuration fragments from
    pub dir: PathBuf,

    /// Extension of generated files (also selects files for stale cleanup)
    pub extension: String,

    /// Areas compiled on each run
    pub nodes: Vec<String>,

    /// HTTP method used for URL sources
    pub method: String,

    /// Per-request timeout in seconds
    pub timeout_secs: u64,

    /// Extra attempts after a transport failure
    pub retries: u32,

    /// Initial back-off between retries, doubled on each attempt
    pub retry_delay_ms: u64,

    /// Number of work units fetched concurrently
    pub cores: usize,

    /// Maximum accepted size of a single download in bytes
    pub max_download_size: usize,

    /// Shell command that restarts the DNS forwarder
    pub reload_command: String,

    /// Shell used to run `reload_command`
    pub shell: PathBuf,

    /// What to do when an area compiles to zero domains
    pub empty_area_policy: EmptyAreaPolicy,

    /// User-Agent header sent with downloads
    pub user_agent: String,

    /// Lock file preventing concurrent updates
    pub lock_file: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/etc/dnsmasq.d"),
            extension: "blacklist.conf".to_string(),
            nodes: vec!["domains".to_string(), "hosts".to_string()],
            method: "GET".to_string(),
            timeout_secs: 30,
            retries: 2,
            retry_delay_ms: 2000,
            cores: 2,
            max_download_size: 10 * 1024 * 1024,
            reload_command: "service dnsmasq restart".to_string(),
            shell: PathBuf::from("/bin/bash"),
            empty_area_policy: EmptyAreaPolicy::Allow,
            user_agent: format!("blacklist/{}", env!("CARGO_PKG_VERSION")),
            lock_file: PathBuf::from("/var/run/blacklist.lock"),
        }
    }
}

impl Settings {
    /// Load settings from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read settings file: {:?}", path.as_ref()))?;
        let settings: Settings = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse settings file: {:?}", path.as_ref()))?;

        settings.validate()?;

        Ok(settings)
    }

    /// Load settings, falling back to defaults when the file does not exist
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self> {
        if path.as_ref().exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<()> {
        let method = self.method.to_ascii_uppercase();
        if !VALID_METHODS.contains(&method.as_str()) {
            anyhow::bail!(
                "Invalid method '{}'. Valid values: {}",
                self.method,
                VALID_METHODS.join(", ")
            );
        }

        if self.extension.is_empty() || self.extension.contains('/') {
            anyhow::bail!("Invalid extension '{}'", self.extension);
        }

        if self.nodes.is_empty() {
            anyhow::bail!("At least one node must be configured");
        }

        if self.cores == 0 {
            anyhow::bail!("cores must be at least 1");
        }

        if self.retries > MAX_RETRIES {
            anyhow::bail!(
                "retries must be at most {} (got {})",
                MAX_RETRIES,
                self.retries
            );
        }

        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs must be at least 1");
        }

        if self.max_download_size == 0 {
            anyhow::bail!("max_download_size must be greater than zero");
        }

        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Glob selecting every generated file, e.g. `/etc/dnsmasq.d/*blacklist.conf`
    pub fn stale_glob(&self) -> String {
        format!("{}/*{}", self.dir.display(), self.extension)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmptyAreaPolicy {
    /// An area with no compiled domains is a benign empty result
    #[default]
    Allow,
    /// An area with no compiled domains fails the run
    Fail,
}
