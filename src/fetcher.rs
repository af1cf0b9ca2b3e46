//! Source retrieval: HTTP downloads, local files and inline includes.
//!
//! Fetch failures never abort a run. They are carried in [`Fetched::error`]
//! and reported by the orchestrator as diagnostics for the affected unit.

use anyhow::{Context, Result};
use reqwest::{Client, Method, Url};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{Settings, MAX_RETRIES};
use crate::error::FetchError;

/// Descriptor used for content built from `include` entries.
pub const PRE_CONFIGURED: &str = "pre-configured";

/// Raw content obtained for one work unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub content: Vec<u8>,
    /// URL, path or [`PRE_CONFIGURED`]
    pub descriptor: String,
    pub error: Option<FetchError>,
}

impl Fetched {
    fn ok(content: Vec<u8>, descriptor: impl Into<String>) -> Self {
        Self {
            content,
            descriptor: descriptor.into(),
            error: None,
        }
    }

    fn failed(error: FetchError) -> Self {
        Self {
            content: Vec::new(),
            descriptor: error.target().to_string(),
            error: Some(error),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Content for the pre-configured unit of an area: its includes, one per line.
pub fn pre_configured(include: &[String]) -> Fetched {
    Fetched::ok(include.join("\n").into_bytes(), PRE_CONFIGURED)
}

/// Delay before retry `attempt` (1-based): `base * 2^(attempt - 1)`, saturating.
fn backoff(base: Duration, attempt: u32) -> Duration {
    base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
}

/// Retrieves source content for work units.
pub struct Fetcher {
    client: Client,
    method: String,
    retries: u32,
    retry_delay: Duration,
    max_size: usize,
    /// Cumulative download size tracker (shared by concurrent fetches)
    total_downloaded: AtomicUsize,
}

impl Fetcher {
    /// Create a fetcher from runtime settings.
    ///
    /// The method is upper-cased but not otherwise checked; an unusable
    /// method surfaces as [`FetchError::RequestForm`] for each URL fetched.
    /// `retries` is capped at [`MAX_RETRIES`].
    pub fn new(settings: &Settings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout())
            .user_agent(settings.user_agent.as_str())
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            method: settings.method.to_ascii_uppercase(),
            retries: settings.retries.min(MAX_RETRIES),
            retry_delay: settings.retry_delay(),
            max_size: settings.max_download_size,
            total_downloaded: AtomicUsize::new(0),
        })
    }

    /// Get the total bytes downloaded so far
    pub fn total_downloaded(&self) -> usize {
        self.total_downloaded.load(Ordering::Relaxed)
    }

    /// Download `url`, retrying transport failures with exponential back-off.
    ///
    /// A non-success status is not an error: its body is returned as content
    /// and will usually extract to nothing.
    pub async fn fetch_url(&self, url: &str) -> Fetched {
        match self.try_fetch_url(url).await {
            Ok(content) => {
                self.total_downloaded
                    .fetch_add(content.len(), Ordering::Relaxed);
                Fetched::ok(content, url)
            }
            Err(e) => Fetched::failed(e),
        }
    }

    async fn try_fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let request_form = |reason: String| FetchError::RequestForm {
            target: url.to_string(),
            reason,
        };

        let method = Method::from_bytes(self.method.as_bytes())
            .map_err(|e| request_form(format!("invalid method '{}': {}", self.method, e)))?;
        let parsed = Url::parse(url).map_err(|e| request_form(e.to_string()))?;
        let request = self
            .client
            .request(method, parsed)
            .build()
            .map_err(|e| request_form(e.to_string()))?;

        let mut last_error = String::new();

        for attempt in 0..=self.retries {
            if attempt > 0 {
                let delay = backoff(self.retry_delay, attempt);
                debug!("Retry {} after {:?} for {}", attempt, delay, url);
                tokio::time::sleep(delay).await;
            }

            let Some(request) = request.try_clone() else {
                return Err(request_form("request body cannot be replayed".to_string()));
            };

            match self.client.execute(request).await {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        warn!("{} returned HTTP {}", url, status);
                    }

                    if let Some(len) = response.content_length() {
                        if len as usize > self.max_size {
                            return Err(self.too_large(url, len as usize));
                        }
                    }

                    match response.bytes().await {
                        Ok(body) if body.len() > self.max_size => {
                            return Err(self.too_large(url, body.len()));
                        }
                        Ok(body) => {
                            info!("Fetched {} ({} bytes)", url, body.len());
                            return Ok(body.to_vec());
                        }
                        Err(e) => last_error = e.to_string(),
                    }
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(FetchError::Transport {
            target: url.to_string(),
            reason: last_error,
        })
    }

    fn too_large(&self, url: &str, size: usize) -> FetchError {
        FetchError::Transport {
            target: url.to_string(),
            reason: format!(
                "response too large: {} bytes (max: {} bytes)",
                size, self.max_size
            ),
        }
    }

    /// Read a local source file.
    pub async fn fetch_file(&self, path: &Path) -> Fetched {
        let descriptor = path.display().to_string();
        match tokio::fs::read(path).await {
            Ok(content) if content.len() > self.max_size => {
                Fetched::failed(FetchError::FileUnavailable {
                    target: descriptor,
                    reason: format!("file too large: {} bytes", content.len()),
                })
            }
            Ok(content) => {
                debug!("Read {} ({} bytes)", descriptor, content.len());
                Fetched::ok(content, descriptor)
            }
            Err(e) => Fetched::failed(FetchError::FileUnavailable {
                target: descriptor,
                reason: e.to_string(),
            }),
        }
    }
}

// Note: Default is intentionally not implemented for Fetcher
// because new() can fail and we want explicit error handling.

/// Format a count with K/M suffix
pub fn format_count(count: usize) -> String {
    if count >= 1_000_000 {
        format!("{:.1}M", count as f64 / 1_000_000.0)
    } else if count >= 1_000 {
        format!("{:.1}K", count as f64 / 1_000.0)
    } else {
        count.to_string()
    }
}
