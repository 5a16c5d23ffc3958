use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::retry::{Backoff, RetryPolicy};

pub const DEFAULT_STORE_URL: &str = "http://localhost:9200";
pub const DEFAULT_INDEX: &str = "nasa-apod";
pub const DEFAULT_PAGE_SIZE: usize = 10;

/// Environment variable that overrides `store.url`.
pub const STORE_URL_ENV: &str = "ELASTICSEARCH_URL";

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StoreConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default = "default_index")]
    pub index: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            index: default_index(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_url() -> String {
    DEFAULT_STORE_URL.to_string()
}
fn default_index() -> String {
    DEFAULT_INDEX.to_string()
}
fn default_request_timeout_secs() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReadinessConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_poll_delay_ms")]
    pub delay_ms: u64,
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_poll_delay_ms(),
            backoff: Backoff::default(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    10
}
fn default_poll_delay_ms() -> u64 {
    2000
}
fn default_max_delay_ms() -> u64 {
    30_000
}

impl ReadinessConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.delay_ms),
            backoff: self.backoff,
            max_delay: Duration::from_millis(self.max_delay_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default = "default_chunk_delay_ms")]
    pub chunk_delay_ms: u64,
    #[serde(default = "default_failure_backoff_ms")]
    pub failure_backoff_ms: u64,
    /// Growth of the failure backoff over consecutive failed chunks.
    #[serde(default)]
    pub backoff: Backoff,
    #[serde(default = "default_max_delay_ms")]
    pub max_backoff_ms: u64,
    #[serde(default = "default_bulk_timeout_secs")]
    pub bulk_timeout_secs: u64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            chunk_delay_ms: default_chunk_delay_ms(),
            failure_backoff_ms: default_failure_backoff_ms(),
            backoff: Backoff::default(),
            max_backoff_ms: default_max_delay_ms(),
            bulk_timeout_secs: default_bulk_timeout_secs(),
        }
    }
}

fn default_chunk_size() -> usize {
    25
}
fn default_chunk_delay_ms() -> u64 {
    1000
}
fn default_failure_backoff_ms() -> u64 {
    2000
}
fn default_bulk_timeout_secs() -> u64 {
    30
}

impl IngestConfig {
    /// Backoff after failed chunks. Only the delay schedule is used; the
    /// pipeline never retries a chunk itself.
    pub fn failure_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: 1,
            base_delay: Duration::from_millis(self.failure_backoff_ms),
            backoff: self.backoff,
            max_delay: Duration::from_millis(self.max_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
        }
    }
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Config {
    /// Apply environment overrides on top of file values.
    pub fn apply_env(&mut self) {
        if let Ok(url) = std::env::var(STORE_URL_ENV) {
            if !url.trim().is_empty() {
                self.store.url = url;
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.store.url.trim().is_empty() {
            anyhow::bail!("store.url must not be empty");
        }
        if self.store.index.trim().is_empty() {
            anyhow::bail!("store.index must not be empty");
        }
        if self.readiness.max_attempts == 0 {
            anyhow::bail!("readiness.max_attempts must be > 0");
        }
        if self.ingest.chunk_size == 0 {
            anyhow::bail!("ingest.chunk_size must be > 0");
        }
        if self.search.page_size == 0 {
            anyhow::bail!("search.page_size must be > 0");
        }
        Ok(())
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let mut config: Config =
        toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    config.apply_env();
    config.validate()?;

    Ok(config)
}

/// Load `path` if it exists; otherwise fall back to defaults (still
/// honoring environment overrides).
pub fn load_or_default(path: &Path) -> Result<Config> {
    if path.exists() {
        return load_config(path);
    }
    let mut config = Config::default();
    config.apply_env();
    config.validate()?;
    Ok(config)
}
