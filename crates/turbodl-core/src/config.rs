use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::retry::RetryPolicy;

/// Retry policy parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of attempts per chunk (including the first).
    pub max_attempts: u32,
    /// Base delay in seconds for exponential backoff (e.g. 0.5 = 500ms).
    pub base_delay_secs: f64,
    /// Maximum backoff delay in seconds.
    pub max_delay_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_secs: 0.5,
            max_delay_secs: 10,
        }
    }
}

impl RetryConfig {
    /// Out-of-range delays (negative, NaN, infinite) are clamped into
    /// `[0, max_delay]`.
    pub fn to_policy(&self) -> RetryPolicy {
        let max_delay = Duration::from_secs(self.max_delay_secs);
        let base_delay = Duration::try_from_secs_f64(self.base_delay_secs.max(0.0))
            .unwrap_or(max_delay)
            .min(max_delay);
        RetryPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay,
            max_delay,
        }
    }
}

/// Global configuration loaded from `~/.config/turbodl/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurboConfig {
    /// Parallel ranged requests per download, at most
    /// [`MAX_CHUNK_COUNT`](crate::partition::MAX_CHUNK_COUNT).
    pub chunk_count: usize,
    /// Where finished files go (None = current directory).
    pub download_dir: Option<PathBuf>,
    /// Parent of per-session staging directories (None = the download dir,
    /// which keeps the final rename on one filesystem).
    pub staging_dir: Option<PathBuf>,
    /// Replace an existing file with the same name instead of failing.
    pub overwrite: bool,
    /// Whole-download deadline in seconds (None = 6 hours; 0 = no deadline).
    pub session_timeout_secs: Option<u64>,
    /// A chunk averaging under 1 byte/s over this window is retried. libcurl
    /// samples transfer speed once per second, so a stall is noticed a few
    /// seconds after the window has elapsed.
    pub stall_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    /// Write buffer per chunk in bytes.
    pub buffer_bytes: usize,
    /// User-Agent header (None = a browser-like default).
    pub user_agent: Option<String>,
    /// fsync the merged file before it is moved into place.
    pub fsync: bool,
    pub retry: RetryConfig,
}

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

impl Default for TurboConfig {
    fn default() -> Self {
        Self {
            chunk_count: 8,
            download_dir: None,
            staging_dir: None,
            overwrite: false,
            session_timeout_secs: None,
            stall_timeout_secs: 30,
            connect_timeout_secs: 30,
            buffer_bytes: 64 * 1024,
            user_agent: None,
            fsync: true,
            retry: RetryConfig::default(),
        }
    }
}

impl TurboConfig {
    /// Session deadline; `None` when disabled with `session_timeout_secs = 0`.
    pub fn session_timeout(&self) -> Option<Duration> {
        match self.session_timeout_secs {
            None => Some(DEFAULT_SESSION_TIMEOUT),
            Some(0) => None,
            Some(s) => Some(Duration::from_secs(s)),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("turbodl")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Reads a config file; missing keys take their defaults.
pub fn load_from(path: &Path) -> Result<TurboConfig> {
    let data =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    toml::from_str(&data).with_context(|| format!("parse config {}", path.display()))
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<TurboConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = TurboConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}
