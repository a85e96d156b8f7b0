//! Configuration loading for the hearth CLI.
//!
//! Configuration is loaded from a TOML file (default: `hearth.toml` in the
//! data directory). A missing default file means all defaults.

use hearth_sync_client::SyncConfig;
use hearth_sync_types::OwnerId;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the data directory.
pub const DEFAULT_CONFIG_FILE: &str = "hearth.toml";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Outbound sync settings.
    #[serde(default)]
    pub sync: SyncSection,
    /// Reconciliation settings.
    #[serde(default)]
    pub refresh: RefreshSection,
    /// File locations.
    #[serde(default)]
    pub storage: StorageSection,
}

/// Outbound sync configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncSection {
    /// Owner whose records are synced (default: "local").
    #[serde(default = "default_owner")]
    pub owner: String,
    /// Debounce window in milliseconds (default: 3000).
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Retries after the first attempt (default: 3).
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Linear backoff step in seconds (default: 5).
    #[serde(default = "default_retry_base_secs")]
    pub retry_base_secs: u64,
    /// Backoff ceiling in seconds (default: 60).
    #[serde(default = "default_retry_max_secs")]
    pub retry_max_secs: u64,
    /// Provider call timeout in seconds (default: 30).
    #[serde(default = "default_adapter_timeout_secs")]
    pub adapter_timeout_secs: u64,
    /// How long a reminder stays due, in seconds (default: 900).
    #[serde(default = "default_reminder_horizon_secs")]
    pub reminder_horizon_secs: u64,
    /// Maximum remembered reminders (default: 1024).
    #[serde(default = "default_reminder_capacity")]
    pub reminder_capacity: usize,
}

/// Reconciliation configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct RefreshSection {
    /// Enable the periodic refresh in `watch` (default: true).
    #[serde(default = "default_refresh_enabled")]
    pub enabled: bool,
    /// Periodic refresh interval in seconds (default: 300).
    #[serde(default = "default_refresh_interval")]
    pub interval_secs: u64,
    /// Records per remote page (default: 100).
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Page budget per snapshot (default: 1000).
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

/// Storage configuration. Relative paths are resolved against the data
/// directory.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageSection {
    /// SQLite state database (default: hearth.db).
    #[serde(default = "default_database_path")]
    pub database: PathBuf,
    /// JSON file acting as the remote store (default: remote.json).
    #[serde(default = "default_remote_path")]
    pub remote: PathBuf,
}

// Default value functions
fn default_owner() -> String {
    "local".to_string()
}

fn default_debounce_ms() -> u64 {
    3000
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_base_secs() -> u64 {
    5
}

fn default_retry_max_secs() -> u64 {
    60
}

fn default_adapter_timeout_secs() -> u64 {
    30
}

fn default_reminder_horizon_secs() -> u64 {
    15 * 60
}

fn default_reminder_capacity() -> usize {
    1024
}

fn default_refresh_enabled() -> bool {
    true
}

fn default_refresh_interval() -> u64 {
    300 // 5 minutes
}

fn default_page_size() -> usize {
    100
}

fn default_max_pages() -> usize {
    1000
}

fn default_database_path() -> PathBuf {
    PathBuf::from("hearth.db")
}

fn default_remote_path() -> PathBuf {
    PathBuf::from("remote.json")
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            debounce_ms: default_debounce_ms(),
            max_retries: default_max_retries(),
            retry_base_secs: default_retry_base_secs(),
            retry_max_secs: default_retry_max_secs(),
            adapter_timeout_secs: default_adapter_timeout_secs(),
            reminder_horizon_secs: default_reminder_horizon_secs(),
            reminder_capacity: default_reminder_capacity(),
        }
    }
}

impl Default for RefreshSection {
    fn default() -> Self {
        Self {
            enabled: default_refresh_enabled(),
            interval_secs: default_refresh_interval(),
            page_size: default_page_size(),
            max_pages: default_max_pages(),
        }
    }
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            database: default_database_path(),
            remote: default_remote_path(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Load an explicit config file, or `hearth.toml` from the data
    /// directory if it exists, or the defaults.
    pub fn load(explicit: Option<&Path>, data_dir: &Path) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = data_dir.join(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(&path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Engine configuration for these settings.
    pub fn sync_config(&self) -> SyncConfig {
        let refresh_interval = (self.refresh.enabled && self.refresh.interval_secs > 0)
            .then(|| Duration::from_secs(self.refresh.interval_secs));

        SyncConfig::new(OwnerId::new(self.sync.owner.clone()))
            .with_debounce(Duration::from_millis(self.sync.debounce_ms))
            .with_retries(
                self.sync.max_retries,
                Duration::from_secs(self.sync.retry_base_secs),
                Duration::from_secs(self.sync.retry_max_secs),
            )
            .with_adapter_timeout(Duration::from_secs(self.sync.adapter_timeout_secs))
            .with_paging(self.refresh.page_size, self.refresh.max_pages)
            .with_refresh_interval(refresh_interval)
            .with_reminders(
                Duration::from_secs(self.sync.reminder_horizon_secs),
                self.sync.reminder_capacity,
            )
    }

    /// Database path resolved against `data_dir`.
    pub fn database_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.database)
    }

    /// Remote file path resolved against `data_dir`.
    pub fn remote_path(&self, data_dir: &Path) -> PathBuf {
        data_dir.join(&self.storage.remote)
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
}
