//! Application configuration
//!
//! Configuration is loaded from:
//! 1. Default values
//! 2. Config file (~/.config/donelog/config.toml)
//! 3. Environment variables (DONELOG_* prefix)
//!
//! Environment variables take precedence over config file values.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable prefix
const ENV_PREFIX: &str = "DONELOG";

/// Default timeout for a single remote call
const DEFAULT_SYNC_TIMEOUT_SECS: u64 = 30;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Directory for local entry and trash files
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Remote store endpoint (project URL)
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Remote store credential (API key)
    #[serde(default)]
    pub credential: Option<String>,

    /// Run sync passes automatically
    #[serde(default)]
    pub auto_sync: bool,

    /// Minutes between automatic passes (0 = at startup only)
    #[serde(default)]
    pub sync_interval_minutes: u64,

    /// Timeout for each remote call, in seconds
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,

    /// Log file path (stderr if unset)
    #[serde(default)]
    pub log_file: Option<PathBuf>,
}

/// The part of the configuration the remote client is keyed by
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteConfig {
    pub endpoint: String,
    pub credential: String,
}

impl RemoteConfig {
    pub fn new(endpoint: impl Into<String>, credential: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            credential: credential.into(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            endpoint: None,
            credential: None,
            auto_sync: false,
            sync_interval_minutes: 0,
            sync_timeout_secs: DEFAULT_SYNC_TIMEOUT_SECS,
            log_file: None,
        }
    }
}

impl Config {
    /// Load configuration from default location and environment
    ///
    /// Order of precedence (highest to lowest):
    /// 1. Environment variables (DONELOG_DATA_DIR, DONELOG_ENDPOINT, ...)
    /// 2. Config file (~/.config/donelog/config.toml or DONELOG_CONFIG)
    /// 3. Default values
    pub fn load() -> Result<Self> {
        Self::load_from_path(&Self::config_file_path())
    }

    /// Load configuration, preferring a path given on the command line
    pub fn load_with_cli_override(path: Option<&PathBuf>) -> Result<Self> {
        match path {
            Some(path) => Self::load_from_path(path),
            None => Self::load(),
        }
    }

    /// Load configuration from a specific path
    ///
    /// Environment variables are still applied as overrides.
    /// If the file doesn't exist, defaults are used.
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {:?}", path))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {:?}", path))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        config.ensure_data_dir()?;
        Ok(config)
    }

    /// Load configuration from a TOML string (useful for testing)
    pub fn load_from_str(toml_content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(toml_content).context("Failed to parse config TOML")?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var(format!("{}_DATA_DIR", ENV_PREFIX)) {
            self.data_dir = PathBuf::from(val);
        }

        if let Ok(val) = std::env::var(format!("{}_ENDPOINT", ENV_PREFIX)) {
            self.endpoint = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_CREDENTIAL", ENV_PREFIX)) {
            self.credential = non_empty(val);
        }

        if let Ok(val) = std::env::var(format!("{}_AUTO_SYNC", ENV_PREFIX)) {
            self.auto_sync = val.eq_ignore_ascii_case("true") || val == "1";
        }

        // Unparseable values are ignored
        if let Ok(val) = std::env::var(format!("{}_SYNC_INTERVAL", ENV_PREFIX)) {
            if let Ok(minutes) = val.parse() {
                self.sync_interval_minutes = minutes;
            }
        }
    }

    /// Ensure data directory exists
    fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir)
                .with_context(|| format!("Failed to create data directory: {:?}", self.data_dir))?;
        }
        Ok(())
    }

    /// Save configuration to the default file
    pub fn save(&self) -> Result<()> {
        self.save_to_path(&Self::config_file_path())
    }

    /// Save configuration to a specific file
    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(config_path, content)
            .with_context(|| format!("Failed to write config file: {:?}", config_path))?;
        Ok(())
    }

    /// Get the config file path
    ///
    /// Can be overridden with DONELOG_CONFIG environment variable
    pub fn config_file_path() -> PathBuf {
        if let Ok(path) = std::env::var(format!("{}_CONFIG", ENV_PREFIX)) {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("donelog")
            .join("config.toml")
    }

    /// Remote settings, if both endpoint and credential are present
    pub fn remote(&self) -> Option<RemoteConfig> {
        match (self.endpoint.as_deref(), self.credential.as_deref()) {
            (Some(endpoint), Some(credential))
                if !endpoint.trim().is_empty() && !credential.trim().is_empty() =>
            {
                Some(RemoteConfig::new(endpoint.trim(), credential.trim()))
            }
            _ => None,
        }
    }

    /// Timeout applied to each remote call
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs.max(1))
    }

    /// Interval between automatic passes, `None` for startup-only
    pub fn sync_interval(&self) -> Option<Duration> {
        (self.sync_interval_minutes > 0)
            .then(|| Duration::from_secs(self.sync_interval_minutes.saturating_mul(60)))
    }

    /// Get the path to the active entries file
    pub fn entries_path(&self) -> PathBuf {
        self.data_dir.join("entries.json")
    }

    /// Get the path to the trash file
    pub fn trash_path(&self) -> PathBuf {
        self.data_dir.join("trash.json")
    }
}

fn non_empty(val: String) -> Option<String> {
    if val.is_empty() {
        None
    } else {
        Some(val)
    }
}

fn default_sync_timeout() -> u64 {
    DEFAULT_SYNC_TIMEOUT_SECS
}

/// Get the default data directory
fn default_data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("donelog")
}
