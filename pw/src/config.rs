//! PoolWatch configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main PoolWatch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Telegram bot configuration
    pub telegram: TelegramConfig,

    /// Balance API configuration
    pub api: ApiConfig,

    /// Notification loop tuning
    pub notify: NotifyConfig,

    /// Storage configuration
    pub storage: StorageConfig,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Call this early in startup to fail fast with clear error messages.
    pub fn validate(&self) -> Result<()> {
        if std::env::var(&self.telegram.token_env).is_err() {
            return Err(eyre::eyre!(
                "Telegram bot token not found. Set the {} environment variable.",
                self.telegram.token_env
            ));
        }
        if self.notify.fetch_concurrency == 0 {
            return Err(eyre::eyre!("notify.fetch-concurrency must be at least 1"));
        }
        if self.notify.poll_interval_secs == 0 {
            return Err(eyre::eyre!("notify.poll-interval-secs must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .poolwatch.yml
        let local_config = PathBuf::from(".poolwatch.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/poolwatch/poolwatch.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("poolwatch").join("poolwatch.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Telegram Bot API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Environment variable containing the bot token
    #[serde(rename = "token-env")]
    pub token_env: String,

    /// Bot API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Long-poll timeout for getUpdates, in seconds
    #[serde(rename = "poll-timeout-secs")]
    pub poll_timeout_secs: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token_env: "POOLWATCH_BOT_TOKEN".to_string(),
            base_url: "https://api.telegram.org".to_string(),
            timeout_ms: 30_000,
            poll_timeout_secs: 30,
        }
    }
}

impl TelegramConfig {
    /// Read the bot token from the configured environment variable
    pub fn get_token(&self) -> Result<String> {
        std::env::var(&self.token_env).context(format!("{} is not set", self.token_env))
    }
}

/// Balance API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Attempts per lookup, including the first
    #[serde(rename = "max-attempts")]
    pub max_attempts: u32,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api-server.mintlayer.org".to_string(),
            timeout_ms: 10_000,
            max_attempts: 3,
        }
    }
}

/// Notification loop tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Seconds between reconciliation passes
    #[serde(rename = "poll-interval-secs")]
    pub poll_interval_secs: u64,

    /// Maximum concurrent balance lookups per category
    #[serde(rename = "fetch-concurrency")]
    pub fetch_concurrency: usize,

    /// How long shutdown waits for watchers to exit
    #[serde(rename = "shutdown-timeout-secs")]
    pub shutdown_timeout_secs: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 600,
            fetch_concurrency: crate::executor::DEFAULT_LIMIT,
            shutdown_timeout_secs: 60,
        }
    }
}

impl NotifyConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite database path
    #[serde(rename = "db-path")]
    pub db_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("poolwatch")
                .join("pools.db"),
        }
    }
}
