//! Configuration management for tgfetch

use crate::error::{Error, Result};
use crate::telegram::{DcId, MAX_CHUNK_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default home datacenter
pub const DEFAULT_HOME_DC: DcId = 2;

/// Default number of concurrent `getFile` calls
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 5;

/// Slowest non-zero request pacing accepted
pub const MIN_REQUESTS_PER_SECOND: f64 = 0.001;

/// `getFile` limits must be a multiple of this
pub const CHUNK_ALIGNMENT: u32 = 4096;

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Telegram API configuration
    pub telegram: TelegramConfig,

    /// Download engine configuration
    #[serde(default)]
    pub download: DownloadConfig,
}

/// Telegram API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramConfig {
    /// Telegram API ID (get from my.telegram.org)
    pub api_id: i32,

    /// Telegram API hash
    pub api_hash: String,

    /// Datacenter the account is logged into
    #[serde(default = "default_home_dc")]
    pub home_dc_id: DcId,

    /// Connect to the test servers
    #[serde(default)]
    pub test_mode: bool,
}

/// Download engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Upper bound for a single request's byte limit (and range chunk size)
    pub chunk_size_limit: u32,

    /// Maximum concurrent fetch requests across all retrievals
    pub max_concurrent_downloads: usize,

    /// Request pacing (0 = unpaced)
    pub requests_per_second: f64,

    /// Export/import rounds before a foreign datacenter is given up on
    pub auth_import_attempts: u32,

    /// Retries for a failed fetch (0 = fail immediately)
    pub fetch_retry_attempts: u32,

    /// Base delay for exponential backoff (ms)
    pub retry_base_delay_ms: u64,

    /// Where `retrieve_to_dir` puts files
    pub download_dir: PathBuf,
}

fn default_home_dc() -> DcId {
    DEFAULT_HOME_DC
}

impl Default for TelegramConfig {
    fn default() -> Self {
        TelegramConfig {
            api_id: 0,
            api_hash: String::new(),
            home_dc_id: DEFAULT_HOME_DC,
            test_mode: false,
        }
    }
}

impl Default for DownloadConfig {
    fn default() -> Self {
        DownloadConfig {
            chunk_size_limit: MAX_CHUNK_SIZE,
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            requests_per_second: 0.0,
            auth_import_attempts: 3,
            fetch_retry_attempts: 0,
            retry_base_delay_ms: 1000,
            download_dir: PathBuf::from("downloads"),
        }
    }
}

impl Config {
    /// Default config file location
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("tgfetch")
            .join("config.json")
    }

    /// Load configuration from a file, with environment variable overrides
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!("Failed to read config file: {}", e))
        })?;

        let mut config: Config = serde_json::from_str(&content).map_err(|e| {
            Error::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.apply_env_overrides();

        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Some(id) = env_parse::<i32>("TELEGRAM_APP_ID") {
            self.telegram.api_id = id;
        }

        if let Ok(api_hash) = std::env::var("TELEGRAM_APP_HASH") {
            let hash = api_hash.trim().to_string();
            if !hash.is_empty() {
                self.telegram.api_hash = hash;
            }
        }

        if let Some(dc_id) = env_parse::<DcId>("TELEGRAM_DC_ID") {
            self.telegram.home_dc_id = dc_id;
        }

        if let Ok(dir) = std::env::var("TGFETCH_DOWNLOAD_DIR") {
            let dir = dir.trim();
            if !dir.is_empty() {
                self.download.download_dir = PathBuf::from(dir);
            }
        }

        if let Some(n) = env_parse::<usize>("TGFETCH_MAX_CONCURRENT_DOWNLOADS") {
            self.download.max_concurrent_downloads = n;
        }
    }

    /// Create a new config from environment variables only
    pub fn from_env() -> Result<Self> {
        let mut config = Config::default();
        config.apply_env_overrides();

        if config.telegram.api_id == 0 {
            return Err(Error::InvalidConfig(
                "TELEGRAM_APP_ID environment variable is required".to_string(),
            ));
        }
        if config.telegram.api_hash.is_empty() {
            return Err(Error::InvalidConfig(
                "TELEGRAM_APP_HASH environment variable is required".to_string(),
            ));
        }

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            Error::Config(format!("Failed to serialize config: {}", e))
        })?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), content).map_err(|e| {
            Error::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.telegram.api_id == 0 {
            return Err(Error::InvalidConfig(
                "Telegram API ID is required".to_string(),
            ));
        }

        if self.telegram.api_hash.is_empty() {
            return Err(Error::InvalidConfig(
                "Telegram API hash is required".to_string(),
            ));
        }

        if self.telegram.home_dc_id <= 0 {
            return Err(Error::InvalidConfig(format!(
                "Invalid home datacenter {}",
                self.telegram.home_dc_id
            )));
        }

        self.download.validate()
    }
}

impl DownloadConfig {
    /// Validate the download settings
    pub fn validate(&self) -> Result<()> {
        let limit = self.chunk_size_limit;
        if limit == 0 || limit > MAX_CHUNK_SIZE || limit % CHUNK_ALIGNMENT != 0 {
            return Err(Error::InvalidConfig(format!(
                "chunk_size_limit must be a multiple of {} between {} and {}, got {}",
                CHUNK_ALIGNMENT, CHUNK_ALIGNMENT, MAX_CHUNK_SIZE, limit
            )));
        }

        if self.max_concurrent_downloads == 0 {
            return Err(Error::InvalidConfig(
                "max_concurrent_downloads must be greater than 0".to_string(),
            ));
        }

        if self.auth_import_attempts == 0 {
            return Err(Error::InvalidConfig(
                "auth_import_attempts must be greater than 0".to_string(),
            ));
        }

        let rps = self.requests_per_second;
        if !rps.is_finite() || rps < 0.0 || (rps > 0.0 && rps < MIN_REQUESTS_PER_SECOND) {
            return Err(Error::InvalidConfig(format!(
                "requests_per_second must be 0 or at least {}, got {}",
                MIN_REQUESTS_PER_SECOND, rps
            )));
        }

        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
