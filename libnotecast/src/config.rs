//! Configuration management for Notecast

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dispatch: DispatchConfig,
    #[serde(default)]
    pub x: XConfig,
    #[serde(default)]
    pub nostr: NostrConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Maximum publish attempts per platform per dispatcher run.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Base of the exponential backoff between attempts, in seconds.
    #[serde(default = "default_backoff_base_secs")]
    pub backoff_base_secs: u64,
    /// Seconds between dispatcher ticks in the daemon.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base_secs: default_backoff_base_secs(),
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct XConfig {
    #[serde(default = "default_x_api_base_url")]
    pub api_base_url: String,
}

impl Default for XConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_x_api_base_url(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NostrConfig {
    /// Relays every event is broadcast to, in addition to each user's own list.
    #[serde(default = "default_relays")]
    pub default_relays: Vec<String>,
    /// Settle delay around relay connect/publish, in milliseconds.
    #[serde(default = "default_settle_ms")]
    pub settle_ms: u64,
}

impl Default for NostrConfig {
    fn default() -> Self {
        Self {
            default_relays: default_relays(),
            settle_ms: default_settle_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base_secs() -> u64 {
    2
}

fn default_poll_interval() -> u64 {
    60
}

fn default_x_api_base_url() -> String {
    crate::platforms::x::X_API_BASE_URL.to_string()
}

fn default_relays() -> Vec<String> {
    crate::platforms::nostr::DEFAULT_RELAYS
        .iter()
        .map(|url| url.to_string())
        .collect()
}

fn default_settle_ms() -> u64 {
    1500
}

impl Config {
    /// Load configuration from the default location
    ///
    /// An explicitly requested file (via `NOTECAST_CONFIG`) must exist; when
    /// the default XDG location has no config file yet, the built-in defaults
    /// are used instead.
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;

        if !config_path.exists() && std::env::var("NOTECAST_CONFIG").is_err() {
            return Ok(Self::default_config());
        }

        Self::load_from_path(&config_path)
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        let database_path = resolve_data_path()
            .map(|dir| dir.join("notes.db").to_string_lossy().to_string())
            .unwrap_or_else(|_| "~/.local/share/notecast/notes.db".to_string());

        Self {
            database: DatabaseConfig {
                path: database_path,
            },
            dispatch: DispatchConfig::default(),
            x: XConfig::default(),
            nostr: NostrConfig::default(),
        }
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("NOTECAST_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("notecast").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("notecast"))
}
