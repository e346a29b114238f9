//! Configuration management for taskmine
//!
//! Handles loading and validation of `taskmine.toml` configuration files.
//!
//! ```toml
//! [general]
//! log_level = "info"
//! log_format = "pretty"
//!
//! [capture]
//! capture_input_value = false
//! hash_input_value = true
//! text_preview_chars = 120
//!
//! [debounce]
//! input_ms = 300
//! scroll_ms = 300
//!
//! [heartbeat]
//! interval_secs = 60
//!
//! [storage]
//! db_path = "~/.local/share/taskmine/events.db"
//! ```

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV_VAR: &str = "TASKMINE_CONFIG";

/// Config file name looked up under the user config directory.
pub const CONFIG_FILE_NAME: &str = "taskmine.toml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Capture capability flags
    #[serde(default)]
    pub capture: CaptureConfig,

    /// Debounce windows for high-frequency signals
    #[serde(default)]
    pub debounce: DebounceConfig,

    /// Heartbeat settings
    #[serde(default)]
    pub heartbeat: HeartbeatConfig,

    /// Delivery channel settings
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-friendly output
    #[default]
    Pretty,
    /// JSON lines
    Json,
}

impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pretty => f.write_str("pretty"),
            Self::Json => f.write_str("json"),
        }
    }
}

/// General configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log output format
    #[serde(default)]
    pub log_format: LogFormat,

    /// Optional log file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            log_file: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Capture capability flags.
///
/// Both flags default to the most privacy-preserving setting: field content
/// is never read, only its length.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Allow field content to be read at all (requires user consent)
    #[serde(default)]
    pub capture_input_value: bool,

    /// Hash captured content before it leaves the observation context
    #[serde(default = "default_true")]
    pub hash_input_value: bool,

    /// Upper bound on element text previews, in characters
    #[serde(default = "default_text_preview_chars")]
    pub text_preview_chars: usize,

    /// Emit `key_press` records
    #[serde(default = "default_true")]
    pub record_key_presses: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            capture_input_value: false,
            hash_input_value: true,
            text_preview_chars: default_text_preview_chars(),
            record_key_presses: true,
        }
    }
}

impl CaptureConfig {
    /// Whether input payloads carry a digest of the field value.
    #[must_use]
    pub fn hashes_values(&self) -> bool {
        self.capture_input_value && self.hash_input_value
    }
}

fn default_text_preview_chars() -> usize {
    120
}

fn default_true() -> bool {
    true
}

/// Debounce configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DebounceConfig {
    /// Trailing quiet window for `input` streams (per field)
    #[serde(default = "default_debounce_ms")]
    pub input_ms: u64,

    /// Trailing quiet window for the scroll stream
    #[serde(default = "default_debounce_ms")]
    pub scroll_ms: u64,
}

impl Default for DebounceConfig {
    fn default() -> Self {
        Self {
            input_ms: default_debounce_ms(),
            scroll_ms: default_debounce_ms(),
        }
    }
}

impl DebounceConfig {
    #[must_use]
    pub fn input_window(&self) -> Duration {
        Duration::from_millis(self.input_ms)
    }

    #[must_use]
    pub fn scroll_window(&self) -> Duration {
        Duration::from_millis(self.scroll_ms)
    }
}

fn default_debounce_ms() -> u64 {
    300
}

/// Heartbeat configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HeartbeatConfig {
    /// Emit heartbeat records
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Heartbeat period in seconds
    #[serde(default = "default_heartbeat_secs")]
    pub interval_secs: u64,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_heartbeat_secs(),
        }
    }
}

impl HeartbeatConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

fn default_heartbeat_secs() -> u64 {
    60
}

/// Delivery channel configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeliveryConfig {
    /// Records the transport holds before further sends are dropped
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_channel_capacity() -> usize {
    1024
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StorageConfig {
    /// Database file path
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// SQLite busy timeout in milliseconds
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl StorageConfig {
    #[must_use]
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

fn default_db_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("taskmine")
        .join("events.db")
}

fn default_busy_timeout_ms() -> u64 {
    5000
}

impl Config {
    /// Load configuration.
    ///
    /// Resolution order: explicit path, `TASKMINE_CONFIG`, the user config
    /// directory, then built-in defaults. An explicit path that does not
    /// exist is an error; a missing default file is not.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Self::load_from(Path::new(&path));
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFailed {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config = Self::from_toml(&raw)?;
        tracing::debug!(config_path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(raw).map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeFailed(e.to_string()))
    }

    /// Default config file location
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("taskmine").join(CONFIG_FILE_NAME))
    }

    /// Reject settings that would disable a component silently
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.capture.text_preview_chars == 0 {
            return Err(ConfigError::ValidationError(
                "capture.text_preview_chars must be greater than 0".to_string(),
            ));
        }
        if self.debounce.input_ms == 0 || self.debounce.scroll_ms == 0 {
            return Err(ConfigError::ValidationError(
                "debounce windows must be greater than 0 ms".to_string(),
            ));
        }
        if self.heartbeat.interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat.interval_secs must be greater than 0".to_string(),
            ));
        }
        if self.delivery.channel_capacity == 0 {
            return Err(ConfigError::ValidationError(
                "delivery.channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
