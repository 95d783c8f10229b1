//! Configuration data structures

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Environment variable holding the Telegram bot token. The token is never stored in the file.
pub const TELEGRAM_TOKEN_ENV: &str = "NUDGE_TELEGRAM_BOT_TOKEN";

/// Startup-time configuration failure. Fatal: callers should refuse to start.
#[derive(Error, Debug)]
pub enum ConfigurationError {
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize configuration: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Could not determine config directory")]
    NoConfigDir,

    #[error("Invalid configuration: {}", .0.join("; "))]
    Invalid(Vec<String>),
}

/// Logging level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum LogLevel {
    #[serde(rename = "error")]
    Error,
    #[serde(rename = "warn")]
    Warn,
    #[serde(rename = "info")]
    #[default]
    Info,
    #[serde(rename = "debug")]
    Debug,
    #[serde(rename = "trace")]
    Trace,
}

/// Outbound traffic budget against the chat provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    /// Sustained cap over any 60 second window
    pub max_per_minute: u32,
    /// Cap over any 1 second window
    pub burst_size: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_per_minute: 20,
            burst_size: 5,
        }
    }
}

/// Notification batching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchingConfig {
    /// Accumulation window for normal/low priority notifications
    pub window_seconds: u64,
    /// Queue length that forces an immediate flush
    pub max_queue_size: usize,
    /// Unflushed entries older than `stale_multiplier * window_seconds` are dropped
    pub stale_multiplier: u32,
}

impl Default for BatchingConfig {
    fn default() -> Self {
        Self {
            window_seconds: 30,
            max_queue_size: 20,
            stale_multiplier: 2,
        }
    }
}

impl BatchingConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

/// Longest accepted `approvals.retention_hours` (30 days).
pub const MAX_RETENTION_HOURS: u64 = 720;

/// Longest accepted `approvals.sweep_interval_minutes` (one day).
pub const MAX_SWEEP_INTERVAL_MINUTES: u64 = 1440;

/// Approval requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApprovalConfig {
    /// Default wait timeout when the caller does not give one
    pub timeout_seconds: u64,
    /// Age after which an unawaited request is swept
    pub retention_hours: u64,
    /// How often the sweep runs
    pub sweep_interval_minutes: u64,
}

impl Default for ApprovalConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300, // 5 minutes default
            retention_hours: 24,
            sweep_interval_minutes: 60,
        }
    }
}

impl ApprovalConfig {
    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_hours.saturating_mul(3600))
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_minutes.saturating_mul(60))
    }
}

/// Retry of transient gateway failures.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8000,
        }
    }
}

/// Telegram provider settings (token comes from `NUDGE_TELEGRAM_BOT_TOKEN`).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub chat_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub telegram: TelegramConfig,
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    /// Logging verbosity level
    pub log_level: LogLevel,
    pub rate_limit: RateLimitConfig,
    pub batching: BatchingConfig,
    pub approvals: ApprovalConfig,
    pub retry: RetryConfig,
    pub providers: ProvidersConfig,
}

impl Configuration {
    /// Load configuration from file, falling back to defaults when the file does not exist
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(Configuration::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigurationError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load and validate. This is the startup entry point.
    pub fn load_validated(path: &Path) -> Result<Self, ConfigurationError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigurationError> {
        let content = toml::to_string_pretty(self)?;
        let io_err = |source| ConfigurationError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, content).map_err(io_err)?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn default_config_path() -> Result<PathBuf, ConfigurationError> {
        let config_dir = dirs::config_dir().ok_or(ConfigurationError::NoConfigDir)?;
        Ok(config_dir.join("nudge").join("config.toml"))
    }

    /// Telegram bot token from the environment, if set and non-empty
    pub fn telegram_token() -> Option<String> {
        std::env::var(TELEGRAM_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
    }

    /// Validate configuration values. Reports every problem at once.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut errors = Vec::new();

        let rate = &self.rate_limit;
        if !(1..=1000).contains(&rate.max_per_minute) {
            errors.push("rate_limit.max_per_minute must be between 1 and 1000".to_string());
        }
        if rate.burst_size == 0 {
            errors.push("rate_limit.burst_size must be positive".to_string());
        } else if rate.burst_size > rate.max_per_minute {
            errors.push("rate_limit.burst_size cannot exceed rate_limit.max_per_minute".to_string());
        }

        let batching = &self.batching;
        if !(1..=3600).contains(&batching.window_seconds) {
            errors.push("batching.window_seconds must be between 1 and 3600".to_string());
        }
        if !(1..=1000).contains(&batching.max_queue_size) {
            errors.push("batching.max_queue_size must be between 1 and 1000".to_string());
        }
        if !(1..=10).contains(&batching.stale_multiplier) {
            errors.push("batching.stale_multiplier must be between 1 and 10".to_string());
        }

        let approvals = &self.approvals;
        if !(1..=86_400).contains(&approvals.timeout_seconds) {
            errors.push("approvals.timeout_seconds must be between 1 and 86400".to_string());
        }
        if !(1..=MAX_RETENTION_HOURS).contains(&approvals.retention_hours) {
            errors.push(format!(
                "approvals.retention_hours must be between 1 and {}",
                MAX_RETENTION_HOURS
            ));
        }
        if !(1..=MAX_SWEEP_INTERVAL_MINUTES).contains(&approvals.sweep_interval_minutes) {
            errors.push(format!(
                "approvals.sweep_interval_minutes must be between 1 and {}",
                MAX_SWEEP_INTERVAL_MINUTES
            ));
        }

        let retry = &self.retry;
        if !(1..=10).contains(&retry.max_attempts) {
            errors.push("retry.max_attempts must be between 1 and 10".to_string());
        }
        if retry.base_delay_ms > retry.max_delay_ms {
            errors.push("retry.base_delay_ms cannot exceed retry.max_delay_ms".to_string());
        }

        let telegram = &self.providers.telegram;
        if telegram.enabled
            && telegram
                .chat_id
                .as_deref()
                .map_or(true, |c| c.trim().is_empty())
        {
            errors.push("providers.telegram.chat_id is required when telegram is enabled".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError::Invalid(errors))
        }
    }
}
