//! Probe configuration
//!
//! YAML file plus environment overrides, validated after load.

use resock::ConnectionConfig;
use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load config file: {0}")]
    FileError(#[from] std::io::Error),

    #[error("Failed to parse YAML: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("Environment variable not found: {0}")]
    EnvVarMissing(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Environment variable overriding the target URL
pub const URL_ENV_VAR: &str = "RESOCK_URL";

/// Configuration of the `resock_probe` binary
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Target WebSocket address (`ws://` or `wss://`)
    #[serde(default)]
    pub url: String,

    /// Connection tunables; omitted fields keep their defaults
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// Log level (error, warn, info, debug, trace)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Turn on verbose dispatch logging for every connection
    #[serde(default)]
    pub verbose: bool,

    /// Seconds between metrics reports
    #[serde(default = "default_heartbeat")]
    pub heartbeat_interval_secs: u64,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_heartbeat() -> u64 {
    60
}

impl ProbeConfig {
    /// Load configuration from YAML file
    pub fn load(config_path: impl AsRef<Path>) -> Result<Self> {
        let yaml_content = std::fs::read_to_string(config_path)?;
        Self::from_yaml(&yaml_content)
    }

    /// Parse, apply environment overrides and validate
    pub fn from_yaml(yaml_content: &str) -> Result<Self> {
        let mut config: ProbeConfig = serde_yaml::from_str(yaml_content)?;

        // Override target URL from environment if present
        if let Ok(url) = std::env::var(URL_ENV_VAR) {
            info!("Overriding URL from environment variable");
            config.url = url;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        if self.url.is_empty() {
            return Err(ConfigError::EnvVarMissing(format!(
                "url not set in config and {} is empty",
                URL_ENV_VAR
            )));
        }

        if !(self.url.starts_with("ws://") || self.url.starts_with("wss://")) {
            return Err(ConfigError::ValidationError(format!(
                "url must start with ws:// or wss://, got {}",
                self.url
            )));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::ValidationError(format!(
                "log_level must be one of: {}",
                valid_levels.join(", ")
            )));
        }

        if self.heartbeat_interval_secs == 0 {
            return Err(ConfigError::ValidationError(
                "heartbeat_interval_secs must be greater than 0".to_string(),
            ));
        }

        self.connection
            .validate()
            .map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Log configuration summary
    pub fn log(&self) {
        info!("Configuration loaded:");
        info!("  URL: {}", self.url);
        info!("  Protocols: {:?}", self.connection.protocols);
        info!("  Connect timeout: {} ms", self.connection.connect_timeout_ms);
        info!("  Max retry delay: {} ms", self.connection.max_retry_delay_ms);
        info!(
            "  Queue flush base delay: {} ms",
            self.connection.queue_flush_base_delay_ms
        );
        info!("  Send policy: {:?}", self.connection.send_policy);
        info!("  Log level: {}", self.log_level);
    }
}
