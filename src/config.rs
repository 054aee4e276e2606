//! Client configuration
//!
//! Optional TOML file carrying broker defaults, MQTT session options and the
//! reconnect policy. Every section and field has a default, so an empty file
//! (or no file at all) yields a working configuration.

use crate::lifecycle::RetryPolicy;
use crate::params::CliInput;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "mqttsub.toml";

/// Main client configuration
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub broker: BrokerSection,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub retry: RetrySection,
}

/// Broker defaults, overridden by `--proto`, `--ip` and `--port`
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BrokerSection {
    pub protocol: Option<String>,
    pub ip: Option<String>,
    pub port: Option<String>,
}

/// MQTT session options
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct SessionConfig {
    /// Client identifier prefix; the process id is appended
    #[serde(default = "default_client_id")]
    pub client_id: String,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u64,
    #[serde(default = "default_clean_session")]
    pub clean_session: bool,
    /// Capacity of the request and event channels
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            client_id: default_client_id(),
            keep_alive_secs: default_keep_alive(),
            clean_session: default_clean_session(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

fn default_client_id() -> String {
    "mqttsub".to_string()
}

fn default_keep_alive() -> u64 {
    20
}

fn default_clean_session() -> bool {
    true
}

fn default_channel_capacity() -> usize {
    10
}

/// Reconnect policy
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct RetrySection {
    /// Consecutive connect failures tolerated before giving up
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Fixed delay before each reconnect, in milliseconds
    #[serde(default = "default_delay_ms")]
    pub delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}

fn default_delay_ms() -> u64 {
    2500
}

impl RetrySection {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            delay: Duration::from_millis(self.delay_ms),
        }
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClientConfig {
    /// Load and validate configuration from a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load `explicit` if given, else `fallback` when it exists, else defaults
    pub fn load_or_default(explicit: Option<&Path>, fallback: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            info!("Loading configuration from: {}", path.display());
            return Self::load_from_file(path);
        }

        if fallback.exists() {
            info!("Loading configuration from: {}", fallback.display());
            return Self::load_from_file(fallback);
        }

        debug!("No configuration file found, using defaults");
        Ok(Self::default())
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let client_id = &self.session.client_id;
        if client_id.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "session.client_id cannot be empty".to_string(),
            ));
        }
        if client_id.starts_with(char::is_whitespace) {
            return Err(ConfigError::InvalidConfig(
                "session.client_id cannot start with whitespace".to_string(),
            ));
        }
        if self.session.keep_alive_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.keep_alive_secs must be at least 1".to_string(),
            ));
        }
        if self.session.channel_capacity == 0 {
            return Err(ConfigError::InvalidConfig(
                "session.channel_capacity must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Fill broker fields the command line left unset
    pub fn apply_broker_defaults(&self, mut input: CliInput) -> CliInput {
        input.proto = input.proto.or_else(|| self.broker.protocol.clone());
        input.ip = input.ip.or_else(|| self.broker.ip.clone());
        input.port = input.port.or_else(|| self.broker.port.clone());
        input
    }
}
