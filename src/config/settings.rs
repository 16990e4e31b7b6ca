//! Relay configuration
//!
//! Loads `[server]` and `[relay]` settings from a TOML file. Every field
//! has a default, so an empty or missing file is valid.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

use crate::relay::{DispatchOptions, RelayOptions, DEFAULT_QUEUE_CAPACITY};

pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_PORT: u16 = 8080;

/// Errors that can occur while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Listener settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind to
    pub bind: String,
    /// Port to listen on
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_BIND, DEFAULT_PORT)
    }
}

impl ServerConfig {
    pub fn new(bind: impl Into<String>, port: u16) -> Self {
        Self {
            bind: bind.into(),
            port,
        }
    }

    /// Get the socket address to bind to
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }
}

/// Broadcast behaviour
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RelaySettings {
    /// Do not echo a message back to its sender
    pub exclude_sender: bool,
    /// Capacity of the inbound message queue
    pub queue_capacity: usize,
    /// Per-recipient send timeout in milliseconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub send_timeout_ms: Option<u64>,
}

impl Default for RelaySettings {
    fn default() -> Self {
        Self {
            exclude_sender: false,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            send_timeout_ms: None,
        }
    }
}

impl RelaySettings {
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    pub fn to_options(&self) -> RelayOptions {
        RelayOptions {
            dispatch: DispatchOptions {
                exclude_sender: self.exclude_sender,
                send_timeout: self.send_timeout(),
            },
            queue_capacity: self.queue_capacity,
        }
    }
}

/// Full configuration file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub relay: RelaySettings,
}

impl RelayConfig {
    /// Load configuration from a file, falling back to defaults if it is absent
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: RelayConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.relay.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "relay.queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.relay.send_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "relay.send_timeout_ms must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}
