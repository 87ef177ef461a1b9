//! Configuration loading
//!
//! A client can be described in a TOML file instead of builder calls:
//!
//! ```toml
//! token = "your-api-token"
//! project = "default"
//! target = "http://api.7segments.com"
//! customer = "jane@example.com"
//!
//! [transport]
//! kind = "socket"
//! connect_timeout_secs = 3
//!
//! [logging]
//! level = "debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::client::{DEFAULT_PROJECT, DEFAULT_TARGET};
use crate::customer::Customer;
use crate::error::{Error, Result};
use crate::transport::DEFAULT_CONNECT_TIMEOUT;

/// Main configuration struct
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// API token, sent as `company_id`
    pub token: String,

    /// Customer bound at construction (string, id table, or absent)
    #[serde(default)]
    pub customer: Customer,

    #[serde(default = "default_project")]
    pub project: String,

    /// API base URL
    #[serde(default = "default_target")]
    pub target: String,

    /// Log each call's URL and payload
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_project() -> String {
    DEFAULT_PROJECT.to_string()
}

fn default_target() -> String {
    DEFAULT_TARGET.to_string()
}

/// Which transport implementation to use
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// reqwest HTTP client
    #[default]
    Http,
    /// Hand-framed HTTP/1.1 over a TCP/TLS socket
    Socket,
}

/// Transport configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,

    /// Socket connect timeout in seconds (socket transport only)
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Request timeout in seconds; platform default when absent
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            kind: TransportKind::default(),
            connect_timeout_secs: default_connect_timeout(),
            timeout_secs: None,
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }
}

fn default_connect_timeout() -> u64 {
    DEFAULT_CONNECT_TIMEOUT.as_secs()
}

/// Logging configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Directory for rolling log files; logs go to stderr when unset
    #[serde(default)]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            directory: None,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Configuration with defaults for everything but the token
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            customer: Customer::Anonymous,
            project: default_project(),
            target: default_target(),
            debug: false,
            transport: TransportConfig::default(),
            logging: LoggingConfig::default(),
        }
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read config file {:?}: {}", path, e)))?;

        Self::from_toml_str(&content)
    }

    /// Parse configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| Error::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration, returning error message if invalid
    pub fn validate(&self) -> Result<()> {
        if self.token.is_empty() {
            return Err(Error::Config("token must not be empty".to_string()));
        }
        if self.project.is_empty() {
            return Err(Error::Config("project must not be empty".to_string()));
        }
        if self.target.is_empty() {
            return Err(Error::Config("target must not be empty".to_string()));
        }
        if self.transport.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "transport.connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.transport.timeout_secs == Some(0) {
            return Err(Error::Config(
                "transport.timeout_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
