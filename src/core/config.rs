//! Configuration management for the gateway.
//!
//! This module provides configuration handling with:
//! - YAML file support
//! - Environment variable and CLI overrides (applied by `cli`)
//! - Validation and defaults

use crate::core::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// Complete gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// ClickHouse connection configuration
    pub clickhouse: ClickHouseConfig,
    /// Write-behind buffer configuration
    pub buffers: BuffersConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Debug mode
    #[serde(skip)]
    pub debug: bool,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind address for the API listener
    pub bind_address: IpAddr,
    /// API port
    pub port: u16,
    /// Maximum concurrently handled requests
    pub max_connections: usize,
}

/// Which storage backend to run against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// ClickHouse over HTTP
    Clickhouse,
    /// Process-local store, for local runs and tests
    Memory,
}

/// ClickHouse connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClickHouseConfig {
    /// Backend selection
    pub backend: BackendKind,
    /// Base URL of the ClickHouse HTTP interface
    pub url: String,
    /// Database holding the `samples` and `time_series` tables
    pub database: String,
    /// Optional user name
    pub username: Option<String>,
    /// Optional password
    pub password: Option<String>,
    /// Per-statement timeout
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
}

/// Configuration of both batch buffers
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuffersConfig {
    /// High-volume sample rows
    pub samples: BufferConfig,
    /// Low-volume label descriptor rows
    pub labels: BufferConfig,
}

/// Flush thresholds for one batch buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferConfig {
    /// Total buffered rows that force a flush
    pub max_entries: usize,
    /// Flush period for a non-empty generation
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
    /// Keys written in parallel during one flush
    #[serde(default = "default_flush_concurrency")]
    pub flush_concurrency: usize,
}

fn default_flush_concurrency() -> usize {
    8
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level
    pub level: LogLevel,
    /// Emit JSON lines instead of compact text
    pub structured: bool,
}

/// Log levels
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Everything, including per-row detail
    Trace,
    /// Per-request and per-flush events
    Debug,
    /// Lifecycle events
    Info,
    /// Skipped streams and entries
    Warn,
    /// Failed writes only
    Error,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_address: IpAddr::from([0, 0, 0, 0]),
            port: 3100,
            max_connections: 1024,
        }
    }
}

impl Default for ClickHouseConfig {
    fn default() -> Self {
        ClickHouseConfig {
            backend: BackendKind::Clickhouse,
            url: "http://localhost:8123".to_string(),
            database: "loki".to_string(),
            username: None,
            password: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl Default for BuffersConfig {
    fn default() -> Self {
        BuffersConfig {
            samples: BufferConfig::samples(),
            labels: BufferConfig::labels(),
        }
    }
}

impl BufferConfig {
    /// Defaults for the sample buffer: large batches, short age
    pub fn samples() -> Self {
        BufferConfig {
            max_entries: 5000,
            max_age: Duration::from_secs(2),
            flush_concurrency: default_flush_concurrency(),
        }
    }

    /// Defaults for the label descriptor buffer: small batches, longer age
    pub fn labels() -> Self {
        BufferConfig {
            max_entries: 100,
            max_age: Duration::from_secs(5),
            flush_concurrency: default_flush_concurrency(),
        }
    }

    fn validate(&self, name: &str) -> Result<()> {
        if self.max_entries == 0 {
            return Err(GatewayError::config(format!(
                "buffers.{}.max_entries must be greater than 0",
                name
            )));
        }
        if self.max_age.is_zero() {
            return Err(GatewayError::config(format!(
                "buffers.{}.max_age must be greater than 0",
                name
            )));
        }
        if self.flush_concurrency == 0 {
            return Err(GatewayError::config(format!(
                "buffers.{}.flush_concurrency must be greater than 0",
                name
            )));
        }
        Ok(())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: LogLevel::Info,
            structured: false,
        }
    }
}

impl Config {
    /// Create new config with defaults
    pub fn new() -> Result<Self> {
        let config = Config::default();
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.max_connections == 0 {
            return Err(GatewayError::config("max_connections must be greater than 0"));
        }

        if self.clickhouse.database.is_empty() {
            return Err(GatewayError::config("clickhouse.database must not be empty"));
        }

        if !self
            .clickhouse
            .database
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(GatewayError::config(format!(
                "clickhouse.database '{}' may only contain [A-Za-z0-9_]",
                self.clickhouse.database
            )));
        }

        if self.clickhouse.backend == BackendKind::Clickhouse
            && !(self.clickhouse.url.starts_with("http://")
                || self.clickhouse.url.starts_with("https://"))
        {
            return Err(GatewayError::config(format!(
                "clickhouse.url must start with http:// or https://, got '{}'",
                self.clickhouse.url
            )));
        }

        self.buffers.samples.validate("samples")?;
        self.buffers.labels.validate("labels")?;

        Ok(())
    }
}

impl LogLevel {
    /// Convert to tracing filter string
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

/// Configuration builder for programmatic construction
pub struct ConfigBuilder {
    config: Config,
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        ConfigBuilder {
            config: Config::default(),
        }
    }

    /// Load configuration from YAML string
    pub fn from_yaml(mut self, yaml: &str) -> Result<Self> {
        self.config = serde_yaml::from_str(yaml)?;
        Ok(self)
    }

    /// Set API port
    pub fn port(mut self, port: u16) -> Self {
        self.config.server.port = port;
        self
    }

    /// Set bind address
    pub fn bind_address(mut self, addr: IpAddr) -> Self {
        self.config.server.bind_address = addr;
        self
    }

    /// Set backend kind
    pub fn backend(mut self, backend: BackendKind) -> Self {
        self.config.clickhouse.backend = backend;
        self
    }

    /// Set ClickHouse base URL
    pub fn clickhouse_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.clickhouse.url = url.into();
        self
    }

    /// Set ClickHouse database
    pub fn database<S: Into<String>>(mut self, database: S) -> Self {
        self.config.clickhouse.database = database.into();
        self
    }

    /// Set sample buffer thresholds
    pub fn samples_buffer(mut self, max_entries: usize, max_age: Duration) -> Self {
        self.config.buffers.samples.max_entries = max_entries;
        self.config.buffers.samples.max_age = max_age;
        self
    }

    /// Set label buffer thresholds
    pub fn labels_buffer(mut self, max_entries: usize, max_age: Duration) -> Self {
        self.config.buffers.labels.max_entries = max_entries;
        self.config.buffers.labels.max_age = max_age;
        self
    }

    /// Set debug mode
    pub fn debug(mut self, debug: bool) -> Self {
        self.config.debug = debug;
        self
    }

    /// Set ClickHouse credentials
    pub fn credentials<S: Into<String>>(mut self, username: S, password: Option<String>) -> Self {
        self.config.clickhouse.username = Some(username.into());
        self.config.clickhouse.password = password;
        self
    }

    /// Switch to JSON log lines
    pub fn structured_logging(mut self, structured: bool) -> Self {
        self.config.logging.structured = structured;
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<Config> {
        self.config.validate()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffers.samples.max_entries, 5000);
        assert_eq!(config.buffers.samples.max_age, Duration::from_secs(2));
        assert_eq!(config.buffers.labels.max_entries, 100);
        assert!(config.buffers.labels.max_age > config.buffers.samples.max_age);
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let mut config = Config::default();
        config.buffers.samples.max_entries = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.buffers.labels.max_age = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_database_name_validation() {
        assert!(ConfigBuilder::new().database("").build().is_err());
        assert!(ConfigBuilder::new().database("loki; DROP").build().is_err());
        assert!(ConfigBuilder::new().database("loki_2").build().is_ok());
    }

    #[test]
    fn test_url_validation_only_for_clickhouse() {
        assert!(ConfigBuilder::new().clickhouse_url("localhost:8123").build().is_err());
        assert!(ConfigBuilder::new()
            .backend(BackendKind::Memory)
            .clickhouse_url("unused")
            .build()
            .is_ok());
    }

    #[test]
    fn test_config_builder() {
        let config = ConfigBuilder::new()
            .port(9000)
            .database("logs")
            .samples_buffer(10, Duration::from_millis(50))
            .debug(true)
            .build()
            .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.clickhouse.database, "logs");
        assert_eq!(config.buffers.samples.max_entries, 10);
        assert_eq!(config.buffers.samples.max_age, Duration::from_millis(50));
        assert!(config.debug);
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r#"
server:
  bind_address: "127.0.0.1"
  port: 3200
clickhouse:
  url: "http://clickhouse:8123"
  database: tsdb
  timeout: 5s
buffers:
  samples:
    max_entries: 20000
    max_age: 1s
  labels:
    max_entries: 50
    max_age: 10s
    flush_concurrency: 2
logging:
  level: debug
  structured: true
"#;

        let config = ConfigBuilder::new().from_yaml(yaml).unwrap().build().unwrap();

        assert_eq!(config.server.port, 3200);
        assert_eq!(config.server.max_connections, 1024);
        assert_eq!(config.clickhouse.url, "http://clickhouse:8123");
        assert_eq!(config.clickhouse.database, "tsdb");
        assert_eq!(config.clickhouse.timeout, Duration::from_secs(5));
        assert_eq!(config.buffers.samples.max_entries, 20000);
        assert_eq!(config.buffers.samples.flush_concurrency, 8);
        assert_eq!(config.buffers.labels.max_age, Duration::from_secs(10));
        assert_eq!(config.buffers.labels.flush_concurrency, 2);
        assert!(config.logging.structured);
    }
}
