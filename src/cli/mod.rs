//! Command-line interface for the gateway.
//!
//! Flags override environment variables, which override the YAML file,
//! which overrides built-in defaults. The deployment variables `PORT`,
//! `CLICKHOUSE_SERVER`, `CLICKHOUSE_PORT` and `CLICKHOUSE_TSDB` are honoured.

use crate::application::Application;
use crate::core::config::{ConfigBuilder, LoggingConfig};
use crate::core::{BackendKind, Config, GatewayError, Result};
use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;

/// Loki push/query API in front of ClickHouse
#[derive(Parser, Debug, Default)]
#[command(name = "lokihouse")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// HTTP API port
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Address to bind the HTTP API to
    #[arg(long, env = "LOKIHOUSE_BIND_ADDRESS")]
    pub bind_address: Option<IpAddr>,

    /// Full ClickHouse HTTP URL, e.g. http://localhost:8123
    #[arg(long, env = "LOKIHOUSE_CLICKHOUSE_URL")]
    pub clickhouse_url: Option<String>,

    /// ClickHouse host, used when no full URL is given
    #[arg(long, env = "CLICKHOUSE_SERVER")]
    pub clickhouse_server: Option<String>,

    /// ClickHouse HTTP port, used when no full URL is given
    #[arg(long, env = "CLICKHOUSE_PORT")]
    pub clickhouse_port: Option<u16>,

    /// ClickHouse user
    #[arg(long, env = "CLICKHOUSE_USER")]
    pub clickhouse_user: Option<String>,

    /// ClickHouse password
    #[arg(long, env = "CLICKHOUSE_PASSWORD", hide_env_values = true)]
    pub clickhouse_password: Option<String>,

    /// Database holding the samples and time_series tables
    #[arg(long, env = "CLICKHOUSE_TSDB")]
    pub database: Option<String>,

    /// Storage backend
    #[arg(long, env = "LOKIHOUSE_BACKEND", value_enum)]
    pub backend: Option<BackendKind>,

    /// Configuration file path (default: ~/.config/lokihouse/config.yaml)
    #[arg(short, long, env = "LOKIHOUSE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, env = "LOKIHOUSE_DEBUG")]
    pub debug: bool,

    /// Emit JSON log lines
    #[arg(long, env = "LOKIHOUSE_LOG_JSON")]
    pub log_json: bool,

    /// Validate configuration and exit
    #[arg(long)]
    pub check_config: bool,
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }

    /// Load configuration with proper precedence:
    /// 1. CLI arguments (highest priority)
    /// 2. Environment variables
    /// 3. Config file
    /// 4. Defaults (lowest priority)
    ///
    /// Returns the file the configuration was read from, if any.
    pub async fn load_config(&self) -> Result<(Config, Option<PathBuf>)> {
        let mut builder = ConfigBuilder::new();

        let config_path = match &self.config {
            Some(path) => Some(path.clone()),
            None => dirs::config_dir()
                .map(|d| d.join("lokihouse").join("config.yaml"))
                .filter(|path| path.exists()),
        };

        let mut source = None;
        if let Some(path) = config_path {
            match tokio::fs::read_to_string(&path).await {
                Ok(content) => {
                    builder = builder.from_yaml(&content)?;
                    source = Some(path);
                },
                Err(e) if self.config.is_some() => {
                    return Err(GatewayError::config(format!(
                        "Failed to read config file {:?}: {}",
                        path, e
                    )));
                },
                // Default location vanished between exists() and read
                Err(_) => {},
            }
        }

        Ok((self.apply_overrides(builder).build()?, source))
    }

    fn apply_overrides(&self, mut builder: ConfigBuilder) -> ConfigBuilder {
        if let Some(port) = self.port {
            builder = builder.port(port);
        }
        if let Some(addr) = self.bind_address {
            builder = builder.bind_address(addr);
        }
        if let Some(url) = self.resolve_clickhouse_url() {
            builder = builder.clickhouse_url(url);
        }
        if let Some(user) = &self.clickhouse_user {
            builder = builder.credentials(user.clone(), self.clickhouse_password.clone());
        }
        if let Some(database) = &self.database {
            builder = builder.database(database.clone());
        }
        if let Some(backend) = self.backend {
            builder = builder.backend(backend);
        }
        if self.log_json {
            builder = builder.structured_logging(true);
        }
        builder.debug(self.debug)
    }

    /// Full URL if given, else one assembled from host and port.
    fn resolve_clickhouse_url(&self) -> Option<String> {
        if let Some(url) = &self.clickhouse_url {
            return Some(url.clone());
        }
        if self.clickhouse_server.is_none() && self.clickhouse_port.is_none() {
            return None;
        }

        let host = self.clickhouse_server.as_deref().unwrap_or("localhost");
        let port = self.clickhouse_port.unwrap_or(8123);
        if host.contains("://") {
            Some(format!("{}:{}", host.trim_end_matches('/'), port))
        } else {
            Some(format!("http://{}:{}", host, port))
        }
    }
}

/// Initialize logging.
///
/// `RUST_LOG` wins; otherwise `--debug`, then `LOKIHOUSE_LOG_LEVEL`, then
/// the configured level.
pub fn init_logging(logging: &LoggingConfig, debug: bool) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let log_level = if debug {
        "debug".to_string()
    } else {
        std::env::var("LOKIHOUSE_LOG_LEVEL").unwrap_or_else(|_| logging.level.as_str().to_string())
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_level));
    let registry = tracing_subscriber::registry().with(filter);

    let result = if logging.structured {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_current_span(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false).compact())
            .try_init()
    };

    result.map_err(|e| GatewayError::config(format!("Failed to initialize logging: {}", e)))
}

/// Execute the gateway.
pub async fn execute(cli: Cli) -> Result<()> {
    let (config, source) = cli.load_config().await?;

    if cli.check_config {
        println!("Configuration is valid!");
        println!("  Listen: {}:{}", config.server.bind_address, config.server.port);
        println!("  Backend: {:?}", config.clickhouse.backend);
        println!("  ClickHouse: {} (database {})", config.clickhouse.url, config.clickhouse.database);
        println!(
            "  Samples buffer: {} rows / {:?}",
            config.buffers.samples.max_entries, config.buffers.samples.max_age
        );
        println!(
            "  Labels buffer: {} rows / {:?}",
            config.buffers.labels.max_entries, config.buffers.labels.max_age
        );
        return Ok(());
    }

    init_logging(&config.logging, config.debug)?;
    match &source {
        Some(path) => tracing::info!("Loaded configuration from: {:?}", path),
        None => tracing::debug!("No config file found, using defaults"),
    }

    Application::new(config)?.run().await
}
