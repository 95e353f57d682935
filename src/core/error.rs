//! Crate-wide error type.

use thiserror::Error;

/// Errors raised anywhere in the gateway.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// A label selector could not be parsed
    #[error("Selector parse error: {message}")]
    Parse {
        /// What the parser choked on
        message: String,
    },

    /// A request was well-formed but unusable
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// ClickHouse answered with a non-success status
    #[error("Backend returned {status}: {body}")]
    Backend {
        /// HTTP status code
        status: u16,
        /// Response body, usually a ClickHouse exception
        body: String,
    },

    /// ClickHouse could not be reached at all
    #[error("Backend unreachable: {0}")]
    Unreachable(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// A row read back from the backend did not decode
    #[error("Malformed backend row: {0}")]
    MalformedRow(String),

    /// Filesystem or socket error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A JSON body did not deserialize
    #[error("Invalid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The YAML config file did not deserialize
    #[error("YAML config error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP client failure talking to the backend
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// A background task panicked or was cancelled
    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    /// A backend statement exceeded the configured timeout
    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout {
        /// Configured limit in milliseconds
        timeout_ms: u64,
    },
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Creates a new selector parse error
    pub fn parse<S: Into<String>>(msg: S) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid request error
    pub fn invalid_request<S: Into<String>>(msg: S) -> Self {
        Self::InvalidRequest(msg.into())
    }

    /// Creates a new backend error from an HTTP status and response body
    pub fn backend<S: Into<String>>(status: u16, body: S) -> Self {
        Self::Backend {
            status,
            body: body.into(),
        }
    }

    /// Returns true if this error was caused by the caller's input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Parse { .. } | Self::InvalidRequest(_) | Self::Serialization(_)
        )
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Unreachable(_) | Self::Timeout { .. } => true,
            Self::Backend { status, .. } => *status >= 500,
            Self::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Returns the error category for metrics/logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Parse { .. } | Self::InvalidRequest(_) => "request",
            Self::MalformedRow(_) => "storage",
            Self::Backend { .. } | Self::Unreachable(_) | Self::Http(_) => "backend",
            Self::Config(_) | Self::Yaml(_) => "config",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::Timeout { .. } => "timeout",
        }
    }
}
