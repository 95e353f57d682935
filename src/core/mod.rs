//! Core domain types, configuration and errors.
//!
//! Everything the ingestion and query paths share lives here: label sets,
//! fingerprints, the row types handed to the backend, and the crate-wide
//! error type.

#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod types;

// Re-export commonly used types
pub use config::{BackendKind, BufferConfig, Config, ConfigBuilder};
pub use error::{GatewayError, Result};
pub use fingerprint::{fingerprint, Fingerprint};
pub use types::{LabelDescriptorRow, LabelSet, SampleRow};
