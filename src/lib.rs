//! Lokihouse - Loki push/query API in front of a columnar backend.
//!
//! Clients speak the Loki HTTP API; log lines and values are buffered in
//! memory and written to ClickHouse in per-series bulk inserts, while the
//! label catalog is served from an in-process index.
//!
//! # Architecture
//!
//! - `core`: label sets, fingerprints, row types, config and errors
//! - `index`: append-only label index behind `LabelCatalog`
//! - `buffer`: generic write-behind batch buffer with size/age triggers
//! - `backend`: ClickHouse HTTP and in-memory storage backends
//! - `ingest`: push request handling
//! - `query`: selector parsing and range reads
//! - `api`: axum router
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use lokihouse_lib::core::Config;
//! use lokihouse_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod api;
pub mod application;
pub mod backend;
pub mod buffer;
pub mod cli;
pub mod core;
pub mod index;
pub mod ingest;
pub mod query;

// Re-export core types for convenience
pub use crate::application::Application;
pub use crate::core::{Config, Result};
