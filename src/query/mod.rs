//! Query path: selector to fingerprint to backend range read.
//!
//! Only exact label-set lookups are supported. A selector that names a
//! subset of a stream's labels hashes to a different fingerprint and
//! returns nothing.

pub mod selector;

pub use selector::parse_selector;

use crate::backend::Backend;
use crate::core::{fingerprint, GatewayError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Query-string parameters of `GET /api/prom/query`.
///
/// Everything but `query` is accepted for API compatibility and ignored.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryParams {
    pub query: Option<String>,
    pub limit: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub direction: Option<String>,
    pub regexp: Option<String>,
}

impl QueryParams {
    pub fn selector<S: Into<String>>(query: S) -> Self {
        Self {
            query: Some(query.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub streams: Vec<StreamResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResponse {
    /// Canonical JSON of the queried label set
    pub labels: String,
    pub entries: Vec<EntryResponse>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryResponse {
    /// Milliseconds since the Unix epoch
    pub timestamp: i64,
    pub line: String,
}

/// Resolves selectors against the backend.
pub struct QueryEngine {
    backend: Arc<dyn Backend>,
}

impl QueryEngine {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }

    pub async fn query(&self, params: &QueryParams) -> Result<QueryResponse> {
        let start = Instant::now();
        let raw = params
            .query
            .as_deref()
            .ok_or_else(|| GatewayError::invalid_request("missing 'query' parameter"))?;

        let labels = parse_selector(raw)?;
        let fp = fingerprint(&labels);
        let rows = self.backend.select_samples(fp).await?;

        debug!(
            selector = %labels,
            fingerprint = %fp,
            rows = rows.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "Query resolved"
        );

        if rows.is_empty() {
            return Ok(QueryResponse { streams: Vec::new() });
        }

        let entries = rows
            .into_iter()
            .map(|row| EntryResponse {
                timestamp: row.timestamp_ms,
                line: row.line,
            })
            .collect();

        Ok(QueryResponse {
            streams: vec![StreamResponse {
                labels: labels.canonical(),
                entries,
            }],
        })
    }
}
