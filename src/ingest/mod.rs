//! Ingestion path for Loki push requests.
//!
//! Each stream's selector is parsed once, fingerprinted and recorded in the
//! label index; its descriptor goes to the labels buffer and its entries to
//! the samples buffer. Nothing here waits for the backend.

use crate::buffer::BatchBuffer;
use crate::core::{fingerprint, Fingerprint, LabelDescriptorRow, SampleRow};
use crate::index::LabelCatalog;
use crate::query::parse_selector;
use chrono::{DateTime, NaiveDate, Utc};
use serde::de::{DeserializeOwned, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, warn};

/// Epoch values at or above this magnitude are nanoseconds, below it
/// milliseconds. 10^14 ms is past the year 5000; 10^14 ns is 1970-01-02.
pub const NANOS_THRESHOLD: i64 = 100_000_000_000_000;

/// Body of `POST /api/prom/push`.
///
/// A badly typed stream or entry is dropped on its own; the rest of the
/// request is still ingested.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushRequest {
    #[serde(default, deserialize_with = "lenient_list")]
    pub streams: Vec<PushStream>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushStream {
    /// Selector text such as `{job="api"}`
    #[serde(default)]
    pub labels: Option<Value>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub entries: Vec<PushEntry>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PushEntry {
    /// RFC3339 string, or an epoch number (or numeric string) in ms or ns,
    /// see [`NANOS_THRESHOLD`]
    #[serde(default, alias = "timestamp")]
    pub ts: Option<Value>,
    #[serde(default)]
    pub line: Option<Value>,
    #[serde(default)]
    pub value: Option<Value>,
}

/// Deserializes a JSON array element by element, dropping the elements
/// that do not fit `T`. A non-array counts as empty.
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let items = match Value::deserialize(deserializer)? {
        Value::Array(items) => items,
        Value::Null => return Ok(Vec::new()),
        other => {
            warn!(found = %other, "Ignoring push field that is not an array");
            return Ok(Vec::new());
        },
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Dropping malformed push element: {}", e);
                None
            },
        })
        .collect())
}

/// Per-request ingestion counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestSummary {
    pub streams_accepted: usize,
    pub streams_rejected: usize,
    pub entries_accepted: usize,
    pub entries_rejected: usize,
}

fn epoch_to_ms(epoch: i64) -> i64 {
    if epoch.unsigned_abs() >= NANOS_THRESHOLD.unsigned_abs() {
        epoch.div_euclid(1_000_000)
    } else {
        epoch
    }
}

/// Converts a push timestamp to milliseconds since the epoch.
pub fn parse_timestamp_ms(ts: &Value) -> Option<i64> {
    match ts {
        Value::Number(n) => match n.as_i64() {
            Some(epoch) => Some(epoch_to_ms(epoch)),
            None => {
                let f = n.as_f64().filter(|f| f.is_finite())?;
                if f.abs() >= NANOS_THRESHOLD as f64 {
                    Some((f / 1_000_000.0).floor() as i64)
                } else {
                    Some(f.floor() as i64)
                }
            },
        },
        Value::String(s) => {
            if let Ok(epoch) = s.parse::<i64>() {
                return Some(epoch_to_ms(epoch));
            }
            DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.timestamp_millis())
        },
        _ => None,
    }
}

/// Numeric sample value: absent or null is 0, numeric strings are parsed.
pub fn parse_value(value: Option<&Value>) -> Option<f64> {
    match value {
        None | Some(Value::Null) => Some(0.0),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        Some(_) => None,
    }
}

fn line_text(line: Option<&Value>) -> String {
    match line {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Routes push requests into the index and both batch buffers.
pub struct Ingester {
    index: Arc<dyn LabelCatalog>,
    samples: Arc<BatchBuffer<SampleRow>>,
    labels: Arc<BatchBuffer<LabelDescriptorRow>>,
}

impl Ingester {
    pub fn new(
        index: Arc<dyn LabelCatalog>,
        samples: Arc<BatchBuffer<SampleRow>>,
        labels: Arc<BatchBuffer<LabelDescriptorRow>>,
    ) -> Self {
        Self {
            index,
            samples,
            labels,
        }
    }

    pub fn ingest(&self, request: &PushRequest) -> IngestSummary {
        self.ingest_on(request, Utc::now().date_naive())
    }

    /// Ingests with an explicit date for the label descriptor rows.
    pub fn ingest_on(&self, request: &PushRequest, today: NaiveDate) -> IngestSummary {
        let mut summary = IngestSummary::default();

        for stream in &request.streams {
            let Some(raw) = stream.labels.as_ref().and_then(Value::as_str) else {
                warn!(labels = ?stream.labels, "Skipping stream without string labels");
                summary.streams_rejected += 1;
                continue;
            };
            let labels = match parse_selector(raw) {
                Ok(labels) => labels,
                Err(e) => {
                    warn!(labels = raw, "Skipping stream: {}", e);
                    summary.streams_rejected += 1;
                    continue;
                },
            };

            let fp = fingerprint(&labels);
            self.index.record_label_set(fp, &labels);
            self.labels
                .add(fp, LabelDescriptorRow::new(today, fp, &labels));
            summary.streams_accepted += 1;

            for entry in &stream.entries {
                if self.push_entry(fp, entry) {
                    summary.entries_accepted += 1;
                } else {
                    summary.entries_rejected += 1;
                }
            }
        }

        debug!(
            streams = summary.streams_accepted,
            entries = summary.entries_accepted,
            rejected_streams = summary.streams_rejected,
            rejected_entries = summary.entries_rejected,
            "Push ingested"
        );
        summary
    }

    fn push_entry(&self, fp: Fingerprint, entry: &PushEntry) -> bool {
        let Some(timestamp_ms) = entry.ts.as_ref().and_then(parse_timestamp_ms) else {
            warn!(fingerprint = %fp, ts = ?entry.ts, "Skipping entry with missing or invalid timestamp");
            return false;
        };

        let Some(value) = parse_value(entry.value.as_ref()) else {
            warn!(fingerprint = %fp, value = ?entry.value, "Skipping entry with non-numeric value");
            return false;
        };

        self.samples.add(
            fp,
            SampleRow::new(fp, timestamp_ms, value, line_text(entry.line.as_ref())),
        );
        true
    }
}
