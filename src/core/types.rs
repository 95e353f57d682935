//! Label sets and the row types handed to the batch buffers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::core::fingerprint::Fingerprint;

/// Set of label name/value pairs identifying a stream.
///
/// Backed by a `BTreeMap`, so iteration is always in key order and the
/// canonical serialization falls out of plain iteration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    /// Creates an empty label set
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Inserts a label, replacing any previous value for the same name
    pub fn insert<K: Into<String>, V: Into<String>>(&mut self, name: K, value: V) -> Option<String> {
        self.0.insert(name.into(), value.into())
    }

    /// Builder-style insert
    pub fn with<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.insert(name, value);
        self
    }

    /// Returns the value of a label
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of labels
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the set has no labels
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates labels in canonical (name-sorted) order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Canonical textual form: a JSON object with keys sorted by name.
    ///
    /// This is the exact byte string fed to the fingerprint hash and the
    /// `labels` column written to the backend.
    pub fn canonical(&self) -> String {
        let map: serde_json::Map<String, serde_json::Value> = self
            .0
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        serde_json::Value::Object(map).to_string()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}={:?}", name, value)?;
        }
        f.write_str("}")
    }
}

/// One ingested log/metric event, destined for the `samples` table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    /// Series the sample belongs to
    pub fingerprint: Fingerprint,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: i64,
    /// Numeric value, 0 for plain log lines
    pub value: f64,
    /// Log line, stored in the `string` column
    pub line: String,
}

impl SampleRow {
    /// Creates a sample row
    pub fn new(fingerprint: Fingerprint, timestamp_ms: i64, value: f64, line: String) -> Self {
        Self {
            fingerprint,
            timestamp_ms,
            value,
            line,
        }
    }
}

/// One label descriptor, destined for the `time_series` table.
///
/// The backend table collapses duplicates on `(date, fingerprint)`, so the
/// same descriptor may be written once per push without harm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelDescriptorRow {
    /// Partition date of the push
    pub date: NaiveDate,
    /// Series the labels hash to
    pub fingerprint: Fingerprint,
    /// Canonical JSON of the label set
    pub labels_json: String,
}

impl LabelDescriptorRow {
    /// Describes `labels` as seen on `date`
    pub fn new(date: NaiveDate, fingerprint: Fingerprint, labels: &LabelSet) -> Self {
        Self {
            date,
            fingerprint,
            labels_json: labels.canonical(),
        }
    }
}
