//! In-memory label index for the label discovery endpoints.
//!
//! The index is append-only: fingerprints, label names and label values are
//! never evicted for the lifetime of the process. Callers only see it through
//! [`LabelCatalog`], so a bounded implementation can be dropped in later.

use crate::core::{Fingerprint, LabelSet};
use dashmap::DashMap;
use std::collections::BTreeSet;

/// Record/lookup capability over observed label sets.
pub trait LabelCatalog: Send + Sync {
    /// Stores the label set for a fingerprint and indexes every pair.
    fn record_label_set(&self, fingerprint: Fingerprint, labels: &LabelSet);

    /// All label names ever observed, sorted.
    fn label_names(&self) -> Vec<String>;

    /// All values ever observed for `name`, sorted; empty if unknown.
    fn label_values(&self, name: &str) -> Vec<String>;

    /// Reverse lookup of a fingerprint.
    fn label_set(&self, fingerprint: Fingerprint) -> Option<LabelSet>;
}

/// Unbounded, concurrent label index.
///
/// Each map is sharded by `DashMap`; a value set is mutated while its shard
/// is write-locked, so readers observe it either before or after an insert.
#[derive(Default)]
pub struct LabelIndex {
    /// fingerprint -> label set
    series: DashMap<Fingerprint, LabelSet>,
    /// label name -> distinct values; the keys double as the set of names
    values: DashMap<String, BTreeSet<String>>,
}

impl LabelIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct fingerprints recorded
    pub fn series_count(&self) -> usize {
        self.series.len()
    }
}

impl LabelCatalog for LabelIndex {
    fn record_label_set(&self, fingerprint: Fingerprint, labels: &LabelSet) {
        self.series.insert(fingerprint, labels.clone());

        for (name, value) in labels.iter() {
            // Skip the write lock when the value is already known
            if let Some(known) = self.values.get(name) {
                if known.contains(value) {
                    continue;
                }
            }
            self.values
                .entry(name.to_string())
                .or_default()
                .insert(value.to_string());
        }
    }

    fn label_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.iter().map(|e| e.key().clone()).collect();
        names.sort_unstable();
        names
    }

    fn label_values(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .map(|values| values.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn label_set(&self, fingerprint: Fingerprint) -> Option<LabelSet> {
        self.series.get(&fingerprint).map(|l| l.value().clone())
    }
}
