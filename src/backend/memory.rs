//! Process-local backend.
//!
//! Mirrors the ClickHouse table semantics closely enough for local runs and
//! tests: samples are appended per series, and label descriptors collapse on
//! `(date, fingerprint)` with the last write winning.

use super::Backend;
use crate::core::{Fingerprint, GatewayError, LabelDescriptorRow, Result, SampleRow};
use chrono::NaiveDate;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};

pub struct MemoryBackend {
    samples: RwLock<HashMap<Fingerprint, Vec<SampleRow>>>,
    series: RwLock<BTreeMap<(NaiveDate, Fingerprint), String>>,
    available: AtomicBool,
    bootstrapped: AtomicBool,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            samples: RwLock::new(HashMap::new()),
            series: RwLock::new(BTreeMap::new()),
            available: AtomicBool::new(true),
            bootstrapped: AtomicBool::new(false),
        }
    }

    /// Simulates an outage: while unavailable every operation fails as if
    /// the server could not be reached.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::Relaxed);
    }

    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped.load(Ordering::Relaxed)
    }

    /// Total stored samples across all series
    pub fn sample_count(&self) -> usize {
        self.samples.read().values().map(Vec::len).sum()
    }

    /// Distinct `(date, fingerprint)` descriptor rows
    pub fn series_count(&self) -> usize {
        self.series.read().len()
    }

    /// Stored label JSON for a descriptor row.
    pub fn labels_json(&self, date: NaiveDate, fingerprint: Fingerprint) -> Option<String> {
        self.series.read().get(&(date, fingerprint)).cloned()
    }

    fn check_available(&self) -> Result<()> {
        if self.available.load(Ordering::Relaxed) {
            Ok(())
        } else {
            Err(GatewayError::Unreachable("memory backend marked unavailable".to_string()))
        }
    }
}

#[async_trait::async_trait]
impl Backend for MemoryBackend {
    async fn bootstrap(&self) -> Result<()> {
        self.check_available()?;
        self.bootstrapped.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn insert_samples(&self, rows: &[SampleRow]) -> Result<()> {
        self.check_available()?;
        let mut samples = self.samples.write();
        for row in rows {
            samples.entry(row.fingerprint).or_default().push(row.clone());
        }
        Ok(())
    }

    async fn insert_label_descriptors(&self, rows: &[LabelDescriptorRow]) -> Result<()> {
        self.check_available()?;
        let mut series = self.series.write();
        for row in rows {
            series.insert((row.date, row.fingerprint), row.labels_json.clone());
        }
        Ok(())
    }

    async fn select_samples(&self, fingerprint: Fingerprint) -> Result<Vec<SampleRow>> {
        self.check_available()?;
        let mut rows = self
            .samples
            .read()
            .get(&fingerprint)
            .cloned()
            .unwrap_or_default();
        // Stable: equal timestamps keep insertion order
        rows.sort_by_key(|row| row.timestamp_ms);
        Ok(rows)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LabelSet;

    fn sample(fp: u64, ts: i64, line: &str) -> SampleRow {
        SampleRow::new(Fingerprint::from_u64(fp), ts, 0.0, line.to_string())
    }

    #[tokio::test]
    async fn test_select_orders_by_timestamp() {
        let backend = MemoryBackend::new();
        backend
            .insert_samples(&[sample(1, 30, "c"), sample(1, 10, "a"), sample(2, 5, "other")])
            .await
            .unwrap();
        backend.insert_samples(&[sample(1, 20, "b")]).await.unwrap();

        let rows = backend.select_samples(Fingerprint::from_u64(1)).await.unwrap();
        let lines: Vec<_> = rows.iter().map(|r| r.line.as_str()).collect();
        assert_eq!(lines, vec!["a", "b", "c"]);
        assert_eq!(backend.sample_count(), 4);
    }

    #[tokio::test]
    async fn test_select_unknown_series_is_empty() {
        let backend = MemoryBackend::new();
        assert!(backend
            .select_samples(Fingerprint::from_u64(99))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_label_descriptors_collapse_per_day() {
        let backend = MemoryBackend::new();
        let fp = Fingerprint::from_u64(7);
        let day = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let next_day = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let labels = LabelSet::new().with("job", "x");

        let row = LabelDescriptorRow::new(day, fp, &labels);
        backend
            .insert_label_descriptors(&[row.clone(), row])
            .await
            .unwrap();
        backend
            .insert_label_descriptors(&[LabelDescriptorRow::new(next_day, fp, &labels)])
            .await
            .unwrap();

        assert_eq!(backend.series_count(), 2);
        assert_eq!(backend.labels_json(day, fp).as_deref(), Some("{\"job\":\"x\"}"));
    }

    #[tokio::test]
    async fn test_unavailable_backend_fails() {
        let backend = MemoryBackend::new();
        backend.set_available(false);

        assert!(backend.bootstrap().await.is_err());
        let err = backend.insert_samples(&[sample(1, 1, "x")]).await.unwrap_err();
        assert!(err.is_recoverable());
        assert!(!backend.is_bootstrapped());

        backend.set_available(true);
        backend.bootstrap().await.unwrap();
        assert!(backend.is_bootstrapped());
    }
}
