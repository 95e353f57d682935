//! Storage backends for samples and label descriptors.
//!
//! The gateway writes through [`Backend`] only: batch buffers reach it via
//! the [`SamplesTable`] and [`LabelsTable`] sinks, the query path via
//! [`Backend::select_samples`].

use crate::buffer::FlushSink;
use crate::core::{BackendKind, Config, Fingerprint, LabelDescriptorRow, Result, SampleRow};
use std::sync::Arc;

pub mod clickhouse;
pub mod memory;
pub mod tsv;

pub use clickhouse::ClickHouseBackend;
pub use memory::MemoryBackend;

/// Trait for columnar storage backends.
#[async_trait::async_trait]
pub trait Backend: Send + Sync {
    /// Creates the database and both tables if missing.
    async fn bootstrap(&self) -> Result<()>;

    /// Bulk insert into the `samples` table.
    async fn insert_samples(&self, rows: &[SampleRow]) -> Result<()>;

    /// Bulk insert into the `time_series` table.
    async fn insert_label_descriptors(&self, rows: &[LabelDescriptorRow]) -> Result<()>;

    /// All samples of one series, ordered by timestamp ascending.
    async fn select_samples(&self, fingerprint: Fingerprint) -> Result<Vec<SampleRow>>;

    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;
}

/// Builds the backend selected by the configuration.
pub fn from_config(config: &Config) -> Result<Arc<dyn Backend>> {
    match config.clickhouse.backend {
        BackendKind::Clickhouse => Ok(Arc::new(ClickHouseBackend::new(&config.clickhouse)?)),
        BackendKind::Memory => Ok(Arc::new(MemoryBackend::new())),
    }
}

/// Flush sink writing sample rows to the `samples` table.
pub struct SamplesTable {
    backend: Arc<dyn Backend>,
}

impl SamplesTable {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl FlushSink<SampleRow> for SamplesTable {
    async fn write_rows(&self, _key: Fingerprint, rows: &[SampleRow]) -> Result<()> {
        self.backend.insert_samples(rows).await
    }
}

/// Flush sink writing label descriptors to the `time_series` table.
pub struct LabelsTable {
    backend: Arc<dyn Backend>,
}

impl LabelsTable {
    pub fn new(backend: Arc<dyn Backend>) -> Self {
        Self { backend }
    }
}

#[async_trait::async_trait]
impl FlushSink<LabelDescriptorRow> for LabelsTable {
    async fn write_rows(&self, _key: Fingerprint, rows: &[LabelDescriptorRow]) -> Result<()> {
        self.backend.insert_label_descriptors(rows).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ConfigBuilder, LabelSet};
    use chrono::NaiveDate;

    #[tokio::test]
    async fn test_sinks_write_through_backend() {
        let memory = Arc::new(MemoryBackend::new());
        let backend: Arc<dyn Backend> = memory.clone();
        let fp = Fingerprint::from_u64(5);

        let samples = SamplesTable::new(Arc::clone(&backend));
        samples
            .write_rows(fp, &[SampleRow::new(fp, 10, 0.0, "a".to_string())])
            .await
            .unwrap();

        let labels = LabelsTable::new(backend);
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        labels
            .write_rows(fp, &[LabelDescriptorRow::new(date, fp, &LabelSet::new().with("a", "b"))])
            .await
            .unwrap();

        assert_eq!(memory.sample_count(), 1);
        assert_eq!(memory.series_count(), 1);
    }

    #[test]
    fn test_from_config_selects_backend() {
        let config = ConfigBuilder::new()
            .backend(BackendKind::Memory)
            .build()
            .unwrap();
        assert_eq!(from_config(&config).unwrap().name(), "memory");

        let config = ConfigBuilder::new().build().unwrap();
        assert_eq!(from_config(&config).unwrap().name(), "clickhouse");
    }
}
