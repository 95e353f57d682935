//! Hot path benchmarks: everything a push request does before it returns.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use lokihouse_lib::buffer::{BatchBuffer, FlushSink};
use lokihouse_lib::core::{fingerprint, BufferConfig, Fingerprint, LabelSet, Result, SampleRow};
use lokihouse_lib::index::{LabelCatalog, LabelIndex};
use lokihouse_lib::query::parse_selector;
use std::sync::Arc;
use std::time::Duration;

struct DiscardSink;

#[async_trait::async_trait]
impl FlushSink<SampleRow> for DiscardSink {
    async fn write_rows(&self, _key: Fingerprint, rows: &[SampleRow]) -> Result<()> {
        black_box(rows.len());
        Ok(())
    }
}

fn label_set(width: usize) -> LabelSet {
    (0..width)
        .map(|i| (format!("label_{}", i), format!("value_{}", i)))
        .collect()
}

fn bench_fingerprint(c: &mut Criterion) {
    let mut group = c.benchmark_group("fingerprint");
    for width in [1, 4, 16] {
        let labels = label_set(width);
        group.bench_with_input(BenchmarkId::from_parameter(width), &labels, |b, labels| {
            b.iter(|| black_box(fingerprint(black_box(labels))));
        });
    }
    group.finish();
}

fn bench_selector_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("selector_parse");
    group.bench_function("three_labels", |b| {
        b.iter(|| {
            black_box(parse_selector(black_box(r#"{env="prod", job="api", pod="api-7f9c"}"#)))
        });
    });
    group.finish();
}

fn bench_index_record(c: &mut Criterion) {
    let index = LabelIndex::new();
    let labels = label_set(4);
    let fp = fingerprint(&labels);
    c.bench_function("index_record_known", |b| {
        b.iter(|| index.record_label_set(black_box(fp), black_box(&labels)));
    });
}

fn bench_buffer_add(c: &mut Criterion) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let _guard = runtime.enter();

    let buffer = BatchBuffer::<SampleRow>::start(
        "bench",
        BufferConfig {
            max_entries: 5000,
            max_age: Duration::from_secs(2),
            flush_concurrency: 8,
        },
        Arc::new(DiscardSink),
    );
    let keys: Vec<Fingerprint> = (0..64).map(Fingerprint::from_u64).collect();

    let mut i = 0usize;
    c.bench_function("buffer_add", |b| {
        b.iter(|| {
            let key = keys[i % keys.len()];
            i += 1;
            buffer.add(key, SampleRow::new(key, i as i64, 0.0, String::from("line")));
        });
    });
}

criterion_group!(
    benches,
    bench_fingerprint,
    bench_selector_parse,
    bench_index_record,
    bench_buffer_add
);
criterion_main!(benches);
