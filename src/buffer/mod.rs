//! Write-behind batch buffer with dual size/age flush triggers.
//!
//! Rows are appended to the current [`Generation`] under a mutex. When the
//! generation reaches `max_entries` rows, or when the age timer ticks while
//! it is non-empty, it is swapped for a fresh one and handed to a background
//! worker that writes each key's rows as one bulk insert. Both triggers go
//! through the same locked swap, so a generation is flushed exactly once.
//!
//! There is no backpressure and no retry: `add` always succeeds, and a key
//! whose bulk insert fails is logged and dropped.

pub mod generation;

pub use generation::Generation;

use crate::core::{BufferConfig, Fingerprint, Result};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};

/// Destination of flushed rows.
#[async_trait::async_trait]
pub trait FlushSink<T: Send + Sync>: Send + Sync {
    /// Writes all rows of one key as a single bulk insert.
    async fn write_rows(&self, key: Fingerprint, rows: &[T]) -> Result<()>;
}

/// Snapshot of buffer counters.
#[derive(Debug, Clone, Serialize)]
pub struct BufferStats {
    /// Buffer name, used in logs
    pub name: &'static str,
    /// Rows in the current (accepting) generation
    pub buffered: usize,
    /// Rows accepted since start
    pub total_added: u64,
    /// Rows written successfully
    pub total_flushed: u64,
    /// Rows lost to failed bulk inserts
    pub total_dropped: u64,
    /// Generations handed to the backend
    pub flush_count: u64,
    /// Per-key bulk inserts that failed
    pub failed_writes: u64,
    /// Completion time of the last flush
    pub last_flush: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct Counters {
    added: AtomicU64,
    flushed: AtomicU64,
    dropped: AtomicU64,
    flushes: AtomicU64,
    failed_writes: AtomicU64,
    last_flush: Mutex<Option<DateTime<Utc>>>,
}

struct State<T> {
    current: Generation<T>,
    next_sequence: u64,
}

impl<T> State<T> {
    /// The single swap operation: replaces a non-empty generation with a
    /// fresh one and returns the old one. Callers must hold the state lock.
    fn swap_if_non_empty(&mut self) -> Option<Generation<T>> {
        if self.current.is_empty() {
            return None;
        }
        let next = Generation::new(self.next_sequence);
        self.next_sequence += 1;
        Some(std::mem::replace(&mut self.current, next))
    }
}

struct Shared<T> {
    name: &'static str,
    state: Mutex<State<T>>,
    counters: Counters,
}

impl<T> Shared<T> {
    fn rotate(&self) -> Option<Generation<T>> {
        self.state.lock().swap_if_non_empty()
    }
}

enum Command<T> {
    Flush(Generation<T>),
    Shutdown(oneshot::Sender<()>),
}

/// Generic write-behind buffer keyed by fingerprint.
pub struct BatchBuffer<T> {
    shared: Arc<Shared<T>>,
    config: BufferConfig,
    commands: mpsc::UnboundedSender<Command<T>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl<T: Send + Sync + 'static> BatchBuffer<T> {
    /// Creates the buffer and spawns its flush worker on the current tokio
    /// runtime.
    pub fn start(
        name: &'static str,
        config: BufferConfig,
        sink: Arc<dyn FlushSink<T>>,
    ) -> Self {
        let shared = Arc::new(Shared {
            name,
            state: Mutex::new(State {
                current: Generation::new(0),
                next_sequence: 1,
            }),
            counters: Counters::default(),
        });
        let (commands, rx) = mpsc::unbounded_channel();

        let worker = tokio::spawn(run_worker(Arc::clone(&shared), config.clone(), sink, rx));

        tracing::debug!(
            buffer = name,
            max_entries = config.max_entries,
            max_age_ms = config.max_age.as_millis() as u64,
            "Batch buffer started"
        );

        Self {
            shared,
            config,
            commands,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Appends a row under `key`. Never blocks on the backend and never
    /// fails; reaching `max_entries` hands the generation to the worker.
    pub fn add(&self, key: Fingerprint, row: T) {
        let full = {
            let mut state = self.shared.state.lock();
            state.current.push(key, row);
            if state.current.len() >= self.config.max_entries {
                state.swap_if_non_empty()
            } else {
                None
            }
        };
        self.shared.counters.added.fetch_add(1, Ordering::Relaxed);

        if let Some(generation) = full {
            tracing::debug!(
                buffer = self.shared.name,
                sequence = generation.sequence(),
                rows = generation.len(),
                "Size threshold reached"
            );
            self.dispatch(generation);
        }
    }

    /// Swaps out the current generation, if non-empty, and queues it for
    /// flushing. Returns true when a generation was queued.
    pub fn flush_now(&self) -> bool {
        match self.shared.rotate() {
            Some(generation) => {
                self.dispatch(generation);
                true
            },
            None => false,
        }
    }

    fn dispatch(&self, generation: Generation<T>) {
        let rows = generation.len();
        if self.commands.send(Command::Flush(generation)).is_err() {
            self.shared
                .counters
                .dropped
                .fetch_add(rows as u64, Ordering::Relaxed);
            tracing::error!(
                buffer = self.shared.name,
                rows,
                "Flush worker stopped, dropping generation"
            );
        }
    }

    /// Rows in the accepting generation
    pub fn len(&self) -> usize {
        self.shared.state.lock().current.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Buffer thresholds
    pub fn config(&self) -> &BufferConfig {
        &self.config
    }

    /// Get current buffer statistics.
    pub fn stats(&self) -> BufferStats {
        let c = &self.shared.counters;
        BufferStats {
            name: self.shared.name,
            buffered: self.len(),
            total_added: c.added.load(Ordering::Relaxed),
            total_flushed: c.flushed.load(Ordering::Relaxed),
            total_dropped: c.dropped.load(Ordering::Relaxed),
            flush_count: c.flushes.load(Ordering::Relaxed),
            failed_writes: c.failed_writes.load(Ordering::Relaxed),
            last_flush: *c.last_flush.lock(),
        }
    }

    /// Flushes everything still buffered and stops the worker.
    ///
    /// Generations queued before the call are written first. Rows added
    /// after shutdown stay in memory and are never flushed.
    pub async fn shutdown(&self) -> Result<()> {
        let handle = self.worker.lock().take();
        let Some(handle) = handle else {
            return Ok(());
        };

        let (done_tx, done_rx) = oneshot::channel();
        if self.commands.send(Command::Shutdown(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
        handle.await?;

        tracing::info!(buffer = self.shared.name, "Batch buffer drained");
        Ok(())
    }
}

impl<T> Drop for BatchBuffer<T> {
    fn drop(&mut self) {
        // Abort rather than leak the worker; call shutdown() to drain first
        if let Some(handle) = self.worker.lock().take() {
            handle.abort();
        }
    }
}

async fn run_worker<T: Send + Sync + 'static>(
    shared: Arc<Shared<T>>,
    config: BufferConfig,
    sink: Arc<dyn FlushSink<T>>,
    mut commands: mpsc::UnboundedReceiver<Command<T>>,
) {
    let mut ticker = time::interval_at(Instant::now() + config.max_age, config.max_age);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Flush(generation)) => {
                    flush_generation(&shared, &sink, config.flush_concurrency, generation).await;
                },
                Some(Command::Shutdown(done)) => {
                    if let Some(generation) = shared.rotate() {
                        flush_generation(&shared, &sink, config.flush_concurrency, generation).await;
                    }
                    let _ = done.send(());
                    break;
                },
                None => break,
            },
            _ = ticker.tick() => {
                if let Some(generation) = shared.rotate() {
                    tracing::debug!(
                        buffer = shared.name,
                        sequence = generation.sequence(),
                        rows = generation.len(),
                        age_ms = generation.age().as_millis() as u64,
                        "Age threshold reached"
                    );
                    flush_generation(&shared, &sink, config.flush_concurrency, generation).await;
                }
            },
        }
    }
}

/// Writes every key of a frozen generation. A failing key is logged and
/// counted; the remaining keys are still written.
async fn flush_generation<T: Send + Sync + 'static>(
    shared: &Shared<T>,
    sink: &Arc<dyn FlushSink<T>>,
    concurrency: usize,
    generation: Generation<T>,
) {
    let sequence = generation.sequence();
    let total_rows = generation.len();
    let keys = generation.key_count();
    let started = std::time::Instant::now();
    let counters = &shared.counters;
    let name = shared.name;

    stream::iter(generation.into_batches())
        .for_each_concurrent(concurrency, |(key, rows)| async move {
            match sink.write_rows(key, &rows).await {
                Ok(()) => {
                    counters
                        .flushed
                        .fetch_add(rows.len() as u64, Ordering::Relaxed);
                },
                Err(e) => {
                    counters.failed_writes.fetch_add(1, Ordering::Relaxed);
                    counters
                        .dropped
                        .fetch_add(rows.len() as u64, Ordering::Relaxed);
                    tracing::error!(
                        buffer = name,
                        fingerprint = %key,
                        rows = rows.len(),
                        category = e.category(),
                        "Bulk insert failed: {}",
                        e
                    );
                },
            }
        })
        .await;

    counters.flushes.fetch_add(1, Ordering::Relaxed);
    *counters.last_flush.lock() = Some(Utc::now());

    tracing::debug!(
        buffer = name,
        sequence,
        rows = total_rows,
        keys,
        elapsed_ms = started.elapsed().as_millis() as u64,
        "Flushed generation"
    );
}
