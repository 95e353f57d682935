//! Common test utilities and fixtures.

#![allow(dead_code)]

use lokihouse_lib::backend::{Backend, MemoryBackend};
use lokihouse_lib::core::{BackendKind, Config, ConfigBuilder, Result};
use lokihouse_lib::Application;
use serde_json::{json, Value};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Builder for Loki push bodies.
#[derive(Default)]
pub struct PushBuilder {
    streams: Vec<Value>,
}

impl PushBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a stream whose entries are `(ts, line)` pairs.
    pub fn stream(mut self, labels: &str, entries: &[(&str, &str)]) -> Self {
        let entries: Vec<Value> = entries
            .iter()
            .map(|(ts, line)| json!({ "ts": ts, "line": line }))
            .collect();
        self.streams.push(json!({ "labels": labels, "entries": entries }));
        self
    }

    pub fn build(self) -> Value {
        json!({ "streams": self.streams })
    }
}

/// Memory-backed config with buffers that flush quickly.
pub fn fast_config() -> Config {
    ConfigBuilder::new()
        .backend(BackendKind::Memory)
        .samples_buffer(1000, Duration::from_millis(50))
        .labels_buffer(100, Duration::from_millis(50))
        .build()
        .unwrap()
}

/// Memory-backed config whose timers never fire during a test.
pub fn idle_config() -> Config {
    ConfigBuilder::new()
        .backend(BackendKind::Memory)
        .samples_buffer(100_000, Duration::from_secs(3600))
        .labels_buffer(100_000, Duration::from_secs(3600))
        .build()
        .unwrap()
}

/// A gateway serving on an ephemeral local port.
pub struct TestGateway {
    pub addr: SocketAddr,
    pub memory: Arc<MemoryBackend>,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<()>>,
}

impl TestGateway {
    pub async fn start(config: Config) -> Self {
        let memory = Arc::new(MemoryBackend::new());
        let backend: Arc<dyn Backend> = memory.clone();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = oneshot::channel::<()>();

        let app = Application::with_backend(config, backend);
        let handle = tokio::spawn(app.serve(listener, async {
            let _ = rx.await;
        }));

        Self {
            addr,
            memory,
            client: reqwest::Client::new(),
            shutdown: Some(tx),
            handle,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn push(&self, body: &Value) -> reqwest::Response {
        self.client
            .post(self.url("/api/prom/push"))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    pub async fn query(&self, selector: &str) -> reqwest::Response {
        self.client
            .get(self.url("/api/prom/query"))
            .query(&[("query", selector)])
            .send()
            .await
            .unwrap()
    }

    pub async fn get_json(&self, path: &str) -> Value {
        self.client
            .get(self.url(path))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap()
    }

    /// Stops the server and waits for the buffers to drain.
    pub async fn stop(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        self.handle.await.unwrap()
    }
}

/// Polls `condition` until it holds or `timeout` elapses.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition().await
}
