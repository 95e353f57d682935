//! Main application entry point for the gateway.

use crate::api::{self, ApiState};
use crate::backend::{self, Backend, LabelsTable, SamplesTable};
use crate::buffer::BatchBuffer;
use crate::core::config::BuffersConfig;
use crate::core::{Config, GatewayError, LabelDescriptorRow, Result, SampleRow};
use crate::index::LabelIndex;
use crate::ingest::Ingester;
use crate::query::QueryEngine;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

/// The ingestion and query components sharing one backend.
pub struct Pipeline {
    pub backend: Arc<dyn Backend>,
    pub index: Arc<LabelIndex>,
    pub samples: Arc<BatchBuffer<SampleRow>>,
    pub labels: Arc<BatchBuffer<LabelDescriptorRow>>,
    pub ingester: Arc<Ingester>,
    pub query: Arc<QueryEngine>,
}

impl Pipeline {
    /// Starts both batch buffers on the current runtime and wires the
    /// ingester and query engine around them.
    pub fn start(buffers: &BuffersConfig, backend: Arc<dyn Backend>) -> Self {
        let index = Arc::new(LabelIndex::new());
        let samples = Arc::new(BatchBuffer::<SampleRow>::start(
            "samples",
            buffers.samples.clone(),
            Arc::new(SamplesTable::new(Arc::clone(&backend))),
        ));
        let labels = Arc::new(BatchBuffer::<LabelDescriptorRow>::start(
            "labels",
            buffers.labels.clone(),
            Arc::new(LabelsTable::new(Arc::clone(&backend))),
        ));
        let ingester = Arc::new(Ingester::new(
            index.clone(),
            Arc::clone(&samples),
            Arc::clone(&labels),
        ));
        let query = Arc::new(QueryEngine::new(Arc::clone(&backend)));

        Self {
            backend,
            index,
            samples,
            labels,
            ingester,
            query,
        }
    }

    /// Drains both buffers.
    pub async fn shutdown(&self) -> Result<()> {
        self.samples.shutdown().await?;
        self.labels.shutdown().await?;
        Ok(())
    }
}

/// Main application struct that coordinates all components.
pub struct Application {
    config: Config,
    backend: Arc<dyn Backend>,
}

impl Application {
    /// Create a new Application with the backend named by the configuration.
    pub fn new(config: Config) -> Result<Self> {
        let backend = backend::from_config(&config)?;
        Ok(Self { config, backend })
    }

    /// Create an Application around an existing backend.
    pub fn with_backend(config: Config, backend: Arc<dyn Backend>) -> Self {
        Self { config, backend }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Bind the configured address and serve until ctrl-c.
    pub async fn run(self) -> Result<()> {
        let addr = SocketAddr::new(self.config.server.bind_address, self.config.server.port);
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to bind to {}: {}", addr, e),
            ))
        })?;
        self.serve(listener, shutdown_signal()).await
    }

    /// Bootstrap the backend, then serve on `listener` until `shutdown`
    /// resolves, then flush both buffers.
    ///
    /// A backend that cannot be bootstrapped is fatal: nothing is served.
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tracing::info!(backend = self.backend.name(), "Bootstrapping backend");
        self.backend.bootstrap().await.map_err(|e| {
            tracing::error!(category = e.category(), "Backend bootstrap failed: {}", e);
            e
        })?;

        let pipeline = Arc::new(Pipeline::start(&self.config.buffers, Arc::clone(&self.backend)));
        let router = api::create_router(
            ApiState::new(Arc::clone(&pipeline)),
            self.config.server.max_connections,
        );

        tracing::info!("Listening on http://{}", listener.local_addr()?);
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Server stopped, draining buffers");
        pipeline.shutdown().await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for ctrl-c: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}
