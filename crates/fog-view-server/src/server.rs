//! Server builder and lifecycle

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tokio::net::TcpListener;
use tower::limit::GlobalConcurrencyLimitLayer;

use crate::collaborator::{MissedRangeTracker, RngDirectory, TxOutIndex};
use crate::config::ServerConfig;
use crate::directory::MemoryRngDirectory;
use crate::error::Result;
use crate::index::MemoryTxOutIndex;
use crate::missed::MemoryMissedRanges;
use crate::routes::{create_router, create_router_with_metrics};
use crate::state::{create_shared_state, SharedState};

/// Assembles a [`ViewServer`] from a config and the three collaborators.
///
/// Collaborators left unset default to empty in-memory stores.
#[derive(Default)]
pub struct ServerBuilder {
    config: ServerConfig,
    directory: Option<Arc<dyn RngDirectory>>,
    missed: Option<Arc<dyn MissedRangeTracker>>,
    index: Option<Arc<dyn TxOutIndex>>,
    metrics: Option<PrometheusHandle>,
}

impl ServerBuilder {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            ..Default::default()
        }
    }

    pub fn directory(mut self, directory: Arc<dyn RngDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    pub fn missed_ranges(mut self, missed: Arc<dyn MissedRangeTracker>) -> Self {
        self.missed = Some(missed);
        self
    }

    pub fn index(mut self, index: Arc<dyn TxOutIndex>) -> Self {
        self.index = Some(index);
        self
    }

    /// Serve `/metrics` from this recorder handle
    pub fn metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    pub fn build(self) -> Result<ViewServer> {
        self.config.validate()?;

        let directory: Arc<dyn RngDirectory> = match self.directory {
            Some(directory) => directory,
            None => Arc::new(MemoryRngDirectory::new()),
        };
        let missed: Arc<dyn MissedRangeTracker> = match self.missed {
            Some(missed) => missed,
            None => Arc::new(MemoryMissedRanges::new()),
        };
        let index: Arc<dyn TxOutIndex> = match self.index {
            Some(index) => index,
            None => Arc::new(MemoryTxOutIndex::new()),
        };

        let state = create_shared_state(self.config.clone(), directory, missed, index);
        let router = match self.metrics {
            Some(handle) => create_router_with_metrics(state.clone(), handle),
            None => create_router(state.clone()),
        }
        .layer(GlobalConcurrencyLimitLayer::new(
            self.config.max_concurrent_requests,
        ));

        Ok(ViewServer {
            config: self.config,
            state,
            router,
        })
    }
}

pub struct ViewServer {
    config: ServerConfig,
    state: SharedState,
    router: Router,
}

impl ViewServer {
    pub fn state(&self) -> &SharedState {
        &self.state
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Bind `config.bind_addr` and serve until Ctrl-C
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.bind_addr).await?;
        self.serve_on(listener, shutdown_signal()).await
    }

    /// Serve on an already-bound listener until `shutdown` resolves
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr: SocketAddr = listener.local_addr()?;
        tracing::info!(
            %addr,
            max_concurrent_requests = self.config.max_concurrent_requests,
            metrics = self.config.enable_metrics,
            "View server listening"
        );

        axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("View server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
