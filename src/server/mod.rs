/// HTTP query interface
/// Serves the latest snapshot to the dashboard, REST clients and websocket subscribers

#[cfg(feature = "server")]
pub mod routes;

#[cfg(feature = "server")]
pub mod handlers;

#[cfg(feature = "server")]
pub mod view;

#[cfg(feature = "server")]
pub mod websocket;

#[cfg(feature = "server")]
pub mod static_files;

#[cfg(feature = "server")]
pub use routes::create_router;

#[cfg(feature = "server")]
use std::sync::Arc;

#[cfg(feature = "server")]
use crate::core::{HostFacts, SamplerConfig, SnapshotStore};

/// Shared, read-only view of the monitor handed to every request
#[cfg(feature = "server")]
#[derive(Clone)]
pub struct AppState {
    pub store: SnapshotStore,
    pub facts: Arc<HostFacts>,
    pub sampler: Arc<SamplerConfig>,
    pub started_at: chrono::DateTime<chrono::Utc>,
}

#[cfg(feature = "server")]
impl AppState {
    pub fn new(store: SnapshotStore, facts: HostFacts, sampler: SamplerConfig) -> Self {
        Self {
            store,
            facts: Arc::new(facts),
            sampler: Arc::new(sampler),
            started_at: chrono::Utc::now(),
        }
    }
}

/// Bind and serve until `shutdown` resolves
#[cfg(feature = "server")]
pub async fn run<F>(state: AppState, host: &str, port: u16, enable_cors: bool, shutdown: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    use anyhow::Context;
    use std::net::SocketAddr;

    let app = create_router(state, enable_cors);

    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", host, port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!(%addr, cors = enable_cors, "dashboard listening on http://{}", addr);
    tracing::debug!("endpoints: /metrics /api/snapshot /api/host /api/sampler /api/health /ws/metrics");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("HTTP server error")?;

    Ok(())
}
