//! Prometheus metrics endpoint.
//!
//! Serves `/metrics` in Prometheus text format and `/health` for liveness checks
//! while a run is in progress.

use axum::{Extension, Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use snafu::prelude::*;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{MetricsError, PrometheusInitSnafu};

/// Install the global Prometheus recorder and serve it on `addr`.
///
/// Must be called from inside a Tokio runtime; the server runs as a
/// background task for the rest of the process.
pub fn init(addr: SocketAddr) -> Result<PrometheusHandle, MetricsError> {
    let handle = PrometheusBuilder::new()
        .install_recorder()
        .context(PrometheusInitSnafu)?;

    tokio::spawn(run_server(addr, handle.clone()));

    Ok(handle)
}

fn router(handle: PrometheusHandle) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/health", get(health_handler))
        .layer(Extension(handle))
}

async fn run_server(addr: SocketAddr, handle: PrometheusHandle) {
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(e) => {
            error!("Failed to bind metrics server to {}: {}", addr, e);
            return;
        }
    };
    info!("Serving metrics on http://{}/metrics", addr);

    if let Err(e) = axum::serve(listener, router(handle)).await {
        error!("Metrics server error: {}", e);
    }
}

async fn metrics_handler(Extension(handle): Extension<PrometheusHandle>) -> String {
    handle.render()
}

async fn health_handler() -> &'static str {
    "ok\n"
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit;
    use crate::metrics::events::RunCompleted;
    use std::time::Duration;

    #[tokio::test]
    async fn test_events_render_through_handler() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        metrics::with_local_recorder(&recorder, || {
            emit!(RunCompleted {
                success: true,
                duration: Duration::from_millis(1500),
            });
        });

        let body = metrics_handler(Extension(handle)).await;
        assert!(body.contains("songlake_runs_total{status=\"success\"} 1"));
        assert_eq!(health_handler().await, "ok\n");
    }
}
