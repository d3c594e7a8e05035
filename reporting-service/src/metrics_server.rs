use std::net::SocketAddr;

use axum::{http::StatusCode, routing::get, Router};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

#[derive(thiserror::Error, Debug)]
pub enum MetricsError {
    #[error("invalid metrics bind address '{addr}': {source}")]
    BindAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("failed to install Prometheus recorder: {0}")]
    Recorder(String),
}

/// Install the Prometheus recorder and serve `/metrics` on `bind_addr`.
pub fn init(bind_addr: &str) -> Result<(), MetricsError> {
    let addr: SocketAddr = bind_addr.parse().map_err(|source| MetricsError::BindAddr {
        addr: bind_addr.to_string(),
        source,
    })?;

    if PROM_HANDLE.get().is_none() {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .map_err(|e| MetricsError::Recorder(e.to_string()))?;
        // Only one recorder can be installed per process.
        let _ = PROM_HANDLE.set(handle);
    }

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "metrics listener started");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

async fn metrics_handler() -> Result<String, StatusCode> {
    PROM_HANDLE
        .get()
        .map(PrometheusHandle::render)
        .ok_or(StatusCode::SERVICE_UNAVAILABLE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_bind_address_is_rejected_before_anything_starts() {
        let res = init("not-an-address");
        assert!(matches!(res, Err(MetricsError::BindAddr { .. })));
    }
}
