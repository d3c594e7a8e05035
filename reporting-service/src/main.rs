use std::{net::SocketAddr, sync::Arc};

use anyhow::Result;
use reporting_client::ReportingClient;
use reporting_service::{
    config::{ApiEnv, AppConfig},
    http::{router, AppState},
    metrics_server,
    microgrids::MicrogridRegistry,
    observability, ReportPipeline, ReportService,
};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;
    let api = ApiEnv::from_env()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // A broken microgrid config aborts startup.
    let microgrids = MicrogridRegistry::load(&api.microgrid_config_dir)?;
    let client = ReportingClient::connect(api.api_url, api.credentials, cfg.client.settings())?;
    let service = ReportService::new(
        Arc::new(microgrids),
        ReportPipeline::new(Arc::new(client)),
    )
    .with_session_idle_timeout(cfg.http.session_idle_timeout());

    let addr: SocketAddr = cfg
        .http
        .bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;
    let app = router(Arc::new(AppState {
        service: Arc::new(service),
    }));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "reporting service listening");
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
