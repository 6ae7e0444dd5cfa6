//! BOAMP ingest service: binary entrypoint.
//! Boots the Axum HTTP server, wiring the ingestion pipeline, config, and metrics.

use std::time::Duration;

use boamp_ingest::config::boamp::BoampConfig;
use boamp_ingest::ingest::config::load_allowlist_default;
use boamp_ingest::metrics::Metrics;
use boamp_ingest::{api, Ingestor};
use shuttle_axum::ShuttleAxum;

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    // This enables BOAMP_CONFIG_PATH / DEFENSE_BUYERS_PATH / BOAMP_BASE_URL from .env.
    let _ = dotenvy::dotenv();

    boamp_ingest::init_tracing();

    let cfg = BoampConfig::load_default()?;
    let allowlist = load_allowlist_default()?;
    if allowlist.is_empty() {
        tracing::warn!("defense buyer allowlist is empty; only the CPV rule will classify");
    } else {
        tracing::info!(buyers = allowlist.len(), "defense buyer allowlist loaded");
    }

    let ingestor = Ingestor::from_config(&cfg, allowlist)?;
    let metrics = Metrics::init()?;

    let state = api::AppState::new(
        ingestor,
        Duration::from_secs(cfg.api.request_timeout_secs),
    );
    let router = api::router(state).merge(metrics.router());

    Ok(router.into())
}
