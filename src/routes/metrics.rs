use axum::{extract::State, http::StatusCode};
use prometheus::{Encoder, TextEncoder};

use crate::AppState;

/// GET /metrics: Prometheus scrape endpoint. Refreshes the schema gauges on each scrape.
pub async fn metrics_handler(State(state): State<AppState>) -> Result<String, StatusCode> {
    if let Err(e) = state.schemas.get_database_stats().await {
        tracing::warn!("Metrics: could not collect schema stats: {e}");
    }

    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    String::from_utf8(buffer).map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}
