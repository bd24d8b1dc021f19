use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;

use crate::state::AppState;

/// Health check response payload.
#[derive(Serialize)]
pub struct HealthResponse {
    /// Overall service status.
    pub status: &'static str,
    /// Crate version from Cargo.toml.
    pub version: &'static str,
    /// Whether the compression service answered its health probe.
    pub compressor_healthy: bool,
    /// Jobs currently being polled or analyzed.
    pub active_jobs: usize,
}

/// GET /health -- returns service and compression backend health plus the
/// number of active jobs.
async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let compressor_healthy = match state.compressor.health().await {
        Ok(_) => true,
        Err(e) => {
            tracing::debug!(error = %e, "Compression service health probe failed");
            false
        }
    };

    let active_jobs = state.orchestrator.active_jobs().await;
    let status = if compressor_healthy { "ok" } else { "degraded" };

    Json(HealthResponse {
        status,
        version: env!("CARGO_PKG_VERSION"),
        compressor_healthy,
        active_jobs,
    })
}

/// Mount health check routes (intended for root-level, NOT under `/api/v1`).
pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
