pub mod health;
pub mod scans;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /scans                               upload (POST, multipart `file`)
/// /scans/{job_id}                      release (DELETE)
/// /scans/{job_id}/track                start tracking an existing job (POST)
/// /scans/{job_id}/status               stage, progress, ETA
/// /scans/{job_id}/diagnosis            live diagnosis text and findings
/// /scans/{job_id}/results              final result record
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/scans", scans::router())
}
