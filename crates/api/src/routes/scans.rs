//! Route definitions for the `/scans` resource.

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::scans;
use crate::state::AppState;

/// Largest accepted scan archive.
const MAX_UPLOAD_BYTES: usize = 512 * 1024 * 1024;

/// Routes mounted at `/scans`.
///
/// ```text
/// POST   /                       -> upload_scan
/// DELETE /{job_id}               -> release_scan
/// POST   /{job_id}/track         -> track_scan
/// GET    /{job_id}/status        -> get_status
/// GET    /{job_id}/diagnosis     -> get_diagnosis
/// GET    /{job_id}/results       -> get_results
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(scans::upload_scan).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/{job_id}", delete(scans::release_scan))
        .route("/{job_id}/track", post(scans::track_scan))
        .route("/{job_id}/status", get(scans::get_status))
        .route("/{job_id}/diagnosis", get(scans::get_diagnosis))
        .route("/{job_id}/results", get(scans::get_results))
}
