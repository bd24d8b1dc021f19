//! Handlers for the `/scans` resource.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use ctlens_core::types::{AccumulatedDiagnosis, JobHandle, ResultRecord};
use ctlens_pipeline::orchestrator::StatusView;
use serde::Serialize;

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the scan archive.
const UPLOAD_FIELD: &str = "file";

/// Response body of an accepted upload or track request.
#[derive(Debug, Serialize)]
pub struct TrackingAccepted {
    pub job_id: JobHandle,
}

// ---------------------------------------------------------------------------
// Upload / track / release
// ---------------------------------------------------------------------------

/// POST /api/v1/scans
///
/// Forward the `file` field to the compression service and start tracking
/// the job it creates.
pub async fn upload_scan(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<DataResponse<TrackingAccepted>>)> {
    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }

        let file_name = field.file_name().unwrap_or("scan.zip").to_string();
        let contents = field.bytes().await?;

        let job_id = state
            .orchestrator
            .submit_upload(&file_name, contents.to_vec())
            .await?;

        return Ok((
            StatusCode::ACCEPTED,
            Json(DataResponse {
                data: TrackingAccepted { job_id },
            }),
        ));
    }

    Err(AppError::BadRequest(format!(
        "Missing multipart field '{UPLOAD_FIELD}'"
    )))
}

/// POST /api/v1/scans/{job_id}/track
pub async fn track_scan(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<(StatusCode, Json<DataResponse<TrackingAccepted>>)> {
    let job_id = JobHandle::from(job_id);
    state.orchestrator.track(job_id.clone()).await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: TrackingAccepted { job_id },
        }),
    ))
}

/// DELETE /api/v1/scans/{job_id}
pub async fn release_scan(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<StatusCode> {
    state.orchestrator.release(&JobHandle::from(job_id)).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Queries
// ---------------------------------------------------------------------------

/// GET /api/v1/scans/{job_id}/status
pub async fn get_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<StatusView>>> {
    let status = state.orchestrator.status(&JobHandle::from(job_id)).await?;
    Ok(Json(DataResponse { data: status }))
}

/// GET /api/v1/scans/{job_id}/diagnosis
pub async fn get_diagnosis(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<AccumulatedDiagnosis>>> {
    let diagnosis = state
        .orchestrator
        .diagnosis(&JobHandle::from(job_id))
        .await?;
    Ok(Json(DataResponse { data: diagnosis }))
}

/// GET /api/v1/scans/{job_id}/results
pub async fn get_results(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> AppResult<Json<DataResponse<ResultRecord>>> {
    let record = state.orchestrator.results(&JobHandle::from(job_id))?;
    Ok(Json(DataResponse { data: record }))
}
