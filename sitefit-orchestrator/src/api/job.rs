//! Job API Handlers
//!
//! HTTP endpoints for job submission, inspection and cancellation.

use std::sync::Arc;

use axum::{
    Json,
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use sitefit_core::dto::job::{ArtifactListing, CancelJob, CancelJobResponse, JobView};
use sitefit_core::dto::log::{LogPage, LogQuery};
use uuid::Uuid;

use crate::api::error::{ApiError, ApiResult};
use crate::service::JobService;

// =============================================================================
// Job Lifecycle Endpoints
// =============================================================================

/// POST /jobs
/// Validate and queue a new job
///
/// The body is parsed by the service so malformed JSON is reported the same
/// way as any other invalid submission.
pub async fn submit_job(
    State(service): State<Arc<JobService>>,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<JobView>)> {
    let view = service.submit_json(&body).await?;
    tracing::info!("Job {} queued", view.job.id);
    Ok((StatusCode::CREATED, Json(view)))
}

/// GET /jobs
/// List all jobs, most recent first
pub async fn list_jobs(State(service): State<Arc<JobService>>) -> Json<Vec<JobView>> {
    Json(service.list())
}

/// GET /jobs/{id}
pub async fn get_job(
    State(service): State<Arc<JobService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<JobView>> {
    tracing::debug!("Getting job: {}", id);
    Ok(Json(service.get(id)?))
}

/// POST /jobs/{id}/cancel
/// Request cancellation; the body (`{"reason": ...}`) is optional
pub async fn cancel_job(
    State(service): State<Arc<JobService>>,
    Path(id): Path<Uuid>,
    body: Bytes,
) -> ApiResult<Json<CancelJobResponse>> {
    let req: CancelJob = if body.iter().all(u8::is_ascii_whitespace) {
        CancelJob::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| ApiError::BadRequest(format!("invalid cancel request: {e}")))?
    };

    Ok(Json(service.cancel(id, req.reason)?))
}

// =============================================================================
// Log and Artifact Endpoints
// =============================================================================

/// GET /jobs/{id}/logs
/// Query parameters:
/// - after: only entries with a greater sequence number
/// - limit: maximum number of entries
pub async fn get_job_logs(
    State(service): State<Arc<JobService>>,
    Path(id): Path<Uuid>,
    Query(query): Query<LogQuery>,
) -> ApiResult<Json<LogPage>> {
    Ok(Json(service.logs(id, query).await?))
}

/// GET /jobs/{id}/artifacts
pub async fn list_artifacts(
    State(service): State<Arc<JobService>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<ArtifactListing>> {
    Ok(Json(service.artifacts(id).await?))
}

/// GET /jobs/{id}/files/{*path}
/// Download a file from the job workspace
pub async fn download_file(
    State(service): State<Arc<JobService>>,
    Path((id, path)): Path<(Uuid, String)>,
) -> ApiResult<Response> {
    let resolved = service.resolve_artifact(id, &path).await?;
    let bytes = tokio::fs::read(&resolved)
        .await
        .map_err(|e| ApiError::InternalError(format!("failed to read {path}: {e}")))?;

    Ok((
        [(header::CONTENT_TYPE, content_type(&path))],
        Body::from(bytes),
    )
        .into_response())
}

fn content_type(path: &str) -> &'static str {
    let ext = path.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("json" | "geojson") => "application/json",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("svg") => "image/svg+xml",
        Some("log" | "txt" | "csv") => "text/plain; charset=utf-8",
        Some("html") => "text/html; charset=utf-8",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type() {
        assert_eq!(content_type("outputs/manifest.json"), "application/json");
        assert_eq!(content_type("outputs/cycle_1/BEST.PNG"), "image/png");
        assert_eq!(content_type("engine.log"), "text/plain; charset=utf-8");
        assert_eq!(content_type("outputs/result.bin"), "application/octet-stream");
        assert_eq!(content_type("README"), "application/octet-stream");
    }
}
