//! Health Check API Handler
//!
//! Liveness plus workspace and queue status for monitoring.

use std::sync::Arc;

use axum::{Json, extract::State};
use sitefit_core::dto::health::HealthStatus;

use crate::api::error::ApiResult;
use crate::service::JobService;

/// GET /health
pub async fn health_check(State(service): State<Arc<JobService>>) -> ApiResult<Json<HealthStatus>> {
    Ok(Json(service.health().await?))
}
