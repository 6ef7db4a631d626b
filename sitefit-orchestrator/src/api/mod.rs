//! API Module
//!
//! HTTP API layer for the orchestrator.
//! Each submodule handles endpoints for a specific domain.

pub mod error;
pub mod health;
pub mod job;
pub mod shrinkwrap;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::service::JobService;

/// Create the main API router with all endpoints
pub fn create_router(service: Arc<JobService>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Job endpoints
        .route("/jobs", post(job::submit_job).get(job::list_jobs))
        .route("/jobs/{id}", get(job::get_job))
        .route("/jobs/{id}/cancel", post(job::cancel_job))
        .route("/jobs/{id}/logs", get(job::get_job_logs))
        .route("/jobs/{id}/artifacts", get(job::list_artifacts))
        .route("/jobs/{id}/files/{*path}", get(job::download_file))
        // Geometry
        .route("/shrinkwrap", post(shrinkwrap::fit_footprint))
        // Add state and middleware
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}
