//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::JobServiceError;
use crate::workspace::WorkspaceError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<JobServiceError> for ApiError {
    fn from(err: JobServiceError) -> Self {
        match err {
            JobServiceError::InvalidJobSpec(_) | JobServiceError::InvalidGeometryInput(_) => {
                ApiError::BadRequest(err.to_string())
            }
            JobServiceError::NotFound(_) => ApiError::NotFound(err.to_string()),
            JobServiceError::Workspace(WorkspaceError::PathEscape(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            JobServiceError::Workspace(WorkspaceError::NotFound(_)) => {
                ApiError::NotFound(err.to_string())
            }
            JobServiceError::Workspace(_) | JobServiceError::Background(_) => {
                ApiError::InternalError(err.to_string())
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use sitefit_core::geometry::GeometryError;
    use uuid::Uuid;

    fn status_of(err: JobServiceError) -> StatusCode {
        ApiError::from(err).into_response().status()
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            status_of(JobServiceError::InvalidJobSpec("x".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(GeometryError::CollinearRectangle.into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(JobServiceError::NotFound(Uuid::new_v4())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(WorkspaceError::PathEscape("../x".into()).into()),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WorkspaceError::AlreadyExists("/tmp/x".into()).into()),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
