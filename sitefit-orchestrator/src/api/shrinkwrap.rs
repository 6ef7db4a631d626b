//! Shrink-wrap API Handler

use axum::{Json, body::Bytes};
use sitefit_core::dto::shrinkwrap::ShrinkwrapResponse;

use crate::api::error::ApiResult;
use crate::service::shrinkwrap;

/// POST /shrinkwrap
/// Fit a footprint rectangle and frontage around raw geometry
pub async fn fit_footprint(body: Bytes) -> ApiResult<Json<ShrinkwrapResponse>> {
    let fit = shrinkwrap::fit_json(&body)?;
    Ok(Json(fit))
}
