//! Shrink-wrap Service
//!
//! Stateless footprint fitting; no job or workspace is involved.

use sitefit_core::dto::shrinkwrap::{ShrinkwrapRequest, ShrinkwrapResponse};
use sitefit_core::geometry::GeometryError;
use tracing::debug;

use crate::service::job::JobServiceError;

/// Parses a raw request body and fits it
pub fn fit_json(body: &[u8]) -> Result<ShrinkwrapResponse, JobServiceError> {
    let req: ShrinkwrapRequest = serde_json::from_slice(body)
        .map_err(|e| GeometryError::Malformed(e.to_string()))?;
    fit(&req)
}

pub fn fit(req: &ShrinkwrapRequest) -> Result<ShrinkwrapResponse, JobServiceError> {
    let vertices: usize = req.geometry.iter().map(Vec::len).sum();
    debug!(
        "Fitting footprint around {} polyline(s), {} vertices",
        req.geometry.len(),
        vertices
    );
    Ok(req.fit()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fit_json_scenario() {
        let body = br#"{
            "rectangle_points": [[0, 0], [30, 0], [0, 20]],
            "front_points": [[5, 5], [10, 5]],
            "geometry": [[[2, 2], [28, 2], [28, 18], [2, 18], [2, 2]]]
        }"#;
        let fit = fit_json(body).unwrap();
        assert_eq!(fit.footprint_points.len(), 4);
        assert!((fit.area - 504.0).abs() < 1e-9);
    }

    #[test]
    fn test_fit_json_errors_are_geometry_errors() {
        let collinear = br#"{
            "rectangle_points": [[0, 0], [1, 0], [2, 0]],
            "front_points": [[0, 0], [1, 0]]
        }"#;
        assert!(matches!(
            fit_json(collinear),
            Err(JobServiceError::InvalidGeometryInput(_))
        ));
        assert!(matches!(
            fit_json(b"[]"),
            Err(JobServiceError::InvalidGeometryInput(_))
        ));
    }
}
