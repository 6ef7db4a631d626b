//! Shrink-wrap DTOs

use serde::{Deserialize, Serialize};

use crate::geometry::{FootprintFit, GeometryError, Point, Polyline, fit};

/// Request to fit a footprint rectangle around drawing geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShrinkwrapRequest {
    /// Three picked points: a corner and its two neighbours
    pub rectangle_points: Vec<Point>,
    /// Two picked points along the street frontage
    pub front_points: Vec<Point>,
    /// Raw polylines to wrap
    #[serde(default, alias = "polylines")]
    pub geometry: Vec<Polyline>,
}

pub type ShrinkwrapResponse = FootprintFit;

impl ShrinkwrapRequest {
    pub fn fit(&self) -> Result<ShrinkwrapResponse, GeometryError> {
        fit(&self.rectangle_points, &self.front_points, &self.geometry)
    }
}
