//! Planar geometry kernel
//!
//! Pure, deterministic helpers used by the shrink-wrap fitter and by job
//! submission to vet footprints. Nothing here performs I/O.

pub mod polygon;
pub mod shrinkwrap;
pub mod vector;

pub use polygon::{
    FootprintError, major_axis_direction, polygon_area, polygon_centroid, validate_footprint,
};
pub use shrinkwrap::{FootprintFit, GeometryError, fit};
pub use vector::{EPSILON, Point, Polyline};
