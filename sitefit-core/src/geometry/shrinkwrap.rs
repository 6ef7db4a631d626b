//! Shrink-wrap fitting
//!
//! Turns three picked corner points (orientation hint) and raw drawing
//! polylines into the tight oriented rectangle around that geometry, plus a
//! frontage origin/direction pair the crawl engine can consume.
//!
//! The frame is anchored at `P0`: `u` runs along `P0 -> P1` and `v` is `u`
//! rotated a quarter turn counter-clockwise. Extents are reduced over `P0`
//! and every polyline vertex, so the picked corner stays a corner while the
//! far edges shrink onto the geometry.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::vector::{EPSILON, Point, Polyline};

/// Rejected shrink-wrap input
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeometryError {
    #[error("malformed shrink-wrap request: {0}")]
    Malformed(String),

    #[error("expected exactly 3 rectangle points, got {0}")]
    RectanglePointCount(usize),

    #[error("expected exactly 2 front points, got {0}")]
    FrontPointCount(usize),

    #[error("input contains a non-finite coordinate")]
    NonFinite,

    #[error("rectangle points must be distinct")]
    CoincidentPoints,

    #[error("rectangle points are collinear")]
    CollinearRectangle,

    #[error("front points must be distinct")]
    DegenerateFront,

    #[error("fitted rectangle has zero width or height")]
    DegenerateFit,
}

/// Result of a shrink-wrap fit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FootprintFit {
    /// Counter-clockwise corners starting at the (min u, min v) corner
    pub footprint_points: Vec<Point>,
    pub front_origin: Point,
    /// Unit vector
    pub front_direction: Point,
    pub area: f64,
}

/// Fits an oriented rectangle around `geometry`
///
/// `rectangle_points` must hold exactly three distinct, non-collinear points
/// and `front_points` exactly two distinct points. With no geometry vertices
/// the picked rectangle itself is returned.
pub fn fit(
    rectangle_points: &[Point],
    front_points: &[Point],
    geometry: &[Polyline],
) -> Result<FootprintFit, GeometryError> {
    let [p0, p1, p2] = expect_points::<3>(rectangle_points, GeometryError::RectanglePointCount)?;
    let [f0, f1] = expect_points::<2>(front_points, GeometryError::FrontPointCount)?;

    let all_finite = rectangle_points.iter().all(|p| p.is_finite())
        && front_points.iter().all(|p| p.is_finite())
        && geometry.iter().flatten().all(|p| p.is_finite());
    if !all_finite {
        return Err(GeometryError::NonFinite);
    }

    let a = p1 - p0;
    let b = p2 - p0;
    if a.length() < EPSILON || b.length() < EPSILON || p1.distance(p2) < EPSILON {
        return Err(GeometryError::CoincidentPoints);
    }
    if a.cross(b).abs() <= EPSILON * a.length() * b.length() {
        return Err(GeometryError::CollinearRectangle);
    }

    let front_direction = (f1 - f0).normalize().ok_or(GeometryError::DegenerateFront)?;

    let frame = Frame::new(p0, a).ok_or(GeometryError::CoincidentPoints)?;
    let extents = frame.extents(geometry).unwrap_or_else(|| {
        let sv = frame.local(p2).1;
        Extents {
            u_min: 0.0,
            u_max: a.length(),
            v_min: sv.min(0.0),
            v_max: sv.max(0.0),
        }
    });

    let (width, height) = (extents.width(), extents.height());
    if width < EPSILON || height < EPSILON {
        return Err(GeometryError::DegenerateFit);
    }

    let footprint_points = vec![
        frame.world(extents.u_min, extents.v_min),
        frame.world(extents.u_max, extents.v_min),
        frame.world(extents.u_max, extents.v_max),
        frame.world(extents.u_min, extents.v_max),
    ];

    Ok(FootprintFit {
        footprint_points,
        front_origin: frame.front_origin(&extents, f0),
        front_direction,
        area: width * height,
    })
}

fn expect_points<const N: usize>(
    points: &[Point],
    on_count: fn(usize) -> GeometryError,
) -> Result<[Point; N], GeometryError> {
    <[Point; N]>::try_from(points).map_err(|_| on_count(points.len()))
}

/// Orthonormal frame anchored at the first picked point
struct Frame {
    origin: Point,
    u: Point,
    v: Point,
}

#[derive(Debug, Clone, Copy)]
struct Extents {
    u_min: f64,
    u_max: f64,
    v_min: f64,
    v_max: f64,
}

impl Extents {
    fn width(&self) -> f64 {
        self.u_max - self.u_min
    }

    fn height(&self) -> f64 {
        self.v_max - self.v_min
    }
}

impl Frame {
    fn new(origin: Point, axis: Point) -> Option<Self> {
        let u = axis.normalize()?;
        Some(Self {
            origin,
            u,
            v: u.rotate90(),
        })
    }

    fn local(&self, p: Point) -> (f64, f64) {
        let d = p - self.origin;
        (d.dot(self.u), d.dot(self.v))
    }

    fn world(&self, su: f64, sv: f64) -> Point {
        self.origin + self.u * su + self.v * sv
    }

    /// Extents over the anchor and all geometry vertices, `None` when the
    /// geometry has no vertices at all
    fn extents(&self, geometry: &[Polyline]) -> Option<Extents> {
        let mut vertices = geometry.iter().flatten().peekable();
        vertices.peek()?;

        let anchor = Extents {
            u_min: 0.0,
            u_max: 0.0,
            v_min: 0.0,
            v_max: 0.0,
        };
        Some(vertices.fold(anchor, |acc, p| {
            let (su, sv) = self.local(*p);
            Extents {
                u_min: acc.u_min.min(su),
                u_max: acc.u_max.max(su),
                v_min: acc.v_min.min(sv),
                v_max: acc.v_max.max(sv),
            }
        }))
    }

    /// Projects `f0` onto the nearer of the two long edges, clamped to it
    fn front_origin(&self, e: &Extents, f0: Point) -> Point {
        let (fu, fv) = self.local(f0);
        let candidates = if e.width() >= e.height() {
            let su = fu.clamp(e.u_min, e.u_max);
            [self.world(su, e.v_min), self.world(su, e.v_max)]
        } else {
            let sv = fv.clamp(e.v_min, e.v_max);
            [self.world(e.u_min, sv), self.world(e.u_max, sv)]
        };

        let [first, second] = candidates;
        if f0.distance(second) < f0.distance(first) {
            second
        } else {
            first
        }
    }
}
