//! Footprint polygon checks and measures

use thiserror::Error;

use super::vector::{EPSILON, Point};

/// Reasons a footprint cannot be used as a simple polygon
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FootprintError {
    #[error("footprint needs at least 3 distinct vertices, got {0}")]
    TooFewVertices(usize),

    #[error("footprint vertex {0} has a non-finite coordinate")]
    NonFinite(usize),

    #[error("footprint edge {0} has zero length")]
    DegenerateEdge(usize),

    #[error("footprint edges {0} and {1} intersect")]
    SelfIntersecting(usize, usize),

    #[error("footprint encloses no area")]
    ZeroArea,
}

/// Checks that `points` describe a simple polygon and returns its ring
///
/// A trailing vertex equal to the first one (closed polyline form) is
/// dropped, so both `[a, b, c]` and `[a, b, c, a]` are accepted.
pub fn validate_footprint(points: &[Point]) -> Result<Vec<Point>, FootprintError> {
    if let Some(idx) = points.iter().position(|p| !p.is_finite()) {
        return Err(FootprintError::NonFinite(idx));
    }

    let mut ring = points.to_vec();
    if ring.len() > 1 && ring[0].distance(ring[ring.len() - 1]) < EPSILON {
        ring.pop();
    }
    let n = ring.len();
    if n < 3 {
        return Err(FootprintError::TooFewVertices(n));
    }

    for i in 0..n {
        if edge(&ring, i).length() < EPSILON {
            return Err(FootprintError::DegenerateEdge(i));
        }
    }

    // Consecutive edges that fold back onto each other form a spike.
    for i in 0..n {
        let a = edge(&ring, i);
        let b = edge(&ring, (i + 1) % n);
        if a.cross(b).abs() <= EPSILON * a.length() * b.length() && a.dot(b) < 0.0 {
            return Err(FootprintError::SelfIntersecting(i, (i + 1) % n));
        }
    }

    for i in 0..n {
        for j in (i + 1)..n {
            if j == i + 1 || (i == 0 && j == n - 1) {
                continue;
            }
            if segments_intersect(ring[i], ring[(i + 1) % n], ring[j], ring[(j + 1) % n]) {
                return Err(FootprintError::SelfIntersecting(i, j));
            }
        }
    }

    if polygon_area(&ring).abs() < EPSILON {
        return Err(FootprintError::ZeroArea);
    }

    Ok(ring)
}

/// Signed shoelace area (positive for counter-clockwise rings)
pub fn polygon_area(ring: &[Point]) -> f64 {
    let n = ring.len();
    if n < 3 {
        return 0.0;
    }
    let twice: f64 = (0..n).map(|i| ring[i].cross(ring[(i + 1) % n])).sum();
    twice / 2.0
}

/// Area centroid, falling back to the vertex mean for degenerate rings
pub fn polygon_centroid(ring: &[Point]) -> Point {
    let n = ring.len();
    if n == 0 {
        return Point::new(0.0, 0.0);
    }
    let area = polygon_area(ring);
    if area.abs() < EPSILON {
        let sum = ring.iter().fold(Point::new(0.0, 0.0), |acc, p| acc + *p);
        return sum * (1.0 / n as f64);
    }

    let (mut cx, mut cy) = (0.0, 0.0);
    for i in 0..n {
        let (p, q) = (ring[i], ring[(i + 1) % n]);
        let w = p.cross(q);
        cx += (p.x + q.x) * w;
        cy += (p.y + q.y) * w;
    }
    Point::new(cx / (6.0 * area), cy / (6.0 * area))
}

/// Direction of the longest edge of the ring
///
/// Used as the automatic frontage heading when a submission supplies none.
pub fn major_axis_direction(ring: &[Point]) -> Option<Point> {
    let n = ring.len();
    if n < 2 {
        return None;
    }
    let mut best: Option<Point> = None;
    for i in 0..n {
        let e = edge(ring, i);
        if best.is_none_or(|b| e.length() > b.length()) {
            best = Some(e);
        }
    }
    best.and_then(Point::normalize)
}

fn edge(ring: &[Point], i: usize) -> Point {
    ring[(i + 1) % ring.len()] - ring[i]
}

fn orientation(a: Point, b: Point, c: Point) -> f64 {
    (b - a).cross(c - a)
}

fn within_box(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) - EPSILON
        && p.x <= a.x.max(b.x) + EPSILON
        && p.y >= a.y.min(b.y) - EPSILON
        && p.y <= a.y.max(b.y) + EPSILON
}

/// Closed-segment intersection test (touching counts)
fn segments_intersect(p1: Point, p2: Point, q1: Point, q2: Point) -> bool {
    let d1 = orientation(q1, q2, p1);
    let d2 = orientation(q1, q2, p2);
    let d3 = orientation(p1, p2, q1);
    let d4 = orientation(p1, p2, q2);

    let straddles = |a: f64, b: f64| (a > EPSILON && b < -EPSILON) || (a < -EPSILON && b > EPSILON);
    if straddles(d1, d2) && straddles(d3, d4) {
        return true;
    }

    (d1.abs() <= EPSILON && within_box(q1, q2, p1))
        || (d2.abs() <= EPSILON && within_box(q1, q2, p2))
        || (d3.abs() <= EPSILON && within_box(p1, p2, q1))
        || (d4.abs() <= EPSILON && within_box(p1, p2, q2))
}
