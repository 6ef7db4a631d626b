//! Point / vector type for drawing-plane coordinates

use serde::{Deserialize, Serialize};
use std::ops::{Add, Mul, Neg, Sub};

/// Lengths below this are treated as zero
pub const EPSILON: f64 = 1e-9;

/// A point or free vector in the drawing plane (meters)
///
/// Serialized as a two-element array `[x, y]`, matching how clients and the
/// crawl engine exchange coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// An open or closed sequence of vertices as read from a drawing
pub type Polyline = Vec<Point>;

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Unit vector for a heading in degrees (0° = +X, counter-clockwise)
    pub fn from_angle_deg(angle_deg: f64) -> Self {
        let rad = angle_deg.to_radians();
        Self::new(rad.cos(), rad.sin())
    }

    pub fn dot(self, other: Point) -> f64 {
        self.x * other.x + self.y * other.y
    }

    /// Z component of the 3D cross product
    pub fn cross(self, other: Point) -> f64 {
        self.x * other.y - self.y * other.x
    }

    pub fn length(self) -> f64 {
        self.x.hypot(self.y)
    }

    pub fn distance(self, other: Point) -> f64 {
        (other - self).length()
    }

    /// Returns the unit vector, or `None` when the length is below [`EPSILON`]
    /// or not finite.
    pub fn normalize(self) -> Option<Point> {
        let len = self.length();
        if !len.is_finite() || len < EPSILON {
            return None;
        }
        Some(Point::new(self.x / len, self.y / len))
    }

    /// Rotates by +90° (counter-clockwise)
    pub fn rotate90(self) -> Point {
        Point::new(-self.y, self.x)
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f64; 2]> for Point {
    fn from([x, y]: [f64; 2]) -> Self {
        Point::new(x, y)
    }
}

impl From<Point> for [f64; 2] {
    fn from(p: Point) -> Self {
        [p.x, p.y]
    }
}

impl Add for Point {
    type Output = Point;

    fn add(self, rhs: Point) -> Point {
        Point::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl Sub for Point {
    type Output = Point;

    fn sub(self, rhs: Point) -> Point {
        Point::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Point {
    type Output = Point;

    fn mul(self, rhs: f64) -> Point {
        Point::new(self.x * rhs, self.y * rhs)
    }
}

impl Neg for Point {
    type Output = Point;

    fn neg(self) -> Point {
        Point::new(-self.x, -self.y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_near_zero() {
        assert!(Point::new(0.0, 0.0).normalize().is_none());
        assert!(Point::new(1e-12, -1e-12).normalize().is_none());
        assert!(Point::new(f64::NAN, 1.0).normalize().is_none());
    }

    #[test]
    fn test_normalize_unit_length() {
        let n = Point::new(3.0, 4.0).normalize().unwrap();
        assert!((n.length() - 1.0).abs() < 1e-12);
        assert_eq!(n, Point::new(0.6, 0.8));
    }

    #[test]
    fn test_rotate90_is_counter_clockwise() {
        assert_eq!(Point::new(1.0, 0.0).rotate90(), Point::new(-0.0, 1.0));
        let u = Point::new(0.6, 0.8);
        assert_eq!(u.dot(u.rotate90()), 0.0);
        assert!(u.cross(u.rotate90()) > 0.0);
    }

    #[test]
    fn test_serializes_as_pair() {
        let json = serde_json::to_string(&Point::new(1.5, -2.0)).unwrap();
        assert_eq!(json, "[1.5,-2.0]");

        let parsed: Point = serde_json::from_str("[3, 4]").unwrap();
        assert_eq!(parsed, Point::new(3.0, 4.0));

        assert!(serde_json::from_str::<Point>("[1, 2, 3]").is_err());
    }

    #[test]
    fn test_from_angle() {
        let east = Point::from_angle_deg(0.0);
        assert!((east.x - 1.0).abs() < 1e-12 && east.y.abs() < 1e-12);
        let north = Point::from_angle_deg(90.0);
        assert!(north.x.abs() < 1e-12 && (north.y - 1.0).abs() < 1e-12);
    }
}
