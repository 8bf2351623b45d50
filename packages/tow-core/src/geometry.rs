//! geometry.rs — Planar vectors, marine headings and obstacle shapes
//!
//! Frame convention: x = East, y = North (meters). Headings are degrees,
//! 0 = North, 90 = East, increasing clockwise.

use std::ops::{Add, AddAssign, Mul, Neg, Sub, SubAssign};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TowError};

// ── Vec2 ──────────────────────────────────────────────────────────────────────

/// 2D vector in the local East-North frame, meters (or m/s for velocities)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self { Self { x, y } }

    pub fn norm(&self) -> f64 { self.x.hypot(self.y) }

    pub fn dot(&self, other: Vec2) -> f64 { self.x * other.x + self.y * other.y }

    /// z-component of the 3D cross product
    pub fn cross(&self, other: Vec2) -> f64 { self.x * other.y - self.y * other.x }

    /// Rotated 90° counter-clockwise
    pub fn perp(&self) -> Vec2 { Vec2::new(-self.y, self.x) }

    pub fn dist(&self, other: Vec2) -> f64 { (*self - other).norm() }

    pub fn is_finite(&self) -> bool { self.x.is_finite() && self.y.is_finite() }

    /// Unit vector, or `None` when the length is below `eps`
    pub fn normalized(&self, eps: f64) -> Option<Vec2> {
        let n = self.norm();
        if n > eps { Some(*self * (1.0 / n)) } else { None }
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, o: Vec2) -> Vec2 { Vec2::new(self.x + o.x, self.y + o.y) }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, o: Vec2) { self.x += o.x; self.y += o.y; }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, o: Vec2) -> Vec2 { Vec2::new(self.x - o.x, self.y - o.y) }
}

impl SubAssign for Vec2 {
    fn sub_assign(&mut self, o: Vec2) { self.x -= o.x; self.y -= o.y; }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, s: f64) -> Vec2 { Vec2::new(self.x * s, self.y * s) }
}

impl Neg for Vec2 {
    type Output = Vec2;
    fn neg(self) -> Vec2 { Vec2::new(-self.x, -self.y) }
}

// ── Headings ──────────────────────────────────────────────────────────────────

/// Normalize an angle in degrees to [0, 360)
pub fn angle360(deg: f64) -> f64 {
    let a = deg.rem_euclid(360.0);
    if a >= 360.0 { 0.0 } else { a }
}

/// Signed smallest rotation from `from` to `to`, degrees in (-180, 180]
pub fn angle_diff(to: f64, from: f64) -> f64 {
    let d = angle360(to - from);
    if d > 180.0 { d - 360.0 } else { d }
}

/// Velocity vector for a marine heading and speed
pub fn heading_to_vector(heading_deg: f64, speed: f64) -> Vec2 {
    let h = heading_deg.to_radians();
    Vec2::new(speed * h.sin(), speed * h.cos())
}

/// Marine heading of a vector (0 for the zero vector)
pub fn vector_heading(v: Vec2) -> f64 {
    if v.x == 0.0 && v.y == 0.0 {
        return 0.0;
    }
    angle360(v.x.atan2(v.y).to_degrees())
}

// ── Vessel pose ───────────────────────────────────────────────────────────────

/// Position and heading of the towing vessel
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VesselPose {
    pub position: Vec2,
    /// True heading, degrees
    pub heading_deg: f64,
}

impl VesselPose {
    pub fn new(x: f64, y: f64, heading_deg: f64) -> Self {
        Self { position: Vec2::new(x, y), heading_deg }
    }
}

// ── Obstacles ─────────────────────────────────────────────────────────────────

/// Anything the predictor can measure clearance against.
///
/// `distance_to` returns 0 for points on or inside the shape and is never
/// negative.
pub trait Obstacle {
    fn distance_to(&self, p: Vec2) -> f64;

    fn contains(&self, p: Vec2) -> bool {
        self.distance_to(p) <= 0.0
    }
}

const GEOM_EPS: f64 = 1e-9;

/// Closed convex polygon (the obstacle "gut" polygon)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConvexPolygon {
    vertices: Vec<Vec2>,
    /// +1 for counter-clockwise winding, -1 for clockwise
    winding: f64,
    label: String,
}

impl ConvexPolygon {
    /// Build and validate a polygon. Vertices may wind either way.
    pub fn new(vertices: Vec<Vec2>) -> Result<Self> {
        if vertices.len() < 3 {
            return Err(TowError::InvalidObstacle(format!(
                "need at least 3 vertices, got {}", vertices.len()
            )));
        }
        if vertices.iter().any(|v| !v.is_finite()) {
            return Err(TowError::InvalidObstacle("non-finite vertex".into()));
        }

        let area2: f64 = (0..vertices.len())
            .map(|i| vertices[i].cross(vertices[(i + 1) % vertices.len()]))
            .sum();
        if area2.abs() < GEOM_EPS {
            return Err(TowError::InvalidObstacle("degenerate (zero area) polygon".into()));
        }
        let winding = area2.signum();

        let n = vertices.len();
        for i in 0..n {
            let a = vertices[i];
            let b = vertices[(i + 1) % n];
            let c = vertices[(i + 2) % n];
            let turn = (b - a).cross(c - b);
            if turn * winding < -GEOM_EPS {
                return Err(TowError::InvalidObstacle(format!("not convex at vertex {}", (i + 1) % n)));
            }
        }

        Ok(Self { vertices, winding, label: String::new() })
    }

    pub fn from_points(points: &[[f64; 2]]) -> Result<Self> {
        Self::new(points.iter().map(|p| Vec2::new(p[0], p[1])).collect())
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn label(&self) -> &str { &self.label }

    pub fn vertices(&self) -> &[Vec2] { &self.vertices }

    pub fn centroid(&self) -> Vec2 {
        let sum = self.vertices.iter().fold(Vec2::ZERO, |acc, v| acc + *v);
        sum * (1.0 / self.vertices.len() as f64)
    }

    /// Same polygon translated by `offset`
    pub fn shifted(&self, offset: Vec2) -> Self {
        Self {
            vertices: self.vertices.iter().map(|v| *v + offset).collect(),
            winding: self.winding,
            label: self.label.clone(),
        }
    }

    fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let n = self.vertices.len();
        (0..n).map(move |i| (self.vertices[i], self.vertices[(i + 1) % n]))
    }
}

fn dist_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f64 {
    let ab = b - a;
    let len2 = ab.dot(ab);
    if len2 < GEOM_EPS {
        return p.dist(a);
    }
    let t = ((p - a).dot(ab) / len2).clamp(0.0, 1.0);
    p.dist(a + ab * t)
}

impl Obstacle for ConvexPolygon {
    fn contains(&self, p: Vec2) -> bool {
        self.edges().all(|(a, b)| (b - a).cross(p - a) * self.winding >= -GEOM_EPS)
    }

    fn distance_to(&self, p: Vec2) -> f64 {
        if self.contains(p) {
            return 0.0;
        }
        self.edges()
            .map(|(a, b)| dist_to_segment(p, a, b))
            .fold(f64::INFINITY, f64::min)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn square() -> ConvexPolygon {
        ConvexPolygon::from_points(&[[0.0, 0.0], [10.0, 0.0], [10.0, 10.0], [0.0, 10.0]]).unwrap()
    }

    #[test]
    fn test_heading_vector_convention() {
        let north = heading_to_vector(0.0, 2.0);
        assert_relative_eq!(north.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(north.y, 2.0);
        let east = heading_to_vector(90.0, 1.0);
        assert_relative_eq!(east.x, 1.0);
        assert_relative_eq!(east.y, 0.0, epsilon = 1e-12);
        assert_relative_eq!(vector_heading(Vec2::new(-1.0, 0.0)), 270.0);
    }

    #[test]
    fn test_angle_diff_wraps() {
        assert_relative_eq!(angle_diff(10.0, 350.0), 20.0);
        assert_relative_eq!(angle_diff(350.0, 10.0), -20.0);
        assert_relative_eq!(angle360(-90.0), 270.0);
        assert_relative_eq!(angle360(720.0), 0.0);
    }

    #[test]
    fn test_polygon_distance_outside_and_inside() {
        let sq = square();
        assert_relative_eq!(sq.distance_to(Vec2::new(5.0, 5.0)), 0.0);
        assert_relative_eq!(sq.distance_to(Vec2::new(15.0, 5.0)), 5.0);
        assert_relative_eq!(sq.distance_to(Vec2::new(13.0, 14.0)), 5.0);
        assert!(sq.contains(Vec2::new(10.0, 5.0)));
    }

    #[test]
    fn test_clockwise_polygon_accepted() {
        let cw = ConvexPolygon::from_points(&[[0.0, 0.0], [0.0, 10.0], [10.0, 10.0], [10.0, 0.0]]).unwrap();
        assert!(cw.contains(Vec2::new(1.0, 1.0)));
        assert_relative_eq!(cw.distance_to(Vec2::new(-3.0, 5.0)), 3.0);
    }

    #[test]
    fn test_rejects_concave_and_degenerate() {
        let concave = ConvexPolygon::from_points(&[[0.0, 0.0], [10.0, 0.0], [5.0, 2.0], [10.0, 10.0], [0.0, 10.0]]);
        assert!(concave.is_err());
        let flat = ConvexPolygon::from_points(&[[0.0, 0.0], [5.0, 0.0], [10.0, 0.0]]);
        assert!(flat.is_err());
        assert!(ConvexPolygon::from_points(&[[0.0, 0.0], [1.0, 1.0]]).is_err());
    }

    #[test]
    fn test_shifted_moves_clearance() {
        let moved = square().shifted(Vec2::new(20.0, 0.0));
        assert_relative_eq!(moved.distance_to(Vec2::new(15.0, 5.0)), 5.0);
        assert_relative_eq!(moved.centroid().x, 25.0);
    }
}
