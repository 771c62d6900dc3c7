//! Spherical math for the unit-sphere geometry kernel.
//!
//! A point carries both geographic coordinates (degrees) and the matching
//! unit Cartesian vector. Every predicate works on the vectors, so the
//! results stay stable across the poles and the antimeridian where the
//! lat/lon charts degenerate.

use crate::EPSILON;
use serde::Serialize;

/// Chord-length tolerance equivalent to EPSILON degrees of arc.
const CHORD_EPSILON: f64 = EPSILON * std::f64::consts::PI / 180.0;

/// A vector in R^3.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f64 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self::new(
            self.y * other.z - self.z * other.y,
            self.z * other.x - self.x * other.z,
            self.x * other.y - self.y * other.x,
        )
    }

    pub fn length(self) -> f64 {
        self.dot(self).sqrt()
    }

    /// Scale to unit length. The zero vector is returned unchanged.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len <= f64::EPSILON {
            self
        } else {
            self * (1.0 / len)
        }
    }
}

impl std::ops::Add for Vec3 {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::new(self.x + other.x, self.y + other.y, self.z + other.z)
    }
}

impl std::ops::Sub for Vec3 {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::new(self.x - other.x, self.y - other.y, self.z - other.z)
    }
}

impl std::ops::Neg for Vec3 {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl std::ops::Mul<f64> for Vec3 {
    type Output = Self;

    fn mul(self, s: f64) -> Self::Output {
        Self::new(self.x * s, self.y * s, self.z * s)
    }
}

/// A location on the unit sphere.
///
/// Latitude is in [-90, 90] and longitude in [-180, 180], both in degrees;
/// the Cartesian representation is kept in lockstep with them.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
    #[serde(skip)]
    vec: Vec3,
}

impl Point {
    /// Build a point from geographic coordinates in degrees.
    pub fn new(lat: f64, lon: f64) -> Self {
        let (lat_r, lon_r) = (lat.to_radians(), lon.to_radians());
        let vec = Vec3::new(
            lat_r.cos() * lon_r.cos(),
            lat_r.cos() * lon_r.sin(),
            lat_r.sin(),
        );
        Self { lat, lon, vec }
    }

    /// Build a point from a Cartesian direction (normalised internally).
    pub fn from_vec(v: Vec3) -> Self {
        let v = v.normalize();
        let lat = v.z.clamp(-1.0, 1.0).asin().to_degrees();
        let lon = v.y.atan2(v.x).to_degrees();
        Self { lat, lon, vec: v }
    }

    pub fn vec(&self) -> Vec3 {
        self.vec
    }

    /// The diametrically opposite point.
    pub fn antipode(&self) -> Self {
        Self::from_vec(-self.vec)
    }

    /// Tolerant equality: latitudes within EPSILON and either both points
    /// polar or longitudes within EPSILON (modulo 360). A tiny Cartesian
    /// chord also counts, which keeps the test well conditioned right at
    /// the poles where latitude itself is not.
    pub fn approx_eq(&self, other: &Point) -> bool {
        if (self.vec - other.vec).length() <= CHORD_EPSILON {
            return true;
        }
        if (self.lat - other.lat).abs() > EPSILON {
            return false;
        }
        if self.lat.abs() >= 90.0 - EPSILON && other.lat.abs() >= 90.0 - EPSILON {
            return true;
        }
        let mut dlon = (self.lon - other.lon).abs();
        if dlon > 180.0 {
            dlon = 360.0 - dlon;
        }
        dlon <= EPSILON
    }
}

/// Winding of three points on the sphere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Clockwise,
    Anticlockwise,
    Colinear,
}

/// Classify `p3` against the directed great circle from `p1` to `p2`.
///
/// The sign of `(p1 x p2) . p3` decides: positive means `p3` lies left of
/// the arc (anticlockwise), negative right of it (clockwise), and within
/// the EPSILON band the three points are colinear. Any two equal arguments
/// give Colinear.
pub fn orientation(p1: &Point, p2: &Point, p3: &Point) -> Orientation {
    if p1.approx_eq(p2) || p1.approx_eq(p3) || p2.approx_eq(p3) {
        return Orientation::Colinear;
    }
    let det = p1.vec.cross(p2.vec).dot(p3.vec);
    if det > EPSILON {
        Orientation::Anticlockwise
    } else if det < -EPSILON {
        Orientation::Clockwise
    } else {
        Orientation::Colinear
    }
}

/// Whether `p` lies on the minor great-circle arc from `r` to `l`.
///
/// Equality with an endpoint counts as bounded; equality of the antipode
/// with an endpoint does not.
pub fn is_bounded(p: &Point, r: &Point, l: &Point) -> bool {
    if p.approx_eq(r) || p.approx_eq(l) {
        return true;
    }
    let anti = p.antipode();
    if anti.approx_eq(r) || anti.approx_eq(l) {
        return false;
    }
    let rp = r.vec.cross(p.vec);
    let rl = r.vec.cross(l.vec);
    let lp = l.vec.cross(p.vec);
    let lr = l.vec.cross(r.vec);
    rp.dot(rl) >= -EPSILON && lp.dot(lr) >= -EPSILON
}

/// Result of intersecting two great circles.
#[derive(Debug, Clone, Copy)]
pub enum CircleIntersection {
    /// The two antipodal crossing points.
    Points(Point, Point),
    /// The circles coincide; the caller must treat this as a colinear edge
    /// case rather than an error.
    Coincident,
}

/// Intersect the great circle through (`p1`, `p2`) with the one through
/// (`p3`, `p4`).
pub fn intersection(p1: &Point, p2: &Point, p3: &Point, p4: &Point) -> CircleIntersection {
    let a = p1.vec.cross(p2.vec);
    let b = p3.vec.cross(p4.vec);
    let c = a.cross(b);
    if c.length() < EPSILON {
        return CircleIntersection::Coincident;
    }
    let n = c.normalize();
    CircleIntersection::Points(Point::from_vec(n), Point::from_vec(-n))
}

/// Reflect `p` across the plane of the great circle through `r` and `l`.
pub fn reflect(p: &Point, r: &Point, l: &Point) -> Point {
    let n = r.vec.cross(l.vec).normalize();
    Point::from_vec(p.vec - n * (2.0 * p.vec.dot(n)))
}

/// Great-circle arc length between two points, in degrees.
///
/// Haversine formulation: exact on the unit sphere and better conditioned
/// for short arcs than the plain acos form.
pub fn distance(a: &Point, b: &Point) -> f64 {
    if a.approx_eq(b) {
        return 0.0;
    }
    let phi1 = a.lat.to_radians();
    let phi2 = b.lat.to_radians();
    let dphi = (b.lat - a.lat).to_radians();
    let dlambda = (b.lon - a.lon).to_radians();
    let h = (dphi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    let h = h.clamp(0.0, 1.0);
    (2.0 * h.sqrt().atan2((1.0 - h).sqrt())).to_degrees()
}
