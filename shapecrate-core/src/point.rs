//! Point types and related functionality

use nalgebra::{Point3, Vector3};

/// A 3D point with floating point coordinates
pub type Point3f = Point3<f32>;

/// A 3D point with double precision coordinates
pub type Point3d = Point3<f64>;

/// A 3D vector with floating point components
pub type Vector3f = Vector3<f32>;

/// A 3D vector with double precision components
pub type Vector3d = Vector3<f64>;

/// Widen a single precision point for accumulation
#[inline]
pub fn to_f64(point: &Point3f) -> Point3d {
    Point3d::new(point.x as f64, point.y as f64, point.z as f64)
}

/// Area of the triangle spanned by three points
#[inline]
pub fn triangle_area(a: &Point3d, b: &Point3d, c: &Point3d) -> f64 {
    (b - a).cross(&(c - a)).norm() * 0.5
}

/// Unsigned volume of the tetrahedron spanned by four points
#[inline]
pub fn tetrahedron_volume(a: &Point3d, b: &Point3d, c: &Point3d, d: &Point3d) -> f64 {
    (b - a).dot(&(c - a).cross(&(d - a))).abs() / 6.0
}
