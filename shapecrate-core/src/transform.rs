//! 3D transformation utilities

use crate::point::{Point3f, Vector3d};
use nalgebra::{Matrix3, Matrix4, Point3};
use serde::{Deserialize, Serialize};

/// An affine 3D transformation stored in double precision.
///
/// Unlike an isometry it may carry uniform scaling and reflections, which
/// is what pose normalization produces.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform3D {
    pub matrix: Matrix4<f64>,
}

impl Transform3D {
    /// Create a translation transformation
    pub fn translation(translation: Vector3d) -> Self {
        Self {
            matrix: Matrix4::new_translation(&translation),
        }
    }

    /// Create a transformation from a 3x3 linear map (rotation, reflection, ...)
    pub fn linear(linear: Matrix3<f64>) -> Self {
        Self {
            matrix: linear.to_homogeneous(),
        }
    }

    /// Create a uniform scaling transformation
    pub fn uniform_scaling(scale: f64) -> Self {
        Self {
            matrix: Matrix4::new_scaling(scale),
        }
    }

    /// Create a per-axis scaling transformation
    pub fn scaling(scale: Vector3d) -> Self {
        Self {
            matrix: Matrix4::new_nonuniform_scaling(&scale),
        }
    }

    /// Apply the transformation to a double precision point
    pub fn transform_point_f64(&self, point: &Point3<f64>) -> Point3<f64> {
        let homogeneous = self.matrix * point.to_homogeneous();
        Point3::from_homogeneous(homogeneous).unwrap_or(*point)
    }

    /// Apply the transformation to a point
    pub fn transform_point(&self, point: &Point3f) -> Point3f {
        let p = Point3::new(point.x as f64, point.y as f64, point.z as f64);
        let q = self.transform_point_f64(&p);
        Point3f::new(q.x as f32, q.y as f32, q.z as f32)
    }

    /// Compose this transformation with another (`other` is applied first)
    pub fn compose(self, other: Self) -> Self {
        Self {
            matrix: self.matrix * other.matrix,
        }
    }
}

impl std::ops::Mul for Transform3D {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_compose_order() {
        let t = Transform3D::translation(Vector3d::new(1.0, 0.0, 0.0));
        let s = Transform3D::uniform_scaling(2.0);
        // Scale first, then translate
        let p = (t * s).transform_point(&Point3f::new(1.0, 1.0, 1.0));
        assert_relative_eq!(p.x, 3.0, epsilon = 1e-6);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-6);
    }

    #[test]
    fn test_reflection() {
        let mirror = Transform3D::scaling(Vector3d::new(-1.0, 1.0, 1.0));
        let p = mirror.transform_point(&Point3f::new(2.0, 3.0, 4.0));
        assert_relative_eq!(p.x, -2.0, epsilon = 1e-6);
        assert_relative_eq!(p.z, 4.0, epsilon = 1e-6);
    }
}
