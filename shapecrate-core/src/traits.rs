//! Core traits for shapecrate

use crate::{mesh::*, point::*, point_cloud::*, transform::Transform3D};

/// Trait for objects with a spatial extent
pub trait Drawable {
    /// Get the axis-aligned bounding box of the object
    fn bounding_box(&self) -> (Point3f, Point3f);

    /// Get the center point of the bounding box
    fn center(&self) -> Point3f {
        let (min, max) = self.bounding_box();
        Point3f::new(
            (min.x + max.x) / 2.0,
            (min.y + max.y) / 2.0,
            (min.z + max.z) / 2.0,
        )
    }

    /// Edge lengths of the bounding box
    fn extents(&self) -> Vector3f {
        let (min, max) = self.bounding_box();
        max - min
    }
}

/// Trait for objects that can be transformed
pub trait Transformable {
    /// Apply a transformation to the object
    fn transform(&mut self, transform: &Transform3D);
}

fn bounds<'a>(points: impl Iterator<Item = &'a Point3f>) -> (Point3f, Point3f) {
    let mut min = Point3f::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Point3f::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    let mut any = false;

    for p in points {
        any = true;
        min.x = min.x.min(p.x);
        min.y = min.y.min(p.y);
        min.z = min.z.min(p.z);

        max.x = max.x.max(p.x);
        max.y = max.y.max(p.y);
        max.z = max.z.max(p.z);
    }

    if !any {
        return (Point3f::origin(), Point3f::origin());
    }
    (min, max)
}

impl Drawable for PointCloud<Point3f> {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds(self.points.iter())
    }
}

impl Drawable for TriangleMesh {
    fn bounding_box(&self) -> (Point3f, Point3f) {
        bounds(self.vertices.iter())
    }
}

impl Transformable for TriangleMesh {
    fn transform(&mut self, transform: &Transform3D) {
        for vertex in &mut self.vertices {
            *vertex = transform.transform_point(vertex);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_mesh_bounding_box() {
        let mesh = box_mesh(Point3f::new(-1.0, 2.0, 0.0), Point3f::new(1.0, 5.0, 0.5));
        let (min, max) = mesh.bounding_box();
        assert_eq!(min, Point3f::new(-1.0, 2.0, 0.0));
        assert_eq!(max, Point3f::new(1.0, 5.0, 0.5));
        let extents = mesh.extents();
        assert_relative_eq!(extents.y, 3.0);
        assert_relative_eq!(mesh.center().y, 3.5);
    }

    #[test]
    fn test_empty_cloud_bounding_box() {
        let cloud = PointCloud::<Point3f>::new();
        assert_eq!(cloud.bounding_box(), (Point3f::origin(), Point3f::origin()));
    }

    #[test]
    fn test_transform_mesh_in_place() {
        let mut mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        mesh.transform(&Transform3D::uniform_scaling(3.0));
        assert_relative_eq!(mesh.extents().x, 3.0, epsilon = 1e-6);
    }
}
