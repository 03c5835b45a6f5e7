//! Convex hull and hull-derived measurements

use log::warn;
use parry3d::transformation::try_convex_hull;
use shapecrate_core::{to_f64, Point3f, TriangleMesh};

/// Convex hull of the mesh vertices as a closed triangle mesh.
///
/// Returns `None` when the hull is not a proper solid: fewer than four
/// vertices, coplanar input, or a failure inside the hull algorithm.
pub fn convex_hull(mesh: &TriangleMesh) -> Option<TriangleMesh> {
    convex_hull_of_points(&mesh.vertices)
}

/// Convex hull of a point set, see [`convex_hull`]
pub fn convex_hull_of_points(points: &[Point3f]) -> Option<TriangleMesh> {
    if points.len() < 4 {
        return None;
    }

    let (vertices, indices) = match try_convex_hull(points) {
        Ok(hull) => hull,
        Err(err) => {
            warn!("convex hull of {} points failed: {:?}", points.len(), err);
            return None;
        }
    };

    let hull = TriangleMesh::from_vertices_and_faces(
        vertices,
        indices
            .into_iter()
            .map(|[a, b, c]| [a as usize, b as usize, c as usize])
            .collect(),
    );

    // Flat hulls come back as a doubled polygon with no volume
    if hull.face_count() < 4 || !(hull.signed_volume().abs() > f64::EPSILON) {
        return None;
    }
    Some(hull)
}

/// Largest distance between two points of the set.
///
/// Quadratic in the number of points; call it on hull vertices.
pub fn diameter(points: &[Point3f]) -> Option<f64> {
    if points.is_empty() {
        return None;
    }
    let points: Vec<_> = points.iter().map(to_f64).collect();
    let mut best = 0.0_f64;
    for (i, a) in points.iter().enumerate() {
        for b in &points[i + 1..] {
            best = best.max((a - b).norm_squared());
        }
    }
    Some(best.sqrt())
}
