//! Mesh data structures and functionality

use crate::point::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A triangle mesh with vertices and faces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3f>,
    pub faces: Vec<[usize; 3]>,
}

impl TriangleMesh {
    /// Create a new empty mesh
    pub fn new() -> Self {
        Self {
            vertices: Vec::new(),
            faces: Vec::new(),
        }
    }

    /// Create a mesh from vertices and faces
    pub fn from_vertices_and_faces(vertices: Vec<Point3f>, faces: Vec<[usize; 3]>) -> Self {
        Self { vertices, faces }
    }

    /// Get the number of vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    /// Get the number of faces
    pub fn face_count(&self) -> usize {
        self.faces.len()
    }

    /// Check if the mesh is empty
    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty() || self.faces.is_empty()
    }

    /// Add a vertex to the mesh
    pub fn add_vertex(&mut self, vertex: Point3f) -> usize {
        let index = self.vertices.len();
        self.vertices.push(vertex);
        index
    }

    /// Add a face to the mesh
    pub fn add_face(&mut self, face: [usize; 3]) {
        self.faces.push(face);
    }

    /// Check that every face references an existing vertex
    pub fn has_valid_indices(&self) -> bool {
        let n = self.vertices.len();
        self.faces.iter().all(|f| f.iter().all(|&i| i < n))
    }

    /// Corner positions of a face in double precision
    #[inline]
    pub fn face_points(&self, face: &[usize; 3]) -> [Point3d; 3] {
        [
            to_f64(&self.vertices[face[0]]),
            to_f64(&self.vertices[face[1]]),
            to_f64(&self.vertices[face[2]]),
        ]
    }

    /// Area of every face, in face order
    pub fn face_areas(&self) -> Vec<f64> {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.face_points(face);
                triangle_area(&a, &b, &c)
            })
            .collect()
    }

    /// Centroid of every face, in face order
    pub fn face_centroids(&self) -> Vec<Point3d> {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.face_points(face);
                Point3d::from((a.coords + b.coords + c.coords) / 3.0)
            })
            .collect()
    }

    /// Total surface area
    pub fn surface_area(&self) -> f64 {
        self.face_areas().iter().sum()
    }

    /// Signed enclosed volume (divergence theorem over origin tetrahedra).
    ///
    /// Only meaningful for a closed, consistently oriented surface.
    pub fn signed_volume(&self) -> f64 {
        self.faces
            .iter()
            .map(|face| {
                let [a, b, c] = self.face_points(face);
                a.coords.dot(&b.coords.cross(&c.coords)) / 6.0
            })
            .sum()
    }

    /// Enclosed volume, or `None` when the surface is not watertight
    pub fn volume(&self) -> Option<f64> {
        if self.is_watertight() {
            Some(self.signed_volume().abs())
        } else {
            None
        }
    }

    /// A mesh is watertight when every undirected edge is shared by exactly two faces
    pub fn is_watertight(&self) -> bool {
        if self.faces.is_empty() {
            return false;
        }

        let mut edge_count: HashMap<(usize, usize), usize> = HashMap::new();
        for face in &self.faces {
            for i in 0..3 {
                let v1 = face[i];
                let v2 = face[(i + 1) % 3];
                let edge = if v1 < v2 { (v1, v2) } else { (v2, v1) };
                *edge_count.entry(edge).or_insert(0) += 1;
            }
        }

        edge_count.values().all(|&count| count == 2)
    }

    /// Area-weighted centroid of the surface.
    ///
    /// Falls back to the vertex mean when the surface has no area.
    pub fn surface_centroid(&self) -> Point3d {
        let mut weighted = Vector3d::zeros();
        let mut total = 0.0;
        for (area, centroid) in self.face_areas().into_iter().zip(self.face_centroids()) {
            weighted += centroid.coords * area;
            total += area;
        }

        if total > f64::EPSILON {
            return Point3d::from(weighted / total);
        }
        self.vertex_centroid()
    }

    /// Mean of all vertex positions
    pub fn vertex_centroid(&self) -> Point3d {
        if self.vertices.is_empty() {
            return Point3d::origin();
        }
        let sum = self
            .vertices
            .iter()
            .fold(Vector3d::zeros(), |acc, v| acc + to_f64(v).coords);
        Point3d::from(sum / self.vertices.len() as f64)
    }

    /// Clear the mesh
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.faces.clear();
    }
}

impl Default for TriangleMesh {
    fn default() -> Self {
        Self::new()
    }
}

/// Build an axis-aligned box mesh spanning `min`..`max` (12 outward-facing triangles)
pub fn box_mesh(min: Point3f, max: Point3f) -> TriangleMesh {
    let vertices = vec![
        Point3f::new(min.x, min.y, min.z),
        Point3f::new(max.x, min.y, min.z),
        Point3f::new(max.x, max.y, min.z),
        Point3f::new(min.x, max.y, min.z),
        Point3f::new(min.x, min.y, max.z),
        Point3f::new(max.x, min.y, max.z),
        Point3f::new(max.x, max.y, max.z),
        Point3f::new(min.x, max.y, max.z),
    ];
    let faces = vec![
        [0, 2, 1], [0, 3, 2], // bottom
        [4, 5, 6], [4, 6, 7], // top
        [0, 1, 5], [0, 5, 4], // front
        [2, 3, 7], [2, 7, 6], // back
        [1, 2, 6], [1, 6, 5], // right
        [3, 0, 4], [3, 4, 7], // left
    ];
    TriangleMesh::from_vertices_and_faces(vertices, faces)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn unit_cube() -> TriangleMesh {
        box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0))
    }

    #[test]
    fn test_cube_counts() {
        let cube = unit_cube();
        assert_eq!(cube.vertex_count(), 8);
        assert_eq!(cube.face_count(), 12);
        assert!(cube.has_valid_indices());
        assert!(!cube.is_empty());
    }

    #[test]
    fn test_cube_area_and_volume() {
        let cube = unit_cube();
        assert_relative_eq!(cube.surface_area(), 6.0, epsilon = 1e-9);
        assert!(cube.is_watertight());
        assert_relative_eq!(cube.volume().unwrap(), 1.0, epsilon = 1e-9);
        // Faces are wound outward
        assert!(cube.signed_volume() > 0.0);
    }

    #[test]
    fn test_open_mesh_has_no_volume() {
        let mut cube = unit_cube();
        cube.faces.pop();
        assert!(!cube.is_watertight());
        assert!(cube.volume().is_none());
    }

    #[test]
    fn test_surface_centroid_of_box() {
        let mesh = box_mesh(Point3f::new(-1.0, 0.0, 2.0), Point3f::new(3.0, 2.0, 4.0));
        let c = mesh.surface_centroid();
        assert_relative_eq!(c.x, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.y, 1.0, epsilon = 1e-6);
        assert_relative_eq!(c.z, 3.0, epsilon = 1e-6);
    }

    #[test]
    fn test_empty_mesh() {
        let mesh = TriangleMesh::new();
        assert!(mesh.is_empty());
        assert!(!mesh.is_watertight());
        assert_eq!(mesh.surface_area(), 0.0);
    }
}
