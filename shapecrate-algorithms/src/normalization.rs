//! Pose and scale normalization
//!
//! Brings a mesh into a canonical frame: the surface centroid at the origin,
//! principal axes along x, y, z in order of decreasing variance, each axis
//! oriented so that most of the surface mass lies on its positive side, and
//! the largest bounding box extent equal to one.

use log::debug;
use nalgebra::{Matrix3, SymmetricEigen};
use serde::{Deserialize, Serialize};
use shapecrate_core::{
    to_f64, CanonicalGeometry, Drawable, Error, NormalizationDiagnostics, Point3d, Result,
    Transform3D, Transformable, TriangleMesh, Vector3d, MISSING,
};

/// Configuration for [`Normalizer`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Relative tolerance used for degeneracy and orientation decisions
    pub epsilon: f64,
    /// Iteration cap for the symmetric eigensolver
    pub max_eigen_iterations: usize,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            epsilon: 1e-6,
            max_eigen_iterations: 1000,
        }
    }
}

impl NormalizerConfig {
    pub fn with_epsilon(mut self, epsilon: f64) -> Self {
        self.epsilon = epsilon;
        self
    }
}

/// Principal axes of a point set
#[derive(Debug, Clone, Copy)]
pub struct PcaResult {
    /// Mean of the points
    pub centroid: Point3d,
    /// Unit eigenvectors, sorted by eigenvalue descending
    pub axes: [Vector3d; 3],
    /// Variances along each axis, sorted descending
    pub eigenvalues: [f64; 3],
}

/// Compute the principal axes of `points`.
///
/// Returns `None` for fewer than three points or when the eigensolver does
/// not converge within `max_iterations`.
pub fn principal_axes(points: &[Point3d], max_iterations: usize) -> Option<PcaResult> {
    if points.len() < 3 {
        return None;
    }

    let count = points.len() as f64;
    let centroid = Point3d::from(
        points
            .iter()
            .fold(Vector3d::zeros(), |acc, p| acc + p.coords)
            / count,
    );

    let mut covariance = Matrix3::zeros();
    for p in points {
        let d = p - centroid;
        covariance += d * d.transpose();
    }
    covariance /= count;

    let eigen: SymmetricEigen<f64, _> =
        covariance.try_symmetric_eigen(f64::EPSILON, max_iterations)?;
    let eigenvalues = eigen.eigenvalues;
    if eigenvalues.iter().any(|v| !v.is_finite()) {
        return None;
    }

    let mut indices = [0usize, 1, 2];
    indices.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    Some(PcaResult {
        centroid,
        axes: [
            eigen.eigenvectors.column(indices[0]).into_owned(),
            eigen.eigenvectors.column(indices[1]).into_owned(),
            eigen.eigenvectors.column(indices[2]).into_owned(),
        ],
        eigenvalues: [
            eigenvalues[indices[0]],
            eigenvalues[indices[1]],
            eigenvalues[indices[2]],
        ],
    })
}

/// Signed second moment of the face centroids along each axis: Σ sign(c)·c².
///
/// Also returns Σ c² per axis, the scale against which a moment counts as zero.
pub fn flip_moments(mesh: &TriangleMesh) -> ([f64; 3], [f64; 3]) {
    let mut moments = [0.0; 3];
    let mut magnitudes = [0.0; 3];
    for centroid in mesh.face_centroids() {
        for axis in 0..3 {
            let c = centroid[axis];
            moments[axis] += c.signum() * c * c;
            magnitudes[axis] += c * c;
        }
    }
    (moments, magnitudes)
}

/// Pose normalizer
#[derive(Debug, Clone, Default)]
pub struct Normalizer {
    config: NormalizerConfig,
}

impl Normalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &NormalizerConfig {
        &self.config
    }

    /// Normalize `mesh` into canonical pose.
    ///
    /// # Errors
    /// * `DegenerateGeometry` if the mesh has no vertices or faces, references
    ///   missing vertices, or has zero extent
    /// * `NormalizationFailure` if the covariance is singular (the points do
    ///   not span a plane) or the eigendecomposition fails
    pub fn normalize(
        &self,
        mesh: &TriangleMesh,
    ) -> Result<(CanonicalGeometry, NormalizationDiagnostics)> {
        let (canonical, diagnostics, _) = self.normalize_with_transform(mesh)?;
        Ok((canonical, diagnostics))
    }

    /// Like [`Normalizer::normalize`], also returning the applied transform
    pub fn normalize_with_transform(
        &self,
        mesh: &TriangleMesh,
    ) -> Result<(CanonicalGeometry, NormalizationDiagnostics, Transform3D)> {
        if mesh.is_empty() {
            return Err(Error::DegenerateGeometry(format!(
                "mesh has {} vertices and {} faces",
                mesh.vertex_count(),
                mesh.face_count()
            )));
        }
        if !mesh.has_valid_indices() {
            return Err(Error::DegenerateGeometry(
                "face references a vertex that does not exist".to_string(),
            ));
        }

        let eps = self.config.epsilon;

        // Center
        let centroid = mesh.surface_centroid();
        let translate = Transform3D::translation(-centroid.coords);

        // Rotate
        let points: Vec<Point3d> = mesh
            .vertices
            .iter()
            .map(|v| translate.transform_point_f64(&to_f64(v)))
            .collect();
        let pca = principal_axes(&points, self.config.max_eigen_iterations).ok_or_else(|| {
            Error::NormalizationFailure("eigendecomposition of the covariance failed".to_string())
        })?;
        let [l0, l1, _] = pca.eigenvalues;
        if !(l0 > f64::MIN_POSITIVE) || l1 <= eps * eps * l0 {
            return Err(Error::NormalizationFailure(format!(
                "covariance is singular (eigenvalues {:?})",
                pca.eigenvalues
            )));
        }

        let mut rotation = Matrix3::from_rows(&[
            pca.axes[0].transpose(),
            pca.axes[1].transpose(),
            pca.axes[2].transpose(),
        ]);
        if rotation.determinant() < 0.0 {
            rotation = -rotation;
        }
        let rotate = Transform3D::linear(rotation);

        // Flip
        let mut aligned = mesh.clone();
        aligned.transform(&(rotate * translate));
        let (moments, magnitudes) = flip_moments(&aligned);
        let mut signs = Vector3d::new(1.0, 1.0, 1.0);
        for axis in 0..3 {
            if moments[axis] < -eps * magnitudes[axis] {
                signs[axis] = -1.0;
            }
        }
        let flip = Transform3D::scaling(signs);

        // Scale
        let oriented = flip * rotate * translate;
        let mut canonical = mesh.clone();
        canonical.transform(&oriented);
        let max_extent = canonical.extents().max() as f64;
        if !(max_extent > f64::MIN_POSITIVE) {
            return Err(Error::DegenerateGeometry("mesh has zero extent".to_string()));
        }
        let scale = 1.0 / max_extent;
        let transform = Transform3D::uniform_scaling(scale) * oriented;

        let mut output = mesh.clone();
        output.transform(&transform);

        let diagnostics = self.diagnose(&output, centroid.coords.norm(), scale, &pca.eigenvalues);
        debug!(
            "normalized mesh: {} vertices, scale {:.4}, flips {:?}, alignment {:.4}",
            output.vertex_count(),
            scale,
            signs,
            diagnostics.alignment_score
        );

        Ok((CanonicalGeometry::new(output), diagnostics, transform))
    }

    fn diagnose(
        &self,
        canonical: &TriangleMesh,
        distance_to_center: f64,
        scale: f64,
        input_eigenvalues: &[f64; 3],
    ) -> NormalizationDiagnostics {
        let points: Vec<Point3d> = canonical.vertices.iter().map(to_f64).collect();
        let alignment_score = principal_axes(&points, self.config.max_eigen_iterations)
            .map(|pca| {
                pca.axes
                    .iter()
                    .enumerate()
                    .map(|(i, axis)| axis[i].abs())
                    .sum::<f64>()
                    / 3.0
            })
            .unwrap_or(MISSING);

        let (moments, magnitudes) = flip_moments(canonical);
        let oriented_axes = (0..3)
            .filter(|&axis| moments[axis] >= -self.config.epsilon * magnitudes[axis])
            .count();

        let s2 = scale * scale;
        NormalizationDiagnostics {
            distance_to_center,
            scale_factor: scale,
            alignment_score,
            oriented_axes,
            eigenvalues: [
                input_eigenvalues[0] * s2,
                input_eigenvalues[1] * s2,
                input_eigenvalues[2] * s2,
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::{Rotation3, Vector3};
    use shapecrate_core::{box_mesh, Point3f};

    /// Irregular tetrahedron with distinct principal variances and
    /// well-separated flip moments on every axis
    fn skewed_tetrahedron() -> TriangleMesh {
        TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(4.0, 0.0, 0.0),
                Point3f::new(0.0, 2.0, 0.0),
                Point3f::new(1.0, 1.0, 0.5),
            ],
            vec![[0, 2, 1], [0, 1, 3], [1, 2, 3], [2, 0, 3]],
        )
    }

    fn rigidly_moved(mesh: &TriangleMesh, scale: f64) -> TriangleMesh {
        let rotation = Rotation3::from_euler_angles(0.3, -1.1, 2.0);
        let transform = Transform3D::translation(Vector3::new(1.0, -4.0, 7.0))
            * Transform3D::uniform_scaling(scale)
            * Transform3D::linear(*rotation.matrix());
        let mut moved = mesh.clone();
        moved.transform(&transform);
        moved
    }

    fn max_vertex_difference(a: &TriangleMesh, b: &TriangleMesh) -> f32 {
        a.vertices
            .iter()
            .zip(b.vertices.iter())
            .map(|(p, q)| (p - q).norm())
            .fold(0.0, f32::max)
    }

    #[test]
    fn test_canonical_postconditions() {
        let normalizer = Normalizer::default();
        let (canonical, diagnostics) = normalizer.normalize(&skewed_tetrahedron()).unwrap();

        let centroid = canonical.mesh().surface_centroid();
        assert!(centroid.coords.norm() < 1e-5, "centroid {:?}", centroid);

        let extents = canonical.mesh().extents();
        assert_relative_eq!(extents.max(), 1.0, epsilon = 1e-5);

        assert_eq!(diagnostics.oriented_axes, 3);
        assert!(diagnostics.alignment_score > 1.0 - 1e-6);
        assert!(diagnostics.eigenvalues[0] >= diagnostics.eigenvalues[1]);
        assert!(diagnostics.eigenvalues[1] >= diagnostics.eigenvalues[2]);
    }

    #[test]
    fn test_principal_axis_follows_longest_direction() {
        let mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 6.0, 2.0));
        let (canonical, _) = Normalizer::default().normalize(&mesh).unwrap();
        let extents = canonical.mesh().extents();
        assert_relative_eq!(extents.x, 1.0, epsilon = 1e-5);
        assert_relative_eq!(extents.y, 2.0 / 6.0, epsilon = 1e-5);
        assert_relative_eq!(extents.z, 1.0 / 6.0, epsilon = 1e-5);
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let normalizer = Normalizer::default();
        let (first, _) = normalizer.normalize(&skewed_tetrahedron()).unwrap();
        let (second, diagnostics) = normalizer.normalize(first.mesh()).unwrap();

        assert!(diagnostics.distance_to_center < 1e-5);
        assert_relative_eq!(diagnostics.scale_factor, 1.0, epsilon = 1e-5);
        assert!(diagnostics.alignment_score > 1.0 - 1e-6);
        assert!(max_vertex_difference(first.mesh(), second.mesh()) < 1e-5);
    }

    #[test]
    fn test_scale_invariance() {
        let normalizer = Normalizer::default();
        let mesh = skewed_tetrahedron();
        let mut scaled = mesh.clone();
        scaled.transform(&Transform3D::uniform_scaling(17.5));

        let (a, da) = normalizer.normalize(&mesh).unwrap();
        let (b, db) = normalizer.normalize(&scaled).unwrap();
        assert!(max_vertex_difference(a.mesh(), b.mesh()) < 1e-5);
        assert_relative_eq!(da.scale_factor / db.scale_factor, 17.5, epsilon = 1e-4);
    }

    #[test]
    fn test_rotation_invariance() {
        let normalizer = Normalizer::default();
        let mesh = skewed_tetrahedron();
        let (a, da) = normalizer.normalize(&mesh).unwrap();
        let (b, db) = normalizer.normalize(&rigidly_moved(&mesh, 2.5)).unwrap();

        assert!(max_vertex_difference(a.mesh(), b.mesh()) < 1e-4);
        for i in 0..3 {
            assert_relative_eq!(da.eigenvalues[i], db.eigenvalues[i], epsilon = 1e-6);
        }
    }

    #[test]
    fn test_mirrored_input_reaches_same_pose() {
        let normalizer = Normalizer::default();
        let mesh = skewed_tetrahedron();
        let mut mirrored = mesh.clone();
        mirrored.transform(&Transform3D::scaling(Vector3d::new(-1.0, 1.0, 1.0)));

        let (a, _) = normalizer.normalize(&mesh).unwrap();
        let (b, _) = normalizer.normalize(&mirrored).unwrap();
        assert!(max_vertex_difference(a.mesh(), b.mesh()) < 1e-4);
    }

    #[test]
    fn test_empty_mesh_is_degenerate() {
        let result = Normalizer::default().normalize(&TriangleMesh::new());
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_bad_indices_are_degenerate() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 0.0, 0.0)],
            vec![[0, 1, 5]],
        );
        let result = Normalizer::default().normalize(&mesh);
        assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
    }

    #[test]
    fn test_collinear_mesh_fails_normalization() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        let result = Normalizer::default().normalize(&mesh);
        assert!(matches!(result, Err(Error::NormalizationFailure(_))));
    }

    #[test]
    fn test_flip_moments_sign() {
        let mesh = box_mesh(Point3f::new(0.0, -1.0, -3.0), Point3f::new(2.0, 1.0, -1.0));
        let (moments, magnitudes) = flip_moments(&mesh);
        assert!(moments[0] > 0.0);
        assert!(moments[1].abs() < 1e-9 * magnitudes[1].max(1.0));
        assert!(moments[2] < 0.0);
    }
}
