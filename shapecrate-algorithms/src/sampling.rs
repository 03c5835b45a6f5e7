//! Uniform random sampling of mesh surfaces

use rand::distributions::{Distribution, WeightedIndex};
use rand::Rng;
use shapecrate_core::{Point3d, TriangleMesh};

/// Draws points uniformly distributed over the surface area of a mesh
#[derive(Debug, Clone)]
pub struct SurfaceSampler {
    triangles: Vec<[Point3d; 3]>,
    selector: WeightedIndex<f64>,
}

impl SurfaceSampler {
    /// Returns `None` when the mesh has no triangle of positive area
    pub fn new(mesh: &TriangleMesh) -> Option<Self> {
        if mesh.faces.is_empty() || !mesh.has_valid_indices() {
            return None;
        }
        let selector = WeightedIndex::new(mesh.face_areas()).ok()?;
        let triangles = mesh.faces.iter().map(|f| mesh.face_points(f)).collect();
        Some(Self { triangles, selector })
    }

    /// One point: a triangle picked with probability proportional to its
    /// area, then a uniform point inside it
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Point3d {
        let [a, b, c] = &self.triangles[self.selector.sample(rng)];
        let r1: f64 = rng.gen::<f64>().sqrt();
        let r2: f64 = rng.gen();
        Point3d::from(a.coords * (1.0 - r1) + b.coords * (r1 * (1.0 - r2)) + c.coords * (r1 * r2))
    }

    /// `N` independent points
    pub fn sample_n<const N: usize, R: Rng + ?Sized>(&self, rng: &mut R) -> [Point3d; N] {
        std::array::from_fn(|_| self.sample(rng))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shapecrate_core::{box_mesh, Point3f};

    #[test]
    fn test_samples_lie_on_surface() {
        let mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(2.0, 1.0, 1.0));
        let sampler = SurfaceSampler::new(&mesh).unwrap();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..500 {
            let p = sampler.sample(&mut rng);
            let on_face = p.x.abs() < 1e-9
                || (p.x - 2.0).abs() < 1e-9
                || p.y.abs() < 1e-9
                || (p.y - 1.0).abs() < 1e-9
                || p.z.abs() < 1e-9
                || (p.z - 1.0).abs() < 1e-9;
            assert!(on_face, "{:?} is not on the box surface", p);
        }
    }

    #[test]
    fn test_sampling_is_area_weighted() {
        // The two x faces hold 1/5 of the area of a 2x1x1 box
        let mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(2.0, 1.0, 1.0));
        let sampler = SurfaceSampler::new(&mesh).unwrap();
        let mut rng = StdRng::seed_from_u64(11);

        let n = 20_000;
        let on_x_faces = (0..n)
            .map(|_| sampler.sample(&mut rng))
            .filter(|p| p.x.abs() < 1e-9 || (p.x - 2.0).abs() < 1e-9)
            .count();
        let fraction = on_x_faces as f64 / n as f64;
        assert!((fraction - 0.2).abs() < 0.02, "fraction {}", fraction);
    }

    #[test]
    fn test_seeded_sampling_is_reproducible() {
        let mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        let sampler = SurfaceSampler::new(&mesh).unwrap();
        let a: [Point3d; 4] = sampler.sample_n(&mut StdRng::seed_from_u64(3));
        let b: [Point3d; 4] = sampler.sample_n(&mut StdRng::seed_from_u64(3));
        assert_eq!(a, b);
    }

    #[test]
    fn test_zero_area_mesh_has_no_sampler() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(2.0, 0.0, 0.0),
            ],
            vec![[0, 1, 2]],
        );
        assert!(SurfaceSampler::new(&mesh).is_none());
        assert!(SurfaceSampler::new(&TriangleMesh::new()).is_none());
    }
}
