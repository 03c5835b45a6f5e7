//! Raw feature extraction with a per-shape memo cache

use crate::hull::{convex_hull, diameter};
use log::{debug, trace};
use shapecrate_core::{CanonicalGeometry, Point3f, RawFeatures, ShapeId, TriangleMesh, MISSING};
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Individually cached raw features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum FeatureName {
    VertexCount,
    FaceCount,
    SurfaceArea,
    Watertight,
    Volume,
    BoundingBox,
    HullSurfaceArea,
    HullVolume,
    Diameter,
}

impl FeatureName {
    pub const ALL: [FeatureName; 9] = [
        FeatureName::VertexCount,
        FeatureName::FaceCount,
        FeatureName::SurfaceArea,
        FeatureName::Watertight,
        FeatureName::Volume,
        FeatureName::BoundingBox,
        FeatureName::HullSurfaceArea,
        FeatureName::HullVolume,
        FeatureName::Diameter,
    ];
}

/// A cached feature value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FeatureValue {
    Count(usize),
    Scalar(f64),
    Flag(bool),
    Bounds([f64; 3], [f64; 3]),
}

impl FeatureValue {
    fn count(self) -> usize {
        match self {
            FeatureValue::Count(n) => n,
            _ => 0,
        }
    }

    fn scalar(self) -> f64 {
        match self {
            FeatureValue::Scalar(v) => v,
            _ => MISSING,
        }
    }

    fn flag(self) -> bool {
        matches!(self, FeatureValue::Flag(true))
    }

    fn bounds(self) -> ([f64; 3], [f64; 3]) {
        match self {
            FeatureValue::Bounds(min, max) => (min, max),
            _ => ([MISSING; 3], [MISSING; 3]),
        }
    }
}

/// Hash of the vertex coordinates and faces of `mesh`.
///
/// Two meshes with the same fingerprint are treated as the same geometry by
/// [`FeatureCache::track`].
pub fn geometry_fingerprint(mesh: &TriangleMesh) -> u64 {
    let mut hasher = DefaultHasher::new();
    mesh.vertex_count().hash(&mut hasher);
    for v in &mesh.vertices {
        v.x.to_bits().hash(&mut hasher);
        v.y.to_bits().hash(&mut hasher);
        v.z.to_bits().hash(&mut hasher);
    }
    mesh.faces.hash(&mut hasher);
    hasher.finish()
}

#[derive(Debug, Default)]
struct CacheState {
    values: HashMap<(ShapeId, FeatureName), FeatureValue>,
    fingerprints: HashMap<ShapeId, u64>,
}

/// Memo of computed features keyed by (shape, feature).
///
/// Values are computed outside the lock, so two threads racing on the same
/// key may both compute it; the first insert wins and both see the same
/// value afterwards. Entries of a shape live until its geometry changes
/// (see [`FeatureCache::track`]) or they are invalidated.
#[derive(Debug, Default)]
pub struct FeatureCache {
    state: Mutex<CacheState>,
    hits: AtomicUsize,
    misses: AtomicUsize,
}

impl FeatureCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        // A panic in another thread cannot leave a half-written entry behind
        self.state
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    pub fn get(&self, id: &ShapeId, name: FeatureName) -> Option<FeatureValue> {
        self.lock().values.get(&(id.clone(), name)).copied()
    }

    /// Cached value, or the result of `compute` which is then cached
    pub fn get_or_compute<F>(&self, id: &ShapeId, name: FeatureName, compute: F) -> FeatureValue
    where
        F: FnOnce() -> FeatureValue,
    {
        if let Some(value) = self.get(id, name) {
            self.hits.fetch_add(1, Ordering::Relaxed);
            return value;
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        let value = compute();
        *self.lock().values.entry((id.clone(), name)).or_insert(value)
    }

    /// Record the geometry fingerprint of `id`, dropping its cached features
    /// when it differs from the one seen before. Returns whether they were dropped.
    pub fn track(&self, id: &ShapeId, fingerprint: u64) -> bool {
        let mut state = self.lock();
        match state.fingerprints.insert(id.clone(), fingerprint) {
            Some(previous) if previous != fingerprint => {
                state.values.retain(|(cached, _), _| cached != id);
                true
            }
            _ => false,
        }
    }

    /// Drop one feature of a shape, or all of them when `name` is `None`
    pub fn invalidate(&self, id: &ShapeId, name: Option<FeatureName>) {
        let mut state = self.lock();
        match name {
            Some(name) => {
                state.values.remove(&(id.clone(), name));
            }
            None => {
                state.values.retain(|(cached, _), _| cached != id);
                state.fingerprints.remove(id);
            }
        }
    }

    pub fn clear(&self) {
        let mut state = self.lock();
        state.values.clear();
        state.fingerprints.clear();
    }

    /// Number of cached (shape, feature) values
    pub fn len(&self) -> usize {
        self.lock().values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> usize {
        self.misses.load(Ordering::Relaxed)
    }
}

/// Computes [`RawFeatures`] of canonical geometry
#[derive(Debug, Default)]
pub struct FeatureExtractor {
    cache: FeatureCache,
}

impl FeatureExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cache(&self) -> &FeatureCache {
        &self.cache
    }

    /// Extract every raw feature of `geometry`, reusing cached values for `id`
    /// as long as its geometry is unchanged.
    ///
    /// Features that cannot be computed (volume of an open mesh, anything
    /// derived from a hull that failed) are left missing.
    pub fn extract(&self, id: &ShapeId, geometry: &CanonicalGeometry) -> RawFeatures {
        let mesh = geometry.mesh();
        if self.cache.track(id, geometry_fingerprint(mesh)) {
            debug!("{}: geometry changed, cached features dropped", id);
        }
        let hull = || geometry.convex_hull_with(convex_hull);
        let feature = |name, compute: &dyn Fn() -> FeatureValue| {
            self.cache.get_or_compute(id, name, compute)
        };

        let is_watertight = feature(FeatureName::Watertight, &|| {
            FeatureValue::Flag(mesh.is_watertight())
        })
        .flag();
        let (bbox_min, bbox_max) = feature(FeatureName::BoundingBox, &|| {
            let (min, max) = geometry.bounding_box();
            FeatureValue::Bounds(
                [min.x as f64, min.y as f64, min.z as f64],
                [max.x as f64, max.y as f64, max.z as f64],
            )
        })
        .bounds();

        let features = RawFeatures {
            vertex_count: feature(FeatureName::VertexCount, &|| {
                FeatureValue::Count(mesh.vertex_count())
            })
            .count(),
            face_count: feature(FeatureName::FaceCount, &|| {
                FeatureValue::Count(mesh.face_count())
            })
            .count(),
            surface_area: feature(FeatureName::SurfaceArea, &|| {
                FeatureValue::Scalar(mesh.surface_area())
            })
            .scalar(),
            volume: feature(FeatureName::Volume, &|| {
                FeatureValue::Scalar(mesh.volume().unwrap_or(MISSING))
            })
            .scalar(),
            hull_surface_area: feature(FeatureName::HullSurfaceArea, &|| {
                FeatureValue::Scalar(hull().map_or(MISSING, TriangleMesh::surface_area))
            })
            .scalar(),
            hull_volume: feature(FeatureName::HullVolume, &|| {
                FeatureValue::Scalar(hull().map_or(MISSING, |h| h.signed_volume().abs()))
            })
            .scalar(),
            bbox_min,
            bbox_max,
            is_watertight,
            diameter: feature(FeatureName::Diameter, &|| {
                let points: &[Point3f] = match hull() {
                    Some(h) => &h.vertices,
                    None => geometry.point_cloud().as_slice(),
                };
                FeatureValue::Scalar(diameter(points).unwrap_or(MISSING))
            })
            .scalar(),
        };

        if !is_watertight {
            trace!("{}: mesh is not watertight, volume left missing", id);
        }
        debug!(
            "extracted features of {} ({} hits, {} misses so far)",
            id,
            self.cache.hits(),
            self.cache.misses()
        );
        features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use shapecrate_core::{box_mesh, is_present};

    fn unit_cube() -> CanonicalGeometry {
        CanonicalGeometry::new(box_mesh(
            Point3f::new(-0.5, -0.5, -0.5),
            Point3f::new(0.5, 0.5, 0.5),
        ))
    }

    #[test]
    fn test_extract_unit_cube() {
        let extractor = FeatureExtractor::new();
        let features = extractor.extract(&ShapeId::from("cube.off"), &unit_cube());

        assert_eq!(features.vertex_count, 8);
        assert_eq!(features.face_count, 12);
        assert!(features.is_watertight);
        assert_relative_eq!(features.surface_area, 6.0, epsilon = 1e-6);
        assert_relative_eq!(features.volume, 1.0, epsilon = 1e-6);
        assert_relative_eq!(features.hull_volume, 1.0, epsilon = 1e-4);
        assert_relative_eq!(features.hull_surface_area, 6.0, epsilon = 1e-4);
        assert_relative_eq!(features.bbox_volume(), 1.0, epsilon = 1e-6);
        assert_relative_eq!(features.diameter, 3.0_f64.sqrt(), epsilon = 1e-5);
    }

    #[test]
    fn test_open_mesh_volume_is_missing() {
        let mut mesh = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        mesh.faces.pop();
        let features =
            FeatureExtractor::new().extract(&ShapeId::from("open.off"), &CanonicalGeometry::new(mesh));

        assert!(!features.is_watertight);
        assert!(!is_present(features.volume));
        assert!(is_present(features.surface_area));
        assert!(is_present(features.hull_volume));
    }

    #[test]
    fn test_flat_mesh_hull_features_missing() {
        let mesh = TriangleMesh::from_vertices_and_faces(
            vec![
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(1.0, 0.0, 0.0),
                Point3f::new(0.0, 1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
            ],
            vec![[0, 1, 2], [1, 3, 2]],
        );
        let features =
            FeatureExtractor::new().extract(&ShapeId::from("flat.off"), &CanonicalGeometry::new(mesh));

        assert!(!is_present(features.hull_volume));
        assert!(!is_present(features.hull_surface_area));
        assert_relative_eq!(features.diameter, 2.0_f64.sqrt(), epsilon = 1e-6);
    }

    #[test]
    fn test_extraction_is_memoized() {
        let extractor = FeatureExtractor::new();
        let id = ShapeId::from("cube.off");
        let geometry = unit_cube();

        let first = extractor.extract(&id, &geometry);
        let misses = extractor.cache().misses();
        assert_eq!(misses, FeatureName::ALL.len());

        let second = extractor.extract(&id, &geometry);
        assert_eq!(extractor.cache().misses(), misses);
        assert_eq!(extractor.cache().hits(), FeatureName::ALL.len());
        assert_eq!(first, second);
    }

    #[test]
    fn test_invalidate_single_feature() {
        let extractor = FeatureExtractor::new();
        let id = ShapeId::from("cube.off");
        extractor.extract(&id, &unit_cube());

        extractor.cache().invalidate(&id, Some(FeatureName::Diameter));
        assert!(extractor.cache().get(&id, FeatureName::Diameter).is_none());
        assert!(extractor.cache().get(&id, FeatureName::Volume).is_some());

        extractor.extract(&id, &unit_cube());
        assert_eq!(extractor.cache().misses(), FeatureName::ALL.len() + 1);
    }

    #[test]
    fn test_changed_geometry_drops_cached_features() {
        let extractor = FeatureExtractor::new();
        let id = ShapeId::from("box.off");
        let first = extractor.extract(&id, &unit_cube());
        let wide = CanonicalGeometry::new(box_mesh(
            Point3f::new(-0.5, -0.25, -0.1),
            Point3f::new(0.5, 0.25, 0.1),
        ));

        let second = extractor.extract(&id, &wide);
        assert_eq!(extractor.cache().hits(), 0);
        assert_eq!(extractor.cache().misses(), 2 * FeatureName::ALL.len());
        assert_relative_eq!(first.surface_area, 6.0, epsilon = 1e-6);
        assert_relative_eq!(second.surface_area, 2.0 * (0.5 + 0.2 + 0.1), epsilon = 1e-6);
        assert_eq!(extractor.cache().len(), FeatureName::ALL.len());
    }

    #[test]
    fn test_fingerprint_tracks_geometry() {
        let a = box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 1.0, 1.0));
        let mut b = a.clone();
        assert_eq!(geometry_fingerprint(&a), geometry_fingerprint(&b));
        b.vertices[3].z += 0.001;
        assert_ne!(geometry_fingerprint(&a), geometry_fingerprint(&b));
    }

    #[test]
    fn test_invalidate_whole_shape() {
        let cache = FeatureCache::new();
        let a = ShapeId::from("a.off");
        let b = ShapeId::from("b.off");
        cache.get_or_compute(&a, FeatureName::SurfaceArea, || FeatureValue::Scalar(1.0));
        cache.get_or_compute(&b, FeatureName::SurfaceArea, || FeatureValue::Scalar(2.0));

        cache.invalidate(&a, None);
        assert_eq!(cache.len(), 1);
        assert_eq!(
            cache.get(&b, FeatureName::SurfaceArea),
            Some(FeatureValue::Scalar(2.0))
        );
    }
}
