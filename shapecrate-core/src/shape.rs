//! Shape identity, canonical geometry and the per-shape record

use crate::mesh::TriangleMesh;
use crate::point::Point3f;
use crate::point_cloud::PointCloud;
use crate::signature::*;
use crate::traits::Drawable;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::path::{Component, Path};
use std::sync::OnceLock;

/// Portable shape identifier: a path split into OS-independent segments.
///
/// Identifiers display, order and serialize as their `/`-joined form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub struct ShapeId {
    segments: Vec<String>,
}

impl ShapeId {
    /// Build an identifier from explicit segments
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            segments: segments
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
        }
    }

    /// Build an identifier from a file path, relative to `root` when it is a prefix
    pub fn from_path(path: &Path, root: Option<&Path>) -> Self {
        let relative = root
            .and_then(|root| path.strip_prefix(root).ok())
            .unwrap_or(path);
        Self::new(relative.components().filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
            _ => None,
        }))
    }

    /// Path segments in order
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The `/`-joined key
    pub fn key(&self) -> String {
        self.segments.join("/")
    }
}

impl fmt::Display for ShapeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

impl From<String> for ShapeId {
    fn from(key: String) -> Self {
        Self::new(key.split('/'))
    }
}

impl From<&str> for ShapeId {
    fn from(key: &str) -> Self {
        Self::new(key.split('/'))
    }
}

impl From<ShapeId> for String {
    fn from(id: ShapeId) -> Self {
        id.key()
    }
}

impl Ord for ShapeId {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key().cmp(&other.key())
    }
}

impl PartialOrd for ShapeId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Mesh in canonical pose plus geometry derived from it on demand.
///
/// Derived data lives in lazily-filled cells; a transformed mesh is always
/// wrapped in a fresh `CanonicalGeometry`, so nothing stale survives a
/// transform.
#[derive(Debug, Clone)]
pub struct CanonicalGeometry {
    mesh: TriangleMesh,
    point_cloud: PointCloud<Point3f>,
    bounding_box: (Point3f, Point3f),
    convex_hull: OnceLock<Option<TriangleMesh>>,
}

impl CanonicalGeometry {
    pub fn new(mesh: TriangleMesh) -> Self {
        let point_cloud = PointCloud::from_points(mesh.vertices.clone());
        let bounding_box = point_cloud.bounding_box();
        Self {
            mesh,
            point_cloud,
            bounding_box,
            convex_hull: OnceLock::new(),
        }
    }

    pub fn mesh(&self) -> &TriangleMesh {
        &self.mesh
    }

    /// Vertex cloud of the canonical mesh; bounds and the diameter fallback
    /// are taken over it
    pub fn point_cloud(&self) -> &PointCloud<Point3f> {
        &self.point_cloud
    }

    pub fn bounding_box(&self) -> (Point3f, Point3f) {
        self.bounding_box
    }

    /// Convex hull, computed by `build` on first access.
    ///
    /// `None` means the hull could not be built (e.g. coplanar input);
    /// that outcome is cached too.
    pub fn convex_hull_with<F>(&self, build: F) -> Option<&TriangleMesh>
    where
        F: FnOnce(&TriangleMesh) -> Option<TriangleMesh>,
    {
        self.convex_hull.get_or_init(|| build(&self.mesh)).as_ref()
    }

    /// Hull if it has already been computed
    pub fn cached_convex_hull(&self) -> Option<&TriangleMesh> {
        self.convex_hull.get().and_then(Option::as_ref)
    }
}

/// Everything known about one shape.
///
/// A shape starts with an identifier and label; each pipeline stage fills
/// in the fields it produces.
#[derive(Debug, Clone)]
pub struct Shape {
    pub id: ShapeId,
    /// Class label, empty when unknown
    pub label: String,
    pub geometry: Option<CanonicalGeometry>,
    pub diagnostics: Option<NormalizationDiagnostics>,
    pub features: Option<RawFeatures>,
    /// Descriptors before corpus normalization
    pub raw_descriptors: Option<DescriptorVector>,
    /// Corpus-normalized descriptors used for ranking
    pub descriptors: Option<DescriptorVector>,
    pub histograms: Option<PropertyHistogramSet>,
}

impl Shape {
    pub fn new(id: ShapeId, label: impl Into<String>) -> Self {
        Self {
            id,
            label: label.into(),
            geometry: None,
            diagnostics: None,
            features: None,
            raw_descriptors: None,
            descriptors: None,
            histograms: None,
        }
    }

    /// Whether the label is known
    pub fn has_label(&self) -> bool {
        !self.label.is_empty()
    }

    /// Whether the shape carries everything needed for ranking
    pub fn has_signature(&self) -> bool {
        self.descriptors.is_some() && self.histograms.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::box_mesh;
    use std::path::PathBuf;

    #[test]
    fn test_shape_id_from_path_strips_root() {
        let root = PathBuf::from("/data/corpus");
        let path = root.join("chairs").join("m101.off");
        let id = ShapeId::from_path(&path, Some(&root));
        assert_eq!(id.segments(), &["chairs".to_string(), "m101.off".to_string()]);
        assert_eq!(id.to_string(), "chairs/m101.off");
    }

    #[test]
    fn test_shape_id_string_roundtrip() {
        let id = ShapeId::new(["a", "b", "c.obj"]);
        let key: String = id.clone().into();
        assert_eq!(ShapeId::from(key), id);
    }

    #[test]
    fn test_shape_id_orders_by_key() {
        let mut ids = vec![
            ShapeId::from("b/a"),
            ShapeId::from("a/z"),
            ShapeId::from("a-b/c"),
        ];
        ids.sort();
        let keys: Vec<String> = ids.iter().map(ShapeId::key).collect();
        assert_eq!(keys, vec!["a-b/c", "a/z", "b/a"]);
    }

    #[test]
    fn test_convex_hull_computed_once() {
        let geometry = CanonicalGeometry::new(box_mesh(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 1.0),
        ));
        assert!(geometry.cached_convex_hull().is_none());

        let mut calls = 0;
        let hull = geometry.convex_hull_with(|m| {
            calls += 1;
            Some(m.clone())
        });
        assert!(hull.is_some());
        let _ = geometry.convex_hull_with(|_| {
            calls += 1;
            None
        });
        assert_eq!(calls, 1);
        assert!(geometry.cached_convex_hull().is_some());
    }

    #[test]
    fn test_point_cloud_mirrors_vertices() {
        let mesh = box_mesh(Point3f::new(-1.0, 0.0, 2.0), Point3f::new(3.0, 1.0, 2.5));
        let geometry = CanonicalGeometry::new(mesh.clone());
        assert_eq!(geometry.point_cloud().len(), mesh.vertex_count());
        assert_eq!(
            geometry.bounding_box(),
            (Point3f::new(-1.0, 0.0, 2.0), Point3f::new(3.0, 1.0, 2.5))
        );
    }

    #[test]
    fn test_new_shape_has_no_signature() {
        let shape = Shape::new(ShapeId::from("x.off"), "");
        assert!(!shape.has_label());
        assert!(!shape.has_signature());
    }
}
