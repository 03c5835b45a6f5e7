//! Mesh file access and corpus persistence
//!
//! This crate loads and saves triangle meshes in OBJ, PLY and OFF, and
//! persists computed shape signatures as TOML tables.

pub mod obj;
pub mod off;
pub mod ply;
pub mod store;

pub use store::*;

use log::debug;
use shapecrate_core::{Error, Result, TriangleMesh};
use std::path::Path;

/// Extensions that name a mesh file
pub const MESH_EXTENSIONS: &[&str] = &["obj", "ply", "off", "stl", "gltf", "glb"];

/// Trait for reading meshes from files
pub trait MeshReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh>;
}

/// Trait for writing meshes to files
pub trait MeshWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()>;
}

/// Loads and saves meshes on behalf of the retrieval pipeline
pub trait GeometryAccessor: Send + Sync {
    /// Load the mesh stored at `path`.
    ///
    /// Every failure, including an unsupported format, is reported as
    /// `GeometryLoad` naming the path.
    fn load(&self, path: &Path) -> Result<TriangleMesh>;

    /// Save `mesh` to `path` in the format named by its extension
    fn save(&self, path: &Path, mesh: &TriangleMesh) -> Result<()>;
}

/// [`GeometryAccessor`] over the local filesystem, dispatching on extension
#[derive(Debug, Clone, Copy, Default)]
pub struct FileGeometryAccessor;

impl GeometryAccessor for FileGeometryAccessor {
    fn load(&self, path: &Path) -> Result<TriangleMesh> {
        let mesh = read_mesh(path).map_err(|err| match err {
            Error::GeometryLoad { .. } => err,
            other => Error::geometry_load(path, other),
        })?;
        debug!(
            "loaded {}: {} vertices, {} faces",
            path.display(),
            mesh.vertex_count(),
            mesh.face_count()
        );
        Ok(mesh)
    }

    fn save(&self, path: &Path, mesh: &TriangleMesh) -> Result<()> {
        write_mesh(mesh, path)
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|s| s.to_str())
        .map(str::to_ascii_lowercase)
}

/// Whether `path` has one of [`MESH_EXTENSIONS`]
pub fn is_mesh_file(path: &Path) -> bool {
    extension(path).is_some_and(|ext| MESH_EXTENSIONS.contains(&ext.as_str()))
}

/// Auto-detect format and read mesh
pub fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => obj::ObjReader::read_mesh(path),
        Some("ply") => ply::PlyReader::read_mesh(path),
        Some("off") => off::OffReader::read_mesh(path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Auto-detect format and write mesh
pub fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match extension(path).as_deref() {
        Some("obj") => obj::ObjWriter::write_mesh(mesh, path),
        Some("ply") => ply::PlyWriter::write_mesh(mesh, path),
        Some("off") => off::OffWriter::write_mesh(mesh, path),
        _ => Err(Error::UnsupportedFormat(format!(
            "Unsupported mesh format: {:?}",
            path.extension()
        ))),
    }
}

/// Split polygon corner indices into a triangle fan
pub(crate) fn triangulate_fan(corners: &[usize], faces: &mut Vec<[usize; 3]>) {
    for i in 1..corners.len().saturating_sub(1) {
        faces.push([corners[0], corners[i], corners[i + 1]]);
    }
}
