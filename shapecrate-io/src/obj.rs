//! OBJ format support

use crate::{triangulate_fan, MeshReader, MeshWriter};
use obj::ObjData;
use shapecrate_core::{Error, Point3f, Result, TriangleMesh};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

pub struct ObjReader;
pub struct ObjWriter;

impl ObjReader {
    /// Build a mesh from parsed OBJ data; polygons are fan-triangulated and
    /// texture/normal indices are ignored
    pub fn obj_data_to_mesh(data: &ObjData) -> Result<TriangleMesh> {
        let vertices: Vec<Point3f> = data
            .position
            .iter()
            .map(|&[x, y, z]| Point3f::new(x, y, z))
            .collect();

        let mut faces = Vec::new();
        for object in &data.objects {
            for group in &object.groups {
                for poly in &group.polys {
                    let corners: Vec<usize> = poly.0.iter().map(|tuple| tuple.0).collect();
                    if let Some(&bad) = corners.iter().find(|&&i| i >= vertices.len()) {
                        return Err(Error::InvalidData(format!(
                            "face references vertex {} of {}",
                            bad,
                            vertices.len()
                        )));
                    }
                    triangulate_fan(&corners, &mut faces);
                }
            }
        }

        Ok(TriangleMesh::from_vertices_and_faces(vertices, faces))
    }
}

impl MeshReader for ObjReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let file = File::open(path)?;
        let data = ObjData::load_buf(BufReader::new(file))
            .map_err(|e| Error::InvalidData(format!("OBJ parse error: {}", e)))?;
        Self::obj_data_to_mesh(&data)
    }
}

impl MeshWriter for ObjWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);

        writeln!(writer, "# shapecrate")?;
        for v in &mesh.vertices {
            writeln!(writer, "v {} {} {}", v.x, v.y, v.z)?;
        }
        // OBJ indices are 1-based
        for f in &mesh.faces {
            writeln!(writer, "f {} {} {}", f[0] + 1, f[1] + 1, f[2] + 1)?;
        }
        writer.flush()?;
        Ok(())
    }
}
