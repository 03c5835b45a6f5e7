//! OFF (Object File Format) support
//!
//! ```text
//! OFF
//! <vertex count> <face count> <edge count>
//! x y z                       (one line per vertex)
//! n i0 i1 ... i(n-1) [color]  (one line per face)
//! ```
//!
//! `#` starts a comment. Counts may share the header line (`OFF 8 12 0`).

use crate::{triangulate_fan, MeshReader, MeshWriter};
use shapecrate_core::{Error, Point3f, Result, TriangleMesh};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

pub struct OffReader;
pub struct OffWriter;

fn parse<T: FromStr>(token: Option<&str>, what: &str, line: usize) -> Result<T> {
    token
        .and_then(|t| t.parse().ok())
        .ok_or_else(|| Error::InvalidData(format!("line {}: expected {}", line, what)))
}

impl OffReader {
    /// Parse an OFF document
    pub fn read_from<R: BufRead>(reader: R) -> Result<TriangleMesh> {
        // Non-empty lines with comments stripped, paired with 1-based line numbers
        let mut lines = Vec::new();
        for (i, line) in reader.lines().enumerate() {
            let line = line?;
            let content = line.split('#').next().unwrap_or("").trim().to_string();
            if !content.is_empty() {
                lines.push((i + 1, content));
            }
        }
        let mut lines = lines.into_iter();

        let (header_line, header) = lines
            .next()
            .ok_or_else(|| Error::InvalidData("empty OFF file".to_string()))?;
        let mut tokens = header.split_whitespace();
        let keyword = tokens.next().unwrap_or("");
        if !keyword.ends_with("OFF") {
            return Err(Error::InvalidData(format!(
                "line {}: expected OFF header, found {:?}",
                header_line, keyword
            )));
        }

        // Counts either follow the keyword or sit on the next line
        let counts: Vec<&str> = tokens.collect();
        let (vertex_count, face_count): (usize, usize) = if counts.is_empty() {
            let (number, line) = lines
                .next()
                .ok_or_else(|| Error::InvalidData("missing OFF counts".to_string()))?;
            let mut t = line.split_whitespace();
            (
                parse(t.next(), "vertex count", number)?,
                parse(t.next(), "face count", number)?,
            )
        } else {
            (
                parse(counts.first().copied(), "vertex count", header_line)?,
                parse(counts.get(1).copied(), "face count", header_line)?,
            )
        };

        let mut vertices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            let (number, line) = lines
                .next()
                .ok_or_else(|| Error::InvalidData("unexpected end of vertex list".to_string()))?;
            let mut t = line.split_whitespace();
            vertices.push(Point3f::new(
                parse(t.next(), "x", number)?,
                parse(t.next(), "y", number)?,
                parse(t.next(), "z", number)?,
            ));
        }

        let mut faces = Vec::with_capacity(face_count);
        for _ in 0..face_count {
            let (number, line) = lines
                .next()
                .ok_or_else(|| Error::InvalidData("unexpected end of face list".to_string()))?;
            let mut t = line.split_whitespace();
            let corners: usize = parse(t.next(), "corner count", number)?;
            let mut indices = Vec::with_capacity(corners);
            for _ in 0..corners {
                let index: usize = parse(t.next(), "vertex index", number)?;
                if index >= vertex_count {
                    return Err(Error::InvalidData(format!(
                        "line {}: vertex index {} out of range",
                        number, index
                    )));
                }
                indices.push(index);
            }
            triangulate_fan(&indices, &mut faces);
        }

        Ok(TriangleMesh::from_vertices_and_faces(vertices, faces))
    }

    /// Write `mesh` as an OFF document
    pub fn write_to<W: Write>(mesh: &TriangleMesh, writer: &mut W) -> Result<()> {
        writeln!(writer, "OFF")?;
        writeln!(writer, "{} {} 0", mesh.vertex_count(), mesh.face_count())?;
        for v in &mesh.vertices {
            writeln!(writer, "{} {} {}", v.x, v.y, v.z)?;
        }
        for f in &mesh.faces {
            writeln!(writer, "3 {} {} {}", f[0], f[1], f[2])?;
        }
        Ok(())
    }
}

impl MeshReader for OffReader {
    fn read_mesh<P: AsRef<Path>>(path: P) -> Result<TriangleMesh> {
        let file = File::open(path)?;
        Self::read_from(BufReader::new(file))
    }
}

impl MeshWriter for OffWriter {
    fn write_mesh<P: AsRef<Path>>(mesh: &TriangleMesh, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        OffReader::write_to(mesh, &mut writer)?;
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_with_comments_and_polygons() {
        let text = "OFF\n# a square pyramid\n5 2 0\n0 0 0\n1 0 0\n1 1 0\n0 1 0\n0.5 0.5 1 # apex\n4 0 1 2 3\n3 0 1 4 255 0 0\n";
        let mesh = OffReader::read_from(Cursor::new(text)).unwrap();
        assert_eq!(mesh.vertex_count(), 5);
        assert_eq!(mesh.faces, vec![[0, 1, 2], [0, 2, 3], [0, 1, 4]]);
        assert_eq!(mesh.vertices[4], Point3f::new(0.5, 0.5, 1.0));
    }

    #[test]
    fn test_counts_on_header_line() {
        let text = "OFF 3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 2\n";
        let mesh = OffReader::read_from(Cursor::new(text)).unwrap();
        assert_eq!(mesh.face_count(), 1);
    }

    #[test]
    fn test_malformed_input() {
        assert!(OffReader::read_from(Cursor::new("")).is_err());
        assert!(OffReader::read_from(Cursor::new("PLY\n1 0 0\n")).is_err());
        assert!(OffReader::read_from(Cursor::new("OFF\n2 0 0\n0 0 0\n")).is_err());
        assert!(OffReader::read_from(Cursor::new("OFF\n3 1 0\n0 0 0\n1 0 0\n0 1 0\n3 0 1 7\n")).is_err());
    }

    #[test]
    fn test_write_then_read() {
        let mesh = shapecrate_core::box_mesh(Point3f::new(0.0, 0.0, 0.0), Point3f::new(1.0, 2.0, 3.0));
        let mut buffer = Vec::new();
        OffReader::write_to(&mesh, &mut buffer).unwrap();
        let back = OffReader::read_from(Cursor::new(buffer)).unwrap();
        assert_eq!(back.faces, mesh.faces);
        assert_eq!(back.vertices, mesh.vertices);
    }
}
