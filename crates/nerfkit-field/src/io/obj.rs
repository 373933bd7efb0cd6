use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use super::MeshIoError;
use crate::mesh::TriangleMesh;

/// Write a mesh as a Wavefront OBJ text file.
///
/// One `v x y z` line per vertex followed by one `f i j k` line per triangle, with 1-based
/// indices.
pub fn write_obj(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<(), MeshIoError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    for v in &mesh.vertices {
        writeln!(writer, "v {} {} {}", v[0], v[1], v[2])?;
    }
    for t in &mesh.triangles {
        writeln!(writer, "f {} {} {}", t[0] + 1, t[1] + 1, t[2] + 1)?;
    }

    writer.flush()?;
    Ok(())
}

/// Read the vertices and triangular faces of a Wavefront OBJ file.
///
/// Face entries of the form `i/t/n` keep the vertex index only. Other statements are
/// ignored.
pub fn read_obj(path: impl AsRef<Path>) -> Result<TriangleMesh, MeshIoError> {
    let reader = BufReader::new(File::open(path)?);
    let mut mesh = TriangleMesh::new();
    let mut face_lines = Vec::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line_number = i + 1;
        let mut parts = line.split_whitespace();

        match parts.next() {
            Some("v") => {
                let mut v = [0f64; 3];
                for value in v.iter_mut() {
                    *value = parts
                        .next()
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| parse_error(line_number, "expected 3 coordinates"))?;
                }
                mesh.vertices.push(v);
            }
            Some("f") => {
                let mut t = [0usize; 3];
                for index in t.iter_mut() {
                    let token = parts
                        .next()
                        .ok_or_else(|| parse_error(line_number, "expected a triangle"))?;
                    *index = parse_face_index(token, line_number)?;
                }
                if parts.next().is_some() {
                    return Err(parse_error(line_number, "only triangles are supported"));
                }
                mesh.triangles.push(t);
                face_lines.push(line_number);
            }
            _ => {}
        }
    }

    // faces may reference vertices declared later in the file
    for (t, &line) in mesh.triangles.iter().zip(&face_lines) {
        if let Some(&index) = t.iter().find(|&&index| index >= mesh.len()) {
            return Err(parse_error(
                line,
                &format!("face index {} exceeds {} vertices", index + 1, mesh.len()),
            ));
        }
    }

    Ok(mesh)
}

fn parse_face_index(token: &str, line: usize) -> Result<usize, MeshIoError> {
    let index = token
        .split('/')
        .next()
        .and_then(|s| s.parse::<usize>().ok())
        .ok_or_else(|| parse_error(line, &format!("invalid face index {token}")))?;
    index
        .checked_sub(1)
        .ok_or_else(|| parse_error(line, "face indices are 1-based"))
}

fn parse_error(line: usize, message: &str) -> MeshIoError {
    MeshIoError::Parse {
        line,
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_write_obj_lines() -> Result<(), MeshIoError> {
        let file = NamedTempFile::new()?;
        let mesh = TriangleMesh::from_parts(
            vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.5, 0.0]],
            vec![[0, 1, 2]],
        );
        write_obj(file.path(), &mesh)?;

        let text = std::fs::read_to_string(file.path())?;
        let lines = text.lines().collect::<Vec<_>>();
        assert_eq!(lines, vec!["v 0 0 0", "v 1 0 0", "v 0 1.5 0", "f 1 2 3"]);
        Ok(())
    }

    #[test]
    fn test_read_obj() -> Result<(), MeshIoError> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "# comment")?;
        writeln!(file, "o quad")?;
        writeln!(file, "v 0 0 0\nv 1 0 0\nv 1 1 0\nv 0 1 0")?;
        writeln!(file, "vn 0 0 1")?;
        writeln!(file, "f 1//1 2//1 3//1\nf 1 3 4")?;

        let mesh = read_obj(file.path())?;
        assert_eq!(mesh.len(), 4);
        assert_eq!(mesh.vertices[2], [1.0, 1.0, 0.0]);
        assert_eq!(mesh.triangles, vec![[0, 1, 2], [0, 2, 3]]);
        Ok(())
    }

    #[test]
    fn test_read_obj_errors() -> Result<(), MeshIoError> {
        let mut file = NamedTempFile::new()?;
        writeln!(file, "v 0 0")?;
        assert!(matches!(
            read_obj(file.path()),
            Err(MeshIoError::Parse { line: 1, .. })
        ));

        let mut file = NamedTempFile::new()?;
        writeln!(file, "v 0 0 0\nf 1 1 0")?;
        assert!(matches!(
            read_obj(file.path()),
            Err(MeshIoError::Parse { line: 2, .. })
        ));

        let mut file = NamedTempFile::new()?;
        writeln!(file, "v 0 0 0\nf 1 2 3 4")?;
        assert!(read_obj(file.path()).is_err());

        let mut file = NamedTempFile::new()?;
        writeln!(file, "v 0 0 0\nf 1 2 3")?;
        assert!(matches!(
            read_obj(file.path()),
            Err(MeshIoError::Parse { line: 2, .. })
        ));
        Ok(())
    }
}
