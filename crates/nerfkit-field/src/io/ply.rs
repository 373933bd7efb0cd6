use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use super::MeshIoError;
use crate::mesh::TriangleMesh;

/// Write a mesh as a binary little endian PLY file.
///
/// Vertices are stored as `float x, y, z` and faces as a `uchar` count followed by `int`
/// vertex indices.
pub fn write_ply_binary(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<(), MeshIoError> {
    if mesh.len() > i32::MAX as usize {
        return Err(MeshIoError::UnsupportedFormat(format!(
            "PLY int indices cannot address {} vertices",
            mesh.len()
        )));
    }

    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);

    write!(
        writer,
        "ply\n\
         format binary_little_endian 1.0\n\
         element vertex {}\n\
         property float x\n\
         property float y\n\
         property float z\n\
         element face {}\n\
         property list uchar int vertex_indices\n\
         end_header\n",
        mesh.len(),
        mesh.num_triangles()
    )?;

    for v in &mesh.vertices {
        for c in v {
            writer.write_all(&(*c as f32).to_le_bytes())?;
        }
    }
    for t in &mesh.triangles {
        writer.write_all(&[3u8])?;
        for &index in t {
            writer.write_all(&(index as i32).to_le_bytes())?;
        }
    }

    writer.flush()?;
    Ok(())
}
