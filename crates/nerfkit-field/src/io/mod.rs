use std::path::Path;

use crate::mesh::TriangleMesh;

/// Wavefront OBJ reader and writer.
pub mod obj;

/// PLY writer.
pub mod ply;

pub use obj::{read_obj, write_obj};
pub use ply::write_ply_binary;

/// Error types for the mesh io module.
#[derive(Debug, thiserror::Error)]
pub enum MeshIoError {
    /// Failed to read or write the file
    #[error("Failed to access mesh file")]
    Io(#[from] std::io::Error),

    /// The file extension has no matching writer
    #[error("Unsupported mesh format. Got: {0}")]
    UnsupportedFormat(String),

    /// A line of the file could not be parsed
    #[error("Failed to parse line {line}: {message}")]
    Parse {
        /// The 1-based line number.
        line: usize,
        /// What went wrong.
        message: String,
    },
}

/// Write a mesh, picking the format from the file extension (`obj` or `ply`).
pub fn write_mesh(path: impl AsRef<Path>, mesh: &TriangleMesh) -> Result<(), MeshIoError> {
    let path = path.as_ref();
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "obj" => write_obj(path, mesh),
        "ply" => write_ply_binary(path, mesh),
        _ => Err(MeshIoError::UnsupportedFormat(path.display().to_string())),
    }
}
