#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Axis-aligned grid bounds and the grid-to-world mapping.
pub mod bounds;

/// Error types for the field module.
pub mod error;

/// Dense scalar fields and chunked field evaluation.
pub mod field;

/// Iso-surface extraction in world coordinates.
pub mod geometry;

/// Mesh readers and writers.
pub mod io;

/// The marching cubes algorithm.
pub mod marching_cubes;

/// Triangle mesh type.
pub mod mesh;

/// Execution strategies for chunk evaluation.
pub mod parallel;

mod tables;

pub use bounds::GridBounds;
pub use error::FieldError;
pub use field::{extract_field, FieldExtractor, FieldQuery, PointwiseField, ScalarField};
pub use geometry::{extract_geometry, mesh_from_field};
pub use io::{write_mesh, MeshIoError};
pub use marching_cubes::marching_cubes;
pub use mesh::{AxisOrder, TriangleMesh};
pub use parallel::ExecutionStrategy;
