use crate::bounds::GridBounds;
use crate::error::FieldError;
use crate::field::{FieldExtractor, FieldQuery, ScalarField};
use crate::marching_cubes::marching_cubes;
use crate::mesh::TriangleMesh;

/// Extract the iso-surface of a sampled field and map it to world coordinates.
///
/// The vertices are mapped with `min + v / (R - 1) * (max - min)` using the field bounds.
pub fn mesh_from_field(field: &ScalarField, threshold: f32) -> TriangleMesh {
    let mut mesh = marching_cubes(field, threshold);
    let bounds = field.bounds();
    let resolution = field.resolution();
    mesh.map_vertices(|v| {
        [
            bounds.coordinate(0, v[0], resolution),
            bounds.coordinate(1, v[1], resolution),
            bounds.coordinate(2, v[2], resolution),
        ]
    });
    mesh
}

impl FieldExtractor {
    /// Sample `query` and extract the `threshold` iso-surface in world coordinates.
    ///
    /// See [`extract_geometry`].
    pub fn extract_geometry<Q: FieldQuery + ?Sized>(
        &self,
        bounds: &GridBounds,
        resolution: usize,
        threshold: f32,
        query: &Q,
        use_sdf: bool,
    ) -> Result<TriangleMesh, FieldError> {
        let mut field = self.extract(bounds, resolution, query)?;

        let non_finite = field.as_slice().iter().filter(|v| !v.is_finite()).count();
        if non_finite > 0 {
            log::warn!("field has {non_finite} non-finite samples, their edges use midpoints");
        }
        if use_sdf {
            field.negate();
        }

        let mesh = mesh_from_field(&field, threshold);
        log::debug!(
            "extracted {} vertices and {} triangles at threshold {threshold}",
            mesh.len(),
            mesh.num_triangles()
        );

        Ok(mesh)
    }
}

/// Extract a triangle mesh of the `threshold` iso-surface of a field.
///
/// # Arguments
///
/// * `bounds` - The sampled region.
/// * `resolution` - Samples per axis, at least 2.
/// * `threshold` - The iso value.
/// * `query` - The field to sample.
/// * `use_sdf` - Negate the sampled values before extraction, for signed distance fields
///   that are positive outside the surface.
///
/// # Returns
///
/// The mesh in world coordinates. A field that never crosses `threshold` gives an empty mesh.
///
/// Example:
///
/// ```
/// use nerfkit_field::{extract_geometry, GridBounds, PointwiseField};
///
/// let sdf = PointwiseField(|p: &[f64; 3]| {
///     ((p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt() - 0.5) as f32
/// });
/// let bounds = GridBounds::cube(1.0).unwrap();
/// let mesh = extract_geometry(&bounds, 16, 0.0, &sdf, true).unwrap();
/// assert!(mesh.is_closed());
/// ```
pub fn extract_geometry<Q: FieldQuery + ?Sized>(
    bounds: &GridBounds,
    resolution: usize,
    threshold: f32,
    query: &Q,
    use_sdf: bool,
) -> Result<TriangleMesh, FieldError> {
    FieldExtractor::default().extract_geometry(bounds, resolution, threshold, query, use_sdf)
}
