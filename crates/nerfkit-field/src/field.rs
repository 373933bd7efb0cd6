use std::convert::Infallible;

use crate::bounds::{check_resolution, GridBounds};
use crate::error::FieldError;
use crate::parallel::{try_map_ordered, ExecutionStrategy};

/// Default number of grid samples per axis in one query chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 64;

/// A capability returning one scalar per query point.
///
/// Implemented for closures `Fn(&[[f64; 3]]) -> Result<Vec<f32>, E>` and for
/// [`PointwiseField`].
pub trait FieldQuery: Sync {
    /// The error returned by a failed query.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Evaluate the field at `points`, returning exactly one value per point.
    fn query(&self, points: &[[f64; 3]]) -> Result<Vec<f32>, Self::Error>;
}

impl<F, E> FieldQuery for F
where
    F: Fn(&[[f64; 3]]) -> Result<Vec<f32>, E> + Sync,
    E: std::error::Error + Send + Sync + 'static,
{
    type Error = E;

    fn query(&self, points: &[[f64; 3]]) -> Result<Vec<f32>, E> {
        self(points)
    }
}

/// Adapts an infallible per-point function, such as an analytic SDF, to [`FieldQuery`].
///
/// Example:
///
/// ```
/// use nerfkit_field::{FieldQuery, PointwiseField};
///
/// let sphere = PointwiseField(|p: &[f64; 3]| {
///     0.5 - (p[0] * p[0] + p[1] * p[1] + p[2] * p[2]).sqrt() as f32
/// });
/// assert_eq!(sphere.query(&[[0.0, 0.0, 0.0]]).unwrap(), vec![0.5]);
/// ```
#[derive(Debug, Clone, Copy)]
pub struct PointwiseField<F>(pub F);

impl<F> FieldQuery for PointwiseField<F>
where
    F: Fn(&[f64; 3]) -> f32 + Sync,
{
    type Error = Infallible;

    fn query(&self, points: &[[f64; 3]]) -> Result<Vec<f32>, Infallible> {
        Ok(points.iter().map(&self.0).collect())
    }
}

/// A dense `R x R x R` grid of scalar samples indexed `[x, y, z]`, `z` varying fastest.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarField {
    resolution: usize,
    bounds: GridBounds,
    values: Vec<f32>,
}

impl ScalarField {
    /// Create a field from raw values.
    ///
    /// Fails if `resolution < 2` or `values.len() != resolution^3`.
    pub fn new(
        bounds: GridBounds,
        resolution: usize,
        values: Vec<f32>,
    ) -> Result<Self, FieldError> {
        check_resolution(resolution)?;
        let expected = resolution.pow(3);
        if values.len() != expected {
            return Err(FieldError::InvalidShape(values.len(), expected));
        }
        Ok(Self {
            resolution,
            bounds,
            values,
        })
    }

    /// Samples per axis.
    #[inline]
    pub fn resolution(&self) -> usize {
        self.resolution
    }

    /// The grid shape, `[R, R, R]`.
    #[inline]
    pub fn shape(&self) -> [usize; 3] {
        [self.resolution; 3]
    }

    /// The sampled region.
    #[inline]
    pub fn bounds(&self) -> &GridBounds {
        &self.bounds
    }

    /// The samples as a flat slice.
    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Consume the field and return the flat samples.
    pub fn into_vec(self) -> Vec<f32> {
        self.values
    }

    /// The sample at grid index `[x, y, z]`.
    ///
    /// PRECONDITION: every index is smaller than the resolution.
    #[inline]
    pub fn get(&self, x: usize, y: usize, z: usize) -> f32 {
        self.values[self.offset(x, y, z)]
    }

    #[inline]
    fn offset(&self, x: usize, y: usize, z: usize) -> usize {
        (x * self.resolution + y) * self.resolution + z
    }

    /// Flip the sign of every sample.
    pub fn negate(&mut self) {
        self.values.iter_mut().for_each(|v| *v = -*v);
    }

    /// Minimum and maximum sample.
    pub fn min_max(&self) -> (f32, f32) {
        self.values
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
                (lo.min(v), hi.max(v))
            })
    }
}

/// A block of the grid evaluated by one query call.
#[derive(Debug, Clone, Copy)]
struct Chunk {
    start: [usize; 3],
    len: [usize; 3],
}

impl Chunk {
    fn num_points(&self) -> usize {
        self.len.iter().product()
    }
}

/// Evaluates scalar fields chunk by chunk.
#[derive(Debug, Clone, Copy)]
pub struct FieldExtractor {
    chunk_size: usize,
    strategy: ExecutionStrategy,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            strategy: ExecutionStrategy::default(),
        }
    }
}

impl FieldExtractor {
    /// Create an extractor with the given chunk size per axis.
    pub fn new(chunk_size: usize) -> Result<Self, FieldError> {
        if chunk_size == 0 {
            return Err(FieldError::InvalidArgument(
                "chunk size must be > 0".to_string(),
            ));
        }
        Ok(Self {
            chunk_size,
            ..Default::default()
        })
    }

    /// Set the execution strategy used to evaluate chunks.
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Samples per axis in one chunk.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Sample `query` on a `resolution^3` grid spanning `bounds`.
    ///
    /// Every chunk is evaluated independently and scattered to its fixed position, so the
    /// result does not depend on the chunk size or the execution strategy. A failing chunk
    /// fails the whole extraction.
    pub fn extract<Q: FieldQuery + ?Sized>(
        &self,
        bounds: &GridBounds,
        resolution: usize,
        query: &Q,
    ) -> Result<ScalarField, FieldError> {
        check_resolution(resolution)?;

        let axis_coords = (0..3)
            .map(|axis| {
                (0..resolution)
                    .map(|i| bounds.coordinate(axis, i as f64, resolution))
                    .collect::<Vec<_>>()
            })
            .collect::<Vec<_>>();

        let chunks = self.partition(resolution);
        log::debug!(
            "extracting field at resolution {resolution} in {} chunks",
            chunks.len()
        );

        let evaluated = try_map_ordered(&chunks, self.strategy, |chunk| {
            let points = chunk_points(chunk, &axis_coords);
            let values = query
                .query(&points)
                .map_err(|e| FieldError::Query(Box::new(e)))?;
            if values.len() != points.len() {
                return Err(FieldError::InvalidShape(values.len(), points.len()));
            }
            Ok(values)
        })?;

        let mut field = vec![0f32; resolution.pow(3)];
        for (chunk, values) in chunks.iter().zip(evaluated) {
            let [nx, ny, nz] = chunk.len;
            for i in 0..nx {
                for j in 0..ny {
                    let src = (i * ny + j) * nz;
                    let dst = ((chunk.start[0] + i) * resolution + chunk.start[1] + j) * resolution
                        + chunk.start[2];
                    field[dst..dst + nz].copy_from_slice(&values[src..src + nz]);
                }
            }
        }

        ScalarField::new(*bounds, resolution, field)
    }

    fn partition(&self, resolution: usize) -> Vec<Chunk> {
        let spans = (0..resolution)
            .step_by(self.chunk_size)
            .map(|start| (start, self.chunk_size.min(resolution - start)))
            .collect::<Vec<_>>();

        let mut chunks = Vec::with_capacity(spans.len().pow(3));
        for &(x0, nx) in &spans {
            for &(y0, ny) in &spans {
                for &(z0, nz) in &spans {
                    chunks.push(Chunk {
                        start: [x0, y0, z0],
                        len: [nx, ny, nz],
                    });
                }
            }
        }
        chunks
    }
}

fn chunk_points(chunk: &Chunk, axis_coords: &[Vec<f64>]) -> Vec<[f64; 3]> {
    let mut points = Vec::with_capacity(chunk.num_points());
    let [x0, y0, z0] = chunk.start;
    let [nx, ny, nz] = chunk.len;
    for x in &axis_coords[0][x0..x0 + nx] {
        for y in &axis_coords[1][y0..y0 + ny] {
            for z in &axis_coords[2][z0..z0 + nz] {
                points.push([*x, *y, *z]);
            }
        }
    }
    points
}

/// Sample `query` on a `resolution^3` grid spanning `bounds` with the default extractor.
///
/// # Arguments
///
/// * `bounds` - The sampled region.
/// * `resolution` - Samples per axis, at least 2.
/// * `query` - The field to sample.
///
/// # Returns
///
/// The dense field, indexed `[x, y, z]`.
///
/// Example:
///
/// ```
/// use nerfkit_field::{extract_field, GridBounds, PointwiseField};
///
/// let bounds = GridBounds::cube(1.0).unwrap();
/// let field = extract_field(&bounds, 3, &PointwiseField(|p: &[f64; 3]| p[0] as f32)).unwrap();
/// assert_eq!(field.shape(), [3, 3, 3]);
/// assert_eq!(field.get(2, 0, 1), 1.0);
/// ```
pub fn extract_field<Q: FieldQuery + ?Sized>(
    bounds: &GridBounds,
    resolution: usize,
    query: &Q,
) -> Result<ScalarField, FieldError> {
    FieldExtractor::default().extract(bounds, resolution, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("device lost")]
    struct DeviceLost;

    fn ramp(p: &[f64; 3]) -> f32 {
        (p[0] + 10.0 * p[1] + 100.0 * p[2]) as f32
    }

    #[test]
    fn test_partition_covers_grid() -> Result<(), FieldError> {
        let extractor = FieldExtractor::new(4)?;
        let chunks = extractor.partition(10);
        // 3 spans per axis: 4, 4, 2
        assert_eq!(chunks.len(), 27);
        let total: usize = chunks.iter().map(Chunk::num_points).sum();
        assert_eq!(total, 1000);
        Ok(())
    }

    #[test]
    fn test_field_values_follow_grid_mapping() -> Result<(), FieldError> {
        let bounds = GridBounds::new([0.0, 0.0, 0.0], [4.0, 4.0, 4.0])?;
        let field = extract_field(&bounds, 5, &PointwiseField(ramp))?;
        assert_eq!(field.shape(), [5, 5, 5]);
        assert_eq!(field.get(1, 2, 3), 321.0);
        assert_eq!(field.get(4, 0, 0), 4.0);
        assert_eq!(field.get(0, 0, 4), 400.0);
        Ok(())
    }

    #[test]
    fn test_chunk_size_does_not_change_result() -> Result<(), FieldError> {
        let bounds = GridBounds::new([-1.0, -2.0, 0.5], [1.0, 3.0, 2.0])?;
        let reference = FieldExtractor::new(64)?
            .with_strategy(ExecutionStrategy::Serial)
            .extract(&bounds, 13, &PointwiseField(ramp))?;
        for chunk_size in [1, 2, 5, 12, 13] {
            let field = FieldExtractor::new(chunk_size)?.extract(
                &bounds,
                13,
                &PointwiseField(ramp),
            )?;
            assert_eq!(field, reference);
        }
        Ok(())
    }

    #[test]
    fn test_query_failure_propagates() -> Result<(), FieldError> {
        let bounds = GridBounds::cube(1.0)?;
        let failing = |points: &[[f64; 3]]| -> Result<Vec<f32>, DeviceLost> {
            if points.iter().any(|p| p[0] > 0.5) {
                Err(DeviceLost)
            } else {
                Ok(vec![0.0; points.len()])
            }
        };
        let res = FieldExtractor::new(2)?.extract(&bounds, 8, &failing);
        match res {
            Err(FieldError::Query(e)) => assert_eq!(e.to_string(), "device lost"),
            other => panic!("expected query failure, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_query_wrong_length() -> Result<(), FieldError> {
        let bounds = GridBounds::cube(1.0)?;
        let short = |points: &[[f64; 3]]| -> Result<Vec<f32>, Infallible> {
            Ok(vec![0.0; points.len() - 1])
        };
        let res = extract_field(&bounds, 4, &short);
        assert!(matches!(res, Err(FieldError::InvalidShape(63, 64))));
        Ok(())
    }

    #[test]
    fn test_resolution_too_small() -> Result<(), FieldError> {
        let bounds = GridBounds::cube(1.0)?;
        let res = extract_field(&bounds, 1, &PointwiseField(ramp));
        assert!(matches!(res, Err(FieldError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_zero_chunk_size() {
        assert!(FieldExtractor::new(0).is_err());
    }

    #[test]
    fn test_negate_and_min_max() -> Result<(), FieldError> {
        let bounds = GridBounds::cube(1.0)?;
        let mut field = ScalarField::new(bounds, 2, vec![1.0, -2.0, 3.0, 0.0, 0.5, 0.5, 0.5, 0.5])?;
        assert_eq!(field.min_max(), (-2.0, 3.0));
        field.negate();
        assert_eq!(field.min_max(), (-3.0, 2.0));
        assert!(ScalarField::new(bounds, 2, vec![0.0; 7]).is_err());
        Ok(())
    }
}
