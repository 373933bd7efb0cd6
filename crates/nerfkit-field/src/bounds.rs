use serde::{Deserialize, Serialize};

use crate::error::FieldError;

/// An axis-aligned box sampled by a regular grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridBounds {
    min: [f64; 3],
    max: [f64; 3],
}

impl GridBounds {
    /// Create new bounds.
    ///
    /// Fails with [`FieldError::InvalidArgument`] unless `min[i] < max[i]` on every axis.
    ///
    /// Example:
    ///
    /// ```
    /// use nerfkit_field::GridBounds;
    ///
    /// let bounds = GridBounds::new([-1.0; 3], [1.0; 3]).unwrap();
    /// assert_eq!(bounds.to_world([0.0, 1.0, 2.0], 3).unwrap(), [-1.0, 0.0, 1.0]);
    /// assert!(GridBounds::new([0.0; 3], [0.0, 1.0, 1.0]).is_err());
    /// ```
    pub fn new(min: [f64; 3], max: [f64; 3]) -> Result<Self, FieldError> {
        for axis in 0..3 {
            if !(min[axis].is_finite() && max[axis].is_finite() && min[axis] < max[axis]) {
                return Err(FieldError::InvalidArgument(format!(
                    "bound_min must be smaller than bound_max on every axis, got {min:?} and {max:?}"
                )));
            }
        }
        Ok(Self { min, max })
    }

    /// A cube centered at the origin with half extent `bound`.
    pub fn cube(bound: f64) -> Result<Self, FieldError> {
        Self::new([-bound; 3], [bound; 3])
    }

    /// The minimum corner.
    pub fn min(&self) -> [f64; 3] {
        self.min
    }

    /// The maximum corner.
    pub fn max(&self) -> [f64; 3] {
        self.max
    }

    /// World coordinate of grid sample `index` along `axis`.
    ///
    /// PRECONDITION: `resolution >= 2`.
    #[inline]
    pub fn coordinate(&self, axis: usize, index: f64, resolution: usize) -> f64 {
        let t = index / (resolution - 1) as f64;
        self.min[axis] + t * (self.max[axis] - self.min[axis])
    }

    /// Map a (possibly fractional) grid index to world coordinates.
    ///
    /// `world = min + index / (resolution - 1) * (max - min)`
    pub fn to_world(&self, index: [f64; 3], resolution: usize) -> Result<[f64; 3], FieldError> {
        check_resolution(resolution)?;
        Ok([
            self.coordinate(0, index[0], resolution),
            self.coordinate(1, index[1], resolution),
            self.coordinate(2, index[2], resolution),
        ])
    }

    /// Check if a point lies inside the bounds, with tolerance `eps` on every side.
    pub fn contains(&self, point: &[f64; 3], eps: f64) -> bool {
        (0..3).all(|i| point[i] >= self.min[i] - eps && point[i] <= self.max[i] + eps)
    }
}

/// Fails with [`FieldError::InvalidArgument`] when a grid cannot map indices to world space.
pub(crate) fn check_resolution(resolution: usize) -> Result<(), FieldError> {
    if resolution < 2 {
        return Err(FieldError::InvalidArgument(format!(
            "resolution must be at least 2, got {resolution}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_bounds_validation() {
        assert!(GridBounds::new([-1.0; 3], [1.0; 3]).is_ok());
        assert!(matches!(
            GridBounds::new([1.0, 0.0, 0.0], [0.0, 1.0, 1.0]),
            Err(FieldError::InvalidArgument(_))
        ));
        assert!(GridBounds::new([0.0, 0.0, 1.0], [1.0, 1.0, 1.0]).is_err());
        assert!(GridBounds::new([0.0, 0.0, f64::NAN], [1.0; 3]).is_err());
    }

    #[test]
    fn test_to_world() -> Result<(), FieldError> {
        let bounds = GridBounds::new([-1.0, 0.0, 2.0], [1.0, 4.0, 3.0])?;
        let p = bounds.to_world([0.0, 0.0, 0.0], 5)?;
        assert_eq!(p, [-1.0, 0.0, 2.0]);
        let p = bounds.to_world([4.0, 4.0, 4.0], 5)?;
        assert_relative_eq!(p[0], 1.0);
        assert_relative_eq!(p[1], 4.0);
        assert_relative_eq!(p[2], 3.0);
        let p = bounds.to_world([1.0, 2.0, 0.5], 5)?;
        assert_relative_eq!(p[0], -0.5);
        assert_relative_eq!(p[1], 2.0);
        assert_relative_eq!(p[2], 2.125);
        Ok(())
    }

    #[test]
    fn test_to_world_rejects_small_resolution() -> Result<(), FieldError> {
        let bounds = GridBounds::cube(1.0)?;
        assert!(matches!(
            bounds.to_world([0.0; 3], 1),
            Err(FieldError::InvalidArgument(_))
        ));
        assert!(bounds.to_world([0.0; 3], 0).is_err());
        Ok(())
    }
}
