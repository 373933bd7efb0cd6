use glam::{DMat3, DMat4, DVec3, DVec4};
use serde::{Deserialize, Serialize};

use crate::error::RayError;

/// Tolerance used to validate the rotation block of a camera pose.
const ROTATION_TOLERANCE: f64 = 1e-3;

/// The size of an image in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageSize {
    /// The number of columns.
    pub width: usize,
    /// The number of rows.
    pub height: usize,
}

impl ImageSize {
    /// Total number of pixels in the image.
    #[inline]
    pub fn num_pixels(&self) -> usize {
        self.width * self.height
    }
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Represents the intrinsic parameters of a pinhole camera with skew.
///
/// # Fields
///
/// * `fx` - The focal length in the x direction
/// * `fy` - The focal length in the y direction
/// * `cx` - The x coordinate of the principal point
/// * `cy` - The y coordinate of the principal point
/// * `skew` - The shear between the x and y image axes
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PinholeIntrinsics {
    /// The focal length in the x direction
    pub fx: f64,
    /// The focal length in the y direction
    pub fy: f64,
    /// The x coordinate of the principal point
    pub cx: f64,
    /// The y coordinate of the principal point
    pub cy: f64,
    /// The skew coefficient, `K[0][1]`
    pub skew: f64,
}

impl PinholeIntrinsics {
    /// Create intrinsics without skew.
    ///
    /// Fails with [`RayError::InvalidArgument`] if a focal length is not strictly positive.
    pub fn new(fx: f64, fy: f64, cx: f64, cy: f64) -> Result<Self, RayError> {
        Self::with_skew(fx, fy, cx, cy, 0.0)
    }

    /// Create intrinsics with an explicit skew coefficient.
    pub fn with_skew(fx: f64, fy: f64, cx: f64, cy: f64, skew: f64) -> Result<Self, RayError> {
        if !(fx.is_finite() && fx > 0.0 && fy.is_finite() && fy > 0.0) {
            return Err(RayError::InvalidArgument(format!(
                "focal lengths must be positive, got fx={fx}, fy={fy}"
            )));
        }
        Ok(Self {
            fx,
            fy,
            cx,
            cy,
            skew,
        })
    }

    /// Create intrinsics from a 3x3 row-major camera matrix.
    ///
    /// The matrix is read as `[[fx, skew, cx], [0, fy, cy], [0, 0, 1]]`; the last two rows
    /// beyond `fy` and `cy` are not inspected.
    pub fn from_matrix(k: &[[f64; 3]; 3]) -> Result<Self, RayError> {
        Self::with_skew(k[0][0], k[1][1], k[0][2], k[1][2], k[0][1])
    }

    /// Returns the camera matrix as a 3x3 row-major array.
    pub fn to_matrix(&self) -> [[f64; 3]; 3] {
        [
            [self.fx, self.skew, self.cx],
            [0.0, self.fy, self.cy],
            [0.0, 0.0, 1.0],
        ]
    }
}

/// A rigid transform from camera space to world space (camera-to-world).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    // column-major internally, row-major at the API boundary
    world_t_camera: DMat4,
}

impl CameraPose {
    /// Create a pose from a 4x4 row-major matrix.
    ///
    /// The top-left 3x3 block must be a rotation (orthonormal, determinant +1) and the last
    /// row must be `[0, 0, 0, 1]`.
    ///
    /// Example:
    ///
    /// ```
    /// use nerfkit_rays::CameraPose;
    ///
    /// let pose = CameraPose::from_matrix(&[
    ///     [1.0, 0.0, 0.0, 1.0],
    ///     [0.0, 1.0, 0.0, 2.0],
    ///     [0.0, 0.0, 1.0, 3.0],
    ///     [0.0, 0.0, 0.0, 1.0],
    /// ])
    /// .unwrap();
    /// assert_eq!(pose.translation(), [1.0, 2.0, 3.0]);
    /// ```
    pub fn from_matrix(m: &[[f64; 4]; 4]) -> Result<Self, RayError> {
        if m.iter().flatten().any(|v| !v.is_finite()) {
            return Err(RayError::InvalidArgument(
                "pose contains non-finite values".to_string(),
            ));
        }

        if m[3] != [0.0, 0.0, 0.0, 1.0] {
            return Err(RayError::InvalidArgument(format!(
                "pose last row must be [0, 0, 0, 1], got {:?}",
                m[3]
            )));
        }

        let world_t_camera = DMat4::from_cols_array_2d(m).transpose();

        let rotation = DMat3::from_mat4(world_t_camera);
        let gram = rotation * rotation.transpose();
        if !gram.abs_diff_eq(DMat3::IDENTITY, ROTATION_TOLERANCE)
            || (rotation.determinant() - 1.0).abs() > ROTATION_TOLERANCE
        {
            return Err(RayError::InvalidArgument(
                "pose rotation block is not a proper rotation".to_string(),
            ));
        }

        Ok(Self { world_t_camera })
    }

    /// Create a pose from a rotation (row-major) and a translation.
    pub fn from_rotation_translation(
        rotation: &[[f64; 3]; 3],
        translation: &[f64; 3],
    ) -> Result<Self, RayError> {
        let r = rotation;
        let t = translation;
        Self::from_matrix(&[
            [r[0][0], r[0][1], r[0][2], t[0]],
            [r[1][0], r[1][1], r[1][2], t[1]],
            [r[2][0], r[2][1], r[2][2], t[2]],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    /// The identity pose.
    pub fn identity() -> Self {
        Self {
            world_t_camera: DMat4::IDENTITY,
        }
    }

    /// The camera position in world coordinates (translation column).
    pub fn translation(&self) -> [f64; 3] {
        self.world_t_camera.w_axis.truncate().to_array()
    }

    /// The pose as a 4x4 row-major matrix.
    pub fn to_matrix(&self) -> [[f64; 4]; 4] {
        self.world_t_camera.transpose().to_cols_array_2d()
    }

    /// Transform a homogeneous camera-space point to world space, dropping `w`.
    #[inline]
    pub fn transform_homogeneous(&self, point: &[f64; 4]) -> [f64; 3] {
        let p = self.world_t_camera * DVec4::from_array(*point);
        p.truncate().to_array()
    }

    /// Unit direction from the camera center towards a homogeneous camera-space point.
    ///
    /// A point at the camera center gives the zero vector.
    #[inline]
    pub fn ray_direction(&self, point: &[f64; 4]) -> [f64; 3] {
        let world = (self.world_t_camera * DVec4::from_array(*point)).truncate();
        let origin = self.world_t_camera.w_axis.truncate();
        (world - origin).normalize_or_zero().to_array()
    }

    /// Transform a camera-space point to world space.
    #[inline]
    pub fn transform_point(&self, point: &[f64; 3]) -> [f64; 3] {
        self.world_t_camera
            .transform_point3(DVec3::from_array(*point))
            .to_array()
    }
}
