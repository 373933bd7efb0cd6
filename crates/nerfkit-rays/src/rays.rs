use rand::Rng;
use rayon::prelude::*;

use crate::camera::{CameraPose, ImageSize, PinholeIntrinsics};
use crate::error::RayError;

/// How pixels are chosen when generating rays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaySampling {
    /// Every pixel of the image, row-major.
    Dense,
    /// `n` pixels drawn uniformly with replacement.
    Random(usize),
}

impl RaySampling {
    /// Interpret a signed ray count: any value `<= 0` means dense sampling.
    ///
    /// Example:
    ///
    /// ```
    /// use nerfkit_rays::RaySampling;
    ///
    /// assert_eq!(RaySampling::from_count(-1), RaySampling::Dense);
    /// assert_eq!(RaySampling::from_count(0), RaySampling::Dense);
    /// assert_eq!(RaySampling::from_count(1024), RaySampling::Random(1024));
    /// ```
    pub fn from_count(n_rays: i64) -> Self {
        if n_rays > 0 {
            RaySampling::Random(n_rays as usize)
        } else {
            RaySampling::Dense
        }
    }
}

/// The rays generated for a single camera of a batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RayBatch {
    /// Ray origins in world coordinates.
    pub origins: Vec<[f64; 3]>,
    /// Unit ray directions in world coordinates.
    pub directions: Vec<[f64; 3]>,
    /// Offsets into the flattened `H x W` pixel grid, one per ray.
    pub select_indices: Vec<usize>,
}

impl RayBatch {
    /// Number of rays in the batch.
    #[inline]
    pub fn len(&self) -> usize {
        self.origins.len()
    }

    /// Check if the batch holds no rays.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.origins.is_empty()
    }
}

/// Lift a pixel at depth `z` into homogeneous camera coordinates.
///
/// Uses the pinhole model with the skew convention
///
/// `x_cam = (x - cx + cy * sk / fy - sk * y / fy) / fx * z`
///
/// `y_cam = (y - cy) / fy * z`
///
/// # Arguments
///
/// * `x` - The pixel column.
/// * `y` - The pixel row.
/// * `z` - The depth along the optical axis.
/// * `intrinsics` - The camera intrinsics.
///
/// # Returns
///
/// The point `[x_cam, y_cam, z, 1]`.
#[inline]
pub fn lift(x: f64, y: f64, z: f64, intrinsics: &PinholeIntrinsics) -> [f64; 4] {
    let PinholeIntrinsics {
        fx,
        fy,
        cx,
        cy,
        skew: sk,
    } = *intrinsics;

    let x_lift = (x - cx + cy * sk / fy - sk * y / fy) / fx * z;
    let y_lift = (y - cy) / fy * z;

    [x_lift, y_lift, z, 1.0]
}

/// Choose the flattened pixel indices to generate rays for.
///
/// Dense sampling returns `0..H*W`. Random sampling clamps the count to `H*W`, then draws all
/// rows followed by all columns uniformly and returns `row * W + col`.
pub fn select_pixels<R: Rng + ?Sized>(
    image_size: ImageSize,
    sampling: RaySampling,
    rng: &mut R,
) -> Result<Vec<usize>, RayError> {
    let ImageSize { width, height } = image_size;
    if width == 0 || height == 0 {
        return Err(RayError::InvalidRequest(format!(
            "image size {image_size} has no pixels"
        )));
    }

    let indices = match sampling {
        RaySampling::Dense => (0..image_size.num_pixels()).collect(),
        RaySampling::Random(n_rays) => {
            let n_rays = n_rays.min(image_size.num_pixels());
            if n_rays == 0 {
                return Err(RayError::InvalidRequest(
                    "random sampling of zero rays".to_string(),
                ));
            }
            let rows = (0..n_rays)
                .map(|_| rng.random_range(0..height))
                .collect::<Vec<_>>();
            let cols = (0..n_rays)
                .map(|_| rng.random_range(0..width))
                .collect::<Vec<_>>();
            rows.into_iter()
                .zip(cols)
                .map(|(row, col)| row * width + col)
                .collect()
        }
    };

    Ok(indices)
}

/// Compute the rays of one camera for an explicit set of pixel indices.
///
/// PRECONDITION: every index is smaller than `image_size.num_pixels()`.
pub fn rays_for_indices(
    pose: &CameraPose,
    intrinsics: &PinholeIntrinsics,
    image_size: ImageSize,
    indices: &[usize],
) -> RayBatch {
    let origin = pose.translation();
    let width = image_size.width;

    let directions = indices
        .iter()
        .map(|&index| {
            let x = (index % width) as f64;
            let y = (index / width) as f64;
            pose.ray_direction(&lift(x, y, 1.0, intrinsics))
        })
        .collect();

    RayBatch {
        origins: vec![origin; indices.len()],
        directions,
        select_indices: indices.to_vec(),
    }
}

/// Generate world-space rays for a batch of cameras.
///
/// # Arguments
///
/// * `poses` - Camera-to-world poses, one per batch element.
/// * `intrinsics` - Camera intrinsics, one per batch element.
/// * `image_size` - The image size shared by the batch.
/// * `n_rays` - Number of rays to sample, or a value `<= 0` for every pixel.
/// * `rng` - Random source, used only when sampling.
///
/// # Returns
///
/// One [`RayBatch`] per batch element. When sampling, the pixel selection is shared by all
/// elements.
///
/// Example:
///
/// ```
/// use nerfkit_rays::{generate_rays, CameraPose, ImageSize, PinholeIntrinsics};
///
/// let pose = CameraPose::identity();
/// let intrinsics = PinholeIntrinsics::new(100.0, 100.0, 2.0, 1.5).unwrap();
/// let size = ImageSize { width: 4, height: 3 };
/// let batches = generate_rays(&[pose], &[intrinsics], size, -1, &mut rand::rng()).unwrap();
/// assert_eq!(batches[0].len(), 12);
/// ```
pub fn generate_rays<R: Rng + ?Sized>(
    poses: &[CameraPose],
    intrinsics: &[PinholeIntrinsics],
    image_size: ImageSize,
    n_rays: i64,
    rng: &mut R,
) -> Result<Vec<RayBatch>, RayError> {
    if poses.len() != intrinsics.len() {
        return Err(RayError::InvalidShape(poses.len(), intrinsics.len()));
    }

    let indices = select_pixels(image_size, RaySampling::from_count(n_rays), rng)?;

    let batches = poses
        .par_iter()
        .zip(intrinsics.par_iter())
        .map(|(pose, k)| rays_for_indices(pose, k, image_size, &indices))
        .collect();

    Ok(batches)
}
