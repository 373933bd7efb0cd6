#![deny(missing_docs)]
#![doc = env!("CARGO_PKG_DESCRIPTION")]

/// Camera pose, intrinsics and image size types.
pub mod camera;

/// Error types for the rays module.
pub mod error;

/// Ground-truth pixel gathering and background compositing.
pub mod pixels;

/// Pixel lifting and ray generation.
pub mod rays;

pub use camera::{CameraPose, ImageSize, PinholeIntrinsics};
pub use error::RayError;
pub use rays::{generate_rays, lift, select_pixels, RayBatch, RaySampling};
