use nerfkit_rays::{CameraPose, ImageSize, PinholeIntrinsics};

use crate::error::TrainError;

/// A posed image.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Interleaved `H x W x C` pixels in `[0, 1]`.
    pub image: Vec<f32>,
    /// The image size.
    pub size: ImageSize,
    /// The number of channels, 3 (RGB) or 4 (RGBA).
    pub channels: usize,
    /// The camera-to-world pose.
    pub pose: CameraPose,
    /// The camera intrinsics.
    pub intrinsics: PinholeIntrinsics,
}

impl Frame {
    /// Create a new frame, checking the image buffer against its size and channels.
    pub fn new(
        image: Vec<f32>,
        size: ImageSize,
        channels: usize,
        pose: CameraPose,
        intrinsics: PinholeIntrinsics,
    ) -> Result<Self, TrainError> {
        if channels != 3 && channels != 4 {
            return Err(TrainError::InvalidData(format!(
                "expected 3 or 4 channels, got {channels}"
            )));
        }
        if image.len() != size.num_pixels() * channels {
            return Err(TrainError::InvalidData(format!(
                "image of size {size} with {channels} channels needs {} values, got {}",
                size.num_pixels() * channels,
                image.len()
            )));
        }
        Ok(Self {
            image,
            size,
            channels,
            pose,
            intrinsics,
        })
    }
}

/// Check that a batch is non-empty and that its frames share size and channel count.
///
/// Returns the common size and channel count.
pub fn batch_layout(frames: &[Frame]) -> Result<(ImageSize, usize), TrainError> {
    let first = frames
        .first()
        .ok_or_else(|| TrainError::InvalidData("empty batch".to_string()))?;

    if let Some(other) = frames
        .iter()
        .find(|f| f.size != first.size || f.channels != first.channels)
    {
        return Err(TrainError::InvalidData(format!(
            "batch mixes {}x{} and {}x{} frames",
            first.size, first.channels, other.size, other.channels
        )));
    }

    Ok((first.size, first.channels))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(width: usize, height: usize, channels: usize) -> Result<Frame, TrainError> {
        let size = ImageSize { width, height };
        Frame::new(
            vec![0.5; width * height * channels],
            size,
            channels,
            CameraPose::identity(),
            PinholeIntrinsics::new(10.0, 10.0, width as f64 / 2.0, height as f64 / 2.0)?,
        )
    }

    #[test]
    fn test_frame_validation() {
        assert!(frame(4, 3, 3).is_ok());
        assert!(frame(4, 3, 4).is_ok());
        assert!(matches!(frame(4, 3, 2), Err(TrainError::InvalidData(_))));

        let res = Frame::new(
            vec![0.0; 5],
            ImageSize {
                width: 2,
                height: 1,
            },
            3,
            CameraPose::identity(),
            PinholeIntrinsics::new(1.0, 1.0, 0.0, 0.0).unwrap(),
        );
        assert!(res.is_err());
    }

    #[test]
    fn test_batch_layout() -> Result<(), TrainError> {
        let batch = vec![frame(4, 3, 4)?, frame(4, 3, 4)?];
        let (size, channels) = batch_layout(&batch)?;
        assert_eq!(size.num_pixels(), 12);
        assert_eq!(channels, 4);

        assert!(batch_layout(&[]).is_err());
        assert!(batch_layout(&[frame(4, 3, 4)?, frame(3, 4, 4)?]).is_err());
        assert!(batch_layout(&[frame(4, 3, 4)?, frame(4, 3, 3)?]).is_err());
        Ok(())
    }
}
