use crate::camera::ImageSize;
use crate::error::RayError;

/// Gather the pixels addressed by a ray batch from an interleaved `H x W x C` image.
///
/// # Arguments
///
/// * `image` - The image data, row-major with interleaved channels.
/// * `image_size` - The image size.
/// * `channels` - The number of channels per pixel.
/// * `indices` - Flattened pixel offsets, as in [`crate::RayBatch::select_indices`].
///
/// # Returns
///
/// A `N x C` buffer with the selected pixels in index order.
pub fn gather_pixels(
    image: &[f32],
    image_size: ImageSize,
    channels: usize,
    indices: &[usize],
) -> Result<Vec<f32>, RayError> {
    let expected = image_size.num_pixels() * channels;
    if image.len() != expected {
        return Err(RayError::InvalidDataLength(image.len(), expected));
    }

    let mut out = Vec::with_capacity(indices.len() * channels);
    for &index in indices {
        if index >= image_size.num_pixels() {
            return Err(RayError::InvalidArgument(format!(
                "pixel index {index} out of bounds for image of size {image_size}"
            )));
        }
        let offset = index * channels;
        out.extend_from_slice(&image[offset..offset + channels]);
    }

    Ok(out)
}

/// Blend gathered pixels over a background color.
///
/// RGBA pixels are composited as `rgb * a + bg * (1 - a)`; RGB pixels are returned as is.
pub fn composite_background(
    pixels: &[f32],
    channels: usize,
    background: [f32; 3],
) -> Result<Vec<[f32; 3]>, RayError> {
    if channels != 3 && channels != 4 {
        return Err(RayError::InvalidArgument(format!(
            "expected 3 or 4 channels, got {channels}"
        )));
    }
    if pixels.len() % channels != 0 {
        return Err(RayError::InvalidDataLength(
            pixels.len(),
            pixels.len() / channels * channels,
        ));
    }

    let rgb = pixels
        .chunks_exact(channels)
        .map(|px| match channels {
            4 => {
                let alpha = px[3];
                [
                    px[0] * alpha + background[0] * (1.0 - alpha),
                    px[1] * alpha + background[1] * (1.0 - alpha),
                    px[2] * alpha + background[2] * (1.0 - alpha),
                ]
            }
            _ => [px[0], px[1], px[2]],
        })
        .collect();

    Ok(rgb)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_gather_pixels() -> Result<(), RayError> {
        let size = ImageSize {
            width: 2,
            height: 2,
        };
        let image = (0..12).map(|v| v as f32).collect::<Vec<_>>();
        let gathered = gather_pixels(&image, size, 3, &[3, 0, 3])?;
        assert_eq!(
            gathered,
            vec![9.0, 10.0, 11.0, 0.0, 1.0, 2.0, 9.0, 10.0, 11.0]
        );
        Ok(())
    }

    #[test]
    fn test_gather_pixels_out_of_bounds() {
        let size = ImageSize {
            width: 2,
            height: 1,
        };
        let image = vec![0.0; 6];
        assert!(matches!(
            gather_pixels(&image, size, 3, &[2]),
            Err(RayError::InvalidArgument(_))
        ));
        assert!(matches!(
            gather_pixels(&image[..5], size, 3, &[0]),
            Err(RayError::InvalidDataLength(5, 6))
        ));
    }

    #[test]
    fn test_composite_background() -> Result<(), RayError> {
        let pixels = [1.0, 0.0, 0.0, 0.25, 0.0, 1.0, 0.0, 1.0];
        let rgb = composite_background(&pixels, 4, [1.0, 1.0, 1.0])?;
        assert_relative_eq!(rgb[0][0], 1.0);
        assert_relative_eq!(rgb[0][1], 0.75);
        assert_relative_eq!(rgb[0][2], 0.75);
        assert_eq!(rgb[1], [0.0, 1.0, 0.0]);

        let rgb = composite_background(&[0.1, 0.2, 0.3], 3, [1.0, 1.0, 1.0])?;
        assert_eq!(rgb, vec![[0.1, 0.2, 0.3]]);

        assert!(composite_background(&[0.0; 2], 2, [0.0; 3]).is_err());
        Ok(())
    }
}
