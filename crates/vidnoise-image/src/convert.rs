use vidnoise_tensor::{Tensor3, Tensor4, TensorAllocator};

use crate::{Image, ImageError, ImageSize};

/// An error type for frame conversions.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ConvertError {
    /// The frame holds values above 1.0.
    #[error("Frame values must not exceed 1.0, found a maximum of {0}")]
    OutOfRange(f32),

    /// The frame has a channel count other than 1 or 3.
    #[error("Number of color channels not supported: {0}")]
    UnsupportedChannels(usize),

    /// The frame batch holds no samples.
    #[error("Frame batch is empty")]
    EmptyBatch,

    /// Error creating the image.
    #[error("Failed to create image. {0}")]
    ImageError(#[from] ImageError),
}

/// An 8-bit image produced from a normalized tensor frame.
pub enum FrameImage {
    /// Single channel image.
    Gray(Image<u8, 1>),
    /// Three channel image, in RGB order or BGR order when swapped.
    Rgb(Image<u8, 3>),
}

impl FrameImage {
    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        match self {
            FrameImage::Gray(image) => image.size(),
            FrameImage::Rgb(image) => image.size(),
        }
    }

    /// Get the number of channels in the image.
    pub fn num_channels(&self) -> usize {
        match self {
            FrameImage::Gray(_) => 1,
            FrameImage::Rgb(_) => 3,
        }
    }

    /// Get the interleaved pixel data.
    pub fn as_slice(&self) -> &[u8] {
        match self {
            FrameImage::Gray(image) => image.as_slice(),
            FrameImage::Rgb(image) => image.as_slice(),
        }
    }
}

#[inline]
fn to_u8(x: f32) -> u8 {
    // truncation, not rounding
    (x * 255.0).clamp(0.0, 255.0) as u8
}

fn planes_to_image(
    data: &[f32],
    [channels, height, width]: [usize; 3],
    swap_rb: bool,
) -> Result<FrameImage, ConvertError> {
    let max = data.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if max > 1.0 {
        return Err(ConvertError::OutOfRange(max));
    }

    let size = ImageSize { width, height };
    let plane = width * height;

    match channels {
        1 => {
            let pixels = data.iter().map(|&x| to_u8(x)).collect();
            Ok(FrameImage::Gray(Image::new(size, pixels)?))
        }
        3 => {
            let order = if swap_rb { [2, 1, 0] } else { [0, 1, 2] };
            let mut pixels = Vec::with_capacity(plane * 3);
            for i in 0..plane {
                for &ch in order.iter() {
                    pixels.push(to_u8(data[ch * plane + i]));
                }
            }
            Ok(FrameImage::Rgb(Image::new(size, pixels)?))
        }
        n => Err(ConvertError::UnsupportedChannels(n)),
    }
}

/// Convert a normalized `[C, H, W]` frame into an 8-bit interleaved image.
///
/// Values are mapped with `x * 255` clamped to `[0, 255]` and truncated.
///
/// # Arguments
///
/// * `frame` - The frame with values in `[0, 1]`.
/// * `swap_rb` - Emit three channel frames in BGR order.
///
/// # Errors
///
/// Fails when a value exceeds 1.0 or when the frame has neither 1 nor 3 channels.
///
/// # Example
///
/// ```
/// use vidnoise_image::convert::frame_to_image;
/// use vidnoise_image::FrameImage;
/// use vidnoise_tensor::{CpuAllocator, Tensor3};
///
/// let frame = Tensor3::from_shape_vec([1, 1, 2], vec![0.0f32, 1.0], CpuAllocator).unwrap();
/// let image = frame_to_image(&frame, false).unwrap();
/// assert_eq!(image.as_slice(), &[0, 255]);
/// ```
pub fn frame_to_image<A: TensorAllocator>(
    frame: &Tensor3<f32, A>,
    swap_rb: bool,
) -> Result<FrameImage, ConvertError> {
    planes_to_image(frame.as_slice(), frame.shape, swap_rb)
}

/// Convert the first frame of a `[N, C, H, W]` batch into an 8-bit interleaved image.
///
/// See [`frame_to_image`] for the value mapping.
pub fn batch_frame_to_image<A: TensorAllocator>(
    frames: &Tensor4<f32, A>,
    swap_rb: bool,
) -> Result<FrameImage, ConvertError> {
    let [n, c, h, w] = frames.shape;
    if n == 0 {
        return Err(ConvertError::EmptyBatch);
    }
    planes_to_image(&frames.as_slice()[..c * h * w], [c, h, w], swap_rb)
}

/// Convert an interleaved 8-bit image into planar `[C, H, W]` data.
///
/// When `normalize` is set the values are scaled to `[0, 1]`.
pub fn image_to_frame<const C: usize>(image: &Image<u8, C>, normalize: bool) -> Vec<f32> {
    let scale = if normalize { 1.0 / 255.0 } else { 1.0 };
    let plane = image.width() * image.height();
    let src = image.as_slice();

    let mut data = vec![0.0f32; plane * C];
    for (i, pixel) in src.chunks_exact(C).enumerate() {
        for (ch, &v) in pixel.iter().enumerate() {
            data[ch * plane + i] = v as f32 * scale;
        }
    }
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use vidnoise_tensor::CpuAllocator;

    #[test]
    fn gray_frame() -> Result<(), Box<dyn std::error::Error>> {
        let frame =
            Tensor3::from_shape_vec([1, 2, 2], vec![0.0f32, 0.5, -0.2, 1.0], CpuAllocator)?;
        let image = frame_to_image(&frame, true)?;
        assert_eq!(image.num_channels(), 1);
        assert_eq!(image.size(), ImageSize { width: 2, height: 2 });
        assert_eq!(image.as_slice(), &[0, 127, 0, 255]);
        Ok(())
    }

    #[test]
    fn rgb_frame_swap() -> Result<(), Box<dyn std::error::Error>> {
        // planes: R = 1.0, G = 0.0, B = 0.2
        #[rustfmt::skip]
        let frame = Tensor3::from_shape_vec(
            [3, 1, 2],
            vec![
                1.0f32, 1.0,
                0.0, 0.0,
                0.2, 0.2,
            ],
            CpuAllocator,
        )?;

        let rgb = frame_to_image(&frame, false)?;
        assert_eq!(rgb.as_slice(), &[255, 0, 51, 255, 0, 51]);

        let bgr = frame_to_image(&frame, true)?;
        assert_eq!(bgr.as_slice(), &[51, 0, 255, 51, 0, 255]);
        Ok(())
    }

    #[test]
    fn frame_out_of_range() -> Result<(), Box<dyn std::error::Error>> {
        let frame = Tensor3::from_shape_vec([1, 1, 2], vec![0.5f32, 1.5], CpuAllocator)?;
        assert!(matches!(
            frame_to_image(&frame, false),
            Err(ConvertError::OutOfRange(v)) if v == 1.5
        ));
        Ok(())
    }

    #[test]
    fn frame_unsupported_channels() -> Result<(), Box<dyn std::error::Error>> {
        let frame = Tensor3::<f32, _>::zeros([2, 1, 1], CpuAllocator)?;
        assert!(matches!(
            frame_to_image(&frame, false),
            Err(ConvertError::UnsupportedChannels(2))
        ));
        Ok(())
    }

    #[test]
    fn batch_uses_first_sample() -> Result<(), Box<dyn std::error::Error>> {
        let frames = Tensor4::from_shape_vec([2, 1, 1, 1], vec![0.2f32, 0.8], CpuAllocator)?;
        let image = batch_frame_to_image(&frames, false)?;
        assert_eq!(image.as_slice(), &[51]);

        let empty = Tensor4::<f32, _>::zeros([0, 1, 1, 1], CpuAllocator)?;
        assert!(matches!(
            batch_frame_to_image(&empty, false),
            Err(ConvertError::EmptyBatch)
        ));
        Ok(())
    }

    #[test]
    fn image_to_planes() -> Result<(), Box<dyn std::error::Error>> {
        let image = Image::<u8, 3>::new([2, 1].into(), vec![255, 0, 51, 0, 255, 102])?;
        let planes = image_to_frame(&image, true);
        let expected = [1.0, 0.0, 0.0, 1.0, 0.2, 0.4];
        for (a, b) in planes.iter().zip(expected.iter()) {
            assert_relative_eq!(*a, *b, epsilon = 1e-6);
        }
        assert_eq!(image_to_frame(&image, false)[4], 51.0);
        Ok(())
    }
}
