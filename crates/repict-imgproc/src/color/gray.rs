use repict_image::{Image, ImageError};

/// Integer average of the channels of one pixel.
#[inline]
fn channel_mean(pixel: &[u8]) -> u8 {
    let sum = pixel.iter().map(|&v| v as u32).sum::<u32>();
    (sum / pixel.len() as u32) as u8
}

/// Reduce an image to gray levels by averaging the channels of every pixel.
///
/// The average is the truncated integer mean of the channel values. The destination
/// decides the output layout:
///
/// * with 1 channel, every pixel holds the average;
/// * with the same channel count as `src`, the average is written to every channel.
///
/// # Arguments
///
/// * `src` - The input image with shape (H, W, C).
/// * `dst` - The output image with shape (H, W, 1) or (H, W, C).
///
/// Precondition: the input and output images must have the same size.
pub fn gray_from_channels_into(src: &Image, dst: &mut Image) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    let dst_channels = dst.num_channels();
    if dst_channels != 1 && dst_channels != src.num_channels() {
        return Err(ImageError::InvalidChannelCount(dst_channels));
    }

    src.pixels()
        .zip(dst.as_slice_mut().chunks_exact_mut(dst_channels))
        .for_each(|(src_pixel, dst_pixel)| dst_pixel.fill(channel_mean(src_pixel)));

    Ok(())
}

/// Reduce an image to gray levels, allocating the destination.
///
/// # Arguments
///
/// * `src` - The input image.
/// * `keep_channels` - If true the output keeps the channel count of `src` with the
///   average broadcast to every channel, otherwise the output has a single channel.
///
/// # Example
///
/// ```
/// use repict_image::Image;
/// use repict_imgproc::color::gray_from_channels;
///
/// let image = Image::new([2, 1].into(), 3, vec![10, 20, 30, 0, 0, 1]).unwrap();
///
/// let gray = gray_from_channels(&image, false).unwrap();
/// assert_eq!(gray.num_channels(), 1);
/// assert_eq!(gray.as_slice(), &[20, 0]);
///
/// let flat = gray_from_channels(&image, true).unwrap();
/// assert_eq!(flat.as_slice(), &[20, 20, 20, 0, 0, 0]);
/// ```
pub fn gray_from_channels(src: &Image, keep_channels: bool) -> Result<Image, ImageError> {
    let channels = if keep_channels {
        src.num_channels()
    } else {
        1
    };

    let mut dst = Image::from_size_val(src.size(), channels, 0)?;
    gray_from_channels_into(src, &mut dst)?;
    Ok(dst)
}
