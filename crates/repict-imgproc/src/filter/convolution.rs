use repict_image::{Image, ImageError, MAX_CHANNELS};

use super::Kernel;

/// Value written to border pixels under [`BorderPolicy::Trash`].
pub const TRASH_BORDER_VALUE: u8 = 0;

/// Rule used for pixels whose kernel footprint leaves the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BorderPolicy {
    /// Skip the taps that fall outside the image and normalize by the sum of the
    /// weights that were actually used.
    #[default]
    Clamp,

    /// Write [`TRASH_BORDER_VALUE`] to every pixel whose full footprint does not fit
    /// inside the image.
    Trash,
}

/// Whether a weight sum cancels out relative to the magnitude of its weights.
#[inline]
fn cancels(sum: f32, abs_sum: f32) -> bool {
    sum.abs() <= f32::EPSILON * abs_sum
}

/// Round to nearest and saturate an accumulated value to the 8-bit range.
///
/// Rounding keeps uniform images fixed under every normalized kernel. The channel
/// mean in [`crate::color`] truncates instead.
#[inline]
fn to_u8(val: f32) -> u8 {
    val.round().clamp(0.0, 255.0) as u8
}

/// Apply a 2D kernel to an image.
///
/// For every output pixel `(x, y)` and channel `c` the filter computes
/// `Σ src[y - j][x - i][c] * kernel[j + half][i + half]` over `i, j ∈ [-half, half]`,
/// divides it by the kernel weight sum and rounds the result to the 8-bit range.
///
/// # Arguments
///
/// * `src` - The source image with shape (H, W, C).
/// * `dst` - The destination image with shape (H, W, C).
/// * `kernel` - The kernel to apply.
/// * `policy` - How to compute the pixels close to the image border.
///
/// # Errors
///
/// * [`ImageError::InvalidImageSize`] if `src` and `dst` have different sizes.
/// * [`ImageError::InvalidChannelShape`] if `src` and `dst` have different channel counts.
/// * [`ImageError::ImageTooSmall`] if the image is smaller than the kernel.
/// * [`ImageError::DegenerateKernel`] if the kernel weights sum to zero or are not finite.
pub fn filter2d(
    src: &Image,
    dst: &mut Image,
    kernel: &Kernel,
    policy: BorderPolicy,
) -> Result<(), ImageError> {
    if src.size() != dst.size() {
        return Err(ImageError::InvalidImageSize(
            src.cols(),
            src.rows(),
            dst.cols(),
            dst.rows(),
        ));
    }

    if src.num_channels() != dst.num_channels() {
        return Err(ImageError::InvalidChannelShape(
            dst.as_slice().len(),
            src.as_slice().len(),
        ));
    }

    check_kernel(src, kernel)?;

    let rows = src.rows();
    let cols = src.cols();
    let channels = src.num_channels();
    let k = kernel.size();
    let half = kernel.half();
    let norm = kernel.sum();
    let weights = kernel.as_slice();
    let src_data = src.as_slice();

    for (y, dst_row) in dst.as_slice_mut().chunks_exact_mut(cols * channels).enumerate() {
        let rows_inside = y >= half && y + half < rows;

        for (x, dst_pixel) in dst_row.chunks_exact_mut(channels).enumerate() {
            let inside = rows_inside && x >= half && x + half < cols;

            if !inside && policy == BorderPolicy::Trash {
                dst_pixel.fill(TRASH_BORDER_VALUE);
                continue;
            }

            let mut acc = [0.0f32; MAX_CHANNELS];
            let mut used_weight = 0.0f32;
            let mut used_abs = 0.0f32;

            // tap (ky, kx) reads the source pixel (y + half - ky, x + half - kx)
            for ky in 0..k {
                let Some(sy) = (y + half).checked_sub(ky).filter(|&sy| sy < rows) else {
                    continue;
                };
                let src_row = sy * cols;
                let kernel_row = &weights[ky * k..(ky + 1) * k];

                for (kx, &w) in kernel_row.iter().enumerate() {
                    let Some(sx) = (x + half).checked_sub(kx).filter(|&sx| sx < cols) else {
                        continue;
                    };
                    let offset = (src_row + sx) * channels;
                    acc.iter_mut()
                        .zip(&src_data[offset..offset + channels])
                        .for_each(|(a, &v)| *a += w * v as f32);
                    used_weight += w;
                    used_abs += w.abs();
                }
            }

            // in-bounds weights that cancel out fall back to the full kernel sum
            let divisor = if inside || cancels(used_weight, used_abs) {
                norm
            } else {
                used_weight
            };

            dst_pixel
                .iter_mut()
                .zip(acc.iter())
                .for_each(|(d, &a)| *d = to_u8(a / divisor));
        }
    }

    Ok(())
}

/// Apply a 2D kernel to an image, allocating the destination.
///
/// See [`filter2d`] for the details of the computation.
///
/// # Example
///
/// ```
/// use repict_image::Image;
/// use repict_imgproc::filter::{convolve, kernels::box_kernel, BorderPolicy};
///
/// let image = Image::from_size_val([10, 10].into(), 3, 200).unwrap();
/// let blurred = convolve(&image, &box_kernel(3).unwrap(), BorderPolicy::Clamp).unwrap();
///
/// assert!(blurred.as_slice().iter().all(|&v| v == 200));
/// ```
pub fn convolve(src: &Image, kernel: &Kernel, policy: BorderPolicy) -> Result<Image, ImageError> {
    check_kernel(src, kernel)?;
    let mut dst = Image::from_size_val(src.size(), src.num_channels(), 0)?;
    filter2d(src, &mut dst, kernel, policy)?;
    Ok(dst)
}

/// Check that a kernel can be applied to an image.
///
/// Fails with [`ImageError::ImageTooSmall`] if the image does not fit the kernel and
/// with [`ImageError::DegenerateKernel`] if the weights cannot be normalized.
pub fn check_kernel(src: &Image, kernel: &Kernel) -> Result<(), ImageError> {
    if src.width() < kernel.size() || src.height() < kernel.size() {
        return Err(ImageError::ImageTooSmall(
            src.width(),
            src.height(),
            kernel.size(),
        ));
    }

    let norm = kernel.sum();
    let abs_sum = kernel.as_slice().iter().map(|w| w.abs()).sum::<f32>();
    if !norm.is_finite() || !abs_sum.is_finite() || cancels(norm, abs_sum) {
        return Err(ImageError::DegenerateKernel);
    }

    Ok(())
}
