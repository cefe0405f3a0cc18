use std::str::FromStr;

use repict_image::ImageError;

/// Largest supported kernel radius `n`, for a side length of `2n + 1`.
pub const MAX_KERNEL_RADIUS: usize = 50;

/// Largest supported kernel side length.
pub const MAX_KERNEL_SIZE: usize = 2 * MAX_KERNEL_RADIUS + 1;

/// Sigma used by [`gaussian_kernel`] when the requested sigma is not positive.
pub const DEFAULT_SIGMA: f32 = 1.0;

/// A square convolution kernel with an odd side length.
///
/// The weights are stored row-major. They are not normalized: the convolution
/// divides by the weight sum when the kernel is applied.
#[derive(Clone, Debug, PartialEq)]
pub struct Kernel {
    size: usize,
    data: Vec<f32>,
}

impl Kernel {
    /// Create a kernel from row-major weights.
    ///
    /// # Arguments
    ///
    /// * `size` - The side length of the kernel. Must be odd and at most [`MAX_KERNEL_SIZE`].
    /// * `data` - The `size * size` weights of the kernel.
    ///
    /// # Examples
    ///
    /// ```
    /// use repict_imgproc::filter::Kernel;
    ///
    /// let kernel = Kernel::new(3, vec![0.0, 1.0, 0.0, 1.0, 4.0, 1.0, 0.0, 1.0, 0.0]).unwrap();
    /// assert_eq!(kernel.size(), 3);
    /// assert_eq!(kernel.sum(), 8.0);
    /// ```
    pub fn new(size: usize, data: Vec<f32>) -> Result<Self, ImageError> {
        validate_kernel_size(size)?;

        if data.len() != size * size {
            return Err(ImageError::InvalidKernelLength(data.len(), size * size));
        }

        Ok(Self { size, data })
    }

    /// Get the side length of the kernel.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Get the distance from the center to the edge, `(size - 1) / 2`.
    pub fn half(&self) -> usize {
        (self.size - 1) / 2
    }

    /// Get the weights of the kernel in row-major order.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Get the weight at the given row and column.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.size || col >= self.size {
            return None;
        }
        self.data.get(row * self.size + col).copied()
    }

    /// Get the sum of the weights, used as the normalization factor.
    pub fn sum(&self) -> f32 {
        self.data.iter().sum()
    }
}

/// Parse a kernel from text.
///
/// Each non-empty line is one row of whitespace separated weights. Lines starting
/// with `#` are ignored. The matrix must be square with an odd side length.
impl FromStr for Kernel {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut rows = Vec::new();

        for (lineno, line) in s.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let row = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<f32>().map_err(|_| {
                        ImageError::KernelParse(format!(
                            "invalid weight '{}' on line {}",
                            token,
                            lineno + 1
                        ))
                    })
                })
                .collect::<Result<Vec<f32>, ImageError>>()?;

            rows.push(row);
        }

        if rows.is_empty() {
            return Err(ImageError::KernelParse("no weights found".to_string()));
        }

        let size = rows.len();
        if let Some(row) = rows.iter().find(|row| row.len() != size) {
            return Err(ImageError::KernelParse(format!(
                "expected {} weights per row, found {}",
                size,
                row.len()
            )));
        }

        Kernel::new(size, rows.into_iter().flatten().collect())
    }
}

/// Check that a kernel side length is odd and within the supported range.
pub fn validate_kernel_size(size: usize) -> Result<(), ImageError> {
    if size % 2 == 0 || size > MAX_KERNEL_SIZE {
        return Err(ImageError::InvalidKernelSize(size));
    }
    Ok(())
}

/// Create a box (average) kernel with all weights set to one.
///
/// # Arguments
///
/// * `kernel_size` - The side length of the kernel, odd and at most [`MAX_KERNEL_SIZE`].
///
/// # Examples
///
/// ```
/// use repict_imgproc::filter::kernels::box_kernel;
///
/// let kernel = box_kernel(3).unwrap();
/// assert_eq!(kernel.as_slice(), &[1.0; 9]);
/// assert!(box_kernel(4).is_err());
/// ```
pub fn box_kernel(kernel_size: usize) -> Result<Kernel, ImageError> {
    validate_kernel_size(kernel_size)?;
    Kernel::new(kernel_size, vec![1.0; kernel_size * kernel_size])
}

/// Compute the side length of a gaussian kernel for the given sigma.
///
/// The size is `2 * floor(2 * sigma) + 3`, which is always odd.
pub fn gaussian_kernel_size(sigma: f32) -> usize {
    let sigma = effective_sigma(sigma);
    // float to int casts saturate, so a huge sigma yields an out-of-range size
    let radius = (2.0 * sigma).floor() as usize;
    radius.saturating_mul(2).saturating_add(3)
}

fn effective_sigma(sigma: f32) -> f32 {
    if sigma.is_finite() && sigma > 0.0 {
        sigma
    } else {
        DEFAULT_SIGMA
    }
}

/// Create a 2D gaussian kernel.
///
/// Each weight is `exp(-(dx² + dy²) / (2σ²)) / (2πσ²)` where `(dx, dy)` is the offset
/// from the kernel center. The kernel is not normalized to sum one.
///
/// # Arguments
///
/// * `sigma` - The standard deviation. Non-positive or non-finite values fall back to
///   [`DEFAULT_SIGMA`].
/// * `kernel_size` - An explicit odd side length. When `None` the size is derived from
///   sigma with [`gaussian_kernel_size`].
pub fn gaussian_kernel(sigma: f32, kernel_size: Option<usize>) -> Result<Kernel, ImageError> {
    let sigma = effective_sigma(sigma);
    let size = kernel_size.unwrap_or_else(|| gaussian_kernel_size(sigma));
    validate_kernel_size(size)?;

    let half = ((size - 1) / 2) as f32;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let scale = 1.0 / (std::f32::consts::PI * two_sigma_sq);

    let mut data = Vec::with_capacity(size * size);
    for i in 0..size {
        let dy = i as f32 - half;
        for j in 0..size {
            let dx = j as f32 - half;
            data.push((-(dx * dx + dy * dy) / two_sigma_sq).exp() * scale);
        }
    }

    Kernel::new(size, data)
}
