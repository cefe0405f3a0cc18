use std::collections::TryReserveError;

/// An error type for the image and filtering crates.
#[derive(thiserror::Error, Debug)]
pub enum ImageError {
    /// Error when the width or the height of the image is zero.
    #[error("Invalid image dimensions ({0}x{1}), width and height must be > 0")]
    InvalidDimensions(usize, usize),

    /// Error when the number of channels is outside of 1..=4.
    #[error("Invalid channel count ({0}), expected 1 to 4 channels")]
    InvalidChannelCount(usize),

    /// Error when channel and shape are not valid.
    #[error("Data length ({0}) does not match the image size ({1})")]
    InvalidChannelShape(usize, usize),

    /// Error when the source and destination images have different sizes.
    #[error("Image size mismatch: ({0}x{1}) vs ({2}x{3})")]
    InvalidImageSize(usize, usize, usize, usize),

    /// Error when a kernel side length is even, zero or too large.
    #[error("Invalid kernel size ({0}), expected an odd size in the supported range")]
    InvalidKernelSize(usize),

    /// Error when the kernel weights do not fill a square matrix.
    #[error("Kernel data length ({0}) does not match the kernel size ({1})")]
    InvalidKernelLength(usize, usize),

    /// Error when a textual kernel cannot be parsed.
    #[error("Failed to parse kernel: {0}")]
    KernelParse(String),

    /// Error when the image is smaller than the kernel footprint.
    #[error("Image ({0}x{1}) is smaller than the kernel size ({2})")]
    ImageTooSmall(usize, usize, usize),

    /// Error when the kernel weights sum to zero.
    #[error("Kernel weights sum to zero and cannot be normalized")]
    DegenerateKernel,

    /// Error when a filter is requested before a source image is set.
    #[error("No source image has been set")]
    NotInitialized,

    /// Error when a pixel buffer cannot be allocated.
    #[error("Failed to allocate the image buffer")]
    AllocationFailure(#[from] TryReserveError),
}
