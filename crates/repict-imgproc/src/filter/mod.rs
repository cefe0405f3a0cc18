//! Filter operations
//!
//! This module provides kernel generation and 2D convolution for 8-bit images.

/// Filter kernels
pub mod kernels;
pub use kernels::Kernel;

/// Convolution operations
mod convolution;
pub use convolution::*;
