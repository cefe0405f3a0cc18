#![deny(missing_docs)]
//! Image types for the repict filtering engine

/// image representation with a runtime channel count.
pub mod image;

/// Error types for the image module.
pub mod error;

pub use crate::error::ImageError;
pub use crate::image::{Image, ImageSize, MAX_CHANNELS};
