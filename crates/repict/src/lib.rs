//! In-memory image filtering: kernel generation, 2D convolution with a border policy,
//! channel reduction and a working-image pipeline that chains them.

#[doc(inline)]
pub use repict_image as image;

#[doc(inline)]
pub use repict_imgproc as imgproc;
