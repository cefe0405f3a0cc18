//! Working-image pipeline
//!
//! A [`FilterPipeline`] owns the image being processed. Every filter consumes the
//! working image, computes a new one and swaps it in, so the pipeline always holds
//! exactly one buffer for the image. Failed calls leave the working image untouched.

use std::borrow::Cow;

use repict_image::{Image, ImageError, ImageSize};

use crate::color::gray_from_channels;
use crate::filter::{self, kernels, BorderPolicy, Kernel};

/// Configuration of a [`FilterPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FilterConfig {
    border_policy: BorderPolicy,
}

impl FilterConfig {
    /// Create a configuration with the default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the border policy used by the convolution filters.
    pub fn with_border_policy(mut self, border_policy: BorderPolicy) -> Self {
        self.border_policy = border_policy;
        self
    }

    /// Get the border policy used by the convolution filters.
    pub fn border_policy(&self) -> BorderPolicy {
        self.border_policy
    }
}

/// Lifecycle state of a [`FilterPipeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No source image has been set yet.
    Uninitialized,
    /// A working image is held and filters can run.
    Ready,
    /// The working image was released with [`FilterPipeline::clean`].
    Cleaned,
}

/// A filter request with its typed parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterOp {
    /// Leave the image unchanged.
    Identity,
    /// Gaussian blur.
    Gaussian {
        /// Standard deviation of the gaussian.
        sigma: f32,
        /// Explicit odd kernel size, derived from sigma when `None`.
        size: Option<usize>,
        /// Number of times the kernel is applied.
        passes: usize,
        /// Filter every channel if true, otherwise reduce to one channel first.
        keep_channels: bool,
    },
    /// Box (average) blur.
    Average {
        /// Odd kernel size.
        size: usize,
        /// Number of times the kernel is applied.
        passes: usize,
        /// Filter every channel if true, otherwise reduce to one channel first.
        keep_channels: bool,
    },
    /// Channel averaging.
    Bw {
        /// Broadcast the average to every channel if true, otherwise output one channel.
        keep_channels: bool,
    },
    /// Convolution with a user supplied kernel.
    Kernel(Kernel),
}

impl FilterOp {
    /// Get the short name of the filter, as used on the command line.
    pub fn name(&self) -> &'static str {
        match self {
            FilterOp::Identity => "def",
            FilterOp::Gaussian { .. } => "gauss",
            FilterOp::Average { .. } => "average",
            FilterOp::Bw { .. } => "bw",
            FilterOp::Kernel(_) => "kernel",
        }
    }
}

/// Identifies a generated kernel so that repeated calls can reuse it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum KernelKey {
    Box(usize),
    Gaussian { sigma_bits: u32, size: Option<usize> },
}

impl KernelKey {
    fn generate(self) -> Result<Kernel, ImageError> {
        match self {
            KernelKey::Box(size) => kernels::box_kernel(size),
            KernelKey::Gaussian { sigma_bits, size } => {
                kernels::gaussian_kernel(f32::from_bits(sigma_bits), size)
            }
        }
    }
}

/// Return the cached kernel for `key`, generating it if the cache holds another one.
///
/// On failure the previous cache entry is kept.
fn cached_kernel(
    cache: &mut Option<(KernelKey, Kernel)>,
    key: KernelKey,
) -> Result<&Kernel, ImageError> {
    let entry = match cache.take() {
        Some(entry) if entry.0 == key => entry,
        previous => match key.generate() {
            Ok(kernel) => (key, kernel),
            Err(err) => {
                *cache = previous;
                return Err(err);
            }
        },
    };

    Ok(&cache.insert(entry).1)
}

/// Run the optional channel reduction and `passes` convolutions on `src`.
///
/// Intermediate images are dropped as soon as the next one is computed. Returns
/// `None` when nothing had to be computed.
fn filter_passes(
    src: &Image,
    kernel: &Kernel,
    policy: BorderPolicy,
    passes: usize,
    keep_channels: bool,
) -> Result<Option<Image>, ImageError> {
    filter::check_kernel(src, kernel)?;

    let mut current = if keep_channels {
        None
    } else {
        Some(gray_from_channels(src, false)?)
    };

    for _ in 0..passes {
        let next = filter::convolve(current.as_ref().unwrap_or(src), kernel, policy)?;
        current = Some(next);
    }

    Ok(current)
}

enum Working {
    Uninitialized,
    Ready(Image),
    Cleaned,
}

/// Holds the working image of a filter chain.
///
/// The pipeline is a plain value with no internal synchronization: it is moved or
/// borrowed like any other owned data, and independent images use independent
/// pipelines.
///
/// # Example
///
/// ```
/// use repict_image::ImageSize;
/// use repict_imgproc::pipeline::FilterPipeline;
///
/// let mut pipeline = FilterPipeline::new();
///
/// let size = ImageSize { width: 8, height: 8 };
/// pipeline.set_source(vec![120u8; 8 * 8 * 3], size, 3).unwrap();
///
/// pipeline.average_filter(3, 2, true).unwrap();
/// pipeline.bw(false).unwrap();
///
/// let result = pipeline.get_result().unwrap();
/// assert_eq!(result.num_channels(), 1);
/// assert!(result.as_slice().iter().all(|&v| v == 120));
/// ```
pub struct FilterPipeline {
    config: FilterConfig,
    working: Working,
    kernel: Option<(KernelKey, Kernel)>,
}

impl Default for FilterPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl FilterPipeline {
    /// Create an uninitialized pipeline with the default configuration.
    pub fn new() -> Self {
        Self::with_config(FilterConfig::default())
    }

    /// Create an uninitialized pipeline with the given configuration.
    pub fn with_config(config: FilterConfig) -> Self {
        Self {
            config,
            working: Working::Uninitialized,
            kernel: None,
        }
    }

    /// Get the configuration of the pipeline.
    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    /// Get the lifecycle state of the pipeline.
    pub fn state(&self) -> PipelineState {
        match self.working {
            Working::Uninitialized => PipelineState::Uninitialized,
            Working::Ready(_) => PipelineState::Ready,
            Working::Cleaned => PipelineState::Cleaned,
        }
    }

    /// Get the size of the working image, if any.
    pub fn size(&self) -> Option<ImageSize> {
        self.working().ok().map(Image::size)
    }

    /// Get the current channel count of the working image, if any.
    pub fn num_channels(&self) -> Option<usize> {
        self.working().ok().map(Image::num_channels)
    }

    /// Get the kernel kept from the last blur, if any.
    pub fn cached_kernel(&self) -> Option<&Kernel> {
        self.kernel.as_ref().map(|(_, kernel)| kernel)
    }

    fn working(&self) -> Result<&Image, ImageError> {
        match &self.working {
            Working::Ready(image) => Ok(image),
            _ => Err(ImageError::NotInitialized),
        }
    }

    /// Set the source image of the pipeline.
    ///
    /// A borrowed buffer is copied and the caller keeps it. An owned buffer is adopted
    /// without copying. Any previous working image is released.
    ///
    /// # Arguments
    ///
    /// * `data` - The interleaved pixel data, `size.width * size.height * channels` bytes.
    /// * `size` - The size of the image in pixels.
    /// * `channels` - The number of channels, between 1 and 4.
    ///
    /// # Errors
    ///
    /// Fails with [`ImageError::InvalidDimensions`], [`ImageError::InvalidChannelCount`]
    /// or [`ImageError::InvalidChannelShape`] on invalid geometry; the pipeline state is
    /// left unchanged.
    pub fn set_source<'a>(
        &mut self,
        data: impl Into<Cow<'a, [u8]>>,
        size: ImageSize,
        channels: usize,
    ) -> Result<(), ImageError> {
        let image = match data.into() {
            Cow::Borrowed(data) => Image::from_slice(size, channels, data)?,
            Cow::Owned(data) => Image::new(size, channels, data)?,
        };
        self.set_image(image);
        Ok(())
    }

    /// Adopt an image as the working image.
    pub fn set_image(&mut self, image: Image) {
        self.working = Working::Ready(image);
    }

    fn replace(&mut self, image: Image) {
        // the previous working image is dropped by the assignment
        self.working = Working::Ready(image);
    }

    /// Convolve the working image with a kernel.
    pub fn convolve(&mut self, kernel: &Kernel) -> Result<(), ImageError> {
        let src = self.working()?;
        let dst = filter::convolve(src, kernel, self.config.border_policy)?;
        self.replace(dst);
        Ok(())
    }

    /// Blur the working image with a gaussian kernel sized from `sigma`.
    ///
    /// # Arguments
    ///
    /// * `sigma` - The standard deviation, see [`kernels::gaussian_kernel`].
    /// * `passes` - How many times the kernel is applied.
    /// * `keep_channels` - Filter every channel if true, otherwise reduce the image to
    ///   one channel before filtering.
    pub fn gaussian_filter(
        &mut self,
        sigma: f32,
        passes: usize,
        keep_channels: bool,
    ) -> Result<(), ImageError> {
        self.kernel_filter(
            KernelKey::Gaussian {
                sigma_bits: sigma.to_bits(),
                size: None,
            },
            passes,
            keep_channels,
        )
    }

    /// Blur the working image with a gaussian kernel of an explicit odd size.
    pub fn gaussian_filter_with_size(
        &mut self,
        sigma: f32,
        size: usize,
        passes: usize,
        keep_channels: bool,
    ) -> Result<(), ImageError> {
        self.kernel_filter(
            KernelKey::Gaussian {
                sigma_bits: sigma.to_bits(),
                size: Some(size),
            },
            passes,
            keep_channels,
        )
    }

    /// Blur the working image with a box kernel of the given odd size.
    pub fn average_filter(
        &mut self,
        size: usize,
        passes: usize,
        keep_channels: bool,
    ) -> Result<(), ImageError> {
        self.kernel_filter(KernelKey::Box(size), passes, keep_channels)
    }

    fn kernel_filter(
        &mut self,
        key: KernelKey,
        passes: usize,
        keep_channels: bool,
    ) -> Result<(), ImageError> {
        let Working::Ready(src) = &self.working else {
            return Err(ImageError::NotInitialized);
        };

        let kernel = cached_kernel(&mut self.kernel, key)?;
        let result = filter_passes(
            src,
            kernel,
            self.config.border_policy,
            passes,
            keep_channels,
        )?;

        if let Some(image) = result {
            self.replace(image);
        }
        Ok(())
    }

    /// Reduce the working image to gray levels by averaging its channels.
    ///
    /// With `keep_channels == false` the working image becomes single channel.
    pub fn bw(&mut self, keep_channels: bool) -> Result<(), ImageError> {
        let src = self.working()?;
        let dst = gray_from_channels(src, keep_channels)?;
        self.replace(dst);
        Ok(())
    }

    /// Run a filter request.
    pub fn apply(&mut self, op: &FilterOp) -> Result<(), ImageError> {
        match op {
            FilterOp::Identity => self.working().map(|_| ()),
            FilterOp::Gaussian {
                sigma,
                size: None,
                passes,
                keep_channels,
            } => self.gaussian_filter(*sigma, *passes, *keep_channels),
            FilterOp::Gaussian {
                sigma,
                size: Some(size),
                passes,
                keep_channels,
            } => self.gaussian_filter_with_size(*sigma, *size, *passes, *keep_channels),
            FilterOp::Average {
                size,
                passes,
                keep_channels,
            } => self.average_filter(*size, *passes, *keep_channels),
            FilterOp::Bw { keep_channels } => self.bw(*keep_channels),
            FilterOp::Kernel(kernel) => self.convolve(kernel),
        }
    }

    /// Borrow the working image.
    pub fn get_result(&self) -> Result<&Image, ImageError> {
        self.working()
    }

    /// Get an independent copy of the working image.
    pub fn get_result_as_copy(&self) -> Result<Image, ImageError> {
        self.working()?.try_clone()
    }

    /// Move the working image out of the pipeline, leaving it cleaned.
    pub fn take_result(&mut self) -> Result<Image, ImageError> {
        match std::mem::replace(&mut self.working, Working::Cleaned) {
            Working::Ready(image) => {
                self.kernel = None;
                Ok(image)
            }
            other => {
                self.working = other;
                Err(ImageError::NotInitialized)
            }
        }
    }

    /// Release the working image and the cached kernel.
    ///
    /// Filters fail with [`ImageError::NotInitialized`] until a new source is set.
    pub fn clean(&mut self) {
        if let Working::Ready(_) = self.working {
            self.working = Working::Cleaned;
        }
        self.kernel = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::TRASH_BORDER_VALUE;

    fn size(width: usize, height: usize) -> ImageSize {
        ImageSize { width, height }
    }

    #[test]
    fn test_set_source_copy_and_adopt() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        let data = vec![7u8; 4 * 3 * 2];
        pipeline.set_source(&data[..], size(4, 3), 2)?;
        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.get_result()?.as_slice(), &data[..]);

        pipeline.set_source(data, size(3, 4), 2)?;
        assert_eq!(pipeline.size(), Some(size(3, 4)));
        assert_eq!(pipeline.num_channels(), Some(2));
        assert_eq!(pipeline.get_result()?.as_slice().len(), 24);
        Ok(())
    }

    #[test]
    fn test_set_source_invalid_keeps_state() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();

        let res = pipeline.set_source(Vec::<u8>::new(), size(0, 3), 1);
        assert!(matches!(res, Err(ImageError::InvalidDimensions(0, 3))));
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);

        pipeline.set_source(vec![1u8; 4], size(2, 2), 1)?;

        let res = pipeline.set_source(vec![1u8; 20], size(2, 2), 5);
        assert!(matches!(res, Err(ImageError::InvalidChannelCount(5))));

        let res = pipeline.set_source(&[1u8; 3][..], size(2, 2), 1);
        assert!(matches!(res, Err(ImageError::InvalidChannelShape(3, 4))));

        assert_eq!(pipeline.state(), PipelineState::Ready);
        assert_eq!(pipeline.get_result()?.as_slice(), &[1, 1, 1, 1]);
        Ok(())
    }

    #[test]
    fn test_filters_require_source() {
        let mut pipeline = FilterPipeline::new();

        assert!(matches!(
            pipeline.gaussian_filter(1.0, 1, true),
            Err(ImageError::NotInitialized)
        ));
        assert!(matches!(
            pipeline.average_filter(3, 1, true),
            Err(ImageError::NotInitialized)
        ));
        assert!(matches!(pipeline.bw(false), Err(ImageError::NotInitialized)));
        assert!(matches!(
            pipeline.apply(&FilterOp::Identity),
            Err(ImageError::NotInitialized)
        ));
        assert!(matches!(
            pipeline.get_result(),
            Err(ImageError::NotInitialized)
        ));
        assert!(pipeline.cached_kernel().is_none());
        assert_eq!(pipeline.state(), PipelineState::Uninitialized);
    }

    #[test]
    fn test_bw_updates_channels() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        #[rustfmt::skip]
        pipeline.set_source(
            vec![
                10, 20, 30, 0, 0, 0,
                255, 255, 255, 100, 100, 100,
            ],
            size(2, 2),
            3,
        )?;

        pipeline.bw(false)?;
        assert_eq!(pipeline.num_channels(), Some(1));
        assert_eq!(pipeline.get_result()?.as_slice(), &[20, 0, 255, 100]);

        // a single channel image is a fixed point
        pipeline.bw(false)?;
        assert_eq!(pipeline.get_result()?.as_slice(), &[20, 0, 255, 100]);
        Ok(())
    }

    #[test]
    fn test_kernel_cache() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        pipeline.set_source(vec![50u8; 16 * 16], size(16, 16), 1)?;

        pipeline.average_filter(3, 1, true)?;
        assert_eq!(pipeline.cached_kernel().map(Kernel::size), Some(3));

        pipeline.gaussian_filter(1.0, 1, true)?;
        let cached = pipeline.cached_kernel().cloned();
        assert_eq!(cached.as_ref().map(Kernel::size), Some(7));
        assert_eq!(cached, Some(kernels::gaussian_kernel(1.0, None)?));

        // a failed generation keeps the previous kernel
        let res = pipeline.average_filter(4, 1, true);
        assert!(matches!(res, Err(ImageError::InvalidKernelSize(4))));
        assert_eq!(pipeline.cached_kernel().map(Kernel::size), Some(7));

        // same size but another family must not reuse the gaussian weights
        pipeline.average_filter(7, 1, true)?;
        assert_eq!(pipeline.cached_kernel(), Some(&kernels::box_kernel(7)?));

        pipeline.clean();
        assert!(pipeline.cached_kernel().is_none());
        Ok(())
    }

    #[test]
    fn test_multiple_passes() -> Result<(), ImageError> {
        let mut data = vec![0u8; 9 * 9];
        data[40] = 255;

        let mut pipeline = FilterPipeline::new();
        pipeline.set_source(&data[..], size(9, 9), 1)?;
        pipeline.average_filter(3, 2, true)?;

        let kernel = kernels::box_kernel(3)?;
        let src = Image::new(size(9, 9), 1, data)?;
        let once = filter::convolve(&src, &kernel, BorderPolicy::Clamp)?;
        let twice = filter::convolve(&once, &kernel, BorderPolicy::Clamp)?;
        assert_eq!(pipeline.get_result()?, &twice);

        // zero passes leave the image untouched
        pipeline.average_filter(3, 0, true)?;
        assert_eq!(pipeline.get_result()?, &twice);
        Ok(())
    }

    #[test]
    fn test_wide_gaussian_keeps_uniform_image() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();

        for sigma in [3000.0, 5000.0] {
            pipeline.set_source(vec![200u8; 5 * 5 * 3], size(5, 5), 3)?;
            pipeline.gaussian_filter_with_size(sigma, 3, 1, true)?;
            assert!(pipeline
                .get_result()?
                .as_slice()
                .iter()
                .all(|&v| v == 200));
        }
        Ok(())
    }

    #[test]
    fn test_filter_without_keep_channels() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        pipeline.set_source(vec![30u8, 60, 90].repeat(25), size(5, 5), 3)?;

        pipeline.gaussian_filter(0.5, 1, false)?;
        assert_eq!(pipeline.num_channels(), Some(1));
        assert!(pipeline
            .get_result()?
            .as_slice()
            .iter()
            .all(|&v| v == 60));
        Ok(())
    }

    #[test]
    fn test_failed_filter_keeps_working_image() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        pipeline.set_source(vec![9u8; 4 * 4 * 3], size(4, 4), 3)?;

        let res = pipeline.average_filter(5, 3, false);
        assert!(matches!(res, Err(ImageError::ImageTooSmall(4, 4, 5))));

        let res = pipeline.apply(&FilterOp::Kernel("1 0 0\n0 -2 0\n0 0 1".parse()?));
        assert!(matches!(res, Err(ImageError::DegenerateKernel)));

        assert_eq!(pipeline.num_channels(), Some(3));
        assert_eq!(pipeline.get_result()?.as_slice(), &[9u8; 48][..]);
        Ok(())
    }

    #[test]
    fn test_trash_border_config() -> Result<(), ImageError> {
        let config = FilterConfig::new().with_border_policy(BorderPolicy::Trash);
        let mut pipeline = FilterPipeline::with_config(config);
        assert_eq!(pipeline.config().border_policy(), BorderPolicy::Trash);

        pipeline.set_source(vec![77u8; 6 * 6], size(6, 6), 1)?;
        pipeline.average_filter(5, 1, true)?;

        let result = pipeline.get_result()?;
        for y in 0..6 {
            for x in 0..6 {
                let inside = (2..4).contains(&x) && (2..4).contains(&y);
                let expected = if inside { 77 } else { TRASH_BORDER_VALUE };
                assert_eq!(result.get([y, x, 0]), Some(&expected));
            }
        }
        Ok(())
    }

    #[test]
    fn test_apply_dispatch() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::new();
        pipeline.set_source(vec![100u8; 5 * 5 * 4], size(5, 5), 4)?;

        let ops = [
            FilterOp::Identity,
            FilterOp::Gaussian {
                sigma: 0.8,
                size: Some(3),
                passes: 1,
                keep_channels: true,
            },
            FilterOp::Average {
                size: 3,
                passes: 2,
                keep_channels: true,
            },
            FilterOp::Kernel(kernels::box_kernel(5)?),
            FilterOp::Bw {
                keep_channels: true,
            },
        ];

        for op in &ops {
            pipeline.apply(op)?;
        }

        let names = ops.iter().map(FilterOp::name).collect::<Vec<_>>();
        assert_eq!(names, vec!["def", "gauss", "average", "kernel", "bw"]);

        let result = pipeline.get_result()?;
        assert_eq!(result.num_channels(), 4);
        assert!(result.as_slice().iter().all(|&v| v == 100));
        Ok(())
    }

    #[test]
    fn test_results_and_clean() -> Result<(), ImageError> {
        let mut pipeline = FilterPipeline::default();
        pipeline.set_source(vec![1u8, 2, 3, 4], size(2, 2), 1)?;

        let copy = pipeline.get_result_as_copy()?;
        pipeline.bw(true)?;
        assert_eq!(copy.as_slice(), pipeline.get_result()?.as_slice());

        pipeline.clean();
        assert_eq!(pipeline.state(), PipelineState::Cleaned);
        assert!(matches!(pipeline.bw(true), Err(ImageError::NotInitialized)));
        assert_eq!(pipeline.size(), None);

        pipeline.set_source(vec![5u8, 6, 7, 8], size(2, 2), 1)?;
        let image = pipeline.take_result()?;
        assert_eq!(image.into_vec(), vec![5, 6, 7, 8]);
        assert_eq!(pipeline.state(), PipelineState::Cleaned);
        assert!(matches!(
            pipeline.take_result(),
            Err(ImageError::NotInitialized)
        ));

        let mut fresh = FilterPipeline::new();
        fresh.clean();
        assert_eq!(fresh.state(), PipelineState::Uninitialized);
        Ok(())
    }
}
