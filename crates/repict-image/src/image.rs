use crate::error::ImageError;

/// Maximum number of interleaved channels per pixel.
pub const MAX_CHANNELS: usize = 4;

/// Image size in pixels
///
/// A struct to represent the size of an image in pixels.
///
/// # Examples
///
/// ```
/// use repict_image::ImageSize;
///
/// let image_size = ImageSize {
///   width: 10,
///   height: 20,
/// };
///
/// assert_eq!(image_size.width, 10);
/// assert_eq!(image_size.height, 20);
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ImageSize {
    /// Width of the image in pixels
    pub width: usize,
    /// Height of the image in pixels
    pub height: usize,
}

impl std::fmt::Display for ImageSize {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(
            f,
            "ImageSize {{ width: {}, height: {} }}",
            self.width, self.height
        )
    }
}

impl From<[usize; 2]> for ImageSize {
    fn from(size: [usize; 2]) -> Self {
        ImageSize {
            width: size[0],
            height: size[1],
        }
    }
}

/// Check the geometry of an image and return the expected buffer length.
fn buffer_len(size: ImageSize, channels: usize) -> Result<usize, ImageError> {
    if size.width == 0 || size.height == 0 {
        return Err(ImageError::InvalidDimensions(size.width, size.height));
    }

    if channels == 0 || channels > MAX_CHANNELS {
        return Err(ImageError::InvalidChannelCount(channels));
    }

    size.width
        .checked_mul(size.height)
        .and_then(|n| n.checked_mul(channels))
        .ok_or(ImageError::InvalidDimensions(size.width, size.height))
}

/// Represents an 8-bit image with interleaved channels.
///
/// The pixel data is stored row-major as a flat buffer of length
/// `width * height * channels`; pixel `(x, y)` occupies the samples
/// `[(y * width + x) * channels, (y * width + x + 1) * channels)`.
///
/// The buffer is exclusively owned: moving an `Image` transfers the allocation,
/// dropping it releases the allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Image {
    size: ImageSize,
    channels: usize,
    data: Vec<u8>,
}

impl Image {
    /// Create a new image from pixel data, taking ownership of the buffer.
    ///
    /// # Arguments
    ///
    /// * `size` - The size of the image in pixels.
    /// * `channels` - The number of interleaved channels, between 1 and 4.
    /// * `data` - The pixel data of the image.
    ///
    /// # Errors
    ///
    /// Returns an error if the size is empty, the channel count is out of range or
    /// the length of the pixel data does not match the image geometry.
    ///
    /// # Examples
    ///
    /// ```
    /// use repict_image::{Image, ImageSize};
    ///
    /// let image = Image::new(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     3,
    ///     vec![0u8; 10 * 20 * 3],
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(image.size().width, 10);
    /// assert_eq!(image.size().height, 20);
    /// assert_eq!(image.num_channels(), 3);
    /// ```
    pub fn new(size: ImageSize, channels: usize, data: Vec<u8>) -> Result<Self, ImageError> {
        let expected = buffer_len(size, channels)?;

        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }

        Ok(Self {
            size,
            channels,
            data,
        })
    }

    /// Create a new image by copying the given pixel data.
    ///
    /// The caller keeps ownership of `data`.
    ///
    /// # Errors
    ///
    /// Same as [`Image::new`], plus [`ImageError::AllocationFailure`] if the copy
    /// cannot be allocated.
    pub fn from_slice(size: ImageSize, channels: usize, data: &[u8]) -> Result<Self, ImageError> {
        let expected = buffer_len(size, channels)?;

        if data.len() != expected {
            return Err(ImageError::InvalidChannelShape(data.len(), expected));
        }

        let mut buffer = Vec::new();
        buffer.try_reserve_exact(expected)?;
        buffer.extend_from_slice(data);

        Ok(Self {
            size,
            channels,
            data: buffer,
        })
    }

    /// Create a new image with the given size and every sample set to `val`.
    ///
    /// # Examples
    ///
    /// ```
    /// use repict_image::{Image, ImageSize};
    ///
    /// let image = Image::from_size_val(
    ///     ImageSize {
    ///         width: 10,
    ///         height: 20,
    ///     },
    ///     1,
    ///     0u8,
    /// )
    /// .unwrap();
    ///
    /// assert_eq!(image.as_slice().len(), 10 * 20);
    /// ```
    pub fn from_size_val(size: ImageSize, channels: usize, val: u8) -> Result<Self, ImageError> {
        let len = buffer_len(size, channels)?;

        let mut data = Vec::new();
        data.try_reserve_exact(len)?;
        data.resize(len, val);

        Ok(Self {
            size,
            channels,
            data,
        })
    }

    /// Duplicate the image, reporting allocation failure instead of aborting.
    pub fn try_clone(&self) -> Result<Self, ImageError> {
        let mut data = Vec::new();
        data.try_reserve_exact(self.data.len())?;
        data.extend_from_slice(&self.data);

        Ok(Self {
            size: self.size,
            channels: self.channels,
            data,
        })
    }

    /// Get the size of the image in pixels.
    pub fn size(&self) -> ImageSize {
        self.size
    }

    /// Get the number of columns of the image.
    pub fn cols(&self) -> usize {
        self.width()
    }

    /// Get the number of rows of the image.
    pub fn rows(&self) -> usize {
        self.height()
    }

    /// Get the width of the image in pixels.
    pub fn width(&self) -> usize {
        self.size.width
    }

    /// Get the height of the image in pixels.
    pub fn height(&self) -> usize {
        self.size.height
    }

    /// Get the number of channels in the image.
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Get the pixel data of the image as a flat slice.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    /// Get the pixel data of the image as a mutable flat slice.
    ///
    /// The length of the buffer cannot change through this slice.
    pub fn as_slice_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consume the image and return the underlying buffer.
    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Get a sample by its `[y, x, channel]` index.
    ///
    /// Returns `None` if any component of the index is out of bounds.
    pub fn get(&self, index: [usize; 3]) -> Option<&u8> {
        let [y, x, ch] = index;
        if y >= self.height() || x >= self.width() || ch >= self.channels {
            return None;
        }
        self.data.get((y * self.width() + x) * self.channels + ch)
    }

    /// Get all the channels of the pixel at column `x` and row `y`.
    pub fn pixel(&self, x: usize, y: usize) -> Option<&[u8]> {
        if x >= self.width() || y >= self.height() {
            return None;
        }
        let offset = (y * self.width() + x) * self.channels;
        self.data.get(offset..offset + self.channels)
    }

    /// Iterate over the pixels of the image in row-major order.
    pub fn pixels(&self) -> std::slice::ChunksExact<'_, u8> {
        self.data.chunks_exact(self.channels)
    }
}
