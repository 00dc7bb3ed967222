// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::collections::HashSet;
use std::iter::Iterator;
use std::marker::PhantomData;
use std::ops::Deref;

use num::{FromPrimitive, ToPrimitive, Zero};

use crate::error::CellgateError;

/// A row-major container storing an image buffer or grid of pixels.
///
/// Subpixels are interleaved, so a pixel at (x, y) occupies `c` consecutive
/// values starting at `(y * w + x) * c`. The container holding the pixel data
/// must implement `Deref<Target = [T]>` and its length must be equal to the
/// product of `w` * `h` * `c`.
///
/// # Examples
///
/// ```
/// use cellgate_core::im::CellBuffer;
///
/// let width = 10;
/// let height = 10;
/// let channels = 3;
/// let data = vec![0u8; (width * height * channels) as usize];
///
/// let buffer = CellBuffer::new(width, height, channels, data);
///
/// assert_eq!(buffer.unwrap().len(), (width * height * channels) as usize);
/// ```
///
/// ```
/// use cellgate_core::im::CellBuffer;
///
/// let data = vec![0u8; 7];
/// let buffer = CellBuffer::new(2, 2, 1, data);
///
/// assert!(buffer.is_err());
/// ```
#[derive(Debug, Clone)]
pub struct CellBuffer<T, Container> {
    w: u32,
    h: u32,
    c: u32,
    pub buffer: Container,
    _phantom: PhantomData<T>,
}

impl<T, Container> CellBuffer<T, Container>
where
    T: ToPrimitive + FromPrimitive,
    Container: Deref<Target = [T]>,
{
    /// Initializes a buffer from a generic data container
    ///
    /// # Arguments
    ///
    /// * `width` - Image width
    /// * `height` - Image height
    /// * `channels` - Number of image channels (e.g. 1 for grayscale)
    /// * `buffer` - A generic container (e.g. `Vec` or slice)
    pub fn new(
        width: u32,
        height: u32,
        channels: u32,
        buffer: Container,
    ) -> Result<CellBuffer<T, Container>, CellgateError> {
        let expected = width as usize * height as usize * channels as usize;

        if expected == buffer.len() {
            Ok(CellBuffer {
                w: width,
                h: height,
                c: channels,
                buffer,
                _phantom: PhantomData,
            })
        } else {
            Err(CellgateError::BufferSizeError)
        }
    }

    /// Width of the image
    pub fn width(&self) -> u32 {
        self.w
    }

    /// Height of the image
    pub fn height(&self) -> u32 {
        self.h
    }

    /// Number of channels in the image
    pub fn channels(&self) -> u32 {
        self.c
    }

    /// Shape/dimensions of the image in (H, W, C) order
    pub fn shape(&self) -> (u32, u32, u32) {
        (self.h, self.w, self.c)
    }

    /// Length of the raw image
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if buffer is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the raw image
    pub fn into_raw(self) -> Container {
        self.buffer
    }

    /// Returns a reference to the raw image
    pub fn as_raw(&self) -> &Container {
        &self.buffer
    }

    // An iterator over the raw buffer
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.buffer.iter()
    }
}

impl<T> CellBuffer<T, Vec<T>>
where
    T: ToPrimitive + FromPrimitive + Zero + Copy,
{
    /// Move the requested channels into the leading planes of a zeroed copy
    ///
    /// Requested indices are deduplicated (first occurrence wins) and indices
    /// outside the channel range are dropped. The returned buffer always has
    /// the same shape as `self`. An empty request returns an unmodified copy.
    ///
    /// # Arguments
    ///
    /// * `channels` - Channel indices in the order they should be packed
    ///
    /// # Examples
    ///
    /// ```
    /// use cellgate_core::im::CellBuffer;
    ///
    /// let rgb = CellBuffer::new(1, 1, 3, vec![10u8, 20, 30]).unwrap();
    ///
    /// let packed = rgb.pack_channels(&[2, 1]);
    /// assert_eq!(packed.as_raw(), &[30, 20, 0]);
    ///
    /// let packed = rgb.pack_channels(&[2, 2, 7]);
    /// assert_eq!(packed.as_raw(), &[30, 0, 0]);
    /// ```
    pub fn pack_channels(&self, channels: &[usize]) -> CellBuffer<T, Vec<T>> {
        if channels.is_empty() || self.c == 0 {
            return self.clone();
        }

        let c = self.c as usize;
        let selected = select_channels(channels, c);
        let mut packed = vec![T::zero(); self.buffer.len()];

        for (pixel, target) in self
            .buffer
            .chunks_exact(c)
            .zip(packed.chunks_exact_mut(c))
        {
            for (dst, &src) in selected.iter().enumerate() {
                target[dst] = pixel[src];
            }
        }

        CellBuffer {
            w: self.w,
            h: self.h,
            c: self.c,
            buffer: packed,
            _phantom: PhantomData,
        }
    }
}

/// Deduplicate channel indices and drop those outside `0..available`
///
/// # Examples
///
/// ```
/// use cellgate_core::im::select_channels;
///
/// assert_eq!(select_channels(&[2, 0, 2, 5], 3), vec![2, 0]);
/// ```
pub fn select_channels(requested: &[usize], available: usize) -> Vec<usize> {
    let mut seen = HashSet::with_capacity(requested.len());

    requested
        .iter()
        .copied()
        .filter(|channel| seen.insert(*channel))
        .filter(|&channel| channel < available)
        .collect()
}

#[cfg(test)]
mod test {

    use super::*;

    fn two_by_one_rgb() -> CellBuffer<u16, Vec<u16>> {
        CellBuffer::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]).unwrap()
    }

    #[test]
    fn test_pack_preserves_shape() {
        let buffer = two_by_one_rgb();
        let packed = buffer.pack_channels(&[1]);

        assert_eq!(packed.shape(), buffer.shape());
        assert_eq!(packed.as_raw(), &[2, 0, 0, 5, 0, 0]);
    }

    #[test]
    fn test_pack_duplicates_collapse() {
        let buffer = two_by_one_rgb();

        let once = buffer.pack_channels(&[2, 0]);
        let repeated = buffer.pack_channels(&[2, 2, 0, 2, 0]);

        assert_eq!(once.as_raw(), repeated.as_raw());
        assert_eq!(once.as_raw(), &[3, 1, 0, 6, 4, 0]);
    }

    #[test]
    fn test_pack_out_of_range_dropped() {
        let buffer = two_by_one_rgb();
        let packed = buffer.pack_channels(&[9, 1, 3]);

        assert_eq!(packed.as_raw(), &[2, 0, 0, 5, 0, 0]);
    }

    #[test]
    fn test_pack_all_out_of_range_is_zeroed() {
        let buffer = two_by_one_rgb();
        let packed = buffer.pack_channels(&[3, 4]);

        assert!(packed.iter().all(|&v| v == 0));
        assert_eq!(packed.len(), buffer.len());
    }

    #[test]
    fn test_pack_empty_request_is_identity() {
        let buffer = two_by_one_rgb();
        let packed = buffer.pack_channels(&[]);

        assert_eq!(packed.as_raw(), buffer.as_raw());
    }

    #[test]
    fn test_pack_is_idempotent_for_leading_order() {
        let buffer = two_by_one_rgb();
        let packed = buffer.pack_channels(&[0, 1, 2]);

        assert_eq!(packed.as_raw(), buffer.as_raw());
    }

    #[test]
    fn test_buffer_size_mismatch() {
        let buffer = CellBuffer::new(3, 3, 1, vec![0u32; 10]);
        assert!(buffer.is_err());
    }
}
