// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::Path;

use image::DynamicImage;
use npyz::{self, DType, NpyFile, TypeChar};

use crate::error::CellgateError;
use crate::im::CellBuffer;
use crate::impl_enum_dispatch;
use crate::io::{is_numpy, write_numpy};

/// A wrapper for representing and storing array-shaped pixels
///
/// Images decoded from disk or from an upload are converted into one of the
/// three subpixel types that the segmentation environments accept. Grayscale
/// inputs have a single channel and alpha channels are always dropped.
///
/// # Examples
///
/// ```
/// use image::{RgbImage, DynamicImage};
/// use cellgate_core::im::CellImage;
///
/// let rgb = RgbImage::new(10, 10);
/// let image = CellImage::new_from_dynamic(DynamicImage::ImageRgb8(rgb)).unwrap();
///
/// assert_eq!(image.shape(), (10, 10, 3));
/// ```
#[derive(Debug, Clone)]
pub enum CellImage {
    U8(CellBuffer<u8, Vec<u8>>),
    U16(CellBuffer<u16, Vec<u16>>),
    F32(CellBuffer<f32, Vec<f32>>),
}

// >>> I/O METHODS

impl CellImage {
    /// Open an image from a provided path
    ///
    /// The format is detected from the file content rather than the
    /// extension, so uploads stored under a generic suffix decode correctly.
    ///
    /// # Arguments
    ///
    /// * `path` - A path to a numpy array or any image crate format
    ///
    /// ```no_run
    /// use cellgate_core::im::CellImage;
    /// let image = CellImage::open("upload.png");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<CellImage, CellgateError> {
        let bytes = std::fs::read(&path)
            .map_err(|err| CellgateError::NoFileError(err.to_string()))?;

        Self::decode(&bytes)
    }

    /// Decode an image from raw file bytes
    pub fn decode(bytes: &[u8]) -> Result<CellImage, CellgateError> {
        if is_numpy(bytes) {
            let npy = NpyFile::new(bytes)
                .map_err(|err| CellgateError::ImageReadError(err.to_string()))?;
            return Self::new_from_numpy(npy);
        }

        let image = image::load_from_memory(bytes)
            .map_err(|err| CellgateError::ImageReadError(err.to_string()))?;

        Self::new_from_dynamic(image)
    }

    /// Initialize a new image from a DynamicImage
    ///
    /// # Arguments
    ///
    /// * `image` - An 8 or 16-bit grayscale or rgb(a) DynamicImage, or 32-bit float rgb(a)
    pub fn new_from_dynamic(image: DynamicImage) -> Result<CellImage, CellgateError> {
        let width = image.width();
        let height = image.height();

        match image {
            DynamicImage::ImageLuma8(buffer) => Ok(CellImage::U8(CellBuffer::new(
                width,
                height,
                1,
                buffer.into_raw(),
            )?)),
            DynamicImage::ImageLumaA8(buffer) => Ok(CellImage::U8(CellBuffer::new(
                width,
                height,
                1,
                drop_alpha(buffer.into_raw(), 2),
            )?)),
            DynamicImage::ImageLuma16(buffer) => Ok(CellImage::U16(CellBuffer::new(
                width,
                height,
                1,
                buffer.into_raw(),
            )?)),
            DynamicImage::ImageLumaA16(buffer) => Ok(CellImage::U16(CellBuffer::new(
                width,
                height,
                1,
                drop_alpha(buffer.into_raw(), 2),
            )?)),
            DynamicImage::ImageRgb8(buffer) => Ok(CellImage::U8(CellBuffer::new(
                width,
                height,
                3,
                buffer.into_raw(),
            )?)),
            DynamicImage::ImageRgba8(buffer) => Ok(CellImage::U8(CellBuffer::new(
                width,
                height,
                3,
                drop_alpha(buffer.into_raw(), 4),
            )?)),
            DynamicImage::ImageRgb16(buffer) => Ok(CellImage::U16(CellBuffer::new(
                width,
                height,
                3,
                buffer.into_raw(),
            )?)),
            DynamicImage::ImageRgba16(buffer) => Ok(CellImage::U16(CellBuffer::new(
                width,
                height,
                3,
                drop_alpha(buffer.into_raw(), 4),
            )?)),
            DynamicImage::ImageRgb32F(buffer) => Ok(CellImage::F32(CellBuffer::new(
                width,
                height,
                3,
                buffer.into_raw(),
            )?)),
            DynamicImage::ImageRgba32F(buffer) => Ok(CellImage::F32(CellBuffer::new(
                width,
                height,
                3,
                drop_alpha(buffer.into_raw(), 4),
            )?)),
            _ => Err(CellgateError::ImageError(
                "A dynamic image with a valid data type was not detected.",
            )),
        }
    }

    /// Initialize a new image from a numpy array buffer
    ///
    /// # Arguments
    ///
    /// * `npy` - A (height, width) or (height, width, channel) shaped numpy array
    pub fn new_from_numpy(npy: NpyFile<&[u8]>) -> Result<CellImage, CellgateError> {
        let shape = npy.shape().to_vec();

        let (h, w, c) = match shape.len() {
            2 => (shape[0] as u32, shape[1] as u32, 1u32),
            3 => (shape[0] as u32, shape[1] as u32, shape[2] as u32),
            _ => {
                return Err(CellgateError::ImageError(
                    "Numpy array inputs must have an (H, W) or (H, W, C) shape.",
                ));
            }
        };

        let unreadable = |_| CellgateError::ImageError("Numpy array data could not be read.");

        match npy.dtype() {
            DType::Plain(x) => match (x.type_char(), x.size_field()) {
                (TypeChar::Uint, 1) => Ok(CellImage::U8(CellBuffer::new(
                    w,
                    h,
                    c,
                    npy.into_vec().map_err(unreadable)?,
                )?)),
                (TypeChar::Uint, 2) => Ok(CellImage::U16(CellBuffer::new(
                    w,
                    h,
                    c,
                    npy.into_vec().map_err(unreadable)?,
                )?)),
                (TypeChar::Float, 4) => Ok(CellImage::F32(CellBuffer::new(
                    w,
                    h,
                    c,
                    npy.into_vec().map_err(unreadable)?,
                )?)),
                (TypeChar::Float, 8) => Ok(CellImage::F32(CellBuffer::new(
                    w,
                    h,
                    c,
                    npy.into_vec::<f64>()
                        .map_err(unreadable)?
                        .into_iter()
                        .map(|pixel| pixel as f32)
                        .collect(),
                )?)),
                _ => Err(CellgateError::ImageError(
                    "Numpy images must be uint8, uint16, float32 or float64.",
                )),
            },
            _ => Err(CellgateError::ImageError(
                "Only plain numpy arrays are currently supported.",
            )),
        }
    }

    /// Save image as a (height, width, channel) numpy array
    ///
    /// # Arguments
    ///
    /// * `path` - Path to output array
    pub fn save_as_numpy<P: AsRef<Path>>(&self, path: P) -> Result<(), CellgateError> {
        let shape = vec![
            self.height() as u64,
            self.width() as u64,
            self.channels() as u64,
        ];

        match self {
            CellImage::U8(buffer) => write_numpy(path, buffer.as_raw().to_vec(), shape),
            CellImage::U16(buffer) => write_numpy(path, buffer.as_raw().to_vec(), shape),
            CellImage::F32(buffer) => write_numpy(path, buffer.as_raw().to_vec(), shape),
        }
    }
}

// <<< I/O METHODS

// >>> PROPERTY METHODS

impl_enum_dispatch!(CellImage, U8, U16, F32; width(&self) -> u32);
impl_enum_dispatch!(CellImage, U8, U16, F32; height(&self) -> u32);
impl_enum_dispatch!(CellImage, U8, U16, F32; channels(&self) -> u32);
impl_enum_dispatch!(CellImage, U8, U16, F32; shape(&self) -> (u32, u32, u32));
impl_enum_dispatch!(CellImage, U8, U16, F32; len(&self) -> usize);
impl_enum_dispatch!(CellImage, U8, U16, F32; is_empty(&self) -> bool);

// <<< PROPERTY METHODS

// >>> TRANSFORM METHODS

impl CellImage {
    /// Pack the requested channels into the leading planes of a zeroed image
    ///
    /// See [`CellBuffer::pack_channels`] for the exact semantics.
    pub fn pack_channels(&self, channels: &[usize]) -> CellImage {
        match self {
            CellImage::U8(buffer) => CellImage::U8(buffer.pack_channels(channels)),
            CellImage::U16(buffer) => CellImage::U16(buffer.pack_channels(channels)),
            CellImage::F32(buffer) => CellImage::F32(buffer.pack_channels(channels)),
        }
    }
}

// <<< TRANSFORM METHODS

fn drop_alpha<T: Copy>(raw: Vec<T>, stride: usize) -> Vec<T> {
    raw.chunks_exact(stride)
        .flat_map(|pixel| pixel[..stride - 1].to_vec())
        .collect()
}
