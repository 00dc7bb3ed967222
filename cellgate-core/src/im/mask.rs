// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use image::DynamicImage;
use npyz::{self, DType, NpyFile, TypeChar};

use crate::constant::OUTLINE_MIN_POINTS;
use crate::cv::find_labeled_contours;
use crate::error::CellgateError;
use crate::im::{CellBuffer, Outlines};
use crate::io::is_numpy;

/// A row-major container storing integer-labeled mask pixels
///
/// Each unique non-zero value identifies one object instance and zero is
/// background. Masks of any unsigned or signed integer width are widened
/// to u32 on load.
///
/// # Examples
///
/// ```
/// use cellgate_core::im::CellMask;
///
/// let mask = CellMask::new(2, 2, 1, vec![0u32, 3, 3, 0]).unwrap();
/// assert_eq!(mask.labels(), vec![3]);
/// ```
pub type CellMask = CellBuffer<u32, Vec<u32>>;

// >>> I/O METHODS

impl CellMask {
    /// Open a new mask from a provided path
    ///
    /// # Arguments
    ///
    /// * `path` - A path to a plain numpy label array or a grayscale image
    ///
    /// ```no_run
    /// use cellgate_core::im::CellMask;
    /// let mask = CellMask::open("masks.npy");
    /// ```
    pub fn open<P: AsRef<Path>>(path: P) -> Result<CellMask, CellgateError> {
        let bytes = std::fs::read(&path)
            .map_err(|err| CellgateError::NoFileError(err.to_string()))?;

        if is_numpy(&bytes) {
            let npy = NpyFile::new(&bytes[..])
                .map_err(|err| CellgateError::ImageReadError(err.to_string()))?;
            return Self::new_from_numpy(npy);
        }

        let image = image::load_from_memory(&bytes)
            .map_err(|err| CellgateError::ImageReadError(err.to_string()))?;

        Self::new_from_dynamic(image)
    }

    /// Initialize a new mask from a DynamicImage
    ///
    /// # Arguments
    ///
    /// * `mask` - An 8 or 16-bit grayscale DynamicImage
    pub fn new_from_dynamic(mask: DynamicImage) -> Result<CellMask, CellgateError> {
        let width = mask.width();
        let height = mask.height();

        match mask {
            DynamicImage::ImageLuma8(buffer) => CellMask::new(
                width,
                height,
                1,
                buffer.into_raw().into_iter().map(u32::from).collect(),
            ),
            DynamicImage::ImageLuma16(buffer) => CellMask::new(
                width,
                height,
                1,
                buffer.into_raw().into_iter().map(u32::from).collect(),
            ),
            _ => Err(CellgateError::MaskFormatError),
        }
    }

    /// Initialize a new mask from a numpy array buffer
    ///
    /// Singleton leading or trailing axes (e.g. (1, H, W) or (H, W, 1)) are
    /// squeezed. Pickled object arrays, such as full segmentation dictionaries,
    /// are rejected.
    ///
    /// # Arguments
    ///
    /// * `npy` - An (H, W) shaped numpy integer array
    pub fn new_from_numpy(npy: NpyFile<&[u8]>) -> Result<CellMask, CellgateError> {
        let dims = npy.shape().to_vec();

        let shape: Vec<u64> = if dims.len() == 2 {
            dims
        } else {
            dims.into_iter().filter(|&d| d != 1).collect()
        };

        if shape.len() != 2 {
            return Err(CellgateError::MaskError(
                "Numpy array masks must have an (H, W) shape.",
            ));
        }

        let (h, w) = (shape[0] as u32, shape[1] as u32);

        let unreadable = |_| CellgateError::MaskError("Numpy mask data could not be read.");

        let buffer: Vec<u32> = match npy.dtype() {
            DType::Plain(x) => match (x.type_char(), x.size_field()) {
                (TypeChar::Uint, 1) => widen(npy.into_vec::<u8>().map_err(unreadable)?),
                (TypeChar::Uint, 2) => widen(npy.into_vec::<u16>().map_err(unreadable)?),
                (TypeChar::Uint, 4) => npy.into_vec::<u32>().map_err(unreadable)?,
                (TypeChar::Int, 4) => clamp_signed(npy.into_vec::<i32>().map_err(unreadable)?),
                (TypeChar::Int, 8) => clamp_signed(npy.into_vec::<i64>().map_err(unreadable)?),
                _ => return Err(CellgateError::MaskFormatError),
            },
            _ => {
                return Err(CellgateError::MaskError(
                    "Only plain numpy mask arrays are currently supported.",
                ));
            }
        };

        CellMask::new(w, h, 1, buffer)
    }
}

// <<< I/O METHODS

// >>> TRANSFORM METHODS

impl CellMask {
    /// Unique non-zero labels in ascending order
    pub fn labels(&self) -> Vec<u32> {
        self.iter()
            .filter(|&&x| x != 0)
            .copied()
            .collect::<BTreeSet<u32>>()
            .into_iter()
            .collect()
    }

    /// Trace one outline per labeled object
    ///
    /// Every label gets an entry in ascending order. Objects whose longest
    /// outer border has four points or fewer get an empty outline, which
    /// formats as an empty line so later objects keep their line numbers.
    pub fn outlines(&self) -> (Vec<u32>, Outlines) {
        let labels = self.labels();
        let (traced, contours) =
            find_labeled_contours(self.width(), self.height(), self.as_raw(), &labels);

        let mut traced: BTreeMap<u32, Vec<[f32; 2]>> = traced.into_iter().zip(contours).collect();

        let outlines = labels
            .iter()
            .map(|label| {
                traced
                    .remove(label)
                    .filter(|contour| contour.len() > OUTLINE_MIN_POINTS)
                    .unwrap_or_default()
            })
            .collect();

        (labels, Outlines::new(outlines))
    }
}

// <<< TRANSFORM METHODS

fn widen<T: Into<u32>>(values: Vec<T>) -> Vec<u32> {
    values.into_iter().map(Into::into).collect()
}

fn clamp_signed<T: TryInto<u32>>(values: Vec<T>) -> Vec<u32> {
    values
        .into_iter()
        .map(|value| value.try_into().unwrap_or(0))
        .collect()
}
