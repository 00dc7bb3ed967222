// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use zip::write::ExtendedFileOptions;

use crate::constant::{
    ROI_HEADER_SIZE, ROI_HEADER2_SIZE, ROI_MAGIC, ROI_MAX_POINTS, ROI_OPTION_OVERLAY_LABELS,
    ROI_OPTION_OVERLAY_NAMES, ROI_OPTION_SHOW_LABELS, ROI_OPTION_SUB_PIXEL_RESOLUTION,
    ROI_TYPE_POLYGON, ROI_VERSION,
};
use crate::error::CellgateError;

// Offsets into the fixed header
const VERSION: usize = 4;
const TYPE: usize = 6;
const TOP: usize = 8;
const LEFT: usize = 10;
const BOTTOM: usize = 12;
const RIGHT: usize = 14;
const N_COORDINATES: usize = 16;
const OPTIONS: usize = 50;
const HEADER2_OFFSET: usize = 60;

// Offsets into the second header
const NAME_OFFSET: usize = 16;
const NAME_LENGTH: usize = 20;

// Sub-pixel coordinates were introduced with this header version
const SUB_PIXEL_MIN_VERSION: u16 = 222;

/// A named polygon region of interest in ImageJ's binary overlay format
///
/// # Examples
///
/// ```
/// use cellgate_core::io::Roi;
///
/// let roi = Roi::new("roi_0001", vec![[1.0, 1.0], [4.0, 1.0], [4.0, 3.0]]);
/// let bytes = roi.to_bytes().unwrap();
///
/// assert_eq!(&bytes[..4], b"Iout");
/// assert_eq!(Roi::from_bytes(&bytes).unwrap(), roi);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub name: String,
    pub points: Vec<[f32; 2]>,
}

impl Roi {
    pub fn new<S: Into<String>>(name: S, points: Vec<[f32; 2]>) -> Self {
        Self {
            name: name.into(),
            points,
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Encode as a polygon `.roi` record
    ///
    /// Integer coordinates are always written relative to the bounding box.
    /// Float coordinates follow when any point is not on the pixel grid. The
    /// label and name display options are left cleared.
    pub fn to_bytes(&self) -> Result<Vec<u8>, CellgateError> {
        let n = self.points.len();

        if n == 0 {
            return Err(CellgateError::RoiEncodeError(
                "A polygon needs at least one point".to_string(),
            ));
        }

        if n > ROI_MAX_POINTS {
            return Err(CellgateError::RoiEncodeError(format!(
                "{} points exceeds the {} point limit",
                n, ROI_MAX_POINTS
            )));
        }

        let (mut min_x, mut min_y) = (f32::INFINITY, f32::INFINITY);
        let (mut max_x, mut max_y) = (f32::NEG_INFINITY, f32::NEG_INFINITY);

        for &[x, y] in &self.points {
            if !x.is_finite() || !y.is_finite() {
                return Err(CellgateError::RoiEncodeError(
                    "Coordinates must be finite".to_string(),
                ));
            }
            min_x = min_x.min(x);
            min_y = min_y.min(y);
            max_x = max_x.max(x);
            max_y = max_y.max(y);
        }

        let left = to_i16(min_x.floor())?;
        let top = to_i16(min_y.floor())?;
        let right = to_i16(max_x.ceil())?;
        let bottom = to_i16(max_y.ceil())?;

        let sub_pixel = self
            .points
            .iter()
            .any(|&[x, y]| x.fract() != 0.0 || y.fract() != 0.0);

        let mut options: u16 = if sub_pixel {
            ROI_OPTION_SUB_PIXEL_RESOLUTION
        } else {
            0
        };
        options &= !(ROI_OPTION_SHOW_LABELS | ROI_OPTION_OVERLAY_LABELS | ROI_OPTION_OVERLAY_NAMES);

        let coordinates_size = n * 4 + if sub_pixel { n * 8 } else { 0 };
        let header2_offset = ROI_HEADER_SIZE + coordinates_size;
        let name_offset = header2_offset + ROI_HEADER2_SIZE;
        let name: Vec<u16> = self.name.encode_utf16().collect();

        let mut bytes = vec![0u8; name_offset + name.len() * 2];

        bytes[..4].copy_from_slice(ROI_MAGIC);
        put(&mut bytes, VERSION, &ROI_VERSION.to_be_bytes());
        bytes[TYPE] = ROI_TYPE_POLYGON;
        put(&mut bytes, TOP, &top.to_be_bytes());
        put(&mut bytes, LEFT, &left.to_be_bytes());
        put(&mut bytes, BOTTOM, &bottom.to_be_bytes());
        put(&mut bytes, RIGHT, &right.to_be_bytes());
        put(&mut bytes, N_COORDINATES, &(n as u16).to_be_bytes());
        put(&mut bytes, OPTIONS, &options.to_be_bytes());
        put(&mut bytes, HEADER2_OFFSET, &(header2_offset as i32).to_be_bytes());

        let xs = ROI_HEADER_SIZE;
        let ys = xs + n * 2;

        for (i, &[x, y]) in self.points.iter().enumerate() {
            let rx = (x.floor() as i32 - left as i32) as i16;
            let ry = (y.floor() as i32 - top as i32) as i16;
            put(&mut bytes, xs + i * 2, &rx.to_be_bytes());
            put(&mut bytes, ys + i * 2, &ry.to_be_bytes());
        }

        if sub_pixel {
            let fxs = ys + n * 2;
            let fys = fxs + n * 4;

            for (i, &[x, y]) in self.points.iter().enumerate() {
                put(&mut bytes, fxs + i * 4, &x.to_be_bytes());
                put(&mut bytes, fys + i * 4, &y.to_be_bytes());
            }
        }

        put(
            &mut bytes,
            header2_offset + NAME_OFFSET,
            &(name_offset as i32).to_be_bytes(),
        );
        put(
            &mut bytes,
            header2_offset + NAME_LENGTH,
            &(name.len() as i32).to_be_bytes(),
        );

        for (i, unit) in name.iter().enumerate() {
            put(&mut bytes, name_offset + i * 2, &unit.to_be_bytes());
        }

        Ok(bytes)
    }

    /// Decode a `.roi` record holding point coordinates
    ///
    /// Rectangle and oval records carry no coordinates and are rejected.
    pub fn from_bytes(bytes: &[u8]) -> Result<Roi, CellgateError> {
        if bytes.len() < ROI_HEADER_SIZE || &bytes[..4] != ROI_MAGIC {
            return Err(CellgateError::RoiDecodeError(
                "Missing Iout header".to_string(),
            ));
        }

        let version = read_u16(bytes, VERSION)?;
        let roi_type = bytes[TYPE];

        if matches!(roi_type, 1 | 2 | 6) {
            return Err(CellgateError::RoiDecodeError(format!(
                "Roi type {} has no polygon coordinates",
                roi_type
            )));
        }

        let top = read_u16(bytes, TOP)? as i16 as f32;
        let left = read_u16(bytes, LEFT)? as i16 as f32;
        let n = read_u16(bytes, N_COORDINATES)? as usize;
        let options = read_u16(bytes, OPTIONS)?;

        let xs = ROI_HEADER_SIZE;
        let ys = xs + n * 2;

        let sub_pixel =
            options & ROI_OPTION_SUB_PIXEL_RESOLUTION != 0 && version >= SUB_PIXEL_MIN_VERSION;

        let points = if sub_pixel {
            let fxs = ys + n * 2;
            let fys = fxs + n * 4;
            (0..n)
                .map(|i| Ok([read_f32(bytes, fxs + i * 4)?, read_f32(bytes, fys + i * 4)?]))
                .collect::<Result<Vec<[f32; 2]>, CellgateError>>()?
        } else {
            (0..n)
                .map(|i| {
                    Ok([
                        read_u16(bytes, xs + i * 2)? as i16 as f32 + left,
                        read_u16(bytes, ys + i * 2)? as i16 as f32 + top,
                    ])
                })
                .collect::<Result<Vec<[f32; 2]>, CellgateError>>()?
        };

        Ok(Roi {
            name: read_name(bytes).unwrap_or_default(),
            points,
        })
    }
}

fn to_i16(value: f32) -> Result<i16, CellgateError> {
    if value < i16::MIN as f32 || value > i16::MAX as f32 {
        return Err(CellgateError::RoiEncodeError(format!(
            "Coordinate {} is outside the 16-bit range",
            value
        )));
    }
    Ok(value as i16)
}

fn put(bytes: &mut [u8], offset: usize, value: &[u8]) {
    bytes[offset..offset + value.len()].copy_from_slice(value);
}

fn field<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], CellgateError> {
    bytes
        .get(offset..offset + N)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| CellgateError::RoiDecodeError(format!("Truncated at byte {}", offset)))
}

fn read_u16(bytes: &[u8], offset: usize) -> Result<u16, CellgateError> {
    Ok(u16::from_be_bytes(field::<2>(bytes, offset)?))
}

fn read_i32(bytes: &[u8], offset: usize) -> Result<i32, CellgateError> {
    Ok(i32::from_be_bytes(field::<4>(bytes, offset)?))
}

fn read_f32(bytes: &[u8], offset: usize) -> Result<f32, CellgateError> {
    Ok(f32::from_be_bytes(field::<4>(bytes, offset)?))
}

fn read_name(bytes: &[u8]) -> Option<String> {
    let header2 = read_i32(bytes, HEADER2_OFFSET).ok()?;

    if header2 <= 0 {
        return None;
    }

    let header2 = header2 as usize;
    let offset = read_i32(bytes, header2 + NAME_OFFSET).ok()?;
    let length = read_i32(bytes, header2 + NAME_LENGTH).ok()?;

    if offset <= 0 || length <= 0 {
        return None;
    }

    let units = (0..length as usize)
        .map(|i| read_u16(bytes, offset as usize + i * 2).ok())
        .collect::<Option<Vec<u16>>>()?;

    String::from_utf16(&units).ok()
}

/// Write regions of interest to an ImageJ-compatible zip archive
///
/// Each region becomes a `<name>.roi` entry. Nothing is written when there
/// are no regions.
///
/// # Arguments
///
/// * `path` - Path to output archive
/// * `rois` - Regions to archive
pub fn write_roi_zip<P: AsRef<Path>>(path: P, rois: &[Roi]) -> Result<(), CellgateError> {
    if rois.is_empty() {
        return Ok(());
    }

    let file = io::BufWriter::new(
        File::create(path).map_err(|err| CellgateError::ZipError(err.to_string()))?,
    );

    let mut zip = zip::ZipWriter::new(file);

    for roi in rois {
        let bytes = roi.to_bytes()?;

        zip.start_file::<_, ExtendedFileOptions>(format!("{}.roi", roi.name), Default::default())
            .map_err(|err| CellgateError::ZipError(err.to_string()))?;

        zip.write_all(&bytes)
            .map_err(|err| CellgateError::ZipError(err.to_string()))?;
    }

    zip.finish()
        .map_err(|err| CellgateError::ZipError(err.to_string()))?;

    Ok(())
}

/// Read every `.roi` entry from a zip archive in archive order
pub fn read_roi_zip<P: AsRef<Path>>(path: P) -> Result<Vec<Roi>, CellgateError> {
    let file = File::open(path).map_err(|err| CellgateError::NoFileError(err.to_string()))?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| CellgateError::ZipError(err.to_string()))?;

    let mut rois = Vec::with_capacity(archive.len());

    for idx in 0..archive.len() {
        let mut entry = archive
            .by_index(idx)
            .map_err(|err| CellgateError::ZipError(err.to_string()))?;

        let Some(stem) = entry.name().strip_suffix(".roi").map(str::to_string) else {
            continue;
        };

        let mut bytes = Vec::with_capacity(entry.size() as usize);
        entry
            .read_to_end(&mut bytes)
            .map_err(|err| CellgateError::ZipError(err.to_string()))?;

        let mut roi = Roi::from_bytes(&bytes)?;
        if roi.name.is_empty() {
            roi.name = stem;
        }

        rois.push(roi);
    }

    Ok(rois)
}
