// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

use std::path::Path;

use npyz::{self, WriterBuilder};

use crate::error::CellgateError;

const NUMPY_MAGIC: &[u8; 6] = b"\x93NUMPY";

/// Write a numpy file from a vector of specified shape
///
/// # Arguments
///
/// * `path` - Path to output numpy file
/// * `data` - Vector of numeric type
/// * `shape` - Shape of the vector (shape product must equal length of data)
///
/// # Examples
///
/// ```no_run
/// use cellgate_core::io::write_numpy;
/// write_numpy("mask.npy", vec![0u32, 1, 1, 0], vec![2, 2]).unwrap();
/// ```
pub fn write_numpy<T, P: AsRef<Path>>(
    path: P,
    data: Vec<T>,
    shape: Vec<u64>,
) -> Result<(), CellgateError>
where
    T: npyz::Serialize + npyz::AutoSerialize,
{
    if shape.iter().product::<u64>() != data.len() as u64 {
        return Err(CellgateError::BufferSizeError);
    }

    let mut buffer = vec![];
    let mut writer = npyz::WriteOptions::<T>::new()
        .default_dtype()
        .shape(&shape)
        .writer(&mut buffer)
        .begin_nd()
        .map_err(|_| CellgateError::ImageWriteError)?;

    writer
        .extend(data)
        .map_err(|_| CellgateError::ImageWriteError)?;

    writer.finish().map_err(|_| CellgateError::ImageWriteError)?;
    std::fs::write(path, buffer).map_err(|_| CellgateError::ImageWriteError)?;
    Ok(())
}

/// Check whether raw bytes start with the numpy format magic string
pub fn is_numpy(bytes: &[u8]) -> bool {
    bytes.starts_with(NUMPY_MAGIC)
}

/// Check whether numpy bytes hold an object array, e.g. a pickled dictionary
///
/// Object arrays need a python interpreter to unpickle, so they cannot be read
/// as plain label masks.
pub fn is_pickled_numpy(bytes: &[u8]) -> bool {
    if !is_numpy(bytes) {
        return false;
    }

    // Version 1 headers store a u16 length, later versions a u32
    let header = match bytes.get(6) {
        Some(1) => bytes
            .get(8..10)
            .map(|len| (10, u16::from_le_bytes([len[0], len[1]]) as usize)),
        Some(_) => bytes
            .get(8..12)
            .map(|len| (12, u32::from_le_bytes([len[0], len[1], len[2], len[3]]) as usize)),
        None => None,
    };

    header
        .and_then(|(start, len)| bytes.get(start..start + len))
        .is_some_and(|header| String::from_utf8_lossy(header).contains("'|O'"))
}
