// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::fmt;

#[derive(Debug, Clone)]
pub enum CellgateError {
    BufferSizeError,
    ImageError(&'static str),
    ImageReadError(String),
    ImageWriteError,
    MaskError(&'static str),
    MaskFormatError,
    OutlinesReadError,
    OutlinesWriteError,
    OverlayWriteError(String),
    OverlayReadError(String),
    RoiEncodeError(String),
    RoiDecodeError(String),
    ZipError(String),
    NoFileError(String),
    DirError(String),
}

impl fmt::Display for CellgateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CellgateError::BufferSizeError => {
                write!(
                    f,
                    "[cellgate::BufferSizeError] The buffer does not match provided size"
                )
            }
            CellgateError::ImageError(message) => {
                write!(
                    f,
                    "[cellgate::ImageError] Failed to create image. {}",
                    message
                )
            }
            CellgateError::ImageReadError(message) => {
                write!(
                    f,
                    "[cellgate::ImageReadError] Could not read image file. {}",
                    message
                )
            }
            CellgateError::ImageWriteError => {
                write!(f, "[cellgate::ImageWriteError] Failed to write image.")
            }
            CellgateError::MaskError(message) => {
                write!(f, "[cellgate::MaskError] Failed to create mask. {}", message)
            }
            CellgateError::MaskFormatError => {
                write!(
                    f,
                    "[cellgate::MaskFormatError] Only 1-channel integer masks are currently supported."
                )
            }
            CellgateError::OutlinesReadError => {
                write!(f, "[cellgate::OutlinesReadError] Outlines could not be read.")
            }
            CellgateError::OutlinesWriteError => {
                write!(
                    f,
                    "[cellgate::OutlinesWriteError] Failed to successfully write outlines to output."
                )
            }
            CellgateError::OverlayWriteError(message) => {
                write!(
                    f,
                    "[cellgate::OverlayWriteError] Failed to write overlay tiff. {}.",
                    message
                )
            }
            CellgateError::OverlayReadError(message) => {
                write!(
                    f,
                    "[cellgate::OverlayReadError] Failed to read overlay tiff. {}.",
                    message
                )
            }
            CellgateError::RoiEncodeError(message) => {
                write!(
                    f,
                    "[cellgate::RoiEncodeError] Failed to encode roi. {}.",
                    message
                )
            }
            CellgateError::RoiDecodeError(message) => {
                write!(
                    f,
                    "[cellgate::RoiDecodeError] Failed to decode roi. {}.",
                    message
                )
            }
            CellgateError::ZipError(message) => {
                write!(f, "[cellgate::ZipError] Roi archive failed. {}.", message)
            }
            CellgateError::NoFileError(message) => {
                write!(
                    f,
                    "[cellgate::NoFileError] File could not be found. {}.",
                    message
                )
            }
            CellgateError::DirError(message) => {
                write!(
                    f,
                    "[cellgate::DirError] Directory could not be read. {}.",
                    message
                )
            }
        }
    }
}

impl std::error::Error for CellgateError {}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_overlay_error_display() {
        let err = CellgateError::OverlayReadError("Empty byte counts".to_string());
        assert_eq!(
            err.to_string(),
            "[cellgate::OverlayReadError] Failed to read overlay tiff. Empty byte counts."
        );

        let err: Box<dyn std::error::Error> =
            Box::new(CellgateError::OverlayWriteError("disk full".to_string()));
        assert!(err.to_string().starts_with("[cellgate::OverlayWriteError]"));
    }
}
