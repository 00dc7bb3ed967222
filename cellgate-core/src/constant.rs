// Copyright (c) 2025, Tom Ouellette
// Licensed under the BSD 3-Clause License

// Mask inputs accepted by the outline converters
pub const SUPPORTED_MASK_FORMATS: [&str; 6] = ["npy", "png", "tif", "tiff", "bmp", "pgm"];

// Microscopy stacks picked up by the batch segmentation client
pub const BATCH_IMAGE_FORMATS: [&str; 2] = ["tif", "tiff"];

// Outlines with this many points or fewer are written as empty lines
pub const OUTLINE_MIN_POINTS: usize = 4;

// Outline outputs
pub const SUPPORTED_OUTLINE_FORMATS: [&str; 2] = ["txt", "json"];

// The valid json keys indicating polygon values
pub const POLYGON_JSON_VALID_KEYS: [&str; 5] =
    ["polygons", "contours", "outlines", "shapes", "points"];

// ImageJ roi header layout
pub const ROI_MAGIC: &[u8; 4] = b"Iout";
pub const ROI_VERSION: u16 = 228;
pub const ROI_HEADER_SIZE: usize = 64;
pub const ROI_HEADER2_SIZE: usize = 64;
pub const ROI_TYPE_POLYGON: u8 = 0;
pub const ROI_MAX_POINTS: usize = u16::MAX as usize;

// ImageJ roi option bits
pub const ROI_OPTION_OVERLAY_LABELS: u16 = 8;
pub const ROI_OPTION_OVERLAY_NAMES: u16 = 16;
pub const ROI_OPTION_SUB_PIXEL_RESOLUTION: u16 = 128;
pub const ROI_OPTION_SHOW_LABELS: u16 = 1024;

// ImageJ metadata tags carrying overlay rois
pub const IJ_METADATA_BYTE_COUNTS_TAG: u16 = 50838;
pub const IJ_METADATA_TAG: u16 = 50839;
pub const IJ_METADATA_MAGIC: &[u8; 4] = b"IJIJ";
pub const IJ_OVERLAY_TYPE: &[u8; 4] = b"over";

// Environment variable overriding the service base directory
pub const HOME_ENV: &str = "CELLGATE_HOME";
