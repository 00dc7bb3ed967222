// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

mod buffer;
mod image;
mod mask;
mod outlines;

pub use buffer::CellBuffer;
pub use buffer::select_channels;
pub use image::CellImage;

pub use mask::CellMask;

pub use outlines::Outlines;
pub use outlines::{format_outline, parse_roi_lines, read_outlines_json, write_outlines_json};
