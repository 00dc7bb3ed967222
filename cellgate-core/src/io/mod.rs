// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

mod npy;
mod overlay;
mod roi;

pub use npy::{is_numpy, is_pickled_numpy};
pub use npy::write_numpy;

pub use overlay::{read_overlay_tiff, write_overlay_tiff};

pub use roi::Roi;
pub use roi::{read_roi_zip, write_roi_zip};
