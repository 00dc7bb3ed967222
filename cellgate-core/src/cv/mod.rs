// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

pub mod contours;

pub use contours::{find_contours, find_labeled_contours, label_bounds};
