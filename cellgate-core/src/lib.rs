// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

pub mod constant;
pub mod cv;
pub mod error;
pub mod im;
pub mod io;
pub mod ut;
