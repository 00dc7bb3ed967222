// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

pub mod download;
pub mod engine;
pub mod logging;
pub mod models;
pub mod segment;
pub mod serve;
pub mod utils;
pub mod worker;
