// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

pub mod request;
pub mod target;

pub use request::SegmentClient;
pub use target::Target;

/// Default address of a locally running gateway
pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
