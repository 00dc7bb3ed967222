// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

pub mod channels;
pub mod dispatch;
pub mod envelope;
pub mod environment;
pub mod error;
pub mod family;
pub mod params;
pub mod registry;

pub use dispatch::Dispatcher;
pub use envelope::Envelope;
pub use environment::Environments;
pub use error::DispatchError;
pub use family::ModelFamily;
pub use params::SegmentParams;
pub use registry::{ModelSource, list_models, resolve};

/// Environment variable pointing the segmentation library at local model files
pub const MODELS_PATH_ENV: &str = "CELLPOSE_LOCAL_MODELS_PATH";

/// Default engine timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 600;
