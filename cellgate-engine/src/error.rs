// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::PathBuf;
use std::time::Duration;

use cellgate_core::error::CellgateError;
use thiserror::Error;

use crate::family::ModelFamily;

/// Failures of a single segmentation dispatch
///
/// The display strings are the exact bodies returned to HTTP clients.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Server Error: Model misconfigured.")]
    Misconfigured(ModelFamily),

    #[error("Server Error: No environment configured.")]
    NoEnvironment,

    #[error("Model file missing: {}", .0.display())]
    ModelMissing(PathBuf),

    #[error("Processing timed out.")]
    Timeout(Duration),

    #[error("Internal Worker Error")]
    Crashed(Option<i32>),

    #[error("{0}")]
    Engine(String),

    #[error("{0}")]
    Image(#[from] CellgateError),

    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Join(#[from] tokio::task::JoinError),
}

impl DispatchError {
    /// HTTP status code reported for this failure
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::Timeout(_) => 504,
            _ => 500,
        }
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_client_messages() {
        assert_eq!(
            DispatchError::Misconfigured(ModelFamily::CellposeSam).to_string(),
            "Server Error: Model misconfigured."
        );
        assert_eq!(
            DispatchError::ModelMissing(PathBuf::from("models/CellposeSAM/x")).to_string(),
            "Model file missing: models/CellposeSAM/x"
        );
        assert_eq!(DispatchError::Crashed(Some(1)).to_string(), "Internal Worker Error");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(DispatchError::Timeout(Duration::from_secs(1)).status_code(), 504);
        assert_eq!(DispatchError::Engine("boom".to_string()).status_code(), 500);
    }
}
