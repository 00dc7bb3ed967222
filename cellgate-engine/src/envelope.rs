// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use serde::{Deserialize, Serialize};

use crate::error::DispatchError;

/// The one-line JSON status reply exchanged with engines and workers
///
/// # Examples
///
/// ```
/// use cellgate_engine::Envelope;
///
/// let envelope = Envelope::from_stdout("loading...\n{\"status\": \"error\", \"message\": \"boom\"}\n").unwrap();
/// assert_eq!(envelope, Envelope::Error { message: "boom".to_string() });
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Envelope {
    Success {
        #[serde(default)]
        data: String,
    },
    Error {
        message: String,
    },
}

impl Envelope {
    /// Parse the last non-empty line of captured standard output
    pub fn from_stdout(stdout: &str) -> Result<Envelope, DispatchError> {
        let line = stdout
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .ok_or_else(|| DispatchError::Engine("Engine produced no output".to_string()))?;

        serde_json::from_str(line)
            .map_err(|err| DispatchError::Engine(format!("Unreadable engine reply: {}", err)))
    }

    pub fn to_line(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"status":"error","message":"Reply could not be serialized"}"#.to_string()
        })
    }
}

impl From<Result<String, DispatchError>> for Envelope {
    fn from(result: Result<String, DispatchError>) -> Self {
        match result {
            Ok(data) => Envelope::Success { data },
            Err(err) => Envelope::Error {
                message: err.to_string(),
            },
        }
    }
}
