// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Segmentation library generations served from separate environments
///
/// # Examples
///
/// ```
/// use cellgate_engine::ModelFamily;
///
/// let family: ModelFamily = "CellposeSAM".parse().unwrap();
///
/// assert_eq!(family.builtin(), "cpsam");
/// assert_eq!(family.to_string(), "CellposeSAM");
/// assert!("Cellpose2".parse::<ModelFamily>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ModelFamily {
    #[serde(rename = "Cellpose3.1")]
    Cellpose3,
    #[serde(rename = "CellposeSAM")]
    CellposeSam,
}

impl ModelFamily {
    pub const ALL: [ModelFamily; 2] = [ModelFamily::Cellpose3, ModelFamily::CellposeSam];

    /// Name used on the wire and in model listings
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelFamily::Cellpose3 => "Cellpose3.1",
            ModelFamily::CellposeSam => "CellposeSAM",
        }
    }

    /// Subdirectory of the models directory holding custom weights
    pub fn dir_name(&self) -> &'static str {
        match self {
            ModelFamily::Cellpose3 => "Cellpose 3.1",
            ModelFamily::CellposeSam => "CellposeSAM",
        }
    }

    /// Model name that refers to the library's built-in weights
    pub fn builtin(&self) -> &'static str {
        match self {
            ModelFamily::Cellpose3 => "cyto3",
            ModelFamily::CellposeSam => "cpsam",
        }
    }

    /// Virtual environment directory under the base directory
    pub fn venv_dir(&self) -> &'static str {
        match self {
            ModelFamily::Cellpose3 => "venv_v3",
            ModelFamily::CellposeSam => "venv_v4",
        }
    }

    pub fn iter() -> impl Iterator<Item = ModelFamily> {
        Self::ALL.into_iter()
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelFamily::iter()
            .find(|family| family.as_str() == s)
            .ok_or_else(|| {
                format!(
                    "Unknown model type '{}'. Expected one of: {}",
                    s,
                    ModelFamily::iter()
                        .map(|family| family.as_str())
                        .collect::<Vec<_>>()
                        .join(", ")
                )
            })
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_serde_wire_names() {
        assert_eq!(
            serde_json::to_string(&ModelFamily::Cellpose3).unwrap(),
            "\"Cellpose3.1\""
        );

        let family: ModelFamily = serde_json::from_str("\"CellposeSAM\"").unwrap();
        assert_eq!(family, ModelFamily::CellposeSam);

        assert!(serde_json::from_str::<ModelFamily>("\"cellposesam\"").is_err());
    }

    #[test]
    fn test_family_layout() {
        assert_eq!(ModelFamily::Cellpose3.dir_name(), "Cellpose 3.1");
        assert_eq!(ModelFamily::Cellpose3.venv_dir(), "venv_v3");
        assert_eq!(ModelFamily::CellposeSam.venv_dir(), "venv_v4");
    }
}
