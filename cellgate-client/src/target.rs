// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::fmt;
use std::str::FromStr;

use anyhow::{Context, anyhow};
use cellgate_engine::ModelFamily;

/// An output folder paired with the model whose outlines it receives
///
/// Parsed from `folder=ModelType:model_name`.
///
/// # Examples
///
/// ```
/// use cellgate_client::Target;
/// use cellgate_engine::ModelFamily;
///
/// let target: Target = "sam=CellposeSAM:cpsam".parse().unwrap();
///
/// assert_eq!(target.folder, "sam");
/// assert_eq!(target.model_type, ModelFamily::CellposeSam);
/// assert_eq!(target.model_name, "cpsam");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub folder: String,
    pub model_type: ModelFamily,
    pub model_name: String,
}

impl Target {
    pub fn new<F: Into<String>, N: Into<String>>(
        folder: F,
        model_type: ModelFamily,
        model_name: N,
    ) -> Self {
        Self {
            folder: folder.into(),
            model_type,
            model_name: model_name.into(),
        }
    }

    /// The targets used when none are given
    pub fn defaults() -> Vec<Target> {
        vec![
            Target::new("sam", ModelFamily::CellposeSam, "cpsam"),
            Target::new("cyto3", ModelFamily::Cellpose3, "cyto3"),
        ]
    }
}

impl FromStr for Target {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (folder, model) = s
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected folder=ModelType:model_name, got '{}'", s))?;

        let (model_type, model_name) = model
            .rsplit_once(':')
            .ok_or_else(|| anyhow!("Expected ModelType:model_name, got '{}'", model))?;

        let folder = folder.trim();
        let model_name = model_name.trim();

        if folder.is_empty() || folder.contains(['/', '\\']) || folder == "original" {
            return Err(anyhow!("Invalid output folder '{}'", folder));
        }

        if model_name.is_empty() {
            return Err(anyhow!("Missing model name in '{}'", s));
        }

        let model_type = model_type
            .trim()
            .parse::<ModelFamily>()
            .map_err(|err| anyhow!(err))
            .context("Invalid target model type")?;

        Ok(Target::new(folder, model_type, model_name))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}={}:{}", self.folder, self.model_type, self.model_name)
    }
}
