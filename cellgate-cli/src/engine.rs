// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use cellgate_core::ut::path::default_base_dir;
use cellgate_engine::{DEFAULT_TIMEOUT_SECS, Dispatcher, Environments, ModelFamily};

/// Locations of the isolated environments, models and engine script
#[derive(Debug, Clone, Args)]
pub struct EngineArgs {
    #[arg(
        long,
        help = "Base directory with models/, venv_v3/, venv_v4/ and scripts/. Defaults to $CELLGATE_HOME or ~/.cellgate."
    )]
    pub base_dir: Option<PathBuf>,

    #[arg(long, help = "Python interpreter of the Cellpose 3.1 environment.")]
    pub python_v3: Option<PathBuf>,

    #[arg(long, help = "Python interpreter of the CellposeSAM environment.")]
    pub python_sam: Option<PathBuf>,

    #[arg(long, help = "Engine script run inside each environment.")]
    pub engine: Option<PathBuf>,

    #[arg(long, help = "Directory holding one model subdirectory per family.")]
    pub models_dir: Option<PathBuf>,

    #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECS, help = "Engine timeout in seconds.")]
    pub timeout: u64,
}

impl EngineArgs {
    pub fn base_dir(&self) -> PathBuf {
        self.base_dir.clone().unwrap_or_else(default_base_dir)
    }

    pub fn models_dir(&self) -> PathBuf {
        self.models_dir
            .clone()
            .unwrap_or_else(|| self.base_dir().join("models"))
    }

    pub fn engine_script(&self) -> PathBuf {
        self.engine.clone().unwrap_or_else(|| {
            self.base_dir()
                .join("scripts")
                .join("cellpose_engine.py")
        })
    }

    /// Discovered environments with any explicit interpreters applied on top
    pub fn environments(&self) -> Environments {
        let mut environments = Environments::discover(self.base_dir());

        if let Some(python) = &self.python_v3 {
            environments.insert(ModelFamily::Cellpose3, python);
        }

        if let Some(python) = &self.python_sam {
            environments.insert(ModelFamily::CellposeSam, python);
        }

        environments
    }

    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher::new(
            self.environments(),
            self.models_dir(),
            self.engine_script(),
        )
        .with_timeout(Duration::from_secs(self.timeout))
    }
}
