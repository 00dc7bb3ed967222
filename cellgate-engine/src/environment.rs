// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::family::ModelFamily;

/// Interpreters of the isolated environments, one per model family
///
/// # Examples
///
/// ```
/// use cellgate_engine::{Environments, ModelFamily};
///
/// let environments = Environments::default()
///     .with_interpreter(ModelFamily::CellposeSam, "/opt/sam/bin/python");
///
/// assert!(environments.get(ModelFamily::CellposeSam).is_some());
/// assert!(environments.get(ModelFamily::Cellpose3).is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct Environments {
    interpreters: BTreeMap<ModelFamily, PathBuf>,
}

impl Environments {
    /// Register every family whose interpreter exists under the base directory
    ///
    /// # Arguments
    ///
    /// * `base` - Directory containing the `venv_v3` and `venv_v4` environments
    pub fn discover<P: AsRef<Path>>(base: P) -> Self {
        let mut environments = Environments::default();

        for family in ModelFamily::iter() {
            let interpreter = interpreter_path(base.as_ref(), family);

            if interpreter.is_file() {
                info!(%family, interpreter = %interpreter.display(), "Registered environment");
                environments.interpreters.insert(family, interpreter);
            } else {
                warn!(%family, interpreter = %interpreter.display(), "Environment not found");
            }
        }

        environments
    }

    /// Use an explicit interpreter for a family, replacing any discovered one
    pub fn with_interpreter<P: Into<PathBuf>>(mut self, family: ModelFamily, path: P) -> Self {
        self.insert(family, path);
        self
    }

    pub fn insert<P: Into<PathBuf>>(&mut self, family: ModelFamily, path: P) {
        self.interpreters.insert(family, path.into());
    }

    pub fn get(&self, family: ModelFamily) -> Option<&Path> {
        self.interpreters.get(&family).map(PathBuf::as_path)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ModelFamily, &Path)> {
        self.interpreters
            .iter()
            .map(|(family, path)| (*family, path.as_path()))
    }

    pub fn len(&self) -> usize {
        self.interpreters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interpreters.is_empty()
    }
}

/// Expected interpreter location of a family's environment
pub fn interpreter_path(base: &Path, family: ModelFamily) -> PathBuf {
    let venv = base.join(family.venv_dir());

    if cfg!(windows) {
        venv.join("Scripts").join("python.exe")
    } else {
        venv.join("bin").join("python")
    }
}

#[cfg(test)]
mod test {

    use super::*;

    #[test]
    fn test_discover_only_existing() {
        let base = tempfile::tempdir().unwrap();
        let interpreter = interpreter_path(base.path(), ModelFamily::CellposeSam);

        std::fs::create_dir_all(interpreter.parent().unwrap()).unwrap();
        std::fs::write(&interpreter, b"").unwrap();

        let environments = Environments::discover(base.path());

        assert_eq!(environments.len(), 1);
        assert_eq!(
            environments.get(ModelFamily::CellposeSam),
            Some(interpreter.as_path())
        );
        assert!(environments.get(ModelFamily::Cellpose3).is_none());
    }

    #[test]
    fn test_override_replaces_discovered() {
        let base = tempfile::tempdir().unwrap();
        let environments = Environments::discover(base.path())
            .with_interpreter(ModelFamily::Cellpose3, "/usr/bin/python3");

        assert_eq!(
            environments.get(ModelFamily::Cellpose3),
            Some(Path::new("/usr/bin/python3"))
        );
    }

    #[test]
    fn test_interpreter_layout() {
        let path = interpreter_path(Path::new("base"), ModelFamily::Cellpose3);

        assert!(path.starts_with(Path::new("base").join("venv_v3")));
    }
}
