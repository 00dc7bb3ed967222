// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use tracing::{debug, error};

use crate::error::DispatchError;
use crate::family::ModelFamily;

/// Where a family loads its weights from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    Builtin(&'static str),
    Custom(PathBuf),
}

/// List the custom models available to each family
///
/// Every family is present in the listing. A missing or unreadable family
/// directory yields an empty list.
///
/// # Arguments
///
/// * `models_dir` - Directory holding one subdirectory per family
///
/// # Examples
///
/// ```
/// use cellgate_engine::{ModelFamily, list_models};
///
/// let listing = list_models(std::path::Path::new("does/not/exist"));
///
/// assert!(listing[&ModelFamily::Cellpose3].is_empty());
/// assert_eq!(
///     serde_json::to_string(&listing).unwrap(),
///     r#"{"Cellpose3.1":[],"CellposeSAM":[]}"#
/// );
/// ```
pub fn list_models(models_dir: &Path) -> BTreeMap<ModelFamily, Vec<String>> {
    ModelFamily::iter()
        .map(|family| {
            let directory = models_dir.join(family.dir_name());
            (family, scan_directory(&directory))
        })
        .collect()
}

fn scan_directory(directory: &Path) -> Vec<String> {
    if !directory.is_dir() {
        debug!(directory = %directory.display(), "Model directory does not exist");
        return Vec::new();
    }

    match std::fs::read_dir(directory) {
        Ok(entries) => {
            let mut names: Vec<String> = entries
                .filter_map(Result::ok)
                .filter(|entry| {
                    entry
                        .file_type()
                        .is_ok_and(|kind| kind.is_file() || kind.is_dir())
                })
                .map(|entry| entry.file_name().to_string_lossy().into_owned())
                .collect();

            names.sort();
            names
        }
        Err(err) => {
            error!(directory = %directory.display(), %err, "Error scanning model directory");
            Vec::new()
        }
    }
}

/// Resolve a requested model name to built-in or custom weights
///
/// The family's built-in name always resolves without touching disk. Any
/// other name must be a plain file or directory name present in the
/// family's model directory.
pub fn resolve(
    models_dir: &Path,
    family: ModelFamily,
    name: &str,
) -> Result<ModelSource, DispatchError> {
    if name == family.builtin() {
        return Ok(ModelSource::Builtin(family.builtin()));
    }

    let path = models_dir.join(family.dir_name()).join(name);

    let mut components = Path::new(name).components();
    let plain = matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    );

    if plain && path.exists() {
        Ok(ModelSource::Custom(path))
    } else {
        Err(DispatchError::ModelMissing(path))
    }
}

#[cfg(test)]
mod test {

    use super::*;

    fn models_dir() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let sam = dir.path().join("CellposeSAM");

        std::fs::create_dir_all(sam.join("nuclei_v2")).unwrap();
        std::fs::write(sam.join("tuned"), b"weights").unwrap();
        std::fs::write(sam.join("alpha"), b"weights").unwrap();

        dir
    }

    #[test]
    fn test_list_models_sorted() {
        let dir = models_dir();
        let listing = list_models(dir.path());

        assert_eq!(
            listing[&ModelFamily::CellposeSam],
            vec!["alpha", "nuclei_v2", "tuned"]
        );
        assert!(listing[&ModelFamily::Cellpose3].is_empty());
    }

    #[test]
    fn test_resolve_builtin_per_family() {
        let dir = models_dir();

        assert_eq!(
            resolve(dir.path(), ModelFamily::Cellpose3, "cyto3").unwrap(),
            ModelSource::Builtin("cyto3")
        );
        assert_eq!(
            resolve(dir.path(), ModelFamily::CellposeSam, "cpsam").unwrap(),
            ModelSource::Builtin("cpsam")
        );
        assert!(resolve(dir.path(), ModelFamily::Cellpose3, "cpsam").is_err());
    }

    #[test]
    fn test_resolve_custom() {
        let dir = models_dir();

        assert_eq!(
            resolve(dir.path(), ModelFamily::CellposeSam, "tuned").unwrap(),
            ModelSource::Custom(dir.path().join("CellposeSAM").join("tuned"))
        );
    }

    #[test]
    fn test_resolve_missing_reports_path() {
        let dir = models_dir();
        let err = resolve(dir.path(), ModelFamily::CellposeSam, "ghost").unwrap_err();

        assert!(matches!(err, DispatchError::ModelMissing(_)));
        assert!(err.to_string().starts_with("Model file missing: "));
        assert!(err.to_string().ends_with("ghost"));
    }

    #[test]
    fn test_resolve_rejects_traversal() {
        let dir = models_dir();

        assert!(resolve(dir.path(), ModelFamily::CellposeSam, "../CellposeSAM/tuned").is_err());
        assert!(resolve(dir.path(), ModelFamily::CellposeSam, "").is_err());
    }
}
