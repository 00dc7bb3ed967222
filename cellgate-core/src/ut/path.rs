// Copyright (c) 2025, Tom Ouellette
// Licensed under the MIT License

use std::path::{Path, PathBuf};

use crate::constant::HOME_ENV;
use crate::error::CellgateError;

/// Ensures a new directory is created with an incrementing suffix if necessary.
///
/// # Arguments
///
/// * `directory` - Path to new directory - no overwrites allowed
///
/// # Examples
///
/// ```
/// use cellgate_core::ut::path::create_directory;
///
/// let root = tempfile::tempdir().unwrap();
/// let base = root.path().join("outputs");
///
/// assert_eq!(create_directory(&base).unwrap(), base);
/// assert_eq!(create_directory(&base).unwrap(), root.path().join("outputs_0"));
/// assert_eq!(create_directory(&base).unwrap(), root.path().join("outputs_1"));
/// ```
pub fn create_directory<P: AsRef<Path>>(directory: P) -> Result<PathBuf, CellgateError> {
    let directory = directory.as_ref();

    if !directory.exists() {
        std::fs::create_dir_all(directory)
            .map_err(|err| CellgateError::DirError(err.to_string()))?;
        return Ok(directory.to_path_buf());
    }

    let parent = directory.parent().unwrap_or_else(|| Path::new("."));
    let base_name = directory
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| CellgateError::DirError("Invalid directory name".to_string()))?;

    for index in 0..30 {
        let new_dir = parent.join(format!("{}_{}", base_name, index));

        if !new_dir.exists() {
            std::fs::create_dir(&new_dir)
                .map_err(|err| CellgateError::DirError(err.to_string()))?;
            return Ok(new_dir);
        }
    }

    Err(CellgateError::DirError(format!(
        "Could not create a directory in alotted increments. Check the directory path: {}",
        directory.display()
    )))
}

/// Create a directory and any missing parents, keeping existing contents
pub fn ensure_directory<P: AsRef<Path>>(directory: P) -> Result<PathBuf, CellgateError> {
    let directory = directory.as_ref();

    std::fs::create_dir_all(directory).map_err(|err| {
        CellgateError::DirError(format!("{}: {}", directory.display(), err))
    })?;

    Ok(directory.to_path_buf())
}

/// Collect file paths from a directory with an optional substring filter
///
/// Extensions are matched case-insensitively and results are sorted so
/// batch runs visit files in a stable order.
///
/// # Arguments
///
/// * `directory` - Path to directory containing files
/// * `valid_ext` - Lowercase extensions to keep
/// * `substring` - Only include files containing this substring
///
/// # Examples
///
/// ```no_run
/// use cellgate_core::ut::path::collect_file_paths;
/// use cellgate_core::constant::BATCH_IMAGE_FORMATS;
/// let files = collect_file_paths("images/", BATCH_IMAGE_FORMATS.as_slice(), None);
/// ```
pub fn collect_file_paths<P: AsRef<Path>>(
    directory: P,
    valid_ext: &[&str],
    substring: Option<&str>,
) -> Result<Vec<PathBuf>, CellgateError> {
    let directory = directory.as_ref();

    let mut files: Vec<PathBuf> = std::fs::read_dir(directory)
        .map_err(|err| CellgateError::DirError(format!("{}: {}", directory.display(), err)))?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| valid_ext.contains(&ext.to_lowercase().as_str()))
        })
        .collect();

    if let Some(substring) = substring {
        files.retain(|f| {
            f.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.contains(substring))
        });
    }

    files.sort();

    Ok(files)
}

/// File stem as an owned string, e.g. `image` for `dir/image.tif`
pub fn file_stem<P: AsRef<Path>>(path: P) -> Result<String, CellgateError> {
    path.as_ref()
        .file_stem()
        .and_then(|stem| stem.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            CellgateError::NoFileError(format!("No file name in {}", path.as_ref().display()))
        })
}

/// Base directory holding models, environments and the engine script
///
/// Uses `$CELLGATE_HOME` when set, otherwise `~/.cellgate`.
pub fn default_base_dir() -> PathBuf {
    if let Some(home) = std::env::var_os(HOME_ENV).filter(|value| !value.is_empty()) {
        return PathBuf::from(home);
    }

    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".cellgate")
}
