// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{RawTaskFile, TaskFile};
use crate::errors::Result;
use crate::fs::FileSystem;

/// Load a task file from a given path and return the raw `RawTaskFile`.
///
/// This only performs TOML deserialization; it does **not** build specs or
/// check them. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawTaskFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

/// Same as [`load_from_path`], reading through a [`FileSystem`].
pub fn load_from_fs(fs: &dyn FileSystem, path: impl AsRef<Path>) -> Result<RawTaskFile> {
    let contents = fs.read_to_string(path.as_ref())?;
    load_from_str(&contents)
}

pub fn load_from_str(contents: &str) -> Result<RawTaskFile> {
    let raw: RawTaskFile = toml::from_str(contents)?;
    Ok(raw)
}

/// Load a task file from path, build its specs and validate them.
///
/// Checks for:
/// - malformed task tables,
/// - duplicate names,
/// - relations to undeclared tasks,
/// - declared dependency cycles,
/// - tracker settings sanity.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<TaskFile> {
    let raw = load_from_path(&path)?;
    TaskFile::try_from(raw)
}

/// Default task file in the current working directory.
pub fn default_task_file_path() -> PathBuf {
    PathBuf::from("dagtrack.toml")
}
