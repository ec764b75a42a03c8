// src/config/mod.rs

//! Task files and tracker settings.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a task file from disk or a [`crate::fs::FileSystem`] (`loader.rs`).
//! - Build specs and validate names, references and cycles (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_task_file_path, load_and_validate, load_from_fs, load_from_path, load_from_str};
pub use model::{RawTaskFile, TaskFile, TrackerConfig};
pub use validate::validate_tracker_config;
