// src/errors.rs

//! Crate-wide error type and result alias.
//!
//! Structural problems (bad names, bad spec data, broken graph invariants)
//! are errors. A task that merely fails at runtime is a status, not an error.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DagtrackError {
    #[error("Bad task name: {0}")]
    NameFormatError(String),

    #[error("Could not load spec: {0}")]
    StructLoadError(String),

    #[error("Tracking error: {0}")]
    TrackingError(String),

    #[error("Bad injection: {0}")]
    InjectionError(String),

    #[error("Task error: {0}")]
    TaskError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, DagtrackError>;

/// Shorthand for building a [`DagtrackError::TrackingError`].
pub(crate) fn tracking(msg: impl Into<String>) -> DagtrackError {
    DagtrackError::TrackingError(msg.into())
}
