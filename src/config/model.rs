// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::structs::{Extra, TaskSpec};

/// Tracker tuning, read from the `[tracker]` table of a task file.
///
/// ```toml
/// [tracker]
/// declare_priority = 10
/// min_priority = -10
/// max_loop = 100
/// artifact_stale_after_secs = 3600
/// strict_validation = true
/// ```
///
/// Every field is optional and falls back to the defaults below.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrackerConfig {
    /// Priority given to entries that have no live task yet.
    pub declare_priority: i64,

    /// A task dequeued while below this priority is halted.
    pub min_priority: i64,

    /// Dequeue iterations `next_for` may spend before giving up.
    pub max_loop: usize,

    /// Existing artifacts older than this many seconds count as stale.
    /// `None` disables staleness checks.
    pub artifact_stale_after_secs: Option<u64>,

    /// Whether `validate` fails on problems, or only logs them.
    pub strict_validation: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            declare_priority: 10,
            min_priority: -10,
            max_loop: 100,
            artifact_stale_after_secs: None,
            strict_validation: true,
        }
    }
}

/// A task file exactly as deserialised, before any spec is built.
///
/// ```toml
/// [tracker]
/// max_loop = 50
///
/// [[tasks.basic]]
/// name = "compile"
/// depends_on = ["basic::fetch", "file::>src/main.c"]
/// actions = [{ do = "shell", args = ["make"] }]
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawTaskFile {
    #[serde(default)]
    pub tracker: TrackerConfig,

    /// Group name -> task tables of that group.
    #[serde(default)]
    pub tasks: BTreeMap<String, Vec<Extra>>,
}

/// A validated task file: tracker settings plus built specs.
#[derive(Debug, Clone)]
pub struct TaskFile {
    pub tracker: TrackerConfig,
    pub specs: Vec<TaskSpec>,
}

impl TaskFile {
    /// Construct without validation; use `TryFrom<RawTaskFile>` instead.
    pub(crate) fn new_unchecked(tracker: TrackerConfig, specs: Vec<TaskSpec>) -> Self {
        Self { tracker, specs }
    }
}
