// src/cli.rs

//! Command-line arguments, parsed with `clap` derive.

use clap::{Parser, ValueEnum};

/// Plan a run of the tasks declared in a task file.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "dagtrack",
    version,
    about = "Track task and artifact dependencies and plan the order they run in.",
    long_about = None
)]
pub struct CliArgs {
    /// Task file (TOML).
    #[arg(long, value_name = "PATH", default_value = "dagtrack.toml")]
    pub file: String,

    /// Task to run, as `group::name`. Repeatable.
    ///
    /// Defaults to every declared task that is neither disabled nor
    /// internal.
    #[arg(long = "target", value_name = "NAME")]
    pub targets: Vec<String>,

    /// Report this task as FAILED when it is handed out. Repeatable.
    #[arg(long = "fail", value_name = "NAME")]
    pub fail: Vec<String>,

    /// Print the specs and the built network, then stop.
    #[arg(long)]
    pub dry_run: bool,

    /// Logging level. Overrides `DAGTRACK_LOG`.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,
}

#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

pub fn parse() -> CliArgs {
    CliArgs::parse()
}
