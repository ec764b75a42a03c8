// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod fs;
pub mod logging;
pub mod runner;
pub mod structs;
pub mod tracker;

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::TaskFile;
use crate::config::loader::load_and_validate;
use crate::runner::SimulatedRunner;
use crate::structs::{TaskMeta, TaskName};
use crate::tracker::{BuildSources, Tracker};

/// High-level entry point used by `main.rs`.
///
/// Loads the task file, registers and queues the targets, builds the
/// network, then either prints it (`--dry-run`) or plans a simulated run.
pub fn run(args: CliArgs) -> Result<()> {
    let file = load_and_validate(&args.file)
        .with_context(|| format!("loading task file {}", args.file))?;

    let mut tracker = Tracker::new(file.tracker.clone());
    tracker.register(file.specs.clone())?;

    let targets = select_targets(&file, &args.targets)?;
    info!(count = targets.len(), "queueing targets");
    for target in targets.iter() {
        tracker.queue(target, true)?;
    }
    tracker.build(BuildSources::Root)?;
    tracker.validate()?;

    if args.dry_run {
        print_dry_run(&file, &tracker);
        return Ok(());
    }

    let steps = SimulatedRunner::new()
        .with_failures(args.fail.iter().cloned())
        .run(&mut tracker)?;

    println!("plan ({} steps):", steps.len());
    for step in steps.iter() {
        println!("  {step}");
    }
    println!();
    println!("completed:");
    for node in tracker.execution_trace() {
        println!("  {node}");
    }
    Ok(())
}

/// The CLI targets, or every runnable declared spec when none are given.
fn select_targets(file: &TaskFile, requested: &[String]) -> Result<Vec<TaskName>> {
    if !requested.is_empty() {
        return requested
            .iter()
            .map(|s| s.parse::<TaskName>().with_context(|| format!("bad target '{s}'")))
            .collect();
    }
    Ok(file
        .specs
        .iter()
        .filter(|s| !s.name.is_partial())
        .filter(|s| !s.has_meta(TaskMeta::Disabled) && !s.has_meta(TaskMeta::Internal))
        .map(|s| s.name.clone())
        .collect())
}

fn print_dry_run(file: &TaskFile, tracker: &Tracker) {
    println!("dagtrack dry-run");
    println!("  tracker.declare_priority = {}", file.tracker.declare_priority);
    println!("  tracker.min_priority = {}", file.tracker.min_priority);
    println!("  tracker.max_loop = {}", file.tracker.max_loop);
    println!();

    println!("specs ({}):", file.specs.len());
    for spec in file.specs.iter() {
        println!("  - {}", spec.name);
        let meta: Vec<&str> = spec.meta.iter().map(|m| m.key()).collect();
        println!("      meta: {meta:?}");
        let relations: Vec<String> = spec.relations().map(ToString::to_string).collect();
        if !relations.is_empty() {
            println!("      relations: {relations:?}");
        }
        if let Some(ctor) = spec.ctor.as_deref() {
            println!("      ctor: {ctor}");
        }
    }
    println!();

    let network = tracker.network();
    println!("network ({} nodes):", network.len());
    for (from, to, kind) in network.edges() {
        println!("  {from} -> {to} ({kind:?})");
    }

    debug!("dry-run complete (nothing planned)");
}
