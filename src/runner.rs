// src/runner.rs

//! A simulated runner: drives a [`Tracker`] to completion without executing
//! anything.
//!
//! Every task handed out is checked with `prepare_actions` and reported
//! SUCCESS, unless it is listed as failing or its actions do not prepare.
//! Artifacts handed out are treated as created.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{info, warn};

use crate::errors::Result;
use crate::structs::{Artifact, TaskName};
use crate::tracker::{ArtifactStatus, Next, Node, TaskStatus, Tracker};

/// Default cap on handed-out units of work.
pub const DEFAULT_MAX_STEPS: usize = 1_000;

#[derive(Debug, Clone, PartialEq)]
pub enum PlanStep {
    Ran { task: TaskName, outcome: TaskStatus },
    Created(Artifact),
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::Ran { task, outcome } => write!(f, "run    {} -> {outcome}", task.de_uniq()),
            PlanStep::Created(art) => write!(f, "create {art}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulatedRunner {
    /// Abstract names (`group::name`) to report as FAILED.
    failing: BTreeSet<String>,
    create_artifacts: bool,
    max_steps: usize,
}

impl Default for SimulatedRunner {
    fn default() -> Self {
        Self {
            failing: BTreeSet::new(),
            create_artifacts: true,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl SimulatedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failures<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.failing.extend(names.into_iter().map(Into::into));
        self
    }

    /// When off, the run stops at the first artifact nothing produces.
    pub fn with_create_artifacts(mut self, create: bool) -> Self {
        self.create_artifacts = create;
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps;
        self
    }

    fn fails(&self, name: &TaskName) -> bool {
        self.failing.contains(&name.de_uniq().to_string())
    }

    /// Pull work from the tracker until it has none left.
    pub fn run(&self, tracker: &mut Tracker) -> Result<Vec<PlanStep>> {
        let mut steps = Vec::new();

        while steps.len() < self.max_steps {
            let step = match tracker.next_for(None)? {
                None => break,
                Some(Next::Task(task)) => {
                    let name = task.name().clone();
                    let outcome = match task.prepare_actions() {
                        Err(err) => {
                            warn!(task = %name, error = %err, "actions did not prepare");
                            TaskStatus::Failed
                        }
                        Ok(_) if self.fails(&name) => TaskStatus::Failed,
                        Ok(_) => TaskStatus::Success,
                    };
                    PlanStep::Ran { task: name, outcome }
                }
                Some(Next::Artifact(art)) => PlanStep::Created(art),
            };

            match &step {
                PlanStep::Ran { task, outcome } => {
                    info!(task = %task, %outcome, "simulated run");
                    tracker.set_status(&Node::Task(task.clone()), *outcome)?;
                }
                PlanStep::Created(art) if self.create_artifacts => {
                    info!(artifact = %art, "simulated create");
                    tracker.set_status(&Node::Artifact(art.clone()), ArtifactStatus::Exists)?;
                }
                PlanStep::Created(art) => {
                    warn!(artifact = %art, "nothing produces this artifact, stopping");
                    break;
                }
            }
            steps.push(step);
        }

        if steps.len() >= self.max_steps {
            warn!(max_steps = self.max_steps, "step limit reached");
        }
        Ok(steps)
    }
}
