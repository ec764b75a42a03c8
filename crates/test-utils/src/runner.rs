use std::sync::Arc;

use dagtrack::config::TrackerConfig;
use dagtrack::errors::Result;
use dagtrack::fs::FileSystem;
use dagtrack::fs::mock::MockFileSystem;
use dagtrack::runner::{PlanStep, SimulatedRunner};
use dagtrack::structs::{TaskName, TaskSpec};
use dagtrack::tracker::{BuildSources, Node, Tracker};

/// Sets up a tracker over a mock filesystem, queues targets, and drives it
/// with a [`SimulatedRunner`].
pub struct Runner {
    config: TrackerConfig,
    fs: Arc<MockFileSystem>,
    specs: Vec<TaskSpec>,
    targets: Vec<TaskName>,
    sim: SimulatedRunner,
}

/// What a run handed out, plus the tracker for further inspection.
pub struct RunReport {
    pub steps: Vec<PlanStep>,
    pub tracker: Tracker,
}

impl RunReport {
    /// Abstract names of the tasks handed out, in order.
    pub fn ran(&self) -> Vec<String> {
        self.steps
            .iter()
            .filter_map(|s| match s {
                PlanStep::Ran { task, .. } => Some(task.de_uniq().to_string()),
                PlanStep::Created(_) => None,
            })
            .collect()
    }

    /// Completed nodes without uuids, in order.
    pub fn trace(&self) -> Vec<String> {
        self.tracker
            .execution_trace()
            .iter()
            .map(|n| match n {
                Node::Task(name) => name.de_uniq().to_string(),
                other => other.to_string(),
            })
            .collect()
    }

    /// Position of a task in [`ran`](Self::ran).
    pub fn position(&self, name: &str) -> Option<usize> {
        self.ran().iter().position(|n| n == name)
    }
}

impl Default for Runner {
    fn default() -> Self {
        Self::new()
    }
}

impl Runner {
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            fs: Arc::new(MockFileSystem::new()),
            specs: Vec::new(),
            targets: Vec::new(),
            sim: SimulatedRunner::new(),
        }
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_fs(mut self, fs: Arc<MockFileSystem>) -> Self {
        self.fs = fs;
        self
    }

    pub fn with_spec(mut self, spec: TaskSpec) -> Self {
        self.specs.push(spec);
        self
    }

    pub fn with_specs(mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn target(mut self, name: &str) -> Self {
        self.targets.push(crate::name(name));
        self
    }

    pub fn fail(mut self, name: &str) -> Self {
        self.sim = self.sim.with_failures([name]);
        self
    }

    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.sim = self.sim.with_max_steps(max_steps);
        self
    }

    pub fn fs(&self) -> Arc<MockFileSystem> {
        Arc::clone(&self.fs)
    }

    /// Register, queue and build, without running anything.
    pub fn prepare(&self) -> Result<Tracker> {
        let fs: Arc<dyn FileSystem> = self.fs.clone();
        let mut tracker = Tracker::with_fs(self.config.clone(), fs);
        tracker.register(self.specs.clone())?;
        for target in self.targets.iter() {
            tracker.queue(target, true)?;
        }
        tracker.build(BuildSources::Root)?;
        Ok(tracker)
    }

    pub fn run(&self) -> Result<RunReport> {
        let mut tracker = self.prepare()?;
        let steps = self.sim.run(&mut tracker)?;
        Ok(RunReport { steps, tracker })
    }
}
