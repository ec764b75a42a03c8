// src/tracker/core.rs

//! The [`Tracker`] facade and its per-node state machine.
//!
//! The tracker owns the registry, network and queue. A runner drives it by
//! registering specs, queueing targets, building the network, then calling
//! [`Tracker::next_for`] until it returns `None`, reporting each task's
//! outcome through [`Tracker::set_status`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::errors::{Result, tracking};
use crate::fs::{FileSystem, RealFileSystem};
use crate::structs::{Artifact, DelayedSpec, TaskName, TaskSpec};
use crate::tracker::network::{BuildSources, Node, TaskNetwork, is_blocked_by, is_owner};
use crate::tracker::queue::TrackerQueue;
use crate::tracker::registry::{Instantiation, Registry};
use crate::tracker::status::{ArtifactStatus, Status, TaskStatus};
use crate::tracker::task::{CtorTable, Task};

/// A unit of work handed to the runner.
#[derive(Debug)]
pub enum Next<'a> {
    /// A task now RUNNING. Report its outcome with [`Tracker::set_status`].
    Task(&'a mut Task),
    /// A missing artifact nothing else will produce. Mark it EXISTS once
    /// created.
    Artifact(Artifact),
}

impl Next<'_> {
    pub fn node(&self) -> Node {
        match self {
            Next::Task(task) => Node::Task(task.name().clone()),
            Next::Artifact(art) => Node::Artifact(art.clone()),
        }
    }
}

/// What one state machine step produced.
enum Step {
    Continue,
    Task(TaskName),
    Artifact(Artifact),
}

#[derive(Debug)]
pub struct Tracker {
    config: TrackerConfig,
    registry: Registry,
    network: TaskNetwork,
    queue: TrackerQueue,
}

impl Tracker {
    /// A tracker reading artifacts from the working directory.
    pub fn new(config: TrackerConfig) -> Self {
        Self::with_fs(config, Arc::new(RealFileSystem::new()))
    }

    pub fn with_fs(config: TrackerConfig, fs: Arc<dyn FileSystem>) -> Self {
        let registry = Registry::new(&config, fs);
        let queue = TrackerQueue::new(config.min_priority);
        Self {
            config,
            registry,
            network: TaskNetwork::new(),
            queue,
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn network(&self) -> &TaskNetwork {
        &self.network
    }

    pub fn queue_state(&self) -> &TrackerQueue {
        &self.queue
    }

    pub fn ctors_mut(&mut self) -> &mut CtorTable {
        self.registry.ctors_mut()
    }

    pub fn is_valid(&self) -> bool {
        self.network.is_valid()
    }

    // ---- registration ----

    /// Register specs. Partial specs are reified over their last source
    /// once the rest are in.
    pub fn register(&mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Result<usize> {
        let (partials, whole): (Vec<TaskSpec>, Vec<TaskSpec>) =
            specs.into_iter().partition(|s| s.name.is_partial());
        let mut count = self.registry.register_spec(whole)?;

        let mut ready = Vec::new();
        for spec in partials {
            let base_name = spec
                .sources
                .last()
                .and_then(|s| s.as_name())
                .ok_or_else(|| tracking(format!("partial spec {} has no base", spec.name)))?;
            let base = self.registry.spec(base_name).ok_or_else(|| {
                tracking(format!(
                    "partial spec {} extends the unregistered {base_name}",
                    spec.name
                ))
            })?;
            let reified = spec.reify_partial(base)?;
            if self.registry.spec(&reified.name).is_some() {
                return Err(tracking(format!(
                    "reifying {} would overwrite {}",
                    spec.name, reified.name
                )));
            }
            info!(partial = %spec.name, reified = %reified.name, "reified partial spec");
            ready.push(reified);
        }
        count += self.registry.register_spec(ready)?;
        Ok(count)
    }

    pub fn register_artifacts(&mut self, arts: impl IntoIterator<Item = Artifact>) {
        for art in arts {
            self.registry.register_artifact(art, None, None);
        }
    }

    /// Register a subtask a job produced while running. Returns its name.
    pub fn register_delayed(&mut self, delayed: &DelayedSpec) -> Result<TaskName> {
        let base = self.registry.spec(&delayed.base).ok_or_else(|| {
            tracking(format!("delayed spec {} has unknown base {}", delayed.target, delayed.base))
        })?;
        let spec = delayed.upgrade(base)?;
        let name = spec.name.clone();
        self.register([spec])?;
        Ok(name)
    }

    // ---- queueing ----

    /// Queue a task by name, instantiating abstract names. Targets queued
    /// `from_user` hang off the network root.
    ///
    /// Returns the concrete name queued, or `None` if the name resolved to
    /// nothing.
    pub fn queue(&mut self, name: &TaskName, from_user: bool) -> Result<Option<TaskName>> {
        let concrete = if name.is_concrete() {
            if self.registry.spec(name).is_none() {
                return Err(tracking(format!("cannot queue the unregistered {name}")));
            }
            name.clone()
        } else {
            match self.registry.instantiate_spec(name, Instantiation::Reuse)? {
                Some(concrete) => concrete,
                None => {
                    warn!(task = %name, "nothing to queue");
                    return Ok(None);
                }
            }
        };
        self.queue_node(Node::Task(concrete.clone()), from_user)?;
        Ok(Some(concrete))
    }

    /// Register `spec` if needed, then queue it.
    pub fn queue_spec(&mut self, spec: TaskSpec, from_user: bool) -> Result<Option<TaskName>> {
        let name = match spec.name.is_partial() {
            true => spec.name.pop(false),
            false => spec.name.clone(),
        };
        if self.registry.spec(&name).is_none() {
            self.register([spec])?;
        }
        self.queue(&name, from_user)
    }

    /// Queue a task and force its status.
    pub fn queue_with_status(
        &mut self,
        name: &TaskName,
        from_user: bool,
        status: TaskStatus,
    ) -> Result<Option<TaskName>> {
        let queued = self.queue(name, from_user)?;
        if let Some(concrete) = &queued {
            let node = Node::Task(concrete.clone());
            if !self.registry.set_status(&node, status.into())? {
                self.registry.make_task(concrete, None)?;
                self.registry.set_status(&node, status.into())?;
            }
        }
        Ok(queued)
    }

    pub fn queue_artifact(&mut self, art: Artifact, from_user: bool) -> Result<()> {
        self.queue_node(Node::Artifact(art), from_user)
    }

    fn queue_node(&mut self, node: Node, from_user: bool) -> Result<()> {
        if from_user {
            self.network.connect_to_root(&mut self.registry, node.clone())?;
        } else {
            self.network.add_node(&mut self.registry, node.clone())?;
        }
        self.queue.push(&self.registry, node);
        Ok(())
    }

    /// Re-activate a node already in the network.
    fn requeue(&mut self, node: Node) {
        self.queue.push(&self.registry, node);
    }

    // ---- building ----

    /// Expand the network, then activate `auto` specs that ended up in it.
    pub fn build(&mut self, sources: BuildSources) -> Result<()> {
        self.network.build(&mut self.registry, sources)?;
        for name in self.registry.auto_instances() {
            let fresh = self.registry.task_status(&name) == TaskStatus::Declared;
            let node = Node::Task(name);
            if self.network.contains(&node) && !self.queue.is_active(&node) && fresh {
                debug!(task = %node, "auto queueing");
                self.requeue(node);
            }
        }
        Ok(())
    }

    /// Check registry and network invariants.
    pub fn validate(&mut self) -> Result<bool> {
        let strict = self.config.strict_validation;
        let registry_ok = self.registry.verify(strict)?;
        let network_ok = self.network.validate_network(&self.registry, strict)?;
        Ok(registry_ok && network_ok)
    }

    // ---- running ----

    /// Advance the queue until a task is ready to run or an artifact needs
    /// creating.
    ///
    /// `target`, if given and not already active, is queued first. Returns
    /// `None` when the queue empties or the loop limit is reached.
    pub fn next_for(&mut self, target: Option<&TaskName>) -> Result<Option<Next<'_>>> {
        if !self.network.is_valid() {
            return Err(tracking("network is in an invalid state"));
        }
        if let Some(target) = target {
            let concrete = match target.is_concrete() {
                true => Some(target.clone()),
                false => self.registry.instances(target).first().cloned(),
            };
            let node = concrete.map(Node::Task);
            match node {
                Some(node) if self.network.contains(&node) => {
                    if !self.queue.is_active(&node) {
                        self.requeue(node);
                    }
                }
                _ => {
                    return Err(tracking(format!(
                        "{target} is not in the network; queue and build it first"
                    )));
                }
            }
        }

        debug!(active = self.queue.len(), "next for");
        let mut step = Step::Continue;
        let mut count = 0;
        while count < self.config.max_loop {
            count += 1;
            let Some(focus) = self.queue.deque_entry(&mut self.registry) else {
                break;
            };
            step = self.advance(focus)?;
            if !matches!(step, Step::Continue) {
                break;
            }
        }

        match step {
            Step::Task(name) => {
                info!(task = %name, "handing out task");
                Ok(self.registry.task_mut(&name).map(Next::Task))
            }
            Step::Artifact(art) => {
                info!(artifact = %art, "handing out artifact");
                Ok(Some(Next::Artifact(art)))
            }
            Step::Continue => {
                if count >= self.config.max_loop && !self.queue.is_empty() {
                    warn!(max_loop = self.config.max_loop, "loop limit reached with work pending");
                }
                Ok(None)
            }
        }
    }

    fn advance(&mut self, focus: Node) -> Result<Step> {
        match focus.clone() {
            Node::Root => {
                self.queue.deactivate(&focus);
                Ok(Step::Continue)
            }
            Node::Task(name) => self.advance_task(focus, name),
            Node::Artifact(art) => self.advance_artifact(focus, art),
        }
    }

    fn advance_task(&mut self, focus: Node, name: TaskName) -> Result<Step> {
        let status = self.registry.task_status(&name);
        debug!(task = %name, %status, "advancing");
        match status {
            TaskStatus::Named => {
                warn!(task = %name, "a name with nothing backing it was queued");
                self.queue.deactivate(&focus);
            }
            TaskStatus::Declared => {
                let parent = match name.is_cleanup() {
                    true => self.owner_of(&focus),
                    false => None,
                };
                self.registry.make_task(&name, parent.as_ref())?;
                self.requeue(focus);
            }
            TaskStatus::Defined => self.transition(focus, TaskStatus::Init)?,
            TaskStatus::Init => self.transition(focus, TaskStatus::Wait)?,
            TaskStatus::Wait => {
                let preds = self.network.pred(&focus);
                if let Some(blocker) = preds
                    .iter()
                    .find(|p| is_blocked_by(&self.registry, &focus, p))
                {
                    warn!(task = %name, blocker = %blocker, "dependency failed, halting");
                    self.transition(focus, TaskStatus::Halted)?;
                    return Ok(Step::Continue);
                }
                let incomplete = self.network.incomplete_dependencies(&self.registry, &focus);
                if incomplete.is_empty() {
                    for art in preds.into_iter().filter(|p| matches!(p, Node::Artifact(_))) {
                        self.queue.record_once(art, ArtifactStatus::Exists.into());
                    }
                    self.transition(focus, TaskStatus::Ready)?;
                } else {
                    debug!(task = %name, waiting_on = incomplete.len(), "blocked");
                    self.requeue(focus);
                    for dep in incomplete {
                        self.requeue(dep);
                    }
                }
            }
            TaskStatus::Ready => {
                self.transition(focus, TaskStatus::Running)?;
                return Ok(Step::Task(name));
            }
            TaskStatus::Running => self.requeue(focus),
            TaskStatus::Success => {
                self.queue.record(focus.clone(), status.into());
                self.transition(focus, TaskStatus::Teardown)?;
            }
            TaskStatus::Failed | TaskStatus::Halted => {
                self.transition(focus, TaskStatus::Teardown)?;
            }
            TaskStatus::Skipped => self.transition(focus, TaskStatus::Dead)?,
            TaskStatus::Teardown => {
                for succ in self.network.succ(&focus) {
                    if let Node::Task(succ_name) = &succ {
                        let needs_parent = succ_name.is_cleanup()
                            && self.network.is_reactive(&succ)
                            && self.registry.task_status(succ_name) == TaskStatus::Declared;
                        if needs_parent {
                            self.registry.make_task(succ_name, Some(&name))?;
                        }
                    }
                    if succ != Node::Root {
                        self.requeue(succ);
                    }
                }
                self.transition(focus, TaskStatus::Dead)?;
            }
            TaskStatus::Dead => {
                self.registry.retire(&name);
                self.queue.deactivate(&focus);
            }
            TaskStatus::Disabled => self.queue.deactivate(&focus),
        }
        Ok(Step::Continue)
    }

    fn advance_artifact(&mut self, focus: Node, art: Artifact) -> Result<Step> {
        let status = self.registry.artifact_status(&art);
        debug!(artifact = %art, %status, "advancing");
        match status {
            ArtifactStatus::Exists => {
                self.queue.record_once(focus.clone(), status.into());
                self.queue.deactivate(&focus);
            }
            ArtifactStatus::Stale => {
                info!(artifact = %art, "stale, rebuilding");
                self.registry
                    .set_status(&focus, ArtifactStatus::Declared.into())?;
                for pred in self.network.pred(&focus) {
                    self.requeue(pred);
                }
                self.requeue(focus);
            }
            ArtifactStatus::Declared => {
                let fresh_on_disk = !self.registry.has_status_override(&art)
                    && self.registry.artifact_disk_status(&art) == ArtifactStatus::Exists;
                if fresh_on_disk {
                    self.transition(focus, ArtifactStatus::Exists)?;
                    return Ok(Step::Continue);
                }
                let incomplete = self.network.incomplete_dependencies(&self.registry, &focus);
                if !incomplete.is_empty() {
                    debug!(artifact = %art, producers = incomplete.len(), "waiting on producers");
                    self.requeue(focus);
                    for dep in incomplete {
                        self.requeue(dep);
                    }
                } else if art.is_abstract() || self.registry.artifact_exists(&art) {
                    self.transition(focus, ArtifactStatus::Exists)?;
                } else {
                    self.requeue(focus);
                    return Ok(Step::Artifact(art));
                }
            }
        }
        Ok(Step::Continue)
    }

    /// Set a status and put the node back in the queue.
    fn transition(&mut self, focus: Node, status: impl Into<Status>) -> Result<()> {
        self.registry.set_status(&focus, status.into())?;
        self.requeue(focus);
        Ok(())
    }

    /// The task a cleanup belongs to, live or retired.
    fn owner_of(&self, cleanup: &Node) -> Option<TaskName> {
        self.network
            .pred(cleanup)
            .into_iter()
            .filter_map(|p| match p {
                Node::Task(name) => Some(name),
                _ => None,
            })
            .find(|p| is_owner(cleanup, p) && self.registry.state_of(p).is_some())
    }

    // ---- runner reporting ----

    /// Report a status for a task or artifact. Returns `false` for a task
    /// with no live object yet.
    pub fn set_status(&mut self, node: &Node, status: impl Into<Status>) -> Result<bool> {
        self.registry.set_status(node, status.into())
    }

    /// Current status and priority of a node.
    pub fn get_status(&self, node: &Node) -> (Status, i64) {
        (self.registry.get_status(node), self.registry.get_priority(node))
    }

    /// Completed nodes, in order.
    pub fn execution_trace(&self) -> &[Node] {
        self.queue.execution_trace()
    }

    /// Drop every queued node. Live tasks are abandoned.
    pub fn clear(&mut self) {
        info!(active = self.queue.len(), "clearing queue");
        self.queue.clear_queue();
    }
}
