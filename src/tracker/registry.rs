// src/tracker/registry.rs

//! Storage for specs, live tasks and artifacts.
//!
//! Invariants:
//! - every key in `tasks` has a matching key in `specs`;
//! - every concrete spec is listed in `concrete` under its abstract name;
//! - every implicit (head/cleanup) name maps to a registered declaring spec.

use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tracing::{debug, info, warn};

use crate::config::TrackerConfig;
use crate::errors::{DagtrackError, Result, tracking};
use crate::fs::FileSystem;
use crate::structs::{
    Artifact, Extra, InjectSide, InjectSpec, MergeSuffix, RelationKind, RelationSpec, TaskMeta,
    TaskName, TaskSpec,
};
use crate::tracker::network::Node;
use crate::tracker::status::{ArtifactStatus, Status, TaskStatus};
use crate::tracker::task::{CtorTable, TASK_NAME_K, Task};

/// How [`Registry::instantiate_spec`] may produce a concrete spec.
#[derive(Debug, Clone, PartialEq)]
pub enum Instantiation {
    /// Reuse an existing instance if there is one.
    Reuse,
    /// Never make a new instance.
    Forbid,
    /// Always make a new instance.
    Force,
    /// Make a new instance with these values merged in.
    With(Extra),
}

#[derive(Debug)]
pub struct Registry {
    pub(crate) specs: HashMap<TaskName, TaskSpec>,
    /// Abstract name -> its concrete instances, oldest first.
    pub(crate) concrete: HashMap<TaskName, Vec<TaskName>>,
    /// Implicit head/cleanup name -> the spec that will generate it.
    pub(crate) implicit: HashMap<TaskName, TaskName>,
    /// Concrete name -> the names its registration generated.
    pub(crate) generated: HashMap<TaskName, Vec<TaskName>>,
    pub(crate) tasks: HashMap<TaskName, Task>,
    /// Removed tasks: the outcome they ended with and their final state.
    retired: HashMap<TaskName, (Option<TaskStatus>, Extra)>,

    /// Artifact -> specs that mention it.
    pub(crate) artifacts: HashMap<Artifact, Vec<TaskName>>,
    pub(crate) abstract_artifacts: BTreeSet<Artifact>,
    pub(crate) concrete_artifacts: BTreeSet<Artifact>,
    pub(crate) artifact_builders: HashMap<Artifact, Vec<TaskName>>,
    pub(crate) artifact_consumers: HashMap<Artifact, Vec<TaskName>>,
    artifact_status: HashMap<Artifact, ArtifactStatus>,
    artifact_priority: HashMap<Artifact, i64>,

    /// Abstract target -> relations of specs that declared they block it.
    pub(crate) blockers: HashMap<TaskName, Vec<RelationSpec>>,
    /// Concrete target -> (injection, control) to apply when it is made.
    pub(crate) late_injections: HashMap<TaskName, (InjectSpec, TaskName)>,
    /// Abstract transformer specs.
    pub(crate) transformers: Vec<TaskName>,

    ctors: CtorTable,
    fs: Arc<dyn FileSystem>,
    stale_after: Option<Duration>,
    declare_priority: i64,
}

impl Registry {
    pub fn new(config: &TrackerConfig, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            specs: HashMap::new(),
            concrete: HashMap::new(),
            implicit: HashMap::new(),
            generated: HashMap::new(),
            tasks: HashMap::new(),
            retired: HashMap::new(),
            artifacts: HashMap::new(),
            abstract_artifacts: BTreeSet::new(),
            concrete_artifacts: BTreeSet::new(),
            artifact_builders: HashMap::new(),
            artifact_consumers: HashMap::new(),
            artifact_status: HashMap::new(),
            artifact_priority: HashMap::new(),
            blockers: HashMap::new(),
            late_injections: HashMap::new(),
            transformers: Vec::new(),
            ctors: CtorTable::default(),
            fs,
            stale_after: config.artifact_stale_after_secs.map(Duration::from_secs),
            declare_priority: config.declare_priority,
        }
    }

    pub fn ctors_mut(&mut self) -> &mut CtorTable {
        &mut self.ctors
    }

    pub fn spec(&self, name: &TaskName) -> Option<&TaskSpec> {
        self.specs.get(name)
    }

    pub fn task(&self, name: &TaskName) -> Option<&Task> {
        self.tasks.get(name)
    }

    pub fn task_mut(&mut self, name: &TaskName) -> Option<&mut Task> {
        self.tasks.get_mut(name)
    }

    /// Concrete instances registered under an abstract name.
    pub fn instances(&self, name: &TaskName) -> &[TaskName] {
        self.concrete.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_artifact(&self, art: &Artifact) -> bool {
        self.artifacts.contains_key(art)
    }

    /// Specs that declared they need `art`.
    pub fn consumers_of(&self, art: &Artifact) -> &[TaskName] {
        self.artifact_consumers.get(art).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Specs that declared they produce `art`.
    pub fn builders_of(&self, art: &Artifact) -> &[TaskName] {
        self.artifact_builders.get(art).map(Vec::as_slice).unwrap_or(&[])
    }

    // ---- registration ----

    /// Register specs, abstract or concrete. Returns how many were added.
    ///
    /// Concrete specs also register the specs they generate. Partial specs
    /// must have been reified already.
    pub fn register_spec(&mut self, specs: impl IntoIterator<Item = TaskSpec>) -> Result<usize> {
        let mut queue: VecDeque<TaskSpec> = specs.into_iter().collect();
        let mut registered = 0;

        while let Some(spec) = queue.pop_front() {
            if spec.is_disabled() {
                info!(spec = %spec.name, "skipping disabled spec");
                continue;
            }
            if let Some(existing) = self.specs.get(&spec.name) {
                if *existing != spec {
                    return Err(tracking(format!("tried to overwrite the spec {}", spec.name)));
                }
                continue;
            }
            if spec.name.is_partial() {
                return Err(tracking(format!(
                    "partial spec {} should have been reified before registration",
                    spec.name
                )));
            }

            self.register_spec_artifacts(&spec);
            if spec.name.is_concrete() {
                info!(spec = %spec.name, "registered concrete spec");
                self.concrete
                    .entry(spec.name.de_uniq())
                    .or_default()
                    .push(spec.name.clone());
                let generated = spec.generate_specs()?;
                self.generated.insert(
                    spec.name.clone(),
                    generated.iter().map(|g| g.name.clone()).collect(),
                );
                queue.extend(generated);
            } else {
                info!(spec = %spec.name, "registered abstract spec");
                self.register_blocking_relations(&spec);
                self.register_implicit_names(&spec)?;
                if spec.transformer_of().is_some() {
                    self.transformers.push(spec.name.clone());
                }
            }
            self.specs.insert(spec.name.clone(), spec);
            registered += 1;
        }

        debug!(count = registered, "registration finished");
        Ok(registered)
    }

    fn register_spec_artifacts(&mut self, spec: &TaskSpec) {
        let arts: Vec<(Artifact, RelationKind)> = spec
            .relations()
            .filter_map(|rel| rel.artifact_target().map(|a| (a.clone(), rel.relation)))
            .collect();
        for (art, kind) in arts {
            self.register_artifact(art, Some(&spec.name), Some(kind));
        }
    }

    /// Record an artifact and, optionally, the spec that builds or uses it.
    pub fn register_artifact(
        &mut self,
        art: Artifact,
        task: Option<&TaskName>,
        relation: Option<RelationKind>,
    ) {
        debug!(artifact = %art, task = ?task.map(ToString::to_string), "registered artifact");
        let users = self.artifacts.entry(art.clone()).or_default();
        if let Some(task) = task {
            if !users.contains(task) {
                users.push(task.clone());
            }
        }

        if art.is_concrete() {
            self.concrete_artifacts.insert(art.clone());
        } else {
            self.abstract_artifacts.insert(art.clone());
        }

        let (Some(task), Some(relation)) = (task, relation) else {
            return;
        };
        let list = match relation {
            RelationKind::Needs => self.artifact_consumers.entry(art).or_default(),
            RelationKind::Blocks => self.artifact_builders.entry(art).or_default(),
        };
        if !list.contains(task) {
            list.push(task.clone());
        }
    }

    /// `spec` blocking `x` is invisible from `x`; record the reverse pointer.
    fn register_blocking_relations(&mut self, spec: &TaskSpec) {
        for rel in spec.relations().filter(|r| r.is_blocking()) {
            let Some(target) = rel.task_target() else {
                continue;
            };
            info!(target = %target, blocker = %spec.name, "registered requirement");
            let mut rel = rel.clone();
            rel.object = Some(spec.name.clone());
            self.blockers.entry(target.de_uniq()).or_default().push(rel);
        }
    }

    fn register_implicit_names(&mut self, spec: &TaskSpec) -> Result<()> {
        for implicit in spec.implicit_names() {
            if let Some(owner) = self.implicit.get(&implicit) {
                if *owner != spec.name {
                    return Err(tracking(format!(
                        "{implicit} is already generated by {owner}"
                    )));
                }
            }
            self.implicit.insert(implicit, spec.name.clone());
        }
        Ok(())
    }

    /// Queue an injection to replay, from `control`'s live state, when
    /// `task` is made. Only state injections need replaying.
    fn register_late_injection(&mut self, task: &TaskName, inject: &InjectSpec, control: &TaskName) -> Result<()> {
        if inject.from_state.is_empty() {
            return Ok(());
        }
        if self.late_injections.contains_key(task) {
            return Err(tracking(format!("{task} already has a late injection")));
        }
        info!(task = %task, control = %control, "registered late injection");
        self.late_injections
            .insert(task.clone(), (inject.clone(), control.clone()));
        Ok(())
    }

    // ---- instantiation ----

    /// Turn an abstract name into a concrete one, reusing an instance where
    /// `how` allows it.
    pub fn instantiate_spec(&mut self, name: &TaskName, how: Instantiation) -> Result<Option<TaskName>> {
        let name = match &how {
            Instantiation::Force => name.de_uniq(),
            Instantiation::Forbid if name.is_concrete() && self.specs.contains_key(name) => {
                return Ok(Some(name.clone()));
            }
            Instantiation::Forbid => return Ok(None),
            _ if !name.is_concrete() => name.clone(),
            _ if self.specs.contains_key(name) => {
                debug!(spec = %name, "already concrete");
                return Ok(Some(name.clone()));
            }
            _ => return Err(tracking(format!("unknown concrete name {name}"))),
        };

        let wants_new = match &how {
            Instantiation::Force => true,
            Instantiation::With(data) => !data.is_empty(),
            _ => false,
        };
        if !wants_new {
            if let Some(existing) = self.reusable_instance(&name) {
                debug!(spec = %name, instance = %existing, "reusing instance");
                return Ok(Some(existing.clone()));
            }
        }

        let spec = self
            .specs
            .get(&name)
            .ok_or_else(|| tracking(format!("no spec registered for {name}")))?;
        let instance = match how {
            Instantiation::With(data) if !data.is_empty() => {
                spec.instantiate().under_extra(&data, MergeSuffix::Customised)?
            }
            _ => spec.instantiate(),
        };
        let inst_name = instance.name.clone();
        debug!(spec = %name, instance = %inst_name, "new instance");
        self.register_spec([instance])?;

        // Customised instances are also listed under the name they came from.
        let listed = self.concrete.entry(name).or_default();
        if !listed.contains(&inst_name) {
            listed.push(inst_name.clone());
        }
        Ok(Some(inst_name))
    }

    /// The oldest instance of `name` whose values do not contradict the
    /// abstract spec's own.
    fn reusable_instance(&self, name: &TaskName) -> Option<&TaskName> {
        let base = self.specs.get(name);
        self.instances(name).iter().find(|inst| {
            match (base, self.specs.get(*inst)) {
                (Some(base), Some(spec)) => base
                    .extra
                    .iter()
                    .all(|(k, v)| spec.extra.get(k).is_none_or(|own| own == v)),
                _ => true,
            }
        })
    }

    /// Resolve a task relation of `control` to a concrete target.
    ///
    /// Existing instances that satisfy the relation's constraints are
    /// reused; otherwise a new one is made, with the relation's injection
    /// applied.
    pub fn instantiate_relation(&mut self, rel: &RelationSpec, control: &TaskName) -> Result<TaskName> {
        let target = rel
            .task_target()
            .ok_or_else(|| tracking(format!("{rel} does not target a task")))?;
        if !self.specs.contains_key(control) {
            return Err(tracking(format!("unknown control {control} for {rel}")));
        }
        if target.is_concrete() && self.specs.contains_key(target) {
            return Ok(target.clone());
        }
        if let Some(owner) = self.implicit.get(target).cloned() {
            return self.instantiate_implicit(target, &owner);
        }
        if !self.specs.contains_key(target) && !self.concrete.contains_key(target) {
            return Err(tracking(format!(
                "{control} relates to the unknown task {target}"
            )));
        }

        let control_side = self.side(control);
        for existing in self.instances(target) {
            if rel.accepts(control, control_side, existing, self.side(existing)) {
                debug!(control = %control, target = %existing, "relation matched existing");
                return Ok(existing.clone());
            }
        }

        let Some(inject) = &rel.inject else {
            return self
                .instantiate_spec(target, Instantiation::Force)?
                .ok_or_else(|| tracking(format!("could not instantiate {target}")));
        };

        let data = inject.apply_from_spec(control_side.values());
        let how = if data.is_empty() {
            Instantiation::Force
        } else {
            Instantiation::With(data)
        };
        let instance = self
            .instantiate_spec(target, how)?
            .ok_or_else(|| tracking(format!("could not instantiate {target}")))?;

        let report = inject.validate_details(
            self.side(control),
            InjectSide::Spec(&self.specs[&instance].extra),
            true,
        );
        if !report.is_ok() {
            return Err(tracking(format!(
                "injection into {instance} from {control} failed: {report}"
            )));
        }
        self.register_late_injection(&instance, inject, control)?;
        debug!(control = %control, target = %instance, "relation instantiated with injection");
        Ok(instance)
    }

    /// Resolve a `required_for` relation, declared by the abstract
    /// `rel.object`, against the concrete `target` it blocks.
    ///
    /// An existing blocker instance that accepts `target` is reused.
    /// Otherwise a new one is made with its constrained values taken from
    /// `target`, and the relation's spec injection is written into `target`
    /// so that the blocker's own expansion finds it rather than cloning it.
    pub fn instantiate_blocker(&mut self, rel: &RelationSpec, target: &TaskName) -> Result<Option<TaskName>> {
        let Some(blocker) = rel.object.clone() else {
            return Ok(None);
        };
        let target_side = self.side(target);
        let existing = self
            .instances(&blocker)
            .iter()
            .find(|inst| rel.accepts(inst, self.side(inst), target, target_side))
            .cloned();
        if let Some(existing) = existing {
            debug!(blocker = %existing, target = %target, "blocker matched existing");
            return Ok(Some(existing));
        }

        let target_vals = target_side.values();
        let pinned: Extra = rel
            .constraints
            .iter()
            .filter_map(|(targ_k, source_k)| {
                target_vals.get(targ_k).map(|v| (source_k.clone(), v.clone()))
            })
            .collect();
        let how = match pinned.is_empty() {
            true => Instantiation::Force,
            false => Instantiation::With(pinned),
        };
        let Some(instance) = self.instantiate_spec(&blocker, how)? else {
            return Ok(None);
        };

        if let Some(inject) = &rel.inject {
            let data = inject.apply_from_spec(self.side(&instance).values());
            self.inject_into(target, data, &instance)?;
            if !inject.from_state.is_empty() {
                warn!(
                    blocker = %instance,
                    target = %target,
                    "state injections are not replayed through required_for"
                );
            }
        }
        if !rel.accepts(&instance, self.side(&instance), target, self.side(target)) {
            warn!(blocker = %instance, target = %target, "new blocker does not accept its target");
        }
        debug!(blocker = %instance, target = %target, "blocker instantiated");
        Ok(Some(instance))
    }

    /// Merge injected values into a concrete spec, and its live task if it
    /// has one. Values the target already holds must agree.
    fn inject_into(&mut self, target: &TaskName, data: Extra, control: &TaskName) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        let spec = self
            .specs
            .get_mut(target)
            .ok_or_else(|| tracking(format!("cannot inject into unregistered {target}")))?;
        for (k, v) in &data {
            if spec.extra.get(k).is_some_and(|own| own != v) {
                return Err(DagtrackError::InjectionError(format!(
                    "{control} injects {k} = {v} into {target}, which already holds a different value"
                )));
            }
        }
        spec.extra.extend(data.clone());
        if let Some(task) = self.tasks.get_mut(target) {
            task.state.extend(data);
        }
        info!(target = %target, control = %control, "injected into blocked task");
        Ok(())
    }

    /// Head and cleanup names resolve to what the owner's instance
    /// generated, sharing its uuid.
    fn instantiate_implicit(&mut self, target: &TaskName, owner: &TaskName) -> Result<TaskName> {
        let owner_inst = self
            .instantiate_spec(owner, Instantiation::Reuse)?
            .ok_or_else(|| tracking(format!("could not instantiate {owner}")))?;
        self.generated
            .get(&owner_inst)
            .and_then(|names| names.iter().find(|g| g.last_mark() == target.last_mark()))
            .cloned()
            .ok_or_else(|| tracking(format!("{owner_inst} did not generate {target}")))
    }

    /// The live state of a task if it exists, otherwise its spec's extras.
    fn side(&self, name: &TaskName) -> InjectSide<'_> {
        match self.tasks.get(name) {
            Some(task) => InjectSide::Task(&task.state),
            None => match self.specs.get(name) {
                Some(spec) => InjectSide::Spec(&spec.extra),
                None => InjectSide::Spec(&EMPTY),
            },
        }
    }

    // ---- tasks ----

    /// Materialise a concrete spec into a live task.
    ///
    /// Cleanup tasks need a `parent` whose state they start from. Pending
    /// late injections are applied, then `must_inject` keys are checked.
    pub fn make_task(&mut self, name: &TaskName, parent: Option<&TaskName>) -> Result<()> {
        if !name.is_concrete() {
            return Err(tracking(format!("tried to make a task from the abstract {name}")));
        }
        if self.tasks.contains_key(name) {
            return Ok(());
        }
        let spec = self
            .specs
            .get(name)
            .cloned()
            .ok_or_else(|| tracking(format!("tried to make a task from unknown spec {name}")))?;
        if name.is_cleanup() && parent.is_none() {
            return Err(tracking(format!("cleanup task {name} needs a parent")));
        }

        let ctor = self.ctors.get(spec.ctor_name())?;
        let must_inject = spec.must_inject();
        let mut task = ctor(spec);

        if let Some(parent_state) = parent.and_then(|p| self.state_of(p)) {
            let own_name = task.state.get(TASK_NAME_K).cloned();
            task.state.extend(parent_state.clone());
            if let Some(own_name) = own_name {
                task.state.insert(TASK_NAME_K.to_string(), own_name);
            }
        }

        if let Some((inject, control)) = self.late_injections.get(name) {
            let control_state = self.state_of(control).ok_or_else(|| {
                tracking(format!("late injection source {control} is not a task"))
            })?;
            task.state.extend(inject.apply_from_state(control_state));
            let report = inject.validate_details(
                InjectSide::Task(control_state),
                InjectSide::Task(&task.state),
                false,
            );
            if !report.is_ok() {
                return Err(tracking(format!(
                    "late injection into {name} from {control} failed: {report}"
                )));
            }
        }

        let missing: Vec<&String> = must_inject
            .iter()
            .filter(|k| !task.state.contains_key(*k))
            .collect();
        if !missing.is_empty() {
            return Err(tracking(format!(
                "{name} did not receive required injections: {missing:?}"
            )));
        }

        debug!(task = %name, "made task");
        self.tasks.insert(name.clone(), task);
        Ok(())
    }

    /// Store a task object made elsewhere.
    pub fn insert_task(&mut self, task: Task) -> Result<()> {
        let name = task.name().clone();
        if !self.specs.contains_key(&name) {
            return Err(tracking(format!("no spec registered for task {name}")));
        }
        if self.tasks.contains_key(&name) {
            return Err(tracking(format!("a task object for {name} already exists")));
        }
        self.tasks.insert(name, task);
        Ok(())
    }

    /// Drop a dead task, remembering how it ended.
    pub(crate) fn retire(&mut self, name: &TaskName) {
        if let Some(task) = self.tasks.remove(name) {
            debug!(task = %name, outcome = ?task.outcome(), "retired");
            self.retired
                .insert(name.clone(), (task.outcome(), task.state));
        }
    }

    /// The outcome of a task's run, live or retired.
    pub fn outcome(&self, name: &TaskName) -> Option<TaskStatus> {
        match self.tasks.get(name) {
            Some(task) => task.outcome(),
            None => self.retired.get(name).and_then(|(outcome, _)| *outcome),
        }
    }

    /// The state of a live task, or the last state of a retired one.
    pub fn state_of(&self, name: &TaskName) -> Option<&Extra> {
        match self.tasks.get(name) {
            Some(task) => Some(&task.state),
            None => self.retired.get(name).map(|(_, state)| state),
        }
    }

    pub fn is_retired(&self, name: &TaskName) -> bool {
        self.retired.contains_key(name)
    }

    // ---- status ----

    pub fn get_status(&self, node: &Node) -> Status {
        match node {
            Node::Root => Status::Task(TaskStatus::Named),
            Node::Task(name) => Status::Task(self.task_status(name)),
            Node::Artifact(art) => Status::Artifact(self.artifact_status(art)),
        }
    }

    pub fn task_status(&self, name: &TaskName) -> TaskStatus {
        if let Some(task) = self.tasks.get(name) {
            task.status
        } else if self.retired.contains_key(name) {
            TaskStatus::Dead
        } else if self.specs.contains_key(name) {
            TaskStatus::Declared
        } else {
            TaskStatus::Named
        }
    }

    /// An override set by the runner wins; otherwise the filesystem decides.
    pub fn artifact_status(&self, art: &Artifact) -> ArtifactStatus {
        match self.artifact_status.get(art) {
            Some(status) => *status,
            None => self.artifact_disk_status(art),
        }
    }

    pub(crate) fn has_status_override(&self, art: &Artifact) -> bool {
        self.artifact_status.contains_key(art)
    }

    /// Status from the file alone. Abstract artifacts are only declared.
    pub fn artifact_disk_status(&self, art: &Artifact) -> ArtifactStatus {
        if art.is_abstract() || !self.fs.exists(art.path()) {
            return ArtifactStatus::Declared;
        }
        let Some(limit) = self.stale_after else {
            return ArtifactStatus::Exists;
        };
        match self.fs.modified(art.path()) {
            Ok(mtime) => {
                let age = SystemTime::now()
                    .duration_since(mtime)
                    .unwrap_or(Duration::ZERO);
                if age > limit {
                    ArtifactStatus::Stale
                } else {
                    ArtifactStatus::Exists
                }
            }
            Err(err) => {
                warn!(artifact = %art, error = %err, "could not read mtime");
                ArtifactStatus::Exists
            }
        }
    }

    pub fn artifact_exists(&self, art: &Artifact) -> bool {
        art.is_concrete() && self.fs.exists(art.path())
    }

    /// Update a node's status. Returns `false` if a task has no live
    /// object to update yet.
    pub fn set_status(&mut self, node: &Node, status: Status) -> Result<bool> {
        match (node, status) {
            (Node::Task(name), Status::Task(status)) => match self.tasks.get_mut(name) {
                Some(task) => {
                    info!(task = %name, from = %task.status, to = %status, "status");
                    task.set_status(status);
                    Ok(true)
                }
                None => {
                    debug!(task = %name, "not started yet");
                    Ok(false)
                }
            },
            (Node::Artifact(art), Status::Artifact(status)) => {
                info!(artifact = %art, to = %status, "status");
                self.artifact_status.insert(art.clone(), status);
                Ok(true)
            }
            (node, status) => Err(DagtrackError::TrackingError(format!(
                "bad status update: {node} -> {status}"
            ))),
        }
    }

    pub fn get_priority(&self, node: &Node) -> i64 {
        match node {
            Node::Task(name) => self
                .tasks
                .get(name)
                .map(|t| t.priority)
                .unwrap_or(self.declare_priority),
            Node::Artifact(art) => self
                .artifact_priority
                .get(art)
                .copied()
                .unwrap_or(self.declare_priority),
            Node::Root => self.declare_priority,
        }
    }

    pub(crate) fn decrement_artifact_priority(&mut self, art: &Artifact) -> i64 {
        let declare = self.declare_priority;
        let priority = self.artifact_priority.entry(art.clone()).or_insert(declare);
        *priority -= 1;
        *priority
    }

    // ---- verification ----

    /// Check the registry invariants. Strict mode fails on problems,
    /// otherwise they are logged.
    pub fn verify(&self, strict: bool) -> Result<bool> {
        let mut failures = Vec::new();
        for (abs, instances) in self.concrete.iter() {
            if !self.specs.contains_key(abs) && !self.implicit.contains_key(abs) && !abs.has_generated_section() {
                failures.push(format!("abstract spec {abs} is missing"));
            }
            let missing: Vec<String> = instances
                .iter()
                .filter(|x| !self.specs.contains_key(*x))
                .map(ToString::to_string)
                .collect();
            if !missing.is_empty() {
                failures.push(format!("concrete specs are missing: {missing:?}"));
            }
        }
        for (implicit, owner) in self.implicit.iter() {
            if !self.specs.contains_key(owner) {
                failures.push(format!("implicit spec {implicit} is missing its source {owner}"));
            }
        }
        for name in self.tasks.keys() {
            if !self.specs.contains_key(name) {
                failures.push(format!("task {name} has no spec"));
            }
        }

        if failures.is_empty() {
            return Ok(true);
        }
        if strict {
            Err(tracking(format!("registry failed validation: {failures:?}")))
        } else {
            warn!(?failures, "registry failed validation");
            Ok(false)
        }
    }

    /// Specs declared with the `auto` queue behaviour that have instances.
    pub(crate) fn auto_instances(&self) -> Vec<TaskName> {
        use crate::structs::QueueBehaviour;
        let mut names: Vec<TaskName> = self
            .specs
            .values()
            .filter(|s| s.name.is_concrete() && s.queue_behaviour == QueueBehaviour::AutoOnRegister)
            .filter(|s| !s.has_meta(TaskMeta::Disabled))
            .map(|s| s.name.clone())
            .collect();
        names.sort_by_key(ToString::to_string);
        names
    }
}

static EMPTY: Extra = Extra::new();
