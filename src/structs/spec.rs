// src/structs/spec.rs

//! Task specs and the algebra over them.
//!
//! A [`TaskSpec`] is the static description of a task: its name, where it
//! came from, its six action groups and a bag of extra values. Specs are
//! combined with [`TaskSpec::merge`], copied into concrete instances with
//! [`TaskSpec::instantiate`], and concrete specs derive their job head or
//! cleanup spec through [`TaskSpec::generate_specs`].

use std::collections::BTreeSet;
use std::fmt;
use std::path::PathBuf;

use tracing::debug;

use crate::errors::{DagtrackError, Result};
use crate::structs::action::{ActionElem, ActionGroup};
use crate::structs::artifact::Artifact;
use crate::structs::build::{build_elems, prepare_group};
use crate::structs::inject::{InjectSpec, MUST_INJECT_K};
use crate::structs::name::{NameMark, TaskName};
use crate::structs::relation::{RelationKind, RelationSpec, RelationTarget};
use crate::structs::value::{Extra, Value};

pub const DEFAULT_PRIORITY: i64 = 10;
/// Extra key holding the raw action group of a job's head.
pub const HEAD_ACTIONS_K: &str = "head_actions";
/// Extra key naming the constructor of a job's head.
pub const SUB_CTOR_K: &str = "sub_ctor";
pub const DISABLED_K: &str = "disabled";

/// Flags describing what kind of task a spec produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskMeta {
    Task,
    Job,
    Transformer,
    Internal,
    JobHead,
    Concrete,
    Disabled,
}

impl TaskMeta {
    pub const fn key(self) -> &'static str {
        match self {
            TaskMeta::Task => "TASK",
            TaskMeta::Job => "JOB",
            TaskMeta::Transformer => "TRANSFORMER",
            TaskMeta::Internal => "INTERNAL",
            TaskMeta::JobHead => "JOB_HEAD",
            TaskMeta::Concrete => "CONCRETE",
            TaskMeta::Disabled => "DISABLED",
        }
    }

    /// Case-insensitive lookup.
    pub fn from_key(key: &str) -> Option<Self> {
        [
            TaskMeta::Task,
            TaskMeta::Job,
            TaskMeta::Transformer,
            TaskMeta::Internal,
            TaskMeta::JobHead,
            TaskMeta::Concrete,
            TaskMeta::Disabled,
        ]
        .into_iter()
        .find(|m| m.key().eq_ignore_ascii_case(key))
    }
}

/// How a task gets onto the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum QueueBehaviour {
    /// Only when the user queues it, or something depends on it.
    #[default]
    Default,
    /// As soon as it appears in the network.
    AutoOnRegister,
    /// When an adjacent node completes.
    Reactive,
}

impl QueueBehaviour {
    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "default" => Some(QueueBehaviour::Default),
            "auto" | "onRegister" | "on_register" => Some(QueueBehaviour::AutoOnRegister),
            "reactive" => Some(QueueBehaviour::Reactive),
            _ => None,
        }
    }
}

/// One link of a spec's ancestry.
#[derive(Debug, Clone, PartialEq)]
pub enum Source {
    Name(TaskName),
    Path(PathBuf),
    /// Stop climbing the source chain here.
    Halt,
}

impl Source {
    pub fn as_name(&self) -> Option<&TaskName> {
        match self {
            Source::Name(n) => Some(n),
            _ => None,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Name(n) => write!(f, "{n}"),
            Source::Path(p) => write!(f, "{}", p.display()),
            Source::Halt => write!(f, "None"),
        }
    }
}

/// What to append to a merged spec's name.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MergeSuffix {
    /// The `$+$` customised mark.
    #[default]
    Customised,
    Named(String),
    /// Keep the top spec's name as is.
    Keep,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TaskSpec {
    pub name: TaskName,
    pub doc: Vec<String>,
    /// Ancestors, oldest first.
    pub sources: Vec<Source>,
    pub depends_on: Vec<ActionElem>,
    pub required_for: Vec<ActionElem>,
    pub setup: Vec<ActionElem>,
    pub actions: Vec<ActionElem>,
    pub cleanup: Vec<ActionElem>,
    pub on_fail: Vec<ActionElem>,
    pub priority: i64,
    /// Constructor name in the task constructor table.
    pub ctor: Option<String>,
    pub queue_behaviour: QueueBehaviour,
    pub meta: BTreeSet<TaskMeta>,
    pub extra: Extra,
}

impl TaskSpec {
    pub fn new(name: TaskName) -> Self {
        let mut spec = Self {
            name,
            doc: Vec::new(),
            sources: Vec::new(),
            depends_on: Vec::new(),
            required_for: Vec::new(),
            setup: Vec::new(),
            actions: Vec::new(),
            cleanup: Vec::new(),
            on_fail: Vec::new(),
            priority: DEFAULT_PRIORITY,
            ctor: None,
            queue_behaviour: QueueBehaviour::Default,
            meta: BTreeSet::new(),
            extra: Extra::new(),
        };
        spec.finalise_meta();
        spec
    }

    pub fn group(&self, group: ActionGroup) -> &[ActionElem] {
        match group {
            ActionGroup::DependsOn => &self.depends_on,
            ActionGroup::RequiredFor => &self.required_for,
            ActionGroup::Setup => &self.setup,
            ActionGroup::Actions => &self.actions,
            ActionGroup::Cleanup => &self.cleanup,
            ActionGroup::OnFail => &self.on_fail,
        }
    }

    pub fn group_mut(&mut self, group: ActionGroup) -> &mut Vec<ActionElem> {
        match group {
            ActionGroup::DependsOn => &mut self.depends_on,
            ActionGroup::RequiredFor => &mut self.required_for,
            ActionGroup::Setup => &mut self.setup,
            ActionGroup::Actions => &mut self.actions,
            ActionGroup::Cleanup => &mut self.cleanup,
            ActionGroup::OnFail => &mut self.on_fail,
        }
    }

    /// Relations that shape the network. Cleanup relations belong to the
    /// generated cleanup task, so they are never included.
    pub fn relations(&self) -> impl Iterator<Item = &RelationSpec> {
        self.depends_on
            .iter()
            .chain(&self.setup)
            .chain(&self.actions)
            .chain(&self.required_for)
            .filter_map(ActionElem::as_relation)
    }

    pub fn has_meta(&self, meta: TaskMeta) -> bool {
        self.meta.contains(&meta)
    }

    /// Jobs generate a head; heads themselves do not.
    pub fn is_job(&self) -> bool {
        self.has_meta(TaskMeta::Job) && !self.name.is_head()
    }

    pub fn is_disabled(&self) -> bool {
        self.has_meta(TaskMeta::Disabled)
    }

    /// The constructor to build live tasks with.
    pub fn ctor_name(&self) -> &str {
        match &self.ctor {
            Some(ctor) => ctor,
            None if self.is_job() => "job",
            None => "task",
        }
    }

    pub fn source_names(&self) -> impl Iterator<Item = &TaskName> {
        self.sources.iter().filter_map(Source::as_name)
    }

    /// State keys a live task must hold before it may run.
    pub fn must_inject(&self) -> Vec<String> {
        self.extra
            .get(MUST_INJECT_K)
            .and_then(Value::as_str_list)
            .unwrap_or_default()
    }

    /// Derive flags from the name and extras.
    pub(crate) fn finalise_meta(&mut self) {
        if self.extra.get(DISABLED_K).and_then(Value::as_bool) == Some(true) {
            self.meta.insert(TaskMeta::Disabled);
        }
        if self.name.has_mark(NameMark::Extend) && !self.name.is_head() {
            self.meta.insert(TaskMeta::Job);
        }
        if self.meta.is_empty() {
            self.meta.insert(TaskMeta::Task);
        }
    }

    /// Structural checks shared by building and merging.
    pub(crate) fn check(&self) -> Result<()> {
        if self.name.is_partial() && self.sources.is_empty() {
            return Err(DagtrackError::StructLoadError(format!(
                "partial spec {} has no base source",
                self.name
            )));
        }
        if let Some(partial) = self.source_names().find(|s| s.is_partial()) {
            return Err(DagtrackError::StructLoadError(format!(
                "{} can not rely on the partial spec {partial}",
                self.name
            )));
        }
        Ok(())
    }

    /// A copy of this spec under a fresh concrete name.
    pub fn instantiate(&self) -> TaskSpec {
        let mut instance = self.clone();
        instance.name = self.name.de_uniq().to_uniq();
        instance
    }

    /// Combine `bot` and `top` into a new spec.
    ///
    /// Action groups, sources and meta are concatenated, extras and scalar
    /// fields prefer `top`. The result takes `top`'s name plus `suffix`, and is
    /// instantiated if `bot` was concrete but the result is not.
    pub fn merge(bot: &TaskSpec, top: &TaskSpec, suffix: MergeSuffix) -> Result<TaskSpec> {
        let mut result = top.clone();

        result.sources = bot.sources.clone();
        result.sources.push(Source::Name(bot.name.clone()));
        result.sources.push(Source::Name(top.name.clone()));

        for group in ActionGroup::ALL {
            let mut combined = bot.group(group).to_vec();
            combined.extend_from_slice(top.group(group));
            *result.group_mut(group) = combined;
        }

        result.meta = bot.meta.union(&top.meta).copied().collect();
        result.meta.remove(&TaskMeta::Internal);

        result.extra = bot.extra.clone();
        result.extra.extend(top.extra.clone());

        if result.ctor.is_none() {
            result.ctor = bot.ctor.clone();
        }
        if result.queue_behaviour == QueueBehaviour::Default {
            result.queue_behaviour = bot.queue_behaviour;
        }
        if result.doc.is_empty() {
            result.doc = bot.doc.clone();
        }

        match suffix {
            MergeSuffix::Customised => result.name = result.name.push_mark(NameMark::Customised),
            MergeSuffix::Named(word) => result.name = result.name.push(&word),
            MergeSuffix::Keep => {}
        }

        result.finalise_meta();
        result.check()?;
        debug!(top = %top.name, bot = %bot.name, result = %result.name, "merged specs");

        if bot.name.is_concrete() && !result.name.is_concrete() {
            return Ok(result.instantiate());
        }
        Ok(result)
    }

    /// `self + data`, where `data` must be a more specific name than `self`.
    pub fn under(&self, data: &TaskSpec, suffix: MergeSuffix) -> Result<TaskSpec> {
        if std::ptr::eq(self, data) {
            return Err(DagtrackError::TrackingError(format!(
                "tried to apply {} under itself",
                self.name
            )));
        }
        if !(self.name < data.name) {
            return Err(DagtrackError::TrackingError(format!(
                "tried to apply the unrelated spec {} under {}",
                data.name, self.name
            )));
        }
        TaskSpec::merge(self, data, suffix)
    }

    /// `self + data` for a raw data mapping.
    ///
    /// Without a `name`, the data is named as this spec's `$data$` variant.
    /// Without a `priority`, this spec's priority is kept.
    pub fn under_extra(&self, data: &Extra, suffix: MergeSuffix) -> Result<TaskSpec> {
        let mut raw = data.clone();
        raw.entry("name".to_string())
            .or_insert_with(|| Value::Str(self.name.push_mark(NameMark::Data).to_string()));
        let mut top = TaskSpec::build(&raw)?;
        if !data.contains_key("priority") {
            top.priority = self.priority;
        }
        TaskSpec::merge(self, &top, suffix)
    }

    /// Apply a partial spec over its base, dropping the partial mark.
    pub fn reify_partial(&self, base: &TaskSpec) -> Result<TaskSpec> {
        if !self.name.is_partial() {
            return Err(DagtrackError::TrackingError(format!(
                "{} is not a partial spec",
                self.name
            )));
        }
        match self.sources.last() {
            Some(Source::Name(last)) if *last == base.name => {}
            other => {
                return Err(DagtrackError::TrackingError(format!(
                    "{} expects base {:?}, got {}",
                    self.name,
                    other.map(Source::to_string),
                    base.name
                )));
            }
        }
        let mut top = self.clone();
        top.name = self.name.pop(false);
        top.sources.clear();
        TaskSpec::merge(base, &top, MergeSuffix::Keep)
    }

    /// Abstract names this spec will eventually generate instances of.
    pub fn implicit_names(&self) -> Vec<TaskName> {
        if self.is_job() {
            vec![self.name.with_head()]
        } else if !self.name.is_cleanup() {
            vec![self.name.with_cleanup()]
        } else {
            Vec::new()
        }
    }

    /// Specs derived from a concrete spec: a job head for jobs, otherwise a
    /// cleanup task (unless this already is one). Abstract specs derive
    /// nothing.
    pub fn generate_specs(&self) -> Result<Vec<TaskSpec>> {
        if !self.name.is_concrete() {
            return Ok(Vec::new());
        }
        let generated = if self.is_job() {
            vec![self.gen_job_head()?]
        } else if !self.name.is_cleanup() {
            vec![self.gen_cleanup()]
        } else {
            Vec::new()
        };
        debug!(spec = %self.name, count = generated.len(), "generated specs");
        Ok(generated)
    }

    fn gen_job_head(&self) -> Result<TaskSpec> {
        let head_name = self.name.with_head();
        let head_section = match self.extra.get(HEAD_ACTIONS_K) {
            Some(raw) => build_elems(raw, RelationKind::Needs)?,
            None => Vec::new(),
        };

        let mut depends_on: Vec<ActionElem> = vec![RelationSpec::needs(self.name.clone()).into()];
        let mut actions = Vec::new();
        for elem in head_section {
            match &elem {
                ActionElem::Relation(rel) if rel.task_target() == Some(&head_name) => {}
                ActionElem::Relation(_) => depends_on.push(elem),
                ActionElem::Action(_) => actions.push(elem),
            }
        }

        let mut head = TaskSpec::new(head_name);
        head.sources = self.sources.clone();
        head.sources.push(Source::Name(self.name.clone()));
        head.sources.push(Source::Halt);
        head.ctor = self
            .extra
            .get(SUB_CTOR_K)
            .and_then(Value::as_str)
            .map(str::to_string);
        head.queue_behaviour = QueueBehaviour::Reactive;
        head.depends_on = prepare_group(depends_on);
        head.required_for = self.required_for.clone();
        head.cleanup = self.cleanup.clone();
        head.actions = actions;
        head.priority = self.priority;
        head.extra = self.extra.clone();
        head.meta = self.meta.clone();
        head.meta.insert(TaskMeta::JobHead);
        head.meta.remove(&TaskMeta::Job);
        head.meta.remove(&TaskMeta::Task);
        Ok(head)
    }

    fn gen_cleanup(&self) -> TaskSpec {
        let cleanup_name = self.name.with_cleanup();
        let mut depends_on: Vec<ActionElem> = vec![RelationSpec::needs(self.name.clone()).into()];
        depends_on.extend(
            self.cleanup
                .iter()
                .filter(|e| {
                    e.as_relation()
                        .is_some_and(|r| r.task_target() != Some(&cleanup_name))
                })
                .cloned(),
        );

        let mut cleanup = TaskSpec::new(cleanup_name);
        cleanup.ctor = self.ctor.clone();
        cleanup.sources = vec![Source::Name(self.name.clone())];
        cleanup.queue_behaviour = QueueBehaviour::Reactive;
        cleanup.depends_on = prepare_group(depends_on);
        cleanup.actions = self
            .cleanup
            .iter()
            .filter(|e| e.as_action().is_some())
            .cloned()
            .collect();
        cleanup.priority = self.priority;
        cleanup.meta = self.meta.clone();
        cleanup.meta.insert(TaskMeta::Task);
        cleanup.meta.remove(&TaskMeta::Job);
        cleanup
    }

    /// The `(input, output)` artifact relations of a transformer.
    ///
    /// A transformer has exactly one abstract artifact in `depends_on` and
    /// one in `required_for`; anything else means it is not one.
    pub fn transformer_of(&self) -> Option<(&RelationSpec, &RelationSpec)> {
        if !self.has_meta(TaskMeta::Transformer) {
            return None;
        }
        fn solo(group: &[ActionElem]) -> Option<&RelationSpec> {
            let mut found = group
                .iter()
                .filter_map(ActionElem::as_relation)
                .filter(|r| r.artifact_target().is_some_and(Artifact::is_abstract))
                .filter(|r| r.artifact_target().is_some_and(|a| !a.as_str().contains("**")));
            match (found.next(), found.next()) {
                (Some(rel), None) => Some(rel),
                _ => None,
            }
        }
        Some((solo(&self.depends_on)?, solo(&self.required_for)?))
    }

    /// A concrete copy of this transformer bound to `target`.
    ///
    /// `target` may match either the input or the output pattern; the other
    /// side takes the same file stem. Returns `None` when it matches neither.
    pub fn instantiate_transformer(&self, target: &Artifact) -> Result<Option<TaskSpec>> {
        let Some((pre, post)) = self.transformer_of() else {
            return Err(DagtrackError::TrackingError(format!(
                "{} is not a transformer",
                self.name
            )));
        };
        let (Some(pre_art), Some(post_art)) = (pre.artifact_target(), post.artifact_target()) else {
            return Ok(None);
        };
        let Some(stem) = target.stem() else {
            return Ok(None);
        };

        let (pre_conc, post_conc) = if pre_art.matches(target) {
            (Some(target.clone()), post_art.with_stem(stem))
        } else if post_art.matches(target) {
            (pre_art.with_stem(stem), Some(target.clone()))
        } else {
            return Ok(None);
        };
        let (Some(pre_conc), Some(post_conc)) = (pre_conc, post_conc) else {
            return Ok(None);
        };

        let mut instance = self.instantiate();
        replace_relation(&mut instance.depends_on, pre, pre.instantiate(RelationTarget::Artifact(pre_conc))?);
        replace_relation(&mut instance.required_for, post, post.instantiate(RelationTarget::Artifact(post_conc))?);
        Ok(Some(instance))
    }
}

fn replace_relation(group: &mut [ActionElem], old: &RelationSpec, new: RelationSpec) {
    if let Some(slot) = group
        .iter_mut()
        .find(|e| e.as_relation().is_some_and(|r| r == old))
    {
        *slot = ActionElem::Relation(new);
    }
}

impl fmt::Display for TaskSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<TaskSpec {}>", self.name)
    }
}

/// A spec registered at runtime by a job: `base` re-declared as `target`,
/// with values injected from the base and explicit overrides on top.
#[derive(Debug, Clone, PartialEq)]
pub struct DelayedSpec {
    pub base: TaskName,
    pub target: TaskName,
    pub inject: Option<InjectSpec>,
    pub applied: Extra,
    pub overrides: Extra,
}

impl DelayedSpec {
    pub fn new(base: TaskName, target: TaskName) -> Self {
        Self {
            base,
            target,
            inject: None,
            applied: Extra::new(),
            overrides: Extra::new(),
        }
    }

    pub fn with_inject(mut self, inject: InjectSpec) -> Self {
        self.inject = Some(inject);
        self
    }

    pub fn with_applied(mut self, applied: Extra) -> Self {
        self.applied = applied;
        self
    }

    pub fn with_overrides(mut self, overrides: Extra) -> Self {
        self.overrides = overrides;
        self
    }

    /// Turn this into a real spec over its resolved base.
    pub fn upgrade(&self, base: &TaskSpec) -> Result<TaskSpec> {
        if base.name != self.base {
            return Err(DagtrackError::TrackingError(format!(
                "delayed spec {} expects base {}, got {}",
                self.target, self.base, base.name
            )));
        }
        let mut data = match &self.inject {
            Some(inj) => inj.apply_from_spec(&base.extra),
            None => Extra::new(),
        };
        data.extend(self.applied.clone());
        data.extend(self.overrides.clone());
        data.insert("name".to_string(), Value::Str(self.target.to_string()));
        base.under_extra(&data, MergeSuffix::Keep)
    }
}
