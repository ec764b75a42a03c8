// src/tracker/task.rs

//! Live tasks and the table of constructors that make them.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::errors::{DagtrackError, Result};
use crate::structs::{ActionElem, ActionGroup, ActionSpec, Extra, TaskName, TaskSpec, Value};
use crate::tracker::status::TaskStatus;

/// State key holding the task's own name.
pub const TASK_NAME_K: &str = "_task_name";
/// State key holding the index of the action being run.
pub const ACTION_STEP_K: &str = "_action_step";

/// `name`, `pkg.module`, or `pkg.module:Symbol`.
static CODE_REF: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][\w-]*(\.[A-Za-z_][\w-]*)*(:[A-Za-z_]\w*)?$"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskKind {
    Task,
    /// Can add tasks to the tracker while it runs.
    Job,
}

/// A materialised concrete spec with its own mutable state.
#[derive(Debug, Clone)]
pub struct Task {
    spec: TaskSpec,
    kind: TaskKind,
    pub status: TaskStatus,
    pub priority: i64,
    /// Values shared with cleanup tasks and late injections.
    pub state: Extra,
    outcome: Option<TaskStatus>,
}

impl Task {
    pub fn new(spec: TaskSpec) -> Self {
        Self::with_kind(spec, TaskKind::Task)
    }

    pub fn new_job(spec: TaskSpec) -> Self {
        Self::with_kind(spec, TaskKind::Job)
    }

    fn with_kind(spec: TaskSpec, kind: TaskKind) -> Self {
        let mut state = spec.extra.clone();
        state.insert(TASK_NAME_K.to_string(), Value::Str(spec.name.to_string()));
        state.insert(ACTION_STEP_K.to_string(), Value::Int(0));
        Self {
            priority: spec.priority,
            spec,
            kind,
            status: TaskStatus::Defined,
            state,
            outcome: None,
        }
    }

    pub fn name(&self) -> &TaskName {
        &self.spec.name
    }

    pub fn spec(&self) -> &TaskSpec {
        &self.spec
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    /// Set the status, remembering run outcomes.
    pub fn set_status(&mut self, status: TaskStatus) {
        if status.is_outcome() {
            self.outcome = Some(status);
        }
        self.status = status;
    }

    /// How the task's run ended, once it has.
    pub fn outcome(&self) -> Option<TaskStatus> {
        self.outcome
    }

    /// Look up an action group by its key (`setup`, `actions`, ...).
    pub fn get_action_group(&self, name: &str) -> Result<&[ActionElem]> {
        if name.is_empty() {
            return Err(DagtrackError::TaskError(format!(
                "{}: no action group name given",
                self.name()
            )));
        }
        match ActionGroup::from_key(name) {
            Some(group) => Ok(self.spec.group(group)),
            None => {
                warn!(task = %self.name(), group = name, "unknown action group");
                Ok(&[])
            }
        }
    }

    /// The actions to run, in order, after checking every code reference.
    pub fn prepare_actions(&self) -> Result<Vec<&ActionSpec>> {
        let actions: Vec<&ActionSpec> = [ActionGroup::Setup, ActionGroup::Actions]
            .into_iter()
            .flat_map(|g| self.spec.group(g))
            .filter_map(ActionElem::as_action)
            .collect();

        let code_ref = CODE_REF
            .as_ref()
            .map_err(|e| DagtrackError::TaskError(format!("code reference pattern: {e}")))?;
        let bad: Vec<String> = actions
            .iter()
            .filter_map(|a| a.do_ref.as_deref())
            .filter(|code| !code_ref.is_match(code))
            .map(str::to_string)
            .collect();
        if !bad.is_empty() {
            return Err(DagtrackError::TaskError(format!(
                "{}: bad action code references: {}",
                self.name(),
                bad.join(", ")
            )));
        }
        Ok(actions)
    }
}

/// Makes a live task from a concrete spec.
pub type TaskCtor = fn(TaskSpec) -> Task;

/// Named task constructors. `task` and `job` are always present.
#[derive(Debug, Clone)]
pub struct CtorTable {
    ctors: HashMap<String, TaskCtor>,
}

impl Default for CtorTable {
    fn default() -> Self {
        let mut ctors: HashMap<String, TaskCtor> = HashMap::new();
        ctors.insert("task".to_string(), Task::new);
        ctors.insert("job".to_string(), Task::new_job);
        Self { ctors }
    }
}

impl CtorTable {
    pub fn register(&mut self, name: impl Into<String>, ctor: TaskCtor) {
        self.ctors.insert(name.into(), ctor);
    }

    pub fn get(&self, name: &str) -> Result<TaskCtor> {
        self.ctors.get(name).copied().ok_or_else(|| {
            DagtrackError::TrackingError(format!("unknown task constructor '{name}'"))
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.ctors.contains_key(name)
    }
}
