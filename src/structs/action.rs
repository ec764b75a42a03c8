// src/structs/action.rs

//! Action specs and the named action groups of a task spec.

use std::fmt;

use crate::errors::{DagtrackError, Result};
use crate::structs::relation::{RelationKind, RelationSpec};
use crate::structs::value::{Extra, Value};

/// A single step a task performs. The tracker never runs these; it only
/// carries them to the runner.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ActionSpec {
    /// Code reference the runner resolves, e.g. `shell` or `pkg.mod:Class`.
    pub do_ref: Option<String>,
    pub args: Vec<Value>,
    pub kwargs: Extra,
}

impl ActionSpec {
    pub fn new(do_ref: impl Into<String>) -> Self {
        Self {
            do_ref: Some(do_ref.into()),
            ..Self::default()
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    /// Build from a table (`{do = "...", args = [...], ...}`) or a bare list
    /// of arguments.
    pub fn build(data: &Value) -> Result<Self> {
        match data {
            Value::List(args) => Ok(Self {
                args: args.clone(),
                ..Self::default()
            }),
            Value::Map(map) => {
                let mut spec = Self::default();
                for (key, val) in map {
                    match key.as_str() {
                        "do" => {
                            let code = val.as_str().ok_or_else(|| {
                                DagtrackError::StructLoadError(format!(
                                    "action 'do' must be a string, got: {val}"
                                ))
                            })?;
                            spec.do_ref = Some(code.to_string());
                        }
                        "args" => match val {
                            Value::List(xs) => spec.args = xs.clone(),
                            other => spec.args = vec![other.clone()],
                        },
                        _ => {
                            spec.kwargs.insert(key.clone(), val.clone());
                        }
                    }
                }
                Ok(spec)
            }
            other => Err(DagtrackError::StructLoadError(format!(
                "unrecognised action data: {other}"
            ))),
        }
    }
}

impl fmt::Display for ActionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<Action")?;
        if let Some(code) = &self.do_ref {
            write!(f, " do={code}")?;
        }
        if !self.args.is_empty() {
            write!(f, " args={}", Value::List(self.args.clone()))?;
        }
        write!(f, ">")
    }
}

/// The six ordered groups of a task spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionGroup {
    DependsOn,
    RequiredFor,
    Setup,
    Actions,
    Cleanup,
    OnFail,
}

impl ActionGroup {
    pub const ALL: [ActionGroup; 6] = [
        ActionGroup::DependsOn,
        ActionGroup::RequiredFor,
        ActionGroup::Setup,
        ActionGroup::Actions,
        ActionGroup::Cleanup,
        ActionGroup::OnFail,
    ];

    pub const fn key(self) -> &'static str {
        match self {
            ActionGroup::DependsOn => "depends_on",
            ActionGroup::RequiredFor => "required_for",
            ActionGroup::Setup => "setup",
            ActionGroup::Actions => "actions",
            ActionGroup::Cleanup => "cleanup",
            ActionGroup::OnFail => "on_fail",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|g| g.key() == key)
    }

    /// Relations declared in this group: blocking groups make the owner a
    /// dependency of the target.
    pub const fn relation(self) -> RelationKind {
        match self {
            ActionGroup::RequiredFor | ActionGroup::OnFail => RelationKind::Blocks,
            _ => RelationKind::Needs,
        }
    }
}

/// An entry of an action group.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionElem {
    Action(ActionSpec),
    Relation(RelationSpec),
}

impl ActionElem {
    pub fn as_relation(&self) -> Option<&RelationSpec> {
        match self {
            ActionElem::Relation(r) => Some(r),
            ActionElem::Action(_) => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionSpec> {
        match self {
            ActionElem::Action(a) => Some(a),
            ActionElem::Relation(_) => None,
        }
    }
}

impl From<ActionSpec> for ActionElem {
    fn from(a: ActionSpec) -> Self {
        ActionElem::Action(a)
    }
}

impl From<RelationSpec> for ActionElem {
    fn from(r: RelationSpec) -> Self {
        ActionElem::Relation(r)
    }
}
