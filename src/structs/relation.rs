// src/structs/relation.rs

//! Relations between a spec and another task or artifact.
//!
//! `A needs B` makes `B` a dependency of `A`; `A blocks B` makes `A` a
//! dependency of `B`. Graph edges always point dependency -> dependent.

use std::collections::BTreeMap;
use std::fmt;

use tracing::debug;

use crate::errors::{DagtrackError, Result};
use crate::structs::artifact::{ARTIFACT_PREFIX, Artifact};
use crate::structs::inject::{InjectSide, InjectSpec};
use crate::structs::name::{GROUP_SEP, TaskName};
use crate::structs::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelationKind {
    Needs,
    Blocks,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RelationTarget {
    Task(TaskName),
    Artifact(Artifact),
}

impl fmt::Display for RelationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelationTarget::Task(t) => write!(f, "{t}"),
            RelationTarget::Artifact(a) => write!(f, "{a}"),
        }
    }
}

impl From<TaskName> for RelationTarget {
    fn from(t: TaskName) -> Self {
        RelationTarget::Task(t)
    }
}

impl From<Artifact> for RelationTarget {
    fn from(a: Artifact) -> Self {
        RelationTarget::Artifact(a)
    }
}

/// `{object} {relation} {target}`, with optional constraints and injection.
#[derive(Debug, Clone, PartialEq)]
pub struct RelationSpec {
    /// The owning spec, when recorded away from it (blocker reverse-pointers).
    pub object: Option<TaskName>,
    pub relation: RelationKind,
    pub target: RelationTarget,
    /// target key -> control key; values must be equal on both ends.
    pub constraints: BTreeMap<String, String>,
    pub inject: Option<InjectSpec>,
}

impl RelationSpec {
    pub fn new(target: impl Into<RelationTarget>, relation: RelationKind) -> Self {
        Self {
            object: None,
            relation,
            target: target.into(),
            constraints: BTreeMap::new(),
            inject: None,
        }
    }

    pub fn needs(target: impl Into<RelationTarget>) -> Self {
        Self::new(target, RelationKind::Needs)
    }

    pub fn blocks(target: impl Into<RelationTarget>) -> Self {
        Self::new(target, RelationKind::Blocks)
    }

    pub fn with_constraints<I, K>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = K>,
        K: Into<String>,
    {
        for k in keys {
            let k = k.into();
            self.constraints.insert(k.clone(), k);
        }
        self
    }

    pub fn with_inject(mut self, inject: InjectSpec) -> Self {
        self.inject = Some(inject);
        self
    }

    /// Build from a relation string (`group::task`, `file::>path`) or a table
    /// (`{task = ..., constraints = ..., inject = ...}` or `{path = ...}`).
    pub fn build(data: &Value, relation: RelationKind) -> Result<Self> {
        match data {
            Value::Str(s) if s.contains(ARTIFACT_PREFIX) => {
                Ok(Self::new(Artifact::new(s)?, relation))
            }
            Value::Str(s) if s.contains(GROUP_SEP) => Ok(Self::new(s.parse::<TaskName>()?, relation)),
            Value::Map(map) if map.contains_key("task") => {
                let name = map
                    .get("task")
                    .and_then(Value::as_str)
                    .ok_or_else(|| load_err(format!("relation 'task' must be a string: {data}")))?;
                let mut rel = Self::new(name.parse::<TaskName>()?, relation);
                if let Some(raw) = map.get("constraints") {
                    rel.constraints = build_constraints(raw)?;
                }
                if let Some(raw) = map.get("inject") {
                    rel.inject = InjectSpec::build(raw)?;
                }
                Ok(rel)
            }
            Value::Map(map) if map.contains_key("path") => {
                let path = map
                    .get("path")
                    .and_then(Value::as_str)
                    .ok_or_else(|| load_err(format!("relation 'path' must be a string: {data}")))?;
                Ok(Self::new(Artifact::new(path)?, relation))
            }
            other => Err(load_err(format!("bad data for a relation: {other}"))),
        }
    }

    pub fn task_target(&self) -> Option<&TaskName> {
        match &self.target {
            RelationTarget::Task(t) => Some(t),
            RelationTarget::Artifact(_) => None,
        }
    }

    pub fn artifact_target(&self) -> Option<&Artifact> {
        match &self.target {
            RelationTarget::Artifact(a) => Some(a),
            RelationTarget::Task(_) => None,
        }
    }

    /// Whether the edge runs owner -> target.
    pub fn is_blocking(&self) -> bool {
        self.relation == RelationKind::Blocks
    }

    /// Order `(owner, target)` as a `(dependency, dependent)` edge.
    pub fn to_ordered_pair<T>(&self, obj: T, target: T) -> (T, T) {
        match self.relation {
            RelationKind::Needs => (target, obj),
            RelationKind::Blocks => (obj, target),
        }
    }

    /// Copy this relation onto a more concrete target.
    ///
    /// Abstract artifact targets are reified against the given artifact.
    pub fn instantiate(&self, target: RelationTarget) -> Result<Self> {
        let target = match (&self.target, target) {
            (RelationTarget::Task(_), RelationTarget::Task(t)) if !t.is_concrete() => {
                return Err(DagtrackError::TrackingError(format!(
                    "relation to {} instantiated with abstract {t}",
                    self.target
                )));
            }
            (RelationTarget::Task(_), t @ RelationTarget::Task(_)) => t,
            (RelationTarget::Artifact(own), RelationTarget::Artifact(a)) => {
                let reified = if own.is_abstract() { own.reify(&a) } else { None };
                RelationTarget::Artifact(reified.unwrap_or(a))
            }
            (_, other) => {
                return Err(DagtrackError::TrackingError(format!(
                    "relation to {} instantiated with mismatched target {other}",
                    self.target
                )));
            }
        };
        Ok(Self {
            target,
            inject: None,
            ..self.clone()
        })
    }

    /// Whether a concrete `target` instance satisfies this relation for a
    /// concrete `control`: the names line up, constrained values agree, and
    /// any injection validates.
    pub fn accepts(
        &self,
        control_name: &TaskName,
        control: InjectSide<'_>,
        target_name: &TaskName,
        target: InjectSide<'_>,
    ) -> bool {
        if !(control_name.is_concrete() && target_name.is_concrete()) {
            return false;
        }
        let Some(own_target) = self.task_target() else {
            return false;
        };
        if !own_target.is_prefix_of(target_name) {
            return false;
        }

        let (control_vals, target_vals) = (control.values(), target.values());
        for (targ_k, source_k) in &self.constraints {
            let Some(source_v) = control_vals.get(source_k) else {
                continue;
            };
            match target_vals.get(targ_k) {
                Some(targ_v) if targ_v == source_v => {}
                other => {
                    debug!(
                        target = %target_name,
                        key = %targ_k,
                        found = ?other,
                        expected = %source_v,
                        "relation constraint does not match"
                    );
                    return false;
                }
            }
        }

        match &self.inject {
            None => true,
            Some(inj) => inj.validate(control, target, false),
        }
    }
}

impl fmt::Display for RelationSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rel = match self.relation {
            RelationKind::Needs => "needs",
            RelationKind::Blocks => "blocks",
        };
        match &self.object {
            Some(obj) => write!(f, "<{obj} {rel} {}>", self.target),
            None => write!(f, "<? {rel} {}>", self.target),
        }
    }
}

fn build_constraints(raw: &Value) -> Result<BTreeMap<String, String>> {
    match raw {
        Value::List(_) | Value::Str(_) => raw
            .as_str_list()
            .map(|keys| keys.into_iter().map(|k| (k.clone(), k)).collect())
            .ok_or_else(|| load_err(format!("constraint keys must be strings: {raw}"))),
        Value::Map(m) => m
            .iter()
            .map(|(k, v)| {
                v.as_str()
                    .map(|s| (k.clone(), s.to_string()))
                    .ok_or_else(|| load_err(format!("constraint {k} must name a key: {v}")))
            })
            .collect(),
        other => Err(load_err(format!("unknown constraints type: {other}"))),
    }
}

fn load_err(msg: String) -> DagtrackError {
    DagtrackError::StructLoadError(msg)
}
