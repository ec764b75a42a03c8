// src/structs/build.rs

//! Ingestion of raw key-value data into [`TaskSpec`]s.
//!
//! This is the only way raw task definitions (from TOML or from a job at
//! runtime) become specs. Anything malformed is a `StructLoadError`.

use std::path::PathBuf;

use crate::errors::{DagtrackError, Result};
use crate::structs::action::{ActionElem, ActionGroup, ActionSpec};
use crate::structs::name::{GROUP_SEP, TaskName};
use crate::structs::relation::{RelationKind, RelationSpec, RelationTarget};
use crate::structs::spec::{QueueBehaviour, Source, TaskMeta, TaskSpec};
use crate::structs::value::{Extra, Value};

const DEPRECATED_SOURCE_K: &str = "source";

impl TaskSpec {
    /// Build a spec from a raw mapping.
    ///
    /// Keys are normalised (`-` becomes `_`), and `group` + `name` are
    /// joined into the full name. Unknown keys land in `extra`.
    pub fn build(data: &Extra) -> Result<TaskSpec> {
        build_inner(data).map_err(|err| match err {
            DagtrackError::StructLoadError(_) | DagtrackError::InjectionError(_) => err,
            other => DagtrackError::StructLoadError(other.to_string()),
        })
    }

    /// A bare spec with just a name.
    pub fn from_name(name: &str) -> Result<TaskSpec> {
        Ok(TaskSpec::new(name.parse()?))
    }
}

fn build_inner(data: &Extra) -> Result<TaskSpec> {
    let mut cleaned: Extra = data
        .iter()
        .map(|(k, v)| (k.replace('-', "_"), v.clone()))
        .collect();

    if cleaned.contains_key(DEPRECATED_SOURCE_K) {
        return Err(load_err("'source' is deprecated, use 'sources'".to_string()));
    }

    let name = take_name(&mut cleaned)?;
    let mut spec = TaskSpec::new(name);
    spec.meta.clear();

    for (key, val) in cleaned {
        if let Some(group) = ActionGroup::from_key(&key) {
            *spec.group_mut(group) = prepare_group(build_elems(&val, group.relation())?);
            continue;
        }
        match key.as_str() {
            "doc" => {
                spec.doc = val
                    .as_str_list()
                    .ok_or_else(|| load_err(format!("doc must be text: {val}")))?;
            }
            "sources" => spec.sources = build_sources(&val)?,
            "priority" => {
                spec.priority = val
                    .as_int()
                    .ok_or_else(|| load_err(format!("priority must be an integer: {val}")))?;
            }
            "ctor" => {
                let ctor = val
                    .as_str()
                    .ok_or_else(|| load_err(format!("ctor must be a string: {val}")))?;
                spec.ctor = Some(ctor.to_string());
            }
            "queue_behaviour" => {
                spec.queue_behaviour = val
                    .as_str()
                    .and_then(QueueBehaviour::from_key)
                    .ok_or_else(|| load_err(format!("unknown queue behaviour: {val}")))?;
            }
            "meta" | "flags" => {
                let keys = val
                    .as_str_list()
                    .ok_or_else(|| load_err(format!("{key} must be a list of flags: {val}")))?;
                for k in keys {
                    let flag = TaskMeta::from_key(&k)
                        .ok_or_else(|| load_err(format!("unknown task flag '{k}'")))?;
                    spec.meta.insert(flag);
                }
            }
            _ => {
                spec.extra.insert(key, val);
            }
        }
    }

    spec.finalise_meta();
    spec.check()?;
    Ok(spec)
}

fn take_name(data: &mut Extra) -> Result<TaskName> {
    let name = data
        .remove("name")
        .ok_or_else(|| load_err("spec has no name".to_string()))?;
    let name = name
        .as_str()
        .ok_or_else(|| load_err(format!("spec name must be a string: {name}")))?
        .to_string();

    match data.remove("group") {
        Some(Value::Str(group)) if !name.contains(GROUP_SEP) => {
            TaskName::new(&group, &name)
        }
        Some(Value::Str(_)) | None => name.parse(),
        Some(other) => Err(load_err(format!("group must be a string: {other}"))),
    }
}

fn build_sources(raw: &Value) -> Result<Vec<Source>> {
    let Value::List(items) = raw else {
        return Err(load_err(format!("sources must be a list: {raw}")));
    };
    items
        .iter()
        .map(|item| match item.as_str() {
            Some("None" | "none") => Ok(Source::Halt),
            Some(s) if s.contains(GROUP_SEP) => Ok(Source::Name(s.parse()?)),
            Some(s) => Ok(Source::Path(PathBuf::from(s))),
            None => Err(load_err(format!("bad source: {item}"))),
        })
        .collect()
}

/// Convert raw group data (strings and tables) into actions and relations.
pub fn build_elems(raw: &Value, relation: RelationKind) -> Result<Vec<ActionElem>> {
    let items = match raw {
        Value::List(items) => items.as_slice(),
        single => std::slice::from_ref(single),
    };
    items
        .iter()
        .map(|item| match item {
            Value::Map(m) if m.contains_key("do") => Ok(ActionSpec::build(item)?.into()),
            _ => Ok(RelationSpec::build(item, relation)?.into()),
        })
        .collect()
}

/// Add implicit relations and order a group.
///
/// A relation to a head or cleanup task also relates to its root task.
/// Artifact relations come first, then task relations, then actions, each
/// in declaration order.
pub fn prepare_group(mut elems: Vec<ActionElem>) -> Vec<ActionElem> {
    let implicit: Vec<ActionElem> = elems
        .iter()
        .filter_map(ActionElem::as_relation)
        .filter_map(|rel| {
            let target = rel.task_target()?;
            (target.is_head() || target.is_cleanup())
                .then(|| RelationSpec::new(target.root(), rel.relation).into())
        })
        .filter(|new: &ActionElem| !elems.contains(new))
        .collect();
    elems.extend(implicit);

    elems.sort_by_key(|elem| match elem {
        ActionElem::Relation(RelationSpec {
            target: RelationTarget::Artifact(_),
            ..
        }) => 0,
        ActionElem::Relation(_) => 1,
        ActionElem::Action(_) => 2,
    });
    elems
}

fn load_err(msg: String) -> DagtrackError {
    DagtrackError::StructLoadError(msg)
}
