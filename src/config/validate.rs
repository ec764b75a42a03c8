// src/config/validate.rs

use std::collections::BTreeSet;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{RawTaskFile, TaskFile, TrackerConfig};
use crate::errors::{DagtrackError, Result};
use crate::structs::{RelationKind, TaskSpec, Value};

impl TryFrom<RawTaskFile> for TaskFile {
    type Error = crate::errors::DagtrackError;

    fn try_from(raw: RawTaskFile) -> std::result::Result<Self, Self::Error> {
        validate_tracker_config(&raw.tracker)?;
        let specs = build_specs(&raw)?;
        validate_unique_names(&specs)?;
        validate_references(&specs)?;
        validate_dag(&specs)?;
        Ok(TaskFile::new_unchecked(raw.tracker, specs))
    }
}

pub fn validate_tracker_config(cfg: &TrackerConfig) -> Result<()> {
    if cfg.max_loop == 0 {
        return Err(DagtrackError::ConfigError(
            "[tracker].max_loop must be >= 1 (got 0)".to_string(),
        ));
    }
    if cfg.min_priority >= cfg.declare_priority {
        return Err(DagtrackError::ConfigError(format!(
            "[tracker].min_priority ({}) must be below declare_priority ({})",
            cfg.min_priority, cfg.declare_priority
        )));
    }
    Ok(())
}

fn build_specs(raw: &RawTaskFile) -> Result<Vec<TaskSpec>> {
    let mut specs = Vec::new();
    for (group, tables) in raw.tasks.iter() {
        for table in tables {
            let mut data = table.clone();
            data.insert("group".to_string(), Value::Str(group.clone()));
            specs.push(TaskSpec::build(&data)?);
        }
    }
    Ok(specs)
}

/// The name a spec will be registered under.
fn registered_name(spec: &TaskSpec) -> String {
    if spec.name.is_partial() {
        spec.name.pop(false).to_string()
    } else {
        spec.name.to_string()
    }
}

fn validate_unique_names(specs: &[TaskSpec]) -> Result<()> {
    let mut seen = BTreeSet::new();
    for spec in specs {
        let name = registered_name(spec);
        if !seen.insert(name.clone()) {
            return Err(DagtrackError::ConfigError(format!(
                "task '{}' is declared more than once",
                name
            )));
        }
    }
    Ok(())
}

fn validate_references(specs: &[TaskSpec]) -> Result<()> {
    let declared: BTreeSet<String> = specs.iter().map(registered_name).collect();

    for spec in specs {
        for source in spec.source_names() {
            if !declared.contains(&source.to_string()) {
                return Err(DagtrackError::ConfigError(format!(
                    "task '{}' has unknown source '{}'",
                    spec.name, source
                )));
            }
        }
        for rel in spec.relations() {
            let Some(target) = rel.task_target() else {
                continue;
            };
            let root = target.root().to_string();
            if !declared.contains(&root) {
                return Err(DagtrackError::ConfigError(format!(
                    "task '{}' relates to unknown task '{}'",
                    spec.name, target
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(specs: &[TaskSpec]) -> Result<()> {
    // Edge direction: dependency -> dependent.
    let names: Vec<String> = specs.iter().map(registered_name).collect();
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in names.iter() {
        graph.add_node(name.as_str());
    }

    let mut edges = Vec::new();
    for (spec, name) in specs.iter().zip(names.iter()) {
        for rel in spec.relations() {
            let Some(target) = rel.task_target() else {
                continue;
            };
            let target = target.root().to_string();
            if target == *name {
                return Err(DagtrackError::ConfigError(format!(
                    "task '{}' cannot relate to itself",
                    name
                )));
            }
            match rel.relation {
                RelationKind::Needs => edges.push((target, name.clone())),
                RelationKind::Blocks => edges.push((name.clone(), target)),
            }
        }
    }

    for (from, to) in edges.iter() {
        let (Some(from), Some(to)) = (
            names.iter().find(|n| *n == from),
            names.iter().find(|n| *n == to),
        ) else {
            continue;
        };
        graph.add_edge(from.as_str(), to.as_str(), ());
    }

    // A topological sort will fail if there is a cycle.
    match toposort(&graph, None) {
        Ok(_order) => Ok(()),
        Err(cycle) => Err(DagtrackError::ConfigError(format!(
            "cycle detected in task declarations involving '{}'",
            cycle.node_id()
        ))),
    }
}
