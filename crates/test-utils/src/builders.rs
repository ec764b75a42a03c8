#![allow(dead_code)]

use std::collections::BTreeMap;

use dagtrack::config::{RawTaskFile, TaskFile, TrackerConfig};
use dagtrack::errors::Result;
use dagtrack::structs::{Extra, TaskSpec, Value};

/// Builder for raw task data, turned into a [`TaskSpec`] through
/// `TaskSpec::build` like a task file would be.
#[derive(Debug, Clone)]
pub struct SpecBuilder {
    group: String,
    data: Extra,
}

impl SpecBuilder {
    /// `full_name` is `group::name`.
    pub fn new(full_name: &str) -> Self {
        let (group, name) = full_name
            .split_once("::")
            .unwrap_or_else(|| panic!("spec name '{full_name}' needs a group"));
        let mut data = Extra::new();
        data.insert("name".to_string(), Value::from(name));
        Self {
            group: group.to_string(),
            data,
        }
    }

    fn push(mut self, key: &str, val: Value) -> Self {
        let entry = self
            .data
            .entry(key.to_string())
            .or_insert_with(|| Value::List(Vec::new()));
        if let Value::List(items) = entry {
            items.push(val);
        }
        self
    }

    pub fn depends_on(self, target: &str) -> Self {
        self.push("depends_on", Value::from(target))
    }

    pub fn required_for(self, target: &str) -> Self {
        self.push("required_for", Value::from(target))
    }

    /// A `depends_on` relation given as a table (`constraints`, `inject`).
    pub fn depends_on_table(self, table: BTreeMap<String, Value>) -> Self {
        self.push("depends_on", Value::Map(table))
    }

    /// A `required_for` relation given as a table.
    pub fn required_for_table(self, table: BTreeMap<String, Value>) -> Self {
        self.push("required_for", Value::Map(table))
    }

    pub fn action(self, code: &str) -> Self {
        self.push("actions", action(code))
    }

    pub fn setup(self, code: &str) -> Self {
        self.push("setup", action(code))
    }

    pub fn cleanup(self, code: &str) -> Self {
        self.push("cleanup", action(code))
    }

    pub fn cleanup_needs(self, target: &str) -> Self {
        self.push("cleanup", Value::from(target))
    }

    pub fn head_action(self, code: &str) -> Self {
        self.push("head_actions", action(code))
    }

    pub fn source(self, source: &str) -> Self {
        self.push("sources", Value::from(source))
    }

    pub fn flag(self, flag: &str) -> Self {
        self.push("flags", Value::from(flag))
    }

    pub fn priority(self, priority: i64) -> Self {
        self.extra("priority", priority)
    }

    pub fn ctor(self, ctor: &str) -> Self {
        self.extra("ctor", ctor)
    }

    pub fn queue_behaviour(self, behaviour: &str) -> Self {
        self.extra("queue_behaviour", behaviour)
    }

    pub fn disabled(self) -> Self {
        self.extra("disabled", true)
    }

    pub fn extra(mut self, key: &str, val: impl Into<Value>) -> Self {
        self.data.insert(key.to_string(), val.into());
        self
    }

    pub fn group(&self) -> &str {
        &self.group
    }

    /// The table as it would appear under `[[tasks.<group>]]`.
    pub fn raw(&self) -> Extra {
        self.data.clone()
    }

    pub fn try_build(&self) -> Result<TaskSpec> {
        let mut data = self.raw();
        data.insert("group".to_string(), Value::from(self.group.as_str()));
        TaskSpec::build(&data)
    }

    pub fn build(&self) -> TaskSpec {
        self.try_build()
            .unwrap_or_else(|e| panic!("failed to build spec from builder: {e}"))
    }
}

fn action(code: &str) -> Value {
    let mut table = BTreeMap::new();
    table.insert("do".to_string(), Value::from(code));
    Value::Map(table)
}

/// A relation table: `{ task = target }` plus whatever is added.
#[derive(Debug, Clone)]
pub struct RelationTable {
    table: BTreeMap<String, Value>,
}

impl RelationTable {
    pub fn task(target: &str) -> Self {
        let mut table = BTreeMap::new();
        table.insert("task".to_string(), Value::from(target));
        Self { table }
    }

    /// Require `target_key` on the target to equal `control_key` on the
    /// control.
    pub fn constraint(mut self, target_key: &str, control_key: &str) -> Self {
        let entry = self
            .table
            .entry("constraints".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if let Value::Map(map) = entry {
            map.insert(target_key.to_string(), Value::from(control_key));
        }
        self
    }

    /// Add `target_key = control_key` to an injection section such as
    /// `from_spec` or `from_state`.
    pub fn inject(mut self, section: &str, target_key: &str, control_key: &str) -> Self {
        let inject = self
            .table
            .entry("inject".to_string())
            .or_insert_with(|| Value::Map(BTreeMap::new()));
        if let Value::Map(inject) = inject {
            let part = inject
                .entry(section.to_string())
                .or_insert_with(|| Value::Map(BTreeMap::new()));
            if let Value::Map(part) = part {
                part.insert(target_key.to_string(), Value::from(control_key));
            }
        }
        self
    }

    pub fn build(self) -> BTreeMap<String, Value> {
        self.table
    }
}

/// Builder for [`TaskFile`].
#[derive(Debug, Clone, Default)]
pub struct TaskFileBuilder {
    raw: RawTaskFile,
}

impl TaskFileBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tracker(mut self, tracker: TrackerConfig) -> Self {
        self.raw.tracker = tracker;
        self
    }

    pub fn with_max_loop(mut self, max_loop: usize) -> Self {
        self.raw.tracker.max_loop = max_loop;
        self
    }

    pub fn with_spec(mut self, spec: SpecBuilder) -> Self {
        self.raw
            .tasks
            .entry(spec.group().to_string())
            .or_default()
            .push(spec.raw());
        self
    }

    pub fn raw(&self) -> RawTaskFile {
        self.raw.clone()
    }

    pub fn try_build(self) -> Result<TaskFile> {
        TaskFile::try_from(self.raw)
    }

    pub fn build(self) -> TaskFile {
        self.try_build()
            .unwrap_or_else(|e| panic!("failed to build valid task file from builder: {e}"))
    }
}
