// src/structs/mod.rs

//! The tracker's data model: names, specs, relations, injections and
//! artifacts.

pub mod action;
pub mod artifact;
pub mod build;
pub mod inject;
pub mod name;
pub mod relation;
pub mod spec;
pub mod value;

pub use action::{ActionElem, ActionGroup, ActionSpec};
pub use artifact::Artifact;
pub use inject::{InjectSide, InjectSpec, InjectionReport};
pub use name::{NameMark, TaskName};
pub use relation::{RelationKind, RelationSpec, RelationTarget};
pub use spec::{DelayedSpec, MergeSuffix, QueueBehaviour, Source, TaskMeta, TaskSpec};
pub use value::{Extra, Value};
