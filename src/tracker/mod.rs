// src/tracker/mod.rs

//! Runtime tracking of tasks and artifacts.
//!
//! - `registry`: specs, instances, live tasks, artifacts.
//! - `network`: the dependency graph over concrete nodes.
//! - `queue`: priority ordering and the active set.
//! - `core`: the [`Tracker`] facade and its state machine.

pub mod core;
pub mod network;
pub mod queue;
pub mod registry;
pub mod status;
pub mod task;

pub use self::core::{Next, Tracker};
pub use network::{BuildSources, ConcreteEdges, EdgeKind, EdgeSummary, Node, TaskNetwork};
pub use queue::TrackerQueue;
pub use registry::{Instantiation, Registry};
pub use status::{ArtifactStatus, Status, TaskStatus};
pub use task::{CtorTable, Task, TaskCtor, TaskKind};
