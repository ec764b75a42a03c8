// src/tracker/status.rs

//! Task and artifact statuses.

use std::fmt;

/// Lifecycle of a task.
///
/// `NAMED -> DECLARED -> DEFINED -> INIT -> WAIT -> READY -> RUNNING ->
/// {SUCCESS | FAILED | HALTED | SKIPPED} -> TEARDOWN -> DEAD`, with
/// `DISABLED` reachable before running.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Only a name; nothing backs it.
    Named,
    /// A spec exists but no live task.
    Declared,
    /// A live task has been made.
    Defined,
    Init,
    Wait,
    Ready,
    Running,
    Success,
    Failed,
    Halted,
    Skipped,
    Teardown,
    Dead,
    Disabled,
}

impl TaskStatus {
    /// Statuses a task can finish a run with.
    pub const fn is_outcome(self) -> bool {
        matches!(
            self,
            TaskStatus::Success | TaskStatus::Failed | TaskStatus::Halted | TaskStatus::Skipped
        )
    }

    /// Statuses past running.
    pub const fn is_terminal(self) -> bool {
        self.is_outcome() || matches!(self, TaskStatus::Teardown | TaskStatus::Dead)
    }

    pub const fn is_failure(self) -> bool {
        matches!(self, TaskStatus::Failed | TaskStatus::Halted)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Named => "NAMED",
            TaskStatus::Declared => "DECLARED",
            TaskStatus::Defined => "DEFINED",
            TaskStatus::Init => "INIT",
            TaskStatus::Wait => "WAIT",
            TaskStatus::Ready => "READY",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Success => "SUCCESS",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Halted => "HALTED",
            TaskStatus::Skipped => "SKIPPED",
            TaskStatus::Teardown => "TEARDOWN",
            TaskStatus::Dead => "DEAD",
            TaskStatus::Disabled => "DISABLED",
        };
        f.write_str(s)
    }
}

/// Lifecycle of an artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArtifactStatus {
    Declared,
    Stale,
    Exists,
}

impl fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ArtifactStatus::Declared => "DECLARED",
            ArtifactStatus::Stale => "STALE",
            ArtifactStatus::Exists => "EXISTS",
        };
        f.write_str(s)
    }
}

/// Status of any node in the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Task(TaskStatus),
    Artifact(ArtifactStatus),
}

impl From<TaskStatus> for Status {
    fn from(s: TaskStatus) -> Self {
        Status::Task(s)
    }
}

impl From<ArtifactStatus> for Status {
    fn from(s: ArtifactStatus) -> Self {
        Status::Artifact(s)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Task(s) => write!(f, "{s}"),
            Status::Artifact(s) => write!(f, "{s}"),
        }
    }
}
