use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};

use crate::state::SharedState;

/// Terminal and non-terminal lifecycle states of a registered task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskStatus {
    Pending,
    Running,
    Passed,
    Failed,
    Skipped,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskStatus::Passed | TaskStatus::Failed | TaskStatus::Skipped)
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Passed => "PASSED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Skipped => "SKIPPED",
        };
        f.write_str(s)
    }
}

/// A worker's stable identity, or the explicit sentinel for tasks that never
/// reached a worker (skipped tasks never dispatch). The source sometimes
/// passes `None` here; we standardize on an explicit variant instead so hook
/// signatures stay uniform across all terminal statuses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadId {
    Worker(usize),
    Unassigned,
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThreadId::Worker(i) => write!(f, "thread_{i}"),
            ThreadId::Unassigned => write!(f, "unassigned"),
        }
    }
}

impl Serialize for ThreadId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// What a task callable returns: the value it produced, or an error description.
pub type TaskOutcome = Result<serde_json::Value, String>;

/// Zero-or-one-argument invocable, dispatched by a tagged union at registration
/// time rather than by reflecting over argument count (there is no reflection
/// in Rust, and this keeps the call site monomorphic).
#[derive(Clone)]
pub enum TaskBody {
    Plain(Arc<dyn Fn() -> TaskOutcome + Send + Sync>),
    WithState(Arc<dyn Fn(&SharedState) -> TaskOutcome + Send + Sync>),
}

impl TaskBody {
    pub fn with_state(&self) -> bool {
        matches!(self, TaskBody::WithState(_))
    }

    pub fn invoke(&self, state: &SharedState) -> TaskOutcome {
        match self {
            TaskBody::Plain(f) => f(),
            TaskBody::WithState(f) => f(state),
        }
    }
}

impl fmt::Debug for TaskBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskBody::Plain(_) => f.write_str("TaskBody::Plain(..)"),
            TaskBody::WithState(_) => f.write_str("TaskBody::WithState(..)"),
        }
    }
}

/// The immutable definition of a registered task: its callable, declared
/// predecessors, and informational tags. Frozen once `start()` begins.
#[derive(Debug, Clone)]
pub struct TaskDef {
    pub name: String,
    pub body: TaskBody,
    pub after: Vec<String>,
    pub tags: Vec<String>,
}

/// The mutable run-time record for one task, updated only under the
/// scheduler's internal bookkeeping lock.
#[derive(Debug, Clone)]
pub struct TaskRun {
    pub status: TaskStatus,
    pub result: Option<serde_json::Value>,
    pub error: Option<String>,
    pub assigned_thread: ThreadId,
}

impl Default for TaskRun {
    fn default() -> Self {
        Self {
            status: TaskStatus::Pending,
            result: None,
            error: None,
            assigned_thread: ThreadId::Unassigned,
        }
    }
}
