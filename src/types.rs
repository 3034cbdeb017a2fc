//! Shared identifiers and the task model used across the server.

use std::any::Any;
use std::fmt;

/// Unique identifier for a submitted task; never reused by a server instance.
pub type TaskId = u64;

/// Zero-argument unit of work producing a value of the server's result type.
pub type Computation<T> = Box<dyn FnOnce() -> T + Send + 'static>;

/// What the dispatcher publishes for every executed task.
pub type TaskOutcome<T> = Result<T, TaskFailure>;

/// A computation paired with the id handed back to its producer.
pub struct TaskEnvelope<T> {
    /// Correlation id for the result table.
    pub id: TaskId,
    /// The work itself; consumed exactly once by the dispatcher.
    pub computation: Computation<T>,
}

impl<T> TaskEnvelope<T> {
    /// Construct a new envelope with the provided id and computation.
    pub fn new(id: TaskId, computation: Computation<T>) -> Self {
        Self { id, computation }
    }
}

impl<T> fmt::Debug for TaskEnvelope<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskEnvelope").field("id", &self.id).finish()
    }
}

/// Failure marker stored in place of a value when a computation panics.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TaskFailure {
    pub message: String,
}

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Extract a readable message from a `catch_unwind` payload.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        if let Some(s) = payload.downcast_ref::<&str>() {
            Self::new(*s)
        } else if let Some(s) = payload.downcast_ref::<String>() {
            Self::new(s.clone())
        } else {
            Self::new("computation panicked")
        }
    }
}

impl fmt::Display for TaskFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}
