//! Error types for the server facade and the CLI harness.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("server is already running")]
    AlreadyRunning,

    #[error("server is not running")]
    NotRunning,

    #[error("server has been stopped")]
    Stopped,

    #[error("task {0} was never submitted")]
    UnknownTask(TaskId),

    #[error("result for task {0} is no longer available")]
    ResultUnavailable(TaskId),

    #[error("task {id} failed: {message}")]
    ComputationFailed { id: TaskId, message: String },

    #[error("timed out after {ms}ms waiting for task {id}")]
    Timeout { id: TaskId, ms: u64 },

    #[error("invalid dispatcher thread name {0:?}")]
    InvalidWorkerName(String),

    #[error("failed to spawn dispatcher thread: {0}")]
    Spawn(#[source] io::Error),

    #[error("dispatcher thread panicked")]
    WorkerPanicked,
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("{}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to spawn producer thread '{name}': {source}")]
    Spawn {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("producer thread '{0}' panicked")]
    Producer(String),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl HarnessError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
