//! Single-worker task server: producers submit computations, one dispatcher
//! thread runs them in submission order, and results are collected by id.

pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod ops;
pub mod results;
pub mod server;
pub mod sim;
pub mod task_queue;
pub mod types;
pub mod verify;

pub use dispatcher::DispatchStats;
pub use error::{HarnessError, ServerError};
pub use server::{Server, ServerConfig};
pub use types::{TaskFailure, TaskId};
