//! Public facade: submit work, collect results by id, and control the worker lifecycle.

use std::mem;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::dispatcher::{DispatchStats, Dispatcher};
use crate::error::ServerError;
use crate::results::{ResultTable, Take};
use crate::task_queue::PendingQueue;
use crate::types::{TaskId, TaskOutcome};

/// Default bound on the dispatcher's idle wait between shutdown checks.
pub const DEFAULT_IDLE_WAIT: Duration = Duration::from_millis(50);

/// Tunables for a server instance.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Upper bound on how long the idle dispatcher sleeps before rechecking.
    pub idle_wait: Duration,
    /// Thread name given to the dispatcher.
    pub worker_name: String,
}

impl ServerConfig {
    pub fn idle_wait(mut self, idle_wait: Duration) -> Self {
        self.idle_wait = idle_wait;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = name.into();
        self
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            idle_wait: DEFAULT_IDLE_WAIT,
            worker_name: "dispatcher".to_string(),
        }
    }
}

enum Lifecycle {
    Created,
    Running(JoinHandle<DispatchStats>),
    /// A `stop` call owns the join handle and is waiting for the drain.
    Stopping,
    Stopped,
}

/// Single-worker task server generic over the result type.
///
/// Lifecycle is one-shot: `Created -> Running -> Stopped`. A second `start`
/// fails with [`ServerError::AlreadyRunning`], `start` after `stop` fails with
/// [`ServerError::Stopped`], and `stop` without a running worker fails with
/// [`ServerError::NotRunning`]. A `stop` racing another `stop` waits until the
/// worker has exited before reporting `NotRunning`. Submissions are accepted
/// before `start` and buffered until the worker appears.
pub struct Server<T: Send + 'static> {
    config: ServerConfig,
    queue: Arc<PendingQueue<T>>,
    results: Arc<ResultTable<T>>,
    lifecycle: Mutex<Lifecycle>,
    settled: Condvar,
}

impl<T: Send + 'static> Server<T> {
    pub fn new() -> Self {
        Self::with_config(ServerConfig::default())
    }

    pub fn with_config(config: ServerConfig) -> Self {
        Self {
            config,
            queue: Arc::new(PendingQueue::new()),
            results: Arc::new(ResultTable::new()),
            lifecycle: Mutex::new(Lifecycle::Created),
            settled: Condvar::new(),
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Spawn the dispatcher thread.
    pub fn start(&self) -> Result<(), ServerError> {
        let mut guard = self.lifecycle.lock().expect("lifecycle mutex poisoned");
        match *guard {
            Lifecycle::Created => {}
            Lifecycle::Running(_) => return Err(ServerError::AlreadyRunning),
            Lifecycle::Stopping | Lifecycle::Stopped => return Err(ServerError::Stopped),
        }
        // `Builder::spawn` panics on interior NULs; that would poison the lifecycle lock.
        if self.config.worker_name.contains('\0') {
            return Err(ServerError::InvalidWorkerName(self.config.worker_name.clone()));
        }
        let dispatcher = Dispatcher::new(
            Arc::clone(&self.queue),
            Arc::clone(&self.results),
            self.config.idle_wait,
        );
        let handle = thread::Builder::new()
            .name(self.config.worker_name.clone())
            .spawn(move || dispatcher.run())
            .map_err(ServerError::Spawn)?;
        *guard = Lifecycle::Running(handle);
        info!(
            worker = %self.config.worker_name,
            queued = self.queue.len(),
            "server started"
        );
        Ok(())
    }

    /// Enqueue a computation and return its id without blocking.
    pub fn submit<F>(&self, computation: F) -> Result<TaskId, ServerError>
    where
        F: FnOnce() -> T + Send + 'static,
    {
        self.queue
            .push(Box::new(computation))
            .map_err(|_| ServerError::Stopped)
    }

    /// Block until the result for `id` is available, then consume it.
    ///
    /// Blocks indefinitely for a task that is queued on a server that is never
    /// started. Once the server has stopped, a missing entry is reported as
    /// [`ServerError::ResultUnavailable`] instead of blocking.
    pub fn await_result(&self, id: TaskId) -> Result<T, ServerError> {
        self.check_issued(id)?;
        Self::finish(id, self.results.take(id, None), None)
    }

    /// Like [`Server::await_result`] but gives up after `timeout`.
    pub fn await_timeout(&self, id: TaskId, timeout: Duration) -> Result<T, ServerError> {
        self.check_issued(id)?;
        // A deadline past what `Instant` can represent means no deadline.
        let take = self.results.take(id, Instant::now().checked_add(timeout));
        Self::finish(id, take, Some(timeout))
    }

    /// Consume the result for `id` if it has already been published.
    ///
    /// `None` means the task has not finished yet; once the worker has exited a
    /// missing entry is reported as [`ServerError::ResultUnavailable`].
    pub fn try_result(&self, id: TaskId) -> Option<Result<T, ServerError>> {
        if let Err(err) = self.check_issued(id) {
            return Some(Err(err));
        }
        // An already-elapsed deadline turns `take` into a single atomic poll.
        match self.results.take(id, Some(Instant::now())) {
            Take::TimedOut => None,
            take => Some(Self::finish(id, take, None)),
        }
    }

    /// Close the queue, let the dispatcher drain it, and join the thread.
    pub fn stop(&self) -> Result<DispatchStats, ServerError> {
        let handle = {
            let mut guard = self.lifecycle.lock().expect("lifecycle mutex poisoned");
            match mem::replace(&mut *guard, Lifecycle::Stopping) {
                Lifecycle::Running(handle) => handle,
                Lifecycle::Stopping => {
                    let _settled = self
                        .settled
                        .wait_while(guard, |state| matches!(state, Lifecycle::Stopping))
                        .expect("condvar wait failed");
                    return Err(ServerError::NotRunning);
                }
                other => {
                    *guard = other;
                    return Err(ServerError::NotRunning);
                }
            }
        };
        debug!(queued = self.queue.len(), "stopping server, draining queue");
        self.queue.close();
        let joined = handle.join();
        {
            let mut guard = self.lifecycle.lock().expect("lifecycle mutex poisoned");
            *guard = Lifecycle::Stopped;
            self.settled.notify_all();
        }
        let stats = joined.map_err(|_| ServerError::WorkerPanicked)?;
        info!(
            executed = stats.executed,
            failed = stats.failed,
            unclaimed = self.results.len(),
            "server stopped"
        );
        Ok(stats)
    }

    /// True while the dispatcher thread is alive, including its final drain.
    pub fn is_running(&self) -> bool {
        let guard = self.lifecycle.lock().expect("lifecycle mutex poisoned");
        matches!(*guard, Lifecycle::Running(_) | Lifecycle::Stopping)
    }

    /// Tasks submitted but not yet picked up by the dispatcher.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Results published but not yet consumed.
    pub fn unclaimed(&self) -> usize {
        self.results.len()
    }

    fn check_issued(&self, id: TaskId) -> Result<(), ServerError> {
        if id == 0 || id > self.queue.last_issued() {
            return Err(ServerError::UnknownTask(id));
        }
        Ok(())
    }

    fn finish(id: TaskId, take: Take<T>, timeout: Option<Duration>) -> Result<T, ServerError> {
        match take {
            Take::Ready(outcome) => Self::unpack(id, outcome),
            Take::Sealed => Err(ServerError::ResultUnavailable(id)),
            Take::TimedOut => Err(ServerError::Timeout {
                id,
                ms: timeout.map_or(0, |t| u64::try_from(t.as_millis()).unwrap_or(u64::MAX)),
            }),
        }
    }

    fn unpack(id: TaskId, outcome: TaskOutcome<T>) -> Result<T, ServerError> {
        outcome.map_err(|failure| ServerError::ComputationFailed {
            id,
            message: failure.message,
        })
    }
}

impl<T: Send + 'static> Default for Server<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> Drop for Server<T> {
    fn drop(&mut self) {
        if self.is_running() {
            if let Err(err) = self.stop() {
                warn!(%err, "server drop failed to stop dispatcher");
            }
        }
    }
}
