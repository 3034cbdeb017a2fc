//! The single worker loop that executes queued computations in FIFO order.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::results::ResultTable;
use crate::task_queue::{PendingQueue, Pop};
use crate::types::{Computation, TaskEnvelope, TaskFailure, TaskOutcome};

/// Counters reported by the dispatcher when it terminates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DispatchStats {
    pub executed: u64,
    pub failed: u64,
}

pub(crate) struct Dispatcher<T> {
    queue: Arc<PendingQueue<T>>,
    results: Arc<ResultTable<T>>,
    idle_wait: Duration,
    stats: DispatchStats,
}

impl<T> Dispatcher<T> {
    pub(crate) fn new(
        queue: Arc<PendingQueue<T>>,
        results: Arc<ResultTable<T>>,
        idle_wait: Duration,
    ) -> Self {
        Self {
            queue,
            results,
            idle_wait,
            stats: DispatchStats::default(),
        }
    }

    /// Run until the queue is closed and drained, then seal the result table.
    pub(crate) fn run(mut self) -> DispatchStats {
        debug!("dispatcher started");
        loop {
            match self.queue.pop_timeout(self.idle_wait) {
                Pop::Task(task) => self.execute(task),
                Pop::Idle => trace!("dispatcher idle"),
                Pop::Closed => break,
            }
        }
        self.results.seal();
        debug!(
            executed = self.stats.executed,
            failed = self.stats.failed,
            "dispatcher drained and stopped"
        );
        self.stats
    }

    fn execute(&mut self, task: TaskEnvelope<T>) {
        let TaskEnvelope { id, computation } = task;
        trace!(task = id, "executing");
        let outcome = run_guarded(computation);
        self.stats.executed += 1;
        if let Err(failure) = &outcome {
            self.stats.failed += 1;
            warn!(task = id, %failure, "computation failed");
        }
        self.results.publish(id, outcome);
    }
}

/// Run a computation, turning a panic into a failure marker.
pub(crate) fn run_guarded<T>(computation: Computation<T>) -> TaskOutcome<T> {
    panic::catch_unwind(AssertUnwindSafe(computation)).map_err(TaskFailure::from_panic)
}
