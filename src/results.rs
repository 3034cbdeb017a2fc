//! Rendezvous table of completed results, keyed by task id.
//!
//! An entry exists only between publication by the dispatcher and its single
//! consumption by a producer. Nothing is cached after that.

use std::collections::HashMap;
use std::sync::{Condvar, Mutex};
use std::time::Instant;

use crate::types::{TaskId, TaskOutcome};

/// Result of waiting on a single id.
#[derive(Debug)]
pub enum Take<T> {
    Ready(TaskOutcome<T>),
    TimedOut,
    /// The dispatcher has exited and no entry for the id exists.
    Sealed,
}

pub struct ResultTable<T> {
    inner: Mutex<ResultState<T>>,
    published: Condvar,
}

struct ResultState<T> {
    ready: HashMap<TaskId, TaskOutcome<T>>,
    sealed: bool,
}

impl<T> ResultTable<T> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ResultState {
                ready: HashMap::new(),
                sealed: false,
            }),
            published: Condvar::new(),
        }
    }

    /// Store the outcome for `id` and wake every waiter.
    pub fn publish(&self, id: TaskId, outcome: TaskOutcome<T>) {
        let mut guard = self.inner.lock().expect("result table mutex poisoned");
        let previous = guard.ready.insert(id, outcome);
        debug_assert!(previous.is_none(), "result published twice for task {id}");
        self.published.notify_all();
    }

    /// Block until the entry for `id` appears, then remove and return it.
    ///
    /// Gives up at `deadline` when one is set, and as soon as the table is
    /// sealed without holding the entry.
    pub fn take(&self, id: TaskId, deadline: Option<Instant>) -> Take<T> {
        let mut guard = self.inner.lock().expect("result table mutex poisoned");
        loop {
            if let Some(outcome) = guard.ready.remove(&id) {
                return Take::Ready(outcome);
            }
            if guard.sealed {
                return Take::Sealed;
            }
            guard = match deadline {
                None => self.published.wait(guard).expect("condvar wait failed"),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Take::TimedOut;
                    }
                    self.published
                        .wait_timeout(guard, deadline - now)
                        .expect("condvar wait failed")
                        .0
                }
            };
        }
    }

    /// Remove the entry for `id` if it is already there.
    pub fn try_take(&self, id: TaskId) -> Option<TaskOutcome<T>> {
        let mut guard = self.inner.lock().expect("result table mutex poisoned");
        guard.ready.remove(&id)
    }

    /// Mark that no further entries will be published and wake all waiters.
    pub fn seal(&self) {
        let mut guard = self.inner.lock().expect("result table mutex poisoned");
        guard.sealed = true;
        self.published.notify_all();
    }

    pub fn is_sealed(&self) -> bool {
        let guard = self.inner.lock().expect("result table mutex poisoned");
        guard.sealed
    }

    /// Number of published, not yet consumed entries.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("result table mutex poisoned");
        guard.ready.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for ResultTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
