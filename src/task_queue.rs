//! Thread-safe FIFO pending queue with id allocation and a bounded-wait consumer.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::types::{Computation, TaskEnvelope, TaskId};

/// Result of a single bounded wait on the queue.
#[derive(Debug)]
pub enum Pop<T> {
    /// Next task in submission order (also returned while draining a closed queue).
    Task(TaskEnvelope<T>),
    /// The wait elapsed with nothing queued and the queue still open.
    Idle,
    /// The queue is closed and fully drained.
    Closed,
}

/// Push rejected because the queue is closed; hands the computation back.
pub struct QueueClosed<T>(pub Computation<T>);

impl<T> QueueClosed<T> {
    pub fn into_inner(self) -> Computation<T> {
        self.0
    }
}

impl<T> fmt::Debug for QueueClosed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("QueueClosed")
    }
}

/// Synchronized FIFO buffer of tasks that have not started yet.
pub struct PendingQueue<T> {
    inner: Mutex<QueueState<T>>,
    available: Condvar,
}

struct QueueState<T> {
    queue: VecDeque<TaskEnvelope<T>>,
    last_id: TaskId,
    closed: bool,
}

impl<T> PendingQueue<T> {
    /// Create an empty, open queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(QueueState {
                queue: VecDeque::new(),
                last_id: 0,
                closed: false,
            }),
            available: Condvar::new(),
        }
    }

    /// Allocate the next id and enqueue under one lock; returns the computation back if closed.
    pub fn push(&self, computation: Computation<T>) -> Result<TaskId, QueueClosed<T>> {
        let mut guard = self.inner.lock().expect("pending queue mutex poisoned");
        if guard.closed {
            return Err(QueueClosed(computation));
        }
        guard.last_id += 1;
        let id = guard.last_id;
        guard.queue.push_back(TaskEnvelope::new(id, computation));
        self.available.notify_one();
        Ok(id)
    }

    /// Try to pop immediately without blocking.
    pub fn try_pop(&self) -> Option<TaskEnvelope<T>> {
        let mut guard = self.inner.lock().expect("pending queue mutex poisoned");
        guard.queue.pop_front()
    }

    /// Wait up to `wait` for a task; queued tasks are handed out even after close.
    pub fn pop_timeout(&self, wait: Duration) -> Pop<T> {
        let guard = self.inner.lock().expect("pending queue mutex poisoned");
        // Wait releases the lock and re-acquires it before returning.
        let (mut guard, _) = self
            .available
            .wait_timeout_while(guard, wait, |state| {
                state.queue.is_empty() && !state.closed
            })
            .expect("condvar wait failed");
        match guard.queue.pop_front() {
            Some(task) => Pop::Task(task),
            None if guard.closed => Pop::Closed,
            None => Pop::Idle,
        }
    }

    /// Close the queue and wake all blocked consumers.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("pending queue mutex poisoned");
        guard.closed = true;
        self.available.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        let guard = self.inner.lock().expect("pending queue mutex poisoned");
        guard.closed
    }

    /// Highest id issued so far, or 0 before the first submission.
    pub fn last_issued(&self) -> TaskId {
        let guard = self.inner.lock().expect("pending queue mutex poisoned");
        guard.last_id
    }

    /// Current number of queued tasks.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("pending queue mutex poisoned");
        guard.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Default for PendingQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Arc, Barrier, mpsc};
    use std::thread;

    fn job(value: u64) -> Computation<u64> {
        Box::new(move || value)
    }

    #[test]
    fn concurrent_pushes_get_distinct_ids() {
        let queue = Arc::new(PendingQueue::<u64>::new());
        let producers = 4;
        let per_producer = 250;
        let barrier = Arc::new(Barrier::new(producers));

        let mut handles = Vec::new();
        for _ in 0..producers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                (0..per_producer)
                    .map(|i| queue.push(job(i)).expect("queue closed"))
                    .collect::<Vec<_>>()
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().expect("producer thread panicked") {
                // Each id should be handed out at most once.
                assert!(seen.insert(id));
            }
        }
        let total = (producers * per_producer as usize) as u64;
        assert_eq!(seen.len() as u64, total);
        assert_eq!(queue.last_issued(), total);
        assert!(!seen.contains(&0));
    }

    #[test]
    fn pops_in_submission_order() {
        let queue = PendingQueue::new();
        for value in 10..15 {
            queue.push(job(value)).expect("queue closed");
        }
        let mut ids = Vec::new();
        while let Some(task) = queue.try_pop() {
            assert_eq!((task.computation)(), task.id + 9);
            ids.push(task.id);
        }
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn pop_timeout_wakes_on_push() {
        let queue = Arc::new(PendingQueue::<u64>::new());
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("send ready");
            loop {
                if let Pop::Task(task) = queue_clone.pop_timeout(Duration::from_millis(20)) {
                    tx.send(task.id).expect("send task id");
                    return;
                }
            }
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        let id = queue.push(job(99)).expect("queue closed");

        let received = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("receive task id");
        assert_eq!(received, id);
        handle.join().expect("consumer thread panicked");
    }

    #[test]
    fn pop_timeout_reports_idle_when_empty() {
        let queue = PendingQueue::<u64>::new();
        assert!(matches!(
            queue.pop_timeout(Duration::from_millis(10)),
            Pop::Idle
        ));
    }

    #[test]
    fn closed_queue_drains_before_reporting_closed() {
        let queue = PendingQueue::new();
        queue.push(job(1)).expect("queue closed");
        queue.push(job(2)).expect("queue closed");
        queue.close();

        let wait = Duration::from_millis(10);
        assert!(matches!(queue.pop_timeout(wait), Pop::Task(t) if t.id == 1));
        assert!(matches!(queue.pop_timeout(wait), Pop::Task(t) if t.id == 2));
        assert!(matches!(queue.pop_timeout(wait), Pop::Closed));
    }

    #[test]
    fn close_unblocks_waiting_consumer() {
        let queue = Arc::new(PendingQueue::<u64>::new());
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("ready");
            let pop = queue_clone.pop_timeout(Duration::from_secs(5));
            done_tx.send(matches!(pop, Pop::Closed)).expect("done");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        queue.close();

        let closed = done_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("done recv");
        assert!(closed);
        handle.join().expect("consumer thread panicked");
    }

    #[test]
    fn push_fails_after_close() {
        let queue = PendingQueue::new();
        queue.push(job(1)).expect("queue closed");
        queue.close();
        let rejected = queue.push(job(2)).expect_err("push after close");
        assert_eq!(format!("{rejected:?}"), "QueueClosed");
        // The rejected work comes back intact and no id was spent on it.
        assert_eq!((rejected.into_inner())(), 2);
        assert_eq!(queue.last_issued(), 1);
        assert!(queue.is_closed());
    }
}
