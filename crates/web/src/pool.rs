//! Bounded worker pool.
//!
//! A fixed set of long-lived threads drains one FIFO task queue protected
//! by a mutex and condition variable. The queue is bounded: once the
//! high-water mark is reached, [`WorkerPool::submit`] refuses the task and
//! the reactor answers the request with a 503 instead of stalling the
//! event loop.
//!
//! Shutdown is cooperative: the flag is set, all workers are notified, and
//! each worker exits once the queue is empty. In-flight tasks run to
//! completion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, trace};

pub(crate) type Task = Box<dyn FnOnce() + Send>;

/// The task queue was at its high-water mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct QueueFull;

struct PoolShared {
    queue: Mutex<VecDeque<Task>>,
    not_empty: Condvar,
    shutdown: AtomicBool,
    capacity: usize,
}

pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub(crate) fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let shared = Arc::new(PoolShared {
            queue: Mutex::new(VecDeque::new()),
            not_empty: Condvar::new(),
            shutdown: AtomicBool::new(false),
            capacity: capacity.max(1),
        });

        let handles = (0..workers)
            .map(|index| {
                let shared = Arc::clone(&shared);
                thread::Builder::new()
                    .name(format!("rivet-worker-{index}"))
                    .spawn(move || worker_loop(&shared))
                    .expect("failed to spawn worker thread")
            })
            .collect();

        debug!(workers, capacity, "worker pool started");
        Self { shared, workers: handles }
    }

    /// Enqueues a task, refusing once the high-water mark is reached.
    pub(crate) fn submit(&self, task: Task) -> Result<(), QueueFull> {
        {
            let mut queue = self.shared.queue.lock().unwrap();
            if queue.len() >= self.shared.capacity {
                return Err(QueueFull);
            }
            queue.push_back(task);
        }
        self.shared.not_empty.notify_one();
        Ok(())
    }

    /// Signals shutdown and joins every worker. Queued tasks are drained
    /// first.
    pub(crate) fn shutdown(self) {
        self.shared.shutdown.store(true, Ordering::Release);
        self.shared.not_empty.notify_all();
        for worker in self.workers {
            let _ = worker.join();
        }
        trace!("worker pool shut down");
    }
}

fn worker_loop(shared: &PoolShared) {
    loop {
        let task = {
            let mut queue = shared.queue.lock().unwrap();
            loop {
                if let Some(task) = queue.pop_front() {
                    break task;
                }
                if shared.shutdown.load(Ordering::Acquire) {
                    return;
                }
                queue = shared.not_empty.wait(queue).unwrap();
            }
        };
        task();
    }
}
