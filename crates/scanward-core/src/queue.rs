//! Serialized task queue with a single, lazily spawned worker thread.
//!
//! Jobs run strictly in submission order and never overlap. The worker exits
//! after an idle period and is respawned by the next `submit`; jobs queued in
//! between are kept in order because only one worker can be alive at a time.

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, trace};

use crate::CoreError;

struct Job {
    label: &'static str,
    run: Box<dyn FnOnce() + Send + 'static>,
}

struct QueueState {
    jobs: VecDeque<Job>,
    worker_alive: bool,
    running: bool,
}

struct QueueInner {
    name: String,
    idle_timeout: Duration,
    state: Mutex<QueueState>,
    available: Condvar,
}

/// Single-worker FIFO queue for engine-mutating operations.
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl TaskQueue {
    /// Create a queue whose worker thread is named `name`.
    pub fn new(name: impl Into<String>, idle_timeout: Duration) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                name: name.into(),
                idle_timeout,
                state: Mutex::new(QueueState {
                    jobs: VecDeque::new(),
                    worker_alive: false,
                    running: false,
                }),
                available: Condvar::new(),
            }),
        }
    }

    /// Enqueue `op`; `label` identifies it in logs.
    pub fn submit<F>(&self, label: &'static str, op: F) -> Result<(), CoreError>
    where
        F: FnOnce() + Send + 'static,
    {
        let mut state = self.inner.state.lock();
        state.jobs.push_back(Job {
            label,
            run: Box::new(op),
        });

        if state.worker_alive {
            self.inner.available.notify_one();
            return Ok(());
        }

        let inner = self.inner.clone();
        let spawned = std::thread::Builder::new()
            .name(self.inner.name.clone())
            .spawn(move || worker_loop(inner));

        match spawned {
            Ok(_) => {
                state.worker_alive = true;
                debug!(queue = %self.inner.name, "Queue worker spawned");
                Ok(())
            }
            Err(e) => {
                state.jobs.pop_back();
                Err(CoreError::QueueSpawn(e))
            }
        }
    }

    /// Jobs waiting to start (the running one excluded)
    pub fn pending(&self) -> usize {
        self.inner.state.lock().jobs.len()
    }

    /// Whether a job is executing right now
    pub fn is_busy(&self) -> bool {
        self.inner.state.lock().running
    }

    /// Whether the worker thread currently exists
    pub fn is_worker_alive(&self) -> bool {
        self.inner.state.lock().worker_alive
    }
}

fn worker_loop(inner: Arc<QueueInner>) {
    loop {
        let job = {
            let mut state = inner.state.lock();
            state.running = false;
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    state.running = true;
                    break job;
                }
                let timed_out = inner
                    .available
                    .wait_for(&mut state, inner.idle_timeout)
                    .timed_out();
                if timed_out && state.jobs.is_empty() {
                    state.worker_alive = false;
                    debug!(queue = %inner.name, "Queue worker idle, exiting");
                    return;
                }
            }
        };

        trace!(queue = %inner.name, job = job.label, "Running job");
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(job.run)) {
            error!(
                queue = %inner.name,
                job = job.label,
                reason = panic_message(payload.as_ref()),
                "Queued operation failed, continuing with the next one"
            );
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&'static str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}
