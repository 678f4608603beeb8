//! Interruptible bounded worker pool
//!
//! Executes tabulation tasks on a fixed set of worker threads and detects
//! quiescence: `await_completion` returns once no task is queued or running
//! and no finishing task has submitted new work.
//!
//! # Implementation Details
//! - **Queue**: Mutex-protected `VecDeque` plus a condvar (NOT lock-free)
//! - **Quiescence**: a single `pending` counter covering queued + running
//!   tasks; a task is counted from submission until its closure returns, so
//!   a finishing task that submits more work can never drop the counter to
//!   zero early
//! - **Interruption**: cooperative; queued tasks are drained without being
//!   run, tasks already running finish their current unit
//! - **Failures**: the first task panic is captured and re-surfaced from
//!   `await_completion`; it also interrupts the pool
//!
//! Shutdown rejects new submissions (they are silently dropped) and lets
//! workers exit once the queue is empty.

use std::any::Any;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::{Condvar, Mutex};
use tracing::error;

use crate::errors::{Result, SolverError};

type Task = Box<dyn FnOnce() + Send + 'static>;

/// Shared pool state, owned jointly by the handle and the workers
struct ExecutorState {
    /// Queued tasks; the mutex also anchors both condvars
    queue: Mutex<VecDeque<Task>>,

    /// Signalled when a task is queued or the pool shuts down
    task_ready: Condvar,

    /// Signalled when `pending` or `live_workers` drops to zero
    state_change: Condvar,

    /// Queued + running task count
    pending: AtomicUsize,

    /// Workers that have not exited yet
    live_workers: AtomicUsize,

    /// Cooperative cancellation flag; queued tasks are drained unrun
    interrupted: AtomicBool,

    /// No further submissions accepted; workers exit once the queue drains
    shutting_down: AtomicBool,

    /// First captured task panic
    first_failure: Mutex<Option<String>>,
}

impl ExecutorState {
    fn worker_loop(&self) {
        loop {
            let task = {
                let mut queue = self.queue.lock();
                loop {
                    if let Some(task) = queue.pop_front() {
                        break Some(task);
                    }
                    if self.shutting_down.load(Ordering::Acquire) {
                        break None;
                    }
                    self.task_ready.wait(&mut queue);
                }
            };

            let Some(task) = task else { break };

            if !self.interrupted.load(Ordering::Acquire) {
                if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
                    self.record_failure(payload);
                }
            }

            if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                let _guard = self.queue.lock();
                self.state_change.notify_all();
            }
        }

        if self.live_workers.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.queue.lock();
            self.state_change.notify_all();
        }
    }

    /// Keep the first failure, interrupt everything else
    fn record_failure(&self, payload: Box<dyn Any + Send>) {
        let message = panic_message(payload);
        error!(failure = %message, "tabulation task panicked");
        {
            let mut first = self.first_failure.lock();
            if first.is_none() {
                *first = Some(message);
            }
        }
        self.interrupted.store(true, Ordering::Release);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unidentified panic payload".to_string()
    }
}

/// Bounded worker pool with completion detection and cooperative
/// interruption
pub struct InterruptibleExecutor {
    state: Arc<ExecutorState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl InterruptibleExecutor {
    /// Create a pool with an explicit worker count
    pub fn new(worker_count: usize) -> Result<Self> {
        if worker_count == 0 {
            return Err(SolverError::configuration(
                "executor needs at least one worker thread",
            ));
        }

        let state = Arc::new(ExecutorState {
            queue: Mutex::new(VecDeque::new()),
            task_ready: Condvar::new(),
            state_change: Condvar::new(),
            pending: AtomicUsize::new(0),
            live_workers: AtomicUsize::new(worker_count),
            interrupted: AtomicBool::new(false),
            shutting_down: AtomicBool::new(false),
            first_failure: Mutex::new(None),
        });

        let mut workers = Vec::with_capacity(worker_count);
        for idx in 0..worker_count {
            let worker_state = Arc::clone(&state);
            let handle = std::thread::Builder::new()
                .name(format!("tabulation-worker-{idx}"))
                .spawn(move || worker_state.worker_loop())
                .map_err(|e| SolverError::configuration(format!("failed to spawn worker: {e}")))?;
            workers.push(handle);
        }

        Ok(Self {
            state,
            workers: Mutex::new(workers),
        })
    }

    /// Create a pool sized `max(1, cores - 1)`
    pub fn with_default_pool() -> Result<Self> {
        Self::new(default_pool_size())
    }

    /// Submit a task. Silently dropped once shutdown has begun.
    pub fn execute(&self, task: impl FnOnce() + Send + 'static) {
        if self.state.shutting_down.load(Ordering::Acquire) {
            return;
        }
        self.state.pending.fetch_add(1, Ordering::AcqRel);
        {
            let mut queue = self.state.queue.lock();
            // re-check under the lock so a concurrent shutdown cannot strand
            // a queued task after the workers have exited
            if self.state.shutting_down.load(Ordering::Acquire) {
                drop(queue);
                if self.state.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let _guard = self.state.queue.lock();
                    self.state.state_change.notify_all();
                }
                return;
            }
            queue.push_back(Box::new(task));
        }
        self.state.task_ready.notify_one();
    }

    /// Block until no task is queued or running. Returns the first captured
    /// task failure, if any.
    pub fn await_completion(&self) -> std::result::Result<(), String> {
        {
            let mut queue = self.state.queue.lock();
            while self.state.pending.load(Ordering::Acquire) != 0 {
                self.state.state_change.wait(&mut queue);
            }
        }
        match self.state.first_failure.lock().clone() {
            Some(failure) => Err(failure),
            None => Ok(()),
        }
    }

    /// Request cooperative termination: queued tasks are drained unrun,
    /// running tasks finish their current unit.
    pub fn interrupt(&self) {
        self.state.interrupted.store(true, Ordering::Release);
        let _guard = self.state.queue.lock();
        self.state.task_ready.notify_all();
    }

    /// Stop accepting tasks and let workers exit once the queue drains
    pub fn shutdown(&self) {
        let _guard = self.state.queue.lock();
        self.state.shutting_down.store(true, Ordering::Release);
        self.state.task_ready.notify_all();
    }

    /// Block until every worker thread is gone
    pub fn await_termination(&self) {
        {
            let mut queue = self.state.queue.lock();
            while self.state.live_workers.load(Ordering::Acquire) != 0 {
                self.state.state_change.wait(&mut queue);
            }
        }
        let mut workers = self.workers.lock();
        for handle in workers.drain(..) {
            let _ = handle.join();
        }
    }

    /// Whether shutdown has begun but workers are still alive
    pub fn is_terminating(&self) -> bool {
        self.state.shutting_down.load(Ordering::Acquire) && !self.is_terminated()
    }

    /// Whether every worker thread has exited
    pub fn is_terminated(&self) -> bool {
        self.state.live_workers.load(Ordering::Acquire) == 0
    }

    /// Whether the interrupt flag is set
    pub fn is_interrupted(&self) -> bool {
        self.state.interrupted.load(Ordering::Acquire)
    }

    /// Queued + running task count
    pub fn pending_tasks(&self) -> usize {
        self.state.pending.load(Ordering::Acquire)
    }

    /// The first captured task failure, if any
    pub fn first_failure(&self) -> Option<String> {
        self.state.first_failure.lock().clone()
    }
}

/// Pool size for the default executor: `max(1, cores - 1)`
pub fn default_pool_size() -> usize {
    num_cpus::get().saturating_sub(1).max(1)
}
