//! Single-task FIFO worker.
//!
//! # Guarantees
//!
//! - At most one item is being handled at any time.
//! - Items are handled in exactly the order they were offered.
//! - [`SerialWorker::offer`] never blocks; it returns `false` once the
//!   worker is shut down or the queue is full.
//! - A failing or panicking handler never ends the task.

// ============================================================================
// Imports
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

use super::handler::WorkHandler;

// ============================================================================
// Constants
// ============================================================================

/// Default maximum number of queued items.
pub const DEFAULT_CAPACITY: usize = 10_000;

/// Default delay before retrying an item the handler kept.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(250);

// ============================================================================
// WorkerState
// ============================================================================

/// Lifecycle state of a [`SerialWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Accepting items, not draining yet.
    NotStarted,
    /// Draining.
    Active,
    /// Accepting items, draining blocked.
    Paused,
    /// Terminal; rejects all items.
    Shutdown,
}

// ============================================================================
// WorkerOptions
// ============================================================================

/// Tuning for a [`SerialWorker`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerOptions {
    /// Maximum number of queued items.
    pub capacity: usize,
    /// Delay before retrying an item the handler kept.
    pub retry_delay: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            retry_delay: DEFAULT_RETRY_DELAY,
        }
    }
}

// ============================================================================
// SerialWorker
// ============================================================================

/// Shared state between the worker handle and its task.
struct WorkerInner<T> {
    /// Name used in logs.
    name: String,
    /// Lifecycle state.
    state: Mutex<WorkerState>,
    /// Pending items.
    queue: Mutex<VecDeque<T>>,
    /// Tuning.
    options: WorkerOptions,
    /// Item handler.
    handler: Arc<dyn WorkHandler<T>>,
    /// Wakes the task on offer, resume and stop.
    wake: Notify,
    /// Draining task, once started.
    task: Mutex<Option<JoinHandle<()>>>,
}

/// A cancelable single-task FIFO processor.
///
/// Cloning yields another handle to the same worker.
pub struct SerialWorker<T> {
    inner: Arc<WorkerInner<T>>,
}

impl<T> Clone for SerialWorker<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for SerialWorker<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialWorker")
            .field("name", &self.inner.name)
            .field("state", &self.state())
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T> SerialWorker<T> {
    /// Returns the current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> WorkerState {
        *self.inner.state.lock()
    }

    /// Returns the number of queued items.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.queue.lock().len()
    }

    /// Returns `true` if no items are queued.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> SerialWorker<T>
where
    T: Send + Sync + 'static,
{
    /// Creates a worker in the [`WorkerState::NotStarted`] state.
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn WorkHandler<T>>,
        options: WorkerOptions,
    ) -> Self {
        Self {
            inner: Arc::new(WorkerInner {
                name: name.into(),
                state: Mutex::new(WorkerState::NotStarted),
                queue: Mutex::new(VecDeque::new()),
                options,
                handler,
                wake: Notify::new(),
                task: Mutex::new(None),
            }),
        }
    }

    /// Starts draining.
    ///
    /// Only the `NotStarted → Active` transition has effect. Returns `true`
    /// when this call started the worker and `false` when it was already
    /// started, paused or shut down.
    ///
    /// Must be called within a tokio runtime.
    pub fn start(&self) -> bool {
        self.start_in(WorkerState::Active)
    }

    /// Starts the worker with draining blocked until [`resume`](Self::resume).
    ///
    /// Same transition rules and return value as [`start`](Self::start).
    pub fn start_paused(&self) -> bool {
        self.start_in(WorkerState::Paused)
    }

    fn start_in(&self, initial: WorkerState) -> bool {
        {
            let mut state = self.inner.state.lock();
            if *state != WorkerState::NotStarted {
                trace!(worker = %self.inner.name, state = ?*state, "Start ignored");
                return false;
            }
            *state = initial;
        }

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(Self::run(inner));
        *self.inner.task.lock() = Some(handle);

        debug!(worker = %self.inner.name, state = ?initial, "Worker started");
        true
    }

    /// Enqueues an item without blocking.
    ///
    /// Returns `false` if the worker is shut down or the queue is full.
    pub fn offer(&self, item: T) -> bool {
        let state = self.inner.state.lock();
        if *state == WorkerState::Shutdown {
            trace!(worker = %self.inner.name, "Offer rejected after shutdown");
            return false;
        }

        {
            let mut queue = self.inner.queue.lock();
            if queue.len() >= self.inner.options.capacity {
                warn!(
                    worker = %self.inner.name,
                    capacity = self.inner.options.capacity,
                    "Queue full, item rejected"
                );
                return false;
            }
            queue.push_back(item);
        }
        drop(state);

        self.inner.wake.notify_one();
        true
    }

    /// Blocks draining; queued and new items are held.
    ///
    /// Returns `true` if the worker was active.
    pub fn pause(&self) -> bool {
        let mut state = self.inner.state.lock();
        if *state != WorkerState::Active {
            return false;
        }
        *state = WorkerState::Paused;
        debug!(worker = %self.inner.name, "Worker paused");
        true
    }

    /// Unblocks draining.
    ///
    /// Returns `true` if the worker was paused.
    pub fn resume(&self) -> bool {
        {
            let mut state = self.inner.state.lock();
            if *state != WorkerState::Paused {
                return false;
            }
            *state = WorkerState::Active;
        }
        self.inner.wake.notify_one();
        debug!(worker = %self.inner.name, "Worker resumed");
        true
    }

    /// Shuts the worker down for good.
    ///
    /// Pending items are dropped and the draining task is aborted.
    pub fn stop(&self) {
        {
            let mut state = self.inner.state.lock();
            if *state == WorkerState::Shutdown {
                return;
            }
            *state = WorkerState::Shutdown;
        }

        let dropped = {
            let mut queue = self.inner.queue.lock();
            let count = queue.len();
            queue.clear();
            count
        };

        self.inner.wake.notify_one();
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }

        debug!(worker = %self.inner.name, dropped, "Worker stopped");
    }

    /// Draining loop.
    async fn run(inner: Arc<WorkerInner<T>>) {
        loop {
            let item = {
                let state = inner.state.lock();
                match *state {
                    WorkerState::Shutdown => break,
                    WorkerState::Active => inner.queue.lock().pop_front(),
                    WorkerState::NotStarted | WorkerState::Paused => None,
                }
            };

            let Some(item) = item else {
                inner.wake.notified().await;
                continue;
            };

            let done = match AssertUnwindSafe(inner.handler.handle(&item))
                .catch_unwind()
                .await
            {
                Ok(Ok(done)) => done,
                Ok(Err(e)) => {
                    warn!(worker = %inner.name, error = %e, "Handler failed, item dropped");
                    true
                }
                Err(_) => {
                    error!(worker = %inner.name, "Handler panicked, item dropped");
                    true
                }
            };

            if !done {
                {
                    let state = inner.state.lock();
                    if *state == WorkerState::Shutdown {
                        break;
                    }
                    inner.queue.lock().push_front(item);
                }
                trace!(worker = %inner.name, "Item kept for retry");
                tokio::time::sleep(inner.options.retry_delay).await;
            }
        }

        debug!(worker = %inner.name, "Worker task terminated");
    }
}

// ============================================================================
// Tests
// ============================================================================
