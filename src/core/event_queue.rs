//! Fail-fast two-lane event queue for build actions.
//!
//! The queue accepts work at two priority levels and runs it against two
//! dedicated worker pools backed by OS threads. Normal-lane work is the
//! build itself; background-lane work is lighter bookkeeping that must
//! never be starved by, nor compete with, normal throughput, so it gets
//! its own (larger) pool.
//!
//! # Design
//!
//! - **No polling**: workers block on channel recv; completion waiters
//!   block on a Condvar
//! - **Fail-fast**: the first action failure is captured once, the normal
//!   lane is closed and its backlog discarded; background work continues
//! - **Clean shutdown**: dropping a lane's sender unblocks workers
//!   naturally once the buffered items are consumed

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::error::QueueError;

/// A unit of work submitted to the queue. Runs at most once.
pub type Action = Box<dyn FnOnce() -> anyhow::Result<()> + Send + 'static>;

/// Priority of a submitted action, selecting its lane and worker pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Build actions; subject to fail-fast abandonment after a failure.
    Normal,
    /// Incidental bookkeeping; never gated or discarded by a failure.
    Background,
}

/// A work item: an accepted action paired with its priority.
struct WorkItem {
    priority: Priority,
    action: Action,
}

/// State shared between the queue handle and its worker threads.
struct Shared {
    /// Normal-lane sender. Taken (dropped) to close the lane cleanly.
    normal_tx: Mutex<Option<Sender<WorkItem>>>,
    /// Background-lane sender.
    background_tx: Mutex<Option<Sender<WorkItem>>>,
    normal_rx: Receiver<WorkItem>,
    background_rx: Receiver<WorkItem>,
    /// Never receives a message; disconnects when the queue cancels.
    cancel_rx: Receiver<()>,
    cancelled: AtomicBool,

    /// Accepted-but-not-retired item count. Sole source of truth for drain.
    pending: AtomicU64,
    started: AtomicBool,

    /// Fast-path flag for the failure slot below.
    failed: AtomicBool,
    last_error: Mutex<Option<anyhow::Error>>,

    /// Guards pool startup and first-failure capture. Never held while an
    /// action runs.
    gate: Mutex<()>,

    drained: Mutex<bool>,
    drained_cv: Condvar,
}

impl Shared {
    /// Run one item, routing any failure to the capture path, and retire it.
    fn run(&self, item: WorkItem) {
        debug!(priority = ?item.priority, "running action");
        let outcome = match panic::catch_unwind(AssertUnwindSafe(move || (item.action)())) {
            Ok(result) => result,
            Err(payload) => Err(anyhow::anyhow!(
                "action panicked: {}",
                panic_message(payload.as_ref())
            )),
        };
        if let Err(err) = outcome {
            self.try_set_error(err);
        }
        self.retire_one();
    }

    /// First-failure-wins capture. The winning thread also closes the normal
    /// lane and discards its backlog, all under the gate.
    fn try_set_error(&self, err: anyhow::Error) {
        // Fast path: a failure has already been captured.
        if self.failed.load(Ordering::Acquire) {
            debug!("dropping secondary failure: {err:#}");
            return;
        }

        let _guard = self.gate.lock();
        if self.failed.load(Ordering::Acquire) {
            return;
        }

        warn!("action failed, abandoning queued normal work: {err:#}");
        *self.last_error.lock() = Some(err);
        self.failed.store(true, Ordering::Release);

        // Close the normal lane without cancelling it, so blocked readers
        // observe a clean end-of-data instead of an error.
        self.normal_tx.lock().take();

        // Discard anything already buffered; each discard retires like a run.
        let mut discarded = 0_u64;
        while self.normal_rx.try_recv().is_ok() {
            self.retire_one();
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded queued normal actions");
        }
    }

    /// Retire one accepted item (ran or discarded) and check for drain.
    fn retire_one(&self) {
        let prev = self.pending.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(prev > 0, "retired more items than were accepted");
        if prev == 1 && self.started.load(Ordering::Acquire) {
            self.complete_drained();
        }
    }

    /// Fire the drain signal. Redundant completions are no-ops.
    fn complete_drained(&self) {
        let mut drained = self.drained.lock();
        if !*drained {
            *drained = true;
            debug!("all accepted work retired");
            self.drained_cv.notify_all();
        }
    }
}

/// Extract a printable message from a panic payload.
fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

/// Concurrent scheduler for build actions at two priority levels.
///
/// Accepts work via [`enqueue`](Self::enqueue) from construction until
/// teardown. Worker pools start lazily, exactly once, on the first
/// [`wait_completion`](Self::wait_completion) call. All accepted work either
/// runs to completion or is deterministically discarded after the first
/// failure; the caller retrieves at most one captured error.
///
/// Intended usage is one queue per logical build run.
pub struct EventQueue {
    max_concurrency: usize,
    background_concurrency: usize,
    shared: Arc<Shared>,
    /// Taken (dropped) to raise cancellation; every blocking lane read
    /// selects over the paired receiver.
    cancel_tx: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: AtomicBool,
}

impl EventQueue {
    /// Create a queue with `max_concurrency` normal workers and
    /// `4 * max_concurrency` background workers.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if `max_concurrency` is 0.
    pub fn new(max_concurrency: usize) -> Result<Self, QueueError> {
        Self::with_concurrency(max_concurrency, 4 * max_concurrency)
    }

    /// Create a queue with explicit pool sizes for each lane.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::InvalidConcurrency`] if either count is 0.
    pub fn with_concurrency(
        max_concurrency: usize,
        background_concurrency: usize,
    ) -> Result<Self, QueueError> {
        if max_concurrency == 0 || background_concurrency == 0 {
            return Err(QueueError::InvalidConcurrency);
        }

        let (normal_tx, normal_rx) = unbounded();
        let (background_tx, background_rx) = unbounded();
        let (cancel_tx, cancel_rx) = bounded(0);

        Ok(Self {
            max_concurrency,
            background_concurrency,
            shared: Arc::new(Shared {
                normal_tx: Mutex::new(Some(normal_tx)),
                background_tx: Mutex::new(Some(background_tx)),
                normal_rx,
                background_rx,
                cancel_rx,
                cancelled: AtomicBool::new(false),
                pending: AtomicU64::new(0),
                started: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                last_error: Mutex::new(None),
                gate: Mutex::new(()),
                drained: Mutex::new(false),
                drained_cv: Condvar::new(),
            }),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            workers: Mutex::new(Vec::new()),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Append an action to the lane selected by `priority`.
    ///
    /// Never blocks and never fails for the caller. Once a failure has been
    /// captured, normal-lane actions are silently accepted-and-dropped;
    /// background actions are always appended.
    pub fn enqueue<F>(&self, priority: Priority, action: F)
    where
        F: FnOnce() -> anyhow::Result<()> + Send + 'static,
    {
        // Once we have an error, normal work is dropped.
        if priority == Priority::Normal && self.shared.failed.load(Ordering::Acquire) {
            return;
        }

        // Count the item before it can become visible to a worker.
        self.shared.pending.fetch_add(1, Ordering::AcqRel);

        let item = WorkItem {
            priority,
            action: Box::new(action),
        };
        let lane = match priority {
            Priority::Normal => &self.shared.normal_tx,
            Priority::Background => &self.shared.background_tx,
        };

        // Clone the sender out of the brief lock; never send under it.
        let sender = lane.lock().clone();
        let accepted = match sender {
            Some(tx) => tx.send(item).is_ok(),
            None => false,
        };
        if !accepted {
            // The lane closed between the failure check and the append
            // (failure capture or teardown). Roll back acceptance so
            // drainage is not stalled.
            self.shared.retire_one();
        }
    }

    /// Block until every accepted item has been retired, then tear down
    /// gracefully and return the first captured failure, if any.
    ///
    /// Starts the worker pools if they are not already running. Intended to
    /// be called once per logical build; a second call returns `None`.
    pub fn wait_completion(&self) -> Option<anyhow::Error> {
        self.ensure_started();

        // Wait until everything accepted has finished.
        {
            let mut drained = self.shared.drained.lock();
            while !*drained {
                self.shared.drained_cv.wait(&mut drained);
            }
        }

        // Now close both lanes so workers exit once their buffers are empty.
        self.shared.normal_tx.lock().take();
        self.shared.background_tx.lock().take();

        self.join_workers(false);
        self.shutdown.store(true, Ordering::Release);

        self.shared.last_error.lock().take()
    }

    /// Forced teardown: raise cancellation, close both lanes, and join
    /// workers best-effort, swallowing join errors.
    ///
    /// Does not wait for outstanding work. Safe to call more than once and
    /// concurrently with [`wait_completion`](Self::wait_completion); drain
    /// waiters are woken so they cannot hang on abandoned work.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return; // already shut down
        }

        info!("shutting down event queue");
        self.shared.cancelled.store(true, Ordering::Release);
        self.cancel_tx.lock().take();
        self.shared.normal_tx.lock().take();
        self.shared.background_tx.lock().take();
        self.shared.complete_drained();

        self.join_workers(true);
    }

    /// Start the worker pools exactly once, lazily.
    fn ensure_started(&self) {
        if self.shared.started.load(Ordering::Acquire) {
            return;
        }

        let _guard = self.shared.gate.lock();
        if self.shared.started.load(Ordering::Acquire) {
            return;
        }
        self.shared.started.store(true, Ordering::Release);

        // If nothing is pending at the instant we start, we are already
        // drained; no future decrement will arrive to signal it.
        if self.shared.pending.load(Ordering::Acquire) == 0 {
            self.shared.complete_drained();
        }

        let mut workers = self.workers.lock();
        for i in 0..self.max_concurrency {
            workers.push(spawn_worker(i, Priority::Normal, Arc::clone(&self.shared)));
        }
        for i in 0..self.background_concurrency {
            workers.push(spawn_worker(i, Priority::Background, Arc::clone(&self.shared)));
        }

        info!(
            normal_workers = self.max_concurrency,
            background_workers = self.background_concurrency,
            "event queue started"
        );
    }

    fn join_workers(&self, swallow: bool) {
        let handles: Vec<_> = self.workers.lock().drain(..).collect();
        for handle in handles {
            if handle.join().is_err() && !swallow {
                warn!("worker thread panicked");
            }
        }
    }
}

impl Drop for EventQueue {
    fn drop(&mut self) {
        // Signal cancellation but do not join workers here, so dropping a
        // queue mid-flight cannot hang. Explicit shutdown() or
        // wait_completion() is the graceful path.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            self.shared.cancelled.store(true, Ordering::Release);
            self.cancel_tx.lock().take();
            self.shared.normal_tx.lock().take();
            self.shared.background_tx.lock().take();
            debug!("event queue dropped without explicit shutdown; workers detached");
        }
    }
}

/// Spawn one worker thread bound to a lane.
fn spawn_worker(worker_id: usize, lane: Priority, shared: Arc<Shared>) -> JoinHandle<()> {
    let lane_name = match lane {
        Priority::Normal => "normal",
        Priority::Background => "background",
    };
    thread::Builder::new()
        .name(format!("lq-{lane_name}-{worker_id}"))
        .spawn(move || {
            debug!(worker_id, lane = lane_name, "worker started");

            let rx = match lane {
                Priority::Normal => shared.normal_rx.clone(),
                Priority::Background => shared.background_rx.clone(),
            };

            loop {
                select! {
                    recv(rx) -> msg => {
                        let Ok(item) = msg else {
                            // Lane closed and empty: clean exit.
                            break;
                        };
                        shared.run(item);
                        // Drain whatever is immediately available before
                        // blocking again.
                        while !shared.cancelled.load(Ordering::Acquire) {
                            match rx.try_recv() {
                                Ok(item) => shared.run(item),
                                Err(_) => break,
                            }
                        }
                    }
                    recv(shared.cancel_rx) -> _ => {
                        // Fires when the cancel sender is dropped.
                        break;
                    }
                }
            }

            debug!(worker_id, lane = lane_name, "worker exiting");
        })
        .expect("failed to spawn worker thread")
}
