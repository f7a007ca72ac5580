//! The per-circuit execution engine.
//!
//! A valve owns one dedicated worker thread and two queues: a cross-thread
//! ingress queue fed by arbitrary emitter threads, and a worker-local
//! transit queue holding cascaded work produced by running receptors. The
//! transit queue is always drained before the next ingress task, which gives
//! cascades their run-to-completion property. Emitters never block: they
//! enqueue and return.
//!
//! Lifecycle: RUNNING accepts ingress; a close request moves the valve to
//! DRAINING, which refuses new ingress while the worker finishes everything
//! already accepted; the worker then exits and the valve is CLOSED.

use crate::types::{SubstratesError, SubstratesResult};
use once_cell::sync::OnceCell;
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};

const RUNNING: u8 = 0;
const DRAINING: u8 = 1;
const CLOSED: u8 = 2;

enum Task {
    /// A unit of deliverable work
    Exec(Box<dyn FnOnce() + Send>),
    /// Wake-up marker used by `close` to unpark the worker
    Drain,
}

/// Single-worker execution engine, one per circuit.
pub(crate) struct Valve {
    ingress: UnboundedSender<Task>,
    transit: Mutex<VecDeque<Task>>,
    state: AtomicU8,
    /// Tasks accepted but not yet finished, across both queues plus the one
    /// currently executing.
    outstanding: AtomicUsize,
    worker: OnceCell<ThreadId>,
    idle_lock: Mutex<()>,
    idle_signal: Condvar,
    fault_hook: OnceCell<Box<dyn Fn(&str) + Send + Sync>>,
}

impl Valve {
    /// Spawn the worker thread and return the valve handle
    pub(crate) fn spawn(label: &str) -> SubstratesResult<Arc<Valve>> {
        let (ingress, receiver) = mpsc::unbounded_channel();
        let valve = Arc::new(Valve {
            ingress,
            transit: Mutex::new(VecDeque::new()),
            state: AtomicU8::new(RUNNING),
            outstanding: AtomicUsize::new(0),
            worker: OnceCell::new(),
            idle_lock: Mutex::new(()),
            idle_signal: Condvar::new(),
            fault_hook: OnceCell::new(),
        });
        let runner = valve.clone();
        thread::Builder::new()
            .name(format!("axon-{label}"))
            .spawn(move || runner.run_worker(receiver))
            .map_err(|e| SubstratesError::Internal(format!("failed to spawn worker: {e}")))?;
        Ok(valve)
    }

    /// Install the hook invoked on the worker thread when a receptor faults.
    /// Set once by the owning circuit before the valve is shared.
    pub(crate) fn set_fault_hook(&self, hook: Box<dyn Fn(&str) + Send + Sync>) {
        let _ = self.fault_hook.set(hook);
    }

    /// True while ingress is still accepted
    pub(crate) fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// True when the worker called from this thread
    pub(crate) fn on_worker(&self) -> bool {
        self.worker.get() == Some(&thread::current().id())
    }

    /// Schedule a unit of work.
    ///
    /// On the worker thread the work lands on the transit queue and runs
    /// before the next ingress task; on any other thread it lands on the
    /// ingress queue. Returns false when the valve no longer accepts work,
    /// in which case the work is dropped.
    pub(crate) fn submit(&self, work: Box<dyn FnOnce() + Send>) -> bool {
        if self.on_worker() {
            self.outstanding.fetch_add(1, Ordering::AcqRel);
            self.transit.lock().push_back(Task::Exec(work));
            return true;
        }
        if !self.is_running() {
            return false;
        }
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        if self.ingress.send(Task::Exec(work)).is_err() {
            // worker already cut the queue over
            self.retire();
            return false;
        }
        true
    }

    /// Block the calling thread until both queues are empty and nothing is
    /// executing. Refused on the worker thread to prevent self-deadlock.
    pub(crate) fn await_empty(&self) -> SubstratesResult<()> {
        if self.on_worker() {
            return Err(SubstratesError::IllegalState(
                "Cannot await from circuit's own thread".to_string(),
            ));
        }
        if self.outstanding.load(Ordering::Acquire) == 0 {
            return Ok(());
        }
        let mut guard = self.idle_lock.lock();
        while self.outstanding.load(Ordering::Acquire) != 0 {
            self.idle_signal.wait(&mut guard);
        }
        Ok(())
    }

    /// Bounded variant of [`await_empty`]. Returns false on timeout.
    ///
    /// [`await_empty`]: Valve::await_empty
    pub(crate) fn await_empty_timeout(&self, timeout: Duration) -> SubstratesResult<bool> {
        if self.on_worker() {
            return Err(SubstratesError::IllegalState(
                "Cannot await from circuit's own thread".to_string(),
            ));
        }
        if self.outstanding.load(Ordering::Acquire) == 0 {
            return Ok(true);
        }
        let deadline = std::time::Instant::now() + timeout;
        let mut guard = self.idle_lock.lock();
        while self.outstanding.load(Ordering::Acquire) != 0 {
            if self
                .idle_signal
                .wait_until(&mut guard, deadline)
                .timed_out()
            {
                return Ok(self.outstanding.load(Ordering::Acquire) == 0);
            }
        }
        Ok(true)
    }

    /// Request shutdown. Idempotent, non-blocking, callable from any thread
    /// including the worker itself. Ingress submitted afterwards is dropped;
    /// accepted work still drains.
    pub(crate) fn close(&self) {
        if self
            .state
            .compare_exchange(RUNNING, DRAINING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            tracing::debug!(target: "axon::valve", "close requested");
            let _ = self.ingress.send(Task::Drain);
        }
    }

    fn run_worker(self: Arc<Self>, mut receiver: UnboundedReceiver<Task>) {
        let _ = self.worker.set(thread::current().id());
        tracing::debug!(target: "axon::valve", "worker started");
        loop {
            while let Some(task) = self.pop_transit() {
                self.run(task);
            }
            match receiver.try_recv() {
                Ok(task) => self.run(task),
                Err(TryRecvError::Empty) => {
                    if self.state.load(Ordering::Acquire) != RUNNING {
                        break;
                    }
                    match receiver.blocking_recv() {
                        Some(task) => self.run(task),
                        None => break,
                    }
                }
                Err(TryRecvError::Disconnected) => break,
            }
        }
        // Cut the queue over so racing emitters fail their send and account
        // for it, then drain everything that made it in before the cut.
        receiver.close();
        loop {
            while let Some(task) = self.pop_transit() {
                self.run(task);
            }
            match receiver.try_recv() {
                Ok(task) => self.run(task),
                Err(_) => break,
            }
        }
        self.state.store(CLOSED, Ordering::Release);
        {
            let _guard = self.idle_lock.lock();
            self.idle_signal.notify_all();
        }
        tracing::debug!(target: "axon::valve", "worker stopped");
    }

    fn pop_transit(&self) -> Option<Task> {
        self.transit.lock().pop_front()
    }

    fn run(&self, task: Task) {
        let Task::Exec(work) = task else {
            return;
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(work)) {
            let message = panic_text(payload.as_ref());
            tracing::error!(target: "axon::valve", %message, "receptor fault");
            if let Some(hook) = self.fault_hook.get() {
                // a fault raised while reporting a fault is logged only
                let _ = panic::catch_unwind(AssertUnwindSafe(|| hook(&message)));
            }
        }
        self.retire();
    }

    fn retire(&self) {
        if self.outstanding.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle_signal.notify_all();
        }
    }
}

fn panic_text(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "receptor panicked".to_string()
    }
}
