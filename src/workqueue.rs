// CLASSIFICATION: COMMUNITY
// Filename: workqueue.rs v0.1
// Author: Lukas Bower
// Date Modified: 2026-10-16

//! Deferred work executed on dedicated worker threads.
//!
//! Interrupt top halves hand work to a [`WorkQueue`] without blocking; the
//! matching worker thread runs the bottom half. A shared [`WorkTracker`]
//! counts work that has been queued but not finished so callers can wait
//! for the engine to go quiet.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, warn};

use crate::error::{Result, ShrmError};

/// Scheduling class of a worker thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkerPriority {
    Normal,
    /// SCHED_FIFO at the given priority.
    Realtime(i32),
}

/// Counts queued-but-unfinished work across all queues.
#[derive(Default)]
pub struct WorkTracker {
    inflight: Mutex<usize>,
    idle: Condvar,
}

impl WorkTracker {
    fn count(&self) -> MutexGuard<'_, usize> {
        self.inflight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn begin(&self) {
        *self.count() += 1;
    }

    pub fn end(&self) {
        let mut count = self.count();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }

    /// Wait until nothing is in flight. Returns `false` on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut count = self.count();
        while *count > 0 {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .idle
                .wait_timeout(count, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            count = guard;
        }
        true
    }
}

/// Submission side of a named worker.
pub struct WorkQueue<W> {
    name: &'static str,
    sender: Mutex<Option<SyncSender<W>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    tracker: Arc<WorkTracker>,
    dropped: AtomicU64,
}

/// Receiving side, turned into a thread with [`WorkReceiver::spawn`].
pub struct WorkReceiver<W> {
    name: &'static str,
    receiver: Receiver<W>,
    tracker: Arc<WorkTracker>,
}

impl<W: Send + 'static> WorkQueue<W> {
    pub fn new(name: &'static str, depth: usize, tracker: Arc<WorkTracker>) -> (Self, WorkReceiver<W>) {
        let (sender, receiver) = mpsc::sync_channel(depth);
        let queue = Self {
            name,
            sender: Mutex::new(Some(sender)),
            worker: Mutex::new(None),
            tracker: Arc::clone(&tracker),
            dropped: AtomicU64::new(0),
        };
        let rx = WorkReceiver {
            name,
            receiver,
            tracker,
        };
        (queue, rx)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Queue `work` without blocking.
    pub fn queue(&self, work: W) -> Result<()> {
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            return Err(ShrmError::NotRunning);
        };
        self.tracker.begin();
        match sender.try_send(work) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.tracker.end();
                self.dropped.fetch_add(1, Ordering::Relaxed);
                warn!(target: "shrm::workqueue", "{}: queue full, work dropped", self.name);
                Err(ShrmError::QueueFull(self.name))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.tracker.end();
                Err(ShrmError::NotRunning)
            }
        }
    }

    pub fn attach(&self, handle: JoinHandle<()>) {
        *self.worker.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Number of submissions rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the queue and join the worker. Must not run on the worker itself.
    pub fn shutdown(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!(target: "shrm::workqueue", "{}: worker panicked", self.name);
            }
        }
    }
}

impl<W: Send + 'static> WorkReceiver<W> {
    /// Start the worker thread running `handler` for each item.
    pub fn spawn(
        self,
        priority: WorkerPriority,
        mut handler: impl FnMut(W) + Send + 'static,
    ) -> Result<JoinHandle<()>> {
        let name = self.name;
        thread::Builder::new()
            .name(name.into())
            .spawn(move || {
                apply_priority(name, priority);
                while let Ok(work) = self.receiver.recv() {
                    handler(work);
                    self.tracker.end();
                }
                debug!(target: "shrm::workqueue", "{name}: worker exiting");
            })
            .map_err(|source| ShrmError::Spawn { name, source })
    }
}

#[cfg(target_os = "linux")]
fn apply_priority(name: &str, priority: WorkerPriority) {
    let WorkerPriority::Realtime(level) = priority else {
        return;
    };
    // SAFETY: sched_param is plain old data; zeroed is a valid value on every libc.
    let mut param: libc::sched_param = unsafe { std::mem::zeroed() };
    param.sched_priority = level;
    // SAFETY: pthread_self is always valid for the calling thread and param outlives the call.
    let rc = unsafe { libc::pthread_setschedparam(libc::pthread_self(), libc::SCHED_FIFO, &param) };
    if rc == 0 {
        debug!(target: "shrm::workqueue", "{name}: running SCHED_FIFO/{level}");
    } else {
        warn!(
            target: "shrm::workqueue",
            "{name}: SCHED_FIFO/{level} unavailable ({}), keeping default policy",
            std::io::Error::from_raw_os_error(rc)
        );
    }
}

#[cfg(not(target_os = "linux"))]
fn apply_priority(name: &str, priority: WorkerPriority) {
    if let WorkerPriority::Realtime(level) = priority {
        debug!(target: "shrm::workqueue", "{name}: realtime priority {level} not supported here");
    }
}
