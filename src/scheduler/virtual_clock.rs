//! Deterministic virtual-time scheduler.
//!
//! Nothing runs until the caller moves the clock, which makes timing-
//! sensitive behavior (delays, cancellation races, trampoline yields)
//! reproducible in tests without sleeping.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::error;

use crate::cancel::{BoxedCancelable, Cancelable};
use crate::error::TaskError;

use super::Scheduler;

type Job = Box<dyn FnOnce() + Send>;

struct Entry {
    canceled: Arc<AtomicBool>,
    job: Job,
}

struct Inner {
    clock: Duration,
    next_seq: u64,
    entries: BTreeMap<(Duration, u64), Entry>,
    failures: Vec<TaskError>,
}

/// A scheduler running on a manually-driven virtual clock.
pub struct VirtualScheduler {
    inner: Mutex<Inner>,
}

impl VirtualScheduler {
    /// Create a scheduler with the clock at zero and no pending entries.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(Inner {
                clock: Duration::ZERO,
                next_seq: 0,
                entries: BTreeMap::new(),
                failures: Vec::new(),
            }),
        })
    }

    /// The current virtual instant.
    pub fn now(&self) -> Duration {
        self.inner.lock().clock
    }

    /// Whether any entry (due or future) is still queued.
    pub fn has_pending(&self) -> bool {
        !self.inner.lock().entries.is_empty()
    }

    /// Failures reported through [`Scheduler::report_failure`].
    pub fn failures(&self) -> Vec<TaskError> {
        self.inner.lock().failures.clone()
    }

    fn enqueue_at(&self, due: Duration, job: Job) -> Arc<AtomicBool> {
        let canceled = Arc::new(AtomicBool::new(false));
        let mut inner = self.inner.lock();
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.insert(
            (due, seq),
            Entry {
                canceled: canceled.clone(),
                job,
            },
        );
        canceled
    }

    /// Pop the next entry due at or before `limit`, if any.
    fn pop_due(&self, limit: Duration) -> Option<(Duration, Entry)> {
        let mut inner = self.inner.lock();
        match inner.entries.first_key_value() {
            Some((&(due, _), _)) if due <= limit => {}
            _ => return None,
        }
        let ((due, _), entry) = inner.entries.pop_first()?;
        // Executing an entry moves the clock to its due time.
        if due > inner.clock {
            inner.clock = due;
        }
        Some((due, entry))
    }

    /// Run everything due at the current instant, including entries queued
    /// while draining. Returns the number of entries executed.
    pub fn tick(&self) -> usize {
        let mut executed = 0;
        loop {
            let limit = self.now();
            // The job runs outside the lock: it may enqueue more entries.
            match self.pop_due(limit) {
                Some((_, entry)) => {
                    if !entry.canceled.load(Ordering::Acquire) {
                        (entry.job)();
                        executed += 1;
                    }
                }
                None => return executed,
            }
        }
    }

    /// Move the clock forward by `duration`, executing entries in due order
    /// as the clock passes them. Returns the number of entries executed.
    pub fn advance(&self, duration: Duration) -> usize {
        let target = self.now() + duration;
        let mut executed = 0;
        loop {
            match self.pop_due(target) {
                Some((_, entry)) => {
                    if !entry.canceled.load(Ordering::Acquire) {
                        (entry.job)();
                        executed += 1;
                    }
                }
                None => break,
            }
        }
        self.inner.lock().clock = target;
        executed
    }
}

impl Scheduler for VirtualScheduler {
    fn schedule(&self, f: Job) {
        let due = self.now();
        self.enqueue_at(due, f);
    }

    fn schedule_after(&self, delay: Duration, f: Job) -> Arc<dyn Cancelable> {
        let due = self.now() + delay;
        let canceled = self.enqueue_at(due, f);
        BoxedCancelable::shared(move || {
            canceled.store(true, Ordering::Release);
        })
    }

    fn report_failure(&self, error: &TaskError) {
        error!(%error, "uncaught failure escaped a completion callback");
        self.inner.lock().failures.push(error.clone());
    }
}
