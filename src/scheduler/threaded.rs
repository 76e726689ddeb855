//! Thread-backed scheduler.
//!
//! One worker thread drains a channel of jobs (the trampoline: jobs queued
//! from inside a running job are dispatched by the same iterative loop), and
//! one timer thread orders delayed entries in a binary heap.

use std::cmp::Ordering as CmpOrdering;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::{unbounded, Sender};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error};

use crate::cancel::{BoxedCancelable, Cancelable};
use crate::error::TaskError;

use super::Scheduler;

type Job = Box<dyn FnOnce() + Send>;

struct TimerEntry {
    due: Instant,
    seq: u64,
    canceled: Arc<AtomicBool>,
    job: Job,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        // BinaryHeap is a max-heap; invert so the earliest deadline wins.
        other
            .due
            .cmp(&self.due)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct TimerState {
    heap: Mutex<BinaryHeap<TimerEntry>>,
    wakeup: Condvar,
    next_seq: Mutex<u64>,
}

/// The default scheduler: a worker thread plus a timer thread.
pub struct ThreadScheduler {
    queue: Sender<Job>,
    timer: Arc<TimerState>,
    shutdown: Arc<AtomicBool>,
}

impl ThreadScheduler {
    /// Start the worker and timer threads.
    pub fn new() -> Self {
        let (queue, jobs) = unbounded::<Job>();
        let shutdown = Arc::new(AtomicBool::new(false));

        std::thread::Builder::new()
            .name("taskloop-worker".into())
            .spawn(move || {
                debug!("worker thread started");
                while let Ok(job) = jobs.recv() {
                    job();
                }
                debug!("worker thread stopped");
            })
            .expect("failed to spawn scheduler worker thread");

        let timer = Arc::new(TimerState {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
            next_seq: Mutex::new(0),
        });

        {
            let timer = timer.clone();
            let queue = queue.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name("taskloop-timer".into())
                .spawn(move || timer_loop(timer, queue, shutdown))
                .expect("failed to spawn scheduler timer thread");
        }

        Self {
            queue,
            timer,
            shutdown,
        }
    }
}

fn timer_loop(timer: Arc<TimerState>, queue: Sender<Job>, shutdown: Arc<AtomicBool>) {
    debug!("timer thread started");
    let mut heap = timer.heap.lock();
    loop {
        if shutdown.load(Ordering::Acquire) {
            break;
        }
        let now = Instant::now();
        let next_due = heap.peek().map(|entry| entry.due);
        match next_due {
            Some(due) if due <= now => {
                if let Some(entry) = heap.pop() {
                    if !entry.canceled.load(Ordering::Acquire) {
                        // A send failure means the worker is gone; nothing to do.
                        let _ = queue.send(entry.job);
                    }
                }
            }
            Some(due) => {
                timer.wakeup.wait_until(&mut heap, due);
            }
            None => {
                timer.wakeup.wait(&mut heap);
            }
        }
    }
    debug!("timer thread stopped");
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, f: Job) {
        // Send failure is only possible after shutdown.
        let _ = self.queue.send(f);
    }

    fn schedule_after(&self, delay: Duration, f: Job) -> Arc<dyn Cancelable> {
        let canceled = Arc::new(AtomicBool::new(false));
        let seq = {
            let mut next = self.timer.next_seq.lock();
            let seq = *next;
            *next += 1;
            seq
        };
        {
            let mut heap = self.timer.heap.lock();
            heap.push(TimerEntry {
                due: Instant::now() + delay,
                seq,
                canceled: canceled.clone(),
                job: f,
            });
        }
        self.timer.wakeup.notify_one();
        BoxedCancelable::shared(move || {
            canceled.store(true, Ordering::Release);
        })
    }

    fn report_failure(&self, error: &TaskError) {
        error!(%error, "uncaught failure escaped a completion callback");
    }
}

impl Drop for ThreadScheduler {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        // Wake the timer so it observes the flag; the worker exits once the
        // last sender (ours, then the timer's clone) is gone.
        self.timer.wakeup.notify_all();
    }
}
