//! Execution scheduling
//!
//! The run loop never spawns threads of its own; it hands every deferred
//! step to a [`Scheduler`]. Two implementations ship with the crate:
//!
//! - [`ThreadScheduler`]: a worker/timer thread pair, the process default.
//! - [`VirtualScheduler`]: deterministic virtual time for tests.

pub mod threaded;
pub mod virtual_clock;

pub use threaded::ThreadScheduler;
pub use virtual_clock::VirtualScheduler;

use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;

use crate::cancel::Cancelable;
use crate::error::TaskError;

/// The execution service driving run loops.
///
/// `schedule` must trampoline: closures queued from inside a running
/// scheduled closure are dispatched iteratively, never by reentrant calls,
/// so arbitrarily long schedule chains cannot grow the control stack.
pub trait Scheduler: Send + Sync + 'static {
    /// Run `f` as soon as possible.
    fn schedule(&self, f: Box<dyn FnOnce() + Send>);

    /// Run `f` after `delay`. The returned handle drops the entry if it has
    /// not fired yet; cancelling after the fact is a no-op.
    fn schedule_after(&self, delay: Duration, f: Box<dyn FnOnce() + Send>)
        -> Arc<dyn Cancelable>;

    /// Last-resort channel for errors that escaped a completion callback.
    fn report_failure(&self, error: &TaskError);
}

static GLOBAL: Lazy<Arc<ThreadScheduler>> = Lazy::new(|| Arc::new(ThreadScheduler::new()));

/// The process-wide default scheduler.
///
/// Only the outermost entry points (`Task::run`, `Task::run_on_complete`)
/// consult this; everything below takes the scheduler through the `Context`.
pub fn global() -> Arc<dyn Scheduler> {
    GLOBAL.clone() as Arc<dyn Scheduler>
}
