//! Run context: scheduler, cancellation token, execution options.

use std::sync::Arc;

use crate::cancel::StackedCancelable;
use crate::scheduler::Scheduler;

/// Execution options baked into a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Options {
    /// When enabled, the run loop re-checks the cancellation flag at every
    /// trampoline checkpoint and before popping any continuation. When
    /// disabled (the default) only asynchronous boundaries are checked,
    /// which is cheaper but less responsive to cancellation.
    pub auto_cancelable_run_loops: bool,
}

impl Options {
    /// Enable or disable auto-cancelable run loops.
    pub fn auto_cancelable(mut self, enabled: bool) -> Self {
        self.auto_cancelable_run_loops = enabled;
        self
    }
}

/// Everything one run of a task needs: where to schedule deferred steps,
/// the token cancellation propagates through, and the active options.
#[derive(Clone)]
pub struct Context {
    scheduler: Arc<dyn Scheduler>,
    connection: Arc<StackedCancelable>,
    options: Options,
}

impl Context {
    /// A fresh context with its own cancellation token and default options.
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            connection: StackedCancelable::new(),
            options: Options::default(),
        }
    }

    /// A fresh context with the given options.
    pub fn with_options(scheduler: Arc<dyn Scheduler>, options: Options) -> Self {
        Self {
            scheduler,
            connection: StackedCancelable::new(),
            options,
        }
    }

    /// The scheduler driving this run.
    #[inline]
    pub fn scheduler(&self) -> &Arc<dyn Scheduler> {
        &self.scheduler
    }

    /// The cancellation token of this run.
    #[inline]
    pub fn connection(&self) -> &Arc<StackedCancelable> {
        &self.connection
    }

    /// The active execution options.
    #[inline]
    pub fn options(&self) -> Options {
        self.options
    }

    /// Whether this run has been cancelled.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.connection.is_canceled()
    }

    /// The same run, continuing under different options.
    pub(crate) fn switch_options(&self, options: Options) -> Self {
        Self {
            scheduler: self.scheduler.clone(),
            connection: self.connection.clone(),
            options,
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("options", &self.options)
            .field("canceled", &self.is_canceled())
            .finish()
    }
}
