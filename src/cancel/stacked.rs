//! Stack-shaped cancellation token.
//!
//! Tracks the currently-outstanding cancelable sub-operations of one run.
//! Exactly one handle is outstanding per run-loop instant; the stack shape
//! exists so nested scopes can push over an outer handle and restore it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::trace;

use super::Cancelable;

/// The cancellation token shared between a run loop and its callers.
///
/// `cancel` sets a flag observed lock-free at run-loop checkpoints, then
/// cancels every currently-pushed handle exactly once. A `push` that races
/// with (or arrives after) `cancel` cancels the incoming handle instead of
/// retaining it, so late async registrations cannot escape the cancellation.
pub struct StackedCancelable {
    canceled: AtomicBool,
    stack: Mutex<Vec<Arc<dyn Cancelable>>>,
}

impl StackedCancelable {
    /// Create a live token with an empty stack.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            canceled: AtomicBool::new(false),
            stack: Mutex::new(Vec::new()),
        })
    }

    /// Whether `cancel` has happened.
    #[inline]
    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// Push a handle for the sub-operation that is now outstanding.
    ///
    /// Returns `true` if the handle was retained, `false` if the token was
    /// already cancelled and the handle was cancelled instead.
    pub fn push(&self, handle: Arc<dyn Cancelable>) -> bool {
        {
            let mut stack = self.stack.lock();
            if !self.is_canceled() {
                stack.push(handle);
                return true;
            }
        }
        // Token already cancelled: the incoming handle must not survive.
        handle.cancel();
        false
    }

    /// Pop the most recent handle without cancelling it.
    pub fn pop(&self) -> Option<Arc<dyn Cancelable>> {
        self.stack.lock().pop()
    }

    /// Number of currently-outstanding handles.
    pub fn len(&self) -> usize {
        self.stack.lock().len()
    }

    /// Whether no handle is currently outstanding.
    pub fn is_empty(&self) -> bool {
        self.stack.lock().is_empty()
    }
}

impl Cancelable for StackedCancelable {
    fn cancel(&self) {
        // Flag first: pushes that lose the race observe it under the lock.
        if self.canceled.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = {
            let mut stack = self.stack.lock();
            std::mem::take(&mut *stack)
        };
        trace!(handles = drained.len(), "cancelling run");
        // Invoked outside the lock: a handle may itself touch the token.
        for handle in drained.into_iter().rev() {
            handle.cancel();
        }
    }
}
