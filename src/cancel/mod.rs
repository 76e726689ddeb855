//! Cancellation primitives
//!
//! A running task owns a stack-shaped cancellation token
//! ([`StackedCancelable`]) tracking whichever sub-operation is currently
//! outstanding. Cancelling the token aborts that sub-operation and marks the
//! run so later checkpoints short-circuit.
//!
//! All handles are idempotent: the second and later `cancel` calls are no-ops.

pub mod stacked;

pub use stacked::StackedCancelable;

use std::sync::Arc;

use parking_lot::Mutex;

/// A handle that can abort work in progress.
///
/// Implementations must be idempotent and safe to call from any thread.
pub trait Cancelable: Send + Sync {
    /// Abort the underlying work. Calling this more than once is a no-op.
    fn cancel(&self);
}

/// A cancelable that runs a callback exactly once.
pub struct BoxedCancelable {
    callback: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl BoxedCancelable {
    /// Wrap a cancellation callback.
    pub fn new(callback: impl FnOnce() + Send + 'static) -> Self {
        Self {
            callback: Mutex::new(Some(Box::new(callback))),
        }
    }

    /// Convenience constructor returning a shared trait object.
    pub fn shared(callback: impl FnOnce() + Send + 'static) -> Arc<dyn Cancelable> {
        Arc::new(Self::new(callback))
    }

    /// Whether the callback has already run.
    pub fn is_canceled(&self) -> bool {
        self.callback.lock().is_none()
    }
}

impl Cancelable for BoxedCancelable {
    fn cancel(&self) {
        let callback = self.callback.lock().take();
        if let Some(callback) = callback {
            callback();
        }
    }
}

/// A no-op handle for operations with nothing to abort.
pub fn noop() -> Arc<dyn Cancelable> {
    struct Noop;
    impl Cancelable for Noop {
        fn cancel(&self) {}
    }
    Arc::new(Noop)
}

enum Slot {
    Empty,
    Assigned(Arc<dyn Cancelable>),
    Canceled,
}

/// A cancelable slot assigned at most once.
///
/// Cancelling an empty slot cancels whatever is assigned later, which lets
/// the run loop register a handle on the token *before* an async registrar
/// has produced one. The registration/cancellation race then resolves in
/// favor of whichever side moved first.
pub struct SingleAssignCancelable {
    slot: Mutex<Slot>,
}

impl SingleAssignCancelable {
    /// Create an empty slot.
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Empty),
        }
    }

    /// Assign the underlying handle.
    ///
    /// If the slot was cancelled before assignment the incoming handle is
    /// cancelled immediately. Assigning twice is a usage error; the second
    /// handle is cancelled rather than stored.
    pub fn set(&self, handle: Arc<dyn Cancelable>) {
        let mut slot = self.slot.lock();
        match &*slot {
            Slot::Empty => *slot = Slot::Assigned(handle),
            Slot::Assigned(_) | Slot::Canceled => {
                drop(slot);
                handle.cancel();
            }
        }
    }

    /// Whether `cancel` has been observed.
    pub fn is_canceled(&self) -> bool {
        matches!(&*self.slot.lock(), Slot::Canceled)
    }
}

impl Default for SingleAssignCancelable {
    fn default() -> Self {
        Self::new()
    }
}

impl Cancelable for SingleAssignCancelable {
    fn cancel(&self) {
        let previous = {
            let mut slot = self.slot.lock();
            std::mem::replace(&mut *slot, Slot::Canceled)
        };
        if let Slot::Assigned(handle) = previous {
            handle.cancel();
        }
    }
}

#[cfg(test)]
mod tests;
