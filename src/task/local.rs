//! Dynamically-scoped variables.
//!
//! A [`DynamicVar`] carries incidental contextual configuration past call
//! sites that do not thread it explicitly. Bindings are per-thread and
//! strictly scoped: [`DynamicVar::bind`] installs a value for the duration
//! of a closure and restores the previous binding on every exit path,
//! including panics (a drop guard does the restore, not manual bookkeeping).

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_VAR_ID: AtomicU64 = AtomicU64::new(0);

thread_local! {
    static BINDINGS: RefCell<HashMap<u64, Vec<Box<dyn Any>>>> = RefCell::new(HashMap::new());
}

/// A variable whose value is determined by the innermost enclosing
/// [`bind`](Self::bind) on the current thread, falling back to a default.
///
/// Clones share identity: they see the same bindings.
pub struct DynamicVar<T> {
    id: u64,
    default: Arc<dyn Fn() -> T + Send + Sync>,
}

impl<T> Clone for DynamicVar<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> DynamicVar<T> {
    /// A variable defaulting to a fixed value.
    pub fn new(default: T) -> Self
    where
        T: Sync,
    {
        Self::with_default(move || default.clone())
    }

    /// A variable whose default is produced on demand.
    pub fn with_default(default: impl Fn() -> T + Send + Sync + 'static) -> Self {
        Self {
            id: NEXT_VAR_ID.fetch_add(1, Ordering::Relaxed),
            default: Arc::new(default),
        }
    }

    /// The innermost bound value on this thread, or the default.
    pub fn get(&self) -> T {
        BINDINGS.with(|bindings| {
            let bindings = bindings.borrow();
            bindings
                .get(&self.id)
                .and_then(|stack| stack.last())
                .and_then(|value| value.downcast_ref::<T>())
                .cloned()
        })
        .unwrap_or_else(|| (self.default)())
    }

    /// Run `f` with `value` bound; the previous binding is restored when
    /// `f` returns or unwinds.
    pub fn bind<R>(&self, value: T, f: impl FnOnce() -> R) -> R {
        BINDINGS.with(|bindings| {
            bindings
                .borrow_mut()
                .entry(self.id)
                .or_default()
                .push(Box::new(value));
        });
        let _guard = BindGuard { id: self.id };
        f()
    }
}

struct BindGuard {
    id: u64,
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        let _ = BINDINGS.try_with(|bindings| {
            let mut bindings = bindings.borrow_mut();
            if let Some(stack) = bindings.get_mut(&self.id) {
                stack.pop();
                if stack.is_empty() {
                    bindings.remove(&self.id);
                }
            }
        });
    }
}
