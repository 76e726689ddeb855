//! The eventual-value handle returned by `Task::run`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use crate::cancel::{Cancelable, StackedCancelable};
use crate::error::{TaskError, TaskResult};
use crate::scheduler::Scheduler;

use super::node::{downcast, Value};

type Listener<A> = Box<dyn FnOnce(TaskResult<A>) + Send>;

enum State<A> {
    Pending(Vec<Listener<A>>),
    Done(TaskResult<A>),
}

struct Shared<A> {
    state: Mutex<State<A>>,
    completed: Condvar,
    connection: Arc<StackedCancelable>,
    scheduler: Arc<dyn Scheduler>,
}

/// A running (or finished) computation: observe its single outcome, or
/// cancel it.
///
/// A cancelled run never completes; observers relying on [`wait`](Self::wait)
/// should prefer [`wait_timeout`](Self::wait_timeout) when cancellation is in
/// play.
pub struct TaskHandle<A> {
    shared: Arc<Shared<A>>,
}

impl<A> Clone for TaskHandle<A> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<A: Send + 'static> TaskHandle<A> {
    pub(crate) fn new(connection: Arc<StackedCancelable>, scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::Pending(Vec::new())),
                completed: Condvar::new(),
                connection,
                scheduler,
            }),
        }
    }

    /// Whether the outcome has been delivered.
    pub fn is_completed(&self) -> bool {
        matches!(&*self.shared.state.lock(), State::Done(_))
    }

    /// Ask the run to stop. Cooperative; a no-op once the outcome has been
    /// delivered, idempotent otherwise.
    pub fn cancel(&self) {
        self.shared.connection.cancel();
    }
}

impl<A: Clone + Send + 'static> TaskHandle<A> {
    /// Deliver the outcome. Listeners run in registration order; each fires
    /// at most once.
    pub(crate) fn complete(&self, result: TaskResult<A>) {
        let listeners = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    let listeners = std::mem::take(listeners);
                    *state = State::Done(result.clone());
                    listeners
                }
                // A second completion signal is a contract violation of the
                // run loop; the first outcome stands.
                State::Done(_) => return,
            }
        };
        self.shared.completed.notify_all();
        for listener in listeners {
            self.invoke(listener, result.clone());
        }
    }

    /// Deliver an erased outcome from the run loop.
    pub(crate) fn complete_erased(&self, result: TaskResult<Value>) {
        self.complete(result.and_then(downcast::<A>));
    }

    fn invoke(&self, listener: Listener<A>, result: TaskResult<A>) {
        let invoked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            listener(result);
        }));
        if let Err(payload) = invoked {
            self.shared
                .scheduler
                .report_failure(&TaskError::from_panic(payload));
        }
    }

    /// Observe the outcome. Fires immediately when already complete,
    /// exactly once otherwise, and never for a cancelled run.
    pub fn on_complete(&self, listener: impl FnOnce(TaskResult<A>) + Send + 'static) {
        let immediate = {
            let mut state = self.shared.state.lock();
            match &mut *state {
                State::Pending(listeners) => {
                    listeners.push(Box::new(listener));
                    None
                }
                State::Done(result) => Some((Box::new(listener) as Listener<A>, result.clone())),
            }
        };
        if let Some((listener, result)) = immediate {
            self.invoke(listener, result);
        }
    }

    /// The outcome, if already delivered.
    pub fn result(&self) -> Option<TaskResult<A>> {
        match &*self.shared.state.lock() {
            State::Pending(_) => None,
            State::Done(result) => Some(result.clone()),
        }
    }

    /// Block the calling thread until the outcome is delivered.
    pub fn wait(&self) -> TaskResult<A> {
        let mut state = self.shared.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return result.clone();
            }
            self.shared.completed.wait(&mut state);
        }
    }

    /// Block until the outcome is delivered or `timeout` elapses.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<TaskResult<A>> {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        loop {
            if let State::Done(result) = &*state {
                return Some(result.clone());
            }
            if self
                .shared
                .completed
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return match &*state {
                    State::Done(result) => Some(result.clone()),
                    State::Pending(_) => None,
                };
            }
        }
    }
}

impl<A: Send + 'static> Cancelable for TaskHandle<A> {
    fn cancel(&self) {
        TaskHandle::cancel(self);
    }
}

impl<A> std::fmt::Debug for TaskHandle<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.shared.state.lock() {
            State::Pending(_) => "pending",
            State::Done(Ok(_)) => "succeeded",
            State::Done(Err(_)) => "failed",
        };
        f.debug_struct("TaskHandle").field("state", &state).finish()
    }
}
