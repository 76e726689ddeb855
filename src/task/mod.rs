//! Lazy task descriptions and their execution entry points.
//!
//! A [`Task`] is an immutable, inert value describing a computation.
//! Constructors and combinators only build structure; nothing executes and
//! no side effect runs until one of the `run*` entry points hands the
//! description to the run-loop interpreter. Running the same description
//! twice re-executes all of its effects independently, except through
//! [`Task::once`], which memoizes the first outcome.

pub mod context;
pub mod handle;
pub mod local;

mod node;
mod runloop;

pub use context::{Context, Options};
pub use handle::TaskHandle;
pub use local::DynamicVar;

use std::marker::PhantomData;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::cancel::Cancelable;
use crate::error::{TaskError, TaskResult};
use crate::scheduler::{self, Scheduler};

use node::{downcast, erase, Callback, LoopStep, Node, Step};

/// One iteration's verdict in [`Task::tail_rec`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailStep<S, A> {
    /// Loop again with a new seed.
    Continue(S),
    /// Stop with the final value.
    Done(A),
}

/// The typed completion callback handed to async registrars.
///
/// Consumed by completing; the type system enforces the at-most-once
/// contract.
pub struct Completer<A> {
    callback: Callback,
    _marker: PhantomData<fn(A)>,
}

impl<A: Send + 'static> Completer<A> {
    fn new(callback: Callback) -> Self {
        Self {
            callback,
            _marker: PhantomData,
        }
    }

    /// Deliver the outcome.
    pub fn complete(self, result: TaskResult<A>) {
        (self.callback)(result.map(erase));
    }

    /// Deliver a success.
    pub fn succeed(self, value: A) {
        self.complete(Ok(value));
    }

    /// Deliver a failure.
    pub fn fail(self, error: impl Into<TaskError>) {
        self.complete(Err(error.into()));
    }
}

/// An immutable description of a deferred, possibly asynchronous
/// computation yielding an `A` or failing with a [`TaskError`].
///
/// Cloning is cheap (shared closures) and clones are interchangeable with
/// the original description.
pub struct Task<A> {
    node: Node,
    _marker: PhantomData<fn() -> A>,
}

impl<A> Clone for Task<A> {
    fn clone(&self) -> Self {
        Self {
            node: self.node.clone(),
            _marker: PhantomData,
        }
    }
}

impl<A> std::fmt::Debug for Task<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Task").field(&self.node).finish()
    }
}

impl<A: Send + 'static> Task<A> {
    fn from_node(node: Node) -> Self {
        Self {
            node,
            _marker: PhantomData,
        }
    }

    /// An already-computed success.
    pub fn now(value: A) -> Self
    where
        A: Clone + Sync,
    {
        Self::from_node(Node::Pure(Arc::new(move || erase(value.clone()))))
    }

    /// An already-computed failure.
    pub fn raise(error: impl Into<TaskError>) -> Self {
        Self::from_node(Node::Raise(error.into()))
    }

    /// A synchronous computation, re-evaluated on every run.
    pub fn eval(f: impl Fn() -> A + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Eval(Arc::new(move || Ok(erase(f())))))
    }

    /// A synchronous computation evaluated at most once across all runs of
    /// this description instance; later runs replay the memoized outcome.
    ///
    /// Single-flight: concurrent first runs race for one evaluation, the
    /// losers block until it is available. A panic in `f` is memoized as
    /// the failure it produced.
    pub fn once(f: impl Fn() -> A + Send + Sync + 'static) -> Self
    where
        A: Clone + Sync,
    {
        let cell: Arc<OnceCell<TaskResult<A>>> = Arc::new(OnceCell::new());
        Self::from_node(Node::Eval(Arc::new(move || {
            cell.get_or_init(|| {
                catch_unwind(AssertUnwindSafe(|| f())).map_err(TaskError::from_panic)
            })
            .clone()
            .map(erase)
        })))
    }

    /// Lazily build a task when run; the usual way to express recursion
    /// without eagerly constructing the whole chain.
    pub fn suspend(f: impl Fn() -> Task<A> + Send + Sync + 'static) -> Self {
        Self::from_node(Node::Suspend(Arc::new(move || f().node)))
    }

    /// The safe asynchronous constructor.
    ///
    /// The registrar receives the live [`Context`] and a one-shot
    /// [`Completer`]; it may complete synchronously or schedule work that
    /// completes later, and may return a handle aborting that work. The run
    /// loop links the handle into the cancellation token and unlinks it the
    /// moment the boundary completes.
    pub fn create<F>(register: F) -> Self
    where
        F: Fn(&Context, Completer<A>) -> Option<Arc<dyn Cancelable>> + Send + Sync + 'static,
    {
        Self::from_node(Node::Async {
            registrar: Arc::new(move |ctx: &Context, callback: Callback| {
                register(ctx, Completer::new(callback))
            }),
            managed: true,
        })
    }

    /// The raw asynchronous constructor. Unlike [`Task::create`], the
    /// registrar is responsible for pushing and popping its own handle on
    /// `ctx.connection()`; prefer `create` unless that control is needed.
    pub fn unsafe_create<F>(register: F) -> Self
    where
        F: Fn(&Context, Completer<A>) + Send + Sync + 'static,
    {
        Self::from_node(Node::Async {
            registrar: Arc::new(move |ctx: &Context, callback: Callback| {
                register(ctx, Completer::new(callback));
                None
            }),
            managed: false,
        })
    }

    /// Repeatedly apply `step`, starting from `seed`, until it yields
    /// [`TailStep::Done`]. Iterations cost O(1) interpreter state, so the
    /// loop is stack-safe for any iteration count.
    pub fn tail_rec<S>(
        seed: S,
        step: impl Fn(S) -> Task<TailStep<S, A>> + Send + Sync + 'static,
    ) -> Self
    where
        S: Clone + Send + Sync + 'static,
    {
        Self::from_node(Node::Loop {
            init: Arc::new(move || erase(seed.clone())),
            step: Arc::new(move |value| match downcast::<S>(value) {
                Ok(seed) => {
                    step(seed)
                        .map(|verdict| match verdict {
                            TailStep::Continue(next) => LoopStep::Continue(erase(next)),
                            TailStep::Done(value) => LoopStep::Done(erase(value)),
                        })
                        .node
                }
                Err(error) => Node::Raise(error),
            }),
        })
    }

    /// Replace the success value with `f(value)`; failures pass through.
    pub fn map<B: Send + 'static>(self, f: impl Fn(A) -> B + Send + Sync + 'static) -> Task<B> {
        Task::from_node(Node::Bind {
            source: Box::new(self.node),
            on_success: Arc::new(move |value| match downcast::<A>(value) {
                Ok(value) => Step::Done(Ok(erase(f(value)))),
                Err(error) => Step::Done(Err(error)),
            }),
        })
    }

    /// Feed the success value to `f` and continue with the task it builds;
    /// failures pass through without invoking `f`.
    pub fn flat_map<B: Send + 'static>(
        self,
        f: impl Fn(A) -> Task<B> + Send + Sync + 'static,
    ) -> Task<B> {
        Task::from_node(Node::Bind {
            source: Box::new(self.node),
            on_success: Arc::new(move |value| match downcast::<A>(value) {
                Ok(value) => Step::More(f(value).node),
                Err(error) => Step::Done(Err(error)),
            }),
        })
    }

    /// Alias for [`Task::flat_map`].
    pub fn and_then<B: Send + 'static>(
        self,
        f: impl Fn(A) -> Task<B> + Send + Sync + 'static,
    ) -> Task<B> {
        self.flat_map(f)
    }

    /// Branch on the outcome, producing a plain value either way; the
    /// result never fails unless a branch panics.
    pub fn transform<B: Send + 'static>(
        self,
        on_error: impl Fn(TaskError) -> B + Send + Sync + 'static,
        on_success: impl Fn(A) -> B + Send + Sync + 'static,
    ) -> Task<B> {
        Task::from_node(Node::Transform {
            source: Box::new(self.node),
            on_error: Arc::new(move |error| Step::Done(Ok(erase(on_error(error))))),
            on_success: Arc::new(move |value| match downcast::<A>(value) {
                Ok(value) => Step::Done(Ok(erase(on_success(value)))),
                Err(error) => Step::Done(Err(error)),
            }),
        })
    }

    /// Branch on the outcome, continuing with the task each branch builds;
    /// recovery can itself fail or chain further.
    pub fn transform_with<B: Send + 'static>(
        self,
        on_error: impl Fn(TaskError) -> Task<B> + Send + Sync + 'static,
        on_success: impl Fn(A) -> Task<B> + Send + Sync + 'static,
    ) -> Task<B> {
        Task::from_node(Node::Transform {
            source: Box::new(self.node),
            on_error: Arc::new(move |error| Step::More(on_error(error).node)),
            on_success: Arc::new(move |value| match downcast::<A>(value) {
                Ok(value) => Step::More(on_success(value).node),
                Err(error) => Step::Done(Err(error)),
            }),
        })
    }

    /// Turn a failure into a success value; successes pass through.
    pub fn recover(self, f: impl Fn(TaskError) -> A + Send + Sync + 'static) -> Task<A> {
        Task::from_node(Node::Transform {
            source: Box::new(self.node),
            on_error: Arc::new(move |error| Step::Done(Ok(erase(f(error))))),
            on_success: Arc::new(|value| Step::Done(Ok(value))),
        })
    }

    /// Turn a failure into a recovery task; successes pass through.
    pub fn recover_with(self, f: impl Fn(TaskError) -> Task<A> + Send + Sync + 'static) -> Task<A> {
        Task::from_node(Node::Transform {
            source: Box::new(self.node),
            on_error: Arc::new(move |error| Step::More(f(error).node)),
            on_success: Arc::new(|value| Step::Done(Ok(value))),
        })
    }

    /// Reify the outcome as a value: the resulting task never fails, it
    /// succeeds with `Ok(value)` or `Err(error)`.
    pub fn attempt(self) -> Task<TaskResult<A>> {
        Task::from_node(Node::Transform {
            source: Box::new(self.node),
            on_error: Arc::new(move |error| Step::Done(Ok(erase::<TaskResult<A>>(Err(error))))),
            on_success: Arc::new(move |value| match downcast::<A>(value) {
                Ok(value) => Step::Done(Ok(erase::<TaskResult<A>>(Ok(value)))),
                Err(error) => Step::Done(Err(error)),
            }),
        })
    }

    /// Run purely for the success side effect, discarding the value.
    pub fn for_each(self, f: impl Fn(A) + Send + Sync + 'static) -> Task<()> {
        self.map(move |value| {
            f(value);
        })
    }

    /// The same description, run with `options` baked in.
    pub fn execute_with_options(&self, options: Options) -> Task<A> {
        Task::from_node(Node::WithOptions {
            source: Box::new(self.node.clone()),
            options,
        })
    }

    /// Start on the process-wide default scheduler.
    pub fn run(&self) -> TaskHandle<A>
    where
        A: Clone,
    {
        self.run_with(scheduler::global())
    }

    /// Start on the given scheduler, returning the eventual-value handle.
    ///
    /// The synchronous prefix of the task runs on the calling thread up to
    /// the first asynchronous boundary or trampoline yield.
    pub fn run_with(&self, scheduler: Arc<dyn Scheduler>) -> TaskHandle<A>
    where
        A: Clone,
    {
        let ctx = Context::new(scheduler);
        let handle = TaskHandle::new(ctx.connection().clone(), ctx.scheduler().clone());
        let completing = handle.clone();
        runloop::start(
            self.node.clone(),
            ctx,
            Box::new(move |result| completing.complete_erased(result)),
        );
        handle
    }

    /// Fire-and-observe on the default scheduler: run the task, pass the
    /// outcome to `f`, and return a handle cancelling the run.
    pub fn run_on_complete(
        &self,
        f: impl FnOnce(TaskResult<A>) + Send + 'static,
    ) -> Arc<dyn Cancelable> {
        self.run_on_complete_with(scheduler::global(), f)
    }

    /// Fire-and-observe on the given scheduler.
    pub fn run_on_complete_with(
        &self,
        scheduler: Arc<dyn Scheduler>,
        f: impl FnOnce(TaskResult<A>) + Send + 'static,
    ) -> Arc<dyn Cancelable> {
        let ctx = Context::new(scheduler);
        let connection = ctx.connection().clone();
        runloop::start(
            self.node.clone(),
            ctx,
            Box::new(move |result| f(result.and_then(downcast::<A>))),
        );
        connection
    }

    /// Low-level entry point: run under a caller-supplied context. Used
    /// internally by the other entry points and for advanced integration.
    pub fn unsafe_start(&self, ctx: Context, on_complete: impl FnOnce(TaskResult<A>) + Send + 'static) {
        runloop::start(
            self.node.clone(),
            ctx,
            Box::new(move |result| on_complete(result.and_then(downcast::<A>))),
        );
    }
}

impl Task<()> {
    /// The no-op successful task.
    pub fn unit() -> Task<()> {
        Task::now(())
    }
}

#[cfg(test)]
mod tests;
