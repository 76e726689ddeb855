//! The run-loop interpreter.
//!
//! Drives an erased [`Node`] to a terminal [`TaskResult`] without native
//! recursion: nested binds become entries on an explicit continuation stack,
//! and every [`SYNC_BATCH_SIZE`] steps the loop yields to the scheduler's
//! trampoline so a tight synchronous chain cannot monopolize a tick.
//!
//! Suspension happens in exactly two places: at an `Async` node (control
//! returns to the scheduler until the registrar's callback fires) and at
//! batch boundaries. Cancellation is observed cooperatively: always at
//! asynchronous boundaries, and additionally at every checkpoint when
//! `auto_cancelable_run_loops` is set. A cancelled run simply stops; the
//! completion callback is never invoked for it.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::trace;

use crate::cancel::{Cancelable, SingleAssignCancelable};
use crate::error::{TaskError, TaskResult};

use super::context::Context;
use super::node::{
    downcast, Callback, ErrorCont, LoopStep, LoopStepFn, Node, Registrar, Step, SuccessCont, Value,
};

/// Synchronous steps executed between trampoline yields.
///
/// Large enough that yield overhead is noise on long chains, small enough
/// that a tight loop stays fair and cancellation checkpoints stay frequent.
pub(crate) const SYNC_BATCH_SIZE: usize = 128;

/// A pending continuation, pushed while its source evaluates.
enum Bind {
    /// Success-only continuation; skipped when a failure travels past it.
    OnSuccess(SuccessCont),
    /// Branches on both outcomes.
    Full {
        on_error: ErrorCont,
        on_success: SuccessCont,
    },
    /// Re-arms itself while the loop keeps yielding `Continue`.
    TailRec(LoopStepFn),
}

type BindStack = SmallVec<[Bind; 8]>;

/// What the loop is currently holding: a node still to evaluate, or an
/// outcome looking for its next continuation.
enum Flow {
    Node(Node),
    Value(TaskResult<Value>),
}

/// Start a run: evaluate `node` under `ctx`, eventually calling
/// `on_complete` exactly once, unless the run is cancelled first.
pub(crate) fn start(node: Node, ctx: Context, on_complete: Callback) {
    run_loop(Flow::Node(node), BindStack::new(), ctx, on_complete, SYNC_BATCH_SIZE);
}

fn run_loop(
    mut flow: Flow,
    mut stack: BindStack,
    mut ctx: Context,
    on_complete: Callback,
    mut budget: usize,
) {
    loop {
        // Trampoline checkpoint.
        if ctx.options().auto_cancelable_run_loops && ctx.is_canceled() {
            trace!("run cancelled at checkpoint");
            return;
        }
        if budget == 0 {
            trace!(pending = stack.len(), "trampoline yield");
            let scheduler = ctx.scheduler().clone();
            scheduler.schedule(Box::new(move || {
                run_loop(flow, stack, ctx, on_complete, SYNC_BATCH_SIZE);
            }));
            return;
        }
        budget -= 1;

        flow = match flow {
            Flow::Node(node) => match node {
                Node::Pure(factory) => Flow::Value(caught(|| factory())),
                Node::Raise(error) => Flow::Value(Err(error)),
                Node::Eval(thunk) => Flow::Value(caught_result(|| thunk())),
                Node::Suspend(thunk) => match caught(|| thunk()) {
                    Ok(next) => Flow::Node(next),
                    Err(error) => Flow::Value(Err(error)),
                },
                Node::Bind { source, on_success } => {
                    stack.push(Bind::OnSuccess(on_success));
                    Flow::Node(*source)
                }
                Node::Transform {
                    source,
                    on_error,
                    on_success,
                } => {
                    stack.push(Bind::Full {
                        on_error,
                        on_success,
                    });
                    Flow::Node(*source)
                }
                Node::Loop { init, step } => match caught(|| init()) {
                    Ok(seed) => {
                        stack.push(Bind::TailRec(step.clone()));
                        match caught(|| step(seed)) {
                            Ok(next) => Flow::Node(next),
                            Err(error) => Flow::Value(Err(error)),
                        }
                    }
                    Err(error) => Flow::Value(Err(error)),
                },
                Node::WithOptions { source, options } => {
                    ctx = ctx.switch_options(options);
                    Flow::Node(*source)
                }
                Node::Async { registrar, managed } => {
                    suspend_at_boundary(registrar, managed, stack, ctx, on_complete);
                    return;
                }
            },
            Flow::Value(result) => match stack.pop() {
                None => {
                    deliver(result, on_complete, &ctx);
                    return;
                }
                Some(Bind::OnSuccess(cont)) => match result {
                    Ok(value) => apply_success(&cont, value),
                    // Success-only continuation: the failure travels past it.
                    Err(error) => Flow::Value(Err(error)),
                },
                Some(Bind::Full {
                    on_error,
                    on_success,
                }) => match result {
                    Ok(value) => apply_success(&on_success, value),
                    Err(error) => apply_error(&on_error, error),
                },
                Some(Bind::TailRec(step)) => match result {
                    Ok(value) => match downcast::<LoopStep>(value) {
                        Ok(LoopStep::Continue(seed)) => {
                            stack.push(Bind::TailRec(step.clone()));
                            match caught(|| step(seed)) {
                                Ok(next) => Flow::Node(next),
                                Err(error) => Flow::Value(Err(error)),
                            }
                        }
                        Ok(LoopStep::Done(value)) => Flow::Value(Ok(value)),
                        Err(error) => Flow::Value(Err(error)),
                    },
                    Err(error) => Flow::Value(Err(error)),
                },
            },
        };
    }
}

/// Evaluate a user-supplied closure, reifying panics as failures.
fn caught<T>(f: impl FnOnce() -> T) -> TaskResult<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(TaskError::from_panic)
}

fn caught_result<T>(f: impl FnOnce() -> TaskResult<T>) -> TaskResult<T> {
    caught(f).and_then(|result| result)
}

fn apply_success(cont: &SuccessCont, value: Value) -> Flow {
    match caught(|| cont(value)) {
        Ok(Step::Done(result)) => Flow::Value(result),
        Ok(Step::More(node)) => Flow::Node(node),
        Err(error) => Flow::Value(Err(error)),
    }
}

fn apply_error(cont: &ErrorCont, error: TaskError) -> Flow {
    match caught(|| cont(error)) {
        Ok(Step::Done(result)) => Flow::Value(result),
        Ok(Step::More(node)) => Flow::Node(node),
        Err(error) => Flow::Value(Err(error)),
    }
}

/// Everything a suspended run needs to resume, armed at most once.
///
/// Both the registrar's callback and the panic-recovery path race for the
/// same state; whichever fires second finds it empty and does nothing.
struct Resume {
    state: Mutex<Option<(BindStack, Context, Callback)>>,
    managed: bool,
}

impl Resume {
    fn fire(&self, result: TaskResult<Value>) {
        let taken = self.state.lock().take();
        let Some((stack, ctx, on_complete)) = taken else {
            // Second signal: a no-op by contract.
            return;
        };
        if self.managed {
            // Pop before anything else runs, so the registrar's handle is
            // gone from the token the instant the boundary completed.
            ctx.connection().pop();
        }
        if ctx.is_canceled() {
            // Cancellation won the race; the result is dropped.
            trace!("async result dropped after cancellation");
            return;
        }
        let scheduler = ctx.scheduler().clone();
        scheduler.schedule(Box::new(move || {
            run_loop(Flow::Value(result), stack, ctx, on_complete, SYNC_BATCH_SIZE);
        }));
    }
}

/// Evaluate an `Async` node: hand the registrar a one-shot resume callback
/// and return control to the scheduler until it fires.
fn suspend_at_boundary(
    registrar: Registrar,
    managed: bool,
    stack: BindStack,
    ctx: Context,
    on_complete: Callback,
) {
    // Async boundaries always observe cancellation, whatever the options.
    if ctx.is_canceled() {
        trace!("run cancelled at async boundary");
        return;
    }

    let resume = Arc::new(Resume {
        state: Mutex::new(Some((stack, ctx.clone(), on_complete))),
        managed,
    });

    // Managed mode: occupy the token *before* the registrar runs, so a
    // cancellation arriving mid-registration still reaches the handle the
    // registrar produces afterwards.
    let slot = if managed {
        let slot = Arc::new(SingleAssignCancelable::new());
        ctx.connection().push(slot.clone());
        Some(slot)
    } else {
        None
    };

    let callback: Callback = {
        let resume = resume.clone();
        Box::new(move |result| resume.fire(result))
    };

    match caught(|| registrar(&ctx, callback)) {
        Ok(Some(handle)) => {
            if let Some(slot) = slot {
                slot.set(handle);
            } else {
                // Unmanaged registrars own their token bookkeeping; a
                // returned handle has nowhere to go.
                handle.cancel();
            }
        }
        Ok(None) => {}
        Err(error) => {
            // The registrar blew up before (or instead of) completing;
            // feed the failure through the normal machinery. If it already
            // completed, the resume state is empty and this is a no-op.
            resume.fire(Err(error));
        }
    }
}

/// Invoke the terminal callback exactly once. A panic escaping it cannot be
/// recovered by the task machinery; it goes to the scheduler's global error
/// channel instead of being looped back.
fn deliver(result: TaskResult<Value>, on_complete: Callback, ctx: &Context) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(move || on_complete(result))) {
        ctx.scheduler().report_failure(&TaskError::from_panic(payload));
    }
}
