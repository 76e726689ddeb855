//! Erased task representation.
//!
//! The public [`Task<A>`](crate::Task) is a thin typed wrapper around this
//! closed sum type. Erasing the value type behind `Box<dyn Any + Send>`
//! keeps the run loop monomorphic: one interpreter switch serves every
//! chain, whatever mix of value types its stages carry.
//!
//! Every closure is an `Arc<dyn Fn>` so descriptions are cheap to clone and
//! can be run any number of times, each run re-executing its effects.

use std::any::Any;
use std::sync::Arc;

use crate::cancel::Cancelable;
use crate::error::{TaskError, TaskResult};

use super::context::{Context, Options};

/// An erased success value.
pub(crate) type Value = Box<dyn Any + Send>;

/// Produces the known value of a `Pure` node, once per run.
pub(crate) type ValueFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// A deferred synchronous computation.
pub(crate) type EvalThunk = Arc<dyn Fn() -> TaskResult<Value> + Send + Sync>;

/// Lazily builds the node to run next.
pub(crate) type NodeThunk = Arc<dyn Fn() -> Node + Send + Sync>;

/// One-shot completion callback handed to async registrars.
pub(crate) type Callback = Box<dyn FnOnce(TaskResult<Value>) + Send>;

/// Registers asynchronous work; may return a handle aborting it.
pub(crate) type Registrar =
    Arc<dyn Fn(&Context, Callback) -> Option<Arc<dyn Cancelable>> + Send + Sync>;

/// Success continuation: value in, next step out.
pub(crate) type SuccessCont = Arc<dyn Fn(Value) -> Step + Send + Sync>;

/// Failure continuation: error in, next step out.
pub(crate) type ErrorCont = Arc<dyn Fn(TaskError) -> Step + Send + Sync>;

/// Applies one loop iteration to an erased seed.
pub(crate) type LoopStepFn = Arc<dyn Fn(Value) -> Node + Send + Sync>;

/// What a continuation produced: a finished outcome or more work.
pub(crate) enum Step {
    Done(TaskResult<Value>),
    More(Node),
}

/// Erased completion marker of one `Loop` iteration.
pub(crate) enum LoopStep {
    Continue(Value),
    Done(Value),
}

/// The inert description of a deferred computation.
///
/// Construction never evaluates anything and never recurses into
/// continuation closures; chains stay right-associated lazily.
#[derive(Clone)]
pub(crate) enum Node {
    /// An already-known success value.
    Pure(ValueFactory),
    /// An already-known failure.
    Raise(TaskError),
    /// A synchronous computation, evaluated once per run.
    Eval(EvalThunk),
    /// Lazily builds another node when run.
    Suspend(NodeThunk),
    /// Completion depends on an externally-scheduled callback.
    ///
    /// `managed` means the run loop links the registrar's handle into the
    /// cancellation token; unmanaged registrars push and pop their own.
    Async { registrar: Registrar, managed: bool },
    /// Run `source`, then feed its success value to `on_success`.
    Bind {
        source: Box<Node>,
        on_success: SuccessCont,
    },
    /// Run `source`, then branch on its outcome.
    Transform {
        source: Box<Node>,
        on_error: ErrorCont,
        on_success: SuccessCont,
    },
    /// Tail-recursive loop with O(1) interpreter state per iteration.
    Loop {
        init: ValueFactory,
        step: LoopStepFn,
    },
    /// Run `source` with different execution options.
    WithOptions {
        source: Box<Node>,
        options: Options,
    },
}

impl Node {
    /// Variant name, for trace output.
    pub(crate) fn tag(&self) -> &'static str {
        match self {
            Node::Pure(_) => "Pure",
            Node::Raise(_) => "Raise",
            Node::Eval(_) => "Eval",
            Node::Suspend(_) => "Suspend",
            Node::Async { .. } => "Async",
            Node::Bind { .. } => "Bind",
            Node::Transform { .. } => "Transform",
            Node::Loop { .. } => "Loop",
            Node::WithOptions { .. } => "WithOptions",
        }
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// Box a typed value into the erased representation.
#[inline]
pub(crate) fn erase<A: Send + 'static>(value: A) -> Value {
    Box::new(value)
}

/// Recover the typed value. A mismatch means a broken internal invariant;
/// it is surfaced as a failure rather than a panic so the run loop keeps
/// its no-panic guarantee.
pub(crate) fn downcast<A: 'static>(value: Value) -> TaskResult<A> {
    match value.downcast::<A>() {
        Ok(boxed) => Ok(*boxed),
        Err(_) => Err(TaskError::Message(
            "internal error: task value had an unexpected type".to_string(),
        )),
    }
}
