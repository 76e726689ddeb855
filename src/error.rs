//! Task errors
//!
//! The fixed failure type carried by every [`Task`](crate::Task). A task is
//! polymorphic over its success value but always fails with a [`TaskError`],
//! which keeps the run loop monomorphic over the error channel.

use std::sync::Arc;
use thiserror::Error;

/// Task result
pub type TaskResult<T> = Result<T, TaskError>;

/// Task errors
///
/// Cloneable: memoized outcomes (see [`Task::once`](crate::Task::once)) and
/// multi-listener handles replay the same failure to several observers.
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// An ad-hoc failure raised with a message.
    #[error("{0}")]
    Message(String),

    /// A wrapped error value raised by the computation.
    #[error(transparent)]
    Source(Arc<dyn std::error::Error + Send + Sync + 'static>),

    /// A user-supplied closure panicked while the run loop evaluated it.
    #[error("task panicked: {0}")]
    Panicked(String),
}

impl TaskError {
    /// Wrap an arbitrary error value.
    pub fn source<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        TaskError::Source(Arc::new(error))
    }

    /// Build an ad-hoc failure from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        TaskError::Message(message.into())
    }

    /// Extract a printable payload from a caught panic.
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let text = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        TaskError::Panicked(text)
    }
}

impl From<String> for TaskError {
    fn from(message: String) -> Self {
        TaskError::Message(message)
    }
}

impl From<&str> for TaskError {
    fn from(message: &str) -> Self {
        TaskError::Message(message.to_string())
    }
}
