//! taskloop
//!
//! Lazy, composable, cancelable task descriptions with a trampolined run
//! loop. A [`Task`] is an inert value: building one has no side effects,
//! running one drives it to a single success or failure: across
//! asynchronous boundaries, without growing the control stack on long
//! synchronous chains, and stoppable at any checkpoint through its
//! cancellation token.
//!
//! # Example
//!
//! ```
//! use taskloop::Task;
//!
//! let task = Task::eval(|| 20)
//!     .map(|n| n * 2)
//!     .flat_map(|n| Task::now(n + 2));
//!
//! let outcome = task.run().wait();
//! assert_eq!(outcome.unwrap(), 42);
//! ```

#![doc(html_root_url = "https://docs.rs/taskloop")]
#![warn(rust_2018_idioms)]

pub mod cancel;
pub mod error;
pub mod scheduler;
pub mod task;

// Utility modules
pub mod util;

// Re-exports
pub use error::{TaskError, TaskResult};
pub use task::{Completer, Context, DynamicVar, Options, TailStep, Task, TaskHandle};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
