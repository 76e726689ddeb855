//! Task unit tests.
//!
//! Everything here runs on the [`VirtualScheduler`] so timing-sensitive
//! behavior is deterministic: `run_sync` drives a task to completion by
//! draining the virtual queue.


use std::sync::Arc;

use crate::error::TaskResult;
use crate::scheduler::{Scheduler, VirtualScheduler};
use crate::task::Task;

/// Run `task` on a fresh virtual scheduler, draining all immediate work.
fn run_sync<A: Clone + Send + 'static>(task: &Task<A>) -> Option<TaskResult<A>> {
    let scheduler = VirtualScheduler::new();
    let handle = task.run_with(scheduler.clone() as Arc<dyn Scheduler>);
    while scheduler.tick() > 0 {}
    handle.result()
}

/// Unwrap a success, panicking with the failure otherwise.
fn expect_ok<A: std::fmt::Debug>(result: Option<TaskResult<A>>) -> A {
    result.expect("task did not complete").expect("task failed")
}

/// Unwrap a failure's display string.
fn expect_err<A: std::fmt::Debug>(result: Option<TaskResult<A>>) -> String {
    result
        .expect("task did not complete")
        .expect_err("task unexpectedly succeeded")
        .to_string()
}
