//! Stack-safety properties on the default scheduler.

use std::time::Duration;

use taskloop::{TailStep, Task};

#[test]
fn test_tail_rec_reaches_done() {
    let task = Task::tail_rec(10i64, |n| {
        if n > 0 {
            Task::now(TailStep::Continue(n - 1))
        } else {
            Task::now(TailStep::Done("Done!".to_string()))
        }
    });

    let outcome = task
        .run()
        .wait_timeout(Duration::from_secs(30))
        .expect("task did not complete in time");
    assert_eq!(outcome.unwrap(), "Done!");
}

#[test]
fn test_tail_rec_with_large_seed_does_not_overflow() {
    let task = Task::tail_rec(100_000i64, |n| {
        if n > 0 {
            Task::now(TailStep::Continue(n - 1))
        } else {
            Task::now(TailStep::Done(n))
        }
    });

    let outcome = task
        .run()
        .wait_timeout(Duration::from_secs(30))
        .expect("task did not complete in time");
    assert_eq!(outcome.unwrap(), 0);
}

#[test]
fn test_deep_bind_chain_does_not_overflow() {
    let mut task = Task::now(0u64);
    for _ in 0..100_000 {
        task = task.flat_map(|n| Task::now(n + 1));
    }

    let outcome = task
        .run()
        .wait_timeout(Duration::from_secs(60))
        .expect("task did not complete in time");
    assert_eq!(outcome.unwrap(), 100_000);
}
