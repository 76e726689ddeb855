//! Functor and monad laws, checked on the virtual scheduler.

use std::sync::Arc;

use proptest::prelude::*;

use taskloop::scheduler::{Scheduler, VirtualScheduler};
use taskloop::{Task, TaskResult};

fn outcome(task: &Task<i64>) -> TaskResult<i64> {
    let scheduler = VirtualScheduler::new();
    let handle = task.run_with(scheduler.clone() as Arc<dyn Scheduler>);
    while scheduler.tick() > 0 {}
    handle.result().expect("task did not complete")
}

fn assert_same_outcome(left: &Task<i64>, right: &Task<i64>) {
    match (outcome(left), outcome(right)) {
        (Ok(a), Ok(b)) => assert_eq!(a, b),
        (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
        (a, b) => panic!("outcomes diverge: {a:?} vs {b:?}"),
    }
}

proptest! {
    #[test]
    fn functor_identity(v in -1000i64..1000) {
        assert_same_outcome(&Task::now(v).map(|x| x), &Task::now(v));
    }

    #[test]
    fn functor_composition(v in -1000i64..1000, k in -10i64..10, m in -10i64..10) {
        let left = Task::now(v).map(move |x| x + k).map(move |x| x * m);
        let right = Task::now(v).map(move |x| (x + k) * m);
        assert_same_outcome(&left, &right);
    }

    #[test]
    fn monad_left_identity(v in -1000i64..1000, k in -10i64..10) {
        // f covers both outcome channels.
        let f = move |x: i64| {
            if (x + k) % 2 == 0 {
                Task::now(x + k)
            } else {
                Task::raise(format!("odd: {}", x + k))
            }
        };
        assert_same_outcome(&Task::now(v).flat_map(f), &f(v));
    }

    #[test]
    fn monad_right_identity(v in -1000i64..1000) {
        let t = Task::eval(move || v).map(|x| x * 3);
        assert_same_outcome(&t.clone().flat_map(Task::now), &t);
    }

    #[test]
    fn monad_associativity(v in -1000i64..1000, k in -10i64..10, m in -10i64..10) {
        let f = move |x: i64| Task::now(x + k);
        let g = move |x: i64| {
            if m == 0 {
                Task::raise("zero multiplier")
            } else {
                Task::now(x * m)
            }
        };
        let t = Task::now(v);
        let left = t.clone().flat_map(f).flat_map(g);
        let right = t.flat_map(move |x| f(x).flat_map(g));
        assert_same_outcome(&left, &right);
    }
}
