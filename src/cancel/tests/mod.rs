//! Cancellation primitive unit tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::cancel::{noop, BoxedCancelable, Cancelable, SingleAssignCancelable, StackedCancelable};

fn counting_handle(counter: &Arc<AtomicUsize>) -> Arc<dyn Cancelable> {
    let counter = counter.clone();
    BoxedCancelable::shared(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    })
}

#[test]
fn test_boxed_cancelable_runs_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let handle = counting_handle(&counter);

    handle.cancel();
    handle.cancel();
    handle.cancel();

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stacked_push_pop_without_cancel() {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = StackedCancelable::new();

    assert!(token.push(counting_handle(&counter)));
    assert_eq!(token.len(), 1);

    let popped = token.pop();
    assert!(popped.is_some());
    assert!(token.is_empty());

    // Popping without cancelling must not invoke the handle.
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn test_stacked_cancel_drains_all_handles_once() {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = StackedCancelable::new();

    token.push(counting_handle(&counter));
    token.push(counting_handle(&counter));
    token.push(counting_handle(&counter));

    token.cancel();
    assert!(token.is_canceled());
    assert!(token.is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 3);

    // Idempotent: nothing left to cancel.
    token.cancel();
    assert_eq!(counter.load(Ordering::SeqCst), 3);
}

#[test]
fn test_stacked_push_after_cancel_cancels_incoming() {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = StackedCancelable::new();

    token.cancel();
    let retained = token.push(counting_handle(&counter));

    assert!(!retained);
    assert!(token.is_empty());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_stacked_concurrent_cancel_and_push() {
    let counter = Arc::new(AtomicUsize::new(0));
    let token = StackedCancelable::new();
    let pushers: Vec<_> = (0..8)
        .map(|_| {
            let token = token.clone();
            let counter = counter.clone();
            std::thread::spawn(move || {
                for _ in 0..100 {
                    let handle = counting_handle(&counter);
                    if token.push(handle) {
                        token.pop();
                    }
                }
            })
        })
        .collect();

    token.cancel();
    for pusher in pushers {
        pusher.join().unwrap();
    }

    // Every handle either popped uninvoked or cancelled exactly once; a
    // second cancel pass must not change the count.
    let after_first = counter.load(Ordering::SeqCst);
    token.cancel();
    assert_eq!(counter.load(Ordering::SeqCst), after_first);
}

#[test]
fn test_single_assign_set_then_cancel() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = SingleAssignCancelable::new();

    slot.set(counting_handle(&counter));
    slot.cancel();
    slot.cancel();

    assert!(slot.is_canceled());
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_assign_cancel_then_set() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = SingleAssignCancelable::new();

    slot.cancel();
    slot.set(counting_handle(&counter));

    // The late assignment is cancelled immediately.
    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[test]
fn test_single_assign_second_set_is_cancelled() {
    let counter = Arc::new(AtomicUsize::new(0));
    let slot = SingleAssignCancelable::new();

    slot.set(noop());
    slot.set(counting_handle(&counter));

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}
