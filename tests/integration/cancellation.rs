//! End-to-end runs on real threads and real time.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

use taskloop::cancel::BoxedCancelable;
use taskloop::scheduler::{Scheduler, ThreadScheduler};
use taskloop::Task;

fn delayed_one(delay: Duration, cancels: &Arc<AtomicUsize>) -> Task<i32> {
    let cancels = cancels.clone();
    Task::create(move |ctx, completer| {
        let timer = ctx
            .scheduler()
            .schedule_after(delay, Box::new(move || completer.succeed(1)));
        let cancels = cancels.clone();
        Some(BoxedCancelable::shared(move || {
            cancels.fetch_add(1, Ordering::SeqCst);
            timer.cancel();
        }))
    })
}

#[test]
fn test_delayed_task_completes_on_thread_scheduler() {
    let cancels = Arc::new(AtomicUsize::new(0));
    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let handle = delayed_one(Duration::from_millis(50), &cancels).run_with(scheduler);

    let outcome = handle
        .wait_timeout(Duration::from_secs(10))
        .expect("task did not complete in time");
    assert_eq!(outcome.unwrap(), 1);
    assert_eq!(cancels.load(Ordering::SeqCst), 0);
}

#[test]
fn test_cancel_prevents_delayed_completion() {
    let cancels = Arc::new(AtomicUsize::new(0));
    let scheduler: Arc<dyn Scheduler> = Arc::new(ThreadScheduler::new());
    let handle = delayed_one(Duration::from_millis(100), &cancels).run_with(scheduler);

    handle.cancel();
    std::thread::sleep(Duration::from_millis(300));

    assert!(!handle.is_completed());
    assert_eq!(cancels.load(Ordering::SeqCst), 1);
}

#[test]
fn test_once_is_single_flight_across_threads() {
    let evaluated = Arc::new(AtomicUsize::new(0));
    let task = {
        let evaluated = evaluated.clone();
        Task::once(move || {
            // Widen the race window.
            std::thread::sleep(Duration::from_millis(20));
            evaluated.fetch_add(1, Ordering::SeqCst);
            42
        })
    };

    let barrier = Arc::new(Barrier::new(8));
    let runners: Vec<_> = (0..8)
        .map(|_| {
            let task = task.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                task.run()
                    .wait_timeout(Duration::from_secs(10))
                    .expect("task did not complete in time")
            })
        })
        .collect();

    for runner in runners {
        let outcome = runner.join().unwrap();
        assert_eq!(outcome.unwrap(), 42);
    }
    assert_eq!(evaluated.load(Ordering::SeqCst), 1);
}

#[test]
fn test_run_on_complete_observes_the_outcome() {
    let (sender, receiver) = std::sync::mpsc::channel();

    let task = Task::eval(|| 11).map(|n| n * 2);
    task.run_on_complete(move |result| {
        let _ = sender.send(result);
    });

    let outcome = receiver
        .recv_timeout(Duration::from_secs(10))
        .expect("no completion");
    assert_eq!(outcome.unwrap(), 22);
}
