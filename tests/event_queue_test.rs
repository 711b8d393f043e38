//! Integration tests for the fail-fast two-lane event queue.
//!
//! These tests validate the scheduler's externally observable contract:
//! - FIFO delivery within a lane
//! - Exhaustive drain on the happy path
//! - Fail-fast abandonment of queued normal work after the first failure
//! - Background-lane immunity to normal-lane failures
//! - Exactly one surfaced error under concurrent failures
//! - Forced teardown via shutdown()

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use lanequeue::{EventQueue, Priority};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

fn counter() -> Arc<AtomicUsize> {
    Arc::new(AtomicUsize::new(0))
}

fn push_index(
    queue: &EventQueue,
    priority: Priority,
    seq: &Arc<Mutex<Vec<usize>>>,
    index: usize,
) {
    let seq = Arc::clone(seq);
    queue.enqueue(priority, move || {
        seq.lock().push(index);
        Ok(())
    });
}

// ============================================================================
// FIFO AND DRAIN
// ============================================================================

/// Items enqueued into one lane before the pool starts are delivered in
/// enqueue order when a single worker serves the lane.
#[test]
fn test_fifo_within_normal_lane() {
    let queue = EventQueue::new(1).unwrap();
    let seq = Arc::new(Mutex::new(Vec::new()));

    for i in 0..10 {
        push_index(&queue, Priority::Normal, &seq, i);
    }

    assert!(queue.wait_completion().is_none());
    assert_eq!(*seq.lock(), (0..10).collect::<Vec<_>>());
}

/// Scenario A: two normal workers, five actions appending their index and
/// sleeping. No error; every index present (cross-worker order is free).
#[test]
fn test_all_actions_run_before_completion() {
    let queue = EventQueue::new(2).unwrap();
    let seq = Arc::new(Mutex::new(Vec::new()));

    for i in 0..5 {
        let seq = Arc::clone(&seq);
        queue.enqueue(Priority::Normal, move || {
            seq.lock().push(i);
            thread::sleep(Duration::from_millis(10));
            Ok(())
        });
    }

    assert!(queue.wait_completion().is_none());

    let mut observed = seq.lock().clone();
    observed.sort_unstable();
    assert_eq!(observed, vec![0, 1, 2, 3, 4]);
}

/// An empty queue is drained the moment the pool starts.
#[test]
fn test_wait_completion_with_no_work() {
    let queue = EventQueue::new(4).unwrap();
    assert!(queue.wait_completion().is_none());
}

/// Work enqueued from inside a running action extends the drain: completion
/// only returns once the whole chain has retired.
#[test]
fn test_reentrant_enqueue_extends_drain() {
    let queue = Arc::new(EventQueue::new(2).unwrap());
    let ran = counter();

    let q = Arc::clone(&queue);
    let c = Arc::clone(&ran);
    queue.enqueue(Priority::Normal, move || {
        c.fetch_add(1, Ordering::SeqCst);
        let c2 = Arc::clone(&c);
        let q2 = Arc::clone(&q);
        q.enqueue(Priority::Normal, move || {
            c2.fetch_add(1, Ordering::SeqCst);
            let c3 = Arc::clone(&c2);
            q2.enqueue(Priority::Background, move || {
                c3.fetch_add(1, Ordering::SeqCst);
                Ok(())
            });
            Ok(())
        });
        Ok(())
    });

    assert!(queue.wait_completion().is_none());
    assert_eq!(ran.load(Ordering::SeqCst), 3);
}

// ============================================================================
// FAIL-FAST
// ============================================================================

/// Scenario B: a failing normal action abandons the normal backlog behind
/// it; the second action never runs and the failure is surfaced.
#[test]
fn test_failure_abandons_queued_normal_work() {
    let queue = EventQueue::new(1).unwrap();
    let ran = counter();

    queue.enqueue(Priority::Normal, || Err(anyhow::anyhow!("build exploded")));
    let c = Arc::clone(&ran);
    queue.enqueue(Priority::Normal, move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = queue.wait_completion().expect("failure must be surfaced");
    assert_eq!(err.to_string(), "build exploded");
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

/// Scenario C: background work enqueued around a normal-lane failure runs
/// to completion while the failure is still surfaced.
#[test]
fn test_background_lane_immune_to_failure() {
    let queue = Arc::new(EventQueue::new(1).unwrap());
    let ran = counter();

    queue.enqueue(Priority::Normal, || Err(anyhow::anyhow!("build exploded")));

    // Enqueued before the failure runs.
    for _ in 0..3 {
        let c = Arc::clone(&ran);
        queue.enqueue(Priority::Background, move || {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    // Enqueued from inside background work, after the failure is captured.
    let q = Arc::clone(&queue);
    let c = Arc::clone(&ran);
    queue.enqueue(Priority::Background, move || {
        thread::sleep(Duration::from_millis(20));
        let c2 = Arc::clone(&c);
        q.enqueue(Priority::Background, move || {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    });

    let err = queue.wait_completion().expect("failure must be surfaced");
    assert_eq!(err.to_string(), "build exploded");
    assert_eq!(ran.load(Ordering::SeqCst), 4);
}

/// Exactly one error is surfaced when many actions fail, and it is one of
/// the real failures.
#[test]
fn test_single_error_surfaced_under_concurrent_failures() {
    let queue = EventQueue::new(4).unwrap();

    for i in 0..8 {
        queue.enqueue(Priority::Normal, move || Err(anyhow::anyhow!("fail-{i}")));
        queue.enqueue(Priority::Background, move || {
            Err(anyhow::anyhow!("bg-fail-{i}"))
        });
    }

    let err = queue.wait_completion().expect("a failure must be surfaced");
    let msg = err.to_string();
    assert!(
        msg.starts_with("fail-") || msg.starts_with("bg-fail-"),
        "unexpected error: {msg}"
    );
}

/// A panicking action is captured like a returned error.
#[test]
fn test_panic_captured_as_failure() {
    let queue = EventQueue::new(1).unwrap();

    queue.enqueue(Priority::Normal, || panic!("worker went boom"));

    let err = queue.wait_completion().expect("panic must be surfaced");
    let msg = err.to_string();
    assert!(msg.contains("action panicked"), "unexpected error: {msg}");
    assert!(msg.contains("worker went boom"), "unexpected error: {msg}");
}

/// A background-only failure is still captured and surfaced.
#[test]
fn test_background_failure_is_captured() {
    let queue = EventQueue::new(1).unwrap();
    let ran = counter();

    queue.enqueue(Priority::Background, || Err(anyhow::anyhow!("flush failed")));
    let c = Arc::clone(&ran);
    queue.enqueue(Priority::Background, move || {
        c.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = queue.wait_completion().expect("failure must be surfaced");
    assert_eq!(err.to_string(), "flush failed");
    // Background running is never halted by a capture.
    assert_eq!(ran.load(Ordering::SeqCst), 1);
}

/// Normal work enqueued after a failure has been captured is silently
/// dropped without stalling drainage.
#[test]
fn test_normal_enqueue_after_failure_is_dropped() {
    let queue = Arc::new(EventQueue::new(1).unwrap());
    let ran = counter();

    queue.enqueue(Priority::Normal, || Err(anyhow::anyhow!("build exploded")));

    // From inside background work that runs after the capture.
    let q = Arc::clone(&queue);
    let c = Arc::clone(&ran);
    queue.enqueue(Priority::Background, move || {
        thread::sleep(Duration::from_millis(50));
        let c2 = Arc::clone(&c);
        q.enqueue(Priority::Normal, move || {
            c2.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        Ok(())
    });

    let err = queue.wait_completion().expect("failure must be surfaced");
    assert_eq!(err.to_string(), "build exploded");
    assert_eq!(ran.load(Ordering::SeqCst), 0);
}

// ============================================================================
// TEARDOWN
// ============================================================================

/// shutdown() cancels a running queue without waiting for drainage, and a
/// concurrent wait_completion() returns instead of hanging.
#[test]
fn test_shutdown_unblocks_completion_wait() {
    let queue = Arc::new(EventQueue::new(1).unwrap());

    queue.enqueue(Priority::Background, || {
        thread::sleep(Duration::from_millis(100));
        Ok(())
    });

    let waiter = {
        let q = Arc::clone(&queue);
        thread::spawn(move || q.wait_completion())
    };

    thread::sleep(Duration::from_millis(20));
    let start = Instant::now();
    queue.shutdown();
    // A second call must be a no-op.
    queue.shutdown();

    waiter.join().unwrap();
    assert!(start.elapsed() < Duration::from_secs(2));
}

/// Dropping a queue with work still buffered does not hang.
#[test]
fn test_drop_without_wait_does_not_hang() {
    let queue = EventQueue::new(2).unwrap();
    queue.enqueue(Priority::Normal, || Ok(()));
    queue.enqueue(Priority::Background, || Ok(()));
    drop(queue);
}

// ============================================================================
// STRESS
// ============================================================================

/// Both lanes under sustained mixed load: everything runs exactly once and
/// drainage completes without error.
#[test]
fn test_mixed_load_drains_exactly_once() {
    let queue = EventQueue::new(4).unwrap();
    let normal_ran = counter();
    let background_ran = counter();

    for _ in 0..100 {
        let c = Arc::clone(&normal_ran);
        queue.enqueue(Priority::Normal, move || {
            thread::sleep(Duration::from_millis(rand::random_range(0..3)));
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        let c = Arc::clone(&background_ran);
        queue.enqueue(Priority::Background, move || {
            thread::sleep(Duration::from_millis(rand::random_range(0..3)));
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
    }

    assert!(queue.wait_completion().is_none());
    assert_eq!(normal_ran.load(Ordering::SeqCst), 100);
    assert_eq!(background_ran.load(Ordering::SeqCst), 100);
}
