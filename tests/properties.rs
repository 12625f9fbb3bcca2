//! Property-based tests driving the real, fully-assembled `Timer`.
//!
//! Pure-logic invariants about wheel sizing and slot arithmetic live next
//! to the code they describe, in `src/wheel/mod.rs`'s own `#[quickcheck]`
//! tests. These tests instead check properties that only make sense with
//! actual threads and actual cancellation races involved.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use hashed_wheel_timer::TimerBuilder;
use quickcheck::TestResult;
use quickcheck_macros::quickcheck;

/// Cancelling immediately after submission must always prevent the task
/// from ever running, regardless of the requested delay.
#[quickcheck]
fn cancel_immediately_after_submit_never_fires(delay_ms: u8) -> TestResult {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(5))
        .ticks_per_wheel(16)
        .build()
        .unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let fired_clone = fired.clone();
    let handle = timer
        .new_timeout(
            move |_h| {
                fired_clone.fetch_add(1, Ordering::SeqCst);
            },
            Duration::from_millis(delay_ms as u64),
        )
        .unwrap();

    let cancelled = handle.cancel();

    // Give the worker ample time to have fired it, had cancellation not
    // taken effect.
    std::thread::sleep(Duration::from_millis(delay_ms as u64 + 100));
    timer.stop().unwrap();

    let never_fired = fired.load(Ordering::SeqCst) == 0;
    TestResult::from_bool(cancelled && never_fired && handle.is_cancelled())
}

/// Every submitted-but-never-cancelled handle reaches `Expired` once its
/// delay has safely elapsed, for any delay within the wheel's first
/// revolution.
#[quickcheck]
fn uncancelled_handles_eventually_expire(delay_ms: u8) -> TestResult {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(5))
        .ticks_per_wheel(16)
        .build()
        .unwrap();

    let handle = timer
        .new_timeout(|_h| {}, Duration::from_millis(delay_ms as u64))
        .unwrap();

    std::thread::sleep(Duration::from_millis(delay_ms as u64 + 100));
    timer.stop().unwrap();

    TestResult::from_bool(handle.is_expired() && !handle.is_cancelled())
}
