//! Integration tests exercising the fully-assembled public `Timer`.
//!
//! These are timing-sensitive by nature (a hashed wheel's whole point is
//! approximate-but-bounded firing time), so assertions use generous
//! windows rather than exact instants.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use hashed_wheel_timer::TimerBuilder;

#[test]
fn basic_ordering_fires_within_expected_windows() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(50))
        .ticks_per_wheel(8)
        .build()
        .unwrap();

    let start = Instant::now();
    let fire_times: Arc<Mutex<Vec<(&'static str, Duration)>>> = Arc::new(Mutex::new(Vec::new()));

    for name in ["a", "b", "c"] {
        let fire_times = fire_times.clone();
        timer
            .new_timeout(
                move |_h| fire_times.lock().unwrap().push((name, start.elapsed())),
                Duration::from_millis(150),
            )
            .unwrap();
    }
    let fire_times_d = fire_times.clone();
    timer
        .new_timeout(
            move |_h| fire_times_d.lock().unwrap().push(("d", start.elapsed())),
            Duration::from_millis(300),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(500));
    timer.stop().unwrap();

    let times = fire_times.lock().unwrap();
    assert_eq!(times.len(), 4);
    for (name, elapsed) in times.iter() {
        if *name == "d" {
            assert!(*elapsed >= Duration::from_millis(300));
            assert!(*elapsed < Duration::from_millis(450));
        } else {
            assert!(*elapsed >= Duration::from_millis(150));
            assert!(*elapsed < Duration::from_millis(300));
        }
    }
}

#[test]
fn slow_task_blocks_the_wheel() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(20))
        .ticks_per_wheel(8)
        .build()
        .unwrap();

    let start = Instant::now();
    let d_elapsed = Arc::new(Mutex::new(None));

    timer
        .new_timeout(|_h| {}, Duration::from_millis(60))
        .unwrap();
    timer
        .new_timeout(
            |_h| std::thread::sleep(Duration::from_millis(400)),
            Duration::from_millis(60),
        )
        .unwrap();
    timer
        .new_timeout(
            |_h| std::thread::sleep(Duration::from_millis(200)),
            Duration::from_millis(60),
        )
        .unwrap();

    let d_elapsed_clone = d_elapsed.clone();
    timer
        .new_timeout(
            move |_h| *d_elapsed_clone.lock().unwrap() = Some(start.elapsed()),
            Duration::from_millis(120),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(900));
    timer.stop().unwrap();

    let observed = d_elapsed.lock().unwrap().expect("D must have fired");
    // D's nominal deadline is 120ms, but the worker is serialized behind
    // the two sleeping tasks ahead of it in the same bucket (400ms +
    // 200ms), so it cannot have fired anywhere near 120ms.
    assert!(
        observed >= Duration::from_millis(600),
        "expected D to be delayed by the slow tasks ahead of it, observed {observed:?}"
    );
}

#[test]
fn cancel_before_placement_prevents_firing() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(10))
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
            Duration::from_secs(60),
        )
        .unwrap();

    assert!(handle.cancel());
    assert!(handle.is_cancelled());

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(timer.pending_timeouts(), 0);
    assert_eq!(fired.load(Ordering::SeqCst), 0);

    timer.stop().unwrap();
}

#[test]
fn back_pressure_rejects_past_the_cap() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(10))
        .ticks_per_wheel(16)
        .max_pending_timeouts(3)
        .build()
        .unwrap();

    for _ in 0..3 {
        timer
            .new_timeout(|_h| {}, Duration::from_secs(60))
            .expect("within the cap");
    }

    let rejected = timer.new_timeout(|_h| {}, Duration::from_secs(60));
    assert!(rejected.is_err());
    assert_eq!(timer.pending_timeouts(), 3);

    timer.stop().unwrap();
}

#[test]
fn stop_from_worker_thread_is_rejected() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(10))
        .ticks_per_wheel(16)
        .build()
        .unwrap();

    let result: Arc<Mutex<Option<bool>>> = Arc::new(Mutex::new(None));
    let result_clone = result.clone();
    let timer_clone = timer.clone();
    timer
        .new_timeout(
            move |_h| {
                let outcome = timer_clone.stop();
                *result_clone.lock().unwrap() = Some(outcome.is_err());
            },
            Duration::from_millis(10),
        )
        .unwrap();

    std::thread::sleep(Duration::from_millis(200));
    assert_eq!(*result.lock().unwrap(), Some(true));

    timer.stop().unwrap();
}

#[test]
fn display_reflects_time_remaining_against_a_live_timer() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(10))
        .ticks_per_wheel(16)
        .build()
        .unwrap();

    // Long enough that the handle is still pending (not yet expired) for
    // both Display checks below.
    let handle = timer
        .new_timeout(|_h| {}, Duration::from_secs(60))
        .unwrap();

    let before = handle.to_string();
    assert!(before.ends_with("ns later)"), "expected a future deadline, got {before}");

    std::thread::sleep(Duration::from_millis(50));
    let after = handle.to_string();
    assert!(after.ends_with("ns later)"), "expected a future deadline, got {after}");

    // The gap reported must have shrunk as real time passed.
    let extract_ns = |s: &str| -> i64 {
        s.trim_start_matches("Timeout(deadline=")
            .trim_end_matches("ns later)")
            .parse()
            .unwrap()
    };
    assert!(extract_ns(&after) < extract_ns(&before));

    assert!(handle.cancel());
    assert_eq!(handle.to_string(), "Timeout(cancelled)");

    timer.stop().unwrap();
}

#[test]
fn concurrent_stop_calls_all_observe_the_same_unprocessed_set() {
    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_millis(10))
        .ticks_per_wheel(16)
        .build()
        .unwrap();

    for _ in 0..5 {
        timer.new_timeout(|_h| {}, Duration::from_secs(60)).unwrap();
    }

    let stoppers: Vec<_> = (0..4)
        .map(|_| {
            let timer = timer.clone();
            std::thread::spawn(move || timer.stop())
        })
        .collect();

    let results: Vec<_> = stoppers
        .into_iter()
        .map(|t| t.join().unwrap().unwrap())
        .collect();

    for result in &results {
        assert_eq!(result.len(), 5, "every concurrent stop() must see all 5 pending handles");
    }
}
