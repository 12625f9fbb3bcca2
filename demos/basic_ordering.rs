//! Schedules four tasks at staggered delays and prints when each fires
//! relative to the timer's start, mirroring scenario 1 of the timer's
//! testable-properties catalogue.

use std::time::{Duration, Instant};

use hashed_wheel_timer::TimerBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let timer = TimerBuilder::new()
        .tick_duration(Duration::from_secs(1))
        .ticks_per_wheel(8)
        .build()
        .expect("valid configuration");

    let start = Instant::now();

    for name in ["A", "B", "C"] {
        timer
            .new_timeout(
                move |_handle| println!("{name} fired at {:?}", start.elapsed()),
                Duration::from_secs(3),
            )
            .expect("timer accepts submission");
    }

    timer
        .new_timeout(
            move |_handle| println!("D fired at {:?}", start.elapsed()),
            Duration::from_secs(6),
        )
        .expect("timer accepts submission");

    std::thread::sleep(Duration::from_secs(7));
    let unprocessed = timer.stop().expect("stop called off the worker thread");
    println!("unprocessed at shutdown: {}", unprocessed.len());
}
