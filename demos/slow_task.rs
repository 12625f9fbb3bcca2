//! Demonstrates that tasks run serially on the single worker thread: a
//! slow callback visibly delays a later-deadline task behind it, since
//! there is only one thread driving the wheel (scenario 2 of the
//! testable-properties catalogue).

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

    timer
        .new_timeout(
            move |_handle| println!("A fired instantly at {:?}", start.elapsed()),
            Duration::from_secs(3),
        )
        .expect("timer accepts submission");

    timer
        .new_timeout(
            move |_handle| {
                println!("B started a 10s sleep at {:?}", start.elapsed());
                std::thread::sleep(Duration::from_secs(10));
                println!("B finished at {:?}", start.elapsed());
            },
            Duration::from_secs(3),
        )
        .expect("timer accepts submission");

    timer
        .new_timeout(
            move |_handle| {
                println!("C started a 5s sleep at {:?}", start.elapsed());
                std::thread::sleep(Duration::from_secs(5));
                println!("C finished at {:?}", start.elapsed());
            },
            Duration::from_secs(3),
        )
        .expect("timer accepts submission");

    // D's deadline is 6s, but the worker thread is busy running B and C's
    // sleeps serially after it reaches 3s, so D cannot actually fire until
    // that backlog drains -- well past 6s.
    timer
        .new_timeout(
            move |_handle| println!("D fired (late!) at {:?}", start.elapsed()),
            Duration::from_secs(6),
        )
        .expect("timer accepts submission");

    std::thread::sleep(Duration::from_secs(20));
    let unprocessed = timer.stop().expect("stop called off the worker thread");
    println!("unprocessed at shutdown: {}", unprocessed.len());
}
