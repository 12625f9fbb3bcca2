//! Named-setter construction of a [`Timer`].

use std::sync::Arc;
use std::time::Duration;

use crate::error::TimerError;
use crate::thread_factory::{DefaultThreadFactory, ThreadFactory};
use crate::timer::Timer;

/// Default tick resolution: 100ms, matching common hashed-wheel defaults
/// used for connection and request timeouts.
const DEFAULT_TICK_DURATION: Duration = Duration::from_millis(100);

/// Default wheel size. Rounded up to the next power of two at build time.
const DEFAULT_TICKS_PER_WHEEL: usize = 512;

/// Builds a [`Timer`] with validated construction parameters.
///
/// ```
/// use hashed_wheel_timer::TimerBuilder;
/// use std::time::Duration;
///
/// let timer = TimerBuilder::new()
///     .tick_duration(Duration::from_millis(50))
///     .ticks_per_wheel(1024)
///     .max_pending_timeouts(10_000)
///     .build()
///     .unwrap();
/// ```
pub struct TimerBuilder {
    tick_duration: Duration,
    ticks_per_wheel: usize,
    max_pending_timeouts: i64,
    leak_detection: bool,
    thread_factory: Arc<dyn ThreadFactory>,
}

impl Default for TimerBuilder {
    fn default() -> Self {
        TimerBuilder {
            tick_duration: DEFAULT_TICK_DURATION,
            ticks_per_wheel: DEFAULT_TICKS_PER_WHEEL,
            max_pending_timeouts: -1,
            leak_detection: false,
            thread_factory: Arc::new(DefaultThreadFactory),
        }
    }
}

impl TimerBuilder {
    /// Creates a builder with default settings: a 100ms tick, a 512-slot
    /// wheel, no pending-timeout cap, and a plain named thread per timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Duration of a single wheel tick. Must be greater than zero.
    pub fn tick_duration(mut self, tick_duration: Duration) -> Self {
        self.tick_duration = tick_duration;
        self
    }

    /// Number of buckets in the wheel, rounded up to the next power of
    /// two. Must be greater than zero.
    pub fn ticks_per_wheel(mut self, ticks_per_wheel: usize) -> Self {
        self.ticks_per_wheel = ticks_per_wheel;
        self
    }

    /// Maximum number of timeouts that may be pending at once. Zero or
    /// negative means unbounded (the default).
    pub fn max_pending_timeouts(mut self, max_pending_timeouts: i64) -> Self {
        self.max_pending_timeouts = max_pending_timeouts;
        self
    }

    /// Forces the leak tracker on even when the configured thread factory
    /// marks its threads as detached.
    pub fn leak_detection(mut self, leak_detection: bool) -> Self {
        self.leak_detection = leak_detection;
        self
    }

    /// Overrides how the worker thread is spawned.
    pub fn thread_factory(mut self, thread_factory: impl ThreadFactory) -> Self {
        self.thread_factory = Arc::new(thread_factory);
        self
    }

    /// Validates the configuration and constructs the [`Timer`]. The
    /// worker thread is not spawned yet; it starts lazily on the first
    /// [`Timer::new_timeout`] call.
    pub fn build(self) -> Result<Timer, TimerError> {
        Timer::from_parts(
            self.tick_duration,
            self.ticks_per_wheel,
            self.max_pending_timeouts,
            self.leak_detection,
            self.thread_factory,
        )
    }
}
