//! The timer facade: construction, submission, and orderly shutdown.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crossbeam_queue::SegQueue;
use rustc_hash::FxHashSet;

use crate::clock::Clock;
use crate::error::TimerError;
use crate::handle::{Handle, Task};
use crate::instance;
use crate::thread_factory::ThreadFactory;
use crate::worker;

pub(crate) const WORKER_INIT: u8 = 0;
pub(crate) const WORKER_STARTED: u8 = 1;
pub(crate) const WORKER_SHUTDOWN: u8 = 2;

pub(crate) struct StartState {
    pub(crate) start_time: Option<Instant>,
    pub(crate) worker_thread_id: Option<ThreadId>,
}

/// Everything about a timer that must outlive any single `Timer` handle:
/// shared with the worker thread via `Arc`, and weakly referenced by every
/// `Handle` so a `Handle` can look its owning timer back up without
/// keeping it alive.
pub(crate) struct TimerCore {
    pub(crate) clock: Clock,
    pub(crate) tick_duration_nanos: u64,
    pub(crate) ticks_per_wheel: usize,
    pub(crate) max_pending_timeouts: i64,
    pub(crate) leak_detection: bool,
    pub(crate) thread_factory: Arc<dyn ThreadFactory>,

    pub(crate) worker_state: AtomicU8,
    pub(crate) pending_timeouts: AtomicU64,
    pub(crate) ingress: SegQueue<Handle>,
    pub(crate) cancellations: SegQueue<Handle>,

    pub(crate) start: Mutex<StartState>,
    pub(crate) start_cv: Condvar,

    /// Used purely to wake a sleeping worker early (on `stop()`); carries
    /// no state of its own.
    pub(crate) sleep_lock: Mutex<()>,
    pub(crate) sleep_cv: Condvar,

    pub(crate) done: Mutex<bool>,
    pub(crate) done_cv: Condvar,
    pub(crate) unprocessed: Mutex<Option<FxHashSet<Handle>>>,
    pub(crate) worker_join: Mutex<Option<JoinHandle<()>>>,

    deregistered: AtomicBool,
}

impl TimerCore {
    fn deregister_once(&self) {
        if self
            .deregistered
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            instance::deregister();
        }
    }
}

impl Drop for TimerCore {
    fn drop(&mut self) {
        let state = self.worker_state.load(Ordering::Acquire);
        if state == WORKER_STARTED && (self.leak_detection || !self.thread_factory.is_detached()) {
            tracing::error!(
                "Timer garbage-collected without calling stop(); its worker thread (and any \
                 pending timeouts) will leak for the lifetime of the process"
            );
        }
        self.deregister_once();
    }
}

/// A hashed wheel timer.
///
/// Cloning a `Timer` is cheap and shares the same underlying worker thread
/// and wheel; the worker starts lazily on the first [`Timer::new_timeout`]
/// call and runs until [`Timer::stop`] is called (or every clone is
/// dropped, which logs rather than blocks — see the type-level docs).
#[derive(Clone)]
pub struct Timer {
    inner: Arc<TimerCore>,
}

impl Timer {
    pub(crate) fn from_parts(
        tick_duration: Duration,
        ticks_per_wheel: usize,
        max_pending_timeouts: i64,
        leak_detection: bool,
        thread_factory: Arc<dyn ThreadFactory>,
    ) -> Result<Self, TimerError> {
        const MIN_TICK_DURATION: Duration = Duration::from_millis(1);

        if tick_duration.is_zero() {
            return Err(TimerError::invalid("tick_duration must be greater than zero"));
        }
        if ticks_per_wheel == 0 {
            return Err(TimerError::invalid("ticks_per_wheel must be greater than zero"));
        }
        if ticks_per_wheel > crate::wheel::MAX_WHEEL_LEN {
            return Err(TimerError::invalid(format!(
                "ticks_per_wheel ({ticks_per_wheel}) must not exceed 2^30"
            )));
        }

        let tick_duration = if tick_duration < MIN_TICK_DURATION {
            tracing::warn!(
                requested_ns = tick_duration.as_nanos() as u64,
                "tick_duration below 1ms clamped up to 1ms"
            );
            MIN_TICK_DURATION
        } else {
            tick_duration
        };
        let tick_duration_nanos: u64 = tick_duration
            .as_nanos()
            .try_into()
            .map_err(|_| TimerError::invalid("tick_duration is too large"))?;
        let wheel_len = ticks_per_wheel.next_power_of_two();
        tick_duration_nanos
            .checked_mul(wheel_len as u64)
            .filter(|total| *total < i64::MAX as u64)
            .ok_or_else(|| {
                TimerError::invalid("tick_duration * ticks_per_wheel overflows a full wheel revolution")
            })?;

        instance::register();

        let inner = Arc::new(TimerCore {
            clock: Clock,
            tick_duration_nanos,
            ticks_per_wheel,
            max_pending_timeouts,
            leak_detection,
            thread_factory,
            worker_state: AtomicU8::new(WORKER_INIT),
            pending_timeouts: AtomicU64::new(0),
            ingress: SegQueue::new(),
            cancellations: SegQueue::new(),
            start: Mutex::new(StartState {
                start_time: None,
                worker_thread_id: None,
            }),
            start_cv: Condvar::new(),
            sleep_lock: Mutex::new(()),
            sleep_cv: Condvar::new(),
            done: Mutex::new(false),
            done_cv: Condvar::new(),
            unprocessed: Mutex::new(None),
            worker_join: Mutex::new(None),
            deregistered: AtomicBool::new(false),
        });
        Ok(Timer { inner })
    }

    pub(crate) fn from_core(inner: Arc<TimerCore>) -> Self {
        Timer { inner }
    }

    /// Starts building a [`Timer`] with a named-setter [`crate::TimerBuilder`],
    /// equivalent to `TimerBuilder::new()`.
    pub fn builder() -> crate::TimerBuilder {
        crate::TimerBuilder::new()
    }

    /// Schedules `task` to run after `delay`, starting the worker thread
    /// on first use.
    ///
    /// Returns a [`Handle`] that can be used to cancel the timeout before
    /// it fires. Returns [`TimerError::Rejected`] if `max_pending_timeouts`
    /// is set and would be exceeded, or [`TimerError::IllegalState`] if the
    /// timer has already been stopped.
    pub fn new_timeout(
        &self,
        task: impl Fn(&Handle) + Send + Sync + 'static,
        delay: Duration,
    ) -> Result<Handle, TimerError> {
        self.new_timeout_arc(Arc::new(task), delay)
    }

    fn new_timeout_arc(&self, task: Task, delay: Duration) -> Result<Handle, TimerError> {
        let max = self.inner.max_pending_timeouts;
        let pending = self.inner.pending_timeouts.fetch_add(1, Ordering::AcqRel) + 1;
        if max > 0 && pending as i64 > max {
            self.inner.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
            return Err(TimerError::Rejected {
                pending: pending - 1,
                max: max as u64,
            });
        }

        if let Err(e) = self.start() {
            self.inner.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
            return Err(e);
        }

        let start_time = self
            .inner
            .start
            .lock()
            .unwrap()
            .start_time
            .expect("start() guarantees start_time is published");
        let elapsed_now: i64 = start_time
            .elapsed()
            .as_nanos()
            .min(i64::MAX as u128) as i64;
        let delay_nanos: i64 = delay.as_nanos().min(i64::MAX as u128) as i64;
        let deadline_nanos = elapsed_now.saturating_add(delay_nanos);

        let handle = Handle::new(Arc::downgrade(&self.inner), task, deadline_nanos);
        self.inner.ingress.push(handle.clone());
        Ok(handle)
    }

    /// The number of timeouts submitted but not yet expired or cancelled.
    pub fn pending_timeouts(&self) -> u64 {
        self.inner.pending_timeouts.load(Ordering::Acquire)
    }

    /// Lazily starts the worker thread if it has not already started.
    /// Blocks until the worker has published its `start_time`, so that
    /// callers can immediately compute deadlines relative to it.
    fn start(&self) -> Result<(), TimerError> {
        match self.inner.worker_state.compare_exchange(
            WORKER_INIT,
            WORKER_STARTED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                tracing::debug!("lazily starting worker thread");
                let core = self.inner.clone();
                let spawned = self.inner.thread_factory.spawn(
                    "hashed-wheel-timer".to_owned(),
                    Box::new(move || worker::run(core)),
                );
                match spawned {
                    Ok(join_handle) => {
                        *self.inner.worker_join.lock().unwrap() = Some(join_handle);
                    }
                    Err(e) => {
                        self.inner.worker_state.store(WORKER_SHUTDOWN, Ordering::Release);
                        self.inner.start_cv.notify_all();
                        return Err(TimerError::illegal_state(format!(
                            "failed to spawn worker thread: {e}"
                        )));
                    }
                }
            }
            Err(WORKER_SHUTDOWN) => {
                return Err(TimerError::illegal_state(
                    "timer has already been stopped",
                ));
            }
            Err(_) => {
                // Another caller already won the race and is starting (or
                // has started) the worker; fall through and wait with them.
            }
        }

        let mut guard = self.inner.start.lock().unwrap();
        while guard.start_time.is_none() {
            if self.inner.worker_state.load(Ordering::Acquire) == WORKER_SHUTDOWN {
                return Err(TimerError::illegal_state(
                    "worker thread failed to start",
                ));
            }
            guard = self.inner.start_cv.wait(guard).unwrap();
        }
        Ok(())
    }

    /// Stops the worker thread and returns every handle that was still
    /// pending (neither expired nor cancelled) at the moment of shutdown.
    ///
    /// Idempotent: calling `stop()` on an already-stopped (or
    /// never-started) timer just returns an empty set. Must not be called
    /// from the timer's own worker thread (i.e. from within a task
    /// callback) — that deadlocks a real join, so it is rejected instead.
    pub fn stop(&self) -> Result<FxHashSet<Handle>, TimerError> {
        {
            let guard = self.inner.start.lock().unwrap();
            if guard.worker_thread_id == Some(std::thread::current().id()) {
                return Err(TimerError::illegal_state(
                    "stop() must not be called from the timer's own worker thread",
                ));
            }
        }

        match self.inner.worker_state.compare_exchange(
            WORKER_STARTED,
            WORKER_SHUTDOWN,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => {
                self.inner.sleep_cv.notify_all();
            }
            Err(WORKER_INIT) => {
                // Never started: no worker thread exists to wait on or join.
                self.inner.worker_state.store(WORKER_SHUTDOWN, Ordering::Release);
                self.inner.deregister_once();
                return Ok(FxHashSet::default());
            }
            Err(_) => {
                // Already SHUTDOWN: either a prior stop() already finished,
                // or a concurrent stop() is mid-flight. Either way the
                // worker thread exists (or existed) and will publish `done`
                // exactly once; fall through and wait for it like any other
                // caller rather than returning early with a stale result.
            }
        }

        let mut done = self.inner.done.lock().unwrap();
        let mut waited = Duration::ZERO;
        while !*done {
            let (guard, result) = self
                .inner
                .done_cv
                .wait_timeout(done, Duration::from_millis(100))
                .unwrap();
            done = guard;
            if result.timed_out() && !*done {
                waited += Duration::from_millis(100);
                tracing::warn!(
                    waited_ms = waited.as_millis() as u64,
                    "stop() still waiting on the worker thread; a task callback may be stuck"
                );
                self.inner.sleep_cv.notify_all();
            }
        }
        drop(done);

        if let Some(join_handle) = self.inner.worker_join.lock().unwrap().take() {
            if join_handle.join().is_err() {
                tracing::warn!("worker thread panicked during shutdown");
            }
        }

        self.inner.deregister_once();
        // Cloned, not taken: a second concurrent `stop()` call reaches this
        // same point and must observe the same unprocessed set, not an
        // empty one left behind by whichever caller got here first.
        Ok(self.inner.unprocessed.lock().unwrap().clone().unwrap_or_default())
    }
}
