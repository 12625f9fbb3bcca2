//! The worker thread: the only thread that ever touches the [`Wheel`].
//!
//! Everything it reads from or hands back to the outside world crosses
//! through `TimerCore`'s atomics and lock-free queues, so the loop below
//! never takes a lock except to sleep or to publish its start/done state.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use crate::handle::{Handle, NONE};
use crate::timer::{TimerCore, WORKER_STARTED};
use crate::wheel::Wheel;

/// Ingress items drained per tick before yielding to expiry/cancellation
/// processing, so a submission burst cannot starve the wheel indefinitely.
const INGRESS_DRAIN_CAP: usize = 100_000;

/// On platforms with coarse timer resolution, sleeps of 10ms or more are
/// rounded down to the nearest multiple of 10ms rather than requested at
/// odd millisecond counts the OS scheduler can't honor precisely anyway;
/// the loop simply wakes a little early and goes back to sleep for the
/// remainder, which is cheaper than risking an overshoot into the next
/// tick. Sleeps already under 10ms are left as requested.
const COARSE_SLEEP_FLOOR_MS: u64 = 10;

pub(crate) fn run(core: std::sync::Arc<TimerCore>) {
    let start_time = publish_start(&core);

    let mut wheel = Wheel::new(core.ticks_per_wheel);
    let mut tick: u64 = 0;

    loop {
        if core.worker_state.load(Ordering::Acquire) != WORKER_STARTED {
            break;
        }

        let now_nanos = match sleep_until_tick(&core, start_time, tick) {
            Some(now_nanos) => now_nanos,
            None => break,
        };

        drain_cancellations(&core, &mut wheel);
        drain_ingress(&core, &mut wheel, tick);
        expire_bucket(&core, &mut wheel, tick, now_nanos);

        tick = tick.wrapping_add(1);
    }

    let unprocessed = shutdown_drain(&core, &mut wheel);
    let unprocessed_count = unprocessed.len();
    *core.unprocessed.lock().unwrap() = Some(unprocessed);
    let mut done = core.done.lock().unwrap();
    *done = true;
    core.done_cv.notify_all();
    tracing::debug!(unprocessed = unprocessed_count, ticks = tick, "worker stopped");
}

fn publish_start(core: &TimerCore) -> Instant {
    let now = core.clock.now();
    {
        let mut guard = core.start.lock().unwrap();
        guard.start_time = Some(now);
        guard.worker_thread_id = Some(std::thread::current().id());
    }
    core.start_cv.notify_all();
    tracing::debug!("worker started");
    now
}

/// Sleeps until tick `tick`'s deadline elapses, returning the elapsed
/// nanoseconds since `start_time` at wakeup. Returns `None` if shutdown
/// was requested while sleeping.
fn sleep_until_tick(core: &TimerCore, start_time: Instant, tick: u64) -> Option<i64> {
    let target_nanos = core.tick_duration_nanos.saturating_mul(tick + 1);
    loop {
        if core.worker_state.load(Ordering::Acquire) != WORKER_STARTED {
            return None;
        }
        let now_nanos = start_time.elapsed().as_nanos().min(u128::from(u64::MAX)) as u64;
        if now_nanos >= target_nanos {
            return Some(now_nanos.min(i64::MAX as u64) as i64);
        }
        let remaining_nanos = target_nanos - now_nanos;
        let sleep_ms = (remaining_nanos + 999_999) / 1_000_000;
        let sleep_ms = if sleep_ms < COARSE_SLEEP_FLOOR_MS {
            sleep_ms
        } else {
            sleep_ms - (sleep_ms % COARSE_SLEEP_FLOOR_MS)
        };
        let sleep_ms = sleep_ms.max(1);

        let guard = core.sleep_lock.lock().unwrap();
        let _ = core
            .sleep_cv
            .wait_timeout(guard, Duration::from_millis(sleep_ms))
            .unwrap();
    }
}

fn drain_cancellations(core: &TimerCore, wheel: &mut Wheel) {
    let mut drained = 0u32;
    while let Some(handle) = core.cancellations.pop() {
        if wheel.unlink(&handle) {
            core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
        }
        drained += 1;
    }
    if drained > 0 {
        tracing::trace!(count = drained, "drained cancellation queue");
    }
}

fn drain_ingress(core: &TimerCore, wheel: &mut Wheel, tick: u64) {
    let tick_duration = core.tick_duration_nanos.max(1) as i64;
    let wheel_len = wheel.len() as i64;
    let mut drained = 0usize;

    while drained < INGRESS_DRAIN_CAP {
        let handle = match core.ingress.pop() {
            Some(handle) => handle,
            None => break,
        };
        drained += 1;

        if handle.is_cancelled() {
            core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
            continue;
        }

        let calculated_tick = handle.deadline_nanos() / tick_duration;
        let remaining_rounds = (calculated_tick - tick as i64) / wheel_len;
        handle.set_remaining_rounds(remaining_rounds);

        let target_tick = calculated_tick.max(tick as i64) as u64;
        let slot = wheel.slot_for(target_tick);
        wheel.place(slot, handle);
    }

    if drained == INGRESS_DRAIN_CAP {
        tracing::trace!("ingress drain cap reached this tick; remaining submissions deferred to the next tick");
    }
}

fn expire_bucket(core: &TimerCore, wheel: &mut Wheel, tick: u64, now_nanos: i64) {
    let slot = wheel.slot_for(tick);
    let mut key = wheel.bucket_head(slot);

    while key != NONE {
        let next = wheel.entry_next(key);
        let handle = wheel.entry_handle(key).clone();

        if handle.remaining_rounds() <= 0 {
            let removed = wheel.remove_entry(slot, key);
            core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
            if removed.deadline_nanos() <= now_nanos {
                if removed.try_expire() {
                    invoke(&removed);
                }
                // Lost the race to a concurrent cancel(): nothing left to do.
            } else {
                tracing::error!(
                    "timeout due in a later tick landed in the current bucket; wheel bookkeeping is inconsistent"
                );
            }
        } else if handle.is_cancelled() {
            wheel.remove_entry(slot, key);
            core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
        } else {
            handle.dec_remaining_rounds();
        }

        key = next;
    }
}

fn invoke(handle: &Handle) {
    let task = handle.task();
    let outcome = catch_unwind(AssertUnwindSafe(|| (task)(handle)));
    if outcome.is_err() {
        tracing::warn!("timer task panicked; handle reached the Expired state without completing normally");
    }
}

/// Collects everything still outstanding (linked into a bucket, or still
/// sitting in the ingress queue) into the set `Timer::stop` returns.
fn shutdown_drain(core: &TimerCore, wheel: &mut Wheel) -> rustc_hash::FxHashSet<Handle> {
    let mut unprocessed = rustc_hash::FxHashSet::default();

    // Apply any cancellations that arrived right at shutdown first, so a
    // handle the caller just cancelled isn't reported back as pending.
    while let Some(handle) = core.cancellations.pop() {
        if wheel.unlink(&handle) {
            core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
        }
    }

    for handle in wheel.drain_all() {
        core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
        unprocessed.insert(handle);
    }

    while let Some(handle) = core.ingress.pop() {
        core.pending_timeouts.fetch_sub(1, Ordering::AcqRel);
        if !handle.is_cancelled() {
            unprocessed.insert(handle);
        }
    }

    unprocessed
}
