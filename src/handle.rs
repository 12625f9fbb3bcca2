//! The per-task timeout handle.
//!
//! A [`Handle`] is a cheaply-clonable reference to a scheduled task. It is
//! also, from the worker's point of view, the node of an intrusive
//! doubly-linked list: rather than chase raw `prev`/`next` pointers (as the
//! original Varghese–Lauck construction does), the worker addresses list
//! neighbors by index into a worker-owned [`crate::utils::slab::Slab`].
//! The handle only needs to remember *which* slab slot it currently
//! occupies, which is what `slot`/`slab_key` track below. Everything that
//! is genuinely shared across threads (`state`, `pending`-affecting
//! transitions) is a plain atomic; everything that is worker-only
//! (`remaining_rounds`, the slab coordinates) is also stored as an atomic
//! purely so `Handle` can be `Sync` for cross-thread `Arc` sharing, even
//! though only the worker thread ever writes to those fields.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicI64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use crate::timer::{Timer, TimerCore};

/// Sentinel meaning "not currently linked into any bucket".
pub(crate) const NONE: usize = usize::MAX;

const INIT: u8 = 0;
const CANCELLED: u8 = 1;
const EXPIRED: u8 = 2;

/// A user-supplied callback, invoked with its own handle on the worker
/// thread when its deadline is reached.
pub type Task = Arc<dyn Fn(&Handle) + Send + Sync + 'static>;

struct Shared {
    timer: Weak<TimerCore>,
    task: Task,
    /// Nanoseconds relative to the timer's `start_time`. Immutable after
    /// construction, so no atomic needed.
    deadline_nanos: i64,
    state: AtomicU8,
    /// Worker-only. Set when the entry is placed into a bucket.
    remaining_rounds: AtomicI64,
    /// Worker-only back-pointer: which wheel slot this handle is linked
    /// into. Meaningless while `slab_key == NONE`.
    slot: AtomicUsize,
    /// Worker-only back-pointer: this handle's key in the wheel's slab.
    /// `NONE` iff the handle is not linked into any bucket.
    slab_key: AtomicUsize,
}

/// A submitter's reference to a scheduled (or already fired/cancelled)
/// task.
///
/// Cloning a `Handle` is cheap (an `Arc` clone); every clone refers to the
/// same underlying timeout.
#[derive(Clone)]
pub struct Handle(Arc<Shared>);

impl Handle {
    pub(crate) fn new(timer: Weak<TimerCore>, task: Task, deadline_nanos: i64) -> Self {
        Handle(Arc::new(Shared {
            timer,
            task,
            deadline_nanos,
            state: AtomicU8::new(INIT),
            remaining_rounds: AtomicI64::new(0),
            slot: AtomicUsize::new(NONE),
            slab_key: AtomicUsize::new(NONE),
        }))
    }

    /// Attempts to cancel this timeout.
    ///
    /// Returns `true` if this call won the race to cancel it (it was still
    /// `Init`); returns `false` if it had already expired or had already
    /// been cancelled. On success the handle is queued for the worker to
    /// unlink from its bucket, if it has been placed into one; that unlink
    /// happens within one tick, not synchronously.
    pub fn cancel(&self) -> bool {
        let won = self
            .0
            .state
            .compare_exchange(INIT, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            if let Some(timer) = self.0.timer.upgrade() {
                timer.cancellations.push(self.clone());
            }
        }
        won
    }

    /// Whether this timeout has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.0.state.load(Ordering::Acquire) == CANCELLED
    }

    /// Whether this timeout's task has run (or panicked) to completion.
    pub fn is_expired(&self) -> bool {
        self.0.state.load(Ordering::Acquire) == EXPIRED
    }

    /// Returns a clone of the task callback.
    pub fn task(&self) -> Task {
        self.0.task.clone()
    }

    /// Returns the timer this handle was scheduled on, if it still exists.
    pub fn timer(&self) -> Option<Timer> {
        self.0.timer.upgrade().map(Timer::from_core)
    }

    pub(crate) fn deadline_nanos(&self) -> i64 {
        self.0.deadline_nanos
    }

    /// Compare-and-set from `Init` to `Expired`. Returns `true` if this call
    /// won the race (i.e. the task should run).
    pub(crate) fn try_expire(&self) -> bool {
        self.0
            .state
            .compare_exchange(INIT, EXPIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn remaining_rounds(&self) -> i64 {
        self.0.remaining_rounds.load(Ordering::Relaxed)
    }

    pub(crate) fn set_remaining_rounds(&self, rounds: i64) {
        self.0.remaining_rounds.store(rounds, Ordering::Relaxed);
    }

    pub(crate) fn dec_remaining_rounds(&self) {
        self.0.remaining_rounds.fetch_sub(1, Ordering::Relaxed);
    }

    /// Current (slot, slab key) if linked into a bucket.
    pub(crate) fn location(&self) -> Option<(usize, usize)> {
        let key = self.0.slab_key.load(Ordering::Relaxed);
        if key == NONE {
            return None;
        }
        Some((self.0.slot.load(Ordering::Relaxed), key))
    }

    pub(crate) fn set_location(&self, slot: usize, key: usize) {
        self.0.slot.store(slot, Ordering::Relaxed);
        self.0.slab_key.store(key, Ordering::Relaxed);
    }

    pub(crate) fn clear_location(&self) {
        self.0.slab_key.store(NONE, Ordering::Relaxed);
        self.0.slot.store(NONE, Ordering::Relaxed);
    }
}

impl PartialEq for Handle {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Eq for Handle {}

impl Hash for Handle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        (Arc::as_ptr(&self.0) as usize).hash(state);
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Handle")
            .field("deadline_nanos", &self.0.deadline_nanos)
            .field("cancelled", &self.is_cancelled())
            .field("expired", &self.is_expired())
            .finish()
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_cancelled() {
            return write!(f, "Timeout(cancelled)");
        }
        if self.is_expired() {
            return write!(f, "Timeout(expired)");
        }

        let start_time = self
            .0
            .timer
            .upgrade()
            .and_then(|timer| timer.start.lock().unwrap().start_time);
        match start_time {
            Some(start_time) => {
                let now_nanos = start_time.elapsed().as_nanos().min(i64::MAX as u128) as i64;
                let remaining = self.0.deadline_nanos - now_nanos;
                if remaining >= 0 {
                    write!(f, "Timeout(deadline={remaining}ns later)")
                } else {
                    write!(f, "Timeout(deadline={}ns ago)", -remaining)
                }
            }
            // The worker hasn't published start_time yet (or the timer is
            // already gone), so there's no "now" to compare against.
            None => write!(f, "Timeout(deadline={}ns from timer start)", self.0.deadline_nanos),
        }
    }
}
