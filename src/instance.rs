//! Process-wide accounting of live `Timer` instances.
//!
//! Each hashed wheel timer owns a dedicated OS thread. Creating dozens of
//! them in one process is almost always a mistake (a single timer can
//! carry hundreds of thousands of pending timeouts), so we warn once the
//! count crosses a threshold.

use std::sync::atomic::{AtomicUsize, Ordering};

use once_cell::sync::Lazy;

const INSTANCE_WARN_THRESHOLD: usize = 64;

static LIVE_INSTANCES: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));
static WARNED: Lazy<AtomicUsize> = Lazy::new(|| AtomicUsize::new(0));

/// Registers a new timer instance, warning once the process-wide count
/// first exceeds [`INSTANCE_WARN_THRESHOLD`].
pub(crate) fn register() {
    let count = LIVE_INSTANCES.fetch_add(1, Ordering::AcqRel) + 1;
    if count > INSTANCE_WARN_THRESHOLD && WARNED.swap(1, Ordering::AcqRel) == 0 {
        tracing::error!(
            count,
            threshold = INSTANCE_WARN_THRESHOLD,
            "too many Timer instances created; reuse a single Timer instead of creating one per connection/request"
        );
    }
}

/// Deregisters a timer instance, either because it shut down or because
/// it was dropped having never started its worker.
pub(crate) fn deregister() {
    LIVE_INSTANCES.fetch_sub(1, Ordering::AcqRel);
}

#[cfg(test)]
pub(crate) fn live_count() -> usize {
    LIVE_INSTANCES.load(Ordering::Acquire)
}
