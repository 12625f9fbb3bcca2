//! Error types returned by the timer's public API.

use thiserror::Error;

/// Errors surfaced synchronously to callers of [`crate::Timer`] and
/// [`crate::TimerBuilder`].
///
/// Errors that occur while a user task runs (panics) are not represented
/// here: they are caught on the worker thread, logged, and leave the
/// offending handle in the `Expired` state. See the crate-level docs for
/// the full propagation policy.
#[derive(Debug, Error)]
pub enum TimerError {
    /// A constructor or builder argument was out of range.
    #[error("invalid argument: {reason}")]
    InvalidArgument {
        /// Human-readable explanation of which argument failed validation.
        reason: String,
    },

    /// The timer was asked to do something its lifecycle state forbids,
    /// e.g. starting after shutdown or calling `stop` from the worker
    /// thread itself.
    #[error("illegal state: {reason}")]
    IllegalState {
        /// Human-readable explanation of the violated state transition.
        reason: String,
    },

    /// `new_timeout` was rejected because `max_pending_timeouts` was
    /// exceeded.
    #[error("rejected: {pending} pending timeouts exceeds max of {max}")]
    Rejected {
        /// The pending-timeout count observed at rejection time.
        pending: u64,
        /// The configured ceiling that was exceeded.
        max: u64,
    },
}

impl TimerError {
    pub(crate) fn invalid(reason: impl Into<String>) -> Self {
        TimerError::InvalidArgument {
            reason: reason.into(),
        }
    }

    pub(crate) fn illegal_state(reason: impl Into<String>) -> Self {
        TimerError::IllegalState {
            reason: reason.into(),
        }
    }
}
