#![doc = include_str!("../README.md")]
#![warn(missing_docs, unreachable_pub)]

//! A hashed timing wheel for scheduling large numbers of short-lived
//! deferred tasks.
//!
//! A [`Timer`] owns a single dedicated worker thread that advances a
//! fixed-size ring of buckets ("the wheel") one tick at a time. Scheduling
//! a timeout places it into the bucket it will next pass through; timeouts
//! due further out than one revolution simply wait for however many extra
//! revolutions their deadline requires. This gives O(1) scheduling and
//! cancellation at the cost of timing precision bounded by the tick
//! duration, which is the right trade-off for firing thousands of
//! connection or request timeouts rather than a handful of
//! precisely-ordered ones.
//!
//! ```
//! use hashed_wheel_timer::TimerBuilder;
//! use std::time::Duration;
//!
//! let timer = TimerBuilder::new()
//!     .tick_duration(Duration::from_millis(10))
//!     .ticks_per_wheel(512)
//!     .build()
//!     .unwrap();
//!
//! timer
//!     .new_timeout(|_handle| println!("fired"), Duration::from_millis(50))
//!     .unwrap();
//! # timer.stop().unwrap();
//! ```

mod builder;
mod clock;
mod error;
mod handle;
mod instance;
mod thread_factory;
mod timer;
pub(crate) mod utils;
mod wheel;
mod worker;

pub use builder::TimerBuilder;
pub use error::TimerError;
pub use handle::{Handle, Task};
pub use thread_factory::{DefaultThreadFactory, ThreadFactory};
pub use timer::Timer;
