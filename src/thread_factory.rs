//! Pluggable construction of the worker thread.

use std::io;
use std::thread::JoinHandle;

/// Produces the dedicated worker thread a [`crate::Timer`] drives its wheel
/// from.
///
/// The default factory spawns a named, non-daemon `std::thread`. Rust has
/// no daemon-thread concept, so a custom factory is the knob leak-detection
/// inspects instead (see [`crate::TimerBuilder::leak_detection`]): a
/// factory that marks itself as producing a "detached" thread causes the
/// leak tracker to be skipped, mirroring the daemon-thread carve-out in
/// the construction contract.
pub trait ThreadFactory: Send + Sync + 'static {
    /// Spawn `f` on a new thread and return its join handle.
    fn spawn(&self, name: String, f: Box<dyn FnOnce() + Send + 'static>)
        -> io::Result<JoinHandle<()>>;

    /// Whether threads produced by this factory should be exempt from the
    /// leak tracker (the Rust analogue of a daemon thread).
    fn is_detached(&self) -> bool {
        false
    }
}

/// Spawns a plain, named `std::thread` for the worker.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultThreadFactory;

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(
        &self,
        name: String,
        f: Box<dyn FnOnce() + Send + 'static>,
    ) -> io::Result<JoinHandle<()>> {
        std::thread::Builder::new().name(name).spawn(f)
    }
}
