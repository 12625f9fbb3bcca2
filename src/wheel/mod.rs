//! The hashed wheel itself: a power-of-two-sized ring of buckets plus the
//! slab that backs every bucket's linked list.
//!
//! This is owned exclusively by the worker thread; nothing here needs to
//! be `Sync`. Cross-thread coordination lives one layer up, in the
//! `Handle`'s atomics and the timer's lock-free queues.

mod bucket;
mod entry;

use bucket::Bucket;
use entry::Entry;

use crate::handle::{Handle, NONE};
use crate::utils::slab::Slab;

/// Largest wheel allowed. `Timer::from_parts` validates `ticks_per_wheel`
/// against this same cap before construction, so a rejected configuration
/// here would indicate the two have drifted apart.
pub(crate) const MAX_WHEEL_LEN: usize = 1 << 30;

pub(crate) struct Wheel {
    buckets: Vec<Bucket>,
    slab: Slab<Entry>,
    mask: u64,
}

impl Wheel {
    /// Builds a wheel with at least `requested_len` buckets, rounded up to
    /// the next power of two (so slot lookup can use a bitmask instead of
    /// a modulo).
    pub(crate) fn new(requested_len: usize) -> Self {
        let len = requested_len.max(1).next_power_of_two().min(MAX_WHEEL_LEN);
        Wheel {
            buckets: vec![Bucket::new(); len],
            slab: Slab::new(),
            mask: (len as u64) - 1,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.buckets.len()
    }

    pub(crate) fn slot_for(&self, tick: u64) -> usize {
        (tick & self.mask) as usize
    }

    /// Links `handle` into the bucket at `slot`.
    pub(crate) fn place(&mut self, slot: usize, handle: Handle) {
        let key = self.slab.insert(Entry::new(handle.clone()));
        handle.set_location(slot, key);
        self.buckets[slot].push_back(&mut self.slab, key);
    }

    /// Unlinks `handle` from whichever bucket it currently occupies.
    /// Returns `false` if it was not linked into any bucket (either never
    /// placed yet, or already removed).
    pub(crate) fn unlink(&mut self, handle: &Handle) -> bool {
        match handle.location() {
            Some((slot, key)) => {
                self.remove_entry(slot, key);
                true
            }
            None => false,
        }
    }

    pub(crate) fn bucket_head(&self, slot: usize) -> usize {
        self.buckets[slot].head()
    }

    pub(crate) fn entry_next(&self, key: usize) -> usize {
        self.slab[key].next
    }

    pub(crate) fn entry_handle(&self, key: usize) -> &Handle {
        &self.slab[key].handle
    }

    /// Removes the entry at `key` (known to reside in bucket `slot`) from
    /// both the bucket's list and the slab, returning its handle. Used
    /// while walking a bucket during expiry, where the caller already
    /// knows the coordinates.
    pub(crate) fn remove_entry(&mut self, slot: usize, key: usize) -> Handle {
        self.buckets[slot].unlink(&mut self.slab, key);
        let entry = self.slab.remove(key);
        entry.handle.clear_location();
        entry.handle
    }

    /// Unlinks and returns every handle still linked into any bucket,
    /// emptying the wheel. Used during shutdown.
    pub(crate) fn drain_all(&mut self) -> Vec<Handle> {
        let mut drained = Vec::new();
        for slot in 0..self.buckets.len() {
            let mut key = self.buckets[slot].head();
            while key != NONE {
                let next = self.slab[key].next;
                let entry = self.slab.remove(key);
                entry.handle.clear_location();
                drained.push(entry.handle);
                key = next;
            }
            self.buckets[slot] = Bucket::new();
        }
        drained
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Weak;

    fn test_handle(deadline_nanos: i64) -> Handle {
        Handle::new(Weak::new(), std::sync::Arc::new(|_h: &Handle| {}), deadline_nanos)
    }

    #[test]
    fn rounds_length_up_to_power_of_two() {
        assert_eq!(Wheel::new(100).len(), 128);
        assert_eq!(Wheel::new(128).len(), 128);
        assert_eq!(Wheel::new(1).len(), 1);
    }

    #[test]
    fn slot_for_masks_with_wraparound() {
        let wheel = Wheel::new(8);
        assert_eq!(wheel.slot_for(0), 0);
        assert_eq!(wheel.slot_for(7), 7);
        assert_eq!(wheel.slot_for(8), 0);
        assert_eq!(wheel.slot_for(9), 1);
    }

    #[test]
    fn place_and_unlink_round_trip() {
        let mut wheel = Wheel::new(8);
        let h1 = test_handle(10);
        let h2 = test_handle(20);
        wheel.place(3, h1.clone());
        wheel.place(3, h2.clone());

        assert!(wheel.bucket_head(3) != NONE);
        assert_eq!(h1.location(), Some((3, 0)));

        assert!(wheel.unlink(&h1));
        assert_eq!(h1.location(), None);
        // h2 must still be linked and reachable from the bucket head.
        let head = wheel.bucket_head(3);
        assert_eq!(wheel.entry_handle(head), &h2);

        // Unlinking something already unlinked is a no-op, not a panic.
        assert!(!wheel.unlink(&h1));
    }

    #[test]
    fn drain_all_empties_every_bucket() {
        let mut wheel = Wheel::new(4);
        let handles: Vec<_> = (0..4).map(|i| test_handle(i as i64)).collect();
        for (slot, h) in handles.iter().enumerate() {
            wheel.place(slot, h.clone());
        }

        let drained = wheel.drain_all();
        assert_eq!(drained.len(), 4);
        for slot in 0..4 {
            assert_eq!(wheel.bucket_head(slot), NONE);
        }
    }

    #[quickcheck_macros::quickcheck]
    fn len_is_a_power_of_two_no_smaller_than_requested(requested: usize) -> quickcheck::TestResult {
        if requested == 0 || requested > (1 << 24) {
            return quickcheck::TestResult::discard();
        }
        let len = Wheel::new(requested).len();
        quickcheck::TestResult::from_bool(len.is_power_of_two() && len >= requested)
    }

    #[quickcheck_macros::quickcheck]
    fn slot_for_is_always_within_bounds(tick: u64, wheel_len_pow: u8) -> quickcheck::TestResult {
        let wheel_len_pow = wheel_len_pow % 16;
        let wheel = Wheel::new(1usize << wheel_len_pow);
        let slot = wheel.slot_for(tick);
        quickcheck::TestResult::from_bool(slot < wheel.len())
    }

    #[quickcheck_macros::quickcheck]
    fn no_handle_appears_in_two_buckets(slot_a: u8, slot_b: u8) -> quickcheck::TestResult {
        let mut wheel = Wheel::new(16);
        let slot_a = (slot_a % 16) as usize;
        let slot_b = (slot_b % 16) as usize;
        let h = test_handle(0);
        wheel.place(slot_a, h.clone());

        // Relocating to a different slot means unlinking from the first
        // before ever placing into the second -- never simultaneously
        // present in both.
        let was_linked = wheel.unlink(&h);
        wheel.place(slot_b, h.clone());

        let in_a = slot_a != slot_b && {
            let mut key = wheel.bucket_head(slot_a);
            let mut found = false;
            while key != NONE {
                if wheel.entry_handle(key) == &h {
                    found = true;
                }
                key = wheel.entry_next(key);
            }
            found
        };
        quickcheck::TestResult::from_bool(was_linked && !in_a)
    }
}
