//! A single wheel slot: a doubly-linked list of entries, threaded through
//! the wheel's shared slab by index rather than by pointer.

use super::entry::Entry;
use crate::handle::NONE;
use crate::utils::slab::Slab;

#[derive(Debug, Clone, Copy)]
pub(crate) struct Bucket {
    head: usize,
    tail: usize,
}

impl Bucket {
    pub(crate) const fn new() -> Self {
        Bucket {
            head: NONE,
            tail: NONE,
        }
    }

    pub(crate) fn head(&self) -> usize {
        self.head
    }

    /// Appends `key`, which must already be present in `slab` with
    /// `prev == next == NONE`, to the tail of this bucket's list.
    pub(crate) fn push_back(&mut self, slab: &mut Slab<Entry>, key: usize) {
        if self.tail == NONE {
            self.head = key;
        } else {
            slab[self.tail].next = key;
            slab[key].prev = self.tail;
        }
        self.tail = key;
    }

    /// Unlinks `key` from this bucket's list. Does not touch the slab
    /// entry for `key` itself beyond clearing the `prev`/`next` fields of
    /// its former neighbors; removing `key` from the slab is the caller's
    /// responsibility.
    pub(crate) fn unlink(&mut self, slab: &mut Slab<Entry>, key: usize) {
        let (prev, next) = (slab[key].prev, slab[key].next);
        if prev == NONE {
            self.head = next;
        } else {
            slab[prev].next = next;
        }
        if next == NONE {
            self.tail = prev;
        } else {
            slab[next].prev = prev;
        }
    }
}
