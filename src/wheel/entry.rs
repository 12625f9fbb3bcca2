//! The slab-stored node backing a bucket's intrusive linked list.

use crate::handle::{Handle, NONE};

pub(crate) struct Entry {
    pub(crate) handle: Handle,
    pub(crate) prev: usize,
    pub(crate) next: usize,
}

impl Entry {
    pub(crate) fn new(handle: Handle) -> Self {
        Entry {
            handle,
            prev: NONE,
            next: NONE,
        }
    }
}
