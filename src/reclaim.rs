//! C6 - the cross-process reference count attached to every shared
//! allocation (`SharedPtrIPC` in the design notes).
//!
//! Rust's own `Arc` already is an arena-allocated (well, heap-allocated)
//! refcounted record whose last drop runs a destructor - exactly the shape
//! the design notes describe. `SharedWrapper` is an `Arc<ReclaimRecord>`;
//! cloning it for a local handle cache is the "record locally, holding a
//! strong reference" step, and dropping the last clone triggers
//! `ReclaimRecord::drop`, which pushes the offset back onto the free-list
//! and never touches `allocated` or frees segment memory (per invariant:
//! that only happens at segment-nuke, or, for GPU, origin-process exit).

use std::sync::Arc;

use crate::pool::Pool;
use crate::segment::Offset;

/// The record a [`SharedWrapper`] wraps: enough to push its offset back
/// onto the right free-list on last drop.
pub struct ReclaimRecord {
    pool: Arc<Pool>,
    size_key: u64,
    offset: Offset,
}

impl ReclaimRecord {
    /// The offset this record reclaims on drop.
    pub fn offset(&self) -> Offset {
        self.offset
    }
}

impl Drop for ReclaimRecord {
    fn drop(&mut self) {
        self.pool.push_free(self.size_key, self.offset);
    }
}

/// A cross-process reference-counted handle to a shared allocation.
pub type SharedWrapper = Arc<ReclaimRecord>;

/// Construct a fresh wrapper around `offset` in `pool`, keyed by
/// `size_key` for the free-list it returns to.
pub fn new_wrapper(pool: Arc<Pool>, size_key: u64, offset: Offset) -> SharedWrapper {
    Arc::new(ReclaimRecord {
        pool,
        size_key,
        offset,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::dummy::DummySegment;

    #[test]
    fn last_drop_returns_offset_to_free_list() {
        let seg = DummySegment::new();
        let pool = Arc::new(Pool::new(&seg));
        let wrapper = new_wrapper(Arc::clone(&pool), 1024, Offset(7));
        let cloned = Arc::clone(&wrapper);

        drop(wrapper);
        assert_eq!(pool.pop_free(1024), None, "one strong ref remains");

        drop(cloned);
        assert_eq!(pool.pop_free(1024), Some(Offset(7)));
    }
}
