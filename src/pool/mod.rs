//! C3/C4 - the size-keyed free-list pool shared by every attached process.
//! One `Pool` instance backs each of the three named objects
//! (`"MemoryPool"`, `"MemoryPoolGPU"`, `"MemoryPoolGPUDeviceLocal"`); the CPU
//! pool stores plain byte-size records, the two GPU pools store
//! [`GpuBufferDataWithPID`] records.

pub mod cpu;
pub mod gpu;

use std::cell::UnsafeCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, Weak};

use crate::gpu::GpuBufferDataWithPID;
use crate::reclaim::{ReclaimRecord, SharedWrapper};
use crate::segment::{Offset, Segment};
use crate::sync::robust::CrossProcessMutex;

/// The payload stored in `sizes` for one allocated-from-segment record.
#[derive(Debug, Clone, Copy)]
pub enum PoolRecord {
    /// CPU pool record: just the byte size.
    Cpu { size: u64 },
    /// GPU pool record: the full shared descriptor.
    Gpu { data: GpuBufferDataWithPID },
}

impl PoolRecord {
    /// The logical byte size charged against the pool's budget - the
    /// free-list key.
    pub fn size(&self) -> u64 {
        match self {
            PoolRecord::Cpu { size } => *size,
            PoolRecord::Gpu { data } => data.data.size,
        }
    }
}

/// One pool instance: free-lists keyed by byte size, an allocation
/// registry, and a running total charged against the segment.
pub struct Pool {
    buffers_mutex: Box<dyn CrossProcessMutex>,
    sizes_mutex: Box<dyn CrossProcessMutex>,
    buffers: UnsafeCell<HashMap<u64, Vec<Offset>>>,
    sizes: UnsafeCell<HashMap<Offset, PoolRecord>>,
    allocated: UnsafeCell<u64>,
    // Process-local: which offsets this process currently has a live
    // SharedWrapper for, so two local handles referencing the same shared
    // allocation (the GPU cross-process handoff path, `§4.6`) share one
    // refcount rather than each minting an independent one that would
    // reclaim the offset on its own, unrelated drop.
    wrapper_registry: StdMutex<HashMap<Offset, Weak<ReclaimRecord>>>,
}

// All three `UnsafeCell` fields are only ever touched with the matching
// mutex held.
unsafe impl Send for Pool {}
unsafe impl Sync for Pool {}

impl Pool {
    /// Construct an empty pool using mutexes minted by `segment`.
    pub fn new(segment: &dyn crate::segment::Segment) -> Self {
        Self {
            buffers_mutex: segment.new_mutex(),
            sizes_mutex: segment.new_mutex(),
            buffers: UnsafeCell::new(HashMap::new()),
            sizes: UnsafeCell::new(HashMap::new()),
            allocated: UnsafeCell::new(0),
            wrapper_registry: StdMutex::new(HashMap::new()),
        }
    }

    /// The [`SharedWrapper`] for `offset` in this process: an existing one
    /// if some other local handle already references it, else a freshly
    /// minted one. `pool_arc` must be the same `Arc` this `Pool` is reached
    /// through (callers already hold it; passed explicitly since `Pool`
    /// can't safely reconstruct an `Arc` to itself).
    pub fn wrapper_for(&self, pool_arc: Arc<Pool>, size_key: u64, offset: Offset) -> SharedWrapper {
        let mut registry = self.wrapper_registry.lock().unwrap();
        if let Some(existing) = registry.get(&offset).and_then(Weak::upgrade) {
            return existing;
        }
        let wrapper = crate::reclaim::new_wrapper(pool_arc, size_key, offset);
        registry.insert(offset, Arc::downgrade(&wrapper));
        wrapper
    }

    /// Run `f` with `buffers_mutex` held.
    pub fn with_buffers<R>(&self, f: impl FnOnce(&mut HashMap<u64, Vec<Offset>>) -> R) -> R {
        self.buffers_mutex
            .with_lock(|| f(unsafe { &mut *self.buffers.get() }))
    }

    /// Run `f` with `sizes_mutex` held, giving access to both `sizes` and
    /// `allocated` (they share one mutex per `§5`).
    pub fn with_sizes<R>(
        &self,
        f: impl FnOnce(&mut HashMap<Offset, PoolRecord>, &mut u64) -> R,
    ) -> R {
        self.sizes_mutex.with_lock(|| {
            let sizes = unsafe { &mut *self.sizes.get() };
            let allocated = unsafe { &mut *self.allocated.get() };
            f(sizes, allocated)
        })
    }

    /// Snapshot of bytes currently charged against this pool.
    pub fn allocated(&self) -> u64 {
        self.with_sizes(|_, allocated| *allocated)
    }

    /// Snapshot of the number of entries in the allocation registry.
    pub fn entry_count(&self) -> usize {
        self.with_sizes(|sizes, _| sizes.len())
    }

    /// Pop the tail (LIFO) offset from `buffers[size]`, if any.
    pub fn pop_free(&self, size: u64) -> Option<Offset> {
        self.with_buffers(|buffers| buffers.get_mut(&size).and_then(Vec::pop))
    }

    /// Linear-scan `buffers[size]` for the first entry matching `pred`,
    /// removing and returning it. Used by the GPU fast path (`§4.5`) to find
    /// an entry whose `originPid` matches the local process - unlike the CPU
    /// path this isn't a tail pop, since the matching entry may not be last.
    pub fn pop_free_where(&self, size: u64, pred: impl Fn(Offset) -> bool) -> Option<Offset> {
        self.with_buffers(|buffers| {
            let list = buffers.get_mut(&size)?;
            let idx = list.iter().position(|&o| pred(o))?;
            Some(list.remove(idx))
        })
    }

    /// Push `offset` onto the tail of `buffers[size]` - the reclaimer path,
    /// invoked when a shared wrapper's refcount drops to zero. Never
    /// touches `allocated` (invariant: segment memory is freed only at
    /// nuke, or, for GPU, at origin-process exit).
    pub fn push_free(&self, size: u64, offset: Offset) {
        self.with_buffers(|buffers| buffers.entry(size).or_default().push(offset));
    }

    /// Step 4 of detach (`§4.9`), valid only when this was the last attached
    /// process: under both mutexes, return every shared byte block to
    /// `segment`, zero `allocated`, and empty both maps.
    pub fn drain_and_dealloc(&self, segment: &dyn Segment) {
        self.with_buffers(|buffers| {
            self.with_sizes(|sizes, allocated| {
                for offset in sizes.keys().copied().collect::<Vec<_>>() {
                    segment.dealloc_bytes(offset);
                }
                sizes.clear();
                *allocated = 0;
            });
            buffers.clear();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::dummy::DummySegment;

    #[test]
    fn push_then_pop_is_lifo() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        pool.push_free(4096, Offset(1));
        pool.push_free(4096, Offset(2));
        assert_eq!(pool.pop_free(4096), Some(Offset(2)));
        assert_eq!(pool.pop_free(4096), Some(Offset(1)));
        assert_eq!(pool.pop_free(4096), None);
    }

    #[test]
    fn allocated_starts_at_zero() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        assert_eq!(pool.allocated(), 0);
    }

    #[test]
    fn wrapper_for_same_offset_shares_one_refcount() {
        let seg = DummySegment::new();
        let pool = Arc::new(Pool::new(&seg));

        let a = pool.wrapper_for(Arc::clone(&pool), 4096, Offset(5));
        let b = pool.wrapper_for(Arc::clone(&pool), 4096, Offset(5));
        assert!(Arc::ptr_eq(&a, &b));

        drop(a);
        assert_eq!(pool.pop_free(4096), None, "one strong ref remains");
        drop(b);
        assert_eq!(pool.pop_free(4096), Some(Offset(5)));
    }

    #[test]
    fn drain_and_dealloc_zeroes_allocated_and_empties_both_maps() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let a = seg.alloc_bytes(64);
        let b = seg.alloc_bytes(128);
        pool.with_sizes(|sizes, allocated| {
            sizes.insert(a, PoolRecord::Cpu { size: 64 });
            sizes.insert(b, PoolRecord::Cpu { size: 128 });
            *allocated = 192;
        });
        pool.push_free(64, a);

        pool.drain_and_dealloc(&seg);

        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.entry_count(), 0);
        assert_eq!(pool.pop_free(64), None);
        assert!(seg.address_of(a).is_null());
        assert!(seg.address_of(b).is_null());
    }
}
