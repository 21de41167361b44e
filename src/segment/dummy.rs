//! An in-process fake [`Segment`], backed by `HashMap`s instead of real
//! shared memory. Multiple [`crate::PoolHandle`]s can share one
//! `DummySegment` instance (wrap it in an `Arc` and clone) to simulate
//! several attached processes deterministically inside one test binary -
//! exactly how S4 (two-process GPU share) and S5 (peer crash) are exercised
//! in this crate's test suite.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::traits::{Offset, Segment};
use crate::auditor::Auditor;
use crate::pool::Pool;
use crate::sync::robust::{CrossProcessMutex, OwnerPidGuard};

pub struct DummySegment {
    pools: Mutex<HashMap<&'static str, Arc<Pool>>>,
    auditors: Mutex<HashMap<&'static str, Arc<Auditor>>>,
    arena: Mutex<HashMap<u64, Box<[u8]>>>,
    ptr_index: Mutex<HashMap<usize, u64>>,
    next_offset: AtomicU64,
}

impl DummySegment {
    /// Create a new, empty dummy segment.
    pub fn new() -> Self {
        Self {
            pools: Mutex::new(HashMap::new()),
            auditors: Mutex::new(HashMap::new()),
            arena: Mutex::new(HashMap::new()),
            ptr_index: Mutex::new(HashMap::new()),
            next_offset: AtomicU64::new(1),
        }
    }
}

impl Default for DummySegment {
    fn default() -> Self {
        Self::new()
    }
}

impl Segment for DummySegment {
    fn find_or_construct_pool(&self, name: &'static str) -> Arc<Pool> {
        let mut pools = self.pools.lock().unwrap();
        Arc::clone(pools.entry(name).or_insert_with(|| Arc::new(Pool::new(self))))
    }

    fn find_or_construct_auditor(&self, name: &'static str) -> Arc<Auditor> {
        let mut auditors = self.auditors.lock().unwrap();
        Arc::clone(auditors.entry(name).or_insert_with(|| Arc::new(Auditor::new(self))))
    }

    fn destroy_pool(&self, name: &'static str) {
        self.pools.lock().unwrap().remove(name);
    }

    fn destroy_auditor(&self, name: &'static str) {
        self.auditors.lock().unwrap().remove(name);
    }

    fn alloc_bytes(&self, n: u64) -> Offset {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        let mut block = vec![0u8; n as usize].into_boxed_slice();
        let ptr = block.as_mut_ptr() as usize;
        self.arena.lock().unwrap().insert(offset, block);
        self.ptr_index.lock().unwrap().insert(ptr, offset);
        Offset(offset)
    }

    fn dealloc_bytes(&self, offset: Offset) {
        if let Some(block) = self.arena.lock().unwrap().remove(&offset.0) {
            self.ptr_index
                .lock()
                .unwrap()
                .remove(&(block.as_ptr() as usize));
        }
    }

    fn address_of(&self, offset: Offset) -> *mut u8 {
        self.arena
            .lock()
            .unwrap()
            .get_mut(&offset.0)
            .map(|block| block.as_mut_ptr())
            .unwrap_or(std::ptr::null_mut())
    }

    fn offset_of(&self, ptr: *mut u8) -> Offset {
        Offset(
            *self
                .ptr_index
                .lock()
                .unwrap()
                .get(&(ptr as usize))
                .unwrap_or(&0),
        )
    }

    fn new_mutex(&self) -> Box<dyn CrossProcessMutex> {
        Box::new(OwnerPidGuard::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_then_address_of_round_trips() {
        let seg = DummySegment::new();
        let offset = seg.alloc_bytes(64);
        let ptr = seg.address_of(offset);
        assert!(!ptr.is_null());
        assert_eq!(seg.offset_of(ptr), offset);
    }

    #[test]
    fn find_or_construct_pool_is_idempotent() {
        let seg = DummySegment::new();
        let a = seg.find_or_construct_pool("MemoryPool");
        let b = seg.find_or_construct_pool("MemoryPool");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn dealloc_removes_arena_entry() {
        let seg = DummySegment::new();
        let offset = seg.alloc_bytes(64);
        seg.dealloc_bytes(offset);
        assert!(seg.address_of(offset).is_null());
    }
}
