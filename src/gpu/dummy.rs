//! In-process fake [`GraphicsApi`](super::traits::GraphicsApi), always
//! active and requiring no GPU hardware. Used by the test suite to simulate
//! multi-process GPU sharing scenarios (S4/S5 in the design notes) within a
//! single process by constructing two [`crate::PoolHandle`]s with distinct
//! fake PIDs over one shared [`DummyGraphicsApi`] instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::traits::{CpuView, GraphicsApi};

struct DummyAllocation {
    data: Arc<Mutex<Vec<u8>>>,
    device_local: bool,
}

/// A fake GPU view backed by a shared `Vec<u8>`. Holding this does not
/// actually exclude other mappings, matching how a real external-memory
/// mapping has no Rust-visible aliasing guarantees either.
pub struct DummyCpuView {
    data: Arc<Mutex<Vec<u8>>>,
}

impl CpuView for DummyCpuView {
    fn as_ptr(&self) -> *const u8 {
        self.data.lock().unwrap().as_ptr()
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.data.lock().unwrap().as_mut_ptr()
    }

    fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }
}

/// Always-active dummy graphics API. Handles are monotonically increasing
/// fake tokens; duplication mints a new token aliasing the same backing
/// storage, mirroring how a real OS handle-dup names the same memory under a
/// new, process-local identifier.
pub struct DummyGraphicsApi {
    next_handle: AtomicU64,
    allocations: Mutex<HashMap<u64, DummyAllocation>>,
}

impl DummyGraphicsApi {
    /// Create a new dummy backend with an empty allocation table.
    pub fn new() -> Self {
        Self {
            next_handle: AtomicU64::new(1),
            allocations: Mutex::new(HashMap::new()),
        }
    }

    /// Number of allocations (including duplicates, each of which occupies
    /// its own entry) still outstanding. Test-only introspection for
    /// asserting that `free` was actually reached on teardown.
    pub fn allocation_count(&self) -> usize {
        self.allocations.lock().unwrap().len()
    }
}

impl Default for DummyGraphicsApi {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphicsApi for DummyGraphicsApi {
    fn is_active(&self) -> bool {
        true
    }

    fn allocate(&self, n: u64, device_local: bool) -> Option<(u64, u32)> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let memory_type_index = if device_local { 0 } else { 1 };
        self.allocations.lock().unwrap().insert(
            handle,
            DummyAllocation {
                data: Arc::new(Mutex::new(vec![0u8; n as usize])),
                device_local,
            },
        );
        Some((handle, memory_type_index))
    }

    fn map(&self, handle: u64, _n: u64, _memory_type_index: u32) -> Option<Box<dyn CpuView>> {
        let allocations = self.allocations.lock().unwrap();
        let alloc = allocations.get(&handle)?;
        if alloc.device_local {
            return None;
        }
        Some(Box::new(DummyCpuView {
            data: Arc::clone(&alloc.data),
        }))
    }

    fn free(&self, handle: u64) {
        self.allocations.lock().unwrap().remove(&handle);
    }

    fn duplicate_handle(&self, _origin_pid: u32, handle: u64, _size: u64, _memory_type_index: u32) -> Option<u64> {
        let mut allocations = self.allocations.lock().unwrap();
        let data = Arc::clone(&allocations.get(&handle)?.data);
        let device_local = allocations.get(&handle)?.device_local;
        let new_handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        allocations.insert(new_handle, DummyAllocation { data, device_local });
        Some(new_handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_then_map_host_visible() {
        let api = DummyGraphicsApi::new();
        let (handle, _mem_type) = api.allocate(1024, false).unwrap();
        let view = api.map(handle, 1024, 1).unwrap();
        assert_eq!(view.len(), 1024);
    }

    #[test]
    fn device_local_cannot_map() {
        let api = DummyGraphicsApi::new();
        let (handle, _mem_type) = api.allocate(1024, true).unwrap();
        assert!(api.map(handle, 1024, 0).is_none());
    }

    #[test]
    fn duplicate_handle_aliases_same_storage() {
        let api = DummyGraphicsApi::new();
        let (handle, _) = api.allocate(64, false).unwrap();
        let dup = api.duplicate_handle(999, handle, 64, 1).unwrap();
        assert_ne!(dup, handle);

        {
            let mut view = api.map(handle, 64, 1).unwrap();
            view.as_mut_ptr();
        }
        let view1 = api.map(handle, 64, 1).unwrap();
        let view2 = api.map(dup, 64, 1).unwrap();
        assert_eq!(view1.as_ptr(), view2.as_ptr());
    }

    #[test]
    fn free_removes_allocation() {
        let api = DummyGraphicsApi::new();
        let (handle, _) = api.allocate(64, false).unwrap();
        api.free(handle);
        assert!(api.map(handle, 64, 1).is_none());
    }
}
