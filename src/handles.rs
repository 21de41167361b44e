//! C5 - the process-local handle cache, and the public `CpuBuffer`/`GpuBuffer`
//! types backed by it.
//!
//! Every map here is guarded by one process-local mutex (`memoryMutex_` in
//! the design notes, `§5`) - never the segment's cross-process mutexes.
//! `cpu_ptrs` and `gpu_handles` hold the [`crate::reclaim::SharedWrapper`]
//! that is the only thing keeping the shared refcount above zero once the
//! construction-site reference is released; removing an entry and dropping
//! the last clone is what fires the reclaimer.

use std::collections::HashMap;
use std::fmt;
use std::slice;
use std::sync::Arc;

use crate::gpu::{CpuView, GpuBufferData};
use crate::reclaim::SharedWrapper;
use crate::sync::mutex::Mutex;

type MappedView = Arc<Mutex<Box<dyn CpuView>>>;

#[derive(Default)]
struct HandleCacheInner {
    cpu_ptrs: HashMap<usize, SharedWrapper>,
    gpu_handles: HashMap<u64, SharedWrapper>,
    gpu_handle_proc_map: HashMap<(u32, u64), u64>,
    gpu_mapped_buffers: HashMap<u64, MappedView>,
}

/// The per-process handle cache backing every [`CpuBuffer`]/[`GpuBuffer`]
/// this process hands out.
pub struct HandleCache {
    inner: Mutex<HandleCacheInner>,
}

impl HandleCache {
    /// Construct a fresh, empty cache.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: Mutex::new(HandleCacheInner::default()),
        })
    }

    pub(crate) fn register_cpu(&self, ptr: usize, wrapper: SharedWrapper) {
        self.inner.lock().cpu_ptrs.insert(ptr, wrapper);
    }

    pub(crate) fn destroy_local_cpu(&self, ptr: usize) {
        self.inner.lock().cpu_ptrs.remove(&ptr);
    }

    /// `isBufferFromPool`'s CPU half (`§4.7`): true if `ptr` is currently
    /// backed by a live local handle into this pool.
    pub(crate) fn contains_cpu(&self, ptr: usize) -> bool {
        self.inner.lock().cpu_ptrs.contains_key(&ptr)
    }

    pub(crate) fn register_gpu(&self, local_handle: u64, wrapper: SharedWrapper) {
        self.inner.lock().gpu_handles.insert(local_handle, wrapper);
    }

    pub(crate) fn destroy_local_gpu(&self, local_handle: u64) {
        let mut inner = self.inner.lock();
        inner.gpu_handles.remove(&local_handle);
        inner.gpu_mapped_buffers.remove(&local_handle);
    }

    pub(crate) fn contains_gpu(&self, local_handle: u64) -> bool {
        self.inner.lock().gpu_handles.contains_key(&local_handle)
    }

    /// Cached result of a previous `duplicate_handle` call for
    /// `(origin_pid, origin_handle)`, if this process already imported it.
    pub(crate) fn cached_duplicate(&self, origin_pid: u32, origin_handle: u64) -> Option<u64> {
        self.inner
            .lock()
            .gpu_handle_proc_map
            .get(&(origin_pid, origin_handle))
            .copied()
    }

    pub(crate) fn record_duplicate(&self, origin_pid: u32, origin_handle: u64, local_handle: u64) {
        self.inner
            .lock()
            .gpu_handle_proc_map
            .insert((origin_pid, origin_handle), local_handle);
    }

    pub(crate) fn cached_mapping(&self, local_handle: u64) -> Option<MappedView> {
        self.inner.lock().gpu_mapped_buffers.get(&local_handle).cloned()
    }

    pub(crate) fn record_mapping(&self, local_handle: u64, view: MappedView) {
        self.inner.lock().gpu_mapped_buffers.insert(local_handle, view);
    }

    /// `convert(CpuBuffer)` (`§4.7`): the `SharedWrapper` registered for
    /// `ptr`, if any - the probe `is_buffer_from_pool` is built on.
    pub(crate) fn cpu_wrapper(&self, ptr: usize) -> Option<SharedWrapper> {
        self.inner.lock().cpu_ptrs.get(&ptr).cloned()
    }

    /// `convert(GpuBuffer)` (`§4.7`).
    pub(crate) fn gpu_wrapper(&self, local_handle: u64) -> Option<SharedWrapper> {
        self.inner.lock().gpu_handles.get(&local_handle).cloned()
    }

    /// Detach step 7 (`§4.9`): take every duplicated handle this process
    /// has ever imported, clearing the map. Callers free each one through
    /// the graphics API.
    pub(crate) fn drain_duplicate_handles(&self) -> Vec<u64> {
        self.inner
            .lock()
            .gpu_handle_proc_map
            .drain()
            .map(|(_, local_handle)| local_handle)
            .collect()
    }
}

impl Default for HandleCache {
    fn default() -> Self {
        Self {
            inner: Mutex::new(HandleCacheInner::default()),
        }
    }
}

/// A locally-owned CPU buffer drawn from the shared pool (or, if the stream
/// gate or budget diverted the request, from the local fallback allocator -
/// see [`crate::local_alloc`]). Dropping it runs the deleter that returns
/// the underlying allocation to its origin.
pub struct CpuBuffer {
    ptr: *mut u8,
    len: usize,
    deleter: CpuDeleter,
}

enum CpuDeleter {
    /// Backed by the shared pool, registered in the process-local handle
    /// cache: deleting decrements the cross-process refcount by removing
    /// the cache entry.
    Shared(Arc<HandleCache>),
    /// Backed by the shared pool but never registered in the handle cache -
    /// the `getBufferFromSharedPoolDirect` bypass (`§4.7`). Deleting just
    /// drops the held `SharedWrapper` directly.
    Direct(SharedWrapper),
    /// Backed by the process-local fallback allocator.
    Local,
}

unsafe impl Send for CpuBuffer {}
unsafe impl Sync for CpuBuffer {}

impl CpuBuffer {
    pub(crate) fn from_shared(ptr: *mut u8, len: usize, cache: Arc<HandleCache>) -> Self {
        Self {
            ptr,
            len,
            deleter: CpuDeleter::Shared(cache),
        }
    }

    pub(crate) fn from_local(ptr: *mut u8, len: usize) -> Self {
        Self {
            ptr,
            len,
            deleter: CpuDeleter::Local,
        }
    }

    /// `getBufferFromSharedPoolDirect`'s bypass path: the buffer's
    /// reclaim-on-drop is the directly-held `wrapper`, never a handle-cache
    /// entry.
    pub(crate) fn from_wrapper(ptr: *mut u8, len: usize, wrapper: SharedWrapper) -> Self {
        Self {
            ptr,
            len,
            deleter: CpuDeleter::Direct(wrapper),
        }
    }

    /// Raw pointer to the start of the buffer.
    pub fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    /// Buffer length in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True for a zero-length buffer.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Borrow the buffer's contents.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { slice::from_raw_parts(self.ptr, self.len) }
    }

    /// Mutably borrow the buffer's contents.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.ptr, self.len) }
    }

    /// True if this buffer came from the shared pool rather than the local
    /// fallback allocator.
    pub fn is_from_pool(&self) -> bool {
        !matches!(self.deleter, CpuDeleter::Local)
    }
}

impl Drop for CpuBuffer {
    fn drop(&mut self) {
        match &self.deleter {
            CpuDeleter::Shared(cache) => cache.destroy_local_cpu(self.ptr as usize),
            CpuDeleter::Direct(_) => {}
            CpuDeleter::Local => crate::local_alloc::free(self.ptr, self.len),
        }
    }
}

impl PartialEq for CpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }
}

impl Eq for CpuBuffer {}

impl fmt::Debug for CpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpuBuffer")
            .field("ptr", &self.ptr)
            .field("len", &self.len)
            .field("is_from_pool", &self.is_from_pool())
            .finish()
    }
}

/// A locally-owned GPU buffer: the process-local view of a (possibly
/// foreign-origin, possibly duplicated) GPU allocation, plus - for
/// host-visible memory - the mapped CPU view.
pub struct GpuBuffer {
    local_handle: u64,
    data: GpuBufferData,
    origin_pid: u32,
    offset: crate::segment::Offset,
    mapped: Option<MappedView>,
    cache: Arc<HandleCache>,
}

impl GpuBuffer {
    pub(crate) fn new(
        local_handle: u64,
        data: GpuBufferData,
        origin_pid: u32,
        offset: crate::segment::Offset,
        mapped: Option<MappedView>,
        cache: Arc<HandleCache>,
    ) -> Self {
        Self {
            local_handle,
            data,
            origin_pid,
            offset,
            mapped,
            cache,
        }
    }

    /// The `{handle, size, memoryTypeIndex}` descriptor as seen in the
    /// local process (after duplication, if this buffer originated
    /// elsewhere).
    pub fn data(&self) -> GpuBufferData {
        self.data
    }

    /// PID of the process that first allocated this buffer via the
    /// graphics API.
    pub fn origin_pid(&self) -> u32 {
        self.origin_pid
    }

    /// This buffer's offset in the shared segment - the value a process
    /// would pass out-of-band to another process so it can call
    /// `PoolHandle::get_gpu_buffer_direct` and duplicate the same
    /// allocation (`§4.6`/`§4.7`'s cross-process handoff path).
    pub fn shared_offset(&self) -> crate::segment::Offset {
        self.offset
    }

    /// True if this buffer has a CPU-side mapping (host-visible memory).
    pub fn is_host_visible(&self) -> bool {
        self.mapped.is_some()
    }

    /// Run `f` against the mapped CPU view, if host-visible.
    pub fn with_mapped_slice<R>(&self, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let view = self.mapped.as_ref()?;
        let guard = view.lock();
        Some(f(unsafe { slice::from_raw_parts(guard.as_ptr(), guard.len()) }))
    }

    /// Run `f` against the mapped CPU view mutably, if host-visible.
    pub fn with_mapped_slice_mut<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let view = self.mapped.as_ref()?;
        let mut guard = view.lock();
        Some(f(unsafe {
            slice::from_raw_parts_mut(guard.as_mut_ptr(), guard.len())
        }))
    }
}

impl Drop for GpuBuffer {
    fn drop(&mut self) {
        self.cache.destroy_local_gpu(self.local_handle);
    }
}

impl PartialEq for GpuBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.local_handle == other.local_handle
    }
}

impl Eq for GpuBuffer {}

impl fmt::Debug for GpuBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GpuBuffer")
            .field("local_handle", &self.local_handle)
            .field("origin_pid", &self.origin_pid)
            .field("is_host_visible", &self.is_host_visible())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::Pool;
    use crate::reclaim;
    use crate::segment::dummy::DummySegment;
    use crate::segment::Offset;

    #[test]
    fn dropping_cpu_buffer_reclaims_offset() {
        let seg = DummySegment::new();
        let pool = std::sync::Arc::new(Pool::new(&seg));
        let cache = HandleCache::new();
        let wrapper = reclaim::new_wrapper(std::sync::Arc::clone(&pool), 64, Offset(9));

        let mut byte: u8 = 0;
        let ptr = &mut byte as *mut u8;
        cache.register_cpu(ptr as usize, wrapper);
        let buffer = CpuBuffer::from_shared(ptr, 1, std::sync::Arc::clone(&cache));

        assert!(cache.contains_cpu(ptr as usize));
        drop(buffer);
        assert!(!cache.contains_cpu(ptr as usize));
        assert_eq!(pool.pop_free(64), Some(Offset(9)));
    }

    #[test]
    fn cpu_buffer_equality_is_by_pointer() {
        let mut bytes = [0u8; 4];
        let a = CpuBuffer::from_local(bytes.as_mut_ptr(), 4);
        let mut other = [0u8; 4];
        let b = CpuBuffer::from_local(other.as_mut_ptr(), 4);
        assert_ne!(a, b);
        std::mem::forget(a);
        std::mem::forget(b);
    }
}
