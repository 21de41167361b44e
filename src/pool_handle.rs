//! The top-level `PoolHandle`: attach (`§4.1`), the request operations
//! (`§4.3`-`§4.7`), and detach (`§4.9`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::auditor::Auditor;
use crate::config::PoolConfig;
use crate::error::PoolError;
use crate::gpu::{DummyGraphicsApi, GraphicsApi};
use crate::handles::{CpuBuffer, GpuBuffer, HandleCache};
use crate::liveness::LivenessLoop;
use crate::pool::{cpu, gpu, Pool};
use crate::reclaim::SharedWrapper;
use crate::segment::{Offset, Segment};
use crate::stats::{GpuPoolStats, PoolCounters, PoolStats};
use crate::stream::{StreamGate, StreamId};

/// The four named shared objects' ABI strings, re-exported from the crate
/// root (`§6`).
use crate::{AUDITOR_NAME, POOL_CPU_NAME, POOL_GPU_DEVICE_LOCAL_NAME, POOL_GPU_NAME};

/// The pool's entry point: attaches to (or constructs) the shared segment's
/// named objects on construction, and detaches - cleanly if possible - on
/// drop.
pub struct PoolHandle {
    segment: Arc<dyn Segment>,
    graphics: Arc<dyn GraphicsApi>,
    cpu_pool: Arc<Pool>,
    gpu_pool: Arc<Pool>,
    gpu_device_local_pool: Arc<Pool>,
    auditor: Arc<Auditor>,
    config: PoolConfig,
    cache: Arc<HandleCache>,
    streams: StreamGate,
    counters: PoolCounters,
    liveness_loop: Option<LivenessLoop>,
    local_pid: u32,
    attached: AtomicBool,
}

impl PoolHandle {
    /// Attach over `segment`, using the always-available [`DummyGraphicsApi`]
    /// as the graphics backend. Use [`PoolHandle::with_graphics`] to supply
    /// a real backend (e.g. `VulkanGraphicsApi` behind the `gpu-vulkan`
    /// feature).
    pub fn new(segment: Arc<dyn Segment>, config: PoolConfig) -> Result<Self, PoolError> {
        Self::with_graphics(segment, Arc::new(DummyGraphicsApi::new()), config)
    }

    /// Attach using a specific graphics backend and the real process PID.
    pub fn with_graphics(
        segment: Arc<dyn Segment>,
        graphics: Arc<dyn GraphicsApi>,
        config: PoolConfig,
    ) -> Result<Self, PoolError> {
        Self::with_graphics_and_pid(segment, graphics, config, std::process::id())
    }

    /// Attach using an explicit local PID, overriding `std::process::id()`.
    /// Used by tests to simulate several distinct processes sharing one
    /// [`crate::segment::dummy::DummySegment`]/[`DummyGraphicsApi`] pair.
    pub fn with_graphics_and_pid(
        segment: Arc<dyn Segment>,
        graphics: Arc<dyn GraphicsApi>,
        config: PoolConfig,
        local_pid: u32,
    ) -> Result<Self, PoolError> {
        config.validate()?;

        let cpu_pool = segment.find_or_construct_pool(POOL_CPU_NAME);
        let gpu_pool = segment.find_or_construct_pool(POOL_GPU_NAME);
        let gpu_device_local_pool = segment.find_or_construct_pool(POOL_GPU_DEVICE_LOCAL_NAME);
        let auditor = segment.find_or_construct_auditor(AUDITOR_NAME);

        let attached = auditor.audit();
        if attached {
            auditor.attach_pid(local_pid);
        } else {
            auditor.invalidate();
        }

        let liveness_loop = if attached && config.enable_auditor_loop {
            Some(LivenessLoop::spawn(
                Arc::clone(&segment),
                Arc::clone(&auditor),
                config.liveness_poll_interval,
            ))
        } else {
            None
        };

        Ok(Self {
            segment,
            graphics,
            cpu_pool,
            gpu_pool,
            gpu_device_local_pool,
            auditor,
            config,
            cache: HandleCache::new(),
            streams: StreamGate::new(),
            counters: PoolCounters::default(),
            liveness_loop,
            local_pid,
            attached: AtomicBool::new(attached),
        })
    }

    /// `getBufferFromPool(streamId, n)` (`§4.4`): shared pool if the stream
    /// is active (the default), else the local fallback allocator; falls
    /// back to local on a shared-pool miss too, with a rate-limited
    /// warning.
    pub fn get_buffer_from_pool(&self, stream: StreamId, n: usize) -> CpuBuffer {
        self.counters.cpu_requests.increment();

        if !self.streams.is_active(stream) || self.auditor.is_invalid() {
            return crate::local_alloc::alloc(n);
        }

        match self.request_shm(n as u64) {
            Some(buffer) => buffer,
            None => {
                self.counters.cpu_local_fallbacks.increment();
                crate::hp_emit_ratelimited!(HP001);
                crate::local_alloc::alloc(n)
            }
        }
    }

    /// `requestSHM(n)` (`§4.3`), returning `None` on budget exhaustion
    /// rather than falling back - callers that want the fallback behavior
    /// should go through [`PoolHandle::get_buffer_from_pool`].
    pub fn request_shm(&self, n: u64) -> Option<CpuBuffer> {
        if self.auditor.is_invalid() {
            return None;
        }
        let offset = cpu::request_shm(
            &self.cpu_pool,
            self.segment.as_ref(),
            n,
            self.config.cpu_budget,
            self.config.max_shm_usage_frac,
        )?;
        let wrapper = self.cpu_pool.wrapper_for(Arc::clone(&self.cpu_pool), n, offset);
        let ptr = self.segment.address_of(offset);
        self.cache.register_cpu(ptr as usize, wrapper);
        Some(CpuBuffer::from_shared(ptr, n as usize, Arc::clone(&self.cache)))
    }

    /// `getGpuBufferFromPool(n, deviceLocal)` (`§4.5`).
    pub fn get_gpu_buffer_from_pool(&self, n: u64, device_local: bool) -> Option<GpuBuffer> {
        self.counters.gpu_requests.increment();

        if self.auditor.is_invalid() {
            return None;
        }

        let pool = if device_local {
            &self.gpu_device_local_pool
        } else {
            &self.gpu_pool
        };

        let (offset, data) = match gpu::get_gpu_buffer(
            pool,
            self.segment.as_ref(),
            self.graphics.as_ref(),
            n,
            device_local,
            self.config.gpu_budget,
            self.local_pid,
        ) {
            Some(result) => result,
            None => {
                self.counters.gpu_allocate_failures.increment();
                crate::hp_emit_ratelimited!(HP102);
                return None;
            }
        };

        self.create_local(Arc::clone(pool), offset, data)
    }

    /// GPU analog of `getBufferFromSharedPoolDirect` (`§4.7`): given an
    /// offset another process already allocated and shared out-of-band
    /// (the "send wrapper to P2" step of the GPU cross-process handoff
    /// scenario), look up its record directly rather than through the
    /// free-list and duplicate/map it into this process.
    pub fn get_gpu_buffer_direct(&self, device_local: bool, offset: Offset) -> Option<GpuBuffer> {
        let pool = if device_local {
            &self.gpu_device_local_pool
        } else {
            &self.gpu_pool
        };
        let data = pool.with_sizes(|sizes, _| match sizes.get(&offset) {
            Some(crate::pool::PoolRecord::Gpu { data }) => Some(*data),
            _ => None,
        })?;
        self.create_local(Arc::clone(pool), offset, data)
    }

    /// `createLocal(sharedWrapper)` (`§4.6`): duplicate the GPU handle into
    /// this process if it originated elsewhere, map it if host-visible, and
    /// record a local handle backed by the shared refcount.
    fn create_local(
        &self,
        pool: Arc<Pool>,
        offset: Offset,
        data: crate::gpu::GpuBufferDataWithPID,
    ) -> Option<GpuBuffer> {
        let origin_pid = data.origin_pid;
        let remote = data.data;

        let local_handle = if origin_pid == self.local_pid {
            remote.handle
        } else if let Some(cached) = self.cache.cached_duplicate(origin_pid, remote.handle) {
            cached
        } else {
            let duplicated = self.graphics.duplicate_handle(
                origin_pid,
                remote.handle,
                remote.size,
                remote.memory_type_index,
            )?;
            self.cache.record_duplicate(origin_pid, remote.handle, duplicated);
            duplicated
        };

        let mapped = if let Some(cached) = self.cache.cached_mapping(local_handle) {
            Some(cached)
        } else if let Some(view) = self
            .graphics
            .map(local_handle, remote.size, remote.memory_type_index)
        {
            let shared = Arc::new(crate::sync::mutex::Mutex::new(view));
            self.cache.record_mapping(local_handle, Arc::clone(&shared));
            Some(shared)
        } else {
            None
        };

        let wrapper = pool.wrapper_for(Arc::clone(&pool), remote.size, offset);
        self.cache.register_gpu(local_handle, wrapper);

        Some(GpuBuffer::new(
            local_handle,
            crate::gpu::GpuBufferData {
                handle: local_handle,
                ..remote
            },
            origin_pid,
            offset,
            mapped,
            Arc::clone(&self.cache),
        ))
    }

    /// `convert(CpuBuffer)` (`§4.7`): the `SharedWrapper` backing `buffer`,
    /// if it is a normal (handle-cache-registered) shared-pool buffer.
    /// Buffers drawn from [`PoolHandle::get_buffer_from_shared_pool_direct`]
    /// are deliberately invisible here - see that method's doc comment.
    pub fn convert(&self, buffer: &CpuBuffer) -> Option<SharedWrapper> {
        self.cache.cpu_wrapper(buffer.as_ptr() as usize)
    }

    /// `isBufferFromPool` (`§4.7`): `convert(buffer).is_some()` - true if
    /// `buffer` currently backs a live, handle-cache-registered local
    /// handle drawn from this pool (as opposed to the local fallback
    /// allocator, or a direct/bypass buffer).
    pub fn is_buffer_from_pool(&self, buffer: &CpuBuffer) -> bool {
        self.convert(buffer).is_some()
    }

    /// `getBufferFromSharedPoolDirect(n)` (`§4.7`): `convert(requestSHM(n))`
    /// - conceptually, requests a buffer from the shared pool and returns
    /// its cross-process wrapper directly, bypassing the local handle.
    ///
    /// This crate still returns a [`CpuBuffer`] rather than the bare
    /// `SharedWrapper` the distilled spec names: a `SharedWrapper` carries
    /// only `{pool, size_key, offset}`, no byte pointer, so returning it
    /// verbatim would leave the caller with no way to read or write the
    /// buffer. What "bypassing the local handle" means here concretely:
    /// unlike [`PoolHandle::request_shm`], the returned buffer's reclaim-on-
    /// drop wrapper is never registered in the process-local handle cache,
    /// so [`PoolHandle::convert`]/[`PoolHandle::is_buffer_from_pool`] never
    /// observe it - it carries its shared reference directly rather than
    /// through that bookkeeping, same as the distilled spec's wrapper
    /// hand-off.
    pub fn get_buffer_from_shared_pool_direct(&self, n: u64) -> Option<CpuBuffer> {
        if self.auditor.is_invalid() {
            return None;
        }
        let offset = cpu::request_shm(
            &self.cpu_pool,
            self.segment.as_ref(),
            n,
            self.config.cpu_budget,
            self.config.max_shm_usage_frac,
        )?;
        let wrapper = self.cpu_pool.wrapper_for(Arc::clone(&self.cpu_pool), n, offset);
        let ptr = self.segment.address_of(offset);
        Some(CpuBuffer::from_wrapper(ptr, n as usize, wrapper))
    }

    /// `activateStream(id, active)` (`§4.4`).
    pub fn activate_stream(&self, id: StreamId, active: bool) {
        self.streams.activate_stream(id, active);
    }

    /// Read-only snapshot of CPU pool occupancy.
    pub fn stats(&self) -> PoolStats {
        PoolStats::snapshot(&self.cpu_pool, self.config.cpu_budget)
    }

    /// Read-only snapshot of both GPU pools' occupancy.
    pub fn gpu_stats(&self) -> GpuPoolStats {
        GpuPoolStats {
            host_visible: PoolStats::snapshot(&self.gpu_pool, self.config.gpu_budget),
            device_local: PoolStats::snapshot(&self.gpu_device_local_pool, self.config.gpu_budget),
        }
    }

    /// Running request/fallback counters, independent of point-in-time
    /// occupancy.
    pub fn counters(&self) -> &PoolCounters {
        &self.counters
    }

    /// `true` once attach succeeded and the segment hasn't since been
    /// invalidated.
    pub fn is_valid(&self) -> bool {
        self.attached.load(Ordering::Acquire) && !self.auditor.is_invalid()
    }

    /// The PID this handle identifies itself as (normally
    /// `std::process::id()`, overridable in tests).
    pub fn local_pid(&self) -> u32 {
        self.local_pid
    }
}

impl Drop for PoolHandle {
    /// Detach (`§4.9`): stop the liveness loop (step 2), remove this
    /// process's record (step 3), return every shared CPU byte block if
    /// this was the last attached process (step 4), clean both GPU pools
    /// of this process's own origin allocations (step 6), free every
    /// handle this process duplicated (step 7), and nuke the segment once
    /// the last process has cleaned up after itself.
    ///
    /// Step 1 (drop all local handles up front) has no counterpart here:
    /// outstanding `CpuBuffer`/`GpuBuffer` values are owned by the caller,
    /// not by `PoolHandle`, so Rust's own ownership rules already require
    /// them to be dropped before (or independently of) this handle - there
    /// is nothing for `Drop` to reach into. Step 5 (clear local GPU caches)
    /// likewise has no separate action: `HandleCache` has no entries left
    /// once every `GpuBuffer` referencing it has been dropped.
    fn drop(&mut self) {
        if let Some(mut loop_handle) = self.liveness_loop.take() {
            loop_handle.stop();
        }

        if !self.attached.load(Ordering::Acquire) {
            return;
        }

        if self.config.force_clean_on_detach {
            self.auditor.clear_all();
        } else {
            self.auditor.detach(self.local_pid);
        }

        let last_process = self.auditor.is_empty();
        if last_process {
            self.auditor.invalidate();
            self.cpu_pool.drain_and_dealloc(self.segment.as_ref());
        }

        gpu::clean_pool(
            &self.gpu_pool,
            self.segment.as_ref(),
            self.graphics.as_ref(),
            self.local_pid,
            last_process,
        );
        gpu::clean_pool(
            &self.gpu_device_local_pool,
            self.segment.as_ref(),
            self.graphics.as_ref(),
            self.local_pid,
            last_process,
        );

        for duplicated in self.cache.drain_duplicate_handles() {
            self.graphics.free(duplicated);
        }

        if last_process {
            Auditor::nuke(self.segment.as_ref());
        }
    }
}
