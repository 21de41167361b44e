//! # hybridpool
//!
//! A cross-process CPU/GPU buffer pool: cooperating processes on one host
//! share both CPU buffers (backed by a shared-memory segment) and GPU
//! buffers (backed by external-memory allocations exported from a graphics
//! API), with correctness preserved across partial process failure.
//!
//! The hard core is the hybrid memory pool: free-lists of reusable CPU and
//! GPU buffers keyed by exact byte size, a cross-process reference-counting
//! discipline with a per-process reclamation path, GPU handle duplication
//! across process boundaries, and a liveness auditor that detects dead
//! peers and tears down the shared region safely.
//!
//! Deliberately out of scope, specified only via the interfaces the core
//! depends on: the shared-memory segment itself ([`segment::Segment`]), the
//! graphics-API utility ([`gpu::GraphicsApi`]), and stream-routing/framework
//! wiring (the caller decides which [`stream::StreamId`]s exist; this crate
//! only tracks whether each one is active).
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use hybridpool::{PoolConfig, PoolHandle, StreamId};
//! use std::sync::Arc;
//!
//! # #[cfg(feature = "shm")]
//! # fn main() -> Result<(), hybridpool::PoolError> {
//! let segment = Arc::new(hybridpool::ShmSegment::open_or_create("my-app-pool", 64 << 20)?);
//! let pool = PoolHandle::new(segment, PoolConfig::default())?;
//!
//! let buffer = pool.get_buffer_from_pool(StreamId(0), 4096);
//! assert_eq!(buffer.len(), 4096);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "shm"))]
//! # fn main() {}
//! ```

#[allow(dead_code)]
mod util;
pub mod diagnostics;
pub mod sync;

pub mod segment;
pub mod gpu;
pub mod os;

pub mod auditor;
pub mod pool;
pub mod reclaim;

pub mod handles;
pub mod stream;
pub mod liveness;
pub mod local_alloc;

pub mod config;
pub mod error;
pub mod stats;

mod pool_handle;

/// Named shared objects, part of the ABI between cooperating processes
/// (`§6`): every attacher must agree on these exact strings.
pub const POOL_CPU_NAME: &str = "MemoryPool";
pub const POOL_GPU_NAME: &str = "MemoryPoolGPU";
pub const POOL_GPU_DEVICE_LOCAL_NAME: &str = "MemoryPoolGPUDeviceLocal";
pub const AUDITOR_NAME: &str = "Auditor";

pub use config::PoolConfig;
pub use error::PoolError;
pub use gpu::{CpuView, GpuBufferData, GpuBufferDataWithPID, GraphicsApi};
pub use gpu::DummyGraphicsApi;
#[cfg(feature = "gpu-vulkan")]
pub use gpu::VulkanGraphicsApi;
pub use handles::{CpuBuffer, GpuBuffer};
pub use pool_handle::PoolHandle;
pub use segment::{Offset, Segment};
pub use segment::dummy::DummySegment;
#[cfg(feature = "shm")]
pub use segment::ShmSegment;
pub use stats::{GpuPoolStats, PoolCounters, PoolStats};
pub use stream::StreamId;
