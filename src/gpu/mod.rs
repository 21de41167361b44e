//! GPU memory management.
//!
//! Present at all times so the pool core can depend on the [`GraphicsApi`]
//! trait and [`dummy::DummyGraphicsApi`] without a real backend; the real
//! backend is feature-gated.
//!
//! ## Backends
//! - `vulkan`: via the `ash` crate (enable the `gpu-vulkan` feature)

pub mod traits;
pub use traits::{CpuView, GpuBufferData, GpuBufferDataWithPID, GraphicsApi};

pub mod dummy;
pub use dummy::DummyGraphicsApi;

#[cfg(feature = "gpu-vulkan")]
pub mod vulkan;
#[cfg(feature = "gpu-vulkan")]
pub use vulkan::VulkanGraphicsApi;
