//! Vulkan backend for [`GraphicsApi`](super::traits::GraphicsApi), using the
//! `ash` crate and `VK_KHR_external_memory_fd` / `VK_KHR_external_memory_win32`
//! to export allocations for cross-process sharing.

pub mod allocator;
pub mod buffer;

pub use allocator::VulkanGraphicsApi;
pub use buffer::VulkanCpuView;
