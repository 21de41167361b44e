//! The mapped-memory view returned by [`VulkanGraphicsApi::map`](super::allocator::VulkanGraphicsApi::map).

use std::sync::Arc;

use super::super::traits::CpuView;

/// A CPU-visible mapping of host-visible Vulkan device memory. Unmaps on
/// drop; never valid for device-local allocations, which `VulkanGraphicsApi`
/// refuses to map.
pub struct VulkanCpuView {
    device: Arc<ash::Device>,
    memory: ash::vk::DeviceMemory,
    ptr: *mut u8,
    len: usize,
}

impl VulkanCpuView {
    /// # Safety
    /// `ptr` must be the pointer returned by `vkMapMemory` for `memory`, and
    /// `memory` must still be mapped.
    pub(super) unsafe fn new(device: Arc<ash::Device>, memory: ash::vk::DeviceMemory, ptr: *mut u8, len: usize) -> Self {
        Self { device, memory, ptr, len }
    }
}

impl CpuView for VulkanCpuView {
    fn as_ptr(&self) -> *const u8 {
        self.ptr
    }

    fn as_mut_ptr(&mut self) -> *mut u8 {
        self.ptr
    }

    fn len(&self) -> usize {
        self.len
    }
}

// The mapping is only ever handed out for host-visible, host-coherent
// memory; synchronization across processes is the caller's responsibility,
// same as any raw shared-memory view.
unsafe impl Send for VulkanCpuView {}
unsafe impl Sync for VulkanCpuView {}

impl Drop for VulkanCpuView {
    fn drop(&mut self) {
        unsafe {
            self.device.unmap_memory(self.memory);
        }
    }
}
