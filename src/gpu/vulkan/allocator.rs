//! Vulkan implementation of [`GraphicsApi`], backing GPU pool requests with
//! real external-memory allocations.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use ash::vk;

use super::super::traits::{CpuView, GraphicsApi};
use super::buffer::VulkanCpuView;
use crate::os;

#[cfg(unix)]
const EXTERNAL_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_FD;
#[cfg(windows)]
const EXTERNAL_HANDLE_TYPE: vk::ExternalMemoryHandleTypeFlags =
    vk::ExternalMemoryHandleTypeFlags::OPAQUE_WIN32;

struct VulkanAllocation {
    buffer: vk::Buffer,
    memory: vk::DeviceMemory,
    size: u64,
    device_local: bool,
}

/// A [`GraphicsApi`] backed by a Vulkan device, exporting allocations via
/// `VK_KHR_external_memory_fd` (POSIX) or `VK_KHR_external_memory_win32`
/// (Windows) so another process can import the same memory.
pub struct VulkanGraphicsApi {
    device: Arc<ash::Device>,
    memory_properties: vk::PhysicalDeviceMemoryProperties,
    #[cfg(unix)]
    external_memory_fd: ash::extensions::khr::ExternalMemoryFd,
    #[cfg(windows)]
    external_memory_win32: ash::extensions::khr::ExternalMemoryWin32,
    allocations: Mutex<HashMap<u64, VulkanAllocation>>,
}

impl VulkanGraphicsApi {
    /// Build from an already-created device/instance pair. The device must
    /// have been created with the platform's external-memory extension
    /// (`VK_KHR_external_memory_fd` or `_win32`, plus `VK_KHR_external_memory`)
    /// enabled.
    pub fn new(
        instance: &ash::Instance,
        device: Arc<ash::Device>,
        physical_device: vk::PhysicalDevice,
    ) -> Self {
        let memory_properties =
            unsafe { instance.get_physical_device_memory_properties(physical_device) };

        Self {
            #[cfg(unix)]
            external_memory_fd: ash::extensions::khr::ExternalMemoryFd::new(instance, &device),
            #[cfg(windows)]
            external_memory_win32: ash::extensions::khr::ExternalMemoryWin32::new(
                instance, &device,
            ),
            device,
            memory_properties,
            allocations: Mutex::new(HashMap::new()),
        }
    }

    fn find_memory_type(&self, type_filter: u32, device_local: bool) -> Option<u32> {
        let wanted = if device_local {
            vk::MemoryPropertyFlags::DEVICE_LOCAL
        } else {
            vk::MemoryPropertyFlags::HOST_VISIBLE | vk::MemoryPropertyFlags::HOST_COHERENT
        };

        (0..self.memory_properties.memory_type_count).find(|&i| {
            let bit_set = (type_filter & (1 << i)) != 0;
            let properties = self.memory_properties.memory_types[i as usize].property_flags;
            bit_set && properties.contains(wanted)
        })
    }

    #[cfg(unix)]
    fn export_handle(&self, memory: vk::DeviceMemory) -> Option<u64> {
        let info = vk::MemoryGetFdInfoKHR::builder()
            .memory(memory)
            .handle_type(EXTERNAL_HANDLE_TYPE);
        unsafe { self.external_memory_fd.get_memory_fd(&info).ok() }.map(|fd| fd as u64)
    }

    #[cfg(windows)]
    fn export_handle(&self, memory: vk::DeviceMemory) -> Option<u64> {
        let info = vk::MemoryGetWin32HandleInfoKHR::builder()
            .memory(memory)
            .handle_type(EXTERNAL_HANDLE_TYPE);
        unsafe { self.external_memory_win32.get_memory_win32_handle(&info).ok() }
            .map(|h| h as u64)
    }

    #[cfg(unix)]
    fn import_handle(&self, os_handle: u64, alloc_size: u64, memory_type_index: u32) -> Option<vk::DeviceMemory> {
        let mut import_info = vk::ImportMemoryFdInfoKHR::builder()
            .handle_type(EXTERNAL_HANDLE_TYPE)
            .fd(os_handle as i32);
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(alloc_size)
            .memory_type_index(memory_type_index)
            .push_next(&mut import_info);
        unsafe { self.device.allocate_memory(&alloc_info, None).ok() }
    }

    #[cfg(windows)]
    fn import_handle(&self, os_handle: u64, alloc_size: u64, memory_type_index: u32) -> Option<vk::DeviceMemory> {
        let mut import_info = vk::ImportMemoryWin32HandleInfoKHR::builder()
            .handle_type(EXTERNAL_HANDLE_TYPE)
            .handle(os_handle as _);
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(alloc_size)
            .memory_type_index(memory_type_index)
            .push_next(&mut import_info);
        unsafe { self.device.allocate_memory(&alloc_info, None).ok() }
    }
}

impl GraphicsApi for VulkanGraphicsApi {
    fn is_active(&self) -> bool {
        true
    }

    fn allocate(&self, n: u64, device_local: bool) -> Option<(u64, u32)> {
        let mut external_info = vk::ExternalMemoryBufferCreateInfo::builder()
            .handle_types(EXTERNAL_HANDLE_TYPE);
        let buffer_info = vk::BufferCreateInfo::builder()
            .size(n)
            .usage(
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .push_next(&mut external_info);

        let buffer = unsafe { self.device.create_buffer(&buffer_info, None).ok()? };
        let requirements = unsafe { self.device.get_buffer_memory_requirements(buffer) };
        let memory_type_index = self.find_memory_type(requirements.memory_type_bits, device_local)?;

        let mut export_info =
            vk::ExportMemoryAllocateInfo::builder().handle_types(EXTERNAL_HANDLE_TYPE);
        let alloc_info = vk::MemoryAllocateInfo::builder()
            .allocation_size(requirements.size)
            .memory_type_index(memory_type_index)
            .push_next(&mut export_info);

        let memory = unsafe {
            match self.device.allocate_memory(&alloc_info, None) {
                Ok(m) => m,
                Err(_) => {
                    self.device.destroy_buffer(buffer, None);
                    return None;
                }
            }
        };

        if unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.is_err() {
            unsafe {
                self.device.free_memory(memory, None);
                self.device.destroy_buffer(buffer, None);
            }
            return None;
        }

        let Some(handle) = self.export_handle(memory) else {
            unsafe {
                self.device.free_memory(memory, None);
                self.device.destroy_buffer(buffer, None);
            }
            return None;
        };

        self.allocations.lock().unwrap().insert(
            handle,
            VulkanAllocation {
                buffer,
                memory,
                size: requirements.size,
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

        let ptr = unsafe {
            self.device
                .map_memory(alloc.memory, 0, alloc.size, vk::MemoryMapFlags::empty())
                .ok()?
        } as *mut u8;

        Some(Box::new(unsafe {
            VulkanCpuView::new(Arc::clone(&self.device), alloc.memory, ptr, alloc.size as usize)
        }))
    }

    fn free(&self, handle: u64) {
        let mut allocations = self.allocations.lock().unwrap();
        if let Some(alloc) = allocations.remove(&handle) {
            unsafe {
                self.device.free_memory(alloc.memory, None);
                self.device.destroy_buffer(alloc.buffer, None);
            }
        }
    }

    fn duplicate_handle(&self, origin_pid: u32, handle: u64, size: u64, memory_type_index: u32) -> Option<u64> {
        let os_handle = os::duplicate_handle(origin_pid, handle)?;
        let memory = self.import_handle(os_handle, size, memory_type_index)?;

        let buffer_info = vk::BufferCreateInfo::builder()
            .size(size)
            .usage(
                vk::BufferUsageFlags::STORAGE_BUFFER
                    | vk::BufferUsageFlags::TRANSFER_SRC
                    | vk::BufferUsageFlags::TRANSFER_DST,
            )
            .sharing_mode(vk::SharingMode::EXCLUSIVE);
        let buffer = match unsafe { self.device.create_buffer(&buffer_info, None) } {
            Ok(b) => b,
            Err(_) => {
                unsafe { self.device.free_memory(memory, None) };
                return None;
            }
        };
        if unsafe { self.device.bind_buffer_memory(buffer, memory, 0) }.is_err() {
            unsafe {
                self.device.destroy_buffer(buffer, None);
                self.device.free_memory(memory, None);
            }
            return None;
        }

        self.allocations.lock().unwrap().insert(
            os_handle,
            VulkanAllocation {
                buffer,
                memory,
                size,
                device_local: false,
            },
        );
        Some(os_handle)
    }
}

impl Drop for VulkanGraphicsApi {
    fn drop(&mut self) {
        let mut allocations = self.allocations.lock().unwrap();
        for (_, alloc) in allocations.drain() {
            unsafe {
                self.device.free_memory(alloc.memory, None);
                self.device.destroy_buffer(alloc.buffer, None);
            }
        }
    }
}
