//! The process-local fallback CPU allocator (`§4.4`): used when a stream is
//! gated off the shared pool, or when `requestSHM` fails because the
//! budget would be exceeded. Plain heap memory, never touches the segment
//! or any pool bookkeeping.

use std::alloc::{self, Layout};

use crate::handles::CpuBuffer;

fn layout_for(n: usize) -> Layout {
    Layout::array::<u8>(n).expect("buffer size overflows isize")
}

/// Allocate `n` zeroed bytes from the process heap, wrapped as a
/// [`CpuBuffer`] whose deleter frees it on drop rather than returning it to
/// any pool free-list.
pub fn alloc(n: usize) -> CpuBuffer {
    if n == 0 {
        return CpuBuffer::from_local(std::ptr::NonNull::dangling().as_ptr(), 0);
    }
    let layout = layout_for(n);
    let ptr = unsafe { alloc::alloc_zeroed(layout) };
    if ptr.is_null() {
        alloc::handle_alloc_error(layout);
    }
    CpuBuffer::from_local(ptr, n)
}

pub(crate) fn free(ptr: *mut u8, len: usize) {
    if len == 0 {
        return;
    }
    unsafe { alloc::dealloc(ptr, layout_for(len)) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_zeroed_buffer_of_requested_length() {
        let buffer = alloc(16);
        assert_eq!(buffer.len(), 16);
        assert!(buffer.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn zero_length_alloc_is_well_formed() {
        let buffer = alloc(0);
        assert!(buffer.is_empty());
    }
}
