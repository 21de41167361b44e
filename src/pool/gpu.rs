//! C4 - `getGpuBufferFromPool`: the GPU free-list, segregated by origin
//! process since an exported handle is only cheaply reusable by the process
//! that allocated it.

use super::{Pool, PoolRecord};
use crate::gpu::{GpuBufferData, GpuBufferDataWithPID, GraphicsApi};
use crate::segment::{Offset, Segment};

/// `getGpuBufferFromPool(n, deviceLocal)` from `§4.5`.
///
/// Returns `None` if the graphics API is inactive, the fast path finds
/// nothing and the slow path's budget check or backend allocation fails.
pub fn get_gpu_buffer(
    pool: &Pool,
    segment: &dyn Segment,
    graphics: &dyn GraphicsApi,
    n: u64,
    device_local: bool,
    gpu_budget: u64,
    local_pid: u32,
) -> Option<(Offset, GpuBufferDataWithPID)> {
    if !graphics.is_active() {
        return None;
    }

    if let Some((offset, data)) = find_buffer(pool, n, local_pid) {
        return Some((offset, data));
    }

    allocate_fresh(pool, segment, graphics, n, device_local, gpu_budget, local_pid)
}

/// Fast path: a free-listed entry this process originated. Reusing a
/// foreign-origin handle would require re-duplicating it, which is more
/// expensive than allocating fresh, so the free-list is implicitly
/// segregated by origin (open question in the design notes: this can leak
/// foreign-origin slots until their origin detaches; this crate does not
/// compact across processes, matching the unresolved question rather than
/// guessing at an answer).
fn find_buffer(pool: &Pool, n: u64, local_pid: u32) -> Option<(Offset, GpuBufferDataWithPID)> {
    let origin_of: std::collections::HashMap<Offset, u32> = pool.with_sizes(|sizes, _| {
        sizes
            .iter()
            .filter_map(|(offset, record)| match record {
                PoolRecord::Gpu { data } if data.data.size == n => Some((*offset, data.origin_pid)),
                _ => None,
            })
            .collect()
    });

    let offset = pool.pop_free_where(n, |o| origin_of.get(&o).copied() == Some(local_pid))?;
    let data = pool.with_sizes(|sizes, _| match sizes.get(&offset) {
        Some(PoolRecord::Gpu { data }) => *data,
        _ => unreachable!("free-list entry must have a matching sizes record"),
    });
    Some((offset, data))
}

/// Slow path: ask the graphics API for a fresh allocation, charge it
/// against the GPU budget, and register a new (not free-listed) record.
fn allocate_fresh(
    pool: &Pool,
    segment: &dyn Segment,
    graphics: &dyn GraphicsApi,
    n: u64,
    device_local: bool,
    gpu_budget: u64,
    local_pid: u32,
) -> Option<(Offset, GpuBufferDataWithPID)> {
    pool.with_sizes(|sizes, allocated| {
        if *allocated + n >= gpu_budget {
            return None;
        }
        let (handle, memory_type_index) = graphics.allocate(n, device_local)?;
        let data = GpuBufferDataWithPID {
            data: GpuBufferData {
                handle,
                size: n,
                memory_type_index,
            },
            origin_pid: local_pid,
        };
        let offset = segment.alloc_bytes(n);
        sizes.insert(offset, PoolRecord::Gpu { data });
        *allocated += n;
        Some((offset, data))
    })
}

/// `cleanPool(pool, clearAllocations)` (`§4.9` step 6): under both pool
/// mutexes, free - via the graphics API - and destroy the shared record for
/// every free-list entry this process originated (only the origin may free
/// its own GPU allocation, invariant 7), then clear the free-lists
/// entirely. If `clear_allocations` (only true for the last attached
/// process), also return every remaining record's segment offset, subtract
/// its size, and clear the registry.
///
/// Free-list entries left behind by a foreign origin keep their `sizes`
/// record (their GPU memory is still live, just no longer reachable via any
/// free-list until their own origin process detaches) - the same
/// cross-process leak the GPU fast path's origin segregation already
/// documents as an open question.
pub fn clean_pool(
    pool: &Pool,
    segment: &dyn Segment,
    graphics: &dyn GraphicsApi,
    local_pid: u32,
    clear_allocations: bool,
) {
    pool.with_buffers(|buffers| {
        pool.with_sizes(|sizes, allocated| {
            for offsets in buffers.values() {
                for &offset in offsets.iter() {
                    if let Some(PoolRecord::Gpu { data }) = sizes.get(&offset) {
                        if data.origin_pid == local_pid {
                            graphics.free(data.data.handle);
                            sizes.remove(&offset);
                            segment.dealloc_bytes(offset);
                        }
                    }
                }
            }

            if clear_allocations {
                for offset in sizes.keys().copied().collect::<Vec<_>>() {
                    segment.dealloc_bytes(offset);
                }
                sizes.clear();
                *allocated = 0;
            }
        });
        buffers.clear();
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::DummyGraphicsApi;
    use crate::segment::dummy::DummySegment;

    #[test]
    fn fresh_allocation_then_reuse_by_same_pid() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let graphics = DummyGraphicsApi::new();

        let (offset_a, data_a) =
            get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 42).unwrap();
        pool.push_free(4096, offset_a);

        let (offset_b, data_b) =
            get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 42).unwrap();
        assert_eq!(offset_a, offset_b);
        assert_eq!(data_a.data.handle, data_b.data.handle);
    }

    #[test]
    fn foreign_origin_is_not_reused() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let graphics = DummyGraphicsApi::new();

        let (offset_a, _) = get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 1).unwrap();
        pool.push_free(4096, offset_a);

        let (offset_b, data_b) =
            get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 2).unwrap();
        assert_ne!(offset_a, offset_b);
        assert_eq!(data_b.origin_pid, 2);
    }

    #[test]
    fn clean_pool_frees_only_local_origin_free_list_entries() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let graphics = DummyGraphicsApi::new();

        let (offset_mine, data_mine) =
            get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 1).unwrap();
        let (offset_theirs, _) =
            get_gpu_buffer(&pool, &seg, &graphics, 8192, false, 1 << 24, 2).unwrap();
        pool.push_free(4096, offset_mine);
        pool.push_free(8192, offset_theirs);

        clean_pool(&pool, &seg, &graphics, 1, false);

        assert!(
            graphics.map(data_mine.data.handle, 4096, 1).is_none(),
            "origin-owned allocation was freed"
        );
        assert_eq!(pool.pop_free(4096), None, "free-lists are cleared unconditionally");
        assert_eq!(
            pool.entry_count(),
            1,
            "only the local-origin record was destroyed; the foreign one survives"
        );
    }

    #[test]
    fn clean_pool_with_clear_allocations_empties_the_registry() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let graphics = DummyGraphicsApi::new();

        let (offset_a, _) = get_gpu_buffer(&pool, &seg, &graphics, 4096, false, 1 << 24, 1).unwrap();
        pool.push_free(4096, offset_a);

        clean_pool(&pool, &seg, &graphics, 1, true);

        assert_eq!(pool.allocated(), 0);
        assert_eq!(pool.entry_count(), 0);
    }
}
