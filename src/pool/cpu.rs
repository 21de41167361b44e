//! C3 - `requestSHM`: draw a byte buffer from (or append to) the shared CPU
//! pool, or fail if the budget would be exceeded.

use super::{Pool, PoolRecord};
use crate::segment::{Offset, Segment};

/// `requestSHM(n)` from `§4.3`.
///
/// The two mutexes are acquired at most one at a time: a free-list hit never
/// touches `sizes_mutex`, and a miss releases `buffers_mutex` before taking
/// `sizes_mutex`.
pub fn request_shm(
    pool: &Pool,
    segment: &dyn Segment,
    n: u64,
    cpu_budget: u64,
    max_shm_usage_frac: f64,
) -> Option<Offset> {
    if let Some(offset) = pool.pop_free(n) {
        return Some(offset);
    }

    pool.with_sizes(|sizes, allocated| {
        let cap = (cpu_budget as f64 * max_shm_usage_frac) as u64;
        if *allocated + n >= cap {
            return None;
        }
        let offset = segment.alloc_bytes(n);
        sizes.insert(offset, PoolRecord::Cpu { size: n });
        *allocated += n;
        Some(offset)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::dummy::DummySegment;

    #[test]
    fn first_two_requests_allocate_fresh() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let a = request_shm(&pool, &seg, 4096, 1 << 20, 0.9).unwrap();
        let b = request_shm(&pool, &seg, 4096, 1 << 20, 0.9).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.allocated(), 8192);
    }

    #[test]
    fn drop_then_request_reuses_offset() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        let a = request_shm(&pool, &seg, 1024, 1 << 20, 0.9).unwrap();
        pool.push_free(1024, a);
        let b = request_shm(&pool, &seg, 1024, 1 << 20, 0.9).unwrap();
        assert_eq!(a, b);
        assert_eq!(pool.allocated(), 1024);
    }

    #[test]
    fn budget_boundary_rejects_exactly_at_cap() {
        let seg = DummySegment::new();
        let pool = Pool::new(&seg);
        // cpu_budget = 1024, frac = 0.9 -> cap = 921 (S2 in the design notes).
        assert!(request_shm(&pool, &seg, 512, 1024, 0.9).is_some());
        assert!(request_shm(&pool, &seg, 512, 1024, 0.9).is_none());
    }
}
