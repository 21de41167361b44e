//! Introspection snapshots (`§3.1` supplemented feature): point-in-time
//! views of pool occupancy, exposed read-only so callers can build metrics
//! without reaching into pool internals.

use crate::pool::Pool;
use crate::sync::atomics::AtomicCounter;

/// A snapshot of one CPU or GPU pool's occupancy.
#[derive(Debug, Clone, Copy, Default)]
pub struct PoolStats {
    /// Bytes currently charged against the pool's budget.
    pub allocated_bytes: u64,
    /// Number of entries in the allocation registry (free + in-use).
    pub entry_count: usize,
    /// Configured byte budget.
    pub budget: u64,
}

impl PoolStats {
    pub(crate) fn snapshot(pool: &Pool, budget: u64) -> Self {
        Self {
            allocated_bytes: pool.allocated(),
            entry_count: pool.entry_count(),
            budget,
        }
    }

    /// Fraction of the budget currently charged, in `[0.0, 1.0]` (can
    /// exceed 1.0 only if the budget was lowered after allocations were
    /// already charged against the old one).
    pub fn utilization(&self) -> f64 {
        if self.budget == 0 {
            return 0.0;
        }
        self.allocated_bytes as f64 / self.budget as f64
    }
}

/// Combined CPU + GPU occupancy for a [`crate::PoolHandle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct GpuPoolStats {
    pub host_visible: PoolStats,
    pub device_local: PoolStats,
}

/// Running counters updated on every request, independent of pool
/// occupancy - useful for dashboards that want rates rather than snapshots.
#[derive(Default)]
pub struct PoolCounters {
    pub cpu_requests: AtomicCounter,
    pub cpu_local_fallbacks: AtomicCounter,
    pub gpu_requests: AtomicCounter,
    pub gpu_allocate_failures: AtomicCounter,
}
