//! Cross-process robust mutex abstraction.
//!
//! A [`Segment`](crate::segment::Segment) backend hands out `CrossProcessMutex`
//! instances to guard shared state (`Auditor.mutex`, `Pool.buffers_mutex`,
//! `Pool.sizes_mutex`). The lock must cope with owner death: a process that
//! crashes while holding the lock must not wedge every other attacher.
//!
//! The real backend ([`crate::segment::shm::ShmSegment`]) delegates to
//! `raw_sync`'s OS-robust futex/mutex primitives where the platform supports
//! them. Backends that can't rely on OS robustness fall back to
//! [`OwnerPidGuard`]: a plain mutex plus an atomic owner-PID field, recovered
//! by the liveness loop (`§4.8`) rather than by the lock itself, exactly as
//! the specification's design notes call for.

use std::sync::atomic::{AtomicU32, Ordering};

/// A mutex that can be acquired from any process attached to the same segment.
///
/// Implementations must guarantee that if the owning process dies while
/// holding the lock, a later call still makes progress (possibly after the
/// auditor has invalidated the segment) rather than blocking forever.
pub trait CrossProcessMutex: Send + Sync {
    /// Run `f` with the lock held, returning its result.
    fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R;

    /// PID currently recorded as holding the lock, if any. Best-effort:
    /// only meaningful for backends that track ownership (see
    /// [`OwnerPidGuard`]); OS-robust backends may always return `None`.
    fn current_owner(&self) -> Option<u32> {
        None
    }
}

/// Owner-PID-tracking fallback used when the platform has no native
/// robust-mutex primitive. Pairs a local-process mutex with an atomic field
/// recording which PID currently holds the lock, so the liveness loop
/// (`§4.8`) has something to cross-reference against `Auditor.processes`
/// when deciding whether a long-held lock belongs to a dead peer.
pub struct OwnerPidGuard {
    owner_pid: AtomicU32,
    inner: crate::sync::mutex::Mutex<()>,
}

impl OwnerPidGuard {
    /// Create a new, currently-unowned guard.
    pub fn new() -> Self {
        Self {
            owner_pid: AtomicU32::new(0),
            inner: crate::sync::mutex::Mutex::new(()),
        }
    }
}

impl Default for OwnerPidGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl CrossProcessMutex for OwnerPidGuard {
    fn with_lock<R>(&self, f: impl FnOnce() -> R) -> R {
        let _guard = self.inner.lock();
        self.owner_pid
            .store(std::process::id(), Ordering::Release);
        let result = f();
        self.owner_pid.store(0, Ordering::Release);
        result
    }

    fn current_owner(&self) -> Option<u32> {
        match self.owner_pid.load(Ordering::Acquire) {
            0 => None,
            pid => Some(pid),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owner_pid_recorded_while_held() {
        let guard = OwnerPidGuard::new();
        assert_eq!(guard.current_owner(), None);
        guard.with_lock(|| {
            assert_eq!(guard.current_owner(), Some(std::process::id()));
        });
        assert_eq!(guard.current_owner(), None);
    }

    #[test]
    fn with_lock_returns_closure_value() {
        let guard = OwnerPidGuard::new();
        let value = guard.with_lock(|| 42);
        assert_eq!(value, 42);
    }
}
