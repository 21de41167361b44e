//! Synchronization primitives.
//!
//! `mutex` is a thin wrapper over std or parking_lot, used for the
//! process-local `memoryMutex_` guarding the handle caches in [`crate::handles`].
//! `robust` defines the cross-process mutex interface a [`crate::segment::Segment`]
//! backend must provide, plus an owner-PID-based fallback for backends that
//! don't expose true robust (owner-death-aware) locks.

pub mod atomics;
pub(crate) mod mutex;
pub mod robust;
