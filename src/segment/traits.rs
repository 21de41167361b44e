//! The shared-segment collaborator trait (`§6`): locate-or-construct named
//! objects, allocate/free raw byte ranges, translate between process-local
//! addresses and process-independent offsets, and mint cross-process
//! mutexes. Deliberately out of scope per the purpose statement - the pool
//! core depends only on this trait.
//!
//! The specification describes `find_or_construct` as generic over the
//! object type, but this crate only ever names two concrete shared types
//! (`Pool` and `Auditor`), so the trait exposes one method per type rather
//! than a generic method - keeping `Segment` object-safe (`&dyn Segment` is
//! threaded through the whole pool core, per `§4.1`).

use std::sync::Arc;

use crate::auditor::Auditor;
use crate::pool::Pool;
use crate::sync::robust::CrossProcessMutex;

/// An offset into the segment: stable across processes, unlike a raw
/// pointer (each process maps the segment at a different base address).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Offset(pub u64);

impl Offset {
    /// The null offset, used as a sentinel for "no allocation".
    pub const NULL: Offset = Offset(0);
}

/// A named, lazily-constructed object living in the segment. One instance
/// of each named object (`"MemoryPool"`, `"MemoryPoolGPU"`,
/// `"MemoryPoolGPUDeviceLocal"`, `"Auditor"`) is shared by every process
/// attached to the segment.
pub trait Segment: Send + Sync {
    /// Find the named `Pool`, constructing a fresh one if this is the first
    /// process to look it up.
    fn find_or_construct_pool(&self, name: &'static str) -> Arc<Pool>;

    /// Find the named `Auditor`, constructing a fresh one if this is the
    /// first process to look it up.
    fn find_or_construct_auditor(&self, name: &'static str) -> Arc<Auditor>;

    /// Destroy the named pool. Used only by `Auditor::nuke`.
    fn destroy_pool(&self, name: &'static str);

    /// Destroy the named auditor. Used only by `Auditor::nuke`.
    fn destroy_auditor(&self, name: &'static str);

    /// Allocate `n` raw bytes inside the segment, returning their offset.
    fn alloc_bytes(&self, n: u64) -> Offset;

    /// Release a previously allocated byte range. Only valid to call once
    /// no process holds a reference to it - callers must hold the owning
    /// pool's `sizes_mutex` or be at the segment-nuke path.
    fn dealloc_bytes(&self, offset: Offset);

    /// Translate an offset into a process-local pointer.
    fn address_of(&self, offset: Offset) -> *mut u8;

    /// Translate a process-local pointer (previously returned by
    /// `address_of` in this same process) back into its offset.
    fn offset_of(&self, ptr: *mut u8) -> Offset;

    /// Mint a new cross-process mutex living in the segment.
    fn new_mutex(&self) -> Box<dyn CrossProcessMutex>;
}
