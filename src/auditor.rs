//! C2 - the Auditor: tracks attached processes and the segment's global
//! validity flag.
//!
//! `audit() = !invalid ∧ ∀p: p.isAlive()`. `invalid` is a sticky flag: once
//! set it never clears. `nuke` destroys the four named shared objects and is
//! used only to recover a segment already known to be invalid.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::os;
use crate::segment::Segment;
use crate::sync::robust::CrossProcessMutex;

/// A liveness predicate for a PID. Defaults to the real OS check
/// ([`os::is_pid_alive`]); tests substitute a fake table so peer-crash
/// scenarios (S5) are reproducible without forking real processes.
pub type LivenessCheck = Arc<dyn Fn(u32) -> bool + Send + Sync>;

/// One attached process, identified by PID.
#[derive(Debug, Clone, Copy)]
pub struct ProcessRecord {
    pid: u32,
}

impl ProcessRecord {
    /// `true` if this record belongs to the calling process.
    pub fn is_self(&self) -> bool {
        self.pid == std::process::id()
    }

    /// The PID this record identifies.
    pub fn pid(&self) -> u32 {
        self.pid
    }
}

/// The shared Auditor object, named `"Auditor"` in the segment.
pub struct Auditor {
    mutex: Box<dyn CrossProcessMutex>,
    processes: UnsafeCell<Vec<ProcessRecord>>,
    invalid: AtomicBool,
    liveness: LivenessCheck,
}

// `processes` is only ever touched while `mutex` is held.
unsafe impl Send for Auditor {}
unsafe impl Sync for Auditor {}

impl Auditor {
    /// Construct a fresh, empty, valid Auditor using the real OS liveness
    /// check.
    pub fn new(segment: &dyn Segment) -> Self {
        Self::with_liveness_check(segment, Arc::new(os::is_pid_alive))
    }

    /// Construct with a custom liveness predicate, used by tests to
    /// simulate peer crashes against [`crate::segment::dummy::DummySegment`].
    pub fn with_liveness_check(segment: &dyn Segment, liveness: LivenessCheck) -> Self {
        Self {
            mutex: segment.new_mutex(),
            processes: UnsafeCell::new(Vec::new()),
            invalid: AtomicBool::new(false),
            liveness,
        }
    }

    /// `!invalid ∧ ∀p: p.isAlive()`.
    pub fn audit(&self) -> bool {
        if self.invalid.load(Ordering::Acquire) {
            return false;
        }
        self.mutex.with_lock(|| {
            let processes = unsafe { &*self.processes.get() };
            processes.iter().all(|p| (self.liveness)(p.pid))
        })
    }

    /// Run `f` with the Auditor's mutex held and the process list available
    /// for mutation. Used by attach (`§4.1`) and detach (`§4.9`).
    pub fn with_processes<R>(&self, f: impl FnOnce(&mut Vec<ProcessRecord>) -> R) -> R {
        self.mutex.with_lock(|| {
            let processes = unsafe { &mut *self.processes.get() };
            f(processes)
        })
    }

    /// Append a record for `pid`. `PoolHandle::attach` calls this with
    /// either the real `std::process::id()` or an injected local PID (the
    /// latter only to let tests simulate several distinct processes over a
    /// shared [`crate::segment::dummy::DummySegment`]).
    pub fn attach_pid(&self, pid: u32) {
        self.with_processes(|processes| processes.push(ProcessRecord { pid }));
    }

    /// Append a record for the calling process.
    pub fn attach_self(&self) {
        self.attach_pid(std::process::id());
    }

    /// Attach a record for a fake PID, used only by tests to simulate a
    /// second process over a shared [`crate::segment::dummy::DummySegment`].
    pub fn attach_fake(&self, pid: u32) {
        self.attach_pid(pid);
    }

    /// Remove the first record matching `pid`.
    pub fn detach(&self, pid: u32) {
        self.with_processes(|processes| {
            if let Some(i) = processes.iter().position(|p| p.pid == pid) {
                processes.remove(i);
            }
        });
    }

    /// Remove every process record (force-clean on detach, test/debug use).
    pub fn clear_all(&self) {
        self.with_processes(|processes| processes.clear());
    }

    /// `true` once `processes` is empty - the caller is the last process
    /// attached.
    pub fn is_empty(&self) -> bool {
        self.with_processes(|processes| processes.is_empty())
    }

    /// Set the sticky invalid flag. Never cleared once set (invariant 4).
    pub fn invalidate(&self) {
        self.invalid.store(true, Ordering::Release);
    }

    /// Current value of the sticky invalid flag.
    pub fn is_invalid(&self) -> bool {
        self.invalid.load(Ordering::Acquire)
    }

    /// Destroy the four named shared objects, recovering a segment already
    /// known to be invalid.
    pub fn nuke(segment: &dyn Segment) {
        segment.destroy_pool(crate::POOL_CPU_NAME);
        segment.destroy_pool(crate::POOL_GPU_NAME);
        segment.destroy_pool(crate::POOL_GPU_DEVICE_LOCAL_NAME);
        segment.destroy_auditor(crate::AUDITOR_NAME);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::dummy::DummySegment;
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn fake_liveness(alive: HashMap<u32, bool>) -> LivenessCheck {
        let alive = Mutex::new(alive);
        Arc::new(move |pid| *alive.lock().unwrap().get(&pid).unwrap_or(&true))
    }

    #[test]
    fn audit_holds_when_all_alive() {
        let seg = DummySegment::new();
        let auditor = Auditor::with_liveness_check(&seg, fake_liveness(HashMap::new()));
        auditor.attach_fake(111);
        auditor.attach_fake(222);
        assert!(auditor.audit());
    }

    #[test]
    fn audit_fails_when_peer_dead() {
        let seg = DummySegment::new();
        let mut alive = HashMap::new();
        alive.insert(222, false);
        let auditor = Auditor::with_liveness_check(&seg, fake_liveness(alive));
        auditor.attach_fake(111);
        auditor.attach_fake(222);
        assert!(!auditor.audit());
    }

    #[test]
    fn invalidate_is_sticky() {
        let seg = DummySegment::new();
        let auditor = Auditor::with_liveness_check(&seg, fake_liveness(HashMap::new()));
        assert!(auditor.audit());
        auditor.invalidate();
        assert!(!auditor.audit());
        assert!(auditor.is_invalid());
    }
}
