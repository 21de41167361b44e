//! C8 - the background liveness loop: periodically re-audits the segment,
//! and on failure nukes the four named objects and sets the sticky invalid
//! flag (`§4.8`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crate::auditor::Auditor;
use crate::segment::Segment;

/// A running liveness loop. Dropping it sets the stop signal and joins the
/// background thread, matching the teacher's pattern of tying a worker
/// thread's lifetime to its handle.
pub struct LivenessLoop {
    stop_signal: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl LivenessLoop {
    /// Spawn the loop: sleep `poll_interval`, re-audit, repeat, until either
    /// `stop()`/drop fires the stop signal or an audit fails.
    pub fn spawn(
        segment: Arc<dyn Segment>,
        auditor: Arc<Auditor>,
        poll_interval: Duration,
    ) -> Self {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_thread = Arc::clone(&stop_signal);

        let handle = std::thread::Builder::new()
            .name("hybridpool-liveness".into())
            .spawn(move || {
                while !stop_signal_thread.load(Ordering::Acquire) {
                    std::thread::sleep(poll_interval);
                    if stop_signal_thread.load(Ordering::Acquire) {
                        break;
                    }
                    if !auditor.audit() {
                        crate::hp_emit!(HP301);
                        Auditor::nuke(segment.as_ref());
                        auditor.invalidate();
                        break;
                    }
                }
            })
            .expect("spawn liveness thread");

        Self {
            stop_signal,
            handle: Some(handle),
        }
    }

    /// Signal the loop to stop and wait for it to exit.
    pub fn stop(&mut self) {
        self.stop_signal.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for LivenessLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::dummy::DummySegment;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    #[test]
    fn loop_invalidates_auditor_on_peer_death() {
        let seg: Arc<dyn Segment> = Arc::new(DummySegment::new());
        let mut alive = HashMap::new();
        alive.insert(222u32, false);
        let alive = StdMutex::new(alive);
        let liveness: crate::auditor::LivenessCheck =
            Arc::new(move |pid| *alive.lock().unwrap().get(&pid).unwrap_or(&true));

        let auditor = Arc::new(Auditor::with_liveness_check(seg.as_ref(), liveness));
        auditor.attach_fake(222);

        let mut loop_handle =
            LivenessLoop::spawn(Arc::clone(&seg), Arc::clone(&auditor), Duration::from_millis(5));

        for _ in 0..200 {
            if auditor.is_invalid() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        assert!(auditor.is_invalid());
        loop_handle.stop();
    }
}
