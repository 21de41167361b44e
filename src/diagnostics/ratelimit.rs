//! Per-call-site rate limiting for repeated diagnostics.
//!
//! Conditions like budget exhaustion (`HP001`) or an inactive graphics API
//! (`HP101`) can legitimately fire on every single pool request once the
//! steady state is reached. Emitting one log line per request would drown
//! out everything else, so [`hp_emit_ratelimited!`](crate::hp_emit_ratelimited)
//! routes through a [`RateLimitSite`] that only lets one emission through per
//! window.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Minimum gap between two emissions from the same call site.
const DEFAULT_WINDOW: Duration = Duration::from_secs(5);

/// A static, per-call-site gate. One instance per `hp_emit_ratelimited!`
/// invocation site, created with `const fn new()` so it can live in a
/// function-local `static`.
pub struct RateLimitSite {
    last_emit_millis: AtomicU64,
}

impl RateLimitSite {
    /// Create a new, never-fired gate.
    pub const fn new() -> Self {
        Self {
            last_emit_millis: AtomicU64::new(0),
        }
    }

    /// Returns `true` if the caller should emit now, recording the attempt.
    /// Uses a process-start-relative clock rather than wall time so this has
    /// no dependency on the system clock.
    pub fn allow(&self) -> bool {
        self.allow_with_window(DEFAULT_WINDOW)
    }

    fn allow_with_window(&self, window: Duration) -> bool {
        let now = process_relative_millis();
        let last = self.last_emit_millis.load(Ordering::Relaxed);
        if now.saturating_sub(last) < window.as_millis() as u64 {
            return false;
        }
        self.last_emit_millis
            .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
            .is_ok()
    }
}

impl Default for RateLimitSite {
    fn default() -> Self {
        Self::new()
    }
}

fn process_relative_millis() -> u64 {
    use std::sync::OnceLock;
    static START: OnceLock<Instant> = OnceLock::new();
    let start = *START.get_or_init(Instant::now);
    start.elapsed().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_call_always_allowed() {
        let site = RateLimitSite::new();
        assert!(site.allow_with_window(Duration::from_secs(60)));
    }

    #[test]
    fn second_call_within_window_denied() {
        let site = RateLimitSite::new();
        assert!(site.allow_with_window(Duration::from_secs(60)));
        assert!(!site.allow_with_window(Duration::from_secs(60)));
    }

    #[test]
    fn call_after_window_allowed() {
        let site = RateLimitSite::new();
        assert!(site.allow_with_window(Duration::from_millis(0)));
        std::thread::sleep(Duration::from_millis(5));
        assert!(site.allow_with_window(Duration::from_millis(1)));
    }
}
