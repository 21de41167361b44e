//! C7 - the stream gate: a per-stream boolean deciding whether a CPU
//! request is routed to the shared pool or to the local fallback allocator.

use std::collections::HashMap;

use crate::sync::mutex::Mutex;

/// An opaque stream identifier, comparable by value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StreamId(pub u64);

/// Per-stream routing table (`§4.4`). A stream absent from the table is
/// treated as active (default-shared) - only an explicit
/// `activate_stream(id, false)` diverts it to the local allocator.
pub struct StreamGate {
    active: Mutex<HashMap<StreamId, bool>>,
}

impl StreamGate {
    /// Construct an empty gate - every stream starts active.
    pub fn new() -> Self {
        Self {
            active: Mutex::new(HashMap::new()),
        }
    }

    /// Whether `id` currently routes to the shared pool.
    pub fn is_active(&self, id: StreamId) -> bool {
        *self.active.lock().get(&id).unwrap_or(&true)
    }

    /// Set `id`'s routing bit. Idempotent.
    pub fn activate_stream(&self, id: StreamId, active: bool) {
        self.active.lock().insert(id, active);
    }
}

impl Default for StreamGate {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_stream_defaults_active() {
        let gate = StreamGate::new();
        assert!(gate.is_active(StreamId(1)));
    }

    #[test]
    fn deactivating_then_reactivating_is_idempotent() {
        let gate = StreamGate::new();
        gate.activate_stream(StreamId(1), false);
        assert!(!gate.is_active(StreamId(1)));
        gate.activate_stream(StreamId(1), false);
        assert!(!gate.is_active(StreamId(1)));
        gate.activate_stream(StreamId(1), true);
        assert!(gate.is_active(StreamId(1)));
    }
}
