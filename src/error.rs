//! Exceptional error cases (`§3.1`/`§7`).
//!
//! Everything else in the error taxonomy - budget exhaustion, an inactive
//! graphics API, duplication failure, segment invalidation, peer death - is
//! non-exceptional and surfaces only as an empty return value plus a
//! diagnostic (see [`crate::diagnostics`]). `PoolError` covers the narrow
//! set of cases that genuinely can't be represented that way: malformed
//! configuration, a segment that can't be opened at all, and a poisoned
//! local mutex.

use std::fmt;

/// Errors returned from the small number of operations that can fail
/// outright rather than degrade to local-only behavior.
#[derive(Debug)]
pub enum PoolError {
    /// The underlying segment could not be created or opened.
    SegmentOpenFailed,
    /// The process-local handle-cache mutex was poisoned by a panicking
    /// holder.
    LocalMutexPoisoned,
    /// The OS handle-duplication syscall failed.
    HandleDuplicationSyscallFailed(std::io::Error),
    /// A `PoolConfig` field failed validation.
    InvalidConfig(&'static str),
}

impl fmt::Display for PoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolError::SegmentOpenFailed => write!(f, "failed to open or create the shared segment"),
            PoolError::LocalMutexPoisoned => write!(f, "local handle-cache mutex poisoned"),
            PoolError::HandleDuplicationSyscallFailed(err) => {
                write!(f, "handle duplication syscall failed: {}", err)
            }
            PoolError::InvalidConfig(reason) => write!(f, "invalid PoolConfig: {}", reason),
        }
    }
}

impl std::error::Error for PoolError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            PoolError::HandleDuplicationSyscallFailed(err) => Some(err),
            _ => None,
        }
    }
}
