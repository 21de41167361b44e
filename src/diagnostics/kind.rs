//! Diagnostic kinds and core types.
//!
//! Mirrors rustc's diagnostic levels for familiar UX.

/// Severity level of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// A hard error - something is definitely wrong.
    Error,
    /// A warning - a non-exceptional condition from `§7` (budget exhausted,
    /// graphics inactive, duplication failed, segment invalidated, peer died).
    Warning,
    /// Additional context about another diagnostic.
    Note,
}

impl DiagnosticKind {
    /// Display prefix for this kind.
    pub fn prefix(&self) -> &'static str {
        match self {
            DiagnosticKind::Error => "error",
            DiagnosticKind::Warning => "warning",
            DiagnosticKind::Note => "note",
        }
    }
}

/// A diagnostic message with code, message, and optional context.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    /// Severity level.
    pub kind: DiagnosticKind,
    /// Diagnostic code (e.g., "HP001").
    pub code: &'static str,
    /// Primary message.
    pub message: &'static str,
    /// Optional additional context.
    pub note: Option<&'static str>,
}

impl Diagnostic {
    /// Create a new warning diagnostic.
    pub const fn warning(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Warning,
            code,
            message,
            note: None,
        }
    }

    /// Create a new error diagnostic.
    pub const fn error(code: &'static str, message: &'static str) -> Self {
        Self {
            kind: DiagnosticKind::Error,
            code,
            message,
            note: None,
        }
    }

    /// Attach a note.
    pub const fn with_note(mut self, note: &'static str) -> Self {
        self.note = Some(note);
        self
    }
}

// =============================================================================
// Predefined diagnostics (HP0xx - CPU pool / budget)
// =============================================================================

/// HP001: CPU budget exhausted, request fell back to the local allocator.
pub const HP001: Diagnostic = Diagnostic::warning(
    "HP001",
    "requestSHM budget exceeded, falling back to local allocation",
).with_note("increase cpu_budget or max_shm_usage_frac in PoolConfig if this is frequent");

/// HP002: Segment invalidated, pool operating in best-effort local mode.
pub const HP002: Diagnostic = Diagnostic::warning(
    "HP002",
    "segment invalidated, all pool operations are now best-effort local",
).with_note("a peer died or nuke() was invoked; the process should restart to reattach");

// =============================================================================
// Predefined diagnostics (HP1xx - GPU pool / graphics API)
// =============================================================================

/// HP101: Graphics API inactive, GPU request returned an empty buffer.
pub const HP101: Diagnostic = Diagnostic::warning(
    "HP101",
    "graphics API inactive, GPU buffer request returned empty",
);

/// HP102: GPU allocation failed (budget or backend error).
pub const HP102: Diagnostic = Diagnostic::warning(
    "HP102",
    "GPU allocation failed, returning empty buffer",
).with_note("check gpu_budget in PoolConfig or the backend's allocate() result");

// =============================================================================
// Predefined diagnostics (HP2xx - cross-process duplication)
// =============================================================================

/// HP201: Handle duplication failed in createLocal.
pub const HP201: Diagnostic = Diagnostic::warning(
    "HP201",
    "GPU handle duplication failed, shared wrapper not recorded locally",
).with_note("origin process may have exited before the duplication syscall ran");

// =============================================================================
// Predefined diagnostics (HP3xx - auditor / liveness)
// =============================================================================

/// HP301: Peer death detected by the liveness loop.
pub const HP301: Diagnostic = Diagnostic::warning(
    "HP301",
    "liveness loop detected a dead peer, invalidating segment",
);

/// HP302: nuke() failed after invalidation.
pub const HP302: Diagnostic = Diagnostic::error(
    "HP302",
    "nuke() failed after invalidation, segment left unusable",
).with_note("processes attached to this segment must restart");

// =============================================================================
// Predefined diagnostics (HP9xx - internal)
// =============================================================================

/// HP901: Internal invariant violation.
pub const HP901: Diagnostic = Diagnostic::error(
    "HP901",
    "internal hybridpool invariant violation",
).with_note("this indicates a bug in hybridpool, please file an issue");
