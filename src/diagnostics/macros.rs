//! Diagnostic macros for user-facing API.
//!
//! These provide a clean, rustc-like diagnostic experience for the
//! non-exceptional conditions described in `§7`.

/// Emit a diagnostic built inline.
///
/// # Example
///
/// ```rust,ignore
/// hp_diagnostic!(
///     Warning,
///     code = "HP001",
///     message = "requestSHM budget exceeded, falling back to local allocation",
///     note = "increase cpu_budget if this is frequent"
/// );
/// ```
#[macro_export]
macro_rules! hp_diagnostic {
    (
        $kind:ident,
        code = $code:expr,
        message = $msg:expr
        $(, note = $note:expr)?
    ) => {{
        let diag = $crate::diagnostics::Diagnostic {
            kind: $crate::diagnostics::DiagnosticKind::$kind,
            code: $code,
            message: $msg,
            note: None $(.or(Some($note)))?,
        };
        $crate::diagnostics::emit::emit(&diag);
    }};
}

/// Emit a predefined diagnostic by its constant name.
///
/// # Example
///
/// ```rust,ignore
/// hp_emit!(HP001);
/// ```
#[macro_export]
macro_rules! hp_emit {
    ($code:ident) => {{
        $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
    }};
}

/// Emit a predefined diagnostic, rate-limited per call site (see
/// [`crate::diagnostics::ratelimit`]). Use this for conditions that can
/// repeat on every pool operation (budget exhaustion, inactive graphics
/// API) so a busy pool doesn't flood the log.
#[macro_export]
macro_rules! hp_emit_ratelimited {
    ($code:ident) => {{
        static SITE: $crate::diagnostics::ratelimit::RateLimitSite =
            $crate::diagnostics::ratelimit::RateLimitSite::new();
        if SITE.allow() {
            $crate::diagnostics::emit::emit(&$crate::diagnostics::$code);
        }
    }};
}

/// Assert a condition or emit a diagnostic.
///
/// # Example
///
/// ```rust,ignore
/// hp_assert!(segment_valid, HP002);
/// ```
#[macro_export]
macro_rules! hp_assert {
    ($cond:expr, $code:ident) => {{
        if !$cond {
            $crate::hp_emit!($code);
        }
    }};
}

// Re-export macros at crate root for convenience.
pub use crate::{hp_assert, hp_diagnostic, hp_emit, hp_emit_ratelimited};
