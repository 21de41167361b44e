//! Diagnostics for hybridpool.
//!
//! This module provides rustc-style runtime diagnostics (severity + code +
//! message) for the non-exceptional error taxonomy the specification
//! requires in `§7`: budget exhaustion, graphics-inactive/allocate-failed,
//! handle-duplication failure, segment invalidation, and peer death. None of
//! these cross the API surface as an error return — they are observed only
//! through this diagnostic channel (stderr in debug builds, the `log` facade
//! always), which is exactly how the teacher crate's diagnostics worked for
//! its own non-fatal allocator conditions.
//!
//! ## Diagnostic codes
//!
//! | Code  | Meaning                         |
//! |-------|---------------------------------|
//! | HP0xx | CPU pool / budget issues        |
//! | HP1xx | GPU pool / graphics-API issues  |
//! | HP2xx | Cross-process duplication       |
//! | HP3xx | Auditor / liveness issues       |
//! | HP9xx | Internal errors                 |

pub mod kind;
pub mod emit;
pub mod macros;
pub(crate) mod ratelimit;

pub use kind::{Diagnostic, DiagnosticKind};
pub use emit::{emit, suppress_diagnostics, set_verbose, DiagnosticSink, CollectingSink};
pub use kind::{HP001, HP002, HP101, HP102, HP201, HP301, HP302, HP901};
