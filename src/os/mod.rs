//! OS-specific primitives: process liveness checks and cross-process GPU
//! handle duplication (`§6`).
//!
//! Handle duplication is platform-gated: Windows uses `DuplicateHandle`
//! between `OpenProcess`-obtained process handles; POSIX opens
//! `/proc/<pid>/fd/<fd>` with read-write access. Both return a handle owned
//! by the local process, to be freed later via the graphics API's `free`.

#[cfg(unix)]
pub mod unix;
#[cfg(windows)]
pub mod windows;

#[cfg(unix)]
pub use self::unix::{duplicate_handle, is_pid_alive};
#[cfg(windows)]
pub use self::windows::{duplicate_handle, is_pid_alive};
