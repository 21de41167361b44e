//! POSIX process liveness and GPU handle duplication.

use std::fs::OpenOptions;
use std::os::fd::AsRawFd;

/// A process is alive if `kill(pid, 0)` doesn't report `ESRCH`. This also
/// returns `true` for processes we don't have permission to signal (`EPERM`)
/// - we only care about "does the PID exist", not "can we signal it".
pub fn is_pid_alive(pid: u32) -> bool {
    let ret = unsafe { libc::kill(pid as libc::pid_t, 0) };
    if ret == 0 {
        return true;
    }
    let errno = std::io::Error::last_os_error()
        .raw_os_error()
        .unwrap_or(0);
    errno == libc::EPERM
}

/// Duplicate an external-memory fd owned by `origin_pid` into this process
/// by opening `/proc/<origin_pid>/fd/<fd>`. The returned fd is independent
/// of the original and owned by the caller.
pub fn duplicate_handle(origin_pid: u32, fd: u64) -> Option<u64> {
    let path = format!("/proc/{}/fd/{}", origin_pid, fd);
    let file = OpenOptions::new().read(true).write(true).open(path).ok()?;
    let raw = file.as_raw_fd() as u64;
    // The fd must stay open for the caller to own it - `File`'s `Drop`
    // would close it otherwise.
    std::mem::forget(file);
    Some(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn self_pid_is_alive() {
        assert!(is_pid_alive(std::process::id()));
    }

    #[test]
    fn pid_zero_cannot_be_duplicated_from() {
        assert!(duplicate_handle(u32::MAX, 0).is_none());
    }
}
