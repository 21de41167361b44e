//! Win32 process liveness and GPU handle duplication.

use windows_sys::Win32::Foundation::{CloseHandle, DUPLICATE_SAME_ACCESS, HANDLE};
use windows_sys::Win32::System::Threading::{
    GetExitCodeProcess, OpenProcess, PROCESS_DUP_HANDLE, PROCESS_QUERY_LIMITED_INFORMATION,
    STILL_ACTIVE,
};

/// A process is alive if it can be opened for query and its exit code is
/// still `STILL_ACTIVE`.
pub fn is_pid_alive(pid: u32) -> bool {
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle == 0 {
            return false;
        }
        let mut exit_code: u32 = 0;
        let ok = GetExitCodeProcess(handle, &mut exit_code);
        CloseHandle(handle);
        ok != 0 && exit_code == STILL_ACTIVE
    }
}

/// Duplicate a handle owned by `origin_pid` into this process via
/// `DuplicateHandle`, requesting `PROCESS_DUP_HANDLE` access on the origin
/// process.
pub fn duplicate_handle(origin_pid: u32, handle: u64) -> Option<u64> {
    unsafe {
        let source_process = OpenProcess(PROCESS_DUP_HANDLE, 0, origin_pid);
        if source_process == 0 {
            return None;
        }

        let current_process = windows_sys::Win32::System::Threading::GetCurrentProcess();
        let mut target: HANDLE = 0;
        let ok = windows_sys::Win32::Foundation::DuplicateHandle(
            source_process,
            handle as HANDLE,
            current_process,
            &mut target,
            0,
            0,
            DUPLICATE_SAME_ACCESS,
        );
        CloseHandle(source_process);

        if ok == 0 {
            None
        } else {
            Some(target as u64)
        }
    }
}
