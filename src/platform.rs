//! Stop-signal and spawn-flag capabilities, resolved per platform.
//!
//! Tearing down a detached child differs by OS. POSIX delivers `SIGHUP`
//! straight to the child's pid. Windows has no `kill(2)`; the closest
//! equivalent is a console ctrl event, and such an event only reaches a
//! *different* process when that process was launched as the root of its
//! own process group (`CREATE_NEW_PROCESS_GROUP`). Instead of branching
//! on the host OS at every call site, the signal/flag pair is resolved
//! once into a [`PlatformProfile`] that the session carries, so tests can
//! substitute a profile with a softer signal.

use std::io;

#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{self, Signal};
#[cfg(unix)]
use nix::unistd::Pid;

/// The signal used to ask a tunnel subprocess to shut down.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// A POSIX signal delivered with `kill(2)`.
    #[cfg(unix)]
    Posix(Signal),
    /// A Windows console ctrl-break event. Ctrl-C would be the closer
    /// analogue to an interrupt, but a ctrl-C event cannot be addressed
    /// to another process group; ctrl-break can.
    #[cfg(windows)]
    CtrlBreak,
}

/// How this platform stops a detached child and what the spawn needs so
/// the stop can reach it at all.
#[derive(Debug, Clone, Copy)]
pub struct PlatformProfile {
    /// Signal delivered by [`TunnelSession::stop`](crate::TunnelSession::stop).
    pub stop_signal: StopSignal,
    /// Whether the tunnel subprocess must be spawned as the root of a new
    /// process group for `stop_signal` to be deliverable.
    pub new_process_group: bool,
}

impl PlatformProfile {
    /// Capability profile of the host operating system.
    #[must_use]
    pub fn native() -> Self {
        #[cfg(unix)]
        {
            // SIGHUP is deliverable to the child's pid directly, no extra
            // spawn flags needed.
            Self {
                stop_signal: StopSignal::Posix(Signal::SIGHUP),
                new_process_group: false,
            }
        }
        #[cfg(windows)]
        {
            Self {
                stop_signal: StopSignal::CtrlBreak,
                new_process_group: true,
            }
        }
    }
}

impl Default for PlatformProfile {
    fn default() -> Self {
        Self::native()
    }
}

/// Deliver `signal` to the process with the given pid.
///
/// A target that no longer exists is not an error: the point of the stop
/// signal is that the process goes away, and it already has.
#[cfg(unix)]
#[allow(clippy::cast_possible_wrap)]
pub fn send_stop(pid: u32, signal: StopSignal) -> io::Result<()> {
    let StopSignal::Posix(sig) = signal;
    match signal::kill(Pid::from_raw(pid as i32), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(io::Error::from_raw_os_error(e as i32)),
    }
}

/// Deliver `signal` to the process with the given pid.
///
/// The event reaches the child because it was spawned as the root of its
/// own process group (see [`PlatformProfile::new_process_group`]). A
/// failure here usually means the process is already gone; the caller
/// treats it as non-fatal either way.
#[cfg(windows)]
pub fn send_stop(pid: u32, signal: StopSignal) -> io::Result<()> {
    use windows_sys::Win32::System::Console::{GenerateConsoleCtrlEvent, CTRL_BREAK_EVENT};

    let StopSignal::CtrlBreak = signal;
    let ok = unsafe { GenerateConsoleCtrlEvent(CTRL_BREAK_EVENT, pid) };
    if ok == 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Probe whether a process with the given pid currently exists.
#[must_use]
pub fn process_exists(pid: u32) -> bool {
    #[cfg(unix)]
    {
        // Signal 0 performs the existence/permission check without
        // delivering anything.
        #[allow(clippy::cast_possible_wrap)]
        unsafe {
            libc::kill(pid as i32, 0) == 0
        }
    }
    #[cfg(windows)]
    {
        use std::ptr::null_mut;
        use windows_sys::Win32::Foundation::CloseHandle;
        use windows_sys::Win32::System::Threading::{
            OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
        };

        unsafe {
            let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
            if handle != null_mut() {
                CloseHandle(handle);
                return true;
            }
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_native_profile_unix() {
        let profile = PlatformProfile::native();
        assert_eq!(profile.stop_signal, StopSignal::Posix(Signal::SIGHUP));
        assert!(!profile.new_process_group);
    }

    #[test]
    fn test_process_exists_self() {
        assert!(process_exists(std::process::id()));
    }

    #[test]
    fn test_process_exists_bogus_pid() {
        // Far above any realistic pid_max.
        assert!(!process_exists(999_999_999));
    }

    #[test]
    #[cfg(unix)]
    fn test_send_stop_gone_process_is_swallowed() {
        let profile = PlatformProfile::native();
        assert!(send_stop(999_999_999, profile.stop_signal).is_ok());
    }
}
