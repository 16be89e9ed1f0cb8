//! Low-level subprocess spawning and capture.
//!
//! Both entry points take the command as an argv vector plus an
//! environment overlay that is merged into (not replacing) the inherited
//! environment. All spawns set `kill_on_drop(true)` so a dropped handle
//! cannot leak a running process.

use std::collections::HashMap;
use std::io;
use std::process::{Output, Stdio};

use tokio::process::{Child, Command};

use crate::platform::PlatformProfile;

fn build_command(argv: &[String], env: &HashMap<String, String>) -> io::Result<Command> {
    let (program, args) = argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command line"))?;
    let mut cmd = Command::new(program);
    cmd.args(args).envs(env);
    Ok(cmd)
}

/// Run `argv` to completion with stdin closed, capturing stdout, stderr
/// and the exit status.
pub async fn capture_exec(argv: &[String], env: &HashMap<String, String>) -> io::Result<Output> {
    let mut cmd = build_command(argv, env)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    cmd.output().await
}

/// Spawn `argv` as a detached long-lived child: stdin closed, stdout and
/// stderr piped back to the caller.
///
/// When the profile asks for it, the child becomes the root of a new
/// process group, so a later stop signal can be addressed to it without
/// also hitting the parent.
pub fn spawn_piped(
    argv: &[String],
    env: &HashMap<String, String>,
    profile: &PlatformProfile,
) -> io::Result<Child> {
    let mut cmd = build_command(argv, env)?;
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if profile.new_process_group {
        // SAFETY: setpgid is async-signal-safe per POSIX.
        #[cfg(unix)]
        unsafe {
            cmd.pre_exec(|| {
                libc::setpgid(0, 0);
                Ok(())
            });
        }
        #[cfg(windows)]
        cmd.creation_flags(windows_sys::Win32::System::Threading::CREATE_NEW_PROCESS_GROUP);
    }
    cmd.spawn()
}
