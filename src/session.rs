//! Tunnel session lifecycle.
//!
//! A [`TunnelSession`] owns one forwarding subprocess built from a
//! caller-supplied ssh command line. [`start`](TunnelSession::start) runs
//! the whole bring-up sequence and only returns once the forward is
//! confirmed live:
//!
//! 1. Resolve the local port (bind-and-release an ephemeral loopback
//!    listener when the caller passed 0).
//! 2. Run the base command once as the *negotiator*; its stdout is the
//!    remote port to forward to.
//! 3. Spawn the base command again with `-L local:localhost:remote`
//!    appended, the negotiated port injected via [`TUNNEL_PORT_VAR`] and
//!    a readiness line requested via [`TUNNEL_SIGNAL_OPEN_VAR`].
//! 4. Block on the child's stdout: the first line means the forward is
//!    established; EOF before any line means it never came up.
//!
//! `ExitOnForwardFailure=yes` is passed so a forward that cannot bind
//! (something else took the local port between release and rebind) makes
//! the subprocess exit promptly instead of lingering without forwarding.
//! That exit is observed as EOF on stdout and surfaced as a
//! [`TunnelError::Readiness`] carrying the child's stderr.
//!
//! Neither the negotiation nor the readiness read has a deadline. If the
//! external process hangs, `start` hangs with it; callers that need a
//! bound wrap the call in `tokio::time::timeout`.

use std::collections::HashMap;
use std::io;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::TcpListener;
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::error::TunnelError;
use crate::platform::{self, PlatformProfile};
use crate::process;

/// Environment variable naming the remote port the far side must bind.
pub const TUNNEL_PORT_VAR: &str = "TUNNEL_PORT";

/// Environment variable requesting a readiness line on stdout once the
/// forward is established.
pub const TUNNEL_SIGNAL_OPEN_VAR: &str = "TUNNEL_SIGNAL_OPEN";

/// One local-to-remote forwarding tunnel backed by an external ssh
/// subprocess.
///
/// Construction is cheap; [`start`](Self::start) does all the work. A
/// session manages at most one subprocess over its lifetime: construct a
/// fresh session per tunnel.
pub struct TunnelSession {
    /// Environment overlay passed to both the negotiator and the tunnel
    /// subprocess. Never mutated; launch derives an extended copy.
    env: HashMap<String, String>,
    /// Base secure-shell argv. The negotiator runs it as-is, the tunnel
    /// subprocess runs it with the forwarding flags appended.
    ssh_cmd: Vec<String>,
    platform: PlatformProfile,
    local_port: Option<u16>,
    pid: Option<u32>,
    child: Option<Child>,
}

impl TunnelSession {
    /// Create an unstarted session from an environment overlay and a base
    /// ssh command line, using the host platform's stop semantics.
    #[must_use]
    pub fn new(env: HashMap<String, String>, ssh_cmd: Vec<String>) -> Self {
        Self::with_platform(env, ssh_cmd, PlatformProfile::native())
    }

    /// Like [`new`](Self::new) but with an explicit capability profile,
    /// so tests can substitute a softer stop signal.
    #[must_use]
    pub fn with_platform(
        env: HashMap<String, String>,
        ssh_cmd: Vec<String>,
        platform: PlatformProfile,
    ) -> Self {
        Self {
            env,
            ssh_cmd,
            platform,
            local_port: None,
            pid: None,
            child: None,
        }
    }

    /// Bring the tunnel up and block until it is confirmed live.
    ///
    /// `desired_port` of 0 means "choose any available port"; the chosen
    /// port is readable via [`port`](Self::port) afterwards. On failure no
    /// subprocess is left running and the session stays unstarted.
    pub async fn start(&mut self, desired_port: u16) -> Result<(), TunnelError> {
        if self.child.is_some() {
            return Err(TunnelError::AlreadyStarted {
                local_port: self.local_port.unwrap_or(0),
            });
        }

        let local_port = if desired_port == 0 {
            reserve_local_port().await?
        } else {
            desired_port
        };

        // Ask the remote side for a port before anything is forwarded.
        debug!("requesting remote port via {:?}", self.ssh_cmd.first());
        let out = process::capture_exec(&self.ssh_cmd, &self.env).await?;
        if !out.status.success() {
            return Err(TunnelError::Negotiation {
                stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
            });
        }
        let remote_port = String::from_utf8_lossy(&out.stdout).trim_end().to_string();
        debug!("negotiated remote port {remote_port}");

        let mut tunnel_env = self.env.clone();
        tunnel_env.insert(TUNNEL_PORT_VAR.to_string(), remote_port.clone());
        tunnel_env.insert(TUNNEL_SIGNAL_OPEN_VAR.to_string(), "1".to_string());

        let mut tunnel_cmd = self.ssh_cmd.clone();
        tunnel_cmd.extend([
            "-L".to_string(),
            format!("{local_port}:localhost:{remote_port}"),
            "-o".to_string(),
            format!("SendEnv={TUNNEL_PORT_VAR}"),
            "-o".to_string(),
            format!("SendEnv={TUNNEL_SIGNAL_OPEN_VAR}"),
            "-o".to_string(),
            "ExitOnForwardFailure=yes".to_string(),
        ]);

        let mut child = process::spawn_piped(&tunnel_cmd, &tunnel_env, &self.platform)?;
        let pid = child.id();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("tunnel stdout was not piped"))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| io::Error::other("tunnel stderr was not piped"))?;

        // The parent holds only the read ends of the two pipes, so a child
        // that exits (or closes stdout) is observed as EOF here. The line's
        // content is irrelevant; its arrival is the readiness signal.
        let mut ready_line = String::new();
        match BufReader::new(stdout).read_line(&mut ready_line).await {
            Ok(n) if n > 0 => {
                info!("tunnel ready: 127.0.0.1:{local_port} -> localhost:{remote_port} (pid {pid:?})");
                self.local_port = Some(local_port);
                self.pid = pid;
                self.child = Some(child);
                Ok(())
            }
            _ => {
                // EOF (or a broken pipe) before any line: the forward never
                // came up. Terminate and reap the child, then surface
                // whatever it wrote to stderr.
                if let Some(pid) = pid {
                    if let Err(e) = platform::send_stop(pid, self.platform.stop_signal) {
                        warn!("stop signal to pid {pid} failed: {e}");
                    }
                }
                let _ = child.wait().await;
                let mut stderr_buf = String::new();
                let _ = stderr.read_to_string(&mut stderr_buf).await;
                Err(TunnelError::Readiness {
                    local_port,
                    stderr: stderr_buf,
                })
            }
        }
    }

    /// Deliver the platform stop signal and block until the subprocess
    /// has exited.
    ///
    /// A subprocess that is already gone is not an error, so calling
    /// `stop` twice in a row is fine. Calling it before a successful
    /// [`start`](Self::start) is a usage error.
    pub async fn stop(&mut self) -> Result<(), TunnelError> {
        let Some(pid) = self.pid else {
            return Err(TunnelError::NotStarted { operation: "stop" });
        };
        if let Err(e) = platform::send_stop(pid, self.platform.stop_signal) {
            warn!("stop signal to pid {pid} failed: {e}");
        }
        self.wait().await;
        Ok(())
    }

    /// Block until the subprocess exits, reclaiming its exit status.
    ///
    /// Safe to call on an already-exited or already-reaped child, and a
    /// no-op when no subprocess was ever started. Used by
    /// [`stop`](Self::stop) and on its own when the subprocess is
    /// expected to exit unassisted.
    pub async fn wait(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match child.wait().await {
                Ok(status) => debug!("tunnel subprocess exited: {status}"),
                Err(e) => debug!("tunnel subprocess wait: {e}"),
            }
        }
    }

    /// The allocated local port.
    pub fn port(&self) -> Result<u16, TunnelError> {
        self.local_port
            .ok_or(TunnelError::NotStarted { operation: "port" })
    }

    /// OS pid of the tunnel subprocess, `None` before a successful start.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Whether the tunnel subprocess currently exists according to the
    /// platform liveness probe.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pid.is_some_and(platform::process_exists)
    }
}

/// Bind an ephemeral loopback listener to discover a free port, then
/// release it immediately.
///
/// The port can in principle be taken by another process between the
/// release and the tunnel subprocess's own bind. That race is accepted:
/// it surfaces later as a readiness failure rather than being detected
/// here.
async fn reserve_local_port() -> io::Result<u16> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    drop(listener);
    Ok(port)
}
