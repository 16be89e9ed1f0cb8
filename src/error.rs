//! Error taxonomy for tunnel orchestration.

use thiserror::Error;

/// Errors surfaced by [`TunnelSession`](crate::TunnelSession).
///
/// [`NotStarted`](TunnelError::NotStarted) and
/// [`AlreadyStarted`](TunnelError::AlreadyStarted) are programming errors
/// in the caller. [`Negotiation`](TunnelError::Negotiation) and
/// [`Readiness`](TunnelError::Readiness) carry the subprocess's captured
/// stderr so a caller can tell "the remote side rejected the port
/// request" apart from "something else is already listening on the local
/// port".
#[derive(Debug, Error)]
pub enum TunnelError {
    /// An operation that requires a started session was called first.
    #[error("you must call start() before {operation}()")]
    NotStarted {
        /// Name of the offending operation (`"stop"`, `"port"`).
        operation: &'static str,
    },

    /// `start()` was called while a tunnel subprocess is already
    /// associated with this session.
    #[error("tunnel already started on local port {local_port}")]
    AlreadyStarted { local_port: u16 },

    /// The remote port negotiator exited with a non-zero status.
    #[error("failed to request remote port: {stderr}")]
    Negotiation {
        /// Captured stderr of the negotiator invocation.
        stderr: String,
    },

    /// The tunnel subprocess closed its stdout without signaling
    /// readiness. The subprocess has already been terminated and reaped
    /// by the time this error is returned.
    #[error("tunnel did not come up, is something else listening on port {local_port}?\n{stderr}")]
    Readiness {
        /// The local port the forward was supposed to bind.
        local_port: u16,
        /// Everything the subprocess wrote to stderr before exiting.
        stderr: String,
    },

    /// OS-level failure: listener bind, spawn, or pipe setup.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
