#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::doc_markdown)]

//! # tunlink
//!
//! Local-to-remote port-forwarding tunnels driven through an external
//! `ssh` subprocess.
//!
//! tunlink does not speak the SSH protocol itself. It owns the
//! orchestration around an already-configured ssh command line: pick a
//! free local port, ask the remote side which port to forward to, launch
//! the forwarding subprocess, and only hand control back once the forward
//! is confirmed live.
//!
//! ```text
//! TunnelSession::start(0)
//!     │
//!     ├─ bind 127.0.0.1:0, read back the port, release it
//!     │
//!     ├─ run `ssh_cmd` once         ← remote side prints a port number
//!     │
//!     ├─ spawn `ssh_cmd -L local:localhost:remote -o SendEnv=... \
//!     │         -o ExitOnForwardFailure=yes`
//!     │     handshake via TUNNEL_PORT / TUNNEL_SIGNAL_OPEN env vars
//!     │
//!     └─ block on the child's stdout
//!           first line  → forward is live, start() returns Ok
//!           EOF         → forward never came up, child is killed and
//!                         reaped, stderr is surfaced in the error
//!
//! TunnelSession::stop()
//!     └─ deliver the platform stop signal, wait for exit
//! ```
//!
//! ## Architecture
//!
//! ```text
//! session.rs   — TunnelSession lifecycle (start/stop/wait/port)
//! process.rs   — capture_exec(), spawn_piped() over tokio::process
//! platform.rs  — stop-signal/process-group capability profile, liveness
//! error.rs     — TunnelError taxonomy
//! ```
//!
//! There is deliberately no deadline on `start`: both the negotiation
//! and the readiness read block until the external process answers or
//! dies. Callers that need a bound wrap the call in
//! `tokio::time::timeout`.

pub mod error;
pub mod platform;
pub mod process;
pub mod session;

// Re-export key types at crate root for convenience.
pub use error::TunnelError;
pub use platform::{PlatformProfile, StopSignal};
pub use session::TunnelSession;
