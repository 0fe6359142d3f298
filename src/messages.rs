//! Cross-module message and state types.
//!
//! The acquisition loop and the controller communicate through these types:
//! `MonitorEvent` notifications flow to the UI collaborator over an mpsc
//! channel, `LoopExit` reports why the acquisition thread finished, and
//! `SessionState` is the coarse state the display snapshot carries.

use std::fmt;
use std::path::PathBuf;

/// Discrete notifications for the UI collaborator.
///
/// Delivered over the channel returned by `Controller::new`; consumers drain
/// it on their own schedule. Dropping the receiver silently discards events.
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// A serial connection was opened.
    Connected {
        /// Port name, e.g. `/dev/ttyACM0`.
        port: String,
        /// Negotiated baud rate.
        baud_rate: u32,
    },
    /// The serial connection was closed.
    Disconnected,
    /// A monitoring session started; samples go into `file`.
    SessionStarted {
        /// Output CSV path for the session.
        file: PathBuf,
    },
    /// The session ended (stop request or device loss teardown).
    SessionStopped,
    /// The device failed mid-session; the session is being torn down.
    DeviceLost(String),
    /// A flush to disk failed; acquisition continues and will retry.
    PersistenceFailure(String),
    /// The acquisition thread missed the stop deadline; shutdown proceeded.
    ShutdownTimeout,
}

/// Why the acquisition loop exited.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopExit {
    /// Cooperative stop: the running flag was cleared.
    Stopped,
    /// Unrecoverable device I/O failure.
    DeviceLost(String),
}

/// Coarse session state for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No session active.
    Idle,
    /// A session is running and the acquisition loop is alive.
    Running,
    /// The last session ended with a device loss.
    Fault,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::Running => write!(f, "running"),
            SessionState::Fault => write!(f, "fault"),
        }
    }
}
