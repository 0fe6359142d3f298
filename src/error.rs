//! Custom error types for the application.
//!
//! This module defines the primary error type, `MonitorError`, for the entire
//! application. Using the `thiserror` crate, it provides a centralized and
//! consistent way to handle the failure classes the acquisition core can hit:
//!
//! - **`Config` / `Configuration`**: parse errors from the `config` crate and
//!   semantic errors caught during validation (unsupported baud rate, zero
//!   intervals).
//! - **`Io`**: wraps standard `std::io::Error` for file and thread-spawn
//!   failures.
//! - **`Connection`**: the serial port could not be opened (not found,
//!   permission, already in use). Non-fatal; the controller stays
//!   disconnected.
//! - **`NotConnected` / `AlreadyRunning`**: session start preconditions,
//!   rejected synchronously with no state change.
//! - **`Persistence`**: a flush to disk failed. Recoverable; acquisition
//!   continues and the flush is retried at the next threshold.
//!
//! Mid-session conditions that cross the thread boundary (device loss, a
//! stop request timing out) are not errors: they travel as
//! `messages::MonitorEvent` variants instead. Per-line problems (undecodable
//! bytes, lines without a numeric value) are deliberately not errors either:
//! they are expected noise from the device and are skipped inside the loop at
//! debug level.

use thiserror::Error;

/// Convenience alias for results using the application error type.
pub type AppResult<T> = std::result::Result<T, MonitorError>;

/// Central error type for the balance monitor.
#[derive(Error, Debug)]
pub enum MonitorError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration validation error: {0}")]
    Configuration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to open serial port '{port}': {reason}")]
    Connection { port: String, reason: String },

    #[error("Unsupported baud rate: {0}")]
    UnsupportedBaudRate(u32),

    #[error("No balance connected")]
    NotConnected,

    #[error("A monitoring session is already running")]
    AlreadyRunning,

    #[error("Persistence failure: {0}")]
    Persistence(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn persistence_failure_carries_its_cause() {
        let err = MonitorError::Persistence("disk full".into());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn connection_error_formats_port_and_reason() {
        let err = MonitorError::Connection {
            port: "/dev/ttyACM0".into(),
            reason: "permission denied".into(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/dev/ttyACM0"));
        assert!(msg.contains("permission denied"));
    }
}
