//! Tracing infrastructure.
//!
//! Structured logging via the `tracing` and `tracing-subscriber` crates:
//! an fmt layer with thread names (useful to tell the acquisition thread
//! apart from the control thread) behind an `EnvFilter`. `RUST_LOG` wins
//! when set; otherwise the configured log level applies to this crate and
//! `warn` to everything else.

use crate::error::{AppResult, MonitorError};
use tracing::Level;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Parse a log level string from the configuration.
pub fn parse_log_level(level: &str) -> AppResult<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Ok(Level::TRACE),
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" | "warning" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        other => Err(MonitorError::Configuration(format!(
            "Invalid log level: '{other}' (expected trace, debug, info, warn, or error)"
        ))),
    }
}

/// Initialize the global tracing subscriber from the configured level.
///
/// Fails if called twice in the same process.
pub fn init(log_level: &str) -> AppResult<()> {
    let level = parse_log_level(log_level)?;
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("balance_daq={level},warn")));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_thread_names(true))
        .with(filter)
        .try_init()
        .map_err(|e| MonitorError::Configuration(format!("Failed to initialize tracing: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_levels() {
        assert_eq!(parse_log_level("trace").unwrap(), Level::TRACE);
        assert_eq!(parse_log_level("debug").unwrap(), Level::DEBUG);
        assert_eq!(parse_log_level("info").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("warn").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("warning").unwrap(), Level::WARN);
        assert_eq!(parse_log_level("error").unwrap(), Level::ERROR);
    }

    #[test]
    fn is_case_insensitive() {
        assert_eq!(parse_log_level("INFO").unwrap(), Level::INFO);
        assert_eq!(parse_log_level("Debug").unwrap(), Level::DEBUG);
    }

    #[test]
    fn rejects_unknown_level() {
        assert!(parse_log_level("verbose").is_err());
    }
}
