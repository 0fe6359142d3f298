//! Configuration management.
//!
//! `Settings` is deserialized from an optional TOML file via the `config`
//! crate; every field has a sensible default so the application runs with no
//! file at all. Durations are written in human form (`"100ms"`, `"10m"`)
//! thanks to `humantime-serde`.

use crate::device::SUPPORTED_BAUD_RATES;
use crate::error::{AppResult, MonitorError};
use config::Config;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default baud rate of a Sartorius balance.
pub const DEFAULT_BAUD_RATE: u32 = 9600;

/// Top-level application settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct Settings {
    /// Log level for the tracing subscriber (trace/debug/info/warn/error).
    pub log_level: String,
    /// Serial device settings.
    pub device: DeviceSettings,
    /// Polling and persistence cadence.
    pub acquisition: AcquisitionSettings,
    /// Output file location.
    pub storage: StorageSettings,
}

/// Serial device settings.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DeviceSettings {
    /// Port to connect to at startup when none is given on the command line.
    pub default_port: Option<String>,
    /// Baud rate; must be one of [`SUPPORTED_BAUD_RATES`].
    pub baud_rate: u32,
    /// Read timeout on the serial handle.
    #[serde(with = "humantime_serde")]
    pub read_timeout: Duration,
}

/// Polling and persistence cadence.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AcquisitionSettings {
    /// Sleep between successive device polls.
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
    /// Flush to disk after this many unsaved samples.
    pub save_interval: usize,
    /// Trailing window of elapsed time over which the slope is computed.
    #[serde(with = "humantime_serde")]
    pub slope_window: Duration,
    /// Bounded wait for the acquisition thread on `stop_session`.
    #[serde(with = "humantime_serde")]
    pub shutdown_timeout: Duration,
}

/// Output file location.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageSettings {
    /// Directory that session CSV files are written into.
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            device: DeviceSettings::default(),
            acquisition: AcquisitionSettings::default(),
            storage: StorageSettings::default(),
        }
    }
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            default_port: None,
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
        }
    }
}

impl Default for AcquisitionSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            save_interval: 10,
            slope_window: Duration::from_secs(600),
            shutdown_timeout: Duration::from_secs(1),
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data"),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from `config/default.toml`
    /// when present, or fall back to the built-in defaults.
    pub fn load(path: Option<&Path>) -> AppResult<Self> {
        let builder = match path {
            Some(path) => Config::builder().add_source(config::File::from(path)),
            None => Config::builder()
                .add_source(config::File::with_name("config/default").required(false)),
        };
        let settings = builder.build().map_err(MonitorError::Config)?;
        settings.try_deserialize().map_err(MonitorError::Config)
    }

    /// Semantic validation beyond what deserialization can catch.
    pub fn validate(&self) -> AppResult<()> {
        if !SUPPORTED_BAUD_RATES.contains(&self.device.baud_rate) {
            return Err(MonitorError::UnsupportedBaudRate(self.device.baud_rate));
        }
        if self.acquisition.save_interval == 0 {
            return Err(MonitorError::Configuration(
                "acquisition.save_interval must be at least 1".to_string(),
            ));
        }
        if self.acquisition.poll_interval.is_zero() {
            return Err(MonitorError::Configuration(
                "acquisition.poll_interval must be non-zero".to_string(),
            ));
        }
        if self.acquisition.shutdown_timeout.is_zero() {
            return Err(MonitorError::Configuration(
                "acquisition.shutdown_timeout must be non-zero".to_string(),
            ));
        }
        Ok(())
    }
}
