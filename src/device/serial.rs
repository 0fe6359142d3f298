//! Real serial ports via the `serialport` crate.

use super::{DeviceHandle, PortOpener, SUPPORTED_BAUD_RATES};
use crate::error::{AppResult, MonitorError};
use serialport::SerialPort;
use std::io::Read;
use std::time::Duration;
use tracing::debug;

/// Production [`PortOpener`] backed by `serialport`.
pub struct SerialOpener;

impl PortOpener for SerialOpener {
    fn list_ports(&self) -> Vec<String> {
        match serialport::available_ports() {
            Ok(ports) => ports.into_iter().map(|p| p.port_name).collect(),
            Err(e) => {
                debug!("port enumeration failed: {e}");
                Vec::new()
            }
        }
    }

    fn open(&self, port: &str, baud: u32, timeout: Duration) -> AppResult<Box<dyn DeviceHandle>> {
        if !SUPPORTED_BAUD_RATES.contains(&baud) {
            return Err(MonitorError::UnsupportedBaudRate(baud));
        }
        let inner = serialport::new(port, baud)
            .timeout(timeout)
            .open()
            .map_err(|e| MonitorError::Connection {
                port: port.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Box::new(SerialHandle {
            port_name: port.to_string(),
            baud,
            inner,
        }))
    }
}

struct SerialHandle {
    port_name: String,
    baud: u32,
    inner: Box<dyn SerialPort>,
}

impl DeviceHandle for SerialHandle {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn reader(&self) -> AppResult<Box<dyn Read + Send>> {
        let clone = self
            .inner
            .try_clone()
            .map_err(|e| MonitorError::Connection {
                port: self.port_name.clone(),
                reason: format!("failed to clone handle: {e}"),
            })?;
        Ok(Box::new(clone))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unsupported_baud_rate() {
        let opener = SerialOpener;
        match opener.open("/dev/null", 1200, Duration::from_secs(1)) {
            Err(MonitorError::UnsupportedBaudRate(1200)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn open_failure_reports_connection_error() {
        let opener = SerialOpener;
        match opener.open("/definitely/not/a/port", 9600, Duration::from_secs(1)) {
            Err(MonitorError::Connection { port, .. }) => {
                assert_eq!(port, "/definitely/not/a/port");
            }
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
