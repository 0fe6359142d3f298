//! Scripted mock balance for testing without physical hardware.
//!
//! `MockBalance` is both a [`PortOpener`] and the script driving the device:
//! tests push lines (or raw bytes) into it and optionally inject an I/O
//! failure. Readers pop the queued bytes; an empty queue behaves like a real
//! serial read timeout (a short sleep, then `TimedOut`). Cloning the mock
//! shares the underlying script, so a test can keep feeding data after
//! handing the opener to a controller.

use super::{DeviceHandle, PortOpener, SUPPORTED_BAUD_RATES};
use crate::error::{AppResult, MonitorError};
use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    pending: VecDeque<u8>,
    /// Error kind returned once the queue drains, simulating device loss.
    fail_kind: Option<io::ErrorKind>,
}

/// Scripted balance simulator.
#[derive(Clone, Debug, Default)]
pub struct MockBalance {
    state: Arc<Mutex<MockState>>,
}

impl MockBalance {
    /// Create a mock with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one line of device output (terminator appended).
    pub fn push_line(&self, line: &str) {
        let mut state = self.lock();
        state.pending.extend(line.as_bytes());
        state.pending.extend(b"\r\n");
    }

    /// Queue raw bytes, e.g. a partial line or invalid UTF-8.
    pub fn push_raw(&self, bytes: &[u8]) {
        self.lock().pending.extend(bytes);
    }

    /// After the queue drains, every read fails with `kind`.
    pub fn fail_with(&self, kind: io::ErrorKind) {
        self.lock().fail_kind = Some(kind);
    }

    /// Bytes not yet consumed by any reader.
    pub fn pending_bytes(&self) -> usize {
        self.lock().pending.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl PortOpener for MockBalance {
    fn list_ports(&self) -> Vec<String> {
        vec!["MOCK0".to_string()]
    }

    fn open(&self, port: &str, baud: u32, _timeout: Duration) -> AppResult<Box<dyn DeviceHandle>> {
        if !SUPPORTED_BAUD_RATES.contains(&baud) {
            return Err(MonitorError::UnsupportedBaudRate(baud));
        }
        Ok(Box::new(MockHandle {
            port_name: port.to_string(),
            baud,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockHandle {
    port_name: String,
    baud: u32,
    state: Arc<Mutex<MockState>>,
}

impl DeviceHandle for MockHandle {
    fn port_name(&self) -> &str {
        &self.port_name
    }

    fn baud_rate(&self) -> u32 {
        self.baud
    }

    fn reader(&self) -> AppResult<Box<dyn Read + Send>> {
        Ok(Box::new(MockReader {
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockReader {
    state: Arc<Mutex<MockState>>,
}

impl Read for MockReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if !state.pending.is_empty() {
                let n = buf.len().min(state.pending.len());
                for slot in buf.iter_mut().take(n) {
                    // The length check above guarantees a byte is present.
                    *slot = state.pending.pop_front().unwrap_or_default();
                }
                return Ok(n);
            }
            if let Some(kind) = state.fail_kind {
                return Err(io::Error::from(kind));
            }
        }
        // Behave like a short serial read timeout.
        std::thread::sleep(Duration::from_millis(2));
        Err(io::Error::from(io::ErrorKind::TimedOut))
    }
}
