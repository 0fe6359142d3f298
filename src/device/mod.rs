//! Device seam: port enumeration and serial I/O behind small traits.
//!
//! The acquisition core never talks to the `serialport` crate directly; it
//! goes through [`PortOpener`] and [`DeviceHandle`] so the same loop runs
//! against real hardware ([`serial::SerialOpener`]) or the scripted
//! [`mock::MockBalance`] in tests.
//!
//! A `DeviceHandle` is owned by the controller for the lifetime of the
//! connection. Starting a session clones an independent reader off the
//! handle for the acquisition thread, so the control thread keeps the
//! connection identity while the loop owns the bytes.

pub mod mock;
pub mod serial;

pub use mock::MockBalance;
pub use serial::SerialOpener;

use crate::error::AppResult;
use std::io::Read;
use std::time::Duration;

/// Baud rates a Sartorius balance can be configured for.
pub const SUPPORTED_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200];

/// An open connection to a balance.
pub trait DeviceHandle: Send {
    /// Port name this handle was opened on.
    fn port_name(&self) -> &str;

    /// Baud rate this handle was opened at.
    fn baud_rate(&self) -> u32;

    /// An independent reader over the same device, for the acquisition
    /// thread. Reads return `TimedOut` when no data arrives within the
    /// handle's read timeout.
    fn reader(&self) -> AppResult<Box<dyn Read + Send>>;
}

/// Opens device connections and enumerates candidate ports.
pub trait PortOpener: Send {
    /// Names of the serial ports currently present. Never fails; empty on
    /// enumeration errors.
    fn list_ports(&self) -> Vec<String>;

    /// Open `port` at `baud` with the given read timeout.
    fn open(&self, port: &str, baud: u32, timeout: Duration) -> AppResult<Box<dyn DeviceHandle>>;
}
