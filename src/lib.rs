//! # Balance DAQ Core Library
//!
//! This crate is the core library for the `balance-daq` application: live
//! mass acquisition from a Sartorius laboratory balance over a serial link.
//! It reads noisy line-oriented text from the device on a background polling
//! thread, extracts one float per line, accumulates a timestamped series in
//! memory, periodically persists it to CSV, and exposes snapshot/statistics
//! views plus discrete events that a UI frontend can poll and render.
//! Organizing the project as a library keeps the acquisition core shared
//! between the headless binary (`main.rs`) and any future GUI frontend.
//!
//! ## Crate Structure
//!
//! - **`acquisition`**: the background polling loop — read, parse, append,
//!   flush on a fixed cadence; the sole writer into the sample buffer.
//! - **`config`**: `Settings` loaded from TOML with built-in defaults.
//! - **`controller`**: the `Controller` struct, central hub owning the
//!   connection and session lifecycle and serving display snapshots.
//! - **`data`**: the in-memory `SampleBuffer` (statistics, trend slope) and
//!   the CSV storage sink.
//! - **`device`**: port enumeration and serial I/O behind small traits, with
//!   a real `serialport` implementation and a scripted mock.
//! - **`error`**: the central `MonitorError` enum.
//! - **`messages`**: event and state types shared across modules.
//! - **`parser`**: extraction of a numeric reading from a raw text line.
//! - **`telemetry`**: tracing subscriber setup.

pub mod acquisition;
pub mod config;
pub mod controller;
pub mod data;
pub mod device;
pub mod error;
pub mod messages;
pub mod parser;
pub mod telemetry;
