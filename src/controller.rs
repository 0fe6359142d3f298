//! Central controller: connection and session lifecycle.
//!
//! `Controller` owns every piece of mutable connection/session state, so UI
//! callbacks query one object instead of closing over shared globals. It is
//! driven from a single control thread; the only other thread in the system
//! is the acquisition loop it spawns per session.
//!
//! Lifecycles are independent: a balance may be connected with no session
//! running, but a session cannot start without an open connection. A fresh
//! buffer (well, a reset of the shared one) and a fresh output file are
//! installed at every session start.

use crate::acquisition::{AcquisitionConfig, AcquisitionLoop};
use crate::config::Settings;
use crate::data::buffer::{self, Aggregate, Sample, SharedBuffer};
use crate::data::storage::CsvSink;
use crate::device::{DeviceHandle, PortOpener, SerialOpener};
use crate::error::{AppResult, MonitorError};
use crate::messages::{LoopExit, MonitorEvent, SessionState};
use chrono::{DateTime, Local};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, PoisonError};
use std::thread::JoinHandle;
use tracing::{info, warn};

/// Public identity of one start-to-stop monitoring run.
#[derive(Debug, Clone)]
pub struct Session {
    /// Epoch reference for elapsed-time computation.
    pub started_at: DateTime<Local>,
    /// Output CSV file, fixed for the session's duration.
    pub output_path: PathBuf,
}

/// Internal handle on the running acquisition thread.
struct ActiveSession {
    info: Session,
    running: Arc<AtomicBool>,
    done_rx: mpsc::Receiver<LoopExit>,
    join: Option<JoinHandle<()>>,
}

/// Read-mostly view the UI collaborator polls on its own schedule.
#[derive(Debug, Clone)]
pub struct DisplaySnapshot {
    /// Most recent sample, if any.
    pub latest: Option<Sample>,
    /// Summary statistics over the whole session.
    pub aggregate: Option<Aggregate>,
    /// Trend over the configured trailing window, per minute.
    pub recent_slope: Option<f64>,
    /// Coarse session state.
    pub session_state: SessionState,
}

/// Owns the device connection and the session lifecycle.
pub struct Controller {
    settings: Settings,
    opener: Box<dyn PortOpener>,
    connection: Option<Box<dyn DeviceHandle>>,
    session: Option<ActiveSession>,
    buffer: SharedBuffer,
    sink: CsvSink,
    events: mpsc::Sender<MonitorEvent>,
    faulted: bool,
}

impl Controller {
    /// Controller over real serial ports. Returns the event receiver the UI
    /// collaborator drains.
    pub fn new(settings: Settings) -> (Self, mpsc::Receiver<MonitorEvent>) {
        Self::with_opener(settings, Box::new(SerialOpener))
    }

    /// Controller over an injected port opener (mock balance in tests).
    pub fn with_opener(
        settings: Settings,
        opener: Box<dyn PortOpener>,
    ) -> (Self, mpsc::Receiver<MonitorEvent>) {
        let (events, events_rx) = mpsc::channel();
        let sink = CsvSink::new(settings.storage.output_dir.clone());
        let controller = Self {
            settings,
            opener,
            connection: None,
            session: None,
            buffer: buffer::shared(),
            sink,
            events,
            faulted: false,
        };
        (controller, events_rx)
    }

    /// Names of the serial ports currently present.
    pub fn list_available_ports(&self) -> Vec<String> {
        self.opener.list_ports()
    }

    /// Whether a device connection is open.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Identity of the open connection, if any.
    pub fn connection_info(&self) -> Option<(String, u32)> {
        self.connection
            .as_ref()
            .map(|c| (c.port_name().to_string(), c.baud_rate()))
    }

    /// The running session's identity, if any.
    pub fn current_session(&self) -> Option<Session> {
        self.session.as_ref().map(|s| s.info.clone())
    }

    /// Open the balance on `port` at `baud_rate`.
    ///
    /// Idempotent no-op when already connected to the same endpoint; a
    /// different endpoint replaces the connection (stopping any running
    /// session first).
    pub fn connect(&mut self, port: &str, baud_rate: u32) -> AppResult<()> {
        if let Some(connection) = &self.connection {
            if connection.port_name() == port && connection.baud_rate() == baud_rate {
                return Ok(());
            }
            self.disconnect()?;
        }
        let handle = self
            .opener
            .open(port, baud_rate, self.settings.device.read_timeout)?;
        info!(port, baud_rate, "balance connected");
        let _ = self.events.send(MonitorEvent::Connected {
            port: port.to_string(),
            baud_rate,
        });
        self.connection = Some(handle);
        Ok(())
    }

    /// Close the connection, stopping a running session first. Safe to call
    /// when not connected.
    pub fn disconnect(&mut self) -> AppResult<()> {
        if self.session.is_some() {
            self.stop_session()?;
        }
        if self.connection.take().is_some() {
            info!("balance disconnected");
            let _ = self.events.send(MonitorEvent::Disconnected);
        }
        Ok(())
    }

    /// Start a monitoring session: reset the buffer, allocate the output
    /// file, spawn the acquisition thread.
    pub fn start_session(&mut self) -> AppResult<Session> {
        self.reap_finished_loop();
        if self.session.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }
        let Some(connection) = &self.connection else {
            return Err(MonitorError::NotConnected);
        };
        let reader = connection.reader()?;

        let started_at = Local::now();
        let output_path = self.sink.begin_session(started_at)?;
        self.buffer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .reset();

        let running = Arc::new(AtomicBool::new(true));
        let (done_tx, done_rx) = mpsc::channel();
        let acquisition = AcquisitionLoop::new(
            reader,
            Arc::clone(&self.buffer),
            self.sink.clone(),
            output_path.clone(),
            AcquisitionConfig {
                poll_interval: self.settings.acquisition.poll_interval,
                save_interval: self.settings.acquisition.save_interval,
            },
            Arc::clone(&running),
            self.events.clone(),
        );
        let join = std::thread::Builder::new()
            .name("acquisition".to_string())
            .spawn(move || {
                let exit = acquisition.run();
                let _ = done_tx.send(exit);
            })
            .map_err(MonitorError::Io)?;

        let session = Session {
            started_at,
            output_path,
        };
        self.session = Some(ActiveSession {
            info: session.clone(),
            running,
            done_rx,
            join: Some(join),
        });
        self.faulted = false;
        info!(file = %session.output_path.display(), "session started");
        let _ = self.events.send(MonitorEvent::SessionStarted {
            file: session.output_path.clone(),
        });
        Ok(session)
    }

    /// Stop the running session: cooperative shutdown with a bounded wait,
    /// then a final flush of any unsaved samples.
    ///
    /// Returns `Ok(false)` with no side effects when no session is running.
    pub fn stop_session(&mut self) -> AppResult<bool> {
        let Some(mut session) = self.session.take() else {
            return Ok(false);
        };
        session.running.store(false, Ordering::SeqCst);

        let timeout = self.settings.acquisition.shutdown_timeout;
        match session.done_rx.recv_timeout(timeout) {
            Ok(exit) => {
                if let Some(join) = session.join.take() {
                    let _ = join.join();
                }
                if let LoopExit::DeviceLost(reason) = exit {
                    // Lost right as we stopped; the handle is dead.
                    warn!("device was lost during shutdown: {reason}");
                    self.connection = None;
                    self.faulted = true;
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                // Proceed anyway; the detached thread exits at its next
                // iteration boundary.
                warn!("acquisition thread did not stop within {timeout:?}; proceeding");
                let _ = self.events.send(MonitorEvent::ShutdownTimeout);
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // The thread died without reporting an exit (a panic).
                // Treat it as a lost device.
                warn!("acquisition thread terminated unexpectedly during shutdown");
                if let Some(join) = session.join.take() {
                    let _ = join.join();
                }
                let _ = self.events.send(MonitorEvent::DeviceLost(
                    "acquisition thread terminated unexpectedly".to_string(),
                ));
                self.connection = None;
                self.faulted = true;
            }
        }

        self.flush_remaining(&session.info);
        info!("session stopped");
        let _ = self.events.send(MonitorEvent::SessionStopped);
        Ok(true)
    }

    /// Coarse session state; also where device-loss teardown happens, so the
    /// control thread observes faults even if it never calls stop.
    pub fn session_state(&mut self) -> SessionState {
        self.reap_finished_loop();
        if self.session.is_some() {
            SessionState::Running
        } else if self.faulted {
            SessionState::Fault
        } else {
            SessionState::Idle
        }
    }

    /// Cheap, read-mostly query for the UI; never blocks on the acquisition
    /// loop beyond the buffer's read lock.
    pub fn snapshot_for_display(&mut self) -> DisplaySnapshot {
        let session_state = self.session_state();
        let buffer = self.buffer.read().unwrap_or_else(PoisonError::into_inner);
        DisplaySnapshot {
            latest: buffer.latest(),
            aggregate: buffer.aggregate(),
            recent_slope: buffer.recent_slope(self.settings.acquisition.slope_window),
            session_state,
        }
    }

    /// Tear down the session if its loop exited on its own (device loss),
    /// or if its thread died without reporting an exit at all.
    fn reap_finished_loop(&mut self) {
        let lost_reason = self.session.as_ref().and_then(|s| {
            match s.done_rx.try_recv() {
                Ok(LoopExit::DeviceLost(reason)) => Some(reason),
                // `Stopped` only happens through `stop_session`, which owns
                // the teardown itself.
                Ok(LoopExit::Stopped) | Err(mpsc::TryRecvError::Empty) => None,
                // The thread died without sending an exit (a panic). Nothing
                // else will surface it, so report it as a lost device here.
                Err(mpsc::TryRecvError::Disconnected) => {
                    let reason = "acquisition thread terminated unexpectedly".to_string();
                    let _ = self.events.send(MonitorEvent::DeviceLost(reason.clone()));
                    Some(reason)
                }
            }
        });
        let Some(reason) = lost_reason else { return };

        warn!("tearing down session after device loss: {reason}");
        if let Some(mut session) = self.session.take() {
            if let Some(join) = session.join.take() {
                let _ = join.join();
            }
            self.flush_remaining(&session.info);
            let _ = self.events.send(MonitorEvent::SessionStopped);
        }
        // The handle died underneath us; drop it rather than retrying
        // forever against a dead port.
        if self.connection.take().is_some() {
            let _ = self.events.send(MonitorEvent::Disconnected);
        }
        self.faulted = true;
    }

    /// Final flush of unsaved samples. Full-overwrite persistence makes this
    /// idempotent with any flush the loop already did.
    fn flush_remaining(&self, session: &Session) {
        let (snapshot, unsaved) = {
            let buffer = self.buffer.read().unwrap_or_else(PoisonError::into_inner);
            (buffer.snapshot(), buffer.unsaved_count())
        };
        if unsaved == 0 || snapshot.is_empty() {
            return;
        }
        match self.sink.flush(&session.output_path, &snapshot) {
            Ok(()) => {
                self.buffer
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .mark_saved();
            }
            Err(e) => {
                warn!("final flush failed: {e}");
                let _ = self
                    .events
                    .send(MonitorEvent::PersistenceFailure(e.to_string()));
            }
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}
