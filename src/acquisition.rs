//! The acquisition loop: polls the balance, parses lines, feeds the buffer.
//!
//! One `AcquisitionLoop` runs per session on a dedicated thread. Each
//! iteration it drains whatever bytes the device produced, splits them into
//! lines, extracts a value per line, appends to the shared buffer and
//! triggers a flush once enough unsaved samples accumulate, then sleeps the
//! poll interval. The sleep bounds CPU usage and also bounds how quickly a
//! stop request takes effect (one poll interval plus one read timeout).
//!
//! Error discipline per iteration:
//! - `TimedOut` / `WouldBlock` / `Interrupted` reads mean "no data yet";
//! - undecodable or value-free lines are skipped at debug level — a noisy
//!   device is normal operation, not an error;
//! - flush failures are warnings; the flush is retried at the next threshold;
//! - any other read error (or EOF) is a device loss: the loop makes a
//!   best-effort final flush, emits [`MonitorEvent::DeviceLost`], and exits.

use crate::data::buffer::SharedBuffer;
use crate::data::storage::CsvSink;
use crate::messages::{LoopExit, MonitorEvent};
use crate::parser;
use chrono::Local;
use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc, PoisonError};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

/// Upper bound on a buffered partial line. A real balance line is tens of
/// bytes; anything beyond this is a stream that never terminates lines and
/// gets discarded rather than accumulated forever.
const MAX_LINE_BYTES: usize = 1024;

/// Cadence knobs for the loop, taken from `Settings::acquisition`.
#[derive(Clone, Copy, Debug)]
pub struct AcquisitionConfig {
    /// Sleep between successive device polls.
    pub poll_interval: Duration,
    /// Flush to disk after this many unsaved samples.
    pub save_interval: usize,
}

/// One session's polling loop. Sole writer into the shared buffer.
pub struct AcquisitionLoop {
    reader: Box<dyn Read + Send>,
    buffer: SharedBuffer,
    sink: CsvSink,
    output_path: PathBuf,
    session_start: Instant,
    config: AcquisitionConfig,
    running: Arc<AtomicBool>,
    events: mpsc::Sender<MonitorEvent>,
}

impl AcquisitionLoop {
    /// Assemble a loop for a freshly started session. The session epoch is
    /// taken as "now".
    pub fn new(
        reader: Box<dyn Read + Send>,
        buffer: SharedBuffer,
        sink: CsvSink,
        output_path: PathBuf,
        config: AcquisitionConfig,
        running: Arc<AtomicBool>,
        events: mpsc::Sender<MonitorEvent>,
    ) -> Self {
        Self {
            reader,
            buffer,
            sink,
            output_path,
            session_start: Instant::now(),
            config,
            running,
            events,
        }
    }

    /// Run until stopped or the device is lost. Consumes the loop.
    pub fn run(mut self) -> LoopExit {
        let exit = self.poll_until_exit();
        if let LoopExit::DeviceLost(ref reason) = exit {
            error!("balance connection lost: {reason}");
            self.final_flush();
            let _ = self.events.send(MonitorEvent::DeviceLost(reason.clone()));
        }
        exit
    }

    fn poll_until_exit(&mut self) -> LoopExit {
        let mut pending: Vec<u8> = Vec::new();
        let mut chunk = [0u8; 256];
        while self.running.load(Ordering::SeqCst) {
            match self.reader.read(&mut chunk) {
                Ok(0) => {
                    return LoopExit::DeviceLost("end of stream from serial port".to_string())
                }
                Ok(n) => {
                    pending.extend_from_slice(&chunk[..n]);
                    self.drain_lines(&mut pending);
                }
                Err(e) if is_no_data(&e) => {}
                Err(e) => return LoopExit::DeviceLost(e.to_string()),
            }
            std::thread::sleep(self.config.poll_interval);
        }
        LoopExit::Stopped
    }

    /// Split off and handle every complete line in `pending`; a trailing
    /// partial line stays buffered for the next read, up to [`MAX_LINE_BYTES`].
    fn drain_lines(&mut self, pending: &mut Vec<u8>) {
        while let Some(pos) = pending.iter().position(|&b| b == b'\n') {
            let line_bytes: Vec<u8> = pending.drain(..=pos).collect();
            match std::str::from_utf8(&line_bytes) {
                Ok(text) => self.handle_line(text.trim()),
                Err(e) => debug!("skipping undecodable line: {e}"),
            }
        }
        if pending.len() > MAX_LINE_BYTES {
            debug!(bytes = pending.len(), "discarding oversized partial line");
            pending.clear();
        }
    }

    fn handle_line(&mut self, line: &str) {
        if line.is_empty() {
            return;
        }
        debug!(%line, "received");
        let Some(value) = parser::extract_value(line) else {
            debug!(%line, "no numeric value in line");
            return;
        };
        let elapsed_secs = self.session_start.elapsed().as_secs_f64();
        let unsaved = {
            let mut buffer = self.buffer.write().unwrap_or_else(PoisonError::into_inner);
            buffer.append(value, Local::now(), elapsed_secs);
            buffer.unsaved_count()
        };
        if unsaved >= self.config.save_interval {
            self.flush();
        }
    }

    fn flush(&mut self) {
        let snapshot = self
            .buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .snapshot();
        match self.sink.flush(&self.output_path, &snapshot) {
            Ok(()) => {
                self.buffer
                    .write()
                    .unwrap_or_else(PoisonError::into_inner)
                    .mark_saved();
                debug!(rows = snapshot.len(), "flushed to {}", self.output_path.display());
            }
            Err(e) => {
                warn!("flush failed, will retry: {e}");
                let _ = self
                    .events
                    .send(MonitorEvent::PersistenceFailure(e.to_string()));
            }
        }
    }

    fn final_flush(&mut self) {
        let unsaved = self
            .buffer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .unsaved_count();
        if unsaved > 0 {
            self.flush();
        }
    }
}

/// Read errors that mean "nothing arrived yet", not a dead device.
fn is_no_data(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::buffer;

    /// Reader scripted with a sequence of results.
    struct ScriptedReader {
        script: std::collections::VecDeque<io::Result<Vec<u8>>>,
    }

    impl ScriptedReader {
        fn new(script: Vec<io::Result<Vec<u8>>>) -> Self {
            Self {
                script: script.into_iter().collect(),
            }
        }
    }

    impl Read for ScriptedReader {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.script.pop_front() {
                Some(Ok(bytes)) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Some(Err(e)) => Err(e),
                None => Err(io::Error::from(io::ErrorKind::TimedOut)),
            }
        }
    }

    fn test_loop(
        script: Vec<io::Result<Vec<u8>>>,
        buffer: SharedBuffer,
        dir: &std::path::Path,
        save_interval: usize,
        running: Arc<AtomicBool>,
    ) -> (AcquisitionLoop, mpsc::Receiver<MonitorEvent>) {
        let (tx, rx) = mpsc::channel();
        let acquisition = AcquisitionLoop::new(
            Box::new(ScriptedReader::new(script)),
            buffer,
            CsvSink::new(dir),
            dir.join("out.csv"),
            AcquisitionConfig {
                poll_interval: Duration::from_millis(1),
                save_interval,
            },
            running,
            tx,
        );
        (acquisition, rx)
    }

    /// Clears the running flag after the scripted reads are exhausted so the
    /// loop exits through the cooperative path.
    fn stop_after(running: &Arc<AtomicBool>, delay: Duration) {
        let running = Arc::clone(running);
        std::thread::spawn(move || {
            std::thread::sleep(delay);
            running.store(false, Ordering::SeqCst);
        });
    }

    #[test]
    fn parses_only_lines_with_values_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (acquisition, _rx) = test_loop(
            vec![
                Ok(b"junk\r\n".to_vec()),
                Ok(b"1.234 g\r\n".to_vec()),
                Ok(b"-2.000\r\n".to_vec()),
            ],
            Arc::clone(&buffer),
            dir.path(),
            100,
            Arc::clone(&running),
        );
        stop_after(&running, Duration::from_millis(50));
        assert_eq!(acquisition.run(), LoopExit::Stopped);

        let snapshot = buffer.read().unwrap().snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(snapshot[0].value, 1.234);
        assert_eq!(snapshot[1].value, -2.0);
        assert!(snapshot[1].elapsed_secs >= snapshot[0].elapsed_secs);
    }

    #[test]
    fn reassembles_lines_split_across_reads() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (acquisition, _rx) = test_loop(
            vec![
                Ok(b"12.".to_vec()),
                Err(io::Error::from(io::ErrorKind::TimedOut)),
                Ok(b"5 g\r\n".to_vec()),
            ],
            Arc::clone(&buffer),
            dir.path(),
            100,
            Arc::clone(&running),
        );
        stop_after(&running, Duration::from_millis(50));
        acquisition.run();

        let snapshot = buffer.read().unwrap().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, 12.5);
    }

    #[test]
    fn newline_free_stream_is_bounded_and_recovers() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        // Enough newline-free noise to cross MAX_LINE_BYTES, then a real line.
        let mut script: Vec<io::Result<Vec<u8>>> =
            (0..6).map(|_| Ok(vec![b'x'; 256])).collect();
        script.push(Ok(b"\r\n7.5\r\n".to_vec()));
        let (acquisition, _rx) = test_loop(
            script,
            Arc::clone(&buffer),
            dir.path(),
            100,
            Arc::clone(&running),
        );
        stop_after(&running, Duration::from_millis(60));
        assert_eq!(acquisition.run(), LoopExit::Stopped);

        // The noise was discarded, never parsed, and the stream recovered.
        let snapshot = buffer.read().unwrap().snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].value, 7.5);
    }

    #[test]
    fn invalid_utf8_is_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (acquisition, _rx) = test_loop(
            vec![
                Ok(vec![0xff, 0xfe, b'\n']),
                Ok(b"3.5\r\n".to_vec()),
            ],
            Arc::clone(&buffer),
            dir.path(),
            100,
            Arc::clone(&running),
        );
        stop_after(&running, Duration::from_millis(50));
        assert_eq!(acquisition.run(), LoopExit::Stopped);
        assert_eq!(buffer.read().unwrap().len(), 1);
    }

    #[test]
    fn hitting_save_interval_flushes_and_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (acquisition, _rx) = test_loop(
            vec![
                Ok(b"1.0\r\n".to_vec()),
                Ok(b"2.0\r\n".to_vec()),
                Ok(b"3.0\r\n".to_vec()),
            ],
            Arc::clone(&buffer),
            dir.path(),
            2,
            Arc::clone(&running),
        );
        stop_after(&running, Duration::from_millis(50));
        acquisition.run();

        // Two samples crossed the threshold; the third stays unsaved.
        assert_eq!(buffer.read().unwrap().unsaved_count(), 1);
        let contents = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert!(contents.starts_with("DateTime,Mass\n"));
        assert_eq!(contents.lines().count(), 3);
    }

    #[test]
    fn fatal_read_error_exits_with_device_lost_and_flushes() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (acquisition, rx) = test_loop(
            vec![
                Ok(b"4.2\r\n".to_vec()),
                Err(io::Error::from(io::ErrorKind::BrokenPipe)),
            ],
            Arc::clone(&buffer),
            dir.path(),
            100,
            running,
        );
        match acquisition.run() {
            LoopExit::DeviceLost(_) => {}
            other => panic!("unexpected exit: {other:?}"),
        }
        // Best-effort flush captured the unsaved sample.
        let contents = std::fs::read_to_string(dir.path().join("out.csv")).unwrap();
        assert_eq!(contents.lines().count(), 2);
        // And the loss was surfaced as an event.
        assert!(matches!(rx.try_recv(), Ok(MonitorEvent::DeviceLost(_))));
    }

    #[test]
    fn persistence_failure_keeps_the_loop_running() {
        let dir = tempfile::tempdir().unwrap();
        let buffer = buffer::shared();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();
        // Point the flush at a path whose parent does not exist.
        let acquisition = AcquisitionLoop::new(
            Box::new(ScriptedReader::new(vec![
                Ok(b"1.0\r\n".to_vec()),
                Ok(b"2.0\r\n".to_vec()),
            ])),
            Arc::clone(&buffer),
            CsvSink::new(dir.path()),
            dir.path().join("missing").join("out.csv"),
            AcquisitionConfig {
                poll_interval: Duration::from_millis(1),
                save_interval: 1,
            },
            Arc::clone(&running),
            tx,
        );
        stop_after(&running, Duration::from_millis(50));
        assert_eq!(acquisition.run(), LoopExit::Stopped);

        // Both samples captured despite every flush failing.
        assert_eq!(buffer.read().unwrap().len(), 2);
        assert_eq!(buffer.read().unwrap().unsaved_count(), 2);
        assert!(matches!(
            rx.try_recv(),
            Ok(MonitorEvent::PersistenceFailure(_))
        ));
    }
}
