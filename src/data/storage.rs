//! CSV storage writer.
//!
//! `CsvSink` persists a session's sample buffer to disk. Each flush rewrites
//! the whole file (header plus every row) rather than appending: the file on
//! disk always reflects a complete, never-partial table, even if a previous
//! flush was interrupted, and there is no append-and-hope-the-header-exists
//! race. Failures surface as `MonitorError::Persistence` and never stop
//! acquisition; the caller retries at the next flush threshold.

use crate::data::buffer::Sample;
use crate::error::{AppResult, MonitorError};
use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// Column header of a session file.
pub const CSV_HEADER: [&str; 2] = ["DateTime", "Mass"];

/// Sortable timestamp token used both in file names and in rows.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d_%H-%M-%S";

/// Writes session data as CSV files under a fixed output directory.
#[derive(Clone, Debug)]
pub struct CsvSink {
    output_dir: PathBuf,
}

impl CsvSink {
    /// Create a sink writing into `output_dir`.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Allocate the output file identity for a session starting at `start`.
    ///
    /// Creates the output directory if absent; writes no rows yet.
    pub fn begin_session(&self, start: DateTime<Local>) -> AppResult<PathBuf> {
        if !self.output_dir.exists() {
            std::fs::create_dir_all(&self.output_dir).map_err(|e| {
                MonitorError::Persistence(format!(
                    "Failed to create output directory '{}': {e}",
                    self.output_dir.display()
                ))
            })?;
        }
        let file_name = format!("sartorius_data_{}.csv", start.format(TIMESTAMP_FORMAT));
        Ok(self.output_dir.join(file_name))
    }

    /// Write the full snapshot to `path`, overwriting prior content.
    pub fn flush(&self, path: &Path, samples: &[Sample]) -> AppResult<()> {
        let mut writer = csv::Writer::from_path(path).map_err(|e| {
            MonitorError::Persistence(format!("Failed to open '{}': {e}", path.display()))
        })?;
        writer
            .write_record(CSV_HEADER)
            .map_err(|e| MonitorError::Persistence(format!("Failed to write header: {e}")))?;
        for sample in samples {
            writer
                .write_record(&[
                    sample.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    sample.value.to_string(),
                ])
                .map_err(|e| MonitorError::Persistence(format!("Failed to write row: {e}")))?;
        }
        writer
            .flush()
            .map_err(|e| MonitorError::Persistence(format!("Failed to flush: {e}")))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(elapsed: f64, value: f64) -> Sample {
        Sample {
            timestamp: Local::now(),
            elapsed_secs: elapsed,
            value,
        }
    }

    fn read_rows(path: &Path) -> Vec<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn begin_session_creates_directory_and_names_file() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path().join("out"));
        let path = sink.begin_session(Local::now()).unwrap();
        assert!(dir.path().join("out").is_dir());
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("sartorius_data_"), "name was {name}");
        assert!(name.ends_with(".csv"));
        // No rows written yet.
        assert!(!path.exists());
    }

    #[test]
    fn flush_writes_header_and_rows_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let path = sink.begin_session(Local::now()).unwrap();
        let samples = vec![sample(0.0, 1.234), sample(1.0, -2.0)];
        sink.flush(&path, &samples).unwrap();

        let rows = read_rows(&path);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0], "DateTime,Mass");
        assert!(rows[1].ends_with(",1.234"), "row was {}", rows[1]);
        assert!(rows[2].ends_with(",-2"), "row was {}", rows[2]);
    }

    #[test]
    fn consecutive_flushes_never_duplicate_rows() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let path = sink.begin_session(Local::now()).unwrap();

        let mut samples = vec![sample(0.0, 1.0)];
        sink.flush(&path, &samples).unwrap();
        samples.push(sample(1.0, 2.0));
        samples.push(sample(2.0, 3.0));
        sink.flush(&path, &samples).unwrap();

        let rows = read_rows(&path);
        // Header + exactly one row per sample in the later snapshot.
        assert_eq!(rows.len(), 1 + samples.len());
    }

    #[test]
    fn flush_into_missing_directory_reports_persistence_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sink = CsvSink::new(dir.path());
        let path = dir.path().join("nonexistent").join("data.csv");
        match sink.flush(&path, &[sample(0.0, 1.0)]) {
            Err(MonitorError::Persistence(_)) => {}
            other => panic!("unexpected result: {:?}", other.map(|_| ())),
        }
    }
}
