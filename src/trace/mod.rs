//! CSV trace file shared by every part of a run.
//!
//! Producers never touch the file: [`TraceSink::write`] stamps a record and
//! queues it for the single background writer owned by the sink.

mod csv;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;

use csv::{CsvWriter, TraceRecord};

#[derive(Debug, Error)]
pub enum TraceError {
    #[error("Trace has been already initialized with {}", .0.display())]
    AlreadyInitialized(PathBuf),

    #[error("Failed to open {}: {source}", .path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Handle to the trace sink. Clones share the same file and writer.
#[derive(Clone, Default)]
pub struct TraceSink {
    writer: Arc<RwLock<Option<CsvWriter>>>,
}

impl TraceSink {
    /// A sink with tracing disabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or truncates) `path`, writes the header and starts the writer.
    pub fn enable(&self, path: &Path) -> Result<(), TraceError> {
        let mut writer = self.writer.write().unwrap_or_else(PoisonError::into_inner);

        if let Some(existing) = writer.as_ref() {
            return Err(TraceError::AlreadyInitialized(existing.path().to_path_buf()));
        }

        *writer = Some(CsvWriter::open(path)?);
        Ok(())
    }

    /// Flushes everything written so far and closes the file.
    pub fn disable(&self) {
        let writer = self
            .writer
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(writer) = writer {
            writer.close();
        }
    }

    #[cfg(test)]
    pub fn is_enabled(&self) -> bool {
        self.writer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    #[cfg(test)]
    pub fn path(&self) -> Option<PathBuf> {
        self.writer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|w| w.path().to_path_buf())
    }

    /// Queues `message`. Never blocks on I/O and never fails.
    pub fn write(&self, message: impl Into<String>) {
        let writer = self.writer.read().unwrap_or_else(PoisonError::into_inner);

        if let Some(writer) = writer.as_ref() {
            writer.send(TraceRecord::new(message.into()));
        }
    }
}

/// Disables the sink when dropped.
pub struct TraceGuard(TraceSink);

impl TraceGuard {
    pub fn new(sink: TraceSink) -> Self {
        Self(sink)
    }
}

impl Drop for TraceGuard {
    fn drop(&mut self) {
        self.0.disable();
    }
}

/// `<exe-stem>_<YYYYMMDD>T<HHMMSS>Z.csv`
pub fn trace_file_name(exe_stem: &str, now: DateTime<Utc>) -> String {
    format!("{}_{}.csv", exe_stem, now.format("%Y%m%dT%H%M%SZ"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;
    use std::thread;

    fn rows(path: &Path) -> Vec<String> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn file_name_uses_utc_stamp() {
        let now = Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap();
        assert_eq!(trace_file_name("gettoken", now), "gettoken_20240102T030405Z.csv");
    }

    #[test]
    fn header_is_written_on_enable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let sink = TraceSink::new();

        sink.enable(&path).unwrap();
        assert!(sink.is_enabled());
        assert_eq!(sink.path().as_deref(), Some(path.as_path()));
        sink.disable();

        assert!(!sink.is_enabled());
        assert_eq!(rows(&path), vec!["date-time,thread-id,message"]);
    }

    #[test]
    fn every_record_written_before_disable_lands_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let sink = TraceSink::new();
        sink.enable(&path).unwrap();

        let producers: Vec<_> = (0..4)
            .map(|p| {
                let sink = sink.clone();
                thread::spawn(move || {
                    for i in 0..250 {
                        sink.write(format!("producer {} message {}", p, i));
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        sink.disable();

        let rows = rows(&path);
        assert_eq!(rows.len(), 1 + 4 * 250);
        for p in 0..4 {
            for i in 0..250 {
                let needle = format!(",\"producer {} message {}\"", p, i);
                assert_eq!(rows.iter().filter(|r| r.ends_with(&needle)).count(), 1);
            }
        }
    }

    #[test]
    fn quotes_are_sanitized_in_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let sink = TraceSink::new();
        sink.enable(&path).unwrap();

        sink.write("DisplayName: \"Microsoft\"\n");
        sink.disable();

        let rows = rows(&path);
        assert_eq!(rows.len(), 2);
        assert!(rows[1].ends_with(",\"DisplayName: 'Microsoft'\""));
        assert_eq!(rows[1].matches('"').count(), 2);
    }

    #[test]
    fn second_enable_fails_and_keeps_first_file() {
        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.csv");
        let second = dir.path().join("second.csv");
        let sink = TraceSink::new();

        sink.enable(&first).unwrap();
        let err = sink.enable(&second).unwrap_err();
        assert!(matches!(err, TraceError::AlreadyInitialized(ref p) if p == &first));
        assert!(!second.exists());

        sink.write("still here");
        sink.disable();
        assert!(rows(&first)[1].ends_with(",\"still here\""));
    }

    #[test]
    fn enable_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("trace.csv");
        let sink = TraceSink::new();

        assert!(matches!(sink.enable(&path), Err(TraceError::Open { .. })));
        assert!(!sink.is_enabled());
        sink.write("dropped silently");
    }

    #[test]
    fn guard_disables_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trace.csv");
        let sink = TraceSink::new();
        sink.enable(&path).unwrap();

        {
            let _guard = TraceGuard::new(sink.clone());
            sink.write("inside");
        }

        assert!(!sink.is_enabled());
        assert_eq!(rows(&path).len(), 2);
    }
}
