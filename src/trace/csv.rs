use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};

use chrono::{DateTime, Local};

use super::TraceError;

pub const HEADER: &str = "date-time,thread-id,message\n";

/// A single trace line, stamped on the producing thread.
#[derive(Debug, Clone)]
pub struct TraceRecord {
    pub thread_id: u64,
    pub time: DateTime<Local>,
    pub message: String,
}

impl TraceRecord {
    pub fn new(message: String) -> Self {
        Self {
            thread_id: current_thread_id(),
            time: Local::now(),
            message,
        }
    }

    /// `date-time,thread-id,"message"` with quotes folded to `'`.
    pub fn to_csv_row(&self) -> String {
        let message = self.message.replace('"', "'");
        let message = message.strip_suffix('\n').unwrap_or(&message);

        format!(
            "{},{},\"{}\"\n",
            self.time.format("%Y-%m-%dT%H:%M:%S%z"),
            self.thread_id,
            message
        )
    }
}

#[cfg(windows)]
pub fn current_thread_id() -> u64 {
    // SAFETY: no preconditions.
    u64::from(unsafe { windows::Win32::System::Threading::GetCurrentThreadId() })
}

#[cfg(not(windows))]
pub fn current_thread_id() -> u64 {
    use std::sync::atomic::{AtomicU64, Ordering};

    static NEXT_ID: AtomicU64 = AtomicU64::new(1);

    thread_local! {
        static THREAD_ID: u64 = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    }

    THREAD_ID.with(|id| *id)
}

/// Owns the trace file through a single background writer thread.
pub struct CsvWriter {
    path: PathBuf,
    sender: Sender<TraceRecord>,
    worker: JoinHandle<()>,
}

impl CsvWriter {
    pub fn open(path: &Path) -> Result<Self, TraceError> {
        let open_error = |source| TraceError::Open {
            path: path.to_path_buf(),
            source,
        };

        let file = File::create(path).map_err(open_error)?;
        let mut out = BufWriter::new(file);
        out.write_all(HEADER.as_bytes()).map_err(open_error)?;
        out.flush().map_err(open_error)?;

        let (sender, receiver) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("trace-writer".to_string())
            .spawn(move || write_loop(receiver, out))?;

        tracing::debug!("Trace writer started for {}", path.display());

        Ok(Self {
            path: path.to_path_buf(),
            sender,
            worker,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn send(&self, record: TraceRecord) {
        // The receiver only goes away with the worker, which outlives `self`.
        let _ = self.sender.send(record);
    }

    /// Stops the writer and waits until every queued record is on disk.
    pub fn close(self) {
        let Self { path, sender, worker } = self;
        drop(sender);

        if worker.join().is_err() {
            tracing::warn!("Trace writer for {} panicked", path.display());
        }
        tracing::debug!("Trace writer stopped for {}", path.display());
    }
}

fn write_loop<W: Write>(receiver: Receiver<TraceRecord>, mut out: W) {
    let mut failed = false;

    // `recv` blocks between batches and only fails once the sender is gone and
    // the queue is empty, so the last batch is drained before the loop exits.
    while let Ok(first) = receiver.recv() {
        let batch = std::iter::once(first).chain(receiver.try_iter());
        write_batch(&mut out, batch, &mut failed);
    }
}

fn write_batch<W, I>(out: &mut W, records: I, failed: &mut bool)
where
    W: Write,
    I: Iterator<Item = TraceRecord>,
{
    for record in records {
        let result = out.write_all(record.to_csv_row().as_bytes());
        report_failure(result, failed);
    }
    report_failure(out.flush(), failed);
}

fn report_failure(result: std::io::Result<()>, failed: &mut bool) {
    if let Err(e) = result {
        if !*failed {
            tracing::warn!("Failed to write to the trace file: {}", e);
            *failed = true;
        }
    }
}
