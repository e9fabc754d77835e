//! Background writer for accepted attendance records.
//!
//! Producers enqueue onto an unbounded channel and never wait for I/O. A
//! dedicated thread owns the [`RecordWriter`] and appends records in the order
//! they were enqueued; a failed append is logged and the record dropped.

use crate::log::LogError;
use crate::record::AttendanceRecord;
use thiserror::Error;
use tokio::sync::mpsc;

#[derive(Error, Debug)]
pub enum SinkError {
    #[error("failed to spawn sink thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("sink thread panicked")]
    Panicked,
}

/// Durable destination for attendance records.
pub trait RecordWriter: Send + 'static {
    /// Called once on the sink thread before the first record.
    fn prepare(&mut self) -> Result<(), LogError> {
        Ok(())
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError>;
}

/// Counts reported by the sink thread when it exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub written: usize,
    pub failed: usize,
}

/// Clone-safe producer handle.
#[derive(Clone)]
pub struct AttendanceSink {
    tx: mpsc::UnboundedSender<AttendanceRecord>,
}

impl AttendanceSink {
    /// Queue a record for writing. Returns false if the sink thread is gone.
    pub fn enqueue(&self, record: AttendanceRecord) -> bool {
        self.tx.send(record).is_ok()
    }
}

/// Owner of the sink thread.
pub struct SinkWorker {
    thread: std::thread::JoinHandle<SinkStats>,
}

impl SinkWorker {
    /// Wait for the thread to drain the queue and exit.
    ///
    /// Returns once every [`AttendanceSink`] clone has been dropped.
    pub fn join(self) -> Result<SinkStats, SinkError> {
        self.thread.join().map_err(|_| SinkError::Panicked)
    }
}

/// Start the sink thread around `writer`.
pub fn spawn_sink<W: RecordWriter>(mut writer: W) -> Result<(AttendanceSink, SinkWorker), SinkError> {
    let (tx, mut rx) = mpsc::unbounded_channel::<AttendanceRecord>();

    let thread = std::thread::Builder::new()
        .name("rollcall-sink".into())
        .spawn(move || {
            if let Err(e) = writer.prepare() {
                tracing::error!(error = %e, "attendance log unavailable; will retry on each record");
            }

            let mut stats = SinkStats::default();
            while let Some(record) = rx.blocking_recv() {
                match writer.append(&record) {
                    Ok(()) => {
                        stats.written += 1;
                        tracing::info!(
                            name = %record.name,
                            date = %record.date_string(),
                            time = %record.time_string(),
                            "logged attendance"
                        );
                    }
                    Err(e) => {
                        stats.failed += 1;
                        tracing::error!(name = %record.name, error = %e, "dropping attendance record");
                    }
                }
            }

            tracing::info!(written = stats.written, failed = stats.failed, "sink thread exiting");
            stats
        })?;

    Ok((AttendanceSink { tx }, SinkWorker { thread }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::{read_log, CsvLogWriter};
    use chrono::NaiveDate;
    use std::sync::{Arc, Mutex};

    fn record(name: &str, second: u32) -> AttendanceRecord {
        AttendanceRecord::at(
            name,
            NaiveDate::from_ymd_opt(2026, 10, 19)
                .unwrap()
                .and_hms_opt(9, 0, second)
                .unwrap(),
        )
    }

    /// Fails every append whose name is listed in `fail_on`.
    struct FlakyWriter {
        fail_on: Vec<String>,
        written: Arc<Mutex<Vec<String>>>,
    }

    impl RecordWriter for FlakyWriter {
        fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError> {
            if self.fail_on.contains(&record.name) {
                return Err(LogError::Io {
                    path: "flaky".into(),
                    source: std::io::Error::other("disk full"),
                });
            }
            self.written.lock().unwrap().push(record.name.clone());
            Ok(())
        }
    }

    #[test]
    fn test_failed_write_does_not_block_stream() {
        let written = Arc::new(Mutex::new(Vec::new()));
        let writer = FlakyWriter {
            fail_on: vec!["r1".into()],
            written: Arc::clone(&written),
        };

        let (sink, worker) = spawn_sink(writer).unwrap();
        for (i, name) in ["r0", "r1", "r2", "r3"].iter().enumerate() {
            assert!(sink.enqueue(record(name, i as u32)));
        }
        drop(sink);

        let stats = worker.join().unwrap();
        assert_eq!(stats, SinkStats { written: 3, failed: 1 });
        assert_eq!(*written.lock().unwrap(), vec!["r0", "r2", "r3"]);
    }

    #[test]
    fn test_records_written_in_enqueue_order() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance_log.csv");

        let (sink, worker) = spawn_sink(CsvLogWriter::new(&path)).unwrap();
        let producer = sink.clone();
        let expected: Vec<_> = (0..20).map(|i| record(&format!("p{i:02}"), i)).collect();
        for r in &expected {
            producer.enqueue(r.clone());
        }
        drop(producer);
        drop(sink);
        worker.join().unwrap();

        assert_eq!(read_log(&path).unwrap(), expected);
    }

    #[test]
    fn test_header_written_without_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance_log.csv");

        let (sink, worker) = spawn_sink(CsvLogWriter::new(&path)).unwrap();
        drop(sink);
        assert_eq!(worker.join().unwrap(), SinkStats::default());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "Name,Date,Time\r\n");
    }

    #[test]
    fn test_comma_in_name_survives_sink() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attendance_log.csv");

        let (sink, worker) = spawn_sink(CsvLogWriter::new(&path)).unwrap();
        sink.enqueue(record("Lovelace, Ada", 1));
        sink.enqueue(record("Hopper", 2));
        drop(sink);
        worker.join().unwrap();

        let names: Vec<_> = read_log(&path).unwrap().into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Lovelace, Ada", "Hopper"]);
    }
}
