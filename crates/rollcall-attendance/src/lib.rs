//! rollcall-attendance — Attendance gating and persistence.
//!
//! [`AttendanceGate`] admits at most one record per person per day;
//! admitted records are handed to an [`AttendanceSink`], whose background
//! thread appends them to the CSV attendance log.

pub mod gate;
pub mod log;
pub mod record;
pub mod sink;

pub use gate::AttendanceGate;
pub use log::{read_log, read_log_for, CsvLogWriter, LogError};
pub use record::AttendanceRecord;
pub use sink::{spawn_sink, AttendanceSink, RecordWriter, SinkError, SinkStats, SinkWorker};
