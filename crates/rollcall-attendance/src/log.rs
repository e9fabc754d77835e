//! Attendance log file: comma-separated `Name,Date,Time` rows.
//!
//! Fields containing a comma, quote, CR or LF are quoted with embedded quotes
//! doubled. Rows are terminated with CRLF; the reader also accepts bare LF.

use crate::record::{AttendanceRecord, DATE_FORMAT, TIME_FORMAT};
use crate::sink::RecordWriter;
use chrono::{NaiveDate, NaiveTime};
use std::borrow::Cow;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const HEADER: [&str; 3] = ["Name", "Date", "Time"];
const LINE_TERMINATOR: &str = "\r\n";

#[derive(Error, Debug)]
pub enum LogError {
    #[error("log I/O on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("malformed log row {row}: {reason}")]
    Malformed { row: usize, reason: String },
}

fn escape_field(field: &str) -> Cow<'_, str> {
    if field.contains([',', '"', '\r', '\n']) {
        Cow::Owned(format!("\"{}\"", field.replace('"', "\"\"")))
    } else {
        Cow::Borrowed(field)
    }
}

/// Encode one row, including its line terminator.
pub fn format_row(fields: &[&str]) -> String {
    let mut row = fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(",");
    row.push_str(LINE_TERMINATOR);
    row
}

pub fn format_record(record: &AttendanceRecord) -> String {
    let date = record.date_string();
    let time = record.time_string();
    format_row(&[record.name.as_str(), date.as_str(), time.as_str()])
}

/// Split CSV text into rows of fields. Quoted fields may span lines.
pub fn split_rows(text: &str) -> Result<Vec<Vec<String>>, LogError> {
    let mut rows = Vec::new();
    let mut row: Vec<String> = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut field_started = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if in_quotes {
            match c {
                '"' if chars.peek() == Some(&'"') => {
                    chars.next();
                    field.push('"');
                }
                '"' => in_quotes = false,
                _ => field.push(c),
            }
            continue;
        }

        match c {
            '"' if !field_started => {
                in_quotes = true;
                field_started = true;
            }
            ',' => {
                row.push(std::mem::take(&mut field));
                field_started = false;
            }
            '\r' if chars.peek() == Some(&'\n') => {}
            '\n' => {
                row.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut row));
                field_started = false;
            }
            _ => {
                field.push(c);
                field_started = true;
            }
        }
    }

    if in_quotes {
        return Err(LogError::Malformed {
            row: rows.len() + 1,
            reason: "unterminated quoted field".into(),
        });
    }
    if field_started || !row.is_empty() {
        row.push(field);
        rows.push(row);
    }
    Ok(rows)
}

fn parse_fields(row: usize, fields: &[String]) -> Result<AttendanceRecord, LogError> {
    let malformed = |reason: String| LogError::Malformed { row, reason };
    let [name, date, time] = fields else {
        return Err(malformed(format!("expected 3 fields, got {}", fields.len())));
    };
    if name.is_empty() {
        return Err(malformed("empty name".into()));
    }
    let date = NaiveDate::parse_from_str(date, DATE_FORMAT)
        .map_err(|e| malformed(format!("bad date {date:?}: {e}")))?;
    let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
        .map_err(|e| malformed(format!("bad time {time:?}: {e}")))?;
    Ok(AttendanceRecord::new(name.clone(), date, time))
}

/// Parse log text into records.
///
/// The header row and blank rows are skipped; malformed rows are logged and
/// skipped so one bad line does not hide the rest of the history.
pub fn parse_log(text: &str) -> Result<Vec<AttendanceRecord>, LogError> {
    let mut records = Vec::new();
    for (i, fields) in split_rows(text)?.iter().enumerate() {
        let row = i + 1;
        if fields.iter().all(|f| f.is_empty()) || (row == 1 && fields == &HEADER) {
            continue;
        }
        match parse_fields(row, fields) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!(error = %e, "skipping attendance log row"),
        }
    }
    Ok(records)
}

/// Read every record from the log; a missing file is an empty history.
pub fn read_log(path: &Path) -> Result<Vec<AttendanceRecord>, LogError> {
    match std::fs::read_to_string(path) {
        Ok(text) => parse_log(&text),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(source) => Err(LogError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Records from the log for a single date, in log order.
pub fn read_log_for(path: &Path, date: NaiveDate) -> Result<Vec<AttendanceRecord>, LogError> {
    Ok(read_log(path)?.into_iter().filter(|r| r.date == date).collect())
}

/// Appends records to a CSV file, writing the header when the file is new.
pub struct CsvLogWriter {
    path: PathBuf,
    file: Option<File>,
}

impl CsvLogWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> LogError {
        LogError::Io {
            path: self.path.clone(),
            source,
        }
    }

    /// Open the file for appending, writing the header if it is missing or
    /// empty and terminating a torn last row.
    fn open(&self) -> Result<File, LogError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| self.io_err(e))?;
        let mut existing = Vec::new();
        file.read_to_end(&mut existing).map_err(|e| self.io_err(e))?;
        if existing.is_empty() {
            file.write_all(format_row(&HEADER).as_bytes())
                .map_err(|e| self.io_err(e))?;
            tracing::info!(path = %self.path.display(), "created attendance log");
        } else if let Some(repair) = row_repair(&existing) {
            tracing::warn!(path = %self.path.display(), "attendance log ends mid-row; closing it");
            file.write_all(repair.as_bytes()).map_err(|e| self.io_err(e))?;
        }
        Ok(file)
    }
}

/// Bytes that close an unterminated last row, if there is one.
fn row_repair(contents: &[u8]) -> Option<String> {
    let tail_start = contents.iter().rposition(|&b| b == b'\n').map_or(0, |i| i + 1);
    let tail = &contents[tail_start..];
    if tail.is_empty() {
        return None;
    }
    let open_quote = tail.iter().filter(|&&b| b == b'"').count() % 2 == 1;
    let mut repair = String::new();
    if open_quote {
        repair.push('"');
    }
    repair.push_str(LINE_TERMINATOR);
    Some(repair)
}

impl RecordWriter for CsvLogWriter {
    fn prepare(&mut self) -> Result<(), LogError> {
        if self.file.is_none() {
            self.file = Some(self.open()?);
        }
        Ok(())
    }

    fn append(&mut self, record: &AttendanceRecord) -> Result<(), LogError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open()?,
        };
        let len = file.metadata().map_err(|e| self.io_err(e))?.len();
        let row = format_record(record);
        if let Err(e) = file.write_all(row.as_bytes()).and_then(|_| file.flush()) {
            // Cut any partial row; the handle is dropped and reopened next time.
            if let Err(trunc) = file.set_len(len) {
                tracing::warn!(path = %self.path.display(), error = %trunc, "failed to roll back partial row");
            }
            return Err(self.io_err(e));
        }
        self.file = Some(file);
        Ok(())
    }
}
