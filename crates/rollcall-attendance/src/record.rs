use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

pub const DATE_FORMAT: &str = "%Y-%m-%d";
pub const TIME_FORMAT: &str = "%H:%M:%S";

/// One attendance event: a person seen on a given day.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub name: String,
    pub date: NaiveDate,
    /// Time of day, whole seconds.
    pub time: NaiveTime,
}

impl AttendanceRecord {
    pub fn new(name: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        Self {
            name: name.into(),
            date,
            time: time.with_nanosecond(0).unwrap_or(time),
        }
    }

    pub fn at(name: impl Into<String>, when: NaiveDateTime) -> Self {
        Self::new(name, when.date(), when.time())
    }

    pub fn date_string(&self) -> String {
        self.date.format(DATE_FORMAT).to_string()
    }

    pub fn time_string(&self) -> String {
        self.time.format(TIME_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_truncated_to_seconds() {
        let when = NaiveDate::from_ymd_opt(2026, 3, 9)
            .unwrap()
            .and_hms_milli_opt(7, 5, 9, 750)
            .unwrap();
        let record = AttendanceRecord::at("alice", when);
        assert_eq!(record.date_string(), "2026-03-09");
        assert_eq!(record.time_string(), "07:05:09");
        assert_eq!(record.time.nanosecond(), 0);
    }
}
