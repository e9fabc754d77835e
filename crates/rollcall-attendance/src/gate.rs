//! Once-per-person-per-day admission of attendance events.

use crate::record::AttendanceRecord;
use chrono::{NaiveDate, NaiveDateTime};
use rollcall_core::Identity;
use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Tracks which (name, date) pairs have already been recorded.
///
/// The history sits behind a mutex so that [`admit`](Self::admit) is a single
/// atomic check-then-insert even when several frame loops share the gate.
#[derive(Debug, Default)]
pub struct AttendanceGate {
    history: Mutex<HashSet<(String, NaiveDate)>>,
}

impl AttendanceGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Gate preloaded with already-persisted records.
    pub fn with_history<'a>(records: impl IntoIterator<Item = &'a AttendanceRecord>) -> Self {
        let gate = Self::new();
        gate.seed(records);
        gate
    }

    fn history(&self) -> MutexGuard<'_, HashSet<(String, NaiveDate)>> {
        self.history.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether an event for `identity` on `date` would be new.
    ///
    /// Unknown faces are never recorded.
    pub fn should_record(&self, identity: &Identity, date: NaiveDate) -> bool {
        match identity.name() {
            Some(name) => !self.history().contains(&(name.to_string(), date)),
            None => false,
        }
    }

    /// Atomically admit a sighting, returning the record to persist if it is
    /// the first one for this person on this date.
    pub fn admit(&self, identity: &Identity, now: NaiveDateTime) -> Option<AttendanceRecord> {
        let name = identity.name()?;
        let inserted = self.history().insert((name.to_string(), now.date()));
        inserted.then(|| AttendanceRecord::at(name, now))
    }

    /// Mark records as already taken.
    pub fn seed<'a>(&self, records: impl IntoIterator<Item = &'a AttendanceRecord>) {
        let mut history = self.history();
        for record in records {
            history.insert((record.name.clone(), record.date));
        }
    }

    /// Drop history for days before `date`.
    pub fn forget_before(&self, date: NaiveDate) {
        self.history().retain(|(_, d)| *d >= date);
    }

    /// Number of (name, date) pairs held.
    pub fn len(&self) -> usize {
        self.history().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
