use crate::engine::EngineControl;
use chrono::NaiveDate;
use rollcall_attendance::AttendanceRecord;
use rollcall_core::FaceMatch;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};
use zbus::interface;
use zbus::object_server::SignalEmitter;

pub const BUS_NAME: &str = "org.rollcall.Attendance1";
pub const OBJECT_PATH: &str = "/org/rollcall/Attendance1";

/// What the presentation side knows: today's table and the latest frame.
#[derive(Debug)]
pub struct ServiceState {
    date: NaiveDate,
    today: Vec<AttendanceRecord>,
    faces: Vec<FaceMatch>,
    gallery_size: usize,
    log_path: PathBuf,
}

impl ServiceState {
    pub fn new(date: NaiveDate, gallery_size: usize, log_path: PathBuf) -> Self {
        Self {
            date,
            today: Vec::new(),
            faces: Vec::new(),
            gallery_size,
            log_path,
        }
    }

    /// Add a record to the table, starting a fresh table on a new day.
    pub fn record(&mut self, record: AttendanceRecord) {
        if record.date > self.date {
            self.date = record.date;
            self.today.clear();
        }
        if record.date == self.date {
            self.today.push(record);
        }
    }

    pub fn set_faces(&mut self, faces: Vec<FaceMatch>) {
        self.faces = faces;
    }

    pub fn today(&self) -> &[AttendanceRecord] {
        &self.today
    }

    pub fn today_json(&self) -> serde_json::Value {
        self.today
            .iter()
            .map(|r| {
                serde_json::json!({
                    "name": r.name,
                    "date": r.date_string(),
                    "time": r.time_string(),
                })
            })
            .collect()
    }

    pub fn faces_json(&self) -> serde_json::Value {
        self.faces
            .iter()
            .map(|f| {
                serde_json::json!({
                    "label": f.identity.as_str(),
                    "top": f.location.top,
                    "right": f.location.right,
                    "bottom": f.location.bottom,
                    "left": f.location.left,
                    "distance": f.distance,
                })
            })
            .collect()
    }
}

pub type SharedState = Arc<Mutex<ServiceState>>;

pub fn lock(state: &SharedState) -> MutexGuard<'_, ServiceState> {
    state.lock().unwrap_or_else(|e| e.into_inner())
}

/// D-Bus interface for the Rollcall attendance daemon.
///
/// Bus name: org.rollcall.Attendance1
/// Object path: /org/rollcall/Attendance1
pub struct AttendanceService {
    control: EngineControl,
    state: SharedState,
}

impl AttendanceService {
    pub fn new(control: EngineControl, state: SharedState) -> Self {
        Self { control, state }
    }
}

#[interface(name = "org.rollcall.Attendance1")]
impl AttendanceService {
    /// Resume frame processing. Returns true if it was paused.
    async fn start(&self) -> bool {
        tracing::info!("start requested");
        self.control.start()
    }

    /// Pause frame processing. Returns true if it was running.
    async fn stop(&self) -> bool {
        tracing::info!("stop requested");
        self.control.pause()
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        let state = lock(&self.state);
        Ok(serde_json::json!({
            "version": env!("CARGO_PKG_VERSION"),
            "running": self.control.is_running(),
            "frames_processed": self.control.frames_processed(),
            "gallery_size": state.gallery_size,
            "recorded_today": state.today.len(),
            "log_path": state.log_path.display().to_string(),
        })
        .to_string())
    }

    /// Today's attendance table as a JSON array.
    async fn today(&self) -> zbus::fdo::Result<String> {
        Ok(lock(&self.state).today_json().to_string())
    }

    /// Labelled faces from the most recent frame as a JSON array.
    async fn current_faces(&self) -> zbus::fdo::Result<String> {
        Ok(lock(&self.state).faces_json().to_string())
    }

    /// Emitted once per person per day when attendance is recorded.
    #[zbus(signal)]
    pub async fn attendance_recorded(
        emitter: &SignalEmitter<'_>,
        name: &str,
        date: &str,
        time: &str,
    ) -> zbus::Result<()>;
}
