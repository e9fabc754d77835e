use chrono::{NaiveDate, NaiveDateTime};
use rollcall_attendance::{AttendanceGate, AttendanceRecord, AttendanceSink};
use rollcall_core::{FaceEncoder, FaceMatch, FrameMatcher, Gallery};
use rollcall_hw::FrameSource;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;

/// Pause after a failed capture before trying again.
const CAPTURE_BACKOFF: Duration = Duration::from_millis(500);
/// Poll interval while the loop is paused.
const IDLE_POLL: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("engine thread panicked")]
    Panicked,
}

/// Messages sent from the engine thread to the presentation side.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A frame was processed; every face found in it, labelled.
    Frame { sequence: u32, matches: Vec<FaceMatch> },
    /// A first sighting of the day was accepted and queued for the log.
    Recorded(AttendanceRecord),
}

/// Frame loop tuning.
#[derive(Debug, Clone, Copy)]
pub struct EngineSettings {
    /// Sleep after each processed frame.
    pub frame_interval: Duration,
    /// Begin processing immediately instead of waiting for `start`.
    pub start_running: bool,
    /// Wall clock used to date attendance records.
    pub clock: fn() -> NaiveDateTime,
}

impl EngineSettings {
    pub fn new(frame_interval: Duration, start_running: bool) -> Self {
        Self {
            frame_interval,
            start_running,
            clock: local_now,
        }
    }
}

fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Clone-safe start/stop control over a running engine.
#[derive(Clone, Default)]
pub struct EngineControl {
    stop: Arc<AtomicBool>,
    running: Arc<AtomicBool>,
    frames: Arc<AtomicU64>,
}

impl EngineControl {
    /// Resume frame processing. Returns true if the engine was paused.
    pub fn start(&self) -> bool {
        let changed = !self.running.swap(true, Ordering::SeqCst);
        if changed {
            tracing::info!("frame processing started");
        }
        changed
    }

    /// Pause frame processing. Returns true if the engine was running.
    pub fn pause(&self) -> bool {
        let changed = self.running.swap(false, Ordering::SeqCst);
        if changed {
            tracing::info!("frame processing paused");
        }
        changed
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Frames matched since the engine was spawned.
    pub fn frames_processed(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }
}

/// Owner of the engine thread.
pub struct EngineHandle {
    control: EngineControl,
    thread: std::thread::JoinHandle<()>,
}

impl EngineHandle {
    pub fn control(&self) -> EngineControl {
        self.control.clone()
    }

    /// Signal the loop to exit and wait for it.
    ///
    /// The engine's sink handle is dropped with the thread, so the sink can
    /// drain once every other handle is gone.
    pub fn shutdown(self) -> Result<(), EngineError> {
        self.control.stop.store(true, Ordering::SeqCst);
        self.thread.join().map_err(|_| EngineError::Panicked)
    }
}

/// Run every match through the gate, returning the records it admitted.
///
/// Several faces in one frame may carry the same name; only the first can be
/// admitted.
pub fn admit_matches(
    gate: &AttendanceGate,
    matches: &[FaceMatch],
    now: NaiveDateTime,
) -> Vec<AttendanceRecord> {
    matches
        .iter()
        .filter_map(|m| gate.admit(&m.identity, now))
        .collect()
}

/// Spawn the frame loop on a dedicated OS thread.
///
/// Each cycle captures one frame, labels its faces, admits first sightings
/// through the gate, hands admitted records to the sink and reports the
/// frame on `events`. A failed capture or match aborts only that cycle.
pub fn spawn_engine<S, E>(
    mut source: S,
    mut matcher: FrameMatcher<E>,
    gallery: Gallery,
    gate: Arc<AttendanceGate>,
    sink: AttendanceSink,
    events: mpsc::UnboundedSender<EngineEvent>,
    settings: EngineSettings,
) -> Result<EngineHandle, EngineError>
where
    S: FrameSource + Send + 'static,
    E: FaceEncoder + Send + 'static,
{
    let control = EngineControl::default();
    control
        .running
        .store(settings.start_running, Ordering::SeqCst);
    let ctl = control.clone();

    let thread = std::thread::Builder::new()
        .name("rollcall-engine".into())
        .spawn(move || {
            tracing::info!(
                gallery = gallery.len(),
                running = ctl.is_running(),
                "engine thread started"
            );
            let mut current_date: Option<NaiveDate> = None;

            while !ctl.stop_requested() {
                if !ctl.is_running() {
                    std::thread::sleep(IDLE_POLL);
                    continue;
                }

                let frame = match source.next_frame() {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!(error = %e, "frame capture failed; retrying");
                        std::thread::sleep(CAPTURE_BACKOFF);
                        continue;
                    }
                };

                let matches = match matcher.match_frame(
                    &frame.data,
                    frame.width,
                    frame.height,
                    frame.order,
                    &gallery,
                ) {
                    Ok(matches) => matches,
                    Err(e) => {
                        tracing::warn!(error = %e, sequence = frame.sequence, "frame matching failed");
                        std::thread::sleep(settings.frame_interval);
                        continue;
                    }
                };
                ctl.frames.fetch_add(1, Ordering::Relaxed);

                let now = (settings.clock)();
                if current_date != Some(now.date()) {
                    if current_date.is_some() {
                        tracing::info!(date = %now.date(), "new day; attendance history reset");
                    }
                    gate.forget_before(now.date());
                    current_date = Some(now.date());
                }

                for record in admit_matches(&gate, &matches, now) {
                    tracing::info!(
                        name = %record.name,
                        time = %record.time_string(),
                        "attendance recorded"
                    );
                    if !sink.enqueue(record.clone()) {
                        tracing::error!(name = %record.name, "attendance sink closed; record lost");
                    }
                    let _ = events.send(EngineEvent::Recorded(record));
                }

                let _ = events.send(EngineEvent::Frame {
                    sequence: frame.sequence,
                    matches,
                });

                std::thread::sleep(settings.frame_interval);
            }

            tracing::info!(frames = ctl.frames_processed(), "engine thread exiting");
        })?;

    Ok(EngineHandle { control, thread })
}
