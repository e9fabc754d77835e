use anyhow::{Context, Result};
use rollcall_attendance::{read_log_for, spawn_sink, AttendanceGate, CsvLogWriter};
use rollcall_core::{Config, FrameMatcher, Gallery, OnnxFaceEncoder};
use rollcall_hw::Camera;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod dbus_interface;
mod engine;

use dbus_interface::{AttendanceService, ServiceState, SharedState, BUS_NAME, OBJECT_PATH};
use engine::{spawn_engine, EngineEvent, EngineSettings};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!("rollcalld starting");

    let config = Config::load().context("failed to load configuration")?;
    let today = chrono::Local::now().date_naive();

    let mut encoder = OnnxFaceEncoder::load(&config.model_dir)
        .with_context(|| format!("failed to load models from {}", config.model_dir.display()))?;
    tracing::info!(dir = %config.model_dir.display(), "face models loaded");

    let gallery = Gallery::load(&config.gallery_dir, &mut encoder);
    if gallery.is_empty() {
        tracing::warn!(
            dir = %config.gallery_dir.display(),
            "gallery is empty; every face will be Unknown"
        );
    }

    let camera_path = config.camera_path();
    let camera = Camera::open(&camera_path)
        .with_context(|| format!("failed to open camera {camera_path}"))?;
    tracing::info!(
        device = %camera_path,
        width = camera.width,
        height = camera.height,
        fourcc = ?camera.fourcc,
        "camera opened"
    );

    let state: SharedState = Arc::new(Mutex::new(ServiceState::new(
        today,
        gallery.len(),
        config.log_path.clone(),
    )));

    let gate = Arc::new(AttendanceGate::new());
    if config.resume_from_log {
        match read_log_for(&config.log_path, today) {
            Ok(records) => {
                gate.seed(&records);
                let mut state = dbus_interface::lock(&state);
                for record in records {
                    state.record(record);
                }
                tracing::info!(recorded = gate.len(), "resumed today's attendance from log");
            }
            Err(e) => tracing::warn!(error = %e, "could not read attendance log; starting fresh"),
        }
    }

    let matcher = FrameMatcher::new(encoder, config.match_tolerance, config.resize_factor)
        .context("invalid matcher settings")?;
    let (sink, sink_worker) =
        spawn_sink(CsvLogWriter::new(&config.log_path)).context("failed to start attendance sink")?;

    let (events_tx, mut events_rx) = mpsc::unbounded_channel();
    let settings = EngineSettings::new(
        Duration::from_millis(config.frame_interval_ms),
        config.autostart,
    );
    let engine = spawn_engine(camera, matcher, gallery, gate, sink, events_tx, settings)
        .context("failed to start engine")?;

    let connection = if config.dbus_enabled {
        let service = AttendanceService::new(engine.control(), Arc::clone(&state));
        let connection = zbus::connection::Builder::session()?
            .name(BUS_NAME)?
            .serve_at(OBJECT_PATH, service)?
            .build()
            .await
            .with_context(|| format!("failed to acquire D-Bus name {BUS_NAME}"))?;
        tracing::info!(name = BUS_NAME, path = OBJECT_PATH, "D-Bus interface registered");
        Some(connection)
    } else {
        tracing::info!("D-Bus interface disabled");
        None
    };

    tracing::info!(running = engine.control().is_running(), "rollcalld ready");

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                let Some(event) = event else { break };
                handle_event(event, &state, connection.as_ref()).await;
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for shutdown signal")?;
                break;
            }
        }
    }

    tracing::info!("rollcalld shutting down");
    tokio::task::spawn_blocking(move || -> Result<()> {
        engine.shutdown().context("engine shutdown failed")?;
        let stats = sink_worker.join().context("attendance sink failed")?;
        tracing::info!(written = stats.written, failed = stats.failed, "attendance log closed");
        Ok(())
    })
    .await??;

    Ok(())
}

async fn handle_event(event: EngineEvent, state: &SharedState, connection: Option<&zbus::Connection>) {
    match event {
        EngineEvent::Frame { matches, .. } => {
            dbus_interface::lock(state).set_faces(matches);
        }
        EngineEvent::Recorded(record) => {
            dbus_interface::lock(state).record(record.clone());
            let Some(connection) = connection else {
                return;
            };
            let emitted = match connection
                .object_server()
                .interface::<_, AttendanceService>(OBJECT_PATH)
                .await
            {
                Ok(iface) => {
                    AttendanceService::attendance_recorded(
                        iface.signal_emitter(),
                        &record.name,
                        &record.date_string(),
                        &record.time_string(),
                    )
                    .await
                }
                Err(e) => Err(e),
            };
            if let Err(e) = emitted {
                tracing::warn!(name = %record.name, error = %e, "failed to emit AttendanceRecorded");
            }
        }
    }
}
