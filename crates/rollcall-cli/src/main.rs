use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_attendance::record::{DATE_FORMAT, TIME_FORMAT};
use rollcall_attendance::{read_log, read_log_for, AttendanceRecord};
use rollcall_core::{Config, Gallery, OnnxFaceEncoder};
use rollcall_hw::Camera;

#[derive(Parser)]
#[command(name = "rollcall", about = "Rollcall face-recognition attendance CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resume frame processing in the daemon
    Start,
    /// Pause frame processing in the daemon
    Stop,
    /// Show daemon status
    Status,
    /// Show today's attendance as seen by the daemon
    Today,
    /// Show the faces labelled in the daemon's latest frame
    Faces,
    /// Load the gallery locally and list enrolled people
    Gallery,
    /// Print records from the attendance log file
    Log {
        /// Only show this date (YYYY-MM-DD); defaults to today
        #[arg(short, long, conflicts_with = "all")]
        date: Option<NaiveDate>,
        /// Show every record in the log
        #[arg(short, long)]
        all: bool,
    },
    /// List V4L2 capture devices
    Devices,
}

#[zbus::proxy(
    interface = "org.rollcall.Attendance1",
    default_service = "org.rollcall.Attendance1",
    default_path = "/org/rollcall/Attendance1"
)]
trait Attendance {
    fn start(&self) -> zbus::Result<bool>;
    fn stop(&self) -> zbus::Result<bool>;
    fn status(&self) -> zbus::Result<String>;
    fn today(&self) -> zbus::Result<String>;
    fn current_faces(&self) -> zbus::Result<String>;
}

async fn daemon() -> Result<AttendanceProxy<'static>> {
    let connection = zbus::Connection::session()
        .await
        .context("failed to connect to the session bus")?;
    AttendanceProxy::new(&connection)
        .await
        .context("rollcalld is not reachable on D-Bus")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Start => {
            if daemon().await?.start().await? {
                println!("Frame processing started");
            } else {
                println!("Frame processing already running");
            }
        }
        Commands::Stop => {
            if daemon().await?.stop().await? {
                println!("Frame processing paused");
            } else {
                println!("Frame processing already paused");
            }
        }
        Commands::Status => {
            let status = daemon().await?.status().await?;
            println!("{}", pretty(&status)?);
        }
        Commands::Today => {
            let today = daemon().await?.today().await?;
            let records: Vec<AttendanceRecord> =
                serde_json::from_str::<Vec<serde_json::Value>>(&today)
                    .context("daemon returned malformed attendance")?
                    .iter()
                    .filter_map(record_from_json)
                    .collect();
            print!("{}", format_records(&records));
        }
        Commands::Faces => {
            let faces = daemon().await?.current_faces().await?;
            println!("{}", pretty(&faces)?);
        }
        Commands::Gallery => {
            let config = Config::load().context("failed to load configuration")?;
            let mut encoder = OnnxFaceEncoder::load(&config.model_dir).with_context(|| {
                format!("failed to load models from {}", config.model_dir.display())
            })?;
            let gallery = Gallery::load(&config.gallery_dir, &mut encoder);
            if gallery.is_empty() {
                println!("No people enrolled in {}", config.gallery_dir.display());
            }
            for entry in gallery.entries() {
                println!("{}\t{}-d", entry.name, entry.embedding.dim());
            }
        }
        Commands::Log { date, all } => {
            let config = Config::load().context("failed to load configuration")?;
            let records = if all {
                read_log(&config.log_path)?
            } else {
                let date = date.unwrap_or_else(|| chrono::Local::now().date_naive());
                read_log_for(&config.log_path, date)?
            };
            print!("{}", format_records(&records));
        }
        Commands::Devices => {
            let devices = Camera::list_devices();
            if devices.is_empty() {
                println!("No V4L2 capture devices found");
            }
            for dev in devices {
                println!("{}\t{} ({}, {})", dev.path, dev.name, dev.driver, dev.bus);
            }
        }
    }

    Ok(())
}

fn pretty(json: &str) -> Result<String> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("daemon returned malformed JSON")?;
    Ok(serde_json::to_string_pretty(&value)?)
}

fn record_from_json(value: &serde_json::Value) -> Option<AttendanceRecord> {
    let name = value["name"].as_str()?;
    let date = NaiveDate::parse_from_str(value["date"].as_str()?, DATE_FORMAT).ok()?;
    let time = chrono::NaiveTime::parse_from_str(value["time"].as_str()?, TIME_FORMAT).ok()?;
    Some(AttendanceRecord::new(name, date, time))
}

/// Aligned table of records, one per line.
fn format_records(records: &[AttendanceRecord]) -> String {
    if records.is_empty() {
        return "No attendance recorded\n".to_string();
    }
    let width = records
        .iter()
        .map(|r| r.name.chars().count())
        .max()
        .unwrap_or(0)
        .max("Name".len());

    let mut out = format!("{:<width$}  {:<10}  {}\n", "Name", "Date", "Time");
    for r in records {
        out.push_str(&format!(
            "{:<width$}  {}  {}\n",
            r.name,
            r.date_string(),
            r.time_string()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_records_aligns_names() {
        let date = NaiveDate::from_ymd_opt(2026, 10, 19).unwrap();
        let records = vec![
            AttendanceRecord::at("Lovelace, Ada", date.and_hms_opt(9, 1, 2).unwrap()),
            AttendanceRecord::at("Bo", date.and_hms_opt(10, 0, 0).unwrap()),
        ];
        let table = format_records(&records);
        let lines: Vec<_> = table.lines().collect();
        assert_eq!(lines[0], "Name           Date        Time");
        assert_eq!(lines[1], "Lovelace, Ada  2026-10-19  09:01:02");
        assert_eq!(lines[2], "Bo             2026-10-19  10:00:00");
    }

    #[test]
    fn test_format_records_empty() {
        assert_eq!(format_records(&[]), "No attendance recorded\n");
    }

    #[test]
    fn test_record_from_daemon_json() {
        let value = serde_json::json!({ "name": "alice", "date": "2026-10-19", "time": "08:59:59" });
        let record = record_from_json(&value).unwrap();
        assert_eq!(record.name, "alice");
        assert_eq!(record.time_string(), "08:59:59");
        assert!(record_from_json(&serde_json::json!({ "name": "x" })).is_none());
    }

    #[test]
    fn test_cli_parses_log_date() {
        let cli = Cli::try_parse_from(["rollcall", "log", "--date", "2026-10-19"]).unwrap();
        match cli.command {
            Commands::Log { date, all } => {
                assert_eq!(date, NaiveDate::from_ymd_opt(2026, 10, 19));
                assert!(!all);
            }
            _ => panic!("expected log command"),
        }
        assert!(Cli::try_parse_from(["rollcall", "log", "--date", "2026-10-19", "--all"]).is_err());
    }
}
