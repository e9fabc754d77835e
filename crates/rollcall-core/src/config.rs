use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime configuration shared by the daemon and the CLI.
///
/// Resolved from defaults, then an optional TOML file, then `ROLLCALL_*`
/// environment variables.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// V4L2 device path or bare index (default: /dev/video0).
    pub camera_device: String,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Directory of reference images, one person per file stem.
    pub gallery_dir: PathBuf,
    /// Attendance CSV log.
    pub log_path: PathBuf,
    /// Maximum Euclidean embedding distance for a positive match.
    pub match_tolerance: f32,
    /// Downscale applied to frames before detection, in (0, 1].
    pub resize_factor: f64,
    /// Pause between processed frames.
    pub frame_interval_ms: u64,
    /// Seed today's attendance from the log at startup.
    pub resume_from_log: bool,
    /// Start processing frames immediately instead of waiting for Start().
    pub autostart: bool,
    /// Expose the D-Bus control interface.
    pub dbus_enabled: bool,
}

/// Keys accepted in the TOML config file.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    camera_device: Option<String>,
    model_dir: Option<PathBuf>,
    gallery_dir: Option<PathBuf>,
    log_path: Option<PathBuf>,
    match_tolerance: Option<f32>,
    resize_factor: Option<f64>,
    frame_interval_ms: Option<u64>,
    resume_from_log: Option<bool>,
    autostart: Option<bool>,
    dbus_enabled: Option<bool>,
}

impl Config {
    /// Built-in defaults rooted at `data_dir`.
    pub fn defaults_in(data_dir: &Path) -> Self {
        Self {
            camera_device: "/dev/video0".to_string(),
            model_dir: data_dir.join("models"),
            gallery_dir: data_dir.join("gallery"),
            log_path: data_dir.join("attendance_log.csv"),
            // ≈ cosine similarity 0.40 for L2-normalized ArcFace embeddings
            match_tolerance: 1.10,
            resize_factor: 0.25,
            frame_interval_ms: 10,
            resume_from_log: true,
            autostart: true,
            dbus_enabled: true,
        }
    }

    /// Load configuration from the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with(|key| std::env::var(key).ok())
    }

    /// Load configuration using `env` to look up variables.
    pub fn load_with(env: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::defaults_in(&data_dir(&env));

        let explicit = env("ROLLCALL_CONFIG").map(PathBuf::from);
        let path = explicit.clone().unwrap_or_else(|| default_config_file(&env));
        if explicit.is_some() || path.exists() {
            let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;
            config
                .apply_toml(&text)
                .map_err(|source| ConfigError::Parse { path: path.clone(), source })?;
            tracing::debug!(path = %path.display(), "applied config file");
        }

        config.apply_env(&env)?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay values present in a TOML document.
    pub fn apply_toml(&mut self, text: &str) -> Result<(), toml::de::Error> {
        let file: FileConfig = toml::from_str(text)?;

        if let Some(v) = file.camera_device { self.camera_device = v; }
        if let Some(v) = file.model_dir { self.model_dir = v; }
        if let Some(v) = file.gallery_dir { self.gallery_dir = v; }
        if let Some(v) = file.log_path { self.log_path = v; }
        if let Some(v) = file.match_tolerance { self.match_tolerance = v; }
        if let Some(v) = file.resize_factor { self.resize_factor = v; }
        if let Some(v) = file.frame_interval_ms { self.frame_interval_ms = v; }
        if let Some(v) = file.resume_from_log { self.resume_from_log = v; }
        if let Some(v) = file.autostart { self.autostart = v; }
        if let Some(v) = file.dbus_enabled { self.dbus_enabled = v; }
        Ok(())
    }

    fn apply_env(&mut self, env: &impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if let Some(v) = env("ROLLCALL_CAMERA_DEVICE") { self.camera_device = v; }
        if let Some(v) = env("ROLLCALL_MODEL_DIR") { self.model_dir = v.into(); }
        if let Some(v) = env("ROLLCALL_GALLERY_DIR") { self.gallery_dir = v.into(); }
        if let Some(v) = env("ROLLCALL_LOG_PATH") { self.log_path = v.into(); }

        if let Some(v) = env_parse(env, "ROLLCALL_MATCH_TOLERANCE")? { self.match_tolerance = v; }
        if let Some(v) = env_parse(env, "ROLLCALL_RESIZE_FACTOR")? { self.resize_factor = v; }
        if let Some(v) = env_parse(env, "ROLLCALL_FRAME_INTERVAL_MS")? { self.frame_interval_ms = v; }

        if let Some(v) = env_bool(env, "ROLLCALL_RESUME_FROM_LOG")? { self.resume_from_log = v; }
        if let Some(v) = env_bool(env, "ROLLCALL_AUTOSTART")? { self.autostart = v; }
        if let Some(v) = env_bool(env, "ROLLCALL_DBUS_ENABLED")? { self.dbus_enabled = v; }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.resize_factor > 0.0 && self.resize_factor <= 1.0) {
            return Err(ConfigError::Invalid {
                key: "resize_factor",
                value: self.resize_factor.to_string(),
            });
        }
        if !(self.match_tolerance.is_finite() && self.match_tolerance >= 0.0) {
            return Err(ConfigError::Invalid {
                key: "match_tolerance",
                value: self.match_tolerance.to_string(),
            });
        }
        if self.camera_device.trim().is_empty() {
            return Err(ConfigError::Invalid {
                key: "camera_device",
                value: self.camera_device.clone(),
            });
        }
        Ok(())
    }

    /// Device path for `camera_device`; a bare index `N` means `/dev/videoN`.
    pub fn camera_path(&self) -> String {
        let device = self.camera_device.trim();
        if device.parse::<u32>().is_ok() {
            format!("/dev/video{device}")
        } else {
            device.to_string()
        }
    }
}

fn data_dir(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".local/share"))
        .join("rollcall")
}

fn default_config_file(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    env("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| home(env).join(".config"))
        .join("rollcall")
        .join("config.toml")
}

fn home(env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(env("HOME").unwrap_or_else(|| "/tmp".to_string()))
}

fn env_parse<T: std::str::FromStr>(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value }),
    }
}

fn env_bool(
    env: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<bool>, ConfigError> {
    match env(key) {
        None => Ok(None),
        Some(value) => match value.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(ConfigError::Invalid { key, value }),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::load_with(env_from(&[("HOME", "/home/kim"), ("XDG_CONFIG_HOME", "/nonexistent")])).unwrap();
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.log_path, PathBuf::from("/home/kim/.local/share/rollcall/attendance_log.csv"));
        assert_eq!(config.resize_factor, 0.25);
        assert!(config.resume_from_log);
    }

    #[test]
    fn test_env_overrides() {
        let config = Config::load_with(env_from(&[
            ("XDG_DATA_HOME", "/data"),
            ("XDG_CONFIG_HOME", "/nonexistent"),
            ("ROLLCALL_RESIZE_FACTOR", "0.5"),
            ("ROLLCALL_AUTOSTART", "0"),
            ("ROLLCALL_CAMERA_DEVICE", "2"),
        ]))
        .unwrap();
        assert_eq!(config.gallery_dir, PathBuf::from("/data/rollcall/gallery"));
        assert_eq!(config.resize_factor, 0.5);
        assert!(!config.autostart);
        assert_eq!(config.camera_path(), "/dev/video2");
    }

    #[test]
    fn test_env_invalid_number() {
        let err = Config::load_with(env_from(&[
            ("XDG_CONFIG_HOME", "/nonexistent"),
            ("ROLLCALL_MATCH_TOLERANCE", "close"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "ROLLCALL_MATCH_TOLERANCE", .. }));
    }

    #[test]
    fn test_resize_factor_out_of_range() {
        let err = Config::load_with(env_from(&[
            ("XDG_CONFIG_HOME", "/nonexistent"),
            ("ROLLCALL_RESIZE_FACTOR", "1.5"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { key: "resize_factor", .. }));
    }

    #[test]
    fn test_file_then_env() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rollcall.toml");
        std::fs::write(
            &path,
            "gallery_dir = \"/srv/faces\"\nmatch_tolerance = 0.6\nresize_factor = 0.5\n",
        )
        .unwrap();

        let path_str = path.to_string_lossy().into_owned();
        let config = Config::load_with(env_from(&[
            ("ROLLCALL_CONFIG", path_str.as_str()),
            ("ROLLCALL_RESIZE_FACTOR", "1.0"),
        ]))
        .unwrap();
        assert_eq!(config.gallery_dir, PathBuf::from("/srv/faces"));
        assert_eq!(config.match_tolerance, 0.6);
        assert_eq!(config.resize_factor, 1.0);
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let err = Config::load_with(env_from(&[("ROLLCALL_CONFIG", "/nonexistent/rollcall.toml")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_unknown_file_key_rejected() {
        let mut config = Config::defaults_in(Path::new("/data"));
        assert!(config.apply_toml("camera = \"/dev/video1\"").is_err());
    }

    #[test]
    fn test_camera_path_passthrough() {
        let mut config = Config::defaults_in(Path::new("/data"));
        config.camera_device = "/dev/v4l/by-id/usb-cam".into();
        assert_eq!(config.camera_path(), "/dev/v4l/by-id/usb-cam");
    }
}
