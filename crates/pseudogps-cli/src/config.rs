//! Reads/writes `~/.pseudogps/config.toml`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Persisted rig configuration stored in `~/.pseudogps/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Camera frame width in pixels.
    #[serde(default = "default_frame_width")]
    pub frame_width: u32,

    /// Camera frame height in pixels.
    #[serde(default = "default_frame_height")]
    pub frame_height: u32,

    /// Marker id taped to the table as the coordinate origin.
    #[serde(default = "default_origin_marker_id")]
    pub origin_marker_id: u16,

    /// Physical side length of the printed markers, millimetres.
    #[serde(default = "default_marker_size_mm")]
    pub marker_size_mm: f64,

    /// Side length of the printed markers in pixels as seen by the camera.
    #[serde(default = "default_marker_width_px")]
    pub marker_width_px: f64,

    /// Initial px→mm correction factor (runtime-adjustable from the station).
    #[serde(default = "default_calibration_factor")]
    pub calibration_factor: f64,

    /// EMA coefficient for the x axis.
    #[serde(default = "default_alpha_x")]
    pub alpha_x: f64,

    /// EMA coefficient for the y axis.
    #[serde(default = "default_alpha_y")]
    pub alpha_y: f64,

    /// Capture/publish rate in frames per second.
    #[serde(default = "default_rate_hz")]
    pub rate_hz: f64,

    /// HTTP/WebSocket port of the station server.
    #[serde(default = "default_station_port")]
    pub station_port: u16,
}

fn default_frame_width() -> u32 {
    640
}
fn default_frame_height() -> u32 {
    480
}
fn default_origin_marker_id() -> u16 {
    1
}
fn default_marker_size_mm() -> f64 {
    88.9
}
fn default_marker_width_px() -> f64 {
    100.0
}
fn default_calibration_factor() -> f64 {
    2.755
}
fn default_alpha_x() -> f64 {
    0.05
}
fn default_alpha_y() -> f64 {
    0.65
}
fn default_rate_hz() -> f64 {
    5.0
}
fn default_station_port() -> u16 {
    8080
}

impl Default for Config {
    fn default() -> Self {
        Self {
            frame_width: default_frame_width(),
            frame_height: default_frame_height(),
            origin_marker_id: default_origin_marker_id(),
            marker_size_mm: default_marker_size_mm(),
            marker_width_px: default_marker_width_px(),
            calibration_factor: default_calibration_factor(),
            alpha_x: default_alpha_x(),
            alpha_y: default_alpha_y(),
            rate_hz: default_rate_hz(),
            station_port: default_station_port(),
        }
    }
}

/// Return the path to `~/.pseudogps/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
/// Extracted for testability without mutating environment variables.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".pseudogps").join("config.toml")
}

/// Load the config from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Config>, String> {
    load_from(&config_path())
}

/// Load the config from a specific path.  Pure file read; env overrides are
/// applied by the caller so they also reach wizard/default configs.
pub(crate) fn load_from(path: &PathBuf) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `PSEUDOGPS_*` environment variable overrides to `cfg`.
///
/// Supported variables:
///
/// | Variable | Config field |
/// |---|---|
/// | `PSEUDOGPS_ORIGIN_ID` | `origin_marker_id` |
/// | `PSEUDOGPS_STATION_PORT` | `station_port` |
/// | `PSEUDOGPS_RATE_HZ` | `rate_hz` |
/// | `PSEUDOGPS_CALIBRATION_FACTOR` | `calibration_factor` |
/// | `PSEUDOGPS_FRAME_WIDTH` | `frame_width` |
/// | `PSEUDOGPS_FRAME_HEIGHT` | `frame_height` |
/// | `PSEUDOGPS_MARKER_SIZE_MM` | `marker_size_mm` |
/// | `PSEUDOGPS_MARKER_WIDTH_PX` | `marker_width_px` |
/// | `PSEUDOGPS_ALPHA_X` | `alpha_x` |
/// | `PSEUDOGPS_ALPHA_Y` | `alpha_y` |
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("PSEUDOGPS_ORIGIN_ID")
        && let Ok(id) = v.parse::<u16>()
    {
        cfg.origin_marker_id = id;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_STATION_PORT")
        && let Ok(port) = v.parse::<u16>()
    {
        cfg.station_port = port;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_RATE_HZ")
        && let Ok(hz) = v.parse::<f64>()
        && hz > 0.0
    {
        cfg.rate_hz = hz;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_CALIBRATION_FACTOR")
        && let Ok(factor) = v.parse::<f64>()
        && factor > 0.0
    {
        cfg.calibration_factor = factor;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_FRAME_WIDTH")
        && let Ok(w) = v.parse::<u32>()
        && w > 0
    {
        cfg.frame_width = w;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_FRAME_HEIGHT")
        && let Ok(h) = v.parse::<u32>()
        && h > 0
    {
        cfg.frame_height = h;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_MARKER_SIZE_MM")
        && let Ok(mm) = v.parse::<f64>()
        && mm > 0.0
    {
        cfg.marker_size_mm = mm;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_MARKER_WIDTH_PX")
        && let Ok(px) = v.parse::<f64>()
        && px > 0.0
    {
        cfg.marker_width_px = px;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_ALPHA_X")
        && let Ok(a) = v.parse::<f64>()
        && (0.0..=1.0).contains(&a)
    {
        cfg.alpha_x = a;
    }
    if let Ok(v) = std::env::var("PSEUDOGPS_ALPHA_Y")
        && let Ok(a) = v.parse::<f64>()
        && (0.0..=1.0).contains(&a)
    {
        cfg.alpha_y = a;
    }
}

/// Save the config to disk, creating `~/.pseudogps/` if necessary.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path.
pub(crate) fn save_to(cfg: &Config, path: &PathBuf) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Restrict the config directory to the owner only (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    // Write the file with owner-only read/write (rw-------) on Unix.
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| {
                use std::io::Write;
                f.write_all(raw.as_bytes())
            })
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let file_meta = std::fs::metadata(&path).expect("file metadata");
        let file_mode = file_meta.permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        let dir_mode = dir_meta.permissions().mode() & 0o777;
        assert_eq!(dir_mode, 0o700, "config directory must have 0o700 permissions");
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        let cfg = Config::default();
        save_to(&cfg, &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.origin_marker_id, 1);
        assert_eq!(loaded.station_port, 8080);
        assert!((loaded.rate_hz - 5.0).abs() < f64::EPSILON);
        assert!((loaded.calibration_factor - 2.755).abs() < f64::EPSILON);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(&path, "station_port = 9000\n").expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.station_port, 9000);
        assert_eq!(loaded.origin_marker_id, 1);
        assert!((loaded.alpha_y - 0.65).abs() < f64::EPSILON);
    }

    #[test]
    fn config_path_points_to_pseudogps_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".pseudogps"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        let result = load_from(&path).expect("no error");
        assert!(result.is_none());
    }

    #[test]
    fn apply_env_overrides_changes_station_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_STATION_PORT", "9999") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.station_port, 9999);
        unsafe { std::env::remove_var("PSEUDOGPS_STATION_PORT") };
    }

    #[test]
    fn apply_env_overrides_changes_origin_id() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_ORIGIN_ID", "42") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.origin_marker_id, 42);
        unsafe { std::env::remove_var("PSEUDOGPS_ORIGIN_ID") };
    }

    #[test]
    fn apply_env_overrides_ignores_invalid_rate() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_RATE_HZ", "-5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.rate_hz - 5.0).abs() < f64::EPSILON);
        unsafe { std::env::remove_var("PSEUDOGPS_RATE_HZ") };
    }

    #[test]
    fn env_overrides_apply_without_config_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(!path.exists());

        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_MARKER_SIZE_MM", "70.0") };
        // The same load-or-default-then-override sequence `track` runs.
        let mut cfg = load_from(&path).expect("no error").unwrap_or_default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.marker_size_mm - 70.0).abs() < f64::EPSILON);
        // Untouched fields fall back to defaults.
        assert!((cfg.marker_width_px - 100.0).abs() < f64::EPSILON);
        unsafe { std::env::remove_var("PSEUDOGPS_MARKER_SIZE_MM") };
    }

    #[test]
    fn env_overrides_apply_on_top_of_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        std::fs::create_dir_all(path.parent().unwrap()).expect("mkdir");
        std::fs::write(&path, "frame_width = 1280\nframe_height = 720\n").expect("write");

        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_FRAME_HEIGHT", "960") };
        let mut cfg = load_from(&path).expect("no error").unwrap_or_default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.frame_width, 1280, "file value must survive");
        assert_eq!(cfg.frame_height, 960, "env must win over file");
        unsafe { std::env::remove_var("PSEUDOGPS_FRAME_HEIGHT") };
    }

    #[test]
    fn apply_env_overrides_changes_smoothing_alphas() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_ALPHA_X", "0.2") };
        unsafe { std::env::set_var("PSEUDOGPS_ALPHA_Y", "1.5") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert!((cfg.alpha_x - 0.2).abs() < f64::EPSILON);
        // Out-of-range coefficient is ignored.
        assert!((cfg.alpha_y - 0.65).abs() < f64::EPSILON);
        unsafe { std::env::remove_var("PSEUDOGPS_ALPHA_X") };
        unsafe { std::env::remove_var("PSEUDOGPS_ALPHA_Y") };
    }

    #[test]
    fn apply_env_overrides_ignores_unparsable_port() {
        // SAFETY: single-threaded test; no data races on env vars.
        unsafe { std::env::set_var("PSEUDOGPS_STATION_PORT", "not-a-port") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.station_port, 8080);
        unsafe { std::env::remove_var("PSEUDOGPS_STATION_PORT") };
    }
}
