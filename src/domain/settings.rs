use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogSettings {
    #[serde(default = "default_level")]
    pub level: String, // "trace", "debug", "info", "warn", "error"
    #[serde(default = "default_false")]
    pub file_logging_enabled: bool,
    #[serde(default = "default_true")]
    pub console_logging_enabled: bool,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_prefix")]
    pub file_name_prefix: String,
    #[serde(default = "default_false")]
    pub show_file_line: bool,
    #[serde(default = "default_false")]
    pub show_thread_ids: bool,
    #[serde(default = "default_true")]
    pub show_target: bool,
    #[serde(default = "default_true")]
    pub ansi_colors: bool,
    #[serde(default = "default_rotation")]
    pub rotation: String, // "daily", "hourly", "minutely", "never"
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: default_level(),
            file_logging_enabled: default_false(),
            console_logging_enabled: default_true(),
            log_dir: default_log_dir(),
            file_name_prefix: default_prefix(),
            show_file_line: default_false(),
            show_thread_ids: default_false(),
            show_target: default_true(),
            ansi_colors: default_true(),
            rotation: default_rotation(),
        }
    }
}

/// Frame checksum algorithm expected by the accessory firmware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Checksum {
    /// One's complement of the wrapping 8-bit sum
    #[default]
    InvertedSum,
    /// Running XOR of all bytes
    Xor,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerSettings {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_sensor_request_timeout_ms")]
    pub sensor_request_timeout_ms: u64,
    #[serde(default = "default_stream_sensor_reports")]
    pub stream_sensor_reports: bool,

    // UART cache
    #[serde(default = "default_rx_cache_capacity")]
    pub rx_cache_capacity: usize,
    #[serde(default = "default_rx_coalesce_ms")]
    pub rx_coalesce_ms: u64,

    // Wire
    #[serde(default)]
    pub checksum: Checksum,
    #[serde(default = "default_color_brightness")]
    pub color_brightness: f32,

    // Peripheral bridge
    #[serde(default = "default_bridge_address")]
    pub bridge_address: String,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default)]
    pub max_write_len: Option<usize>,

    // Companion
    #[serde(default = "default_companion_socket")]
    pub companion_socket: String,

    #[serde(default)]
    pub log_settings: LogSettings,
}

impl Default for ControllerSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            sensor_request_timeout_ms: default_sensor_request_timeout_ms(),
            stream_sensor_reports: default_stream_sensor_reports(),
            rx_cache_capacity: default_rx_cache_capacity(),
            rx_coalesce_ms: default_rx_coalesce_ms(),
            checksum: Checksum::default(),
            color_brightness: default_color_brightness(),
            bridge_address: default_bridge_address(),
            connect_timeout_ms: default_connect_timeout_ms(),
            max_write_len: None,
            companion_socket: default_companion_socket(),
            log_settings: LogSettings::default(),
        }
    }
}

impl ControllerSettings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn sensor_request_timeout(&self) -> Duration {
        Duration::from_millis(self.sensor_request_timeout_ms)
    }

    pub fn rx_coalesce_window(&self) -> Duration {
        Duration::from_millis(self.rx_coalesce_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// Replace values the poll loop cannot run with by their defaults
    pub fn validated(mut self) -> Self {
        if self.poll_interval_ms == 0 {
            warn!(
                "poll_interval_ms must be greater than zero, using {}",
                default_poll_interval_ms()
            );
            self.poll_interval_ms = default_poll_interval_ms();
        }
        self
    }
}

fn default_level() -> String {
    "info".to_string()
}
fn default_true() -> bool {
    true
}
fn default_false() -> bool {
    false
}
fn default_log_dir() -> String {
    "logs".to_string()
}
fn default_prefix() -> String {
    "bluefruit_controller".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}
fn default_poll_interval_ms() -> u64 {
    250
}
fn default_sensor_request_timeout_ms() -> u64 {
    200
}
fn default_stream_sensor_reports() -> bool {
    true
}
fn default_rx_cache_capacity() -> usize {
    16 * 1024
}
fn default_rx_coalesce_ms() -> u64 {
    300
}
fn default_color_brightness() -> f32 {
    1.0
}
fn default_bridge_address() -> String {
    "127.0.0.1:9750".to_string()
}
fn default_connect_timeout_ms() -> u64 {
    5000
}
fn default_companion_socket() -> String {
    "bluefruit-controller.sock".to_string()
}

/// Read-only settings loader. Nothing is written back.
pub struct SettingsService {
    settings: ControllerSettings,
    settings_path: Option<PathBuf>,
}

impl SettingsService {
    /// Load from the platform config directory, falling back to defaults
    pub fn new() -> Self {
        match Self::default_settings_path() {
            Ok(path) => Self::from_path(path),
            Err(e) => {
                warn!("No config directory ({}), using default settings", e);
                Self {
                    settings: ControllerSettings::default(),
                    settings_path: None,
                }
            }
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let settings = match Self::load_from_file(&path) {
            Ok(settings) => {
                info!("Loaded settings from {}", path.display());
                settings
            }
            Err(e) => {
                info!("Using default settings ({}: {})", path.display(), e);
                ControllerSettings::default()
            }
        };
        Self {
            settings,
            settings_path: Some(path),
        }
    }

    fn default_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("BluefruitController");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<ControllerSettings> {
        let contents = fs::read_to_string(path)?;
        let settings: ControllerSettings = serde_json::from_str(&contents)?;
        Ok(settings.validated())
    }

    pub fn get(&self) -> &ControllerSettings {
        &self.settings
    }

    pub fn path(&self) -> Option<&Path> {
        self.settings_path.as_deref()
    }

    pub fn into_settings(self) -> ControllerSettings {
        self.settings
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_json_uses_defaults() {
        let settings: ControllerSettings =
            serde_json::from_str(r#"{ "poll_interval_ms": 100, "checksum": "xor" }"#).unwrap();
        assert_eq!(settings.poll_interval(), Duration::from_millis(100));
        assert_eq!(settings.checksum, Checksum::Xor);
        assert_eq!(settings.rx_coalesce_ms, 300);
        assert_eq!(settings.log_settings.level, "info");
        assert!(settings.stream_sensor_reports);
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join("bluefruit_controller_missing_settings.json");
        let service = SettingsService::from_path(&path);
        assert_eq!(service.get().poll_interval_ms, 250);
        assert_eq!(service.get().checksum, Checksum::InvertedSum);
        assert_eq!(service.path(), Some(path.as_path()));
    }

    #[test]
    fn test_loads_existing_file() {
        let path = std::env::temp_dir().join(format!(
            "bluefruit_controller_settings_{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "rx_cache_capacity": 42 }"#).unwrap();
        let service = SettingsService::from_path(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(service.get().rx_cache_capacity, 42);
    }

    #[test]
    fn test_zero_poll_interval_falls_back_to_default() {
        let path = std::env::temp_dir().join(format!(
            "bluefruit_controller_zero_interval_{}.json",
            std::process::id()
        ));
        fs::write(&path, r#"{ "poll_interval_ms": 0, "rx_coalesce_ms": 0 }"#).unwrap();
        let service = SettingsService::from_path(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(service.get().poll_interval(), Duration::from_millis(250));
        assert_eq!(service.get().rx_coalesce_ms, 0);
    }
}
