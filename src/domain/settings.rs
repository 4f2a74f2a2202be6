use crate::domain::motor::RotationLimits;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

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
    "ev3_link".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

/// Bluetooth class filter used when scanning (EV3 reports major 8, minor 1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceFilter {
    pub major_device_class: u8,
    pub minor_device_class: u8,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            major_device_class: 8,
            minor_device_class: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub device_filter: DeviceFilter,

    // Polling
    pub polling_interval_ms: u64,
    /// Every n-th poll rediscovers devices instead of reading values
    pub device_list_every: u32,

    // Motors
    pub default_motor_power: u8,
    /// Extra wait after a timed run before the automatic coast
    pub coast_delay_ms: u64,
    pub rotation_sample_ms: u64,
    pub rotation_stall_samples: u32,
    pub rotation_tolerance: i64,
    pub rotation_settle_ms: u64,
    /// Also reset the tacho counter on the brick when zeroing a position
    pub hardware_position_reset: bool,

    // Gyro reset
    pub gyro_start_delay_ms: u64,
    pub gyro_settle_ms: u64,
    pub gyro_confirm_ms: u64,
    /// `None` retries until the gyro reads zero
    pub gyro_max_attempts: Option<u32>,

    pub log_settings: LogSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            device_filter: DeviceFilter::default(),
            polling_interval_ms: 150,
            device_list_every: 20,
            default_motor_power: 50,
            coast_delay_ms: 1000,
            rotation_sample_ms: 100,
            rotation_stall_samples: 20,
            rotation_tolerance: 5,
            rotation_settle_ms: 1000,
            hardware_position_reset: false,
            gyro_start_delay_ms: 2000,
            gyro_settle_ms: 1000,
            gyro_confirm_ms: 1000,
            gyro_max_attempts: Some(10),
            log_settings: LogSettings::default(),
        }
    }
}

impl Settings {
    pub fn polling_interval(&self) -> Duration {
        Duration::from_millis(self.polling_interval_ms.max(1))
    }

    pub fn rotation_limits(&self) -> RotationLimits {
        RotationLimits {
            stall_samples: self.rotation_stall_samples,
            tolerance: self.rotation_tolerance,
        }
    }
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::with_path(settings_path))
    }

    /// Load from an explicit file, falling back to defaults when it is missing or invalid
    pub fn with_path(settings_path: PathBuf) -> Self {
        let settings = Self::load_from_file(&settings_path).unwrap_or_default();
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ev3_link");
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        if let Some(dir) = self.settings_path.parent() {
            fs::create_dir_all(dir)?;
        }
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.settings_path
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    pub fn get_mut(&mut self) -> &mut Settings {
        &mut self.settings
    }
}
