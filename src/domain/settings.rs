use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

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
    #[serde(default = "default_true")]
    pub show_thread_names: bool,
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
            show_thread_names: default_true(),
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
    "controller_hub".to_string()
}
fn default_rotation() -> String {
    "daily".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub log_settings: LogSettings,

    // Last used selection, consulted for fallback connects
    #[serde(default)]
    pub selected_device_address: Option<String>,
    #[serde(default = "default_driver")]
    pub selected_driver: String,

    // Command channel
    #[serde(default = "default_socket_name")]
    pub socket_name: String,

    // Transport and capability probing
    #[serde(default = "default_capture_dir")]
    pub capture_dir: String,
    #[serde(default = "default_hid_check_paths")]
    pub hid_check_paths: Vec<String>,
    #[serde(default = "default_false")]
    pub assume_adapter_enabled: bool,

    // Stick deflection that triggers emulated d-pad keys, 0 disables
    #[serde(default = "default_analog_threshold")]
    pub analog_threshold: i32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_settings: LogSettings::default(),
            selected_device_address: None,
            selected_driver: default_driver(),
            socket_name: default_socket_name(),
            capture_dir: default_capture_dir(),
            hid_check_paths: default_hid_check_paths(),
            assume_adapter_enabled: default_false(),
            analog_threshold: default_analog_threshold(),
        }
    }
}

fn default_driver() -> String {
    "zeemote".to_string()
}
fn default_socket_name() -> String {
    "controller_hub.sock".to_string()
}
fn default_capture_dir() -> String {
    "captures".to_string()
}
fn default_hid_check_paths() -> Vec<String> {
    vec!["/sys/module/hidp".to_string(), "/dev/uhid".to_string()]
}
fn default_analog_threshold() -> i32 {
    64
}

/// Last-used device selection, supplied by the host side.
pub trait Preferences: Send + Sync {
    fn selected_address(&self) -> Option<String>;
    fn selected_driver(&self) -> Option<String>;

    /// Record an explicit selection for later fallback connects.
    fn remember(&self, _address: &str, _driver: &str) {}
}

pub struct SettingsService {
    settings: Settings,
    settings_path: PathBuf,
}

impl SettingsService {
    pub fn new() -> anyhow::Result<Self> {
        let settings_path = Self::get_settings_path()?;
        Ok(Self::open(settings_path))
    }

    /// Load from `settings_path`, falling back to defaults if it is missing
    /// or unreadable.
    pub fn open(settings_path: PathBuf) -> Self {
        let settings = match Self::load_from_file(&settings_path) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::debug!(
                    "Using default settings ({}: {})",
                    settings_path.display(),
                    e
                );
                Settings::default()
            }
        };
        Self {
            settings,
            settings_path,
        }
    }

    fn get_settings_path() -> anyhow::Result<PathBuf> {
        let mut path = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        path.push("ControllerHub");
        fs::create_dir_all(&path)?;
        path.push("settings.json");
        Ok(path)
    }

    fn load_from_file(path: &Path) -> anyhow::Result<Settings> {
        let contents = fs::read_to_string(path)?;
        let settings = serde_json::from_str(&contents)?;
        Ok(settings)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let json = serde_json::to_string_pretty(&self.settings)?;
        fs::write(&self.settings_path, json)?;
        Ok(())
    }

    pub fn get(&self) -> &Settings {
        &self.settings
    }

    /// Remember the device a session last connected to.
    pub fn remember_selection(&mut self, address: &str, driver: &str) -> anyhow::Result<()> {
        self.settings.selected_device_address = Some(address.to_string());
        self.settings.selected_driver = driver.to_lowercase();
        self.save()
    }
}

impl Preferences for Settings {
    fn selected_address(&self) -> Option<String> {
        self.selected_device_address
            .clone()
            .filter(|address| !address.trim().is_empty())
    }

    fn selected_driver(&self) -> Option<String> {
        Some(self.selected_driver.clone()).filter(|driver| !driver.trim().is_empty())
    }
}

impl Preferences for Mutex<SettingsService> {
    fn selected_address(&self) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|service| service.get().selected_address())
    }

    fn selected_driver(&self) -> Option<String> {
        self.lock()
            .ok()
            .and_then(|service| service.get().selected_driver())
    }

    fn remember(&self, address: &str, driver: &str) {
        let Ok(mut service) = self.lock() else {
            tracing::warn!("Settings lock poisoned, selection not saved");
            return;
        };
        if let Err(e) = service.remember_selection(address, driver) {
            tracing::warn!("Failed to save device selection: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{"selected_device_address":"00:11:22:33:44:55"}"#).unwrap();
        assert_eq!(settings.selected_driver, "zeemote");
        assert_eq!(settings.analog_threshold, 64);
        assert_eq!(settings.log_settings.level, "info");
        assert_eq!(
            settings.selected_address().as_deref(),
            Some("00:11:22:33:44:55")
        );
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut service = SettingsService::open(path.clone());
        assert!(service.get().selected_address().is_none());
        service.remember_selection("AA:BB", "WiiMote").unwrap();

        let reloaded = SettingsService::open(path);
        assert_eq!(reloaded.get().selected_address().as_deref(), Some("AA:BB"));
        assert_eq!(reloaded.get().selected_driver().as_deref(), Some("wiimote"));
    }

    #[test]
    fn test_corrupt_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "{ not json").unwrap();

        let service = SettingsService::open(path);
        assert_eq!(service.get().socket_name, "controller_hub.sock");
    }
}
