//! Bluetooth adapter probing
//!
//! On Linux the adapter shows up under `/sys/class/bluetooth` and its radio
//! switch under `/sys/class/rfkill`. Other hosts can plug in their own
//! [`AdapterCheck`].

use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Missing,
    Disabled,
    Enabled,
}

pub trait AdapterCheck: Send + Sync {
    fn state(&self) -> AdapterState;
}

/// Adapter check that always answers the same, for simulation and tests.
pub struct StaticAdapter(pub AdapterState);

impl AdapterCheck for StaticAdapter {
    fn state(&self) -> AdapterState {
        self.0
    }
}

/// Reads adapter presence and rfkill state from sysfs.
pub struct SysfsAdapter {
    bluetooth_class: PathBuf,
    rfkill_class: PathBuf,
}

impl Default for SysfsAdapter {
    fn default() -> Self {
        Self::new("/sys/class/bluetooth", "/sys/class/rfkill")
    }
}

impl SysfsAdapter {
    pub fn new(bluetooth_class: impl Into<PathBuf>, rfkill_class: impl Into<PathBuf>) -> Self {
        Self {
            bluetooth_class: bluetooth_class.into(),
            rfkill_class: rfkill_class.into(),
        }
    }

    fn has_controller(&self) -> bool {
        fs::read_dir(&self.bluetooth_class)
            .map(|entries| {
                entries
                    .filter_map(Result::ok)
                    .any(|entry| entry.file_name().to_string_lossy().starts_with("hci"))
            })
            .unwrap_or(false)
    }

    /// Blocked if any bluetooth rfkill switch is soft or hard blocked.
    fn is_blocked(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.rfkill_class) else {
            return false;
        };
        entries.filter_map(Result::ok).any(|entry| {
            let dir = entry.path();
            read_trimmed(&dir.join("type")).as_deref() == Some("bluetooth")
                && (read_trimmed(&dir.join("soft")).as_deref() == Some("1")
                    || read_trimmed(&dir.join("hard")).as_deref() == Some("1"))
        })
    }
}

fn read_trimmed(path: &Path) -> Option<String> {
    fs::read_to_string(path).ok().map(|s| s.trim().to_string())
}

impl AdapterCheck for SysfsAdapter {
    fn state(&self) -> AdapterState {
        let state = if !self.has_controller() {
            AdapterState::Missing
        } else if self.is_blocked() {
            AdapterState::Disabled
        } else {
            AdapterState::Enabled
        };
        debug!("Bluetooth adapter state: {:?}", state);
        state
    }
}
