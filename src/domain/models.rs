use serde::{Deserialize, Serialize};

/// Session used when a command does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Android-style key codes used for normalized key events.
pub mod keycodes {
    pub const DPAD_UP: i32 = 19;
    pub const DPAD_DOWN: i32 = 20;
    pub const DPAD_LEFT: i32 = 21;
    pub const DPAD_RIGHT: i32 = 22;
    pub const DPAD_CENTER: i32 = 23;
    pub const BUTTON_A: i32 = 96;
    pub const BUTTON_B: i32 = 97;
    pub const BUTTON_C: i32 = 98;
    pub const BUTTON_X: i32 = 99;
    pub const BUTTON_Y: i32 = 100;
    pub const BUTTON_Z: i32 = 101;
    pub const BUTTON_L1: i32 = 102;
    pub const BUTTON_R1: i32 = 103;
    pub const BUTTON_L2: i32 = 104;
    pub const BUTTON_R2: i32 = 105;
    pub const BUTTON_START: i32 = 108;
    pub const BUTTON_SELECT: i32 = 109;
    pub const BUTTON_MODE: i32 = 110;
    pub const BUTTON_1: i32 = 188;
    pub const BUTTON_2: i32 = 189;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyAction {
    Down,
    Up,
}

/// Protocol-agnostic input event produced by a driver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InputEvent {
    Key {
        key: i32,
        action: KeyAction,
        modifiers: u32,
        /// Synthesized from an analog value rather than a physical button
        emulated: bool,
    },
    Directional {
        direction: u8,
        value: i32,
    },
    Accelerometer {
        axis: u8,
        value: i32,
    },
}

impl InputEvent {
    pub fn key(key: i32, action: KeyAction) -> Self {
        Self::Key {
            key,
            action,
            modifiers: 0,
            emulated: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateReport {
    pub connected: bool,
    pub device_address: Option<String>,
    pub display_name: Option<String>,
    pub driver_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigReport {
    pub version: String,
    pub driver_names: Vec<String>,
    pub driver_display_names: Vec<String>,
}

/// Everything published to the host, input events and lifecycle alike.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    Input(InputEvent),
    Connecting { address: String },
    Connected { address: String },
    Disconnected { address: String },
    Error { message: String, detail: String },
    State(StateReport),
    Config(ConfigReport),
}

impl Notification {
    pub fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::Input(_))
    }
}

/// A notification scoped to the session it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub session_id: String,
    #[serde(flatten)]
    pub notification: Notification,
}

/// LED index on devices with four player LEDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LedId(u8);

impl LedId {
    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for LedId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1..=4 => Ok(Self(value)),
            other => Err(format!("LED id must be between 1 and 4, got {}", other)),
        }
    }
}

impl From<LedId> for u8 {
    fn from(led: LedId) -> Self {
        led.0
    }
}

/// Optional device feature a host may toggle on capable drivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", content = "value", rename_all = "snake_case")]
pub enum Feature {
    Rumble(bool),
    Led(LedId),
    Accelerometer(bool),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverState {
    Created,
    Connecting,
    Connected,
    Terminated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_is_flat_json() {
        let envelope = Envelope {
            session_id: "s1".to_string(),
            notification: Notification::Connected {
                address: "AA:BB".to_string(),
            },
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["kind"], "connected");
        assert_eq!(json["session_id"], "s1");
        assert_eq!(json["address"], "AA:BB");
    }

    #[test]
    fn test_input_event_json() {
        let envelope = Envelope {
            session_id: "s1".to_string(),
            notification: Notification::Input(InputEvent::key(
                keycodes::BUTTON_A,
                KeyAction::Down,
            )),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["kind"], "input");
        assert_eq!(json["type"], "key");
        assert_eq!(json["action"], "down");
        assert_eq!(json["emulated"], false);
    }

    #[test]
    fn test_led_id_range() {
        assert!(LedId::try_from(0).is_err());
        assert_eq!(LedId::try_from(4).unwrap().get(), 4);
        assert!(serde_json::from_str::<Feature>(r#"{"name":"led","value":5}"#).is_err());
        let feature: Feature = serde_json::from_str(r#"{"name":"rumble","value":true}"#).unwrap();
        assert_eq!(feature, Feature::Rumble(true));
    }
}
