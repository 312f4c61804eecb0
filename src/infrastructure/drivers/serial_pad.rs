//! Serial-profile pads that stream one byte per button transition.
//!
//! ```text
//! bit 7   : 1 = released, 0 = pressed
//! bit 0-6 : button index into the pad's layout
//! ```

use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::{keycodes, InputEvent, KeyAction};
use tracing::trace;

pub const BGP100_DRIVER_NAME: &str = "bgp100";
pub const BGP100_DISPLAY_NAME: &str = "BGP100 gamepad";
pub const PHONEJOY_DRIVER_NAME: &str = "phonejoy";
pub const PHONEJOY_DISPLAY_NAME: &str = "Phonejoy";
pub const GAMESTOP_DRIVER_NAME: &str = "gamestop";
pub const GAMESTOP_DISPLAY_NAME: &str = "GameStop gamepad";

const RELEASE_BIT: u8 = 0x80;

/// Button order shared by the supported serial pads.
pub const STANDARD_LAYOUT: &[i32] = &[
    keycodes::DPAD_UP,
    keycodes::DPAD_DOWN,
    keycodes::DPAD_LEFT,
    keycodes::DPAD_RIGHT,
    keycodes::BUTTON_A,
    keycodes::BUTTON_B,
    keycodes::BUTTON_X,
    keycodes::BUTTON_Y,
    keycodes::BUTTON_L1,
    keycodes::BUTTON_R1,
    keycodes::BUTTON_START,
    keycodes::BUTTON_SELECT,
];

pub struct SerialPad {
    layout: &'static [i32],
}

impl SerialPad {
    pub fn new(layout: &'static [i32]) -> Self {
        Self { layout }
    }

    pub fn standard() -> Self {
        Self::new(STANDARD_LAYOUT)
    }
}

impl Protocol for SerialPad {
    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        for &byte in chunk {
            let index = (byte & !RELEASE_BIT) as usize;
            let Some(&key) = self.layout.get(index) else {
                trace!("serial pad: unknown button {}", index);
                continue;
            };
            let action = if byte & RELEASE_BIT != 0 {
                KeyAction::Up
            } else {
                KeyAction::Down
            };
            events.push(InputEvent::key(key, action));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release_stream() {
        let mut pad = SerialPad::standard();
        let mut events = Vec::new();
        pad.decode(&[0x04, 0x84, 0x7F, 0x0A], &mut events).unwrap();
        assert_eq!(
            events,
            vec![
                InputEvent::key(keycodes::BUTTON_A, KeyAction::Down),
                InputEvent::key(keycodes::BUTTON_A, KeyAction::Up),
                InputEvent::key(keycodes::BUTTON_START, KeyAction::Down),
            ]
        );
    }
}
