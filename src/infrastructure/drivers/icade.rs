//! iCade protocol
//!
//! The cabinet types one letter when a control goes down and another when
//! it comes back up. Over HID the letters arrive as keyboard reports, over a
//! serial link (iControlPad in iCade mode) as plain ASCII.

use super::hid_keyboard::BootKeyboard;
use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::{keycodes, InputEvent, KeyAction};
use tracing::trace;

pub const DRIVER_NAME: &str = "icade";
pub const DISPLAY_NAME: &str = "iCade (HID)";
pub const ICONTROLPAD_DRIVER_NAME: &str = "icontrolpad";
pub const ICONTROLPAD_DISPLAY_NAME: &str = "iControlPad (iCade mode)";

/// (press letter, release letter, key code)
const LETTERS: [(u8, u8, i32); 12] = [
    (b'w', b'e', keycodes::DPAD_UP),
    (b'd', b'c', keycodes::DPAD_RIGHT),
    (b'x', b'z', keycodes::DPAD_DOWN),
    (b'a', b'q', keycodes::DPAD_LEFT),
    (b'y', b't', keycodes::BUTTON_X),
    (b'u', b'f', keycodes::BUTTON_Y),
    (b'i', b'm', keycodes::BUTTON_L1),
    (b'o', b'g', keycodes::BUTTON_R1),
    (b'h', b'r', keycodes::BUTTON_A),
    (b'j', b'n', keycodes::BUTTON_B),
    (b'k', b'p', keycodes::BUTTON_SELECT),
    (b'l', b'v', keycodes::BUTTON_START),
];

fn letter_event(letter: u8) -> Option<InputEvent> {
    let letter = letter.to_ascii_lowercase();
    LETTERS.iter().find_map(|&(press, release, key)| {
        if letter == press {
            Some(InputEvent::key(key, KeyAction::Down))
        } else if letter == release {
            Some(InputEvent::key(key, KeyAction::Up))
        } else {
            None
        }
    })
}

pub struct ICade {
    // None: letters arrive as raw ASCII
    keyboard: Option<BootKeyboard>,
}

impl ICade {
    pub fn hid() -> Self {
        Self {
            keyboard: Some(BootKeyboard::default()),
        }
    }

    pub fn serial() -> Self {
        Self { keyboard: None }
    }
}

impl Protocol for ICade {
    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        let letters: Vec<u8> = match self.keyboard.as_mut() {
            Some(keyboard) => {
                let (_, transitions) = keyboard.update(chunk)?;
                transitions
                    .into_iter()
                    .filter(|&(usage, action)| {
                        action == KeyAction::Down && (0x04..=0x1D).contains(&usage)
                    })
                    .map(|(usage, _)| b'a' + (usage - 0x04))
                    .collect()
            }
            None => chunk.to_vec(),
        };

        for letter in letters {
            match letter_event(letter) {
                Some(event) => events.push(event),
                None => trace!("icade: ignoring {:#04x}", letter),
            }
        }
        Ok(())
    }
}
