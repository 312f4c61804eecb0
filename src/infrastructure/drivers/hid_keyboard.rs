//! HID boot keyboard reports
//!
//! ```text
//! [0]     : 0xA1 (input report)
//! [1]     : 0x01 (keyboard report id)
//! [2]     : Modifier bits (L ctrl, L shift, L alt, L gui, then right-hand)
//! [3]     : Reserved
//! [4-9]   : Up to six pressed key usages, 0 = empty, 1 = rollover error
//! ```

use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::{keycodes, InputEvent, KeyAction};
use tracing::trace;

pub const DRIVER_NAME: &str = "hidkeyboard";
pub const DISPLAY_NAME: &str = "HID Keyboard";
pub const IPEGA_DRIVER_NAME: &str = "hidipega";
pub const IPEGA_DISPLAY_NAME: &str = "iPega gamepad (HID)";

const INPUT_REPORT: u8 = 0xA1;
const KEYBOARD_REPORT: u8 = 0x01;
const REPORT_LEN: usize = 10;
const ROLLOVER: u8 = 0x01;

// Android meta state bits
const META_SHIFT_ON: u32 = 0x1;
const META_ALT_ON: u32 = 0x2;
const META_CTRL_ON: u32 = 0x1000;
const META_META_ON: u32 = 0x10000;

/// Tracks the pressed set across boot keyboard reports.
#[derive(Default)]
pub struct BootKeyboard {
    keys: Vec<u8>,
}

impl BootKeyboard {
    /// Returns the modifier byte and the usage transitions of one report.
    /// Reports with another id yield no transitions.
    pub fn update(&mut self, report: &[u8]) -> Result<(u8, Vec<(u8, KeyAction)>), DecodeError> {
        if report.len() < 2 {
            return Err(DecodeError::Truncated {
                expected: REPORT_LEN,
                actual: report.len(),
            });
        }
        if report[0] != INPUT_REPORT {
            return Err(DecodeError::BadHeader(report[0]));
        }
        if report[1] != KEYBOARD_REPORT {
            trace!("hid: ignoring report {:#04x}", report[1]);
            return Ok((0, Vec::new()));
        }
        if report.len() < REPORT_LEN {
            return Err(DecodeError::Truncated {
                expected: REPORT_LEN,
                actual: report.len(),
            });
        }

        let modifiers = report[2];
        let slots = &report[4..REPORT_LEN];
        if slots.iter().all(|&usage| usage == ROLLOVER) {
            return Ok((modifiers, Vec::new()));
        }
        let now: Vec<u8> = slots.iter().copied().filter(|&usage| usage > ROLLOVER).collect();

        let mut transitions = Vec::new();
        for &usage in self.keys.iter().filter(|usage| !now.contains(usage)) {
            transitions.push((usage, KeyAction::Up));
        }
        for &usage in now.iter().filter(|usage| !self.keys.contains(usage)) {
            transitions.push((usage, KeyAction::Down));
        }
        self.keys = now;
        Ok((modifiers, transitions))
    }
}

/// HID usage id (keyboard page) to key code.
pub fn usage_to_keycode(usage: u8) -> Option<i32> {
    let code = match usage {
        0x04..=0x1D => 29 + (usage - 0x04) as i32, // a..z
        0x1E..=0x26 => 8 + (usage - 0x1E) as i32,  // 1..9
        0x27 => 7,                                 // 0
        0x28 => 66,                                // enter
        0x29 => 111,                               // escape
        0x2A => 67,                                // backspace
        0x2B => 61,                                // tab
        0x2C => 62,                                // space
        0x4F => keycodes::DPAD_RIGHT,
        0x50 => keycodes::DPAD_LEFT,
        0x51 => keycodes::DPAD_DOWN,
        0x52 => keycodes::DPAD_UP,
        _ => return None,
    };
    Some(code)
}

/// Convert HID modifier bits to Android meta state.
pub fn meta_state(modifiers: u8) -> u32 {
    let either = modifiers | (modifiers >> 4);
    let mut meta = 0;
    if either & 0x01 != 0 {
        meta |= META_CTRL_ON;
    }
    if either & 0x02 != 0 {
        meta |= META_SHIFT_ON;
    }
    if either & 0x04 != 0 {
        meta |= META_ALT_ON;
    }
    if either & 0x08 != 0 {
        meta |= META_META_ON;
    }
    meta
}

#[derive(Default)]
pub struct HidKeyboard {
    keyboard: BootKeyboard,
}

impl HidKeyboard {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Protocol for HidKeyboard {
    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        let (modifiers, transitions) = self.keyboard.update(chunk)?;
        let modifiers = meta_state(modifiers);
        for (usage, action) in transitions {
            match usage_to_keycode(usage) {
                Some(key) => events.push(InputEvent::Key {
                    key,
                    action,
                    modifiers,
                    emulated: false,
                }),
                None => trace!("hid: unmapped usage {:#04x}", usage),
            }
        }
        Ok(())
    }
}
