//! Zeemote JS1 protocol
//!
//! The pad streams length-prefixed frames over RFCOMM:
//!
//! ```text
//! [0]     : Length of the rest of the frame
//! [1]     : 0xA1 (input report)
//! [2]     : Report id
//!           0x07: buttons, [3-8] ids of pressed buttons, 0xFE = empty slot
//!           0x08: stick,   [3] unused, [4] X (i8), [5] Y (i8)
//!           0x11: battery, ignored
//! ```

use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::{keycodes, InputEvent, KeyAction};
use tracing::trace;

pub const DRIVER_NAME: &str = "zeemote";
pub const DISPLAY_NAME: &str = "Zeemote";

const INPUT_REPORT: u8 = 0xA1;
const REPORT_BUTTONS: u8 = 0x07;
const REPORT_STICK: u8 = 0x08;
const EMPTY_SLOT: u8 = 0xFE;
const BUTTON_SLOTS: usize = 6;

/// Button id as sent by the pad, mapped to a key code.
const BUTTON_KEYS: [i32; 4] = [
    keycodes::BUTTON_A,
    keycodes::BUTTON_B,
    keycodes::BUTTON_C,
    keycodes::BUTTON_MODE,
];

#[derive(Default)]
pub struct Zeemote {
    buffer: Vec<u8>,
    pressed: Vec<u8>,
    stick: (i32, i32),
}

impl Zeemote {
    pub fn new() -> Self {
        Self::default()
    }

    fn decode_frame(&mut self, frame: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        if frame.len() < 2 {
            return Err(DecodeError::Truncated {
                expected: 2,
                actual: frame.len(),
            });
        }
        if frame[0] != INPUT_REPORT {
            return Err(DecodeError::BadHeader(frame[0]));
        }

        let payload = &frame[2..];
        match frame[1] {
            REPORT_BUTTONS => {
                let slots = payload.get(..BUTTON_SLOTS).ok_or(DecodeError::Truncated {
                    expected: BUTTON_SLOTS + 2,
                    actual: frame.len(),
                })?;
                let now: Vec<u8> = slots
                    .iter()
                    .copied()
                    .filter(|&id| id != EMPTY_SLOT && (id as usize) < BUTTON_KEYS.len())
                    .collect();

                for &id in self.pressed.iter().filter(|id| !now.contains(id)) {
                    events.push(InputEvent::key(BUTTON_KEYS[id as usize], KeyAction::Up));
                }
                for &id in now.iter().filter(|id| !self.pressed.contains(id)) {
                    events.push(InputEvent::key(BUTTON_KEYS[id as usize], KeyAction::Down));
                }
                self.pressed = now;
            }
            REPORT_STICK => {
                if payload.len() < 3 {
                    return Err(DecodeError::Truncated {
                        expected: 5,
                        actual: frame.len(),
                    });
                }
                let x = payload[1] as i8 as i32;
                let y = payload[2] as i8 as i32;
                if x != self.stick.0 {
                    events.push(InputEvent::Directional {
                        direction: 0,
                        value: x,
                    });
                }
                if y != self.stick.1 {
                    events.push(InputEvent::Directional {
                        direction: 1,
                        value: y,
                    });
                }
                self.stick = (x, y);
            }
            other => trace!("zeemote: ignoring report {:#04x}", other),
        }
        Ok(())
    }
}

impl Protocol for Zeemote {
    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        self.buffer.extend_from_slice(chunk);
        loop {
            let Some(&len) = self.buffer.first() else {
                return Ok(());
            };
            let len = len as usize;
            if self.buffer.len() < len + 1 {
                return Ok(());
            }
            let frame: Vec<u8> = self.buffer.drain(..=len).skip(1).collect();
            self.decode_frame(&frame, events)?;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buttons(ids: &[u8]) -> Vec<u8> {
        let mut frame = vec![8, INPUT_REPORT, REPORT_BUTTONS];
        let mut slots = [EMPTY_SLOT; BUTTON_SLOTS];
        slots[..ids.len()].copy_from_slice(ids);
        frame.extend_from_slice(&slots);
        frame
    }

    #[test]
    fn test_button_transitions() {
        let mut pad = Zeemote::new();
        let mut events = Vec::new();

        pad.decode(&buttons(&[0]), &mut events).unwrap();
        pad.decode(&buttons(&[0, 1]), &mut events).unwrap();
        pad.decode(&buttons(&[]), &mut events).unwrap();

        assert_eq!(
            events,
            vec![
                InputEvent::key(keycodes::BUTTON_A, KeyAction::Down),
                InputEvent::key(keycodes::BUTTON_B, KeyAction::Down),
                InputEvent::key(keycodes::BUTTON_A, KeyAction::Up),
                InputEvent::key(keycodes::BUTTON_B, KeyAction::Up),
            ]
        );
    }

    #[test]
    fn test_stick_split_across_reads() {
        let mut pad = Zeemote::new();
        let mut events = Vec::new();
        let frame = [5, INPUT_REPORT, REPORT_STICK, 0, 0x80, 0x10];

        pad.decode(&frame[..3], &mut events).unwrap();
        assert!(events.is_empty());
        pad.decode(&frame[3..], &mut events).unwrap();

        assert_eq!(
            events,
            vec![
                InputEvent::Directional {
                    direction: 0,
                    value: -128
                },
                InputEvent::Directional {
                    direction: 1,
                    value: 16
                },
            ]
        );
    }

    #[test]
    fn test_bad_header() {
        let mut pad = Zeemote::new();
        let mut events = Vec::new();
        assert_eq!(
            pad.decode(&[2, 0x55, 0x07], &mut events),
            Err(DecodeError::BadHeader(0x55))
        );
    }
}
