//! Wiimote protocol (HID over L2CAP)
//!
//! Input reports start with 0xA1, output reports with 0xA2.
//!
//! ```text
//! Input
//! [1]     : Report id (0x20 status, 0x21 read, 0x22 ack, 0x30 buttons,
//!           0x31 buttons + accelerometer)
//! [2-3]   : Core buttons
//!           [2] bit 0 left, 1 right, 2 down, 3 up, 4 plus
//!           [3] bit 0 two, 1 one, 2 B, 3 A, 4 minus, 7 home
//! [4-6]   : Accelerometer X, Y, Z (report 0x31 only, 0x80 = centre)
//!
//! Output
//! 0x11    : LEDs, bits 4-7 select LED 1-4
//! 0x12    : Reporting mode, [3] = report id to stream
//! Bit 0 of the first payload byte of every output report drives rumble.
//! ```

use crate::domain::driver::Protocol;
use crate::domain::error::DecodeError;
use crate::domain::models::{keycodes, Feature, InputEvent, KeyAction};
use tracing::trace;

pub const DRIVER_NAME: &str = "wiimote";
pub const DISPLAY_NAME: &str = "Nintendo Wiimote";

const INPUT_REPORT: u8 = 0xA1;
const OUTPUT_REPORT: u8 = 0xA2;
const SET_LEDS: u8 = 0x11;
const SET_REPORT_MODE: u8 = 0x12;
const MODE_BUTTONS: u8 = 0x30;
const MODE_BUTTONS_ACCEL: u8 = 0x31;
const ACCEL_CENTRE: i32 = 0x80;

/// (byte offset, bit mask, key code)
const BUTTONS: [(usize, u8, i32); 11] = [
    (2, 0x01, keycodes::DPAD_LEFT),
    (2, 0x02, keycodes::DPAD_RIGHT),
    (2, 0x04, keycodes::DPAD_DOWN),
    (2, 0x08, keycodes::DPAD_UP),
    (2, 0x10, keycodes::BUTTON_START),
    (3, 0x01, keycodes::BUTTON_2),
    (3, 0x02, keycodes::BUTTON_1),
    (3, 0x04, keycodes::BUTTON_B),
    (3, 0x08, keycodes::BUTTON_A),
    (3, 0x10, keycodes::BUTTON_SELECT),
    (3, 0x80, keycodes::BUTTON_MODE),
];

pub struct Wiimote {
    buttons: u16,
    accel: Option<[i32; 3]>,
    rumble: bool,
    led: u8,
    accelerometer: bool,
}

impl Default for Wiimote {
    fn default() -> Self {
        Self {
            buttons: 0,
            accel: None,
            rumble: false,
            led: 1,
            accelerometer: false,
        }
    }
}

impl Wiimote {
    pub fn new() -> Self {
        Self::default()
    }

    fn rumble_bit(&self) -> u8 {
        u8::from(self.rumble)
    }

    fn led_report(&self) -> Vec<u8> {
        let led_bits = 0x10u8 << (self.led - 1);
        vec![OUTPUT_REPORT, SET_LEDS, led_bits | self.rumble_bit()]
    }

    fn mode_report(&self) -> Vec<u8> {
        let mode = if self.accelerometer {
            MODE_BUTTONS_ACCEL
        } else {
            MODE_BUTTONS
        };
        vec![OUTPUT_REPORT, SET_REPORT_MODE, self.rumble_bit(), mode]
    }

    fn decode_buttons(&mut self, report: &[u8], events: &mut Vec<InputEvent>) {
        let now = u16::from_be_bytes([report[2], report[3]]);
        let changed = now ^ self.buttons;
        for (offset, mask, key) in BUTTONS {
            let shift = if offset == 2 { 8 } else { 0 };
            let bit = u16::from(mask) << shift;
            if changed & bit != 0 {
                let action = if now & bit != 0 {
                    KeyAction::Down
                } else {
                    KeyAction::Up
                };
                events.push(InputEvent::key(key, action));
            }
        }
        self.buttons = now;
    }

    fn decode_accel(&mut self, report: &[u8], events: &mut Vec<InputEvent>) {
        let now = [
            report[4] as i32 - ACCEL_CENTRE,
            report[5] as i32 - ACCEL_CENTRE,
            report[6] as i32 - ACCEL_CENTRE,
        ];
        for (axis, value) in now.iter().enumerate() {
            if self.accel.map(|prev| prev[axis]) != Some(*value) {
                events.push(InputEvent::Accelerometer {
                    axis: axis as u8,
                    value: *value,
                });
            }
        }
        self.accel = Some(now);
    }
}

impl Protocol for Wiimote {
    fn handshake(&mut self) -> Vec<Vec<u8>> {
        vec![self.led_report(), self.mode_report()]
    }

    fn decode(&mut self, chunk: &[u8], events: &mut Vec<InputEvent>) -> Result<(), DecodeError> {
        if chunk.len() < 2 {
            return Err(DecodeError::Truncated {
                expected: 2,
                actual: chunk.len(),
            });
        }
        if chunk[0] != INPUT_REPORT {
            return Err(DecodeError::BadHeader(chunk[0]));
        }

        match chunk[1] {
            0x20 | 0x21 | 0x22 | MODE_BUTTONS => {
                if chunk.len() < 4 {
                    return Err(DecodeError::Truncated {
                        expected: 4,
                        actual: chunk.len(),
                    });
                }
                self.decode_buttons(chunk, events);
            }
            MODE_BUTTONS_ACCEL => {
                if chunk.len() < 7 {
                    return Err(DecodeError::Truncated {
                        expected: 7,
                        actual: chunk.len(),
                    });
                }
                self.decode_buttons(chunk, events);
                self.decode_accel(chunk, events);
            }
            other => trace!("wiimote: ignoring report {:#04x}", other),
        }
        Ok(())
    }

    fn supports_features(&self) -> bool {
        true
    }

    fn apply_feature(&mut self, feature: Feature) -> Option<Vec<u8>> {
        match feature {
            Feature::Rumble(on) => {
                self.rumble = on;
                Some(self.led_report())
            }
            Feature::Led(led) => {
                self.led = led.get();
                Some(self.led_report())
            }
            Feature::Accelerometer(on) => {
                self.accelerometer = on;
                if !on {
                    self.accel = None;
                }
                Some(self.mode_report())
            }
        }
    }
}
