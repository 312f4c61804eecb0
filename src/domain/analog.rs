use crate::domain::models::{keycodes, InputEvent, KeyAction};

/// Turns stick deflection into d-pad key presses.
///
/// Axis 0 is horizontal, axis 1 vertical (negative = up). A key goes down when
/// the value crosses `threshold` and up again once it falls back inside the
/// dead zone or flips to the opposite side.
pub struct AnalogEmulator {
    threshold: i32,
    pressed: [Option<i32>; 2],
}

impl AnalogEmulator {
    /// A threshold of zero or less disables emulation.
    pub fn new(threshold: i32) -> Self {
        Self {
            threshold,
            pressed: [None, None],
        }
    }

    pub fn process(&mut self, event: &InputEvent, out: &mut Vec<InputEvent>) {
        if self.threshold <= 0 {
            return;
        }
        let InputEvent::Directional { direction, value } = *event else {
            return;
        };
        let (negative, positive) = match direction {
            0 => (keycodes::DPAD_LEFT, keycodes::DPAD_RIGHT),
            1 => (keycodes::DPAD_UP, keycodes::DPAD_DOWN),
            _ => return,
        };

        let wanted = if value <= -self.threshold {
            Some(negative)
        } else if value >= self.threshold {
            Some(positive)
        } else {
            None
        };

        let slot = &mut self.pressed[direction as usize];
        if *slot == wanted {
            return;
        }
        if let Some(previous) = slot.take() {
            out.push(emulated(previous, KeyAction::Up));
        }
        if let Some(key) = wanted {
            out.push(emulated(key, KeyAction::Down));
        }
        *slot = wanted;
    }

    /// Release anything still held, e.g. when the link goes away.
    pub fn release_all(&mut self, out: &mut Vec<InputEvent>) {
        for slot in self.pressed.iter_mut() {
            if let Some(key) = slot.take() {
                out.push(emulated(key, KeyAction::Up));
            }
        }
    }
}

fn emulated(key: i32, action: KeyAction) -> InputEvent {
    InputEvent::Key {
        key,
        action,
        modifiers: 0,
        emulated: true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stick(direction: u8, value: i32) -> InputEvent {
        InputEvent::Directional { direction, value }
    }

    #[test]
    fn test_press_and_release() {
        let mut emulator = AnalogEmulator::new(64);
        let mut out = Vec::new();

        emulator.process(&stick(0, 100), &mut out);
        emulator.process(&stick(0, 110), &mut out);
        emulator.process(&stick(0, 10), &mut out);

        assert_eq!(
            out,
            vec![
                emulated(keycodes::DPAD_RIGHT, KeyAction::Down),
                emulated(keycodes::DPAD_RIGHT, KeyAction::Up),
            ]
        );
    }

    #[test]
    fn test_flip_releases_previous_side() {
        let mut emulator = AnalogEmulator::new(64);
        let mut out = Vec::new();

        emulator.process(&stick(1, -90), &mut out);
        emulator.process(&stick(1, 90), &mut out);

        assert_eq!(
            out,
            vec![
                emulated(keycodes::DPAD_UP, KeyAction::Down),
                emulated(keycodes::DPAD_UP, KeyAction::Up),
                emulated(keycodes::DPAD_DOWN, KeyAction::Down),
            ]
        );
    }

    #[test]
    fn test_disabled_and_release_all() {
        let mut out = Vec::new();
        AnalogEmulator::new(0).process(&stick(0, 127), &mut out);
        assert!(out.is_empty());

        let mut emulator = AnalogEmulator::new(64);
        emulator.process(&stick(0, -127), &mut out);
        out.clear();
        emulator.release_all(&mut out);
        assert_eq!(out, vec![emulated(keycodes::DPAD_LEFT, KeyAction::Up)]);
    }
}
