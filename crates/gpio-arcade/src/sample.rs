//! Raw per-pass samples of one pad
//!
//! [`RawSample`] keeps the 16 values of a pass under names instead of
//! positions. [`RawSample::slots`] gives the flat layout back:
//!
//! | slots  | content                                  |
//! |--------|------------------------------------------|
//! | 0..4   | up, down, left, right (1 = pressed)      |
//! | 4..12  | buttons in `BUTTON_TABLE` order          |
//! | 12..16 | ry, rx, y, x after orientation fix-up    |

use crate::PAD_LINES;
use crate::config::PinMap;
use crate::pins::{PinBank, PinState};

/// Digital half of a sample, `true` meaning pressed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DigitalSample {
    pub up: bool,
    pub down: bool,
    pub left: bool,
    pub right: bool,
    pub buttons: [bool; 8],
}

impl DigitalSample {
    pub fn from_lines(lines: [bool; PAD_LINES]) -> Self {
        let mut buttons = [false; 8];
        buttons.copy_from_slice(&lines[4..]);
        Self {
            up: lines[0],
            down: lines[1],
            left: lines[2],
            right: lines[3],
            buttons,
        }
    }

    pub fn lines(&self) -> [bool; PAD_LINES] {
        let mut lines = [false; PAD_LINES];
        lines[..4].copy_from_slice(&[self.up, self.down, self.left, self.right]);
        lines[4..].copy_from_slice(&self.buttons);
        lines
    }
}

/// Analog half of a sample, each value in `0..=1023`
///
/// Vertical axes are already inverted so that pushing a stick up lowers the
/// value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnalogSample {
    pub ry: u16,
    pub rx: u16,
    pub y: u16,
    pub x: u16,
}

/// Everything read from one pad in one pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RawSample {
    pub digital: DigitalSample,
    pub analog: AnalogSample,
}

impl RawSample {
    /// Flat 16-slot view
    pub fn slots(&self) -> [u16; PAD_LINES + 4] {
        let mut slots = [0u16; PAD_LINES + 4];
        for (slot, pressed) in slots.iter_mut().zip(self.digital.lines()) {
            *slot = u16::from(pressed);
        }
        let AnalogSample { ry, rx, y, x } = self.analog;
        slots[PAD_LINES..].copy_from_slice(&[ry, rx, y, x]);
        slots
    }
}

/// Read the 12 digital lines of a pad
///
/// Lines are active low: a grounded line reads as pressed. Unused slots are
/// never pressed. No filtering is applied; bounce is absorbed by re-sampling
/// every pass.
pub fn read_buttons<P: PinBank>(pins: &mut P, map: &PinMap) -> Result<[bool; PAD_LINES], P::Error> {
    let mut lines = [false; PAD_LINES];
    for (line, slot) in lines.iter_mut().zip(map.slots()) {
        if let Some(pin) = *slot {
            *line = pins.read(pin)? == PinState::Low;
        }
    }
    Ok(lines)
}
